//! Expense period model
//!
//! A period starts on `start_date` and runs until the next period's start;
//! the latest period is open-ended.

use chrono::{DateTime, FixedOffset, Local};
use serde::{Deserialize, Serialize};

use super::ids::{AccountId, ExpensePeriodId};
use super::money::{Money, MoneyParseError};

/// A budget window as stored in the `ExpensePeriod` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpensePeriod {
    pub id: ExpensePeriodId,

    /// Money available to spend over the period
    pub amount_available: Money,

    pub start_date: DateTime<FixedOffset>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<AccountId>,
}

impl ExpensePeriod {
    /// Create a new period starting now
    pub fn new(amount_available: Money) -> Self {
        Self::starting(amount_available, Local::now().fixed_offset())
    }

    /// Create a new period with an explicit start date
    pub fn starting(amount_available: Money, start_date: DateTime<FixedOffset>) -> Self {
        Self {
            id: ExpensePeriodId::new(),
            amount_available,
            start_date,
            account_id: None,
        }
    }

    pub fn validate(&self) -> Result<(), MoneyParseError> {
        self.amount_available.validate_entry()
    }
}

/// Derive each period's end date from its successor
///
/// `periods` may be in any order. The result is ordered most recent first and
/// pairs each period with the start of the period that follows it, or `None`
/// for the latest one.
pub fn with_end_dates(
    periods: &[ExpensePeriod],
) -> Vec<(&ExpensePeriod, Option<DateTime<FixedOffset>>)> {
    let mut sorted: Vec<&ExpensePeriod> = periods.iter().collect();
    sorted.sort_by(|a, b| b.start_date.cmp(&a.start_date));

    let mut next_start = None;
    let mut out = Vec::with_capacity(sorted.len());
    for period in sorted {
        out.push((period, next_start));
        next_start = Some(period.start_date);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn test_validate_amount_available() {
        assert!(ExpensePeriod::new(Money::from_cents(50_000)).validate().is_ok());
        assert!(ExpensePeriod::new(Money::zero()).validate().is_err());
    }

    #[test]
    fn test_end_dates_follow_next_start() {
        let jan = ExpensePeriod::starting(Money::from_cents(100), at("2016-01-01T00:00:00Z"));
        let mar = ExpensePeriod::starting(Money::from_cents(100), at("2016-03-01T00:00:00Z"));
        let feb = ExpensePeriod::starting(Money::from_cents(100), at("2016-02-01T00:00:00Z"));
        let periods = vec![jan.clone(), mar.clone(), feb.clone()];

        let ranged = with_end_dates(&periods);
        assert_eq!(ranged.len(), 3);
        assert_eq!(ranged[0].0.id, mar.id);
        assert_eq!(ranged[0].1, None);
        assert_eq!(ranged[1].0.id, feb.id);
        assert_eq!(ranged[1].1, Some(mar.start_date));
        assert_eq!(ranged[2].0.id, jan.id);
        assert_eq!(ranged[2].1, Some(feb.start_date));
    }

    #[test]
    fn test_wire_shape() {
        let period = ExpensePeriod::starting(Money::from_cents(50_000), at("2016-01-01T00:00:00Z"));
        let json = serde_json::to_value(&period).unwrap();
        assert_eq!(json["amountAvailable"], 500.0);
        assert!(json.get("startDate").is_some());
    }
}
