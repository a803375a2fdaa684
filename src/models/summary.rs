//! Server-computed period summaries
//!
//! Summaries are read-only aggregates. The client never edits them; every
//! fetch replaces the previous value wholesale.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::money::Money;

/// Aggregate for one expense period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpensePeriodSummary {
    pub amount_available: Money,

    pub amount_remaining: Money,

    #[serde(default)]
    pub expenses_count: u32,

    pub start_date: DateTime<FixedOffset>,

    /// Start of the following period; absent for the open-ended latest one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<FixedOffset>>,
}

impl ExpensePeriodSummary {
    /// Amount already spent in the period
    pub fn amount_spent(&self) -> Money {
        self.amount_available - self.amount_remaining
    }

    /// Placeholder shown when no period has been scheduled yet
    pub fn empty(start_date: DateTime<FixedOffset>) -> Self {
        Self {
            amount_available: Money::zero(),
            amount_remaining: Money::zero(),
            expenses_count: 0,
            start_date,
            end_date: None,
        }
    }

    pub fn is_open_ended(&self) -> bool {
        self.end_date.is_none()
    }
}

/// Aggregate for the period containing "now"
///
/// Same shape as [`ExpensePeriodSummary`] but served by its own endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrentExpensePeriodSummary(pub ExpensePeriodSummary);

impl std::ops::Deref for CurrentExpensePeriodSummary {
    type Target = ExpensePeriodSummary;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
