//! Expense item model
//!
//! A single expense recorded against an account. Identity is fixed at
//! creation; amount, description and date may be edited afterwards.

use chrono::{DateTime, FixedOffset, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{AccountId, ExpenseItemId};
use super::money::{Money, MoneyParseError};

/// Longest description the backend accepts
pub const MAX_DESCRIPTION_LEN: usize = 200;

/// An expense as stored in the `ExpenseItem` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseItem {
    /// Client-generated identifier
    pub id: ExpenseItemId,

    pub amount: Money,

    pub description: String,

    /// When the expense happened, with the offset it was entered in
    pub date: DateTime<FixedOffset>,

    /// User id of the creator, filled in by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<AccountId>,
}

impl ExpenseItem {
    /// Create a new expense item dated now
    pub fn new(amount: Money, description: impl Into<String>) -> Self {
        Self::with_date(amount, description, Local::now().fixed_offset())
    }

    /// Create a new expense item with an explicit date
    pub fn with_date(
        amount: Money,
        description: impl Into<String>,
        date: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            id: ExpenseItemId::new(),
            amount,
            description: description.into().trim().to_string(),
            date,
            created_by: None,
            account_id: None,
        }
    }

    /// Validate the fields a user can edit
    pub fn validate(&self) -> Result<(), ExpenseItemValidationError> {
        self.amount
            .validate_entry()
            .map_err(ExpenseItemValidationError::Amount)?;
        validate_description(&self.description)
    }
}

/// Check a description: non-empty after trimming, at most 200 characters
pub fn validate_description(description: &str) -> Result<(), ExpenseItemValidationError> {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        return Err(ExpenseItemValidationError::EmptyDescription);
    }
    let len = trimmed.chars().count();
    if len > MAX_DESCRIPTION_LEN {
        return Err(ExpenseItemValidationError::DescriptionTooLong(len));
    }
    Ok(())
}

impl fmt::Display for ExpenseItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.date.format("%Y-%m-%d"),
            self.amount,
            self.description
        )
    }
}

/// Validation errors for expense items
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpenseItemValidationError {
    Amount(MoneyParseError),
    EmptyDescription,
    DescriptionTooLong(usize),
}

impl fmt::Display for ExpenseItemValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Amount(e) => write!(f, "{}", e),
            Self::EmptyDescription => write!(f, "Description cannot be empty"),
            Self::DescriptionTooLong(len) => write!(
                f,
                "Description is {} characters; the limit is {}",
                len, MAX_DESCRIPTION_LEN
            ),
        }
    }
}

impl std::error::Error for ExpenseItemValidationError {}
