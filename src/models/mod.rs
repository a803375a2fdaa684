//! Core data models for the expense tracker
//!
//! These mirror the backend tables (expense items, expense periods, user
//! profiles, accounts) and the server-computed summaries.

pub mod expense_item;
pub mod expense_period;
pub mod ids;
pub mod money;
pub mod profile;
pub mod summary;

pub use expense_item::{ExpenseItem, ExpenseItemValidationError, MAX_DESCRIPTION_LEN};
pub use expense_period::ExpensePeriod;
pub use ids::{AccountId, ExpenseItemId, ExpensePeriodId, UserProfileId};
pub use money::{Money, MoneyParseError, MAX_AMOUNT};
pub use profile::{Account, UserProfile};
pub use summary::{CurrentExpensePeriodSummary, ExpensePeriodSummary};
