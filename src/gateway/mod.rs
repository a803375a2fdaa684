//! Remote data gateway
//!
//! Translates domain operations into calls against the table backend. Each
//! call takes the bearer credential explicitly so the caller controls which
//! token is used on each attempt.

pub mod http;
pub mod local;
pub mod query;

use async_trait::async_trait;

use crate::auth::Credentials;
use crate::error::ExpenseResult;
use crate::models::{
    Account, CurrentExpensePeriodSummary, ExpenseItem, ExpenseItemId, ExpensePeriod,
    ExpensePeriodId, ExpensePeriodSummary, UserProfile,
};

pub use http::HttpGateway;
pub use local::LocalGateway;
pub use query::{ListQuery, LIST_LIMIT};

/// Backend table names
pub mod tables {
    pub const EXPENSE_ITEM: &str = "ExpenseItem";
    pub const EXPENSE_PERIOD: &str = "ExpensePeriod";
    pub const USER_PROFILE: &str = "UserProfile";
    pub const ACCOUNT: &str = "Account";
}

/// Authenticated CRUD and summary calls
///
/// A rejected credential surfaces as `ExpenseError::Unauthorized`; every
/// other failure is returned as is and never retried here.
#[async_trait]
pub trait RemoteDataGateway: Send + Sync {
    /// Up to 100 expense items, newest first by date
    async fn expense_items(&self, creds: &Credentials) -> ExpenseResult<Vec<ExpenseItem>>;

    async fn insert_expense_item(
        &self,
        creds: &Credentials,
        item: &ExpenseItem,
    ) -> ExpenseResult<ExpenseItem>;

    async fn update_expense_item(
        &self,
        creds: &Credentials,
        item: &ExpenseItem,
    ) -> ExpenseResult<ExpenseItem>;

    async fn delete_expense_item(
        &self,
        creds: &Credentials,
        id: &ExpenseItemId,
    ) -> ExpenseResult<()>;

    /// Up to 100 expense periods, newest first by start date
    async fn expense_periods(&self, creds: &Credentials) -> ExpenseResult<Vec<ExpensePeriod>>;

    async fn insert_expense_period(
        &self,
        creds: &Credentials,
        period: &ExpensePeriod,
    ) -> ExpenseResult<ExpensePeriod>;

    async fn update_expense_period(
        &self,
        creds: &Credentials,
        period: &ExpensePeriod,
    ) -> ExpenseResult<ExpensePeriod>;

    async fn delete_expense_period(
        &self,
        creds: &Credentials,
        id: &ExpensePeriodId,
    ) -> ExpenseResult<()>;

    async fn user_profiles(&self, creds: &Credentials) -> ExpenseResult<Vec<UserProfile>>;

    async fn insert_user_profile(
        &self,
        creds: &Credentials,
        profile: &UserProfile,
    ) -> ExpenseResult<UserProfile>;

    async fn accounts(&self, creds: &Credentials) -> ExpenseResult<Vec<Account>>;

    /// One summary per period, most recent first
    async fn expense_period_summaries(
        &self,
        creds: &Credentials,
    ) -> ExpenseResult<Vec<ExpensePeriodSummary>>;

    async fn current_expense_period_summary(
        &self,
        creds: &Credentials,
    ) -> ExpenseResult<CurrentExpensePeriodSummary>;
}
