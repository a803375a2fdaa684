//! Offline table store
//!
//! Serves the same tables as the hosted backend from JSON files under
//! `data/`, with the same ordering, the same 100-row bound and locally
//! computed summaries. Only tokens issued by the local identity provider
//! are accepted.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Local};
use tracing::debug;

use super::query::{self, ListQuery};
use super::{tables, RemoteDataGateway};
use crate::auth::{Credentials, LOCAL_TOKEN_PREFIX};
use crate::config::TrackerPaths;
use crate::error::{ExpenseError, ExpenseResult};
use crate::models::{
    expense_period::with_end_dates, Account, CurrentExpensePeriodSummary, ExpenseItem,
    ExpenseItemId, ExpensePeriod, ExpensePeriodId, ExpensePeriodSummary, Money, UserProfile,
};
use crate::storage::{JsonTable, Record};

/// Run a table write on the blocking pool; reads are served from memory
async fn write<T, R, F>(table: &Arc<JsonTable<T>>, op: F) -> ExpenseResult<R>
where
    T: Record + 'static,
    R: Send + 'static,
    F: FnOnce(&JsonTable<T>) -> ExpenseResult<R> + Send + 'static,
{
    let table = Arc::clone(table);
    tokio::task::spawn_blocking(move || op(&table))
        .await
        .map_err(|e| ExpenseError::Internal(format!("Table write task failed: {}", e)))?
}

impl Record for ExpenseItem {
    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Record for ExpensePeriod {
    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Record for UserProfile {
    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Record for Account {
    fn key(&self) -> String {
        self.id.to_string()
    }
}

/// [`RemoteDataGateway`] over local JSON tables
pub struct LocalGateway {
    items: Arc<JsonTable<ExpenseItem>>,
    periods: Arc<JsonTable<ExpensePeriod>>,
    profiles: Arc<JsonTable<UserProfile>>,
    accounts: Arc<JsonTable<Account>>,
}

impl LocalGateway {
    /// Open (or create on first write) the tables under `paths.data_dir()`
    pub fn open(paths: &TrackerPaths) -> ExpenseResult<Self> {
        Ok(Self {
            items: Arc::new(JsonTable::open(paths.table_file(tables::EXPENSE_ITEM))?),
            periods: Arc::new(JsonTable::open(paths.table_file(tables::EXPENSE_PERIOD))?),
            profiles: Arc::new(JsonTable::open(paths.table_file(tables::USER_PROFILE))?),
            accounts: Arc::new(JsonTable::open(paths.table_file(tables::ACCOUNT))?),
        })
    }

    /// Add an account row; the backend provisions these out of band
    pub fn insert_account(&self, account: Account) -> ExpenseResult<Account> {
        self.accounts.insert(account)
    }

    fn authorize(creds: &Credentials) -> ExpenseResult<()> {
        if creds.token.starts_with(LOCAL_TOKEN_PREFIX) {
            Ok(())
        } else {
            Err(ExpenseError::Unauthorized(
                "Token was not issued by the local store".into(),
            ))
        }
    }

    fn summaries_at(&self, now: DateTime<FixedOffset>) -> ExpenseResult<SummaryBook> {
        let periods = self.periods.all()?;
        let items = self.items.all()?;

        let summaries = with_end_dates(&periods)
            .into_iter()
            .map(|(period, end_date)| {
                let in_period: Vec<&ExpenseItem> = items
                    .iter()
                    .filter(|item| {
                        item.date >= period.start_date && end_date.map_or(true, |end| item.date < end)
                    })
                    .collect();
                let spent: Money = in_period.iter().map(|item| item.amount).sum();

                ExpensePeriodSummary {
                    amount_available: period.amount_available,
                    amount_remaining: period.amount_available - spent,
                    expenses_count: in_period.len() as u32,
                    start_date: period.start_date,
                    end_date,
                }
            })
            .collect();

        Ok(SummaryBook { summaries, now })
    }
}

/// Summaries ordered most recent first, plus the instant "current" is judged at
struct SummaryBook {
    summaries: Vec<ExpensePeriodSummary>,
    now: DateTime<FixedOffset>,
}

impl SummaryBook {
    fn current(self) -> ExpensePeriodSummary {
        let now = self.now;
        self.summaries
            .into_iter()
            .find(|s| s.start_date <= now && s.end_date.map_or(true, |end| now < end))
            .unwrap_or_else(|| ExpensePeriodSummary::empty(now))
    }
}

#[async_trait]
impl RemoteDataGateway for LocalGateway {
    async fn expense_items(&self, creds: &Credentials) -> ExpenseResult<Vec<ExpenseItem>> {
        Self::authorize(creds)?;
        let rows = self.items.all()?;
        debug!(rows = rows.len(), "Listing local expense items");
        Ok(query::EXPENSE_ITEMS.apply(rows, |a, b| a.date.cmp(&b.date)))
    }

    async fn insert_expense_item(
        &self,
        creds: &Credentials,
        item: &ExpenseItem,
    ) -> ExpenseResult<ExpenseItem> {
        Self::authorize(creds)?;
        let mut row = item.clone();
        row.created_by = Some(creds.user_id.clone());
        write(&self.items, move |table| table.insert(row)).await
    }

    async fn update_expense_item(
        &self,
        creds: &Credentials,
        item: &ExpenseItem,
    ) -> ExpenseResult<ExpenseItem> {
        Self::authorize(creds)?;
        let existing = self
            .items
            .get(item.id.as_str())?
            .ok_or_else(|| ExpenseError::expense_item_not_found(item.id.as_str()))?;

        let mut row = item.clone();
        row.created_by = existing.created_by;
        write(&self.items, move |table| table.replace(row))
            .await?
            .ok_or_else(|| ExpenseError::expense_item_not_found(item.id.as_str()))
    }

    async fn delete_expense_item(
        &self,
        creds: &Credentials,
        id: &ExpenseItemId,
    ) -> ExpenseResult<()> {
        Self::authorize(creds)?;
        let key = id.to_string();
        if write(&self.items, move |table| table.remove(&key)).await? {
            Ok(())
        } else {
            Err(ExpenseError::expense_item_not_found(id.as_str()))
        }
    }

    async fn expense_periods(&self, creds: &Credentials) -> ExpenseResult<Vec<ExpensePeriod>> {
        Self::authorize(creds)?;
        let rows = self.periods.all()?;
        Ok(query::EXPENSE_PERIODS.apply(rows, |a, b| a.start_date.cmp(&b.start_date)))
    }

    async fn insert_expense_period(
        &self,
        creds: &Credentials,
        period: &ExpensePeriod,
    ) -> ExpenseResult<ExpensePeriod> {
        Self::authorize(creds)?;
        let row = period.clone();
        write(&self.periods, move |table| table.insert(row)).await
    }

    async fn update_expense_period(
        &self,
        creds: &Credentials,
        period: &ExpensePeriod,
    ) -> ExpenseResult<ExpensePeriod> {
        Self::authorize(creds)?;
        let row = period.clone();
        write(&self.periods, move |table| table.replace(row))
            .await?
            .ok_or_else(|| ExpenseError::expense_period_not_found(period.id.as_str()))
    }

    async fn delete_expense_period(
        &self,
        creds: &Credentials,
        id: &ExpensePeriodId,
    ) -> ExpenseResult<()> {
        Self::authorize(creds)?;
        let key = id.to_string();
        if write(&self.periods, move |table| table.remove(&key)).await? {
            Ok(())
        } else {
            Err(ExpenseError::expense_period_not_found(id.as_str()))
        }
    }

    async fn user_profiles(&self, creds: &Credentials) -> ExpenseResult<Vec<UserProfile>> {
        Self::authorize(creds)?;
        let mine = self
            .profiles
            .all()?
            .into_iter()
            .filter(|p| p.user_id.as_deref() == Some(creds.user_id.as_str()))
            .collect();
        Ok(ListQuery::unordered().apply(mine, |_, _| std::cmp::Ordering::Equal))
    }

    async fn insert_user_profile(
        &self,
        creds: &Credentials,
        profile: &UserProfile,
    ) -> ExpenseResult<UserProfile> {
        Self::authorize(creds)?;
        let mut row = profile.clone();
        row.user_id = Some(creds.user_id.clone());
        write(&self.profiles, move |table| table.insert(row)).await
    }

    async fn accounts(&self, creds: &Credentials) -> ExpenseResult<Vec<Account>> {
        Self::authorize(creds)?;
        Ok(ListQuery::unordered().apply(self.accounts.all()?, |_, _| std::cmp::Ordering::Equal))
    }

    async fn expense_period_summaries(
        &self,
        creds: &Credentials,
    ) -> ExpenseResult<Vec<ExpensePeriodSummary>> {
        Self::authorize(creds)?;
        Ok(self.summaries_at(Local::now().fixed_offset())?.summaries)
    }

    async fn current_expense_period_summary(
        &self,
        creds: &Credentials,
    ) -> ExpenseResult<CurrentExpensePeriodSummary> {
        Self::authorize(creds)?;
        let book = self.summaries_at(Local::now().fixed_offset())?;
        Ok(CurrentExpensePeriodSummary(book.current()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AccountId;
    use tempfile::TempDir;

    fn at(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn local_creds() -> Credentials {
        Credentials::new("me", format!("{}test", LOCAL_TOKEN_PREFIX))
    }

    fn open(temp_dir: &TempDir) -> LocalGateway {
        LocalGateway::open(&TrackerPaths::with_base_dir(temp_dir.path().to_path_buf())).unwrap()
    }

    #[tokio::test]
    async fn test_foreign_token_is_unauthorized() {
        let temp_dir = TempDir::new().unwrap();
        let gateway = open(&temp_dir);
        let err = gateway
            .expense_items(&Credentials::new("me", "zumo-token"))
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_insert_stamps_creator_and_persists() {
        let temp_dir = TempDir::new().unwrap();
        let item = ExpenseItem::new(Money::from_cents(1234), "Coffee");
        {
            let gateway = open(&temp_dir);
            let stored = gateway.insert_expense_item(&local_creds(), &item).await.unwrap();
            assert_eq!(stored.created_by.as_deref(), Some("me"));
        }

        let reopened = open(&temp_dir);
        let items = reopened.expense_items(&local_creds()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, item.id);
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_rows() {
        let temp_dir = TempDir::new().unwrap();
        let gateway = open(&temp_dir);
        let item = ExpenseItem::new(Money::from_cents(100), "Tea");

        let err = gateway.update_expense_item(&local_creds(), &item).await.unwrap_err();
        assert!(err.is_not_found());
        let err = gateway
            .delete_expense_period(&local_creds(), &ExpensePeriodId::from("gone"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_summaries_split_items_by_period() {
        let temp_dir = TempDir::new().unwrap();
        let gateway = open(&temp_dir);
        let creds = local_creds();

        let jan = ExpensePeriod::starting(Money::from_cents(50_000), at("2016-01-01T00:00:00Z"));
        let feb = ExpensePeriod::starting(Money::from_cents(40_000), at("2016-02-01T00:00:00Z"));
        gateway.insert_expense_period(&creds, &jan).await.unwrap();
        gateway.insert_expense_period(&creds, &feb).await.unwrap();

        for (cents, date) in [
            (1_000, "2016-01-05T12:00:00Z"),
            (2_500, "2016-01-31T23:59:59Z"),
            (700, "2016-02-01T00:00:00Z"),
        ] {
            let item = ExpenseItem::with_date(Money::from_cents(cents), "x", at(date));
            gateway.insert_expense_item(&creds, &item).await.unwrap();
        }

        let summaries = gateway.expense_period_summaries(&creds).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].start_date, feb.start_date);
        assert_eq!(summaries[0].expenses_count, 1);
        assert_eq!(summaries[0].amount_remaining, Money::from_cents(39_300));
        assert!(summaries[0].is_open_ended());
        assert_eq!(summaries[1].expenses_count, 2);
        assert_eq!(summaries[1].amount_spent(), Money::from_cents(3_500));
        assert_eq!(summaries[1].end_date, Some(feb.start_date));

        // The open-ended February period contains "now"
        let current = gateway.current_expense_period_summary(&creds).await.unwrap();
        assert_eq!(current.start_date, feb.start_date);
    }

    #[tokio::test]
    async fn test_current_summary_without_periods_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let gateway = open(&temp_dir);
        let current = gateway
            .current_expense_period_summary(&local_creds())
            .await
            .unwrap();
        assert_eq!(current.expenses_count, 0);
        assert!(current.amount_available.is_zero());
    }

    #[tokio::test]
    async fn test_profiles_are_per_user_and_accounts_are_listed() {
        let temp_dir = TempDir::new().unwrap();
        let gateway = open(&temp_dir);
        let creds = local_creds();

        assert!(gateway.user_profiles(&creds).await.unwrap().is_empty());
        gateway.insert_user_profile(&creds, &UserProfile::new()).await.unwrap();
        assert_eq!(gateway.user_profiles(&creds).await.unwrap().len(), 1);

        let other = Credentials::new("someone-else", format!("{}x", LOCAL_TOKEN_PREFIX));
        assert!(gateway.user_profiles(&other).await.unwrap().is_empty());

        gateway
            .insert_account(Account {
                id: AccountId::from("acct-1"),
                name: "Household".into(),
            })
            .unwrap();
        let accounts = gateway.accounts(&creds).await.unwrap();
        assert_eq!(accounts[0].name, "Household");
    }
}
