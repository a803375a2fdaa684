//! Expense item operations
//!
//! Input is validated before anything is sent. Every successful or failed
//! mutation drops the item list and both summary caches.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::session::{record, ExpenseSession};
use crate::audit::{AuditEntry, EntityType};
use crate::cache::CacheKind;
use crate::error::{ExpenseError, ExpenseResult};
use crate::models::{ExpenseItem, ExpenseItemId, Money};

/// Input for recording a new expense
#[derive(Debug, Clone)]
pub struct CreateExpenseItemInput {
    pub amount: Money,
    pub description: String,
    /// Defaults to now
    pub date: Option<DateTime<FixedOffset>>,
}

/// Fields to change on an existing expense; `None` keeps the current value
#[derive(Debug, Clone, Default)]
pub struct UpdateExpenseItemInput {
    pub amount: Option<Money>,
    pub description: Option<String>,
    pub date: Option<DateTime<FixedOffset>>,
}

impl UpdateExpenseItemInput {
    pub fn is_empty(&self) -> bool {
        self.amount.is_none() && self.description.is_none() && self.date.is_none()
    }
}

fn validate(item: &ExpenseItem) -> ExpenseResult<()> {
    item.validate()
        .map_err(|e| ExpenseError::Validation(e.to_string()))
}

impl ExpenseSession {
    /// The 100 most recent expenses, newest first
    pub async fn expense_items(
        &self,
        cancel: &CancellationToken,
    ) -> ExpenseResult<Vec<ExpenseItem>> {
        let gateway = Arc::clone(&self.gateway);
        self.coordinator
            .get_or_fetch(CacheKind::ExpenseItems, cancel, move |creds| {
                let gateway = Arc::clone(&gateway);
                async move { gateway.expense_items(&creds).await }
            })
            .await
    }

    /// Find a listed expense by full id or unique id prefix
    pub async fn find_expense_item(
        &self,
        cancel: &CancellationToken,
        needle: &str,
    ) -> ExpenseResult<ExpenseItem> {
        let needle = needle.trim();
        let items = self.expense_items(cancel).await?;

        if let Some(exact) = items.iter().find(|i| i.id.as_str() == needle) {
            return Ok(exact.clone());
        }

        let mut matches = items.into_iter().filter(|i| i.id.as_str().starts_with(needle));
        match (matches.next(), matches.next()) {
            (Some(item), None) if !needle.is_empty() => Ok(item),
            (Some(_), Some(_)) => Err(ExpenseError::Validation(format!(
                "Id prefix '{}' matches more than one expense",
                needle
            ))),
            _ => Err(ExpenseError::expense_item_not_found(needle)),
        }
    }

    pub async fn insert_expense_item(
        &self,
        cancel: &CancellationToken,
        input: CreateExpenseItemInput,
    ) -> ExpenseResult<ExpenseItem> {
        let item = match input.date {
            Some(date) => ExpenseItem::with_date(input.amount, input.description, date),
            None => ExpenseItem::new(input.amount, input.description),
        };
        validate(&item)?;

        let gateway = Arc::clone(&self.gateway);
        let audit = self.audit.clone();
        self.coordinator
            .mutate(cancel, &CacheKind::EXPENSE_ITEM_MUTATION, move |creds| {
                let gateway = Arc::clone(&gateway);
                let audit = audit.clone();
                let item = item.clone();
                async move {
                    let stored = gateway.insert_expense_item(&creds, &item).await?;
                    info!(id = %stored.id, amount = %stored.amount, "Inserted expense item");
                    record(
                        audit,
                        AuditEntry::create(
                            EntityType::ExpenseItem,
                            stored.id.as_str(),
                            Some(stored.description.clone()),
                            &stored,
                        ),
                    )
                    .await;
                    Ok(stored)
                }
            })
            .await
    }

    /// Apply `input` to the listed expense `id`
    pub async fn update_expense_item(
        &self,
        cancel: &CancellationToken,
        id: &ExpenseItemId,
        input: UpdateExpenseItemInput,
    ) -> ExpenseResult<ExpenseItem> {
        if input.is_empty() {
            return Err(ExpenseError::Validation("Nothing to update".into()));
        }

        let before = self.find_expense_item(cancel, id.as_str()).await?;
        let mut item = before.clone();
        if let Some(amount) = input.amount {
            item.amount = amount;
        }
        if let Some(description) = input.description {
            item.description = description.trim().to_string();
        }
        if let Some(date) = input.date {
            item.date = date;
        }
        validate(&item)?;

        let gateway = Arc::clone(&self.gateway);
        let audit = self.audit.clone();
        self.coordinator
            .mutate(cancel, &CacheKind::EXPENSE_ITEM_MUTATION, move |creds| {
                let gateway = Arc::clone(&gateway);
                let audit = audit.clone();
                let before = before.clone();
                let item = item.clone();
                async move {
                    let stored = gateway.update_expense_item(&creds, &item).await?;
                    info!(id = %stored.id, "Updated expense item");
                    record(
                        audit,
                        AuditEntry::update(
                            EntityType::ExpenseItem,
                            stored.id.as_str(),
                            Some(stored.description.clone()),
                            Some(&before),
                            &stored,
                        ),
                    )
                    .await;
                    Ok(stored)
                }
            })
            .await
    }

    pub async fn delete_expense_item(
        &self,
        cancel: &CancellationToken,
        id: &ExpenseItemId,
    ) -> ExpenseResult<()> {
        let snapshot = self
            .coordinator
            .peek::<Vec<ExpenseItem>>(CacheKind::ExpenseItems)
            .and_then(|items| items.into_iter().find(|i| &i.id == id));

        let gateway = Arc::clone(&self.gateway);
        let audit = self.audit.clone();
        let id = id.clone();
        self.coordinator
            .mutate(cancel, &CacheKind::EXPENSE_ITEM_MUTATION, move |creds| {
                let gateway = Arc::clone(&gateway);
                let audit = audit.clone();
                let snapshot = snapshot.clone();
                let id = id.clone();
                async move {
                    gateway.delete_expense_item(&creds, &id).await?;
                    info!(%id, "Deleted expense item");
                    record(
                        audit,
                        AuditEntry::delete(
                            EntityType::ExpenseItem,
                            id.as_str(),
                            snapshot.as_ref().map(|i| i.description.clone()),
                            snapshot.as_ref(),
                        ),
                    )
                    .await;
                    Ok(())
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditLogger, Operation};
    use crate::auth::{AuthenticationSession, IdentityProvider, LocalIdentityProvider};
    use crate::cache::CacheState;
    use crate::config::TrackerPaths;
    use crate::gateway::LocalGateway;
    use tempfile::TempDir;

    fn session_in(temp_dir: &TempDir) -> ExpenseSession {
        let paths = TrackerPaths::with_base_dir(temp_dir.path().to_path_buf());
        let gateway = Arc::new(LocalGateway::open(&paths).unwrap());
        let provider: Arc<dyn IdentityProvider> = Arc::new(LocalIdentityProvider::new("me"));
        ExpenseSession::new(gateway, AuthenticationSession::new(provider, None))
            .with_audit(AuditLogger::new(paths.audit_log()))
    }

    fn coffee() -> CreateExpenseItemInput {
        CreateExpenseItemInput {
            amount: Money::from_cents(1234),
            description: "Coffee".into(),
            date: None,
        }
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected_before_sending() {
        let temp_dir = TempDir::new().unwrap();
        let session = session_in(&temp_dir);
        let view = session.open_view();

        let cases = [
            (Money::zero(), "Coffee".to_string()),
            (Money::from_cents(100_000_001), "Coffee".to_string()),
            (Money::from_cents(100), "   ".to_string()),
            (Money::from_cents(100), "x".repeat(201)),
        ];
        for (amount, description) in cases {
            let err = session
                .insert_expense_item(
                    view.token(),
                    CreateExpenseItemInput {
                        amount,
                        description,
                        date: None,
                    },
                )
                .await
                .unwrap_err();
            assert!(err.is_validation(), "{:?}", err);
        }

        // Nothing was sent, so no sign-in happened either
        assert!(!session.auth().is_authenticated());
    }

    #[tokio::test]
    async fn test_limits_are_inclusive() {
        let temp_dir = TempDir::new().unwrap();
        let session = session_in(&temp_dir);
        let view = session.open_view();

        let item = session
            .insert_expense_item(
                view.token(),
                CreateExpenseItemInput {
                    amount: Money::from_cents(100_000_000),
                    description: format!("  {}  ", "y".repeat(200)),
                    date: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(item.description.len(), 200);
    }

    #[tokio::test]
    async fn test_update_changes_fields_and_audits() {
        let temp_dir = TempDir::new().unwrap();
        let session = session_in(&temp_dir);
        let view = session.open_view();

        let item = session.insert_expense_item(view.token(), coffee()).await.unwrap();
        let updated = session
            .update_expense_item(
                view.token(),
                &item.id,
                UpdateExpenseItemInput {
                    amount: Some(Money::from_cents(450)),
                    ..UpdateExpenseItemInput::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.amount, Money::from_cents(450));
        assert_eq!(updated.description, "Coffee");

        let entries = AuditLogger::new(temp_dir.path().join("audit.log"))
            .read_all()
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].operation, Operation::Update);
        assert_eq!(entries[1].changed_fields, vec!["amount".to_string()]);
    }

    #[tokio::test]
    async fn test_update_unknown_item_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let session = session_in(&temp_dir);
        let view = session.open_view();

        let err = session
            .update_expense_item(
                view.token(),
                &ExpenseItemId::from("missing"),
                UpdateExpenseItemInput {
                    description: Some("Tea".into()),
                    ..UpdateExpenseItemInput::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_find_by_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let session = session_in(&temp_dir);
        let view = session.open_view();

        let item = session.insert_expense_item(view.token(), coffee()).await.unwrap();
        let found = session
            .find_expense_item(view.token(), item.id.short())
            .await
            .unwrap();
        assert_eq!(found.id, item.id);
    }

    #[tokio::test]
    async fn test_delete_invalidates_list_and_summaries() {
        let temp_dir = TempDir::new().unwrap();
        let session = session_in(&temp_dir);
        let view = session.open_view();

        let item = session.insert_expense_item(view.token(), coffee()).await.unwrap();
        session.expense_items(view.token()).await.unwrap();
        session.expense_period_summaries(view.token()).await.unwrap();
        session.current_expense_period_summary(view.token()).await.unwrap();

        session.delete_expense_item(view.token(), &item.id).await.unwrap();
        let coordinator = session.coordinator();
        for kind in CacheKind::EXPENSE_ITEM_MUTATION {
            assert_eq!(coordinator.state(kind), CacheState::Empty);
        }
        assert!(session.expense_items(view.token()).await.unwrap().is_empty());

        let entries = AuditLogger::new(temp_dir.path().join("audit.log"))
            .read_all()
            .unwrap();
        assert_eq!(entries.last().unwrap().operation, Operation::Delete);
        assert_eq!(entries.last().unwrap().entity_name.as_deref(), Some("Coffee"));
    }
}
