//! Expense period operations

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::session::{record, ExpenseSession};
use crate::audit::{AuditEntry, EntityType};
use crate::cache::CacheKind;
use crate::error::{ExpenseError, ExpenseResult};
use crate::models::{ExpensePeriod, ExpensePeriodId, Money};

/// Input for scheduling a new period
#[derive(Debug, Clone)]
pub struct CreateExpensePeriodInput {
    pub amount_available: Money,
    /// Defaults to now
    pub start_date: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateExpensePeriodInput {
    pub amount_available: Option<Money>,
    pub start_date: Option<DateTime<FixedOffset>>,
}

fn validate(period: &ExpensePeriod) -> ExpenseResult<()> {
    period
        .validate()
        .map_err(|e| ExpenseError::Validation(format!("Amount available: {}", e)))
}

impl ExpenseSession {
    /// The 100 most recent periods, newest start first
    pub async fn expense_periods(
        &self,
        cancel: &CancellationToken,
    ) -> ExpenseResult<Vec<ExpensePeriod>> {
        let gateway = Arc::clone(&self.gateway);
        self.coordinator
            .get_or_fetch(CacheKind::ExpensePeriods, cancel, move |creds| {
                let gateway = Arc::clone(&gateway);
                async move { gateway.expense_periods(&creds).await }
            })
            .await
    }

    /// Find a listed period by full id or unique id prefix
    pub async fn find_expense_period(
        &self,
        cancel: &CancellationToken,
        needle: &str,
    ) -> ExpenseResult<ExpensePeriod> {
        let needle = needle.trim();
        let periods = self.expense_periods(cancel).await?;

        if let Some(exact) = periods.iter().find(|p| p.id.as_str() == needle) {
            return Ok(exact.clone());
        }

        let mut matches = periods
            .into_iter()
            .filter(|p| p.id.as_str().starts_with(needle));
        match (matches.next(), matches.next()) {
            (Some(period), None) if !needle.is_empty() => Ok(period),
            (Some(_), Some(_)) => Err(ExpenseError::Validation(format!(
                "Id prefix '{}' matches more than one period",
                needle
            ))),
            _ => Err(ExpenseError::expense_period_not_found(needle)),
        }
    }

    pub async fn insert_expense_period(
        &self,
        cancel: &CancellationToken,
        input: CreateExpensePeriodInput,
    ) -> ExpenseResult<ExpensePeriod> {
        let period = match input.start_date {
            Some(start) => ExpensePeriod::starting(input.amount_available, start),
            None => ExpensePeriod::new(input.amount_available),
        };
        validate(&period)?;

        let gateway = Arc::clone(&self.gateway);
        let audit = self.audit.clone();
        self.coordinator
            .mutate(cancel, &CacheKind::EXPENSE_PERIOD_MUTATION, move |creds| {
                let gateway = Arc::clone(&gateway);
                let audit = audit.clone();
                let period = period.clone();
                async move {
                    let stored = gateway.insert_expense_period(&creds, &period).await?;
                    info!(id = %stored.id, start = %stored.start_date, "Inserted expense period");
                    record(
                        audit,
                        AuditEntry::create(
                            EntityType::ExpensePeriod,
                            stored.id.as_str(),
                            None,
                            &stored,
                        ),
                    )
                    .await;
                    Ok(stored)
                }
            })
            .await
    }

    pub async fn update_expense_period(
        &self,
        cancel: &CancellationToken,
        id: &ExpensePeriodId,
        input: UpdateExpensePeriodInput,
    ) -> ExpenseResult<ExpensePeriod> {
        if input.amount_available.is_none() && input.start_date.is_none() {
            return Err(ExpenseError::Validation("Nothing to update".into()));
        }

        let before = self.find_expense_period(cancel, id.as_str()).await?;
        let mut period = before.clone();
        if let Some(amount) = input.amount_available {
            period.amount_available = amount;
        }
        if let Some(start) = input.start_date {
            period.start_date = start;
        }
        validate(&period)?;

        let gateway = Arc::clone(&self.gateway);
        let audit = self.audit.clone();
        self.coordinator
            .mutate(cancel, &CacheKind::EXPENSE_PERIOD_MUTATION, move |creds| {
                let gateway = Arc::clone(&gateway);
                let audit = audit.clone();
                let before = before.clone();
                let period = period.clone();
                async move {
                    let stored = gateway.update_expense_period(&creds, &period).await?;
                    info!(id = %stored.id, "Updated expense period");
                    record(
                        audit,
                        AuditEntry::update(
                            EntityType::ExpensePeriod,
                            stored.id.as_str(),
                            None,
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

    pub async fn delete_expense_period(
        &self,
        cancel: &CancellationToken,
        id: &ExpensePeriodId,
    ) -> ExpenseResult<()> {
        let snapshot = self
            .coordinator
            .peek::<Vec<ExpensePeriod>>(CacheKind::ExpensePeriods)
            .and_then(|periods| periods.into_iter().find(|p| &p.id == id));

        let gateway = Arc::clone(&self.gateway);
        let audit = self.audit.clone();
        let id = id.clone();
        self.coordinator
            .mutate(cancel, &CacheKind::EXPENSE_PERIOD_MUTATION, move |creds| {
                let gateway = Arc::clone(&gateway);
                let audit = audit.clone();
                let snapshot = snapshot.clone();
                let id = id.clone();
                async move {
                    gateway.delete_expense_period(&creds, &id).await?;
                    info!(%id, "Deleted expense period");
                    record(
                        audit,
                        AuditEntry::delete(EntityType::ExpensePeriod, id.as_str(), None, snapshot.as_ref()),
                    )
                    .await;
                    Ok(())
                }
            })
            .await
    }
}
