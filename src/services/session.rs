//! Long-lived session object
//!
//! `ExpenseSession` owns the coordinator, the authentication session, the
//! gateway and the audit logger. It outlives the views that use it; each
//! view gets a [`ViewScope`] whose token is cancelled when the view goes
//! away.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::view::ViewScope;
use crate::audit::{AuditEntry, AuditLogger, EntityType};
use crate::auth::{AuthenticationSession, Credentials};
use crate::cache::{CacheKind, CachedQueryCoordinator};
use crate::error::ExpenseResult;
use crate::gateway::RemoteDataGateway;
use crate::models::{Account, CurrentExpensePeriodSummary, ExpensePeriodSummary, UserProfile};

/// View-model shared by every view of a signed-in user
pub struct ExpenseSession {
    pub(super) coordinator: CachedQueryCoordinator,
    pub(super) gateway: Arc<dyn RemoteDataGateway>,
    pub(super) audit: Option<AuditLogger>,
    lifetime: CancellationToken,
}

impl ExpenseSession {
    pub fn new(gateway: Arc<dyn RemoteDataGateway>, auth: AuthenticationSession) -> Self {
        Self {
            coordinator: CachedQueryCoordinator::new(auth),
            gateway,
            audit: None,
            lifetime: CancellationToken::new(),
        }
    }

    /// Record successful mutations in `logger`
    pub fn with_audit(mut self, logger: AuditLogger) -> Self {
        self.audit = Some(logger);
        self
    }

    pub fn coordinator(&self) -> &CachedQueryCoordinator {
        &self.coordinator
    }

    pub fn auth(&self) -> &AuthenticationSession {
        self.coordinator.auth()
    }

    /// Scope for one view; cancelled when the view closes or this session
    /// is closed
    pub fn open_view(&self) -> ViewScope {
        ViewScope::new(self.lifetime.child_token())
    }

    /// Sign in if needed and return the active credential
    pub async fn sign_in(&self) -> ExpenseResult<Credentials> {
        self.auth().ensure_authenticated().await
    }

    /// The caller's profile, created on first use
    pub async fn user_profile(&self, cancel: &CancellationToken) -> ExpenseResult<UserProfile> {
        let gateway = Arc::clone(&self.gateway);
        let audit = self.audit.clone();

        self.coordinator
            .get_or_fetch(CacheKind::UserProfile, cancel, move |creds| {
                let gateway = Arc::clone(&gateway);
                let audit = audit.clone();
                async move {
                    if let Some(profile) = gateway.user_profiles(&creds).await?.into_iter().next() {
                        return Ok(profile);
                    }

                    let created = gateway
                        .insert_user_profile(&creds, &UserProfile::new())
                        .await?;
                    info!(profile_id = %created.id, "Created user profile");
                    record(
                        audit,
                        AuditEntry::create(
                            EntityType::UserProfile,
                            created.id.as_str(),
                            None,
                            &created,
                        ),
                    )
                    .await;
                    Ok(created)
                }
            })
            .await
    }

    /// The account expenses are booked against; `None` if the user has none
    pub async fn account(&self, cancel: &CancellationToken) -> ExpenseResult<Option<Account>> {
        let gateway = Arc::clone(&self.gateway);
        self.coordinator
            .get_or_fetch(CacheKind::Account, cancel, move |creds| {
                let gateway = Arc::clone(&gateway);
                async move { Ok(gateway.accounts(&creds).await?.into_iter().next()) }
            })
            .await
    }

    pub async fn expense_period_summaries(
        &self,
        cancel: &CancellationToken,
    ) -> ExpenseResult<Vec<ExpensePeriodSummary>> {
        let gateway = Arc::clone(&self.gateway);
        self.coordinator
            .get_or_fetch(CacheKind::ExpensePeriodSummaries, cancel, move |creds| {
                let gateway = Arc::clone(&gateway);
                async move { gateway.expense_period_summaries(&creds).await }
            })
            .await
    }

    pub async fn current_expense_period_summary(
        &self,
        cancel: &CancellationToken,
    ) -> ExpenseResult<CurrentExpensePeriodSummary> {
        let gateway = Arc::clone(&self.gateway);
        self.coordinator
            .get_or_fetch(CacheKind::CurrentExpensePeriodSummary, cancel, move |creds| {
                let gateway = Arc::clone(&gateway);
                async move { gateway.current_expense_period_summary(&creds).await }
            })
            .await
    }

    /// Drop a cached query so the next read fetches it again
    pub fn invalidate(&self, kind: CacheKind) {
        self.coordinator.invalidate(kind);
    }

    /// Forget the credential and everything cached for it
    pub fn sign_out(&self) -> ExpenseResult<()> {
        self.coordinator.invalidate_all();
        self.auth().sign_out()
    }

    /// End the session, cancelling every open view
    pub fn close(&self) {
        self.lifetime.cancel();
    }
}

impl Drop for ExpenseSession {
    fn drop(&mut self) {
        self.lifetime.cancel();
    }
}

/// Append to the audit log on the blocking pool; the mutation already
/// happened, so a write failure is only logged
pub(super) async fn record(audit: Option<AuditLogger>, entry: AuditEntry) {
    let Some(logger) = audit else {
        return;
    };
    let entity_id = entry.entity_id.clone();
    match tokio::task::spawn_blocking(move || logger.log(&entry)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, %entity_id, "Failed to write audit entry"),
        Err(e) => warn!(error = %e, %entity_id, "Audit write task failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{IdentityProvider, LocalIdentityProvider};
    use crate::config::TrackerPaths;
    use crate::gateway::LocalGateway;
    use crate::models::{AccountId, ExpensePeriod, Money};
    use tempfile::TempDir;

    fn local_session(temp_dir: &TempDir) -> (ExpenseSession, Arc<LocalGateway>) {
        let paths = TrackerPaths::with_base_dir(temp_dir.path().to_path_buf());
        let gateway = Arc::new(LocalGateway::open(&paths).unwrap());
        let provider: Arc<dyn IdentityProvider> = Arc::new(LocalIdentityProvider::new("me"));
        let session = ExpenseSession::new(gateway.clone(), AuthenticationSession::new(provider, None))
            .with_audit(AuditLogger::new(paths.audit_log()));
        (session, gateway)
    }

    #[tokio::test]
    async fn test_user_profile_is_created_once() {
        let temp_dir = TempDir::new().unwrap();
        let (session, _) = local_session(&temp_dir);
        let view = session.open_view();

        let first = session.user_profile(view.token()).await.unwrap();
        session.invalidate(CacheKind::UserProfile);
        let second = session.user_profile(view.token()).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.user_id.as_deref(), Some("me"));

        let audit = AuditLogger::new(temp_dir.path().join("audit.log"));
        assert_eq!(audit.read_all().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_account_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let (session, gateway) = local_session(&temp_dir);
        let view = session.open_view();

        assert!(session.account(view.token()).await.unwrap().is_none());

        gateway
            .insert_account(Account {
                id: AccountId::from("acct"),
                name: "Household".into(),
            })
            .unwrap();
        // Still the cached answer until invalidated
        assert!(session.account(view.token()).await.unwrap().is_none());
        session.invalidate(CacheKind::Account);
        assert_eq!(
            session.account(view.token()).await.unwrap().unwrap().name,
            "Household"
        );
    }

    #[tokio::test]
    async fn test_closing_session_cancels_views() {
        let temp_dir = TempDir::new().unwrap();
        let (session, _) = local_session(&temp_dir);
        let view = session.open_view();

        session.close();
        assert!(view.is_closed());
        let result = session.current_expense_period_summary(view.token()).await;
        assert!(view.deliver(result).is_none());
    }

    #[tokio::test]
    async fn test_sign_out_clears_cache() {
        let temp_dir = TempDir::new().unwrap();
        let (session, gateway) = local_session(&temp_dir);
        let view = session.open_view();

        let creds = session.sign_in().await.unwrap();
        gateway
            .insert_expense_period(&creds, &ExpensePeriod::new(Money::from_cents(10_000)))
            .await
            .unwrap();
        session.expense_period_summaries(view.token()).await.unwrap();

        session.sign_out().unwrap();
        assert!(!session.auth().is_authenticated());
        assert_eq!(
            session.coordinator().state(CacheKind::ExpensePeriodSummaries),
            crate::cache::CacheState::Empty
        );
    }
}
