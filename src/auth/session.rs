//! Authentication session
//!
//! Holds the current bearer credential and serializes every login or
//! refresh so that concurrent callers share one pending operation.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use super::credentials::{Credentials, SessionStore};
use super::provider::IdentityProvider;
use crate::error::{ExpenseError, ExpenseResult};

type PendingAuth = Shared<BoxFuture<'static, ExpenseResult<Credentials>>>;

enum AuthOp {
    Login,
    Refresh(Credentials),
    RefreshOrLogin(Credentials),
}

/// The single in-flight login or refresh
struct PendingOp {
    id: u64,
    /// A bare silent refresh, with no login fallback of its own
    refresh_only: bool,
    fut: PendingAuth,
}

#[derive(Default)]
struct AuthState {
    current: Option<Credentials>,
    pending: Option<PendingOp>,
    next_op: u64,
}

struct Inner {
    provider: Arc<dyn IdentityProvider>,
    store: Option<SessionStore>,
    state: Mutex<AuthState>,
}

/// Produces a valid bearer credential for every remote call
#[derive(Clone)]
pub struct AuthenticationSession {
    inner: Arc<Inner>,
}

impl AuthenticationSession {
    /// Create a session, restoring a persisted credential if `store` has one
    pub fn new(provider: Arc<dyn IdentityProvider>, store: Option<SessionStore>) -> Self {
        let current = match store.as_ref().map(SessionStore::load) {
            Some(Ok(Some(creds))) => {
                debug!(user_id = %creds.user_id, "Restored persisted session");
                Some(creds)
            }
            Some(Err(e)) => {
                warn!(error = %e, "Ignoring unreadable session file");
                None
            }
            _ => None,
        };

        Self {
            inner: Arc::new(Inner {
                provider,
                store,
                state: Mutex::new(AuthState {
                    current,
                    ..AuthState::default()
                }),
            }),
        }
    }

    /// The credential in use, if signed in
    pub fn current(&self) -> Option<Credentials> {
        self.inner.lock().ok().and_then(|s| s.current.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.current().is_some()
    }

    /// Return the current credential, running an interactive login first if
    /// there is none
    ///
    /// Callers arriving while a login is underway wait for that login instead
    /// of prompting again.
    pub async fn ensure_authenticated(&self) -> ExpenseResult<Credentials> {
        let op = {
            let mut state = self.inner.lock()?;
            if let Some(creds) = &state.current {
                return Ok(creds.clone());
            }
            self.join_or_start(&mut state, AuthOp::Login)
        };
        op.await
    }

    /// Attempt a silent refresh of the current credential
    ///
    /// Returns whether a refreshed credential is now in place. Expected
    /// failures (no session, declined refresh) yield `false`.
    pub async fn refresh(&self) -> bool {
        let op = {
            let mut state = match self.inner.lock() {
                Ok(state) => state,
                Err(_) => return false,
            };
            let current = match &state.current {
                Some(creds) => creds.clone(),
                None => return false,
            };
            self.join_or_start(&mut state, AuthOp::Refresh(current))
        };

        match op.await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "Silent refresh failed");
                false
            }
        }
    }

    /// Replace a credential the backend rejected
    ///
    /// Tries a silent refresh first and falls back to interactive login. If
    /// another caller has already replaced `rejected`, the replacement is
    /// returned without another round trip.
    pub async fn reauthenticate(&self, rejected: &Credentials) -> ExpenseResult<Credentials> {
        let (op, joined_refresh) = {
            let mut state = self.inner.lock()?;
            match &state.current {
                Some(current) if current != rejected => return Ok(current.clone()),
                _ => {}
            }
            let joinable_refresh = state
                .pending
                .as_ref()
                .filter(|pending| pending.refresh_only)
                .map(|pending| pending.fut.clone());
            match joinable_refresh {
                Some(refresh) => (refresh, true),
                None => (
                    self.join_or_start(&mut state, AuthOp::RefreshOrLogin(rejected.clone())),
                    false,
                ),
            }
        };

        match op.await {
            Err(e) if joined_refresh => {
                warn!(error = %e, "Joined refresh failed; falling back to interactive login");
                let login = {
                    let mut state = self.inner.lock()?;
                    match &state.current {
                        Some(current) if current != rejected => return Ok(current.clone()),
                        _ => {}
                    }
                    self.join_or_start(&mut state, AuthOp::Login)
                };
                login.await
            }
            other => other,
        }
    }

    /// Forget the credential in memory and on disk
    pub fn sign_out(&self) -> ExpenseResult<()> {
        {
            let mut state = self.inner.lock()?;
            state.current = None;
            state.pending = None;
        }
        if let Some(store) = &self.inner.store {
            store.clear()?;
        }
        info!("Signed out");
        Ok(())
    }

    fn join_or_start(&self, state: &mut MutexGuard<'_, AuthState>, op: AuthOp) -> PendingAuth {
        if let Some(pending) = &state.pending {
            debug!("Joining in-flight authentication");
            return pending.fut.clone();
        }

        let id = state.next_op;
        state.next_op += 1;

        let refresh_only = matches!(op, AuthOp::Refresh(_));
        let inner = Arc::clone(&self.inner);
        let fut = async move {
            let result = match op {
                AuthOp::Login => inner.provider.login().await,
                AuthOp::Refresh(creds) => match inner.provider.refresh(&creds).await {
                    Ok(Some(renewed)) => Ok(renewed),
                    Ok(None) => Err(ExpenseError::Unauthorized("Refresh was declined".into())),
                    Err(e) => Err(e),
                },
                AuthOp::RefreshOrLogin(creds) => inner.refresh_or_login(&creds).await,
            };
            inner.finish(id, &result);
            result
        }
        .boxed()
        .shared();

        state.pending = Some(PendingOp {
            id,
            refresh_only,
            fut: fut.clone(),
        });
        fut
    }
}

impl Inner {
    fn lock(&self) -> ExpenseResult<MutexGuard<'_, AuthState>> {
        self.state
            .lock()
            .map_err(|_| ExpenseError::Internal("Authentication state lock poisoned".into()))
    }

    async fn refresh_or_login(&self, rejected: &Credentials) -> ExpenseResult<Credentials> {
        match self.provider.refresh(rejected).await {
            Ok(Some(renewed)) => {
                info!(user_id = %renewed.user_id, "Session refreshed");
                return Ok(renewed);
            }
            Ok(None) => warn!("Refresh declined; falling back to interactive login"),
            Err(e) => warn!(error = %e, "Refresh failed; falling back to interactive login"),
        }
        self.provider.login().await
    }

    /// Settle operation `id`; a stale operation (superseded by sign-out)
    /// leaves the state untouched
    fn finish(&self, id: u64, result: &ExpenseResult<Credentials>) {
        let mut state = match self.lock() {
            Ok(state) => state,
            Err(_) => return,
        };
        if !matches!(&state.pending, Some(pending) if pending.id == id) {
            debug!(op = id, "Discarding result of superseded authentication");
            return;
        }
        state.pending = None;

        if let Ok(creds) = result {
            state.current = Some(creds.clone());
            drop(state);
            if let Some(store) = &self.store {
                if let Err(e) = store.save(creds) {
                    warn!(error = %e, "Could not persist session");
                }
            }
        }
    }
}
