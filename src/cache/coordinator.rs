//! Single-flight query cache
//!
//! Concurrent requests for the same [`CacheKind`] share one fetch. The
//! in-flight fetch is memoized inside a short `std::sync::Mutex` critical
//! section before any `.await`, so a second caller always finds the first
//! caller's pending fetch instead of starting its own.
//!
//! Fetches run as spawned tasks. A caller whose cancellation token fires
//! stops waiting, but the fetch still completes and settles the cache for
//! everyone else. Each fetch carries its own token, cancelled only when the
//! last caller awaiting it has gone; a rejected credential is renewed as
//! long as someone is still waiting.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::entry::{CacheEntry, CacheKind, CacheState, SharedFetch};
use crate::auth::{AuthenticationSession, Credentials};
use crate::error::{ExpenseError, ExpenseResult};

/// A cache entry with its value type erased
trait ErasedEntry: Send {
    fn state(&self) -> CacheState;
    fn leave(&mut self, generation: u64);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Send + Sync + 'static> ErasedEntry for CacheEntry<T> {
    fn state(&self) -> CacheState {
        CacheEntry::state(self)
    }

    fn leave(&mut self, generation: u64) {
        CacheEntry::leave(self, generation)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

type Entries = HashMap<CacheKind, Box<dyn ErasedEntry>>;

fn entry_mut<T: Send + Sync + 'static>(
    entries: &mut Entries,
    kind: CacheKind,
) -> ExpenseResult<&mut CacheEntry<T>> {
    entries
        .entry(kind)
        .or_insert_with(|| Box::new(CacheEntry::<T>::Empty))
        .as_any_mut()
        .downcast_mut::<CacheEntry<T>>()
        .ok_or_else(|| {
            ExpenseError::Internal(format!("Cache kind '{}' holds a different value type", kind))
        })
}

struct Inner {
    auth: AuthenticationSession,
    entries: Mutex<Entries>,
    next_generation: AtomicU64,
}

/// One caller's claim on a pending fetch, released when the caller stops
/// waiting for any reason
struct Waiter {
    inner: Arc<Inner>,
    kind: CacheKind,
    generation: u64,
}

impl Drop for Waiter {
    fn drop(&mut self) {
        let mut entries = self
            .inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.get_mut(&self.kind) {
            entry.leave(self.generation);
        }
    }
}

/// Deduplicating cache with transparent re-authentication
#[derive(Clone)]
pub struct CachedQueryCoordinator {
    inner: Arc<Inner>,
}

impl CachedQueryCoordinator {
    pub fn new(auth: AuthenticationSession) -> Self {
        Self {
            inner: Arc::new(Inner {
                auth,
                entries: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    pub fn auth(&self) -> &AuthenticationSession {
        &self.inner.auth
    }

    /// Return the cached or in-flight value for `kind`, or start `fetch`
    ///
    /// `fetch` receives the credential to use and is retried once after
    /// re-authentication if it fails as unauthorized. A failed fetch leaves
    /// the entry empty and its error goes to every caller that joined it.
    ///
    /// Returns `ExpenseError::Cancelled` as soon as `cancel` fires.
    pub async fn get_or_fetch<T, F, Fut>(
        &self,
        kind: CacheKind,
        cancel: &CancellationToken,
        fetch: F,
    ) -> ExpenseResult<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(Credentials) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ExpenseResult<T>> + Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(ExpenseError::Cancelled);
        }

        let (pending, generation) = {
            let mut entries = self.inner.lock()?;
            let entry = entry_mut::<T>(&mut entries, kind)?;
            match entry {
                CacheEntry::Ready(value) => {
                    debug!(%kind, "Cache hit");
                    return Ok(value.clone());
                }
                CacheEntry::Pending {
                    fetch: in_flight,
                    generation,
                    waiters,
                    ..
                } => {
                    *waiters += 1;
                    debug!(%kind, generation = *generation, waiters = *waiters, "Joining in-flight fetch");
                    (in_flight.clone(), *generation)
                }
                CacheEntry::Empty => {
                    let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
                    let fetch_cancel = CancellationToken::new();
                    let shared = self.spawn_fetch(kind, generation, fetch_cancel.clone(), fetch);
                    *entry = CacheEntry::Pending {
                        generation,
                        fetch: shared.clone(),
                        waiters: 1,
                        cancel: fetch_cancel,
                    };
                    debug!(%kind, generation, "Fetch started");
                    (shared, generation)
                }
            }
        };

        let _waiter = Waiter {
            inner: Arc::clone(&self.inner),
            kind,
            generation,
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ExpenseError::Cancelled),
            result = pending => result,
        }
    }

    /// Drop any cached or in-flight entry for `kind`
    ///
    /// A fetch still running for the dropped entry finishes without
    /// touching the cache.
    pub fn invalidate(&self, kind: CacheKind) {
        // Clearing is always safe, even after a panic poisoned the lock
        let mut entries = self
            .inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if entries.remove(&kind).is_some() {
            debug!(%kind, "Cache invalidated");
        }
    }

    pub fn invalidate_many(&self, kinds: &[CacheKind]) {
        for kind in kinds {
            self.invalidate(*kind);
        }
    }

    pub fn invalidate_all(&self) {
        self.invalidate_many(&CacheKind::ALL);
    }

    /// Current state of `kind`
    pub fn state(&self, kind: CacheKind) -> CacheState {
        self.inner
            .lock()
            .ok()
            .and_then(|entries| entries.get(&kind).map(|e| e.state()))
            .unwrap_or(CacheState::Empty)
    }

    /// The ready value for `kind`, without fetching
    pub fn peek<T: Clone + Send + Sync + 'static>(&self, kind: CacheKind) -> Option<T> {
        let entries = self.inner.lock().ok()?;
        let entry = entries.get(&kind)?.as_any().downcast_ref::<CacheEntry<T>>()?;
        match entry {
            CacheEntry::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Run `action` with a valid credential, retrying once after
    /// re-authentication if it fails as unauthorized
    ///
    /// No recovery is attempted when `cancel` has already fired; the
    /// authorization error is returned as is. Any failure of the retry is
    /// returned unmodified.
    pub async fn execute_with_authorization<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        action: F,
    ) -> ExpenseResult<T>
    where
        F: Fn(Credentials) -> Fut,
        Fut: Future<Output = ExpenseResult<T>>,
    {
        self.inner.execute_with_authorization(cancel, action).await
    }

    /// Run a mutation, then drop every kind in `invalidates`
    ///
    /// The mutation runs as a spawned task so the invalidation happens even
    /// if the caller is cancelled mid-flight. Entries are dropped whatever
    /// the outcome, since a failed call may still have reached the backend.
    pub async fn mutate<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        invalidates: &[CacheKind],
        action: F,
    ) -> ExpenseResult<T>
    where
        T: Send + 'static,
        F: Fn(Credentials) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ExpenseResult<T>> + Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(ExpenseError::Cancelled);
        }

        let this = self.clone();
        let kinds = invalidates.to_vec();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let result = this.inner.execute_with_authorization(&token, action).await;
            this.invalidate_many(&kinds);
            result
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ExpenseError::Cancelled),
            joined = handle => joined
                .map_err(|e| ExpenseError::Internal(format!("Mutation task failed: {}", e)))?,
        }
    }

    fn spawn_fetch<T, F, Fut>(
        &self,
        kind: CacheKind,
        generation: u64,
        cancel: CancellationToken,
        fetch: F,
    ) -> SharedFetch<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(Credentials) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ExpenseResult<T>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let result = inner.execute_with_authorization(&cancel, fetch).await;
            inner.settle(kind, generation, &result);
            result
        });

        let inner = Arc::clone(&self.inner);
        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => {
                    let err = ExpenseError::Internal(format!("Fetch of {} failed: {}", kind, e));
                    inner.settle::<T>(kind, generation, &Err(err.clone()));
                    Err(err)
                }
            }
        }
        .boxed()
        .shared()
    }
}

impl Inner {
    fn lock(&self) -> ExpenseResult<MutexGuard<'_, Entries>> {
        self.entries
            .lock()
            .map_err(|_| ExpenseError::Internal("Cache lock poisoned".into()))
    }

    async fn execute_with_authorization<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        action: F,
    ) -> ExpenseResult<T>
    where
        F: Fn(Credentials) -> Fut,
        Fut: Future<Output = ExpenseResult<T>>,
    {
        let creds = self.auth.ensure_authenticated().await?;
        match action(creds.clone()).await {
            Err(e) if e.is_unauthorized() => {
                if cancel.is_cancelled() {
                    return Err(e);
                }
                warn!(error = %e, "Credential rejected; re-authenticating once");
                let renewed = self.auth.reauthenticate(&creds).await?;
                action(renewed).await
            }
            other => other,
        }
    }

    /// Move the entry out of `Pending` if it still belongs to `generation`
    fn settle<T: Clone + Send + Sync + 'static>(
        &self,
        kind: CacheKind,
        generation: u64,
        result: &ExpenseResult<T>,
    ) {
        let Ok(mut entries) = self.lock() else {
            return;
        };
        let Ok(entry) = entry_mut::<T>(&mut entries, kind) else {
            return;
        };
        if !entry.is_pending_for(generation) {
            debug!(%kind, generation, "Discarding result of invalidated fetch");
            return;
        }

        match result {
            Ok(value) => {
                *entry = CacheEntry::Ready(value.clone());
                debug!(%kind, generation, "Fetch completed");
            }
            Err(e) => {
                *entry = CacheEntry::Empty;
                warn!(%kind, error = %e, "Fetch failed; entry cleared");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{IdentityProvider, LocalIdentityProvider};
    use std::sync::atomic::AtomicUsize;
    use futures::future::BoxFuture;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn coordinator() -> CachedQueryCoordinator {
        let provider: Arc<dyn IdentityProvider> = Arc::new(LocalIdentityProvider::new("me"));
        CachedQueryCoordinator::new(AuthenticationSession::new(provider, None))
    }

    #[tokio::test]
    async fn test_ready_value_is_served_from_cache() {
        let coordinator = coordinator();
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let value = coordinator
                .get_or_fetch(CacheKind::Account, &cancel, move |_| {
                    let calls = calls.clone();
                    async move { Ok(calls.fetch_add(1, Ordering::SeqCst) + 10) }
                })
                .await
                .unwrap();
            assert_eq!(value, 10);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.state(CacheKind::Account), CacheState::Ready);
        assert_eq!(coordinator.peek::<usize>(CacheKind::Account), Some(10));
    }

    #[tokio::test]
    async fn test_cancelled_caller_does_not_stop_the_fetch() {
        let coordinator = coordinator();
        let release = Arc::new(Notify::new());
        let view = CancellationToken::new();

        let waiter = {
            let coordinator = coordinator.clone();
            let release = release.clone();
            let view = view.clone();
            tokio::spawn(async move {
                coordinator
                    .get_or_fetch(CacheKind::ExpenseItems, &view, move |_| {
                        let release = release.clone();
                        async move {
                            release.notified().await;
                            Ok(vec![1u32, 2, 3])
                        }
                    })
                    .await
            })
        };

        while coordinator.state(CacheKind::ExpenseItems) != CacheState::Pending {
            tokio::task::yield_now().await;
        }
        view.cancel();
        assert_eq!(waiter.await.unwrap(), Err(ExpenseError::Cancelled));

        release.notify_one();
        tokio::time::timeout(Duration::from_secs(5), async {
            while coordinator.state(CacheKind::ExpenseItems) != CacheState::Ready {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(
            coordinator.peek::<Vec<u32>>(CacheKind::ExpenseItems),
            Some(vec![1, 2, 3])
        );
    }

    fn expiring_fetch(
        release: Arc<Notify>,
        attempts: Arc<AtomicUsize>,
    ) -> impl Fn(Credentials) -> BoxFuture<'static, ExpenseResult<u32>> + Clone + Send + Sync + 'static
    {
        move |_| {
            let release = release.clone();
            let attempts = attempts.clone();
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    release.notified().await;
                    return Err(ExpenseError::Unauthorized("expired".into()));
                }
                Ok(42)
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_joined_caller_keeps_recovery_when_starter_cancels() {
        let coordinator = coordinator();
        let release = Arc::new(Notify::new());
        let attempts = Arc::new(AtomicUsize::new(0));
        let fetch = expiring_fetch(release.clone(), attempts.clone());
        let starter = CancellationToken::new();
        let joiner = CancellationToken::new();

        let first = {
            let coordinator = coordinator.clone();
            let starter = starter.clone();
            let fetch = fetch.clone();
            tokio::spawn(async move {
                coordinator
                    .get_or_fetch(CacheKind::Account, &starter, fetch)
                    .await
            })
        };
        while coordinator.state(CacheKind::Account) != CacheState::Pending {
            tokio::task::yield_now().await;
        }

        let second = {
            let coordinator = coordinator.clone();
            let joiner = joiner.clone();
            tokio::spawn(async move {
                coordinator
                    .get_or_fetch(CacheKind::Account, &joiner, fetch)
                    .await
            })
        };
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        starter.cancel();
        assert_eq!(first.await.unwrap(), Err(ExpenseError::Cancelled));

        release.notify_one();
        assert_eq!(second.await.unwrap(), Ok(42));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(coordinator.peek::<u32>(CacheKind::Account), Some(42));
    }

    #[tokio::test]
    async fn test_abandoned_fetch_skips_recovery() {
        let coordinator = coordinator();
        let release = Arc::new(Notify::new());
        let attempts = Arc::new(AtomicUsize::new(0));
        let view = CancellationToken::new();

        let waiter = {
            let coordinator = coordinator.clone();
            let view = view.clone();
            let fetch = expiring_fetch(release.clone(), attempts.clone());
            tokio::spawn(async move {
                coordinator
                    .get_or_fetch(CacheKind::Account, &view, fetch)
                    .await
            })
        };
        while coordinator.state(CacheKind::Account) != CacheState::Pending {
            tokio::task::yield_now().await;
        }
        view.cancel();
        assert_eq!(waiter.await.unwrap(), Err(ExpenseError::Cancelled));

        release.notify_one();
        tokio::time::timeout(Duration::from_secs(5), async {
            while coordinator.state(CacheKind::Account) != CacheState::Empty {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidated_fetch_does_not_overwrite_newer_state() {
        let coordinator = coordinator();
        let cancel = CancellationToken::new();
        let release = Arc::new(Notify::new());

        let slow = {
            let coordinator = coordinator.clone();
            let release = release.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                coordinator
                    .get_or_fetch(CacheKind::ExpensePeriods, &cancel, move |_| {
                        let release = release.clone();
                        async move {
                            release.notified().await;
                            Ok("stale")
                        }
                    })
                    .await
            })
        };

        while coordinator.state(CacheKind::ExpensePeriods) != CacheState::Pending {
            tokio::task::yield_now().await;
        }
        coordinator.invalidate(CacheKind::ExpensePeriods);

        let fresh = coordinator
            .get_or_fetch(CacheKind::ExpensePeriods, &cancel, |_| async { Ok("fresh") })
            .await
            .unwrap();
        assert_eq!(fresh, "fresh");

        release.notify_one();
        assert_eq!(slow.await.unwrap().unwrap(), "stale");
        assert_eq!(
            coordinator.peek::<&str>(CacheKind::ExpensePeriods),
            Some("fresh")
        );
    }

    #[tokio::test]
    async fn test_already_cancelled_caller_starts_nothing() {
        let coordinator = coordinator();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = coordinator
            .get_or_fetch(CacheKind::UserProfile, &cancel, |_| async { Ok(1u8) })
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(coordinator.state(CacheKind::UserProfile), CacheState::Empty);
    }

    #[tokio::test]
    async fn test_unauthorized_after_cancel_is_not_recovered() {
        let coordinator = coordinator();
        let cancel = CancellationToken::new();
        let attempts = Arc::new(AtomicUsize::new(0));

        let result = coordinator
            .execute_with_authorization(&cancel, |_| {
                let attempts = attempts.clone();
                let cancel = cancel.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    cancel.cancel();
                    Err::<(), _>(ExpenseError::Unauthorized("expired".into()))
                }
            })
            .await;

        assert!(result.unwrap_err().is_unauthorized());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_unauthorized_is_propagated() {
        let coordinator = coordinator();
        let cancel = CancellationToken::new();
        let attempts = Arc::new(AtomicUsize::new(0));

        let result = coordinator
            .execute_with_authorization(&cancel, |_| {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ExpenseError::Unauthorized("still expired".into()))
                }
            })
            .await;

        assert_eq!(
            result,
            Err(ExpenseError::Unauthorized("still expired".into()))
        );
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_mismatched_value_type_is_internal_error() {
        let coordinator = coordinator();
        let cancel = CancellationToken::new();
        coordinator
            .get_or_fetch(CacheKind::Account, &cancel, |_| async { Ok(1u32) })
            .await
            .unwrap();

        let err = coordinator
            .get_or_fetch(CacheKind::Account, &cancel, |_| async { Ok("text") })
            .await
            .unwrap_err();
        assert!(matches!(err, ExpenseError::Internal(_)));
    }

    #[tokio::test]
    async fn test_mutation_invalidates_listed_kinds() {
        let coordinator = coordinator();
        let cancel = CancellationToken::new();
        for kind in CacheKind::EXPENSE_ITEM_MUTATION {
            coordinator
                .get_or_fetch(kind, &cancel, |_| async { Ok(0u8) })
                .await
                .unwrap();
        }
        coordinator
            .get_or_fetch(CacheKind::ExpensePeriods, &cancel, |_| async { Ok(0u8) })
            .await
            .unwrap();

        coordinator
            .mutate(&cancel, &CacheKind::EXPENSE_ITEM_MUTATION, |_| async { Ok(()) })
            .await
            .unwrap();

        for kind in CacheKind::EXPENSE_ITEM_MUTATION {
            assert_eq!(coordinator.state(kind), CacheState::Empty);
        }
        assert_eq!(coordinator.state(CacheKind::ExpensePeriods), CacheState::Ready);
    }
}
