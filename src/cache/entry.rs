//! Per-kind cache entries
//!
//! Each cached query kind moves through `Empty -> Pending -> Ready`.
//! Invalidation returns any state to `Empty`; a failed fetch returns
//! `Pending` to `Empty` so errors are never cached.

use std::fmt;

use futures::future::{BoxFuture, Shared};
use tokio_util::sync::CancellationToken;

use crate::error::ExpenseResult;

/// The queries the coordinator caches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKind {
    UserProfile,
    Account,
    ExpenseItems,
    ExpensePeriods,
    ExpensePeriodSummaries,
    CurrentExpensePeriodSummary,
}

impl CacheKind {
    pub const ALL: [CacheKind; 6] = [
        CacheKind::UserProfile,
        CacheKind::Account,
        CacheKind::ExpenseItems,
        CacheKind::ExpensePeriods,
        CacheKind::ExpensePeriodSummaries,
        CacheKind::CurrentExpensePeriodSummary,
    ];

    /// Kinds to drop after an expense item insert, update or delete
    pub const EXPENSE_ITEM_MUTATION: [CacheKind; 3] = [
        CacheKind::ExpenseItems,
        CacheKind::ExpensePeriodSummaries,
        CacheKind::CurrentExpensePeriodSummary,
    ];

    /// Kinds to drop after an expense period insert, update or delete
    pub const EXPENSE_PERIOD_MUTATION: [CacheKind; 3] = [
        CacheKind::ExpensePeriods,
        CacheKind::ExpensePeriodSummaries,
        CacheKind::CurrentExpensePeriodSummary,
    ];
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CacheKind::UserProfile => "user profile",
            CacheKind::Account => "account",
            CacheKind::ExpenseItems => "expense items",
            CacheKind::ExpensePeriods => "expense periods",
            CacheKind::ExpensePeriodSummaries => "expense period summaries",
            CacheKind::CurrentExpensePeriodSummary => "current expense period summary",
        };
        f.write_str(name)
    }
}

/// A fetch every caller of one kind can await
pub type SharedFetch<T> = Shared<BoxFuture<'static, ExpenseResult<T>>>;

/// State of one cache kind
pub enum CacheEntry<T> {
    Empty,
    /// A fetch is in flight; only the fetch started for `generation` may
    /// settle this entry
    Pending {
        generation: u64,
        fetch: SharedFetch<T>,
        /// Callers still awaiting `fetch`
        waiters: usize,
        /// Cancelled once `waiters` drops to zero
        cancel: CancellationToken,
    },
    Ready(T),
}

impl<T> CacheEntry<T> {
    pub fn state(&self) -> CacheState {
        match self {
            CacheEntry::Empty => CacheState::Empty,
            CacheEntry::Pending { .. } => CacheState::Pending,
            CacheEntry::Ready(_) => CacheState::Ready,
        }
    }

    /// Whether this entry is waiting on the fetch tagged `generation`
    pub fn is_pending_for(&self, generation: u64) -> bool {
        matches!(self, CacheEntry::Pending { generation: g, .. } if *g == generation)
    }

    /// One awaiter of the `generation` fetch stopped waiting
    ///
    /// The fetch keeps running either way; once nobody is left its token is
    /// cancelled so it skips re-authentication.
    pub fn leave(&mut self, generation: u64) {
        if let CacheEntry::Pending {
            generation: g,
            waiters,
            cancel,
            ..
        } = self
        {
            if *g != generation {
                return;
            }
            *waiters = waiters.saturating_sub(1);
            if *waiters == 0 {
                cancel.cancel();
            }
        }
    }
}

impl<T> Default for CacheEntry<T> {
    fn default() -> Self {
        CacheEntry::Empty
    }
}

/// Observable state of a cache kind, without its value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Empty,
    Pending,
    Ready,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[test]
    fn test_state_and_generation_match() {
        let fetch: SharedFetch<u32> = async { Ok(1) }.boxed().shared();
        let entry = CacheEntry::Pending {
            generation: 7,
            fetch,
            waiters: 1,
            cancel: CancellationToken::new(),
        };
        assert_eq!(entry.state(), CacheState::Pending);
        assert!(entry.is_pending_for(7));
        assert!(!entry.is_pending_for(8));

        let ready = CacheEntry::Ready(3u32);
        assert_eq!(ready.state(), CacheState::Ready);
        assert!(!ready.is_pending_for(7));
        assert_eq!(CacheEntry::<u32>::default().state(), CacheState::Empty);
    }

    #[test]
    fn test_last_waiter_leaving_cancels_the_fetch_token() {
        let cancel = CancellationToken::new();
        let mut entry = CacheEntry::Pending {
            generation: 3,
            fetch: async { Ok(1u32) }.boxed().shared(),
            waiters: 2,
            cancel: cancel.clone(),
        };

        entry.leave(4);
        entry.leave(3);
        assert!(!cancel.is_cancelled());
        entry.leave(3);
        assert!(cancel.is_cancelled());

        let mut ready = CacheEntry::Ready(1u32);
        ready.leave(3);
        assert_eq!(ready.state(), CacheState::Ready);
    }

    #[test]
    fn test_mutation_maps_cover_summaries() {
        for kinds in [
            CacheKind::EXPENSE_ITEM_MUTATION,
            CacheKind::EXPENSE_PERIOD_MUTATION,
        ] {
            assert!(kinds.contains(&CacheKind::ExpensePeriodSummaries));
            assert!(kinds.contains(&CacheKind::CurrentExpensePeriodSummary));
        }
        assert!(CacheKind::EXPENSE_ITEM_MUTATION.contains(&CacheKind::ExpenseItems));
        assert!(!CacheKind::EXPENSE_ITEM_MUTATION.contains(&CacheKind::ExpensePeriods));
    }
}
