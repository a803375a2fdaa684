//! Per-view cancellation scope

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ExpenseError, ExpenseResult};

/// Handle a view holds for as long as it is on screen
///
/// Every fetch or mutation the view starts takes [`ViewScope::token`].
/// Closing or dropping the scope cancels that token; fetches other callers
/// share keep running.
#[derive(Debug)]
pub struct ViewScope {
    token: CancellationToken,
}

impl ViewScope {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn close(&self) {
        self.token.cancel();
    }

    /// Gate a result on the view still being alive
    ///
    /// `None` means there is nothing to show: the view is gone or the call
    /// was cancelled. Cancellation never reaches the view as an error.
    pub fn deliver<T>(&self, result: ExpenseResult<T>) -> Option<ExpenseResult<T>> {
        if self.is_closed() {
            debug!("Dropping result for closed view");
            return None;
        }
        match result {
            Err(ExpenseError::Cancelled) => None,
            other => Some(other),
        }
    }
}

impl Drop for ViewScope {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
