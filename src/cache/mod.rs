//! Client-side query cache
//!
//! - `CacheKind` / `CacheEntry`: the per-kind state machine
//! - `CachedQueryCoordinator`: single-flight fetches, invalidation and the
//!   re-authenticate-and-retry cycle

pub mod coordinator;
pub mod entry;

pub use coordinator::CachedQueryCoordinator;
pub use entry::{CacheEntry, CacheKind, CacheState};
