//! Offline asset cache.
//!
//! This module provides a cache-first shim that:
//! - Pre-populates a named cache with a fixed asset list on install (all or nothing)
//! - Serves stored responses on fetch without any freshness check
//! - Falls back to the network on a miss without storing the result

mod offline;
mod storage;
mod traits;

pub use offline::{CacheConfig, OfflineCache};
pub use storage::SqliteStore;
pub use traits::{Fetcher, Request, Response};
