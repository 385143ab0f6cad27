//! Port interface for the optional real-time counter cache.
//!
//! The cache is a fast, lossy view of the same counters the durable store
//! keeps: absent or unreachable, the pipeline must keep working with metrics
//! persisting to the store only.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tidemark_domain::Result;

/// Expiring integer counters with atomic increment and prefix scans.
#[async_trait]
pub trait CounterCache: Send + Sync {
    /// Atomically add `delta` to `key` and (re)arm its expiry.
    /// Returns the post-increment value.
    async fn increment(&self, key: &str, delta: i64, ttl: Duration) -> Result<i64>;

    /// All live counters whose key starts with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> Result<BTreeMap<String, i64>>;

    /// Connectivity probe (`PING`-equivalent).
    async fn ping(&self) -> Result<()>;
}
