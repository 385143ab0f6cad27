//! In-memory TTL counter cache.
//!
//! Fast, lossy view of the real-time counters: values vanish on restart and
//! on expiry, which is exactly the contract of the cache boundary. Atomic
//! per-key updates come from the map's entry API; expired entries are
//! dropped lazily on access and wholesale during scans.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tidemark_core::CounterCache;
use tidemark_domain::Result;

struct CacheEntry {
    value: i64,
    expires_at: Instant,
}

/// DashMap-backed expiring counters.
#[derive(Default)]
pub struct MemoryCounterCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCounterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (non-expired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|entry| entry.expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CounterCache for MemoryCounterCache {
    async fn increment(&self, key: &str, delta: i64, ttl: Duration) -> Result<i64> {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert(CacheEntry { value: 0, expires_at: now + ttl });

        // An expired entry restarts from zero instead of resurrecting the
        // stale total.
        if entry.expires_at <= now {
            entry.value = 0;
        }
        entry.value += delta;
        entry.expires_at = now + ttl;
        Ok(entry.value)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<BTreeMap<String, i64>> {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);

        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| (entry.key().clone(), entry.value))
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
