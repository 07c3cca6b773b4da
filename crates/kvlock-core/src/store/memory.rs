// In-process key-value store
// Keys expire lazily on access, with an optional background sweeper

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use kvlock_common::StoreResult;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use super::KeyValueStore;

struct StoredValue {
    value: String,
    expires_at: Instant,
}

impl StoredValue {
    fn new(value: &str, ttl_ms: u64, now: Instant) -> Self {
        Self {
            value: value.to_string(),
            expires_at: now + Duration::from_millis(ttl_ms),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// `KeyValueStore` backed by a `DashMap`.
///
/// Atomicity holds per key: both operations run while holding the map shard
/// for that key. Only processes sharing this instance coordinate through it,
/// so it suits tests and single-process deployments.
pub struct MemoryStore {
    entries: Arc<DashMap<String, StoredValue>>,
    /// Background sweeper handle
    cleanup_handle: Option<JoinHandle<()>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            cleanup_handle: None,
        }
    }

    /// Start a background task that drops expired keys every `interval`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_cleanup(mut self, interval: Duration) -> Self {
        let entries = self.entries.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let before = entries.len();
                entries.retain(|_, stored| !stored.is_expired(now));
                let removed = before.saturating_sub(entries.len());
                if removed > 0 {
                    debug!(count = removed, "Cleaned up expired keys");
                }
            }
        });

        if let Some(previous) = self.cleanup_handle.replace(handle) {
            previous.abort();
        }
        self
    }

    /// Current value of a live key
    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|stored| !stored.is_expired(now))
            .map(|stored| stored.value.clone())
    }

    /// Remaining time-to-live of a live key
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|stored| !stored.is_expired(now))
            .map(|stored| stored.expires_at - now)
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        if let Some(handle) = self.cleanup_handle.take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl_ms: u64,
    ) -> StoreResult<bool> {
        let now = Instant::now();

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(StoredValue::new(value, ttl_ms, now));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredValue::new(value, ttl_ms, now));
                Ok(true)
            }
        }
    }

    async fn compare_and_delete(&self, key: &str, expected_value: &str) -> StoreResult<u64> {
        let now = Instant::now();

        let removed = self.entries.remove_if(key, |_, stored| {
            !stored.is_expired(now) && stored.value == expected_value
        });
        if removed.is_some() {
            return Ok(1);
        }

        // An expired key is already gone as far as callers can tell
        self.entries.remove_if(key, |_, stored| stored.is_expired(now));
        Ok(0)
    }
}
