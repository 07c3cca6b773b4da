//! Shared test helpers for lock protocol tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use kvlock_core::{KeyValueStore, MemoryStore, StoreError, StoreResult};

/// `MemoryStore` wrapper that counts calls and injects transport failures
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    set_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    /// Number of upcoming conditional sets that fail
    failing_sets: AtomicUsize,
    failing_deletes: AtomicBool,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_sets(&self, count: usize) {
        self.failing_sets.store(count, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.failing_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    fn unavailable() -> StoreError {
        StoreError::Unavailable("connection reset by peer".to_string())
    }
}

#[async_trait]
impl KeyValueStore for FaultyStore {
    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl_ms: u64,
    ) -> StoreResult<bool> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .failing_sets
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Self::unavailable());
        }

        self.inner.set_if_absent_with_ttl(key, value, ttl_ms).await
    }

    async fn compare_and_delete(&self, key: &str, expected_value: &str) -> StoreResult<u64> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);

        if self.failing_deletes.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }

        self.inner.compare_and_delete(key, expected_value).await
    }
}
