//! Key-value store contract required by the lock protocol
//!
//! A store must offer exactly two operations, each atomic with respect to every
//! client of the store (not only within one process):
//! - conditional create with expiration (`SET key value NX PX ttl`)
//! - conditional delete (`if GET(key) == value then DEL(key)`)
//!
//! Splitting either operation into a read followed by a write reintroduces the
//! race the lock exists to prevent.

mod memory;
#[cfg(feature = "redis")]
mod redis_store;

use async_trait::async_trait;
use kvlock_common::StoreResult;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

/// Atomic primitives the lock manager needs from a key-value store
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Create `key` with `value` only if it does not exist, expiring after `ttl_ms`.
    ///
    /// Returns `true` if the key was created.
    async fn set_if_absent_with_ttl(&self, key: &str, value: &str, ttl_ms: u64)
    -> StoreResult<bool>;

    /// Delete `key` only if its current value equals `expected_value`.
    ///
    /// Returns 1 if the key was deleted, 0 otherwise.
    async fn compare_and_delete(&self, key: &str, expected_value: &str) -> StoreResult<u64>;
}
