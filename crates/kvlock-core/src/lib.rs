//! kvlock Core - Mutual exclusion backed by a shared key-value store
//!
//! This crate provides:
//! - The `KeyValueStore` contract (atomic set-if-absent and compare-and-delete)
//! - An in-process `MemoryStore` and a Redis-backed `RedisStore`
//! - `LockManager`, the polling acquire / ownership-checked release protocol
//! - Metric names published through the `metrics` facade
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use kvlock_core::{LockManager, RedisStore};
//!
//! let store = RedisStore::connect("redis://127.0.0.1:6379").await?;
//! let manager = LockManager::new(Arc::new(store));
//! let token = LockManager::new_owner_token();
//! if manager.acquire("orders", &token, 30_000, 1_000).await? {
//!     // critical section
//!     manager.release("orders", &token).await?;
//! }
//! ```

pub mod lock;
pub mod metrics;
pub mod store;

pub use kvlock_common::{LockError, LockResult, StoreError, StoreResult};

// Re-export lock types
pub use lock::{LockManager, LockOptions, LockRecord};

// Re-export stores
pub use store::{KeyValueStore, MemoryStore};

#[cfg(feature = "redis")]
pub use store::RedisStore;
