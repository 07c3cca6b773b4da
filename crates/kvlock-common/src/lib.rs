//! kvlock Common - Shared error types and constants
//!
//! This crate provides the foundational types used across all kvlock components:
//! - Error taxonomy for lock operations and store adapters
//! - Default values shared by the library and the command line

pub mod error;

// Re-exports for convenience
pub use error::{LockError, LockResult, StoreError, StoreResult};

/// Fixed interval between successive acquisition attempts
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Lock time-to-live used when the caller does not specify one
pub const DEFAULT_LOCK_TTL_MS: u64 = 30_000;

/// Default wait budget (0 = attempt exactly once)
pub const DEFAULT_LOCK_WAIT_MS: u64 = 0;

/// Default store endpoint
pub const DEFAULT_STORE_URL: &str = "redis://127.0.0.1:6379";
