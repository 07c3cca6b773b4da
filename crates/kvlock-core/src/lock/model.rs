//! Lock data model

use std::time::Duration;

use kvlock_common::{DEFAULT_POLL_INTERVAL_MS, LockError, LockResult};
use serde::{Deserialize, Serialize};

/// A lock held in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Caller-supplied name of the protected resource (without key prefix)
    pub lock_key: String,
    /// Value stored under the key; identifies this acquisition
    pub owner_token: String,
    /// Store-enforced expiration in milliseconds
    pub ttl_ms: u64,
}

impl LockRecord {
    pub fn new(lock_key: impl Into<String>, owner_token: impl Into<String>, ttl_ms: u64) -> Self {
        Self {
            lock_key: lock_key.into(),
            owner_token: owner_token.into(),
            ttl_ms,
        }
    }
}

/// Lock manager settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOptions {
    /// Interval between acquisition attempts
    pub poll_interval: Duration,
    /// Prepended to every lock key before it reaches the store
    pub key_prefix: String,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            key_prefix: String::new(),
        }
    }
}

impl LockOptions {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    pub(crate) fn validate(&self) -> LockResult<()> {
        if self.poll_interval < Duration::from_millis(1) {
            return Err(LockError::invalid("poll_interval must be at least 1ms"));
        }
        Ok(())
    }

    pub(crate) fn store_key(&self, lock_key: &str) -> String {
        format!("{}{}", self.key_prefix, lock_key)
    }
}

/// State of one `acquire` call. Never leaves the calling task.
#[derive(Debug)]
pub(crate) struct AcquisitionAttempt<'a> {
    pub store_key: String,
    pub owner_token: &'a str,
    pub ttl_ms: u64,
    /// Signed so the final decrement can go below zero
    pub remaining_wait_ms: i64,
    pub attempts: u32,
}

impl<'a> AcquisitionAttempt<'a> {
    pub fn new(store_key: String, owner_token: &'a str, ttl_ms: u64, max_wait_ms: u64) -> Self {
        Self {
            store_key,
            owner_token,
            ttl_ms,
            remaining_wait_ms: i64::try_from(max_wait_ms).unwrap_or(i64::MAX),
            attempts: 0,
        }
    }

    /// Charge one polling interval against the wait budget.
    ///
    /// Returns `false` once the budget is exhausted and no further attempt may be made.
    pub fn consume(&mut self, poll_interval_ms: u64) -> bool {
        let step = i64::try_from(poll_interval_ms).unwrap_or(i64::MAX);
        self.remaining_wait_ms = self.remaining_wait_ms.saturating_sub(step);
        self.remaining_wait_ms >= 0
    }
}
