//! Lock acquire/release protocol
//!
//! Acquisition polls the store's atomic create-if-absent at a fixed interval
//! until it succeeds or the wait budget runs out. Release is a single atomic
//! compare-and-delete, so a caller can never remove a lock that has since
//! expired and been taken by someone else.
//!
//! # Caveats
//!
//! - The TTL must cover the whole critical section. If it lapses first, another
//!   caller can acquire the lock while the first still believes it holds it;
//!   there is no lease renewal and no fencing token.
//! - Waiters are not queued: after a release, whichever waiter polls first wins.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ::metrics::counter;
use kvlock_common::{LockError, LockResult};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::model::{AcquisitionAttempt, LockOptions, LockRecord};
use crate::metrics::{ACQUIRE_ATTEMPTS_TOTAL, ACQUIRE_TOTAL, RELEASE_TOTAL, STORE_ERRORS_TOTAL};
use crate::store::KeyValueStore;

/// Acquires and releases locks held in a `KeyValueStore`.
///
/// Holds no lock state of its own; every call is an independent exchange with
/// the store, so one manager can be shared freely between tasks.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn KeyValueStore>,
    options: LockOptions,
}

impl LockManager {
    /// Create a manager with the default 100ms polling interval
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            options: LockOptions::default(),
        }
    }

    pub fn with_options(store: Arc<dyn KeyValueStore>, options: LockOptions) -> LockResult<Self> {
        options.validate()?;
        Ok(Self { store, options })
    }

    pub fn options(&self) -> &LockOptions {
        &self.options
    }

    /// Generate a fresh owner token (UUID v4)
    pub fn new_owner_token() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Try to acquire `lock_key` for `owner_token`, waiting up to `max_wait_ms`.
    ///
    /// Returns `Ok(true)` once the lock is held and `Ok(false)` when the wait
    /// budget runs out. A `max_wait_ms` of 0 makes exactly one attempt. Store
    /// failures count as a failed attempt and are not reported separately.
    ///
    /// Dropping the returned future stops polling.
    pub async fn acquire(
        &self,
        lock_key: &str,
        owner_token: &str,
        ttl_ms: u64,
        max_wait_ms: u64,
    ) -> LockResult<bool> {
        self.acquire_with_cancel(
            lock_key,
            owner_token,
            ttl_ms,
            max_wait_ms,
            std::future::pending::<()>(),
        )
        .await
    }

    /// Like [`acquire`](Self::acquire), but aborts with [`LockError::Interrupted`]
    /// if `cancel` completes while waiting between attempts.
    pub async fn acquire_with_cancel<C>(
        &self,
        lock_key: &str,
        owner_token: &str,
        ttl_ms: u64,
        max_wait_ms: u64,
        cancel: C,
    ) -> LockResult<bool>
    where
        C: Future<Output = ()>,
    {
        validate_key(lock_key, owner_token)?;
        if ttl_ms == 0 {
            return Err(LockError::invalid("ttl_ms must be positive"));
        }

        tokio::pin!(cancel);

        let poll_interval = self.options.poll_interval;
        let poll_interval_ms = as_millis(poll_interval);
        let started = Instant::now();
        let mut attempt = AcquisitionAttempt::new(
            self.options.store_key(lock_key),
            owner_token,
            ttl_ms,
            max_wait_ms,
        );

        loop {
            attempt.attempts += 1;
            counter!(ACQUIRE_ATTEMPTS_TOTAL).increment(1);

            match self
                .store
                .set_if_absent_with_ttl(&attempt.store_key, attempt.owner_token, attempt.ttl_ms)
                .await
            {
                Ok(true) => {
                    counter!(ACQUIRE_TOTAL, "result" => "acquired").increment(1);
                    if attempt.attempts > 1 {
                        info!(
                            key = %attempt.store_key,
                            attempts = attempt.attempts,
                            waited_ms = as_millis(started.elapsed()),
                            "Lock acquired after waiting"
                        );
                    } else {
                        debug!(key = %attempt.store_key, ttl_ms, "Lock acquired");
                    }
                    return Ok(true);
                }
                Ok(false) => {
                    debug!(
                        key = %attempt.store_key,
                        remaining_wait_ms = attempt.remaining_wait_ms,
                        "Lock is held by another owner"
                    );
                }
                Err(e) => {
                    counter!(STORE_ERRORS_TOTAL, "op" => "set_if_absent").increment(1);
                    warn!(
                        key = %attempt.store_key,
                        remaining_wait_ms = attempt.remaining_wait_ms,
                        transient = e.is_transient(),
                        error = %e,
                        "Lock attempt failed on store error"
                    );
                }
            }

            if !attempt.consume(poll_interval_ms) {
                counter!(ACQUIRE_TOTAL, "result" => "timeout").increment(1);
                debug!(
                    key = %attempt.store_key,
                    attempts = attempt.attempts,
                    "Lock wait budget exhausted"
                );
                return Ok(false);
            }

            tokio::select! {
                biased;
                _ = &mut cancel => {
                    counter!(ACQUIRE_TOTAL, "result" => "interrupted").increment(1);
                    info!(
                        key = %attempt.store_key,
                        attempts = attempt.attempts,
                        "Lock acquisition interrupted"
                    );
                    return Err(LockError::Interrupted);
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }

    /// Release `lock_key` if it is still held by `owner_token`.
    ///
    /// Releasing a lock that expired or belongs to someone else is a no-op.
    /// Only a failure to reach the store is returned as an error; the call is
    /// never retried.
    pub async fn release(&self, lock_key: &str, owner_token: &str) -> LockResult<()> {
        validate_key(lock_key, owner_token)?;
        let store_key = self.options.store_key(lock_key);

        match self.store.compare_and_delete(&store_key, owner_token).await {
            Ok(0) => {
                counter!(RELEASE_TOTAL, "result" => "not_owner").increment(1);
                debug!(key = %store_key, "Lock not held by this owner, nothing to release");
            }
            Ok(_) => {
                counter!(RELEASE_TOTAL, "result" => "deleted").increment(1);
                debug!(key = %store_key, "Lock released");
            }
            Err(e) => {
                counter!(STORE_ERRORS_TOTAL, "op" => "compare_and_delete").increment(1);
                warn!(key = %store_key, error = %e, "Lock release failed on store error");
                return Err(e.into());
            }
        }

        Ok(())
    }

    /// Run `f` while holding `lock_key` under a freshly generated owner token.
    ///
    /// Returns `Ok(None)` if the lock could not be acquired within `max_wait_ms`.
    /// The lock is released once `f` completes; a failed release is logged and
    /// left to the TTL.
    pub async fn with_lock<F, Fut, T>(
        &self,
        lock_key: &str,
        ttl_ms: u64,
        max_wait_ms: u64,
        f: F,
    ) -> LockResult<Option<T>>
    where
        F: FnOnce(LockRecord) -> Fut,
        Fut: Future<Output = T>,
    {
        let owner_token = Self::new_owner_token();
        if !self
            .acquire(lock_key, &owner_token, ttl_ms, max_wait_ms)
            .await?
        {
            return Ok(None);
        }

        let output = f(LockRecord::new(lock_key, owner_token.as_str(), ttl_ms)).await;

        if let Err(e) = self.release(lock_key, &owner_token).await {
            warn!(key = %lock_key, error = %e, "Lock left to expire after failed release");
        }

        Ok(Some(output))
    }
}

/// Whole milliseconds, saturating at `u64::MAX`
fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn validate_key(lock_key: &str, owner_token: &str) -> LockResult<()> {
    if lock_key.is_empty() {
        return Err(LockError::invalid("lock_key must not be empty"));
    }
    if owner_token.is_empty() {
        return Err(LockError::invalid("owner_token must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::MemoryStore;

    fn test_manager() -> (Arc<MemoryStore>, LockManager) {
        let store = Arc::new(MemoryStore::new());
        let manager = LockManager::new(store.clone());
        (store, manager)
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let (store, manager) = test_manager();

        assert!(manager.acquire("key1", "owner1", 60_000, 0).await.unwrap());
        assert_eq!(store.get("key1"), Some("owner1".to_string()));

        manager.release("key1", "owner1").await.unwrap();
        assert_eq!(store.get("key1"), None);
    }

    #[tokio::test]
    async fn test_acquire_conflict() {
        let (_store, manager) = test_manager();

        assert!(manager.acquire("key1", "owner1", 60_000, 0).await.unwrap());
        // Not re-entrant: the same token is refused too
        assert!(!manager.acquire("key1", "owner1", 60_000, 0).await.unwrap());
        assert!(!manager.acquire("key1", "owner2", 60_000, 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_release_wrong_owner() {
        let (store, manager) = test_manager();

        assert!(manager.acquire("key1", "owner1", 60_000, 0).await.unwrap());
        manager.release("key1", "owner2").await.unwrap();
        assert_eq!(store.get("key1"), Some("owner1".to_string()));
    }

    #[tokio::test]
    async fn test_release_nonexistent() {
        let (_store, manager) = test_manager();
        assert!(manager.release("nonexistent", "owner1").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_after_expiry() {
        let (store, manager) = test_manager();

        assert!(manager.acquire("key1", "owner1", 100, 0).await.unwrap());
        // Waiting out the TTL lets the next poll succeed
        assert!(manager.acquire("key1", "owner2", 60_000, 500).await.unwrap());
        assert_eq!(store.get("key1"), Some("owner2".to_string()));
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let (store, manager) = test_manager();

        assert!(matches!(
            manager.acquire("key1", "owner1", 0, 0).await,
            Err(LockError::InvalidArgument(_))
        ));
        assert!(matches!(
            manager.acquire("", "owner1", 1000, 0).await,
            Err(LockError::InvalidArgument(_))
        ));
        assert!(matches!(
            manager.acquire("key1", "", 1000, 0).await,
            Err(LockError::InvalidArgument(_))
        ));
        assert!(matches!(
            manager.release("", "owner1").await,
            Err(LockError::InvalidArgument(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let store = Arc::new(MemoryStore::new());
        let options = LockOptions::default().with_poll_interval(Duration::ZERO);
        assert!(LockManager::with_options(store, options).is_err());
    }

    #[tokio::test]
    async fn test_key_prefix() {
        let store = Arc::new(MemoryStore::new());
        let options = LockOptions::default().with_key_prefix("lock:");
        let manager = LockManager::with_options(store.clone(), options).unwrap();

        assert!(manager.acquire("orders", "owner1", 60_000, 0).await.unwrap());
        assert_eq!(store.get("lock:orders"), Some("owner1".to_string()));
        assert_eq!(store.get("orders"), None);

        manager.release("orders", "owner1").await.unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_owner_tokens_are_unique() {
        let a = LockManager::new_owner_token();
        let b = LockManager::new_owner_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[tokio::test]
    async fn test_with_lock() {
        let (store, manager) = test_manager();

        let result = manager
            .with_lock("job", 60_000, 0, |record| {
                let store = store.clone();
                async move {
                    assert_eq!(store.get("job"), Some(record.owner_token.clone()));
                    record.lock_key
                }
            })
            .await
            .unwrap();

        assert_eq!(result, Some("job".to_string()));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_with_lock_contended() {
        let (_store, manager) = test_manager();
        assert!(manager.acquire("job", "other", 60_000, 0).await.unwrap());

        let result = manager
            .with_lock("job", 60_000, 0, |_| async { 42 })
            .await
            .unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_as_millis_saturates() {
        assert_eq!(as_millis(Duration::from_millis(250)), 250);
        assert_eq!(as_millis(Duration::from_micros(1_999)), 1);
        assert_eq!(as_millis(Duration::MAX), u64::MAX);
    }
}
