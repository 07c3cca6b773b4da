//! Round trip against a live Redis server
//!
//! Run with: `KVLOCK_REDIS_URL=redis://127.0.0.1:6379 cargo test -- --ignored`

#![cfg(feature = "redis")]

use std::sync::Arc;

use kvlock_core::{KeyValueStore, LockManager, RedisStore};

fn redis_url() -> String {
    std::env::var("KVLOCK_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

#[tokio::test]
#[ignore = "requires a running redis server"]
async fn test_redis_store_primitives() {
    let store = RedisStore::connect(&redis_url()).await.unwrap();
    let key = format!("kvlock-test:{}", LockManager::new_owner_token());

    assert!(store.set_if_absent_with_ttl(&key, "a", 5000).await.unwrap());
    assert!(!store.set_if_absent_with_ttl(&key, "b", 5000).await.unwrap());

    assert_eq!(store.compare_and_delete(&key, "b").await.unwrap(), 0);
    assert_eq!(store.compare_and_delete(&key, "a").await.unwrap(), 1);
    assert_eq!(store.compare_and_delete(&key, "a").await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires a running redis server"]
async fn test_redis_lock_expiry() {
    let store = Arc::new(RedisStore::connect(&redis_url()).await.unwrap());
    let manager = LockManager::new(store);
    let key = format!("kvlock-test:{}", LockManager::new_owner_token());

    assert!(manager.acquire(&key, "token-a", 200, 0).await.unwrap());
    assert!(!manager.acquire(&key, "token-b", 5000, 0).await.unwrap());

    // Redis expires A's record; B gets in on a later poll
    assert!(manager.acquire(&key, "token-b", 5000, 1000).await.unwrap());

    manager.release(&key, "token-a").await.unwrap();
    assert!(!manager.acquire(&key, "token-c", 5000, 0).await.unwrap());

    manager.release(&key, "token-b").await.unwrap();
    assert!(manager.acquire(&key, "token-c", 5000, 0).await.unwrap());
    manager.release(&key, "token-c").await.unwrap();
}
