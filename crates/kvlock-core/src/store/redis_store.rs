//! Redis-backed key-value store
//!
//! Conditional create maps onto `SET key value NX PX ttl` and conditional
//! delete onto a Lua script, which Redis runs without interleaving any other
//! client's commands.
//!
//! | Deployment | Mutual exclusion |
//! |------------|------------------|
//! | Single instance | Strong |
//! | Sentinel / Cluster | Weak: a lock may be lost during failover |

use async_trait::async_trait;
use kvlock_common::{StoreError, StoreResult};
use redis::aio::ConnectionManager;
use redis::{ErrorKind, RedisError, Script};
use tracing::info;

use super::KeyValueStore;

const COMPARE_AND_DELETE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

/// `KeyValueStore` over a single Redis endpoint.
///
/// Cloning is cheap: clones share one multiplexed, auto-reconnecting connection.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    compare_and_delete: Script,
}

impl RedisStore {
    /// Connect to the Redis server at `url` (e.g. `redis://127.0.0.1:6379`)
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url).map_err(map_redis_error)?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(map_redis_error)?;

        info!(addr = %client_addr(url), "Connected to redis store");
        Ok(Self::from_connection(connection))
    }

    /// Wrap an existing connection manager
    pub fn from_connection(connection: ConnectionManager) -> Self {
        Self {
            connection,
            compare_and_delete: Script::new(COMPARE_AND_DELETE_SCRIPT),
        }
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl_ms: u64,
    ) -> StoreResult<bool> {
        let mut connection = self.connection.clone();

        // Nil reply means the key already exists
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut connection)
            .await
            .map_err(map_redis_error)?;

        match reply.as_deref() {
            Some("OK") => Ok(true),
            None => Ok(false),
            Some(other) => Err(StoreError::UnexpectedReply(other.to_string())),
        }
    }

    async fn compare_and_delete(&self, key: &str, expected_value: &str) -> StoreResult<u64> {
        let mut connection = self.connection.clone();

        let deleted: u64 = self
            .compare_and_delete
            .key(key)
            .arg(expected_value)
            .invoke_async(&mut connection)
            .await
            .map_err(map_redis_error)?;

        Ok(deleted)
    }
}

fn map_redis_error(err: RedisError) -> StoreError {
    if err.is_io_error()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.is_timeout()
    {
        return StoreError::Unavailable(err.to_string());
    }

    match err.kind() {
        ErrorKind::TypeError => StoreError::UnexpectedReply(err.to_string()),
        _ => StoreError::Script(err.to_string()),
    }
}

/// Strip credentials from a connection URL before logging it
fn client_addr(url: &str) -> &str {
    match url.rsplit_once('@') {
        Some((_, addr)) => addr,
        None => url.split_once("://").map(|(_, addr)| addr).unwrap_or(url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_addr() {
        assert_eq!(client_addr("redis://127.0.0.1:6379"), "127.0.0.1:6379");
        assert_eq!(client_addr("redis://:secret@cache:6379/0"), "cache:6379/0");
        assert_eq!(client_addr("cache:6379"), "cache:6379");
    }

    #[test]
    fn test_map_redis_error() {
        let io = RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(matches!(map_redis_error(io), StoreError::Unavailable(_)));

        let type_error = RedisError::from((ErrorKind::TypeError, "not an integer"));
        assert!(matches!(
            map_redis_error(type_error),
            StoreError::UnexpectedReply(_)
        ));
    }
}
