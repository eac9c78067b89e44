//! Redis-backed counter store.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use tracing::{debug, info};

use super::{CounterStore, StoreError, MAX_TTL};
use crate::config::StoreConfig;

/// Counter store backed by a shared Redis instance.
///
/// All gate replicas pointing at the same Redis database share counters.
/// The increment and its expiry are sent as a single `MULTI`/`EXEC`
/// transaction so a counter can never be left without a TTL.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    key_prefix: String,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

impl RedisStore {
    /// Connect to Redis using the store configuration.
    ///
    /// A configured `url` takes precedence over the host/port/db fields.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = match &config.url {
            Some(url) => {
                info!("Connecting to Redis counter store from URL");
                redis::Client::open(url.as_str())?
            }
            None => {
                info!(
                    host = %config.host,
                    port = config.port,
                    db = config.db,
                    "Connecting to Redis counter store"
                );
                redis::Client::open(ConnectionInfo {
                    addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
                    redis: RedisConnectionInfo {
                        db: config.db,
                        password: config.password.clone(),
                        ..Default::default()
                    },
                })?
            }
        };

        let connection = ConnectionManager::new(client).await?;

        Ok(Self {
            connection,
            key_prefix: config.key_prefix.clone(),
        })
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn get_int(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.connection.clone();
        let value: Option<i64> = conn.get(self.namespaced(key)).await?;
        Ok(value)
    }

    async fn increment_and_expire(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        let key = self.namespaced(key);
        let mut conn = self.connection.clone();

        let ttl_ms = expiry_millis(ttl);

        let (value, _expiry_set): (i64, i64) = redis::pipe()
            .atomic()
            .incr(&key, 1)
            .pexpire(&key, ttl_ms)
            .query_async(&mut conn)
            .await?;

        debug!(key = %key, value = value, ttl_ms = ttl_ms, "Incremented Redis counter");

        Ok(value)
    }
}

/// Millisecond argument for `PEXPIRE`, clamped to [`MAX_TTL`].
///
/// An out-of-range expiry fails at `EXEC` time after `INCR` has already
/// applied, which would leave the counter without a TTL.
fn expiry_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.min(MAX_TTL).as_millis()).unwrap_or(i64::MAX)
}
