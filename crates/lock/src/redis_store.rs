//! Redis coordination store.
//!
//! Acquisition is `SET key token NX PX ttl`; release runs a Lua script so
//! the compare and the delete happen atomically on the server.

use std::time::Duration;

use async_trait::async_trait;
use redis::{Client, Script, aio::ConnectionManager};
use tracing::info;

use crate::{CoordinationStore, Result};

const COMPARE_AND_DELETE: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
"#;

pub struct RedisCoordinationStore {
    conn: ConnectionManager,
    release: Script,
}

impl RedisCoordinationStore {
    /// Connects to Redis.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g., redis://localhost:6379)
    pub async fn new(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        info!(url = %url, "Connected to Redis for locks");

        Ok(Self {
            conn,
            release: Script::new(COMPARE_AND_DELETE),
        })
    }
}

#[async_trait]
impl CoordinationStore for RedisCoordinationStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis)
            .query_async(&mut conn)
            .await?;

        Ok(reply.is_some())
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let mut conn = self.conn.clone();

        let deleted: i64 = self
            .release
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;

        Ok(deleted == 1)
    }
}
