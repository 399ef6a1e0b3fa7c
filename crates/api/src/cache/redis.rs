//! Redis cache backend.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use redis::AsyncCommands;

use super::CacheStore;

/// Redis implementation of [`CacheStore`]. TTL enforcement is delegated to
/// the store itself.
#[derive(Clone)]
pub struct RedisCache {
    client: redis::Client,
}

impl RedisCache {
    /// Open a client and verify connectivity with a PING before accepting
    /// the backend.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        anyhow::ensure!(pong == "PONG", "unexpected PING response: {pong}");

        Ok(Self { client })
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn ping(&self) -> Result<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let result: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(result == "PONG")
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_string(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        match ttl {
            Some(ttl) if ttl.as_secs() > 0 => {
                let _: () = conn.set_ex(key, value, ttl.as_secs()).await?;
            }
            _ => {
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        // TTL returns -1 for "no expiry" and -2 for "no such key".
        let ttl: i64 = redis::cmd("TTL").arg(key).query_async(&mut conn).await?;
        if ttl <= 0 {
            return Ok(None);
        }
        Ok(Some(Duration::from_secs(ttl as u64)))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }
}
