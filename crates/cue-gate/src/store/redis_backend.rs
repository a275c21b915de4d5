//! Redis store backend.

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::{StateStore, StoreError};

/// Redis-backed store shared by every node of a deployment
pub struct RedisStore {
    /// Connection manager (auto-reconnecting)
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis with a connection manager (handles reconnection)
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("Failed to create Redis client")?;

        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        Ok(Self { conn })
    }
}

#[async_trait]
impl StateStore for RedisStore {
    async fn incr(&self, key: &str, ttl_ms: u64) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let count: u64 = conn.incr(key, 1).await?;

        // Set expiry on first increment
        if count == 1 {
            conn.pexpire::<_, ()>(key, ttl_ms as i64).await?;
        }

        Ok(count)
    }

    async fn hit_window(&self, key: &str, now_ms: i64, window_ms: u64) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let cutoff = now_ms - window_ms as i64;
        // Members must be unique or same-millisecond hits collapse
        let member = format!("{}-{:016x}", now_ms, rand::random::<u64>());

        let (count,): (u64,) = redis::pipe()
            .atomic()
            .zrembyscore(key, "-inf", format!("({}", cutoff))
            .ignore()
            .zadd(key, member, now_ms)
            .ignore()
            .zcard(key)
            .pexpire(key, window_ms as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_ms: u64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.pset_ex::<_, _, ()>(key, value, ttl_ms).await?;
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_ms: u64) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        // SET NX replies OK on success and nil when the key exists
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;

        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
