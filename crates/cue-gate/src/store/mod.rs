//! Key-value state seam.
//!
//! Every piece of shared per-identity and per-challenge state goes through
//! [`StateStore`]. Two backends exist:
//! - `MemoryStore` - process-local maps (single node, tests)
//! - `RedisStore` - shared Redis instance (clustered deployments)
//!
//! Both must yield the same observable semantics; the tests below run the same
//! assertions against each backend.

mod memory;
mod redis_backend;

pub use memory::MemoryStore;
pub use redis_backend::RedisStore;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for cue_common::VerifyError {
    fn from(err: StoreError) -> Self {
        cue_common::VerifyError::Internal(err.to_string())
    }
}

/// Abstract counter / lockout / record store
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Increment a counter, setting `ttl_ms` expiry when the counter is created
    async fn incr(&self, key: &str, ttl_ms: u64) -> Result<u64, StoreError>;

    /// Record a hit at `now_ms` and return the number of hits in the trailing
    /// `window_ms` (the new hit included)
    async fn hit_window(&self, key: &str, now_ms: i64, window_ms: u64) -> Result<u64, StoreError>;

    /// Set a value with expiry, overwriting any previous value
    async fn set_ex(&self, key: &str, value: &str, ttl_ms: u64) -> Result<(), StoreError>;

    /// Set a value with expiry only if the key is absent.
    /// Returns true if this call created the key.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_ms: u64) -> Result<bool, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Connectivity check
    async fn ping(&self) -> Result<(), StoreError>;

    /// Drop expired entries. Backends with native expiry have nothing to do.
    async fn purge_expired(&self) -> Result<usize, StoreError> {
        Ok(0)
    }

    /// Backend name for logs
    fn backend(&self) -> &'static str;
}

/// Open the configured backend: Redis when a URL is given, memory otherwise
pub async fn connect(redis_url: Option<&str>) -> Result<Arc<dyn StateStore>> {
    match redis_url {
        Some(url) => Ok(Arc::new(RedisStore::connect(url).await?)),
        None => Ok(Arc::new(MemoryStore::new())),
    }
}
