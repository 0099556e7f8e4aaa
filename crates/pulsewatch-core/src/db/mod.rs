//! Storage layer for PulseWatch
//!
//! The pipeline only needs two primitives from its external store: a
//! key-value map and a blocking FIFO queue. Redis provides both in
//! production; [`MemoryStore`] provides them in-process.

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use self::redis::{RedisHashStore, RedisListQueue, RedisPool};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::RedisConfig;
use crate::error::Result;

/// Opaque values addressed by id
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Store `data` under `id`, overwriting any previous value
    async fn save(&self, id: &str, data: &[u8]) -> Result<()>;

    /// Store `data` under `id` unless a value is already there.
    /// Returns whether it was stored.
    async fn save_if_absent(&self, id: &str, data: &[u8]) -> Result<bool>;

    /// Value under `id`, if any
    async fn load(&self, id: &str) -> Result<Option<Vec<u8>>>;
}

/// FIFO queue of opaque entries
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Append an entry
    async fn push(&self, data: &[u8]) -> Result<()>;

    /// Remove the oldest entry, waiting up to `timeout` for one to arrive
    async fn pop(&self, timeout: Duration) -> Result<Option<Vec<u8>>>;
}

/// Store handles used by the pipeline
#[derive(Clone)]
pub struct Database {
    /// Registered notifications
    pub registry: Arc<dyn KeyValueStore>,
    /// Pending deliveries
    pub queue: Arc<dyn QueueStore>,
    /// Monitor and trigger histories
    pub status: Arc<dyn KeyValueStore>,
    redis: Option<RedisPool>,
}

impl Database {
    /// Connect every store to Redis
    pub fn redis(config: &RedisConfig) -> Result<Self> {
        let pool = RedisPool::new(config)?;

        Ok(Self {
            registry: Arc::new(pool.hash(&config.registry_key)),
            queue: Arc::new(pool.list(&config.queue_key)),
            status: Arc::new(pool.hash(&config.status_key)),
            redis: Some(pool),
        })
    }

    /// Keep everything in process memory
    pub fn in_memory() -> Self {
        Self {
            registry: Arc::new(MemoryStore::new()),
            queue: Arc::new(MemoryStore::new()),
            status: Arc::new(MemoryStore::new()),
            redis: None,
        }
    }

    /// Check store health
    pub async fn health_check(&self) -> Result<()> {
        if let Some(pool) = &self.redis {
            pool.health_check().await?;
        }
        Ok(())
    }
}
