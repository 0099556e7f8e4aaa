//! Redis-backed stores

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, PoolConfig as PoolSize, Runtime};
use redis::AsyncCommands;

use super::{KeyValueStore, QueueStore};
use crate::config::RedisConfig;
use crate::error::{Error, Result};

/// Redis connection pool
#[derive(Clone)]
pub struct RedisPool {
    pool: Pool,
}

impl RedisPool {
    /// Create a new Redis connection pool
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let mut cfg = PoolConfig::from_url(&config.url);
        cfg.pool = Some(PoolSize::new(config.max_connections.max(1)));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Error::config(format!("redis pool: {e}")))?;

        Ok(Self { pool })
    }

    /// Health check
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    /// Hash-backed key-value store on `hash_key`
    pub fn hash(&self, hash_key: impl Into<String>) -> RedisHashStore {
        RedisHashStore {
            pool: self.pool.clone(),
            hash_key: hash_key.into(),
        }
    }

    /// List-backed queue on `list_key`
    pub fn list(&self, list_key: impl Into<String>) -> RedisListQueue {
        RedisListQueue {
            pool: self.pool.clone(),
            list_key: list_key.into(),
        }
    }
}

/// Key-value store over the fields of one Redis hash
#[derive(Clone)]
pub struct RedisHashStore {
    pool: Pool,
    hash_key: String,
}

#[async_trait]
impl KeyValueStore for RedisHashStore {
    async fn save(&self, id: &str, data: &[u8]) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let _: () = conn.hset(&self.hash_key, id, data).await?;
        Ok(())
    }

    async fn save_if_absent(&self, id: &str, data: &[u8]) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let stored: bool = conn.hset_nx(&self.hash_key, id, data).await?;
        Ok(stored)
    }

    async fn load(&self, id: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.pool.get().await?;
        let value: Option<Vec<u8>> = conn.hget(&self.hash_key, id).await?;
        Ok(value)
    }
}

/// FIFO queue over one Redis list (LPUSH in, BRPOP out)
#[derive(Clone)]
pub struct RedisListQueue {
    pool: Pool,
    list_key: String,
}

#[async_trait]
impl QueueStore for RedisListQueue {
    async fn push(&self, data: &[u8]) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let _: () = conn.lpush(&self.list_key, data).await?;
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let mut conn = self.pool.get().await?;
        // BRPOP treats 0 as "block forever"
        let seconds = timeout.as_secs().max(1);
        let popped: Option<(String, Vec<u8>)> = redis::cmd("BRPOP")
            .arg(&self.list_key)
            .arg(seconds)
            .query_async(&mut conn)
            .await?;
        Ok(popped.map(|(_, data)| data))
    }
}
