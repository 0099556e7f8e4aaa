//! In-process stores for tests and single-process runs

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{KeyValueStore, QueueStore};
use crate::error::Result;

/// A map plus a FIFO queue held in memory
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    queue: Mutex<VecDeque<Vec<u8>>>,
    pushed: Notify,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued entries
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Raw value under `id`
    pub fn get(&self, id: &str) -> Option<Vec<u8>> {
        self.entries.lock().get(id).cloned()
    }

    fn pop_front(&self) -> Option<Vec<u8>> {
        self.queue.lock().pop_front()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn save(&self, id: &str, data: &[u8]) -> Result<()> {
        self.entries.lock().insert(id.to_string(), data.to_vec());
        Ok(())
    }

    async fn save_if_absent(&self, id: &str, data: &[u8]) -> Result<bool> {
        match self.entries.lock().entry(id.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(data.to_vec());
                Ok(true)
            }
        }
    }

    async fn load(&self, id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.get(id))
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn push(&self, data: &[u8]) -> Result<()> {
        self.queue.lock().push_back(data.to_vec());
        self.pushed.notify_one();
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(data) = self.pop_front() {
                return Ok(Some(data));
            }
            if tokio::time::timeout_at(deadline, self.pushed.notified())
                .await
                .is_err()
            {
                return Ok(self.pop_front());
            }
        }
    }
}
