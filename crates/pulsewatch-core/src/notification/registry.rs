//! Registered notifications, keyed by id

use std::sync::Arc;

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, warn};

use super::envelope;
use crate::db::KeyValueStore;
use crate::error::{Error, Result};
use crate::models::Notification;

const API_KEY_BYTES: usize = 13;

/// Notification definitions plus the api key guarding each one
#[derive(Clone)]
pub struct NotificationRegistry {
    store: Arc<dyn KeyValueStore>,
}

impl NotificationRegistry {
    /// Create a registry over `store`
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Store `notification` under `id` with the given key
    pub async fn register(&self, id: &str, api_key: &str, notification: &Notification) -> Result<()> {
        let entry = envelope::encode_entry(api_key, notification)?;
        self.store.save(id, entry.as_bytes()).await
    }

    /// The key and notification registered under `id`
    pub async fn fetch(&self, id: &str) -> Result<(String, Notification)> {
        match self.store.load(id).await? {
            Some(raw) => envelope::decode_entry(&raw),
            None => Err(Error::not_found("notification", id)),
        }
    }

    /// Register `notification`, keeping the key of an existing entry.
    ///
    /// A fresh key is generated when nothing readable is stored under `id`.
    /// First registrations are written only if the id is still free, so two
    /// concurrent registrations end up sharing one key.
    /// Store failures are returned as-is.
    pub async fn register_or_update(&self, id: &str, notification: &Notification) -> Result<String> {
        let api_key = match self.fetch(id).await {
            Ok((key, _)) => {
                debug!(id = %id, "Updating registered notification");
                key
            }
            Err(e) if e.is_not_found() => return self.register_new(id, notification).await,
            Err(e @ (Error::Encoding(_) | Error::UnsupportedType(_))) => {
                warn!(id = %id, error = %e, "Replacing unreadable registry entry");
                generate_api_key()
            }
            Err(e) => return Err(e),
        };

        self.register(id, &api_key, notification).await?;
        Ok(api_key)
    }

    async fn register_new(&self, id: &str, notification: &Notification) -> Result<String> {
        let api_key = generate_api_key();
        let entry = envelope::encode_entry(&api_key, notification)?;
        if self.store.save_if_absent(id, entry.as_bytes()).await? {
            return Ok(api_key);
        }

        let (existing, _) = self.fetch(id).await?;
        debug!(id = %id, "Registered concurrently, keeping existing key");
        self.register(id, &existing, notification).await?;
        Ok(existing)
    }
}

/// Random api key, hex-encoded
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; API_KEY_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
