//! HTTP client for a remote notifier
//!
//! Lets a monitoring process register notifications with, and deliver them
//! through, a notifier running elsewhere.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HOST};
use reqwest::{Client, StatusCode};
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};
use crate::models::Notification;
use crate::notification::Delivery;

/// Client for the notifier HTTP API
pub struct NotifierClient {
    base: Url,
    http: Client,
    keys: Mutex<HashMap<String, String>>,
}

impl NotifierClient {
    /// Client for the notifier at `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| Error::validation(format!("notifier url {base_url}: {e}")))?;
        if base.host_str().is_none() {
            return Err(Error::validation(format!("notifier url {base_url} has no host")));
        }

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("http client: {e}")))?;

        Ok(Self {
            base,
            http,
            keys: Mutex::new(HashMap::new()),
        })
    }

    /// Remember the api key of a notification registered elsewhere
    pub fn remember_key(&self, id: impl Into<String>, api_key: impl Into<String>) {
        self.keys.lock().insert(id.into(), api_key.into());
    }

    /// Register `notification` under `id` and remember its api key
    pub async fn register(&self, id: &str, notification: &Notification) -> Result<String> {
        let mut url = self.base.clone();
        url.set_path(&format!("/internal/notification/{id}"));
        url.query_pairs_mut()
            .append_pair("type", notification.kind().api_name());

        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(notification.payload_json()?)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::transport(format!(
                "register {id} returned {status}: {}",
                body.trim()
            )));
        }

        let api_key = body.trim().to_string();
        self.remember_key(id, api_key.clone());
        info!(id = %id, "Registered notification with notifier");
        Ok(api_key)
    }

    /// Ask the notifier to deliver `id`, optionally overriding its text
    pub async fn trigger(&self, id: &str, text: Option<&str>) -> Result<()> {
        let api_key = self
            .keys
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found("api key", id))?;

        let host = self.base.host_str().unwrap_or_default();
        let mut request = self
            .http
            .post(self.base.clone())
            .header(HOST, format!("{id}.{host}"))
            .header(AUTHORIZATION, api_key);
        if let Some(text) = text.filter(|t| !t.is_empty()) {
            request = request.header("Text", text);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::not_found("notification", id));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::transport(format!(
                "trigger {id} returned {status}: {}",
                body.trim()
            )));
        }

        debug!(id = %id, "Notifier accepted trigger");
        Ok(())
    }
}

#[async_trait]
impl Delivery for NotifierClient {
    async fn deliver(&self, notification_id: &str) -> Result<()> {
        self.trigger(notification_id, None).await
    }
}
