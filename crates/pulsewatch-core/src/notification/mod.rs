//! Notification registry and delivery queue
//!
//! A notification is registered once under an id and receives an api key.
//! Delivering it means looking it up and appending it to the queue that the
//! dispatch worker drains.

pub mod envelope;
mod queue;
mod registry;

pub use queue::NotificationQueue;
pub use registry::{generate_api_key, NotificationRegistry};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::Notification;

/// Hands a registered notification to the dispatch queue
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Deliver the notification registered under `notification_id`
    async fn deliver(&self, notification_id: &str) -> Result<()>;
}

/// Registration and triggering over one registry and queue
#[derive(Clone)]
pub struct NotificationHub {
    registry: NotificationRegistry,
    queue: NotificationQueue,
}

impl NotificationHub {
    /// Create a hub
    pub fn new(registry: NotificationRegistry, queue: NotificationQueue) -> Self {
        Self { registry, queue }
    }

    /// Create a hub over the registry and queue stores of `db`
    pub fn from_database(db: &Database) -> Self {
        Self::new(
            NotificationRegistry::new(db.registry.clone()),
            NotificationQueue::new(db.queue.clone()),
        )
    }

    /// The underlying registry
    pub fn registry(&self) -> &NotificationRegistry {
        &self.registry
    }

    /// The underlying queue
    pub fn queue(&self) -> &NotificationQueue {
        &self.queue
    }

    /// Register or update `notification` under `id`, returning its api key
    pub async fn register(&self, id: &str, notification: &Notification) -> Result<String> {
        let api_key = self.registry.register_or_update(id, notification).await?;
        info!(id = %id, kind = %notification.kind(), "Notification registered");
        Ok(api_key)
    }

    /// Enqueue the notification under `id` once the caller proves the key.
    ///
    /// A non-empty `text` replaces the notification's message for this
    /// delivery only.
    pub async fn trigger(&self, id: &str, presented_key: Option<&str>, text: Option<&str>) -> Result<()> {
        let (api_key, notification) = self.registry.fetch(id).await?;

        if presented_key != Some(api_key.as_str()) {
            warn!(id = %id, "Rejected trigger with wrong api key");
            return Err(Error::Auth(format!("invalid api key for notification {id}")));
        }

        let notification = match text {
            Some(text) if !text.is_empty() => notification.with_text(text),
            _ => notification,
        };

        self.queue.enqueue(&notification).await?;
        info!(id = %id, destination = %notification.target(), "Notification reserved");
        Ok(())
    }
}

#[async_trait]
impl Delivery for NotificationHub {
    async fn deliver(&self, notification_id: &str) -> Result<()> {
        let (_, notification) = self.registry.fetch(notification_id).await?;
        self.queue.enqueue(&notification).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SlackNotification;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_millis(10);

    fn slack() -> Notification {
        Notification::Slack(SlackNotification {
            authorization: "xoxb-1".into(),
            channel: "#ops".into(),
            text: "default".into(),
        })
    }

    #[tokio::test]
    async fn test_trigger_checks_key_and_applies_text() {
        let hub = NotificationHub::from_database(&Database::in_memory());
        let key = hub.register("alert1", &slack()).await.unwrap();

        let err = hub.trigger("alert1", Some("wrong"), None).await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        assert!(matches!(hub.trigger("alert1", None, None).await, Err(Error::Auth(_))));
        assert_eq!(hub.queue().dequeue(WAIT).await.unwrap(), None);

        hub.trigger("alert1", Some(&key), Some("disk full")).await.unwrap();
        assert_eq!(
            hub.queue().dequeue(WAIT).await.unwrap(),
            Some(slack().with_text("disk full"))
        );

        hub.trigger("alert1", Some(&key), Some("")).await.unwrap();
        assert_eq!(hub.queue().dequeue(WAIT).await.unwrap(), Some(slack()));
    }

    #[tokio::test]
    async fn test_trigger_unknown_id() {
        let hub = NotificationHub::from_database(&Database::in_memory());
        let err = hub.trigger("ghost", Some("key"), None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_local_delivery_skips_key_check() {
        let hub = NotificationHub::from_database(&Database::in_memory());
        hub.register("alert1", &slack()).await.unwrap();

        hub.deliver("alert1").await.unwrap();
        assert_eq!(hub.queue().dequeue(WAIT).await.unwrap(), Some(slack()));
        assert!(hub.deliver("ghost").await.unwrap_err().is_not_found());
    }
}
