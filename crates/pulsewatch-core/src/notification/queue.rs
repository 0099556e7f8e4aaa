//! Pending deliveries

use std::sync::Arc;
use std::time::Duration;

use super::envelope;
use crate::db::QueueStore;
use crate::error::Result;
use crate::models::Notification;

/// FIFO of notifications waiting for the dispatch worker
#[derive(Clone)]
pub struct NotificationQueue {
    store: Arc<dyn QueueStore>,
}

impl NotificationQueue {
    /// Create a queue over `store`
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    /// Append a notification
    pub async fn enqueue(&self, notification: &Notification) -> Result<()> {
        let entry = envelope::encode_queued(notification)?;
        self.store.push(entry.as_bytes()).await
    }

    /// Take the oldest notification, waiting up to `timeout`
    pub async fn dequeue(&self, timeout: Duration) -> Result<Option<Notification>> {
        match self.store.pop(timeout).await? {
            Some(raw) => envelope::decode_queued(&raw).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::error::Error;
    use crate::models::WebhookNotification;

    fn webhook(message: &str) -> Notification {
        Notification::Webhook(WebhookNotification {
            url: "http://localhost/hook".into(),
            message: message.into(),
        })
    }

    #[tokio::test]
    async fn test_dequeue_in_enqueue_order() {
        let queue = NotificationQueue::new(Arc::new(MemoryStore::new()));
        let timeout = Duration::from_millis(10);

        queue.enqueue(&webhook("first")).await.unwrap();
        queue.enqueue(&webhook("second")).await.unwrap();

        assert_eq!(queue.dequeue(timeout).await.unwrap(), Some(webhook("first")));
        assert_eq!(queue.dequeue(timeout).await.unwrap(), Some(webhook("second")));
        assert_eq!(queue.dequeue(timeout).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_consumed_with_error() {
        let store = Arc::new(MemoryStore::new());
        let queue = NotificationQueue::new(store.clone());
        store.push(b"slack:not-base64!").await.unwrap();

        let err = queue.dequeue(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, Error::Encoding(_)));
        assert_eq!(store.pending(), 0);
    }
}
