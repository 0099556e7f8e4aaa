//! Queue consumer executing pending notifications

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::NotificationSender;
use crate::error::{Error, Result};
use crate::models::Notification;
use crate::notification::NotificationQueue;

const STORE_BACKOFF: Duration = Duration::from_secs(1);

/// Single consumer of the notification queue
pub struct DispatchWorker {
    queue: NotificationQueue,
    sender: Arc<NotificationSender>,
    pop_timeout: Duration,
}

impl DispatchWorker {
    /// Create a worker
    pub fn new(queue: NotificationQueue, sender: Arc<NotificationSender>, pop_timeout: Duration) -> Self {
        Self {
            queue,
            sender,
            pop_timeout,
        }
    }

    /// Drain the queue until `shutdown` is cancelled.
    ///
    /// Each entry gets exactly one delivery attempt. Failures are logged and
    /// the loop moves on to the next entry. Shutdown is checked between pops:
    /// a pop in flight is finished and its entry delivered, so stopping takes
    /// up to one `pop_timeout`.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Dispatch worker started");

        while !shutdown.is_cancelled() {
            let next = self.queue.dequeue(self.pop_timeout).await;

            match next {
                Ok(Some(notification)) => self.dispatch(&notification).await,
                Ok(None) => {}
                Err(e @ (Error::Encoding(_) | Error::UnsupportedType(_))) => {
                    warn!(error = %e, "Dropping unreadable queue entry");
                }
                Err(e) => {
                    error!(error = %e, "Failed to pop notification queue");
                    tokio::select! {
                        () = shutdown.cancelled() => break,
                        () = tokio::time::sleep(STORE_BACKOFF) => {}
                    }
                }
            }
        }

        info!("Dispatch worker stopped");
    }

    /// Process at most one queued notification. Returns whether one was taken.
    pub async fn run_once(&self) -> Result<bool> {
        match self.queue.dequeue(self.pop_timeout).await? {
            Some(notification) => {
                self.dispatch(&notification).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn dispatch(&self, notification: &Notification) {
        let target = notification.target();
        debug!(destination = %target, "Dispatching notification");

        match AssertUnwindSafe(self.sender.execute(notification))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(destination = %target, error = %e, "Notification delivery failed"),
            Err(_) => error!(destination = %target, "Notification delivery panicked"),
        }
    }
}
