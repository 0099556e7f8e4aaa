//! Evaluates subscribed triggers against a fresh payload

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info};

use super::history::History;
use super::path;
use super::subscribers::Subscribers;
use super::trigger_key;
use crate::alerting::OperatorTable;
use crate::db::KeyValueStore;
use crate::error::Result;
use crate::models::{NotificationTriggerResult, TriggerSpec};
use crate::notification::Delivery;

const DELIVERY_FAILED: &str = "failed to send notification";

/// Runs every subscribed trigger of a monitor
pub struct TriggerPublisher {
    table: OperatorTable,
    delivery: Arc<dyn Delivery>,
    status: Arc<dyn KeyValueStore>,
}

impl TriggerPublisher {
    /// Create a publisher
    pub fn new(table: OperatorTable, delivery: Arc<dyn Delivery>, status: Arc<dyn KeyValueStore>) -> Self {
        Self {
            table,
            delivery,
            status,
        }
    }

    /// Evaluate each trigger against `payload` and record its outcome
    pub async fn publish(&self, monitor: &str, payload: &[u8], subscribers: &Subscribers) -> Result<()> {
        if subscribers.is_empty() {
            debug!(monitor = %monitor, "No subscribers");
            return Ok(());
        }

        let document = serde_json::from_slice::<Value>(payload);

        for trigger in subscribers.iter() {
            let result = match &document {
                Ok(document) => self.evaluate(monitor, trigger, document).await,
                Err(e) => {
                    debug!(monitor = %monitor, trigger = %trigger.name, error = %e, "Payload is not JSON");
                    NotificationTriggerResult {
                        triggered: false,
                        message: format!("failed to parse monitored value: {e}"),
                        updated_at: Utc::now(),
                    }
                }
            };

            let key = trigger_key(monitor, &trigger.name);
            let mut history = History::<NotificationTriggerResult>::load(self.status.as_ref(), &key).await?;
            history.push(result);
            history.save(self.status.as_ref(), &key).await?;
        }

        Ok(())
    }

    async fn evaluate(&self, monitor: &str, trigger: &TriggerSpec, document: &Value) -> NotificationTriggerResult {
        let observed = path::extract(document, &trigger.field_path);

        if self.table.eval(observed.as_ref(), &trigger.operand, &trigger.op) {
            info!(monitor = %monitor, trigger = %trigger.name, notification = %trigger.notification, "Matched condition");

            let message = match self.delivery.deliver(&trigger.notification).await {
                Ok(()) => String::new(),
                Err(e) => {
                    error!(trigger = %trigger.name, notification = %trigger.notification, error = %e, "Failed to deliver notification");
                    DELIVERY_FAILED.to_string()
                }
            };

            return NotificationTriggerResult {
                triggered: true,
                message,
                updated_at: Utc::now(),
            };
        }

        let shown = match &observed {
            Some(value) => value.to_string(),
            None => path::lookup(document, &trigger.field_path)
                .map_or_else(|| "null".to_string(), Value::to_string),
        };
        debug!(monitor = %monitor, trigger = %trigger.name, value = %shown, "Unmatched condition");

        NotificationTriggerResult {
            triggered: false,
            message: format!(
                "monitored value({shown}) is not matched condition(op: {}, operand: {})",
                trigger.op, trigger.operand
            ),
            updated_at: Utc::now(),
        }
    }
}
