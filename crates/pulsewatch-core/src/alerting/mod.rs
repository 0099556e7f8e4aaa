//! Alerting for PulseWatch
//!
//! Condition evaluation for triggers, and execution of queued notifications.

pub mod condition;
mod notifier;
mod worker;

pub use condition::{eval, Comparison, ObservedValue, OperatorAliases, OperatorTable};
pub use notifier::{DeliveryError, NotificationSender};
pub use worker::DispatchWorker;
