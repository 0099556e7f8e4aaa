//! # PulseWatch
//!
//! HTTP resource monitoring with condition triggers and notification dispatch.
//!
//! PulseWatch polls HTTP resources on a schedule, evaluates trigger
//! conditions against the fetched JSON and delivers the notifications those
//! triggers name through email, Slack or webhooks.
//!
//! ## Architecture
//!
//! - **Scheduler**: Named periodic jobs that never overlap themselves
//! - **Monitor**: Fetches resources, keeps short histories, evaluates triggers
//! - **Notification**: Registry of api-keyed notifications and the delivery queue
//! - **Alerting**: Condition operators and the worker that delivers queued notifications
//! - **Storage**: Redis hashes and lists, or in-memory stores for tests
//! - **API**: REST API for registration, triggering and monitor management
//!
//! ## Quick Start
//!
//! ```bash
//! # Start the service
//! pulsewatch serve
//!
//! # Register a notification and trigger it
//! pulsewatch register alert1 --type slack --file alert1.json
//! pulsewatch trigger alert1 --key <api-key>
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod alerting;
pub mod api;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod monitor;
pub mod notification;
pub mod scheduler;

pub use self::config::Config;
pub use self::error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::db::Database;
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
    pub use crate::monitor::MonitorService;
    pub use crate::notification::{Delivery, NotificationHub};
    pub use crate::scheduler::{JobContext, Scheduler, Task};
}
