//! Data models for PulseWatch

mod monitor;
mod notification;

pub use monitor::*;
pub use notification::*;
