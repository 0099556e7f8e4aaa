//! Jobs and their tasks

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Handed to a task each time its job fires
#[derive(Debug, Clone)]
pub struct JobContext {
    name: String,
    token: CancellationToken,
}

impl JobContext {
    pub(crate) fn new(name: String, token: CancellationToken) -> Self {
        Self { name, token }
    }

    /// Name of the firing job
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the job was cancelled or replaced since it fired
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the job is cancelled or replaced
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

/// Unit of work run on every tick of a job
#[async_trait]
pub trait Task: Send + Sync {
    /// Run once. Errors are logged by the scheduler and do not stop the job.
    async fn run(&self, ctx: JobContext) -> Result<()>;
}

#[async_trait]
impl<F, Fut> Task for F
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn run(&self, ctx: JobContext) -> Result<()> {
        (self)(ctx).await
    }
}

/// A named interval job.
///
/// The gate is shared by every job that ever carried this name, so a
/// replacement never runs concurrently with an execution of its predecessor.
/// `pending` is set while a fire sits in the channel or waits for its turn;
/// the timer drops ticks until it clears.
#[derive(Clone)]
pub(crate) struct Job {
    pub(crate) name: String,
    pub(crate) interval: Duration,
    pub(crate) task: Arc<dyn Task>,
    pub(crate) token: CancellationToken,
    pub(crate) gate: Arc<tokio::sync::Mutex<()>>,
    pub(crate) pending: Arc<AtomicBool>,
}

impl Job {
    pub(crate) fn context(&self) -> JobContext {
        JobContext::new(self.name.clone(), self.token.clone())
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    /// Mark a fire as queued. Returns false if one already is.
    pub(crate) fn mark_pending(&self) -> bool {
        !self.pending.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn clear_pending(&self) {
        self.pending.store(false, Ordering::Release);
    }
}

/// Interval unit for the fluent builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeUnit {
    /// Milliseconds
    Milliseconds,
    /// Seconds
    #[default]
    Seconds,
    /// Minutes
    Minutes,
    /// Hours
    Hours,
}

impl TimeUnit {
    pub(crate) fn duration(self, amount: u64) -> Duration {
        match self {
            Self::Milliseconds => Duration::from_millis(amount),
            Self::Seconds => Duration::from_secs(amount),
            Self::Minutes => Duration::from_secs(amount.saturating_mul(60)),
            Self::Hours => Duration::from_secs(amount.saturating_mul(3600)),
        }
    }
}
