//! Named, cancellable interval-job scheduler
//!
//! Every scheduled job owns a timer task that pushes the job onto a bounded
//! channel at each tick. A single executor loop drains the channel and runs
//! jobs on a bounded pool. A job has at most one fire queued at a time:
//! ticks that arrive while one is still waiting are dropped, so a slow job
//! can neither fill the channel nor hold pool slots it cannot use.

mod job;

pub use job::{JobContext, Task, TimeUnit};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::SchedulerConfig;
use crate::error::{Error, Result};

use job::Job;

/// Interval-job scheduler
pub struct Scheduler {
    config: SchedulerConfig,
    jobs: Mutex<HashMap<String, Job>>,
    job_tx: mpsc::Sender<Job>,
    job_rx: Mutex<Option<mpsc::Receiver<Job>>>,
    root: CancellationToken,
}

impl Scheduler {
    /// Create a new scheduler. Nothing runs until [`Scheduler::start`].
    pub fn new(config: &SchedulerConfig) -> Self {
        let (job_tx, job_rx) = mpsc::channel(config.channel_capacity.max(1));

        Self {
            config: config.clone(),
            jobs: Mutex::new(HashMap::new()),
            job_tx,
            job_rx: Mutex::new(Some(job_rx)),
            root: CancellationToken::new(),
        }
    }

    /// Begin configuring the job called `name`
    pub fn schedule(&self, name: impl Into<String>) -> JobBuilder<'_> {
        JobBuilder {
            scheduler: self,
            name: name.into(),
            amount: None,
            unit: TimeUnit::default(),
            interval: None,
        }
    }

    /// Stop the job called `name`. Returns whether a job was removed.
    pub fn cancel(&self, name: &str) -> bool {
        let removed = self.jobs.lock().remove(name);
        match removed {
            Some(job) => {
                job.cancel();
                info!(job = %name, "Job cancelled");
                true
            }
            None => false,
        }
    }

    /// Whether a live job exists for `name`
    pub fn is_scheduled(&self, name: &str) -> bool {
        self.jobs.lock().get(name).is_some_and(Job::is_running)
    }

    /// Interval of the job called `name`
    pub fn interval_of(&self, name: &str) -> Option<Duration> {
        self.jobs.lock().get(name).map(|job| job.interval)
    }

    /// Names of all scheduled jobs, sorted
    pub fn job_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Cancel every job and stop the executor loop
    pub fn shutdown(&self) {
        self.root.cancel();
        self.jobs.lock().clear();
    }

    /// Run the executor loop until [`Scheduler::shutdown`]
    pub async fn start(&self) {
        let mut job_rx = {
            let mut guard = self.job_rx.lock();
            match guard.take() {
                Some(rx) => rx,
                None => {
                    error!("Scheduler already started");
                    return;
                }
            }
        };

        let workers = self.config.workers.max(1);
        let permits = Arc::new(Semaphore::new(workers));

        info!(
            "Scheduler started (channel_capacity={}, workers={})",
            self.config.channel_capacity, workers
        );

        loop {
            let job = tokio::select! {
                biased;
                () = self.root.cancelled() => break,
                job = job_rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            tokio::spawn(execute(job, permits.clone()));
        }

        info!("Scheduler stopped");
    }

    fn install(&self, name: String, requested: Option<Duration>, task: Arc<dyn Task>) -> Result<()> {
        // Held until the replacement is inserted: one live timer per name.
        let mut jobs = self.jobs.lock();

        let interval = match (requested, jobs.get(&name)) {
            (Some(interval), _) => interval,
            (None, Some(existing)) => existing.interval,
            (None, None) => {
                return Err(Error::validation(format!("job {name} has no interval")));
            }
        };
        if interval.is_zero() {
            return Err(Error::validation(format!("job {name} interval must not be zero")));
        }

        let gate = match jobs.remove(&name) {
            Some(previous) => {
                if previous.is_running() {
                    debug!(job = %name, "Replacing running job");
                }
                previous.cancel();
                previous.gate
            }
            None => Arc::default(),
        };

        let job = Job {
            name: name.clone(),
            interval,
            task,
            token: self.root.child_token(),
            gate,
            pending: Arc::default(),
        };

        self.spawn_timer(job.clone());
        jobs.insert(name.clone(), job);

        info!(job = %name, interval = %humantime::format_duration(interval), "Job scheduled");
        Ok(())
    }

    fn spawn_timer(&self, job: Job) {
        let job_tx = self.job_tx.clone();

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + job.interval, job.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = job.token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                if !job.mark_pending() {
                    debug!(job = %job.name, "Previous fire still pending, tick dropped");
                    continue;
                }

                tokio::select! {
                    biased;
                    () = job.token.cancelled() => break,
                    sent = job_tx.send(job.clone()) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }

            debug!(job = %job.name, "Timer stopped");
        });
    }
}

/// Fluent job configuration returned by [`Scheduler::schedule`]
#[must_use = "a job only starts once `run` is called"]
pub struct JobBuilder<'a> {
    scheduler: &'a Scheduler,
    name: String,
    amount: Option<u64>,
    unit: TimeUnit,
    interval: Option<Duration>,
}

impl JobBuilder<'_> {
    /// Fire every `amount` units (seconds unless another unit is chosen)
    pub fn every(mut self, amount: u64) -> Self {
        self.amount = Some(amount);
        self.interval = None;
        self
    }

    /// Interpret `every` in milliseconds
    pub fn milliseconds(mut self) -> Self {
        self.unit = TimeUnit::Milliseconds;
        self
    }

    /// Interpret `every` in seconds
    pub fn seconds(mut self) -> Self {
        self.unit = TimeUnit::Seconds;
        self
    }

    /// Interpret `every` in minutes
    pub fn minutes(mut self) -> Self {
        self.unit = TimeUnit::Minutes;
        self
    }

    /// Interpret `every` in hours
    pub fn hours(mut self) -> Self {
        self.unit = TimeUnit::Hours;
        self
    }

    /// Fire at an exact interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self.amount = None;
        self
    }

    /// Start the job, replacing any job already running under this name
    pub fn run<T: Task + 'static>(self, task: T) -> Result<()> {
        self.run_shared(Arc::new(task))
    }

    /// Like [`JobBuilder::run`] for an already shared task
    pub fn run_shared(self, task: Arc<dyn Task>) -> Result<()> {
        let requested = self
            .interval
            .or_else(|| self.amount.map(|amount| self.unit.duration(amount)));
        self.scheduler.install(self.name, requested, task)
    }

    /// Stop the job with this name
    pub fn cancel(self) -> bool {
        self.scheduler.cancel(&self.name)
    }
}

async fn execute(job: Job, permits: Arc<Semaphore>) {
    // Gate first: a fire queued behind its own job holds no pool slot.
    let _gate = job.gate.lock().await;
    let Ok(_permit) = permits.acquire().await else {
        return;
    };
    job.clear_pending();

    if !job.is_running() {
        debug!(job = %job.name, "Skipping fire of cancelled job");
        return;
    }

    let started = Instant::now();
    debug!(job = %job.name, "Job running");

    match job.task.run(job.context()).await {
        Ok(()) => debug!(job = %job.name, elapsed = ?started.elapsed(), "Job finished"),
        Err(e) => error!(job = %job.name, error = %e, "Job failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn started_scheduler(config: SchedulerConfig) -> Arc<Scheduler> {
        let scheduler = Arc::new(Scheduler::new(&config));
        let runner = scheduler.clone();
        tokio::spawn(async move { runner.start().await });
        scheduler
    }

    fn counting(counter: &Arc<AtomicUsize>) -> impl Task {
        let counter = counter.clone();
        move |_ctx: JobContext| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_every_interval() {
        let scheduler = started_scheduler(SchedulerConfig::default());
        let fired = Arc::new(AtomicUsize::new(0));

        scheduler
            .schedule("heartbeat")
            .every(100)
            .milliseconds()
            .run(counting(&fired))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_replaces_existing_job() {
        let scheduler = started_scheduler(SchedulerConfig::default());
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        scheduler
            .schedule("heartbeat")
            .every(100)
            .milliseconds()
            .run(counting(&first))
            .unwrap();
        scheduler
            .schedule("heartbeat")
            .every(100)
            .milliseconds()
            .run(counting(&second))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(350)).await;

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.job_names(), vec!["heartbeat".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replacement_keeps_interval() {
        let scheduler = started_scheduler(SchedulerConfig::default());
        let fired = Arc::new(AtomicUsize::new(0));

        scheduler
            .schedule("heartbeat")
            .interval(Duration::from_millis(200))
            .run(counting(&Arc::new(AtomicUsize::new(0))))
            .unwrap();
        scheduler.schedule("heartbeat").run(counting(&fired)).unwrap();

        assert_eq!(scheduler.interval_of("heartbeat"), Some(Duration::from_millis(200)));
        tokio::time::sleep(Duration::from_millis(450)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_firing_and_is_idempotent() {
        let scheduler = started_scheduler(SchedulerConfig::default());
        let fired = Arc::new(AtomicUsize::new(0));

        scheduler
            .schedule("heartbeat")
            .every(100)
            .milliseconds()
            .run(counting(&fired))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        assert!(scheduler.cancel("heartbeat"));
        assert!(!scheduler.cancel("heartbeat"));
        assert!(!scheduler.is_scheduled("heartbeat"));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // a cancelled name can be scheduled again straight away
        scheduler
            .schedule("heartbeat")
            .every(100)
            .milliseconds()
            .run(counting(&fired))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_task_keeps_firing() {
        let scheduler = started_scheduler(SchedulerConfig::default());
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        scheduler
            .schedule("flaky")
            .every(1)
            .seconds()
            .run(move |_ctx: JobContext| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(Error::transport("connection refused"))
                }
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(scheduler.is_scheduled("flaky"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_job_never_overlaps_itself() {
        let scheduler = started_scheduler(SchedulerConfig::default());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));

        let (flight, max, count) = (in_flight.clone(), max_seen.clone(), runs.clone());
        scheduler
            .schedule("slow")
            .every(100)
            .milliseconds()
            .run(move |_ctx: JobContext| {
                let (flight, max, count) = (flight.clone(), max.clone(), count.clone());
                async move {
                    let now = flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(250)).await;
                    flight.fetch_sub(1, Ordering::SeqCst);
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(runs.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_job_does_not_starve_other_jobs() {
        let scheduler = started_scheduler(SchedulerConfig::default());
        let fast = Arc::new(AtomicUsize::new(0));
        let slow_runs = Arc::new(AtomicUsize::new(0));

        let count = slow_runs.clone();
        scheduler
            .schedule("slow")
            .every(10)
            .milliseconds()
            .run(move |_ctx: JobContext| {
                let count = count.clone();
                async move {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .unwrap();
        scheduler
            .schedule("fast")
            .every(100)
            .milliseconds()
            .run(counting(&fast))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(10_050)).await;

        let fired = fast.load(Ordering::SeqCst);
        assert!(fired >= 95, "fast job fired {fired} times");
        // one run per second at most, every other tick dropped
        assert!(slow_runs.load(Ordering::SeqCst) <= 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_releases_timer_blocked_on_full_channel() {
        let scheduler = Arc::new(Scheduler::new(&SchedulerConfig {
            channel_capacity: 1,
            workers: 1,
        }));
        let fired = Arc::new(AtomicUsize::new(0));
        let queued: Arc<dyn Task> = Arc::new(counting(&fired));
        let blocked: Arc<dyn Task> = Arc::new(counting(&fired));

        scheduler
            .schedule("queued")
            .every(100)
            .milliseconds()
            .run_shared(queued.clone())
            .unwrap();
        scheduler
            .schedule("blocked")
            .every(150)
            .milliseconds()
            .run_shared(blocked.clone())
            .unwrap();

        // "queued" fills the channel at 100ms, "blocked" waits in send at 150ms
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(Arc::strong_count(&blocked) > 2);

        assert!(scheduler.cancel("blocked"));
        tokio::time::sleep(Duration::from_millis(1)).await;
        // the timer gave up its send and exited
        assert_eq!(Arc::strong_count(&blocked), 1);
        assert!(scheduler.is_scheduled("queued"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_fire_of_cancelled_job_is_skipped() {
        let scheduler = Arc::new(Scheduler::new(&SchedulerConfig {
            channel_capacity: 1,
            workers: 1,
        }));
        let fired = Arc::new(AtomicUsize::new(0));
        let task: Arc<dyn Task> = Arc::new(counting(&fired));

        scheduler
            .schedule("queued")
            .every(100)
            .milliseconds()
            .run_shared(task.clone())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(scheduler.cancel("queued"));
        tokio::time::sleep(Duration::from_millis(1)).await;
        // only the fire sitting in the channel still refers to the task
        assert_eq!(Arc::strong_count(&task), 2);

        let runner = scheduler.clone();
        tokio::spawn(async move { runner.start().await });
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(Arc::strong_count(&task), 1);
        scheduler.shutdown();
    }

    #[tokio::test]
    async fn test_rejects_missing_or_zero_interval() {
        let scheduler = Scheduler::new(&SchedulerConfig::default());
        let fired = Arc::new(AtomicUsize::new(0));

        let err = scheduler.schedule("a").run(counting(&fired)).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = scheduler.schedule("a").every(0).seconds().run(counting(&fired)).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(scheduler.job_names().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_everything() {
        let scheduler = started_scheduler(SchedulerConfig::default());
        let fired = Arc::new(AtomicUsize::new(0));

        for name in ["a", "b"] {
            scheduler
                .schedule(name)
                .every(100)
                .milliseconds()
                .run(counting(&fired))
                .unwrap();
        }

        scheduler.shutdown();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(scheduler.job_names().is_empty());
    }

    #[tokio::test]
    async fn test_second_start_returns_immediately() {
        let scheduler = Arc::new(Scheduler::new(&SchedulerConfig::default()));
        let runner = scheduler.clone();
        let first = tokio::spawn(async move { runner.start().await });
        tokio::task::yield_now().await;

        // receiver already taken, so this returns instead of looping
        scheduler.start().await;

        scheduler.shutdown();
        first.await.unwrap();
    }
}
