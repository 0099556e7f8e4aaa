//! Monitored resources and their triggers
//!
//! [`MonitorService`] is the entry point for external configuration. Each
//! watched monitor is a scheduler job that fetches the resource, records the
//! outcome and runs the triggers subscribed at that moment.

mod fetch;
mod history;
pub mod path;
mod publisher;
mod subscribers;

pub use fetch::Fetcher;
pub use history::History;
pub use publisher::TriggerPublisher;
pub use subscribers::Subscribers;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::alerting::OperatorTable;
use crate::config::Config;
use crate::db::KeyValueStore;
use crate::error::{Error, Result};
use crate::models::{MonitorResult, MonitorSpec, NotificationTriggerResult, TriggerSpec};
use crate::notification::Delivery;
use crate::scheduler::{JobContext, Scheduler, Task};

/// Status-store key of a monitor's history
pub fn monitor_key(monitor: &str) -> String {
    format!("monitor:{monitor}")
}

/// Status-store key of a trigger's history
pub fn trigger_key(monitor: &str, trigger: &str) -> String {
    format!("trigger:{monitor}/{trigger}")
}

type SharedSubscribers = Arc<RwLock<Subscribers>>;

/// Watches monitors and manages their triggers
pub struct MonitorService {
    scheduler: Arc<Scheduler>,
    fetcher: Arc<Fetcher>,
    publisher: Arc<TriggerPublisher>,
    status: Arc<dyn KeyValueStore>,
    monitors: Mutex<HashMap<String, MonitorSpec>>,
    subscribers: Mutex<HashMap<String, SharedSubscribers>>,
}

impl MonitorService {
    /// Create a service from its parts
    pub fn new(
        scheduler: Arc<Scheduler>,
        fetcher: Arc<Fetcher>,
        publisher: Arc<TriggerPublisher>,
        status: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            scheduler,
            fetcher,
            publisher,
            status,
            monitors: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Build the fetcher and publisher from configuration
    pub fn from_config(
        config: &Config,
        scheduler: Arc<Scheduler>,
        delivery: Arc<dyn Delivery>,
        status: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        let fetcher = Fetcher::new(&config.monitor, status.clone())?;
        let table = OperatorTable::new(config.alerting.operator_aliases);
        let publisher = TriggerPublisher::new(table, delivery, status.clone());

        Ok(Self::new(scheduler, Arc::new(fetcher), Arc::new(publisher), status))
    }

    /// Start polling `spec`, replacing any monitor with the same name
    pub fn watch(&self, spec: MonitorSpec) -> Result<()> {
        spec.validate()?;

        let task = MonitorTask {
            spec: spec.clone(),
            fetcher: self.fetcher.clone(),
            publisher: self.publisher.clone(),
            subscribers: self.subscribers_of(&spec.name),
        };

        let mut monitors = self.monitors.lock();
        self.scheduler
            .schedule(&spec.name)
            .every(spec.interval)
            .seconds()
            .run(task)?;

        info!(monitor = %spec.name, url = %spec.url, interval = spec.interval, "Watching monitor");
        monitors.insert(spec.name.clone(), spec);
        Ok(())
    }

    /// Stop polling `name`. Returns whether it was watched.
    pub fn unwatch(&self, name: &str) -> bool {
        let mut monitors = self.monitors.lock();
        let removed = monitors.remove(name).is_some();
        let cancelled = self.scheduler.cancel(name);
        drop(monitors);
        if removed {
            info!(monitor = %name, "Stopped watching monitor");
        }
        removed || cancelled
    }

    /// Subscribe `trigger` to `monitor`, replacing a trigger with the same name
    pub fn subscribe(&self, monitor: &str, trigger: TriggerSpec) -> Result<()> {
        if trigger.name.is_empty() {
            return Err(Error::validation("trigger name must not be empty"));
        }
        if trigger.name.contains('/') || monitor.contains('/') {
            return Err(Error::validation(format!(
                "trigger {} on {monitor}: names must not contain '/'",
                trigger.name
            )));
        }
        if trigger.notification.is_empty() {
            return Err(Error::validation(format!(
                "trigger {} has no notification",
                trigger.name
            )));
        }

        info!(monitor = %monitor, trigger = %trigger.name, notification = %trigger.notification, "Trigger subscribed");
        self.subscribers_of(monitor).write().add(trigger);
        Ok(())
    }

    /// Remove `trigger` from `monitor`. Returns whether it was subscribed.
    pub fn unsubscribe(&self, monitor: &str, trigger: &str) -> bool {
        let subscribers = self.subscribers.lock().get(monitor).cloned();
        let removed = subscribers.is_some_and(|s| s.write().remove(trigger).is_some());
        if removed {
            info!(monitor = %monitor, trigger = %trigger, "Trigger unsubscribed");
        }
        removed
    }

    /// Triggers currently subscribed to `monitor`
    pub fn subscribers(&self, monitor: &str) -> Subscribers {
        self.subscribers
            .lock()
            .get(monitor)
            .map(|s| s.read().clone())
            .unwrap_or_default()
    }

    /// Recent fetch results of `name`
    pub async fn monitor_history(&self, name: &str) -> Result<History<MonitorResult>> {
        History::load(self.status.as_ref(), &monitor_key(name)).await
    }

    /// Recent evaluations of `trigger` on `monitor`
    pub async fn trigger_history(&self, monitor: &str, trigger: &str) -> Result<History<NotificationTriggerResult>> {
        History::load(self.status.as_ref(), &trigger_key(monitor, trigger)).await
    }

    /// Watched monitors, sorted by name
    pub fn monitors(&self) -> Vec<MonitorSpec> {
        let mut monitors: Vec<MonitorSpec> = self.monitors.lock().values().cloned().collect();
        monitors.sort_by(|a, b| a.name.cmp(&b.name));
        monitors
    }

    /// Definition of the monitor called `name`
    pub fn monitor(&self, name: &str) -> Option<MonitorSpec> {
        self.monitors.lock().get(name).cloned()
    }

    fn subscribers_of(&self, monitor: &str) -> SharedSubscribers {
        self.subscribers
            .lock()
            .entry(monitor.to_string())
            .or_default()
            .clone()
    }
}

/// One tick of a watched monitor
struct MonitorTask {
    spec: MonitorSpec,
    fetcher: Arc<Fetcher>,
    publisher: Arc<TriggerPublisher>,
    subscribers: SharedSubscribers,
}

#[async_trait]
impl Task for MonitorTask {
    async fn run(&self, ctx: JobContext) -> Result<()> {
        let Some(payload) = self.fetcher.fetch(&self.spec, &ctx).await? else {
            return Ok(());
        };
        if ctx.is_cancelled() {
            return Ok(());
        }

        let subscribers = self.subscribers.read().clone();
        self.publisher.publish(&self.spec.name, &payload, &subscribers).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::db::{Database, MemoryStore};
    use crate::models::{MonitorStatus, Notification, SlackNotification};
    use crate::notification::NotificationHub;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service() -> (Arc<MonitorService>, Arc<Scheduler>, NotificationHub) {
        let db = Database::in_memory();
        let hub = NotificationHub::from_database(&db);
        let scheduler = Arc::new(Scheduler::new(&SchedulerConfig::default()));
        let service = MonitorService::from_config(
            &Config::default(),
            scheduler.clone(),
            Arc::new(hub.clone()),
            Arc::new(MemoryStore::new()),
        )
        .unwrap();
        (Arc::new(service), scheduler, hub)
    }

    fn trigger(name: &str) -> TriggerSpec {
        TriggerSpec {
            name: name.into(),
            notification: "alert1".into(),
            field_path: "cpu".into(),
            op: "gt".into(),
            operand: "80".into(),
        }
    }

    #[tokio::test]
    async fn test_watch_and_unwatch() {
        let (service, scheduler, _) = service();

        assert!(service.watch(MonitorSpec::new("api", "http://localhost/x", 0)).is_err());
        assert!(!scheduler.is_scheduled("api"));

        service.watch(MonitorSpec::new("api", "http://localhost/x", 5)).unwrap();
        service.watch(MonitorSpec::new("api", "http://localhost/y", 7)).unwrap();
        assert_eq!(scheduler.interval_of("api"), Some(Duration::from_secs(7)));
        assert_eq!(service.monitors().len(), 1);
        assert_eq!(service.monitor("api").unwrap().url, "http://localhost/y");

        assert!(service.unwatch("api"));
        assert!(!service.unwatch("api"));
        assert!(!scheduler.is_scheduled("api"));
        assert!(service.monitors().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_watch_and_unwatch_stay_consistent() {
        let (service, scheduler, _) = service();

        for _ in 0..200 {
            let watcher = service.clone();
            let watch = tokio::task::spawn_blocking(move || {
                watcher.watch(MonitorSpec::new("api", "http://localhost/x", 5)).unwrap();
            });
            let unwatcher = service.clone();
            let unwatch = tokio::task::spawn_blocking(move || unwatcher.unwatch("api"));
            watch.await.unwrap();
            unwatch.await.unwrap();

            assert_eq!(service.monitor("api").is_some(), scheduler.is_scheduled("api"));
        }
    }

    #[test]
    fn test_subscribe_validation_and_unsubscribe() {
        let (service, _, _) = service();

        let mut nameless = trigger("");
        assert!(service.subscribe("api", nameless.clone()).is_err());
        nameless.name = "t".into();
        nameless.notification = String::new();
        assert!(service.subscribe("api", nameless).is_err());
        assert!(service.subscribe("api", trigger("a/b")).is_err());
        assert!(service.subscribe("api/v1", trigger("hot")).is_err());
        assert!(service.subscribers("api").is_empty());

        service.subscribe("api", trigger("hot")).unwrap();
        assert!(service.subscribers("api").contains("hot"));
        assert!(service.unsubscribe("api", "hot"));
        assert!(!service.unsubscribe("api", "hot"));
        assert!(!service.unsubscribe("other", "hot"));
    }

    #[tokio::test]
    async fn test_tick_fetches_and_delivers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"cpu": 95}"#))
            .mount(&server)
            .await;

        let (service, scheduler, hub) = service();
        let slack = Notification::Slack(SlackNotification {
            authorization: "xoxb-1".into(),
            channel: "#ops".into(),
            text: "cpu high".into(),
        });
        hub.register("alert1", &slack).await.unwrap();

        service.subscribe("api", trigger("hot")).unwrap();
        service.watch(MonitorSpec::new("api", server.uri(), 1)).unwrap();

        let runner = scheduler.clone();
        tokio::spawn(async move { runner.start().await });

        let queued = hub.queue().dequeue(Duration::from_secs(5)).await.unwrap();
        assert_eq!(queued, Some(slack));
        scheduler.shutdown();

        let monitor_history = service.monitor_history("api").await.unwrap();
        assert_eq!(monitor_history.latest().unwrap().status, MonitorStatus::Success);

        // the trigger result is written right after delivery
        let mut trigger_history = History::new();
        for _ in 0..50 {
            trigger_history = service.trigger_history("api", "hot").await.unwrap();
            if !trigger_history.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(trigger_history.latest().unwrap().triggered);
    }
}
