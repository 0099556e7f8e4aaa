//! HTTP fetch of a monitored resource

use std::sync::Arc;

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::{debug, info, warn};

use super::history::History;
use super::monitor_key;
use crate::config::MonitorConfig;
use crate::db::KeyValueStore;
use crate::error::{Error, Result};
use crate::models::{MonitorResult, MonitorSpec, MonitorStatus};
use crate::scheduler::JobContext;

/// Fetches monitored resources and records each outcome
pub struct Fetcher {
    client: Client,
    status: Arc<dyn KeyValueStore>,
}

impl Fetcher {
    /// Create a fetcher recording into `status`
    pub fn new(config: &MonitorConfig, status: Arc<dyn KeyValueStore>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::config(format!("http client: {e}")))?;

        Ok(Self { client, status })
    }

    /// Fetch `spec` once and append the outcome to its history.
    ///
    /// Returns the response body on a 2xx status. A transport failure is
    /// recorded as a failed result and then returned. Nothing is recorded
    /// when the job is cancelled before the exchange completes.
    pub async fn fetch(&self, spec: &MonitorSpec, ctx: &JobContext) -> Result<Option<Vec<u8>>> {
        let request = self
            .client
            .get(&spec.url)
            .header(CONTENT_TYPE, "application/json")
            .body(spec.body.clone());

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let outcome = tokio::select! {
            biased;
            () = ctx.cancelled() => {
                debug!(monitor = %spec.name, "Fetch abandoned, job cancelled");
                return Ok(None);
            }
            outcome = exchange => outcome,
        };

        let (result, payload, failure) = match outcome {
            Ok((status, body)) if status.is_success() => {
                let value = String::from_utf8_lossy(&body).into_owned();
                (MonitorResult::now(MonitorStatus::Success, value), Some(body.to_vec()), None)
            }
            Ok((status, body)) => {
                warn!(monitor = %spec.name, status = %status, "Monitored resource returned error status");
                let value = String::from_utf8_lossy(&body).into_owned();
                (MonitorResult::now(MonitorStatus::Fail, value), None, None)
            }
            Err(e) => {
                let failure = Error::transport(format!("fetch {}: {e}", spec.url));
                (MonitorResult::now(MonitorStatus::Fail, ""), None, Some(failure))
            }
        };

        info!(monitor = %spec.name, status = ?result.status, "Fetched");
        self.record(&spec.name, result).await?;

        match failure {
            Some(e) => Err(e),
            None => Ok(payload),
        }
    }

    async fn record(&self, monitor: &str, result: MonitorResult) -> Result<()> {
        let key = monitor_key(monitor);
        let mut history = History::<MonitorResult>::load(self.status.as_ref(), &key).await?;
        history.record(result);
        history.save(self.status.as_ref(), &key).await
    }
}
