//! HTTP polling fallback
//!
//! Used while the stream is down. Each poll fetches the full current
//! picture; the cache discards anything not newer than what it holds, so
//! overlapping with the stream is harmless.

use super::types::{PollError, PollReport, PollResponse, PolledVessel};
use crate::domain::{PositionSink, PositionSource};
use crate::infrastructure::config::PollerConfig;
use crate::infrastructure::shutdown::interruptible_sleep;
use chrono::Utc;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often the fallback loop checks whether a refresh is due
const REFRESH_CHECK_INTERVAL: Duration = Duration::from_secs(1);

pub struct PositionPoller {
    http: Client,
    url: String,
    api_key: Option<String>,
    sink: Arc<dyn PositionSink>,
}

impl PositionPoller {
    pub fn new(config: &PollerConfig, sink: Arc<dyn PositionSink>) -> Result<Self, PollError> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| PollError::NotConfigured("poller.url is not set".to_string()))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            url,
            api_key: config.api_key.clone(),
            sink,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<Vec<serde_json::Value>, PollError> {
        let mut request = self.http.get(&self.url);
        if let Some(key) = &self.api_key {
            request = request.query(&[("api_key", key.as_str())]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PollError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let parsed: PollResponse =
            serde_json::from_str(&body).map_err(|e| PollError::Decode(e.to_string()))?;
        Ok(parsed.into_rows())
    }

    /// Fetch once and feed every valid row to the sink
    pub async fn poll_once(&self) -> Result<PollReport, PollError> {
        let rows = self.fetch().await?;
        let fetched_at = Utc::now();

        let mut report = PollReport {
            fetched: rows.len(),
            ..PollReport::default()
        };

        for row in rows {
            let position = serde_json::from_value::<PolledVessel>(row)
                .map_err(|e| e.to_string())
                .and_then(|vessel| vessel.into_position(fetched_at).map_err(|e| e.to_string()));

            match position {
                Ok(position) => {
                    if self.sink.ingest(position).is_accepted() {
                        report.accepted += 1;
                    }
                }
                Err(reason) => {
                    report.rejected += 1;
                    self.sink.reject(PositionSource::Poll);
                    debug!("[Poller] Skipping row: {}", reason);
                }
            }
        }

        debug!(
            "[Poller] fetched={} accepted={} rejected={}",
            report.fetched, report.accepted, report.rejected
        );
        Ok(report)
    }

    /// Poll only if nothing was accepted within `ttl`
    ///
    /// Returns `None` when the cache was fresh enough.
    pub async fn refresh_if_stale(&self, ttl: Duration) -> Result<Option<PollReport>, PollError> {
        match self.sink.last_update_age() {
            Some(age) if age < ttl => Ok(None),
            _ => self.poll_once().await.map(Some),
        }
    }

    /// Refresh whenever the cache is older than `interval`, until `running` goes false
    ///
    /// Attempts are at least `interval` apart, even when a poll brought
    /// nothing new or failed.
    pub async fn run(&self, interval: Duration, running: Arc<AtomicBool>) {
        info!("[Poller] Fallback polling {} every {:?}", self.url, interval);
        let mut last_attempt: Option<Instant> = None;
        let mut consecutive_failures: u32 = 0;

        while running.load(Ordering::Acquire) {
            let due = last_attempt.map_or(true, |at| at.elapsed() >= interval);
            if due {
                match self.refresh_if_stale(interval).await {
                    Ok(Some(report)) => {
                        last_attempt = Some(Instant::now());
                        consecutive_failures = 0;
                        info!(
                            "[Poller] Refreshed: {} fetched, {} accepted, {} rejected",
                            report.fetched, report.accepted, report.rejected
                        );
                    }
                    Ok(None) => {}
                    Err(e) => {
                        last_attempt = Some(Instant::now());
                        consecutive_failures += 1;
                        warn!("[Poller] Poll failed ({} in a row): {}", consecutive_failures, e);
                    }
                }
            }

            if !interruptible_sleep(&running, REFRESH_CHECK_INTERVAL.min(interval)).await {
                break;
            }
        }

        info!("[Poller] Stopped");
    }
}
