//! Sliding-window failure rate of embedding syncs with throttled alerting
//!
//! Success and failure counters live in the shared key-value store. Every increment
//! pushes the key's expiry out by one window, so the counters describe recent activity
//! and vanish after a quiet window.

use crate::config::SearchConfig;
use crate::error::Result;
use crate::kv::KeyValueStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const SUCCESS_KEY: &str = "embedding_sync:successes";
const FAILURE_KEY: &str = "embedding_sync:failures";
const LAST_ALERT_KEY: &str = "embedding_sync:last_alert";

/// A failure-rate alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Failure percentage that triggered the alert
    pub failure_rate_percent: f64,
    /// Failures in the window
    pub failures: u64,
    /// Successes in the window
    pub successes: u64,
    /// Window length in seconds
    pub window_secs: u64,
    /// When the alert was raised
    pub raised_at: DateTime<Utc>,
}

impl std::fmt::Display for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "embedding sync failure rate {:.1}% ({} of {} in the last {}s)",
            self.failure_rate_percent,
            self.failures,
            self.failures + self.successes,
            self.window_secs
        )
    }
}

/// Alert delivery channel
#[async_trait]
pub trait AlertNotifier: Send + Sync {
    /// Deliver an alert
    async fn notify(&self, alert: &Alert) -> Result<()>;
}

/// Notifier that logs alerts at error level
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingAlertNotifier;

#[async_trait]
impl AlertNotifier for LoggingAlertNotifier {
    async fn notify(&self, alert: &Alert) -> Result<()> {
        tracing::error!("ALERT: {}", alert);
        Ok(())
    }
}

/// Current window counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureWindowStats {
    /// Successes in the window
    pub successes: u64,
    /// Failures in the window
    pub failures: u64,
    /// `failures / (successes + failures) * 100`, 0 without activity
    pub failure_rate_percent: f64,
    /// Last alert, if one is inside the cooldown
    pub last_alert_at: Option<DateTime<Utc>>,
}

/// Tracks sync outcomes and raises alerts above a failure-rate threshold
pub struct FailureRateMonitor {
    store: Arc<dyn KeyValueStore>,
    notifier: Arc<dyn AlertNotifier>,
    window: Duration,
    threshold_percent: f64,
    cooldown: Duration,
}

impl std::fmt::Debug for FailureRateMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureRateMonitor")
            .field("window", &self.window)
            .field("threshold_percent", &self.threshold_percent)
            .field("cooldown", &self.cooldown)
            .finish()
    }
}

fn failure_rate(successes: u64, failures: u64) -> f64 {
    let total = successes + failures;
    if total == 0 {
        0.0
    } else {
        failures as f64 / total as f64 * 100.0
    }
}

impl FailureRateMonitor {
    /// Monitor using the window, threshold and cooldown from `config`
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        notifier: Arc<dyn AlertNotifier>,
        config: &SearchConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            window: config.failure_window(),
            threshold_percent: config.failure_threshold_percent,
            cooldown: config.alert_cooldown(),
        }
    }

    async fn bump(&self, key: &str) -> Result<u64> {
        let value = self.store.incr(key).await?;
        self.store.expire(key, self.window).await?;
        Ok(value.max(0) as u64)
    }

    async fn counter(&self, key: &str) -> Result<u64> {
        Ok(self
            .store
            .get(key)
            .await?
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0))
    }

    async fn last_alert(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .store
            .get(LAST_ALERT_KEY)
            .await?
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|at| at.with_timezone(&Utc)))
    }

    /// Count a successful sync
    pub async fn record_success(&self) -> Result<()> {
        self.bump(SUCCESS_KEY).await.map(|_| ())
    }

    /// Count a failed sync and alert if the window's failure rate is above the threshold
    ///
    /// Returns the alert when one was raised. Alerts inside the cooldown of the previous
    /// one are suppressed; delivery failures are logged and do not fail the call.
    pub async fn record_failure(&self, now: DateTime<Utc>) -> Result<Option<Alert>> {
        let failures = self.bump(FAILURE_KEY).await?;
        let successes = self.counter(SUCCESS_KEY).await?;
        let rate = failure_rate(successes, failures);
        if rate <= self.threshold_percent {
            return Ok(None);
        }

        if let Some(last) = self.last_alert().await? {
            let since = now.signed_duration_since(last);
            if since.to_std().map(|d| d < self.cooldown).unwrap_or(true) {
                tracing::debug!(
                    "Failure rate {:.1}% above threshold, alert suppressed (last alert at {})",
                    rate,
                    last
                );
                return Ok(None);
            }
        }

        self.store
            .set(LAST_ALERT_KEY, now.to_rfc3339(), Some(self.cooldown))
            .await?;
        let alert = Alert {
            failure_rate_percent: rate,
            failures,
            successes,
            window_secs: self.window.as_secs(),
            raised_at: now,
        };
        if let Err(e) = self.notifier.notify(&alert).await {
            tracing::warn!("Failed to deliver failure-rate alert: {}", e);
        }
        Ok(Some(alert))
    }

    /// Counters for the current window
    pub async fn stats(&self) -> Result<FailureWindowStats> {
        let successes = self.counter(SUCCESS_KEY).await?;
        let failures = self.counter(FAILURE_KEY).await?;
        Ok(FailureWindowStats {
            successes,
            failures,
            failure_rate_percent: failure_rate(successes, failures),
            last_alert_at: self.last_alert().await?,
        })
    }

    /// Forget the window and the alert cooldown
    pub async fn reset(&self) -> Result<()> {
        for key in [SUCCESS_KEY, FAILURE_KEY, LAST_ALERT_KEY] {
            self.store.delete(key).await?;
        }
        Ok(())
    }
}
