//! Failure Monitor
//!
//! Tracks consecutive delivery failures per endpoint and disables an
//! endpoint once it crosses the failure threshold.
//!
//! ```text
//! Healthy --failure--> Healthy (count+1) --count >= threshold--> Disabled
//!    ^                                                              |
//!    +------------- success resets count; re-enable is manual -----+
//! ```

use crate::application::events::{SyndicationEvent, SyndicationObserver};
use crate::domain::entities::{FailureRecord, HealthUpdate};
use crate::domain::ports::EndpointRegistry;
use crate::domain::value_objects::{EndpointId, ErrorKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// Failure monitor configuration.
#[derive(Debug, Clone)]
pub struct FailureMonitorConfig {
    /// Consecutive failures before an endpoint is disabled
    pub threshold: u32,
    /// Re-enable a disabled endpoint on its next success
    pub auto_reenable: bool,
}

impl Default for FailureMonitorConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            auto_reenable: false,
        }
    }
}

/// Per-endpoint failure state machine.
pub struct FailureMonitor {
    config: FailureMonitorConfig,
    registry: Arc<dyn EndpointRegistry>,
    records: DashMap<EndpointId, FailureRecord>,
}

impl FailureMonitor {
    pub fn new(config: FailureMonitorConfig, registry: Arc<dyn EndpointRegistry>) -> Self {
        Self {
            config,
            registry,
            records: DashMap::new(),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.config.threshold
    }

    /// Current record for an endpoint, if any outcome has been seen.
    pub fn record(&self, endpoint_id: &EndpointId) -> Option<FailureRecord> {
        self.records.get(endpoint_id).map(|r| r.value().clone())
    }

    pub fn records(&self) -> Vec<FailureRecord> {
        let mut records: Vec<FailureRecord> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.endpoint_id.cmp(&b.endpoint_id));
        records
    }

    /// Clear an endpoint's failure state (manual re-enable).
    pub async fn reset(&self, endpoint_id: &EndpointId) {
        self.records.remove(endpoint_id);
        if let Err(e) = self.registry.record_health(endpoint_id, HealthUpdate::Reset).await {
            tracing::debug!("failure reset for {}: {}", endpoint_id, e);
        }
    }

    /// Forget an endpoint that no longer exists.
    pub fn forget(&self, endpoint_id: &EndpointId) {
        self.records.remove(endpoint_id);
    }

    async fn record_success(&self, endpoint_id: &EndpointId, at: DateTime<Utc>) -> Vec<SyndicationEvent> {
        let was_disabled = {
            let mut entry = self
                .records
                .entry(endpoint_id.clone())
                .or_insert_with(|| FailureRecord::new(endpoint_id.clone(), self.config.threshold));
            entry.consecutive_failures = 0;
            entry.last_success_at = Some(at);
            let was_disabled = entry.disabled;
            if was_disabled && self.config.auto_reenable {
                entry.disabled = false;
            }
            was_disabled
        };

        if let Err(e) = self.registry.record_health(endpoint_id, HealthUpdate::Success { at }).await {
            tracing::debug!("health stamp for {} skipped: {}", endpoint_id, e);
            return Vec::new();
        }

        if was_disabled {
            if self.config.auto_reenable {
                match self.registry.enable(endpoint_id).await {
                    Ok(true) => tracing::info!("endpoint {} re-enabled after success", endpoint_id),
                    Ok(false) => {}
                    Err(e) => tracing::warn!("failed to re-enable endpoint {}: {}", endpoint_id, e),
                }
            } else {
                tracing::info!(
                    "endpoint {} succeeded while disabled; waiting for manual re-enable",
                    endpoint_id
                );
            }
        }
        Vec::new()
    }

    async fn record_failure(
        &self,
        endpoint_id: &EndpointId,
        kind: Option<&ErrorKind>,
        error: &str,
        at: DateTime<Utc>,
    ) -> Vec<SyndicationEvent> {
        let configuration = kind == Some(&ErrorKind::Configuration);

        let (count, crossed) = {
            let mut entry = self
                .records
                .entry(endpoint_id.clone())
                .or_insert_with(|| FailureRecord::new(endpoint_id.clone(), self.config.threshold));
            entry.consecutive_failures += 1;
            entry.last_failure_at = Some(at);
            entry.last_error = Some(error.to_string());

            let crossed = !entry.disabled && (configuration || entry.consecutive_failures >= entry.threshold);
            if crossed {
                entry.disabled = true;
            }
            (entry.consecutive_failures, crossed)
        };

        let health = HealthUpdate::Failure {
            at,
            consecutive_failures: count,
        };
        if let Err(e) = self.registry.record_health(endpoint_id, health).await {
            tracing::debug!("health stamp for {} skipped: {}", endpoint_id, e);
            return Vec::new();
        }

        tracing::debug!(
            "endpoint {} failure {}/{}: {}",
            endpoint_id,
            count,
            self.config.threshold,
            error
        );

        if !crossed {
            return Vec::new();
        }

        let reason = if configuration {
            format!("configuration error: {}", error)
        } else {
            format!("{} consecutive failures, last: {}", count, error)
        };

        match self.registry.disable(endpoint_id).await {
            Ok(true) => {
                tracing::warn!("endpoint {} disabled: {}", endpoint_id, reason);
                vec![SyndicationEvent::EndpointDisabled {
                    endpoint_id: endpoint_id.clone(),
                    reason,
                    at,
                }]
            }
            Ok(false) => Vec::new(),
            Err(e) => {
                tracing::warn!("failed to disable endpoint {}: {}", endpoint_id, e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl SyndicationObserver for FailureMonitor {
    async fn on_event(&self, event: &SyndicationEvent) -> Vec<SyndicationEvent> {
        match event {
            SyndicationEvent::JobSucceeded { job, at, .. } => self.record_success(&job.endpoint_id, *at).await,
            SyndicationEvent::PullSucceeded { endpoint_id, at, .. } => self.record_success(endpoint_id, *at).await,
            SyndicationEvent::JobFailed { job, at } => {
                let error = job.last_error.as_deref().unwrap_or("unknown error");
                self.record_failure(&job.endpoint_id, job.error_kind.as_ref(), error, *at)
                    .await
            }
            SyndicationEvent::PullFailed {
                endpoint_id,
                failure,
                at,
            } => {
                self.record_failure(endpoint_id, Some(&failure.kind), &failure.message, *at)
                    .await
            }
            SyndicationEvent::JobAbandoned { .. } | SyndicationEvent::EndpointDisabled { .. } => Vec::new(),
        }
    }
}
