//! Syndication Events
//!
//! Typed events raised by the job runner, the failure monitor and the
//! retry scheduler, and the bus that delivers them to observers.
//!
//! Observers run one after another in registration order. An observer may
//! answer an event with follow-up events (the failure monitor raises
//! `EndpointDisabled` in response to `JobFailed`); follow-ups are delivered
//! after the current event has reached every observer.

use crate::domain::entities::{DeliveryFailure, DispatchJob};
use crate::domain::ports::IngestReport;
use crate::domain::value_objects::EndpointId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;

/// Something that happened in the dispatch pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum SyndicationEvent {
    /// A push or delete succeeded. `updated` is true when a push replaced
    /// an existing remote copy.
    JobSucceeded {
        job: DispatchJob,
        updated: bool,
        at: DateTime<Utc>,
    },
    /// A push or delete failed; `job` carries the error.
    JobFailed { job: DispatchJob, at: DateTime<Utc> },
    /// A job reached its terminal failure state.
    JobAbandoned {
        job: DispatchJob,
        reason: String,
        at: DateTime<Utc>,
    },
    /// The failure monitor disabled an endpoint.
    EndpointDisabled {
        endpoint_id: EndpointId,
        reason: String,
        at: DateTime<Utc>,
    },
    PullSucceeded {
        endpoint_id: EndpointId,
        report: IngestReport,
        at: DateTime<Utc>,
    },
    PullFailed {
        endpoint_id: EndpointId,
        failure: DeliveryFailure,
        at: DateTime<Utc>,
    },
}

impl SyndicationEvent {
    pub fn endpoint_id(&self) -> &EndpointId {
        match self {
            Self::JobSucceeded { job, .. } | Self::JobFailed { job, .. } | Self::JobAbandoned { job, .. } => {
                &job.endpoint_id
            }
            Self::EndpointDisabled { endpoint_id, .. }
            | Self::PullSucceeded { endpoint_id, .. }
            | Self::PullFailed { endpoint_id, .. } => endpoint_id,
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Self::JobSucceeded { at, .. }
            | Self::JobFailed { at, .. }
            | Self::JobAbandoned { at, .. }
            | Self::EndpointDisabled { at, .. }
            | Self::PullSucceeded { at, .. }
            | Self::PullFailed { at, .. } => *at,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::JobSucceeded { .. } => "job_succeeded",
            Self::JobFailed { .. } => "job_failed",
            Self::JobAbandoned { .. } => "job_abandoned",
            Self::EndpointDisabled { .. } => "endpoint_disabled",
            Self::PullSucceeded { .. } => "pull_succeeded",
            Self::PullFailed { .. } => "pull_failed",
        }
    }
}

/// Subscriber to syndication events.
#[async_trait]
pub trait SyndicationObserver: Send + Sync {
    /// Handle one event, returning any follow-up events it causes.
    async fn on_event(&self, event: &SyndicationEvent) -> Vec<SyndicationEvent>;
}

/// Ordered registry of observers.
#[derive(Default)]
pub struct EventBus {
    observers: RwLock<Vec<Arc<dyn SyndicationObserver>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer after all previously registered ones.
    pub fn subscribe(&self, observer: Arc<dyn SyndicationObserver>) {
        self.observers.write().push(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    /// Deliver `event` and every follow-up it causes.
    pub async fn emit(&self, event: SyndicationEvent) {
        let observers = self.observers.read().clone();
        let mut queue = VecDeque::from([event]);

        while let Some(event) = queue.pop_front() {
            tracing::debug!(endpoint = %event.endpoint_id(), "event {}", event.name());
            for observer in &observers {
                queue.extend(observer.on_event(&event).await);
            }
        }
    }

    pub async fn emit_all(&self, events: Vec<SyndicationEvent>) {
        for event in events {
            self.emit(event).await;
        }
    }
}
