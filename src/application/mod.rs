//! Application Layer
//!
//! Use cases and the observers that react to dispatch outcomes.

pub mod event_counter;
pub mod events;
pub mod failure_monitor;
pub mod job_runner;
pub mod notifier;
pub mod retry_scheduler;
pub mod syndication_service;

pub use event_counter::{EventCounter, EventCounts, WindowCounts};
pub use events::{EventBus, SyndicationEvent, SyndicationObserver};
pub use failure_monitor::{FailureMonitor, FailureMonitorConfig};
pub use job_runner::{CancelFlag, DispatchReport, EnqueueReport, JobRunner, RunnerSettings};
pub use notifier::Notifier;
pub use retry_scheduler::RetryScheduler;
pub use syndication_service::{
    CycleOutcome, CycleReport, EndpointStats, PullSummary, ServiceSettings, SyndicationDeps,
    SyndicationService, SyndicationStats,
};
