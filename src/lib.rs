//! Content Syndication Library
//!
//! Pushes locally published content to remote sites, pulls feeds from
//! remote sites, and watches endpoint health. Exposed as a library for the
//! binary and for integration tests.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{CycleOutcome, CycleReport, ServiceSettings, SyndicationDeps, SyndicationService};
pub use config::{load_config, Config};
pub use domain::entities::{ContentItem, DispatchJob, Endpoint, Group, NewEndpoint};
pub use domain::ports::{ContentPublisher, ContentSink, ContentSource, EndpointRegistry, JobStore, NotificationSink, TransportClient};
pub use domain::value_objects::{ContentId, EndpointId, GroupId, JobId, JobStatus, TransportType};
pub use error::{Result, SyndicationError};
