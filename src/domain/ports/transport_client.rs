//! Transport Client Port
//!
//! Defines the protocol-independent contract every transport variant
//! implements.

use crate::domain::entities::{ContentItem, DeliveryFailure, DeliveryResult, Endpoint};
use crate::domain::value_objects::TransportType;
use crate::error::ConfigurationError;
use async_trait::async_trait;
use std::sync::Arc;

/// Result of a pull: the items read this invocation, or the failure.
///
/// A pull is finite and stateless: the next scheduled pull starts over
/// from the feed head.
#[derive(Debug, Clone, PartialEq)]
pub struct PullOutcome {
    pub items: Vec<ContentItem>,
    pub error: Option<DeliveryFailure>,
}

impl PullOutcome {
    pub fn items(items: Vec<ContentItem>) -> Self {
        Self { items, error: None }
    }

    pub fn failed(failure: DeliveryFailure) -> Self {
        Self {
            items: Vec::new(),
            error: Some(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// A protocol-specific client for one transport type.
///
/// Ordinary remote failures (timeouts, 4xx/5xx, unreadable bodies) are
/// returned as unsuccessful `DeliveryResult`s. Only configuration problems
/// are returned as `Err`.
#[async_trait]
pub trait TransportClient: Send + Sync {
    fn transport_type(&self) -> TransportType;

    /// Create the remote copy, or update it when `remote_id` is known.
    async fn push(
        &self,
        item: &ContentItem,
        endpoint: &Endpoint,
        remote_id: Option<&str>,
    ) -> Result<DeliveryResult, ConfigurationError>;

    /// Remove a previously pushed remote copy.
    async fn delete(&self, remote_id: &str, endpoint: &Endpoint) -> Result<DeliveryResult, ConfigurationError>;

    /// Read items from a pull-type endpoint.
    async fn pull(&self, endpoint: &Endpoint) -> Result<PullOutcome, ConfigurationError> {
        let _ = endpoint;
        Err(ConfigurationError::UnsupportedOperation {
            transport: self.transport_type(),
            operation: "pull",
        })
    }

    /// Lightweight reachability check for the admin surface.
    async fn test_connection(&self, endpoint: &Endpoint) -> bool;
}

/// Binds every transport type to its client.
pub trait TransportLookup: Send + Sync {
    fn client(&self, transport_type: TransportType) -> Arc<dyn TransportClient>;
}
