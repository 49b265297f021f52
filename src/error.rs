//! Error Types
//!
//! Remote delivery failures are not errors: transport clients report them as
//! `DeliveryResult` values. The types here cover invalid input, missing
//! records, misconfigured endpoints and storage faults.

use crate::domain::value_objects::{ContentId, EndpointId, GroupId, JobId, JobStatus, TransportType};
use thiserror::Error;

/// Result alias for top-level syndication operations.
pub type Result<T> = std::result::Result<T, SyndicationError>;

/// Errors raised by the endpoint registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("endpoint not found: {0}")]
    EndpointNotFound(EndpointId),

    #[error("group not found: {0}")]
    GroupNotFound(GroupId),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("group {0} is still referenced by endpoints or child groups")]
    GroupInUse(GroupId),

    #[error("{0} cannot be changed after creation")]
    ImmutableField(&'static str),
}

impl RegistryError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::EndpointNotFound(_) | Self::GroupNotFound(_))
    }
}

/// Endpoint configuration problems detected while talking to a remote.
///
/// These are fatal to the call and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("endpoint {endpoint_id} is missing credential `{key}`")]
    MissingCredential {
        endpoint_id: EndpointId,
        key: &'static str,
    },

    #[error("endpoint {endpoint_id} has an unusable target url: {reason}")]
    MalformedTarget {
        endpoint_id: EndpointId,
        reason: String,
    },

    #[error("{transport} does not support {operation}")]
    UnsupportedOperation {
        transport: TransportType,
        operation: &'static str,
    },
}

/// Errors raised by the dispatch job store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),

    /// Internal guard: an open job already exists for the pair.
    #[error("an open job already exists for content {content_id} on endpoint {endpoint_id}")]
    DuplicateJob {
        content_id: ContentId,
        endpoint_id: EndpointId,
    },

    #[error("job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
}

/// Errors raised by the SQLite endpoint store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("background task failed: {0}")]
    Join(String),
}

/// Errors raised by the content store collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    #[error("content source unavailable: {0}")]
    Unavailable(String),

    #[error("content item not found: {0}")]
    NotFound(ContentId),
}

/// Top-level error for syndication operations.
#[derive(Debug, Error)]
pub enum SyndicationError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Job(#[from] JobStoreError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Content(#[from] ContentError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_messages() {
        let err = RegistryError::EndpointNotFound(EndpointId::new("ep-9"));
        assert_eq!(err.to_string(), "endpoint not found: ep-9");
        assert!(err.is_not_found());

        let err = RegistryError::validation("target_url is empty");
        assert!(err.to_string().contains("target_url"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_configuration_error_message_names_key() {
        let err = ConfigurationError::MissingCredential {
            endpoint_id: EndpointId::new("ep-1"),
            key: "password",
        };
        assert!(err.to_string().contains("`password`"));
    }

    #[test]
    fn test_syndication_error_from_conversions() {
        let err: SyndicationError = RegistryError::GroupNotFound(GroupId::new("g")).into();
        assert!(matches!(err, SyndicationError::Registry(_)));

        let err: SyndicationError = JobStoreError::NotFound(JobId::new("j")).into();
        assert!(err.to_string().contains("job not found"));
    }
}
