//! Notification Sink Port
//!
//! Defines the interface for delivering operator-facing alerts.

use crate::domain::value_objects::{ContentId, EndpointId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of an operator alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Endpoint disabled after repeated failures or a configuration error
    EndpointDisabled,
    /// A dispatch job exhausted its retries
    JobAbandoned,
    /// Content pushed to an endpoint for the first time
    New,
    /// Existing remote copy updated
    Edit,
    /// Remote copy deleted
    Delete,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EndpointDisabled => "disabled",
            Self::JobAbandoned => "abandoned",
            Self::New => "new",
            Self::Edit => "edit",
            Self::Delete => "delete",
        }
    }

    /// Parse the short names used in configuration.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "disabled" => Some(Self::EndpointDisabled),
            "abandoned" => Some(Self::JobAbandoned),
            "new" => Some(Self::New),
            "edit" => Some(Self::Edit),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An operator-facing alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub endpoint_id: EndpointId,
    pub kind: NotificationKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_id: Option<ContentId>,
}

/// Destination for alerts (log, chat webhook, email gateway).
///
/// Implementations swallow their own delivery problems; a failing sink must
/// never affect dispatch.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &Notification);
}
