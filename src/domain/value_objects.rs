//! Value Objects - Immutable domain primitives
//!
//! Value objects are identified by their value rather than identity.
//! They are immutable and can be freely shared.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a fresh random identifier.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Identifier of a registered remote endpoint.
    EndpointId
);
string_id!(
    /// Identifier of an endpoint group.
    GroupId
);
string_id!(
    /// Identifier of a local content item.
    ContentId
);
string_id!(
    /// Identifier of a dispatch job record.
    JobId
);

/// Transport protocol spoken by an endpoint.
///
/// Closed set: every variant is bound to a concrete transport client at
/// start-up, so an unknown type fails registration instead of dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportType {
    /// XML-RPC push (`wp.newPost` / `wp.editPost` / `wp.deletePost`)
    XmlPush,
    /// REST push against the v1.1 posts API
    RestPush,
    /// REST push against the v2 posts API
    RestPushV2,
    /// RSS / Atom feed pull
    RssPull,
}

impl TransportType {
    pub const ALL: [TransportType; 4] = [
        TransportType::XmlPush,
        TransportType::RestPush,
        TransportType::RestPushV2,
        TransportType::RssPull,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::XmlPush => "xml_push",
            Self::RestPush => "rest_push",
            Self::RestPushV2 => "rest_push_v2",
            Self::RssPull => "rss_pull",
        }
    }

    /// Pull-type endpoints are read from, never pushed to.
    pub fn is_pull(&self) -> bool {
        matches!(self, Self::RssPull)
    }
}

impl std::str::FromStr for TransportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "xml_push" => Ok(Self::XmlPush),
            "rest_push" => Ok(Self::RestPush),
            "rest_push_v2" => Ok(Self::RestPushV2),
            "rss_pull" => Ok(Self::RssPull),
            other => Err(format!("unknown transport type: {:?}", other)),
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a dispatch job record.
///
/// `pending -> in_progress -> {succeeded | failed}`; a failed record is
/// either superseded by a retry record or marked `abandoned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
    Abandoned,
}

impl JobStatus {
    /// Open records block creation of another job for the same pair.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Abandoned => "abandoned",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(format!("unknown job status: {:?}", other)),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a dispatch job does at the remote end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobAction {
    /// Create or update the remote copy
    Push,
    /// Remove the remote copy
    Delete,
}

/// Classification of an ordinary remote failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    /// The call did not finish within its deadline
    Timeout,
    /// Connection refused, DNS failure, reset
    Network,
    /// Remote answered with a non-success HTTP status
    HttpStatus { status: u16 },
    /// Remote answered 2xx but the body could not be understood
    MalformedResponse,
    /// Remote understood the request and rejected it (XML-RPC fault)
    RemoteFault { code: i64 },
    /// Endpoint misconfigured: missing credentials, unusable target
    Configuration,
}

impl ErrorKind {
    /// Configuration problems never heal on their own.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Configuration)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Network => write!(f, "network"),
            Self::HttpStatus { status } => write!(f, "http {}", status),
            Self::MalformedResponse => write!(f, "malformed response"),
            Self::RemoteFault { code } => write!(f, "remote fault {}", code),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

/// Opaque credential blob attached to an endpoint.
///
/// The registry never interprets it; each transport client reads the keys
/// it needs (`username`, `password`, `token`). Values are redacted from
/// `Debug` output.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(BTreeMap<String, String>);

impl Credentials {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Credential names, without their values.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.keys().map(|k| (k, "***")))
            .finish()
    }
}
