//! Domain Entities - Core business objects
//!
//! These entities represent the core concepts of the syndication domain.
//! They have no external dependencies and contain only business logic.

use crate::domain::value_objects::{
    ContentId, Credentials, EndpointId, ErrorKind, GroupId, JobAction, JobId, JobStatus,
    TransportType,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A registered remote destination that receives syndicated content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,
    /// Human readable label
    pub name: String,
    /// Protocol used to talk to the endpoint; fixed at registration
    pub transport_type: TransportType,
    /// Base URL (XML-RPC endpoint, REST API root or feed URL)
    pub target_url: String,
    pub credentials: Credentials,
    pub group_ids: BTreeSet<GroupId>,
    /// Only written by the registry's enable/disable operations
    pub enabled: bool,
    pub consecutive_failures: u32,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Last completed pull (pull-type endpoints only)
    pub last_pull_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Registration request for a new endpoint.
///
/// `transport_type` is kept as the raw string so that an unknown value is
/// reported as a validation error by the registry.
#[derive(Debug, Clone, Deserialize)]
pub struct NewEndpoint {
    pub name: String,
    pub transport_type: String,
    pub target_url: String,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub group_ids: BTreeSet<GroupId>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl NewEndpoint {
    pub fn new(name: impl Into<String>, transport_type: TransportType, target_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport_type: transport_type.as_str().to_string(),
            target_url: target_url.into(),
            credentials: Credentials::default(),
            group_ids: BTreeSet::new(),
            enabled: true,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn in_group(mut self, group_id: GroupId) -> Self {
        self.group_ids.insert(group_id);
        self
    }
}

/// Partial update of an endpoint. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointUpdate {
    pub name: Option<String>,
    pub target_url: Option<String>,
    pub credentials: Option<Credentials>,
    pub group_ids: Option<BTreeSet<GroupId>>,
    /// Accepted only when equal to the current type
    pub transport_type: Option<String>,
}

/// Selection criteria for listing endpoints. Unset fields match everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointFilter {
    pub group: Option<GroupId>,
    pub transport_type: Option<TransportType>,
    pub enabled: Option<bool>,
}

impl EndpointFilter {
    pub fn enabled() -> Self {
        Self {
            enabled: Some(true),
            ..Default::default()
        }
    }

    pub fn matches(&self, endpoint: &Endpoint) -> bool {
        if let Some(group) = &self.group {
            if !endpoint.group_ids.contains(group) {
                return false;
            }
        }
        if let Some(t) = self.transport_type {
            if endpoint.transport_type != t {
                return false;
            }
        }
        if let Some(enabled) = self.enabled {
            if endpoint.enabled != enabled {
                return false;
            }
        }
        true
    }
}

/// Health stamp written back to an endpoint by the failure monitor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HealthUpdate {
    Success { at: DateTime<Utc> },
    Failure { at: DateTime<Utc>, consecutive_failures: u32 },
    Pulled { at: DateTime<Utc> },
    Reset,
}

/// A named, hierarchical collection of endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub parent_id: Option<GroupId>,
}

/// What happens to references when a group is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupDeletePolicy {
    /// Refuse while endpoints or child groups reference the group
    #[default]
    Block,
    /// Move members and children to the deleted group's parent
    ReassignToParent,
}

/// Publication state of a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Published,
    Deleted,
}

/// Which endpoints a content item is syndicated to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriptions {
    #[serde(default)]
    pub endpoints: BTreeSet<EndpointId>,
    #[serde(default)]
    pub groups: BTreeSet<GroupId>,
}

/// A locally authored (or pulled) post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ContentId,
    pub title: String,
    pub body: String,
    /// Taxonomy name -> terms (e.g. "category" -> ["news"])
    #[serde(default)]
    pub taxonomy: BTreeMap<String, Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub status: ContentStatus,
    #[serde(default)]
    pub subscriptions: Subscriptions,
    /// Remote guid for items ingested from a feed
    #[serde(default)]
    pub source_guid: Option<String>,
}

impl ContentItem {
    pub fn new(id: impl Into<ContentId>, title: impl Into<String>, body: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            taxonomy: BTreeMap::new(),
            created_at: now,
            modified_at: now,
            status: ContentStatus::Published,
            subscriptions: Subscriptions::default(),
            source_guid: None,
        }
    }

    pub fn subscribe_endpoint(mut self, id: EndpointId) -> Self {
        self.subscriptions.endpoints.insert(id);
        self
    }

    pub fn subscribe_group(mut self, id: GroupId) -> Self {
        self.subscriptions.groups.insert(id);
        self
    }

    pub fn with_terms(mut self, taxonomy: impl Into<String>, terms: Vec<String>) -> Self {
        self.taxonomy.insert(taxonomy.into(), terms);
        self
    }

    pub fn is_deleted(&self) -> bool {
        self.status == ContentStatus::Deleted
    }
}

/// Body of an authoring request; the service stamps ids and timestamps.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentDraft {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub taxonomy: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub subscriptions: Subscriptions,
}

/// The unit of work "deliver this content item to this endpoint".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchJob {
    pub id: JobId,
    pub content_id: ContentId,
    pub endpoint_id: EndpointId,
    pub action: JobAction,
    /// 1 for the first attempt, incremented on each retry record
    pub attempt_count: u32,
    pub status: JobStatus,
    /// Not eligible for processing before this instant
    pub scheduled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Creation time of the content, used to order an endpoint's queue
    pub content_created_at: DateTime<Utc>,
    /// Content revision (modified_at) this job delivers
    pub content_revision: DateTime<Utc>,
    pub last_error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub remote_id: Option<String>,
    /// Failed record this job retries
    pub retry_of: Option<JobId>,
    /// Monotonic creation sequence inside the store
    pub seq: u64,
}

impl DispatchJob {
    pub fn pair(&self) -> (ContentId, EndpointId) {
        (self.content_id.clone(), self.endpoint_id.clone())
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.scheduled_at <= now
    }

    /// Retryable unless the recorded error says otherwise.
    pub fn is_retryable(&self) -> bool {
        self.error_kind
            .as_ref()
            .map(ErrorKind::is_retryable)
            .unwrap_or(true)
    }
}

/// Failure tracking state for one endpoint, owned by the failure monitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub endpoint_id: EndpointId,
    pub consecutive_failures: u32,
    pub threshold: u32,
    pub disabled: bool,
    pub last_error: Option<String>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
}

impl FailureRecord {
    pub fn new(endpoint_id: EndpointId, threshold: u32) -> Self {
        Self {
            endpoint_id,
            consecutive_failures: 0,
            threshold,
            disabled: false,
            last_error: None,
            last_failure_at: None,
            last_success_at: None,
        }
    }
}

/// Failure detail carried by an unsuccessful delivery or pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryFailure {
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of a single push or delete call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub success: bool,
    pub remote_id: Option<String>,
    pub error: Option<DeliveryFailure>,
}

impl DeliveryResult {
    pub fn ok(remote_id: Option<String>) -> Self {
        Self {
            success: true,
            remote_id,
            error: None,
        }
    }

    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            remote_id: None,
            error: Some(DeliveryFailure {
                kind,
                message: message.into(),
            }),
        }
    }

    pub fn error_kind(&self) -> Option<&ErrorKind> {
        self.error.as_ref().map(|e| &e.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(transport_type: TransportType, enabled: bool) -> Endpoint {
        Endpoint {
            id: EndpointId::new("ep-1"),
            name: "partner".to_string(),
            transport_type,
            target_url: "https://partner.example/xmlrpc.php".to_string(),
            credentials: Credentials::default(),
            group_ids: [GroupId::new("news")].into_iter().collect(),
            enabled,
            consecutive_failures: 0,
            last_success_at: None,
            last_failure_at: None,
            last_pull_at: None,
            created_at: Utc::now(),
        }
    }

    // ===== EndpointFilter Tests =====

    #[test]
    fn test_filter_default_matches_everything() {
        let filter = EndpointFilter::default();
        assert!(filter.matches(&endpoint(TransportType::XmlPush, true)));
        assert!(filter.matches(&endpoint(TransportType::RssPull, false)));
    }

    #[test]
    fn test_filter_by_group() {
        let ep = endpoint(TransportType::XmlPush, true);
        let hit = EndpointFilter {
            group: Some(GroupId::new("news")),
            ..Default::default()
        };
        let miss = EndpointFilter {
            group: Some(GroupId::new("sports")),
            ..Default::default()
        };
        assert!(hit.matches(&ep));
        assert!(!miss.matches(&ep));
    }

    #[test]
    fn test_filter_by_transport_and_enabled() {
        let filter = EndpointFilter {
            transport_type: Some(TransportType::RestPush),
            enabled: Some(true),
            ..Default::default()
        };
        assert!(filter.matches(&endpoint(TransportType::RestPush, true)));
        assert!(!filter.matches(&endpoint(TransportType::RestPush, false)));
        assert!(!filter.matches(&endpoint(TransportType::XmlPush, true)));
    }

    // ===== DeliveryResult Tests =====

    #[test]
    fn test_delivery_result_constructors() {
        let ok = DeliveryResult::ok(Some("42".to_string()));
        assert!(ok.success);
        assert!(ok.error.is_none());

        let failed = DeliveryResult::failed(ErrorKind::Timeout, "deadline");
        assert!(!failed.success);
        assert_eq!(failed.error_kind(), Some(&ErrorKind::Timeout));
    }

    // ===== ContentItem Tests =====

    #[test]
    fn test_content_item_builders() {
        let item = ContentItem::new("post-1", "Hello", "World")
            .subscribe_group(GroupId::new("g"))
            .subscribe_endpoint(EndpointId::new("e"))
            .with_terms("category", vec!["news".to_string()]);

        assert_eq!(item.status, ContentStatus::Published);
        assert!(item.subscriptions.groups.contains(&GroupId::new("g")));
        assert!(item.subscriptions.endpoints.contains(&EndpointId::new("e")));
        assert_eq!(item.taxonomy["category"], vec!["news".to_string()]);
        assert!(!item.is_deleted());
    }

    #[test]
    fn test_new_endpoint_deserialize_defaults() {
        let req: NewEndpoint = serde_json::from_value(serde_json::json!({
            "name": "partner",
            "transport_type": "rest_push_v2",
            "target_url": "https://partner.example/wp-json"
        }))
        .unwrap();

        assert!(req.enabled);
        assert!(req.group_ids.is_empty());
        assert!(req.credentials.is_empty());
    }

    #[test]
    fn test_failure_record_new() {
        let record = FailureRecord::new(EndpointId::new("ep"), 5);
        assert_eq!(record.consecutive_failures, 0);
        assert_eq!(record.threshold, 5);
        assert!(!record.disabled);
    }
}
