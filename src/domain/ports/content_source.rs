//! Content Source Port
//!
//! Defines the interface to the external content store: change queries for
//! the push side, local authoring, and ingestion for pulled feed items.

use crate::domain::entities::ContentItem;
use crate::domain::value_objects::{ContentId, EndpointId};
use crate::error::ContentError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Read side of the content store.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Items modified at or after `since` (all items when `None`),
    /// ordered by creation time.
    async fn changed_since(&self, since: Option<DateTime<Utc>>) -> Result<Vec<ContentItem>, ContentError>;

    async fn get(&self, id: &ContentId) -> Result<ContentItem, ContentError>;
}

/// Summary of one ingestion batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Write side used by pull-type endpoints.
#[async_trait]
pub trait ContentSink: Send + Sync {
    /// Store pulled items keyed by (source endpoint, source guid).
    ///
    /// Existing items are overwritten only when `update_existing` is set.
    async fn ingest(
        &self,
        source: &EndpointId,
        items: Vec<ContentItem>,
        update_existing: bool,
    ) -> Result<IngestReport, ContentError>;
}

/// Write side for locally authored content.
#[async_trait]
pub trait ContentPublisher: Send + Sync {
    /// Insert or replace an item as given.
    async fn save_item(&self, item: ContentItem) -> Result<ContentItem, ContentError>;

    /// Mark an item deleted as of `at`.
    async fn trash_item(&self, id: &ContentId, at: DateTime<Utc>) -> Result<ContentItem, ContentError>;
}
