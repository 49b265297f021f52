//! In-Memory Content Store
//!
//! Local content collaborator: the change feed the job runner reads from
//! and the sink that pulled feed items are ingested into.

use crate::domain::entities::{ContentItem, ContentStatus};
use crate::domain::ports::{ContentPublisher, ContentSink, ContentSource, IngestReport};
use crate::domain::value_objects::{ContentId, EndpointId};
use crate::error::ContentError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// DashMap-backed content store.
pub struct MemoryContentStore {
    items: Arc<DashMap<ContentId, ContentItem>>,
    /// (source endpoint, remote guid) -> local item
    pulled: Arc<DashMap<(EndpointId, String), ContentId>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self {
            items: Arc::new(DashMap::new()),
            pulled: Arc::new(DashMap::new()),
        }
    }

    /// Insert or replace a locally authored item.
    pub fn publish(&self, item: ContentItem) {
        tracing::debug!("content {} published", item.id);
        self.items.insert(item.id.clone(), item);
    }

    /// Mark an item deleted at `at`. Returns false if the item is unknown.
    pub fn trash(&self, id: &ContentId, at: DateTime<Utc>) -> bool {
        match self.items.get_mut(id) {
            Some(mut item) => {
                item.status = ContentStatus::Deleted;
                item.modified_at = at;
                tracing::debug!("content {} trashed", id);
                true
            }
            None => false,
        }
    }

    /// Local id of an item pulled from `source` with `guid`.
    pub fn pulled_item(&self, source: &EndpointId, guid: &str) -> Option<ContentId> {
        self.pulled
            .get(&(source.clone(), guid.to_string()))
            .map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Default for MemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentSource for MemoryContentStore {
    async fn changed_since(&self, since: Option<DateTime<Utc>>) -> Result<Vec<ContentItem>, ContentError> {
        let mut changed: Vec<ContentItem> = self
            .items
            .iter()
            .filter(|e| since.map_or(true, |s| e.modified_at >= s))
            .map(|e| e.value().clone())
            .collect();
        changed.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(changed)
    }

    async fn get(&self, id: &ContentId) -> Result<ContentItem, ContentError> {
        self.items
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| ContentError::NotFound(id.clone()))
    }
}

#[async_trait]
impl ContentPublisher for MemoryContentStore {
    async fn save_item(&self, item: ContentItem) -> Result<ContentItem, ContentError> {
        self.publish(item.clone());
        Ok(item)
    }

    async fn trash_item(&self, id: &ContentId, at: DateTime<Utc>) -> Result<ContentItem, ContentError> {
        if !self.trash(id, at) {
            return Err(ContentError::NotFound(id.clone()));
        }
        self.get(id).await
    }
}

#[async_trait]
impl ContentSink for MemoryContentStore {
    async fn ingest(
        &self,
        source: &EndpointId,
        items: Vec<ContentItem>,
        update_existing: bool,
    ) -> Result<IngestReport, ContentError> {
        let mut report = IngestReport::default();

        for mut item in items {
            let Some(guid) = item.source_guid.clone() else {
                report.skipped += 1;
                continue;
            };

            let key = (source.clone(), guid);
            let existing = self.pulled.get(&key).map(|e| e.value().clone());
            match existing {
                Some(local_id) => {
                    if !update_existing {
                        report.skipped += 1;
                        continue;
                    }
                    let Some(mut current) = self.items.get_mut(&local_id) else {
                        report.skipped += 1;
                        continue;
                    };
                    let unchanged = current.title == item.title
                        && current.body == item.body
                        && current.taxonomy == item.taxonomy;
                    if unchanged {
                        report.skipped += 1;
                        continue;
                    }
                    current.title = item.title;
                    current.body = item.body;
                    current.taxonomy = item.taxonomy;
                    current.modified_at = item.modified_at.max(current.modified_at);
                    report.updated += 1;
                }
                None => {
                    item.id = ContentId::generate();
                    self.pulled.insert(key, item.id.clone());
                    self.items.insert(item.id.clone(), item);
                    report.inserted += 1;
                }
            }
        }

        tracing::debug!(
            "ingested from {}: inserted={} updated={} skipped={}",
            source,
            report.inserted,
            report.updated,
            report.skipped
        );
        Ok(report)
    }
}
