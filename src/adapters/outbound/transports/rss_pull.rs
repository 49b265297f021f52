//! RSS/Atom Pull Client
//!
//! Fetches a feed and turns its entries into content items. Supports
//! RSS 2.0, RSS 1.0 (RDF) and Atom. Each pull reads the whole feed once;
//! the next scheduled pull starts over.

use super::http::{self, malformed};
use super::xml::{parse_document, XmlNode};
use crate::domain::entities::{ContentItem, DeliveryFailure, DeliveryResult, Endpoint};
use crate::domain::ports::{PullOutcome, TransportClient};
use crate::domain::value_objects::{ContentId, TransportType};
use crate::error::ConfigurationError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Parse a feed document into content items.
///
/// Entries without any usable identifier (guid, id or link) are dropped.
pub fn parse_feed(xml: &str, fetched_at: DateTime<Utc>) -> Result<Vec<ContentItem>, String> {
    let root = parse_document(xml)?;
    let items = match root.name.as_str() {
        "rss" => {
            let channel = root.child("channel").ok_or("rss without channel")?;
            channel.children("item").filter_map(|i| rss_item(i, fetched_at)).collect()
        }
        "rdf:RDF" => root.children("item").filter_map(|i| rss_item(i, fetched_at)).collect(),
        "feed" => root.children("entry").filter_map(|e| atom_entry(e, fetched_at)).collect(),
        other => return Err(format!("not a feed: <{}>", other)),
    };
    Ok(items)
}

fn build_item(
    guid: String,
    title: Option<String>,
    body: Option<String>,
    categories: Vec<String>,
    published: DateTime<Utc>,
    updated: DateTime<Utc>,
) -> ContentItem {
    let mut item = ContentItem::new(ContentId::new(guid.clone()), title.unwrap_or_default(), body.unwrap_or_default());
    item.created_at = published;
    item.modified_at = updated.max(published);
    item.source_guid = Some(guid);
    if !categories.is_empty() {
        item = item.with_terms("category", categories);
    }
    item
}

fn rss_item(node: &XmlNode, fetched_at: DateTime<Utc>) -> Option<ContentItem> {
    let guid = node.child_text("guid").or_else(|| node.child_text("link"))?;
    let published = node
        .child_text("pubDate")
        .and_then(|d| DateTime::parse_from_rfc2822(&d).ok())
        .or_else(|| {
            node.child_text("dc:date")
                .and_then(|d| DateTime::parse_from_rfc3339(&d).ok())
        })
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or(fetched_at);
    let body = node
        .child_text("content:encoded")
        .or_else(|| node.child_text("description"));
    let categories = node
        .children("category")
        .map(|c| c.text.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();

    Some(build_item(guid, node.child_text("title"), body, categories, published, published))
}

fn atom_entry(node: &XmlNode, fetched_at: DateTime<Utc>) -> Option<ContentItem> {
    let link = node
        .children("link")
        .find(|l| l.attr("rel").map_or(true, |r| r == "alternate"))
        .and_then(|l| l.attr("href"))
        .map(str::to_string);
    let guid = node.child_text("id").or(link)?;

    let parse = |name: &str| {
        node.child_text(name)
            .and_then(|d| DateTime::parse_from_rfc3339(&d).ok())
            .map(|d| d.with_timezone(&Utc))
    };
    let updated = parse("updated");
    let published = parse("published").or(updated).unwrap_or(fetched_at);

    let body = node.child_text("content").or_else(|| node.child_text("summary"));
    let categories = node
        .children("category")
        .filter_map(|c| c.attr("term").map(str::to_string))
        .filter(|c| !c.is_empty())
        .collect();

    Some(build_item(
        guid,
        node.child_text("title"),
        body,
        categories,
        published,
        updated.unwrap_or(published),
    ))
}

/// Transport client for RSS/Atom pull endpoints.
pub struct RssPullClient {
    http: reqwest::Client,
}

impl RssPullClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn fetch(&self, url: &str) -> Result<Vec<ContentItem>, DeliveryFailure> {
        let request = self
            .http
            .get(url)
            .header("accept", "application/rss+xml, application/atom+xml, application/xml, text/xml");
        let body = http::send(request).await?;
        parse_feed(&body, Utc::now()).map_err(|e| malformed(format!("unreadable feed: {}", e)))
    }
}

#[async_trait]
impl TransportClient for RssPullClient {
    fn transport_type(&self) -> TransportType {
        TransportType::RssPull
    }

    async fn push(
        &self,
        _item: &ContentItem,
        _endpoint: &Endpoint,
        _remote_id: Option<&str>,
    ) -> Result<DeliveryResult, ConfigurationError> {
        Err(ConfigurationError::UnsupportedOperation {
            transport: TransportType::RssPull,
            operation: "push",
        })
    }

    async fn delete(&self, _remote_id: &str, _endpoint: &Endpoint) -> Result<DeliveryResult, ConfigurationError> {
        Err(ConfigurationError::UnsupportedOperation {
            transport: TransportType::RssPull,
            operation: "delete",
        })
    }

    async fn pull(&self, endpoint: &Endpoint) -> Result<PullOutcome, ConfigurationError> {
        let url = http::base_url(endpoint)?;
        Ok(match self.fetch(&url).await {
            Ok(items) => {
                tracing::debug!("pulled {} items from {}", items.len(), endpoint.id);
                PullOutcome::items(items)
            }
            Err(failure) => PullOutcome::failed(failure),
        })
    }

    async fn test_connection(&self, endpoint: &Endpoint) -> bool {
        match http::base_url(endpoint) {
            Ok(url) => self.fetch(&url).await.is_ok(),
            Err(_) => false,
        }
    }
}
