//! REST Push Clients
//!
//! Two generations of the WordPress REST API:
//! - `RestPushClient`: the v1.1 site API (`/posts/new`, `/posts/{id}`,
//!   `/posts/{id}/delete`) with an OAuth bearer `token`.
//! - `RestPushV2Client`: the core `wp/v2/posts` API with basic auth
//!   (`username` + application `password`).

use super::http::{self, malformed};
use crate::domain::entities::{ContentItem, DeliveryFailure, DeliveryResult, Endpoint};
use crate::domain::ports::TransportClient;
use crate::domain::value_objects::TransportType;
use crate::error::ConfigurationError;
use async_trait::async_trait;
use serde_json::{json, Value};

fn into_result(outcome: Result<Option<String>, DeliveryFailure>) -> DeliveryResult {
    match outcome {
        Ok(remote_id) => DeliveryResult::ok(remote_id),
        Err(failure) => DeliveryResult::failed(failure.kind, failure.message),
    }
}

fn parse_json(body: &str) -> Result<Value, DeliveryFailure> {
    serde_json::from_str(body).map_err(|e| malformed(format!("invalid JSON response: {}", e)))
}

fn remote_id_from(body: &str, key: &str) -> Result<Option<String>, DeliveryFailure> {
    let value = parse_json(body)?;
    http::id_field(&value, key)
        .map(Some)
        .ok_or_else(|| malformed(format!("response has no `{}` field", key)))
}

fn terms(item: &ContentItem, taxonomy: &str) -> Vec<String> {
    item.taxonomy.get(taxonomy).cloned().unwrap_or_default()
}

/// Transport client for the v1.1 REST API.
pub struct RestPushClient {
    http: reqwest::Client,
}

impl RestPushClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn payload(item: &ContentItem) -> Value {
        json!({
            "title": item.title,
            "content": item.body,
            "status": "publish",
            "date": item.created_at.to_rfc3339(),
            "categories": terms(item, "category").join(","),
            "tags": terms(item, "post_tag").join(","),
        })
    }
}

#[async_trait]
impl TransportClient for RestPushClient {
    fn transport_type(&self) -> TransportType {
        TransportType::RestPush
    }

    async fn push(
        &self,
        item: &ContentItem,
        endpoint: &Endpoint,
        remote_id: Option<&str>,
    ) -> Result<DeliveryResult, ConfigurationError> {
        let base = http::base_url(endpoint)?;
        let token = http::require(endpoint, "token")?;

        let url = match remote_id {
            Some(id) => format!("{}/posts/{}", base, id),
            None => format!("{}/posts/new", base),
        };
        let request = self.http.post(url).bearer_auth(token).json(&Self::payload(item));

        let outcome = match http::send(request).await {
            Ok(body) => remote_id_from(&body, "ID"),
            Err(failure) => Err(failure),
        };
        Ok(into_result(outcome))
    }

    async fn delete(&self, remote_id: &str, endpoint: &Endpoint) -> Result<DeliveryResult, ConfigurationError> {
        let base = http::base_url(endpoint)?;
        let token = http::require(endpoint, "token")?;

        let request = self
            .http
            .post(format!("{}/posts/{}/delete", base, remote_id))
            .bearer_auth(token);
        Ok(into_result(http::send(request).await.map(|_| None)))
    }

    async fn test_connection(&self, endpoint: &Endpoint) -> bool {
        let (Ok(base), Ok(token)) = (http::base_url(endpoint), http::require(endpoint, "token")) else {
            return false;
        };
        http::send(self.http.get(base).bearer_auth(token)).await.is_ok()
    }
}

/// Transport client for the `wp/v2` REST API.
pub struct RestPushV2Client {
    http: reqwest::Client,
}

impl RestPushV2Client {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    fn credentials(endpoint: &Endpoint) -> Result<(&str, &str), ConfigurationError> {
        Ok((
            http::require(endpoint, "username")?,
            http::require(endpoint, "password")?,
        ))
    }

    fn payload(item: &ContentItem) -> Value {
        json!({
            "title": item.title,
            "content": item.body,
            "status": "publish",
            "date_gmt": item.created_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
        })
    }
}

#[async_trait]
impl TransportClient for RestPushV2Client {
    fn transport_type(&self) -> TransportType {
        TransportType::RestPushV2
    }

    async fn push(
        &self,
        item: &ContentItem,
        endpoint: &Endpoint,
        remote_id: Option<&str>,
    ) -> Result<DeliveryResult, ConfigurationError> {
        let base = http::base_url(endpoint)?;
        let (username, password) = Self::credentials(endpoint)?;

        let url = match remote_id {
            Some(id) => format!("{}/wp/v2/posts/{}", base, id),
            None => format!("{}/wp/v2/posts", base),
        };
        let request = self
            .http
            .post(url)
            .basic_auth(username, Some(password))
            .json(&Self::payload(item));

        let outcome = match http::send(request).await {
            Ok(body) => remote_id_from(&body, "id"),
            Err(failure) => Err(failure),
        };
        Ok(into_result(outcome))
    }

    async fn delete(&self, remote_id: &str, endpoint: &Endpoint) -> Result<DeliveryResult, ConfigurationError> {
        let base = http::base_url(endpoint)?;
        let (username, password) = Self::credentials(endpoint)?;

        let request = self
            .http
            .delete(format!("{}/wp/v2/posts/{}", base, remote_id))
            .query(&[("force", "true")])
            .basic_auth(username, Some(password));
        Ok(into_result(http::send(request).await.map(|_| None)))
    }

    async fn test_connection(&self, endpoint: &Endpoint) -> bool {
        let (Ok(base), Ok((username, password))) = (http::base_url(endpoint), Self::credentials(endpoint)) else {
            return false;
        };
        let request = self
            .http
            .get(format!("{}/wp/v2/users/me", base))
            .basic_auth(username, Some(password));
        http::send(request).await.is_ok()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::domain::value_objects::ErrorKind;

    #[test]
    fn test_remote_id_from_number_and_string() {
        assert_eq!(remote_id_from(r#"{"ID": 12}"#, "ID").unwrap().as_deref(), Some("12"));
        assert_eq!(remote_id_from(r#"{"id": "9"}"#, "id").unwrap().as_deref(), Some("9"));
    }

    #[test]
    fn test_remote_id_missing_is_malformed() {
        let err = remote_id_from(r#"{"other": 1}"#, "id").unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedResponse);

        let err = remote_id_from("<html>", "id").unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedResponse);
    }

    #[test]
    fn test_v1_payload_joins_terms() {
        let item = ContentItem::new("c", "T", "B")
            .with_terms("category", vec!["a".to_string(), "b".to_string()])
            .with_terms("post_tag", vec!["x".to_string()]);
        let payload = RestPushClient::payload(&item);
        assert_eq!(payload["categories"], "a,b");
        assert_eq!(payload["tags"], "x");
        assert_eq!(payload["status"], "publish");
    }
}
