//! HTTP plumbing shared by the transport clients: client construction,
//! failure classification and credential/target checks.

use crate::domain::entities::{DeliveryFailure, Endpoint};
use crate::domain::value_objects::ErrorKind;
use crate::error::ConfigurationError;
use reqwest::RequestBuilder;
use std::time::Duration;

const USER_AGENT: &str = concat!("syndication/", env!("CARGO_PKG_VERSION"));
const MAX_ERROR_BODY: usize = 512;

/// Build the shared HTTP client with a per-request timeout.
pub fn build_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
}

/// Send a request and return the body of a 2xx response.
///
/// Every ordinary remote failure comes back as a `DeliveryFailure`.
pub async fn send(request: RequestBuilder) -> Result<String, DeliveryFailure> {
    let response = request.send().await.map_err(|e| send_failure(&e))?;
    let status = response.status();
    let body = response.text().await.map_err(|e| DeliveryFailure {
        kind: ErrorKind::MalformedResponse,
        message: format!("failed to read response body: {}", e),
    })?;

    if !status.is_success() {
        return Err(DeliveryFailure {
            kind: ErrorKind::HttpStatus {
                status: status.as_u16(),
            },
            message: format!("{}: {}", status, truncate(&body)),
        });
    }
    Ok(body)
}

/// Classify a request that produced no response.
pub fn send_failure(e: &reqwest::Error) -> DeliveryFailure {
    if e.is_timeout() {
        DeliveryFailure {
            kind: ErrorKind::Timeout,
            message: format!("request timed out: {}", e),
        }
    } else {
        DeliveryFailure {
            kind: ErrorKind::Network,
            message: format!("request failed: {}", e),
        }
    }
}

pub fn malformed(message: impl Into<String>) -> DeliveryFailure {
    DeliveryFailure {
        kind: ErrorKind::MalformedResponse,
        message: message.into(),
    }
}

/// The endpoint's target URL without a trailing slash.
pub fn base_url(endpoint: &Endpoint) -> Result<String, ConfigurationError> {
    let parsed = url::Url::parse(&endpoint.target_url).map_err(|e| ConfigurationError::MalformedTarget {
        endpoint_id: endpoint.id.clone(),
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigurationError::MalformedTarget {
            endpoint_id: endpoint.id.clone(),
            reason: format!("unsupported scheme {}", parsed.scheme()),
        });
    }
    Ok(endpoint.target_url.trim_end_matches('/').to_string())
}

/// A credential the transport cannot work without.
pub fn require<'a>(endpoint: &'a Endpoint, key: &'static str) -> Result<&'a str, ConfigurationError> {
    endpoint
        .credentials
        .get(key)
        .ok_or_else(|| ConfigurationError::MissingCredential {
            endpoint_id: endpoint.id.clone(),
            key,
        })
}

/// Read an id that remote APIs return either as a number or a string.
pub fn id_field(value: &serde_json::Value, key: &str) -> Option<String> {
    match value.get(key)? {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &body[..end])
}
