//! Integration tests for the transport clients with Wiremock
//!
//! Each client is pointed at a mock server and checked for the requests it
//! sends and the way it reads (or fails to read) the responses.

use chrono::Utc;
use std::collections::BTreeSet;
use syndication::adapters::outbound::{
    RestPushClient, RestPushV2Client, RssPullClient, WebhookNotificationSink, XmlPushClient,
};
use syndication::domain::entities::{ContentItem, Endpoint};
use syndication::domain::ports::{Notification, NotificationKind, NotificationSink, TransportClient};
use syndication::domain::value_objects::{Credentials, EndpointId, ErrorKind, TransportType};
use wiremock::matchers::{body_partial_json, body_string_contains, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn endpoint(transport_type: TransportType, target_url: String, credentials: Credentials) -> Endpoint {
    Endpoint {
        id: EndpointId::new("ep-1"),
        name: "partner".to_string(),
        transport_type,
        target_url,
        credentials,
        group_ids: BTreeSet::new(),
        enabled: true,
        consecutive_failures: 0,
        last_success_at: None,
        last_failure_at: None,
        last_pull_at: None,
        created_at: Utc::now(),
    }
}

fn wp_login() -> Credentials {
    Credentials::new().with("username", "editor").with("password", "secret")
}

fn post() -> ContentItem {
    ContentItem::new("post-1", "Hello", "<p>World</p>").with_terms("category", vec!["news".to_string()])
}

fn xml_value(inner: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?><methodResponse><params><param><value>{}</value></param></params></methodResponse>",
        inner
    )
}

// ===== XML-RPC Push =====

/// Test that a first push calls wp.newPost and keeps the returned id
#[tokio::test]
async fn test_xml_push_new_post() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/xmlrpc.php"))
        .and(body_string_contains("<methodName>wp.newPost</methodName>"))
        .and(body_string_contains("<string>Hello</string>"))
        .respond_with(ResponseTemplate::new(200).set_body_string(xml_value("<string>321</string>")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = XmlPushClient::new(reqwest::Client::new());
    let ep = endpoint(
        TransportType::XmlPush,
        format!("{}/xmlrpc.php", mock_server.uri()),
        wp_login(),
    );

    let result = client.push(&post(), &ep, None).await.unwrap();
    assert!(result.success);
    assert_eq!(result.remote_id.as_deref(), Some("321"));
}

/// Test that a known remote id turns the push into wp.editPost
#[tokio::test]
async fn test_xml_push_edit_post() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_string_contains("<methodName>wp.editPost</methodName>"))
        .and(body_string_contains("<string>321</string>"))
        .respond_with(ResponseTemplate::new(200).set_body_string(xml_value("<boolean>1</boolean>")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = XmlPushClient::new(reqwest::Client::new());
    let ep = endpoint(TransportType::XmlPush, mock_server.uri(), wp_login());

    let result = client.push(&post(), &ep, Some("321")).await.unwrap();
    assert!(result.success);
    assert_eq!(result.remote_id.as_deref(), Some("321"));
}

/// Test that an XML-RPC fault is reported as a remote fault
#[tokio::test]
async fn test_xml_push_fault() {
    let mock_server = MockServer::start().await;

    let fault = "<?xml version=\"1.0\"?><methodResponse><fault><value><struct>\
        <member><name>faultCode</name><value><int>403</int></value></member>\
        <member><name>faultString</name><value><string>Incorrect username or password.</string></value></member>\
        </struct></value></fault></methodResponse>";
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(fault))
        .mount(&mock_server)
        .await;

    let client = XmlPushClient::new(reqwest::Client::new());
    let ep = endpoint(TransportType::XmlPush, mock_server.uri(), wp_login());

    let result = client.push(&post(), &ep, None).await.unwrap();
    assert!(!result.success);
    let failure = result.error.unwrap();
    assert_eq!(failure.kind, ErrorKind::RemoteFault { code: 403 });
    assert!(failure.message.contains("Incorrect username"));
}

/// Test that missing credentials never reach the network
#[tokio::test]
async fn test_xml_push_missing_credentials() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let client = XmlPushClient::new(reqwest::Client::new());
    let ep = endpoint(TransportType::XmlPush, mock_server.uri(), Credentials::new());

    assert!(client.push(&post(), &ep, None).await.is_err());
}

// ===== REST Push =====

/// Test the v1.1 create call with a bearer token
#[tokio::test]
async fn test_rest_push_creates_post() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sites/42/posts/new"))
        .and(header("authorization", "Bearer tok-1"))
        .and(body_partial_json(serde_json::json!({ "title": "Hello", "categories": "news" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ID": 77 })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = RestPushClient::new(reqwest::Client::new());
    let ep = endpoint(
        TransportType::RestPush,
        format!("{}/sites/42/", mock_server.uri()),
        Credentials::new().with("token", "tok-1"),
    );

    let result = client.push(&post(), &ep, None).await.unwrap();
    assert!(result.success);
    assert_eq!(result.remote_id.as_deref(), Some("77"));
}

/// Test that a 2xx body without an id counts as malformed
#[tokio::test]
async fn test_rest_push_missing_id_is_malformed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true })))
        .mount(&mock_server)
        .await;

    let client = RestPushClient::new(reqwest::Client::new());
    let ep = endpoint(
        TransportType::RestPush,
        mock_server.uri(),
        Credentials::new().with("token", "tok-1"),
    );

    let result = client.push(&post(), &ep, None).await.unwrap();
    assert_eq!(result.error.unwrap().kind, ErrorKind::MalformedResponse);
}

/// Test the wp/v2 update call and the forced delete
#[tokio::test]
async fn test_rest_push_v2_update_and_delete() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/wp/v2/posts/9"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": 9 })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/wp/v2/posts/9"))
        .and(query_param("force", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "deleted": true })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = RestPushV2Client::new(reqwest::Client::new());
    let ep = endpoint(TransportType::RestPushV2, mock_server.uri(), wp_login());

    let updated = client.push(&post(), &ep, Some("9")).await.unwrap();
    assert_eq!(updated.remote_id.as_deref(), Some("9"));

    let deleted = client.delete("9", &ep).await.unwrap();
    assert!(deleted.success);
}

/// Test that an HTTP error status is classified with its code
#[tokio::test]
async fn test_rest_push_v2_http_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&mock_server)
        .await;

    let client = RestPushV2Client::new(reqwest::Client::new());
    let ep = endpoint(TransportType::RestPushV2, mock_server.uri(), wp_login());

    let result = client.push(&post(), &ep, None).await.unwrap();
    let failure = result.error.unwrap();
    assert_eq!(failure.kind, ErrorKind::HttpStatus { status: 503 });
    assert!(failure.message.contains("maintenance"));
}

/// Test the connection check against the users/me route
#[tokio::test]
async fn test_rest_push_v2_test_connection() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/wp/v2/users/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": 1 })))
        .mount(&mock_server)
        .await;

    let client = RestPushV2Client::new(reqwest::Client::new());
    let ep = endpoint(TransportType::RestPushV2, mock_server.uri(), wp_login());
    assert!(client.test_connection(&ep).await);

    let no_login = endpoint(TransportType::RestPushV2, mock_server.uri(), Credentials::new());
    assert!(!client.test_connection(&no_login).await);
}

// ===== RSS Pull =====

/// Test that a feed is fetched and parsed into content items
#[tokio::test]
async fn test_rss_pull_reads_items() {
    let mock_server = MockServer::start().await;

    let feed = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Partner</title>
  <item><title>One</title><guid>g-1</guid><description>first</description></item>
  <item><title>Two</title><guid>g-2</guid><description>second</description></item>
</channel></rss>"#;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_string(feed))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = RssPullClient::new(reqwest::Client::new());
    let ep = endpoint(
        TransportType::RssPull,
        format!("{}/feed", mock_server.uri()),
        Credentials::new(),
    );

    let outcome = client.pull(&ep).await.unwrap();
    assert!(outcome.is_success());
    let guids: Vec<_> = outcome.items.iter().filter_map(|i| i.source_guid.clone()).collect();
    assert_eq!(guids, vec!["g-1".to_string(), "g-2".to_string()]);
}

/// Test that an empty feed is a successful pull with no items
#[tokio::test]
async fn test_rss_pull_empty_feed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<rss version=\"2.0\"><channel><title>x</title></channel></rss>"),
        )
        .mount(&mock_server)
        .await;

    let client = RssPullClient::new(reqwest::Client::new());
    let ep = endpoint(TransportType::RssPull, mock_server.uri(), Credentials::new());

    let outcome = client.pull(&ep).await.unwrap();
    assert!(outcome.is_success());
    assert!(outcome.items.is_empty());
}

/// Test that a non-feed body is reported as malformed
#[tokio::test]
async fn test_rss_pull_unreadable_feed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>login</body></html>"))
        .mount(&mock_server)
        .await;

    let client = RssPullClient::new(reqwest::Client::new());
    let ep = endpoint(TransportType::RssPull, mock_server.uri(), Credentials::new());

    let outcome = client.pull(&ep).await.unwrap();
    assert_eq!(outcome.error.unwrap().kind, ErrorKind::MalformedResponse);
}

/// Test that push is refused for a pull-only transport
#[tokio::test]
async fn test_rss_pull_rejects_push() {
    let client = RssPullClient::new(reqwest::Client::new());
    let ep = endpoint(TransportType::RssPull, "https://feed.example/rss".to_string(), Credentials::new());
    assert!(client.push(&post(), &ep, None).await.is_err());
}

// ===== Notification Webhook =====

/// Test that the webhook sink posts a JSON alert
#[tokio::test]
async fn test_webhook_sink_posts_notification() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hooks/ops"))
        .and(body_partial_json(serde_json::json!({
            "event": { "endpoint_id": "ep-1", "kind": "endpoint_disabled" }
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let sink = WebhookNotificationSink::new(reqwest::Client::new(), format!("{}/hooks/ops", mock_server.uri()));
    sink.notify(&Notification {
        endpoint_id: EndpointId::new("ep-1"),
        kind: NotificationKind::EndpointDisabled,
        message: "5 consecutive failures".to_string(),
        timestamp: Utc::now(),
        content_id: None,
    })
    .await;
}

/// Test that a failing webhook is swallowed
#[tokio::test]
async fn test_webhook_sink_swallows_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&mock_server)
        .await;

    let sink = WebhookNotificationSink::new(reqwest::Client::new(), mock_server.uri());
    sink.notify(&Notification {
        endpoint_id: EndpointId::new("ep-1"),
        kind: NotificationKind::JobAbandoned,
        message: "gave up".to_string(),
        timestamp: Utc::now(),
        content_id: None,
    })
    .await;
}
