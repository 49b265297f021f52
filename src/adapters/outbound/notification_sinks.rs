//! Notification Sinks
//!
//! Delivery mechanisms for operator alerts. A sink never fails the caller:
//! delivery problems are logged and dropped.

use crate::domain::ports::{Notification, NotificationKind, NotificationSink};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Writes notifications to the tracing log.
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(&self, notification: &Notification) {
        match notification.kind {
            NotificationKind::EndpointDisabled | NotificationKind::JobAbandoned => tracing::warn!(
                endpoint = %notification.endpoint_id,
                kind = %notification.kind,
                "{}",
                notification.message
            ),
            _ => tracing::info!(
                endpoint = %notification.endpoint_id,
                kind = %notification.kind,
                "{}",
                notification.message
            ),
        }
    }
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    /// Slack-compatible message text
    text: String,
    event: &'a Notification,
}

/// Posts notifications as JSON to an incoming-webhook URL.
pub struct WebhookNotificationSink {
    http: reqwest::Client,
    url: String,
}

impl WebhookNotificationSink {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self { http, url: url.into() }
    }

    fn text(notification: &Notification) -> String {
        format!(
            "[syndication] {} on endpoint {}: {}",
            notification.kind, notification.endpoint_id, notification.message
        )
    }
}

#[async_trait]
impl NotificationSink for WebhookNotificationSink {
    async fn notify(&self, notification: &Notification) {
        let body = WebhookBody {
            text: Self::text(notification),
            event: notification,
        };

        match self.http.post(&self.url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!("notification {} delivered to webhook", notification.kind);
            }
            Ok(resp) => tracing::warn!("notification webhook returned {}", resp.status()),
            Err(e) => tracing::warn!("notification webhook failed: {}", e),
        }
    }
}

/// Delivers each notification to every inner sink, in order.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl NotificationSink for FanoutSink {
    async fn notify(&self, notification: &Notification) {
        for sink in &self.sinks {
            sink.notify(notification).await;
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::domain::value_objects::EndpointId;
    use chrono::Utc;
    use parking_lot::Mutex;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct Recording(Mutex<Vec<NotificationKind>>);

    #[async_trait]
    impl NotificationSink for Recording {
        async fn notify(&self, notification: &Notification) {
            self.0.lock().push(notification.kind);
        }
    }

    fn notification(kind: NotificationKind) -> Notification {
        Notification {
            endpoint_id: EndpointId::new("ep-1"),
            kind,
            message: "three consecutive failures".to_string(),
            timestamp: Utc::now(),
            content_id: None,
        }
    }

    #[tokio::test]
    async fn test_fanout_reaches_every_sink() {
        let a = Arc::new(Recording::default());
        let b = Arc::new(Recording::default());
        let fanout = FanoutSink::new(vec![a.clone(), b.clone()]);

        fanout.notify(&notification(NotificationKind::EndpointDisabled)).await;

        assert_eq!(*a.0.lock(), vec![NotificationKind::EndpointDisabled]);
        assert_eq!(*b.0.lock(), vec![NotificationKind::EndpointDisabled]);
        assert_eq!(fanout.len(), 2);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_log_sink_writes_warning_for_disable() {
        LogNotificationSink
            .notify(&notification(NotificationKind::EndpointDisabled))
            .await;
        assert!(logs_contain("three consecutive failures"));
    }

    #[test]
    fn test_webhook_text_names_endpoint_and_kind() {
        let text = WebhookNotificationSink::text(&notification(NotificationKind::JobAbandoned));
        assert!(text.contains("abandoned"));
        assert!(text.contains("ep-1"));
    }

    #[tokio::test]
    async fn test_webhook_sink_swallows_connection_errors() {
        let sink = WebhookNotificationSink::new(reqwest::Client::new(), "http://127.0.0.1:9/hook");
        sink.notify(&notification(NotificationKind::New)).await;
    }
}
