//! Notifier
//!
//! Turns syndication events into operator alerts and hands them to the
//! configured notification sink.

use crate::application::events::{SyndicationEvent, SyndicationObserver};
use crate::domain::entities::DispatchJob;
use crate::domain::ports::{Notification, NotificationKind, NotificationSink};
use crate::domain::value_objects::JobAction;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    /// Optional kinds; disables and abandonments are always sent
    kinds: BTreeSet<NotificationKind>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>, kinds: BTreeSet<NotificationKind>) -> Self {
        Self { sink, kinds }
    }

    fn wants(&self, kind: NotificationKind) -> bool {
        matches!(kind, NotificationKind::EndpointDisabled | NotificationKind::JobAbandoned) || self.kinds.contains(&kind)
    }

    fn job_notification(job: &DispatchJob, kind: NotificationKind, message: String) -> Notification {
        Notification {
            endpoint_id: job.endpoint_id.clone(),
            kind,
            message,
            timestamp: job.updated_at,
            content_id: Some(job.content_id.clone()),
        }
    }

    /// The alert an event maps to, if any.
    pub fn notification_for(&self, event: &SyndicationEvent) -> Option<Notification> {
        let notification = match event {
            SyndicationEvent::EndpointDisabled {
                endpoint_id,
                reason,
                at,
            } => Notification {
                endpoint_id: endpoint_id.clone(),
                kind: NotificationKind::EndpointDisabled,
                message: format!("endpoint disabled: {}", reason),
                timestamp: *at,
                content_id: None,
            },
            SyndicationEvent::JobAbandoned { job, reason, at } => {
                let mut n = Self::job_notification(
                    job,
                    NotificationKind::JobAbandoned,
                    format!(
                        "gave up on content {} after {} attempt(s): {}",
                        job.content_id, job.attempt_count, reason
                    ),
                );
                n.timestamp = *at;
                n
            }
            SyndicationEvent::JobSucceeded { job, updated, at } => {
                let (kind, verb) = match (job.action, *updated) {
                    (JobAction::Delete, _) => (NotificationKind::Delete, "deleted"),
                    (JobAction::Push, true) => (NotificationKind::Edit, "updated"),
                    (JobAction::Push, false) => (NotificationKind::New, "published"),
                };
                let remote = job.remote_id.as_deref().unwrap_or("-");
                let mut n = Self::job_notification(
                    job,
                    kind,
                    format!("content {} {} (remote id {})", job.content_id, verb, remote),
                );
                n.timestamp = *at;
                n
            }
            SyndicationEvent::JobFailed { .. }
            | SyndicationEvent::PullSucceeded { .. }
            | SyndicationEvent::PullFailed { .. } => return None,
        };

        self.wants(notification.kind).then_some(notification)
    }
}

#[async_trait]
impl SyndicationObserver for Notifier {
    async fn on_event(&self, event: &SyndicationEvent) -> Vec<SyndicationEvent> {
        if let Some(notification) = self.notification_for(event) {
            self.sink.notify(&notification).await;
        }
        Vec::new()
    }
}
