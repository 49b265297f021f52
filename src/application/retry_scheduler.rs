//! Retry Scheduler
//!
//! Turns failed job records into delayed retry records or abandons them
//! once the backoff policy gives up.

use crate::application::events::{SyndicationEvent, SyndicationObserver};
use crate::domain::entities::DispatchJob;
use crate::domain::ports::{Clock, JobStore};
use crate::domain::services::{BackoffPolicy, RetryDecision};
use crate::domain::value_objects::JobStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct RetryScheduler {
    policy: BackoffPolicy,
    jobs: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
}

impl RetryScheduler {
    pub fn new(policy: BackoffPolicy, jobs: Arc<dyn JobStore>, clock: Arc<dyn Clock>) -> Self {
        Self { policy, jobs, clock }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Resolve one failed record. Returns the follow-up event when the job
    /// is abandoned.
    pub async fn handle_failure(&self, job: &DispatchJob) -> Option<SyndicationEvent> {
        if job.status != JobStatus::Failed {
            return None;
        }
        let failed_at = job.updated_at;
        let now = self.clock.now();

        match self.policy.decide(job.attempt_count, job.is_retryable(), failed_at) {
            RetryDecision::Retry {
                attempt,
                next_attempt_at,
            } => match self.jobs.schedule_retry(&job.id, next_attempt_at, now).await {
                Ok(retry) => {
                    if retry.retry_of.as_ref() == Some(&job.id) {
                        tracing::info!(
                            "job {} retry scheduled: attempt {} at {}",
                            job.id,
                            attempt,
                            next_attempt_at
                        );
                    } else {
                        tracing::debug!("job {} superseded by open job {}", job.id, retry.id);
                    }
                    None
                }
                Err(e) => {
                    tracing::warn!("failed to schedule retry for job {}: {}", job.id, e);
                    None
                }
            },
            RetryDecision::GiveUp { reason } => self.abandon(job, reason, now).await,
        }
    }

    async fn abandon(&self, job: &DispatchJob, reason: String, now: DateTime<Utc>) -> Option<SyndicationEvent> {
        match self.jobs.mark_abandoned(&job.id, now).await {
            Ok(abandoned) => {
                tracing::warn!(
                    "job {} abandoned after {} attempt(s): {}",
                    job.id,
                    job.attempt_count,
                    reason
                );
                Some(SyndicationEvent::JobAbandoned {
                    job: abandoned,
                    reason,
                    at: now,
                })
            }
            Err(e) => {
                tracing::warn!("failed to abandon job {}: {}", job.id, e);
                None
            }
        }
    }

    /// Resolve failed records that never got a retry decision (for example
    /// after a crash between `mark_failed` and scheduling).
    pub async fn sweep(&self) -> Vec<SyndicationEvent> {
        let mut events = Vec::new();
        let failures = self.jobs.unresolved_failures().await;
        if !failures.is_empty() {
            tracing::debug!("retry sweep found {} unresolved failure(s)", failures.len());
        }
        for job in failures {
            if let Some(event) = self.handle_failure(&job).await {
                events.push(event);
            }
        }
        events
    }
}

#[async_trait]
impl SyndicationObserver for RetryScheduler {
    async fn on_event(&self, event: &SyndicationEvent) -> Vec<SyndicationEvent> {
        match event {
            SyndicationEvent::JobFailed { job, .. } => self.handle_failure(job).await.into_iter().collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::adapters::outbound::DashMapJobStore;
    use crate::domain::entities::DeliveryFailure;
    use crate::domain::ports::{ManualClock, NewJob};
    use crate::domain::value_objects::{ContentId, EndpointId, ErrorKind, JobAction};
    use std::time::Duration;

    fn policy(max_attempts: u32) -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_secs(60),
            multiplier: 2,
            max_interval: Duration::from_secs(3600),
            max_attempts,
        }
    }

    async fn failed_job(store: &DashMapJobStore, now: DateTime<Utc>, kind: ErrorKind) -> DispatchJob {
        let job = store
            .create(NewJob {
                content_id: ContentId::new("post-1"),
                endpoint_id: EndpointId::new("ep-1"),
                action: JobAction::Push,
                content_created_at: now,
                content_revision: now,
                scheduled_at: now,
            })
            .await
            .unwrap();
        store.mark_in_progress(&job.id, now).await.unwrap();
        store
            .mark_failed(
                &job.id,
                &DeliveryFailure {
                    kind,
                    message: "nope".to_string(),
                },
                now,
            )
            .await
            .unwrap()
    }

    fn setup(max_attempts: u32) -> (Arc<DashMapJobStore>, Arc<ManualClock>, RetryScheduler) {
        let store = Arc::new(DashMapJobStore::new());
        let clock = Arc::new(ManualClock::default());
        let scheduler = RetryScheduler::new(policy(max_attempts), store.clone(), clock.clone());
        (store, clock, scheduler)
    }

    // ===== Retry Tests =====

    #[tokio::test]
    async fn test_failure_schedules_delayed_retry() {
        let (store, clock, scheduler) = setup(5);
        let failed = failed_job(&store, clock.now(), ErrorKind::Timeout).await;

        let follow_ups = scheduler
            .on_event(&SyndicationEvent::JobFailed {
                job: failed.clone(),
                at: clock.now(),
            })
            .await;
        assert!(follow_ups.is_empty());

        let retry = store
            .open_job(&failed.content_id, &failed.endpoint_id)
            .await
            .unwrap();
        assert_eq!(retry.attempt_count, 2);
        assert_eq!(retry.retry_of, Some(failed.id.clone()));
        assert_eq!(retry.scheduled_at, failed.updated_at + chrono::Duration::seconds(60));
        assert!(retry.scheduled_at > clock.now());
    }

    #[tokio::test]
    async fn test_non_retryable_failure_is_abandoned() {
        let (store, clock, scheduler) = setup(5);
        let failed = failed_job(&store, clock.now(), ErrorKind::Configuration).await;

        let event = scheduler.handle_failure(&failed).await.unwrap();
        match event {
            SyndicationEvent::JobAbandoned { job, reason, .. } => {
                assert_eq!(job.status, JobStatus::Abandoned);
                assert!(reason.contains("non-retryable"));
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(store.open_job(&failed.content_id, &failed.endpoint_id).await.is_none());
    }

    #[tokio::test]
    async fn test_attempt_ceiling_abandons() {
        let (store, clock, scheduler) = setup(1);
        let failed = failed_job(&store, clock.now(), ErrorKind::Network).await;

        let event = scheduler.handle_failure(&failed).await;
        assert!(matches!(event, Some(SyndicationEvent::JobAbandoned { .. })));
        assert_eq!(store.get(&failed.id).await.unwrap().status, JobStatus::Abandoned);
    }

    #[tokio::test]
    async fn test_non_failed_job_ignored() {
        let (store, clock, scheduler) = setup(5);
        let failed = failed_job(&store, clock.now(), ErrorKind::Network).await;
        let mut stale = failed.clone();
        stale.status = JobStatus::Succeeded;

        assert!(scheduler.handle_failure(&stale).await.is_none());
        assert!(store.open_job(&failed.content_id, &failed.endpoint_id).await.is_none());
    }

    // ===== Sweep Tests =====

    #[tokio::test]
    async fn test_sweep_resolves_orphaned_failures() {
        let (store, clock, scheduler) = setup(5);
        let failed = failed_job(&store, clock.now(), ErrorKind::HttpStatus { status: 503 }).await;

        assert_eq!(store.unresolved_failures().await.len(), 1);
        let events = scheduler.sweep().await;
        assert!(events.is_empty());
        assert!(store.unresolved_failures().await.is_empty());
        assert!(store.open_job(&failed.content_id, &failed.endpoint_id).await.is_some());

        // A second sweep has nothing to do
        assert!(scheduler.sweep().await.is_empty());
        assert_eq!(store.counts().await.pending, 1);
    }

    #[tokio::test]
    async fn test_sweep_reports_abandonments() {
        let (store, clock, scheduler) = setup(1);
        failed_job(&store, clock.now(), ErrorKind::Network).await;

        let events = scheduler.sweep().await;
        assert_eq!(events.len(), 1);
        assert_eq!(store.counts().await.abandoned, 1);
    }
}
