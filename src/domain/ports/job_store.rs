//! Job Store Port
//!
//! Defines the interface for dispatch job records and per-pair delivery
//! bookkeeping (remote ids, last enqueued revision).

use crate::domain::entities::{DeliveryFailure, DispatchJob};
use crate::domain::value_objects::{ContentId, EndpointId, JobAction, JobId, JobStatus};
use crate::error::JobStoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Input for creating the first job of a (content, endpoint) pair.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub content_id: ContentId,
    pub endpoint_id: EndpointId,
    pub action: JobAction,
    pub content_created_at: DateTime<Utc>,
    pub content_revision: DateTime<Utc>,
    pub scheduled_at: DateTime<Utc>,
}

/// Selection criteria for listing jobs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobQuery {
    pub status: Option<JobStatus>,
    pub endpoint_id: Option<EndpointId>,
    pub content_id: Option<ContentId>,
}

impl JobQuery {
    pub fn matches(&self, job: &DispatchJob) -> bool {
        self.status.map_or(true, |s| job.status == s)
            && self.endpoint_id.as_ref().map_or(true, |e| &job.endpoint_id == e)
            && self.content_id.as_ref().map_or(true, |c| &job.content_id == c)
    }
}

/// Number of job records per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub abandoned: usize,
}

/// Store of dispatch jobs.
///
/// Invariant: at most one open (pending or in_progress) record exists per
/// (content, endpoint) pair. Creating a second one fails with
/// `JobStoreError::DuplicateJob`.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a pending attempt-1 job and remember its content revision.
    ///
    /// When an open job already exists the call fails with `DuplicateJob`;
    /// if that job is still pending it is first brought up to the newer
    /// revision and action, so the change is delivered by the existing job.
    async fn create(&self, job: NewJob) -> Result<DispatchJob, JobStoreError>;

    async fn get(&self, id: &JobId) -> Option<DispatchJob>;

    /// The open job for a pair, if any.
    async fn open_job(&self, content_id: &ContentId, endpoint_id: &EndpointId) -> Option<DispatchJob>;

    /// Pending jobs whose `scheduled_at` has passed, in creation order.
    async fn due_jobs(&self, now: DateTime<Utc>) -> Vec<DispatchJob>;

    async fn mark_in_progress(&self, id: &JobId, now: DateTime<Utc>) -> Result<DispatchJob, JobStoreError>;

    async fn mark_succeeded(
        &self,
        id: &JobId,
        remote_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<DispatchJob, JobStoreError>;

    async fn mark_failed(
        &self,
        id: &JobId,
        failure: &DeliveryFailure,
        now: DateTime<Utc>,
    ) -> Result<DispatchJob, JobStoreError>;

    /// Supersede a failed record with a pending retry record.
    async fn schedule_retry(
        &self,
        failed: &JobId,
        scheduled_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DispatchJob, JobStoreError>;

    /// Terminal: the record is never retried automatically again.
    async fn mark_abandoned(&self, id: &JobId, now: DateTime<Utc>) -> Result<DispatchJob, JobStoreError>;

    /// Start a fresh attempt-1 job for the pair of an abandoned record.
    async fn revive(&self, abandoned: &JobId, now: DateTime<Utc>) -> Result<DispatchJob, JobStoreError>;

    /// Put an in_progress job left behind by an interrupted cycle back to
    /// pending, due at `now`. Only valid while no cycle is running.
    async fn requeue_interrupted(&self, id: &JobId, now: DateTime<Utc>) -> Result<DispatchJob, JobStoreError>;

    /// Move a pending job's `scheduled_at`.
    async fn reschedule(&self, id: &JobId, scheduled_at: DateTime<Utc>) -> Result<DispatchJob, JobStoreError>;

    async fn list(&self, query: &JobQuery) -> Vec<DispatchJob>;

    /// Failed records that were neither retried nor abandoned.
    async fn unresolved_failures(&self) -> Vec<DispatchJob>;

    async fn remote_id(&self, content_id: &ContentId, endpoint_id: &EndpointId) -> Option<String>;

    async fn last_enqueued_revision(
        &self,
        content_id: &ContentId,
        endpoint_id: &EndpointId,
    ) -> Option<DateTime<Utc>>;

    async fn counts(&self) -> JobCounts;
}
