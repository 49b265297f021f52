//! DashMap Job Store
//!
//! In-memory dispatch job records. A pair index maps each
//! (content, endpoint) pair to its single open job; every transition that
//! touches the index holds the store's transition lock so that check and
//! insert cannot interleave.

use crate::domain::entities::{DeliveryFailure, DispatchJob};
use crate::domain::ports::{JobCounts, JobQuery, JobStore, NewJob};
use crate::domain::value_objects::{ContentId, EndpointId, JobAction, JobId, JobStatus};
use crate::error::JobStoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type Pair = (ContentId, EndpointId);

/// DashMap-backed job store.
pub struct DashMapJobStore {
    jobs: Arc<DashMap<JobId, DispatchJob>>,
    open: Arc<DashMap<Pair, JobId>>,
    /// failed record -> record that superseded it
    superseded: Arc<DashMap<JobId, JobId>>,
    remote_ids: Arc<DashMap<Pair, String>>,
    revisions: Arc<DashMap<Pair, DateTime<Utc>>>,
    seq: AtomicU64,
    transitions: Mutex<()>,
}

impl DashMapJobStore {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            open: Arc::new(DashMap::new()),
            superseded: Arc::new(DashMap::new()),
            remote_ids: Arc::new(DashMap::new()),
            revisions: Arc::new(DashMap::new()),
            seq: AtomicU64::new(0),
            transitions: Mutex::new(()),
        }
    }

    fn load(&self, id: &JobId) -> Result<DispatchJob, JobStoreError> {
        self.jobs
            .get(id)
            .map(|j| j.value().clone())
            .ok_or_else(|| JobStoreError::NotFound(id.clone()))
    }

    fn expect_status(job: &DispatchJob, allowed: &[JobStatus], to: JobStatus) -> Result<(), JobStoreError> {
        if allowed.contains(&job.status) {
            Ok(())
        } else {
            Err(JobStoreError::InvalidTransition {
                job_id: job.id.clone(),
                from: job.status,
                to,
            })
        }
    }

    fn store(&self, job: DispatchJob) -> DispatchJob {
        self.jobs.insert(job.id.clone(), job.clone());
        job
    }

    /// Insert a pending record for the pair. Caller holds the transition lock.
    fn insert_pending(&self, template: PendingTemplate) -> Result<DispatchJob, JobStoreError> {
        let pair = (template.content_id.clone(), template.endpoint_id.clone());
        if self.open.contains_key(&pair) {
            return Err(JobStoreError::DuplicateJob {
                content_id: template.content_id,
                endpoint_id: template.endpoint_id,
            });
        }

        let job = DispatchJob {
            id: JobId::generate(),
            content_id: template.content_id,
            endpoint_id: template.endpoint_id,
            action: template.action,
            attempt_count: template.attempt_count,
            status: JobStatus::Pending,
            scheduled_at: template.scheduled_at,
            created_at: template.now,
            updated_at: template.now,
            content_created_at: template.content_created_at,
            content_revision: template.content_revision,
            last_error: None,
            error_kind: None,
            remote_id: None,
            retry_of: template.retry_of,
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
        };

        self.open.insert(pair, job.id.clone());
        Ok(self.store(job))
    }

    fn close(&self, job: &DispatchJob) {
        self.open.remove_if(&job.pair(), |_, open_id| open_id == &job.id);
    }

    fn sorted(mut jobs: Vec<DispatchJob>) -> Vec<DispatchJob> {
        jobs.sort_by_key(|j| j.seq);
        jobs
    }
}

impl Default for DashMapJobStore {
    fn default() -> Self {
        Self::new()
    }
}

struct PendingTemplate {
    content_id: ContentId,
    endpoint_id: EndpointId,
    action: JobAction,
    attempt_count: u32,
    scheduled_at: DateTime<Utc>,
    content_created_at: DateTime<Utc>,
    content_revision: DateTime<Utc>,
    retry_of: Option<JobId>,
    now: DateTime<Utc>,
}

impl PendingTemplate {
    fn follow_up(previous: &DispatchJob, attempt_count: u32, scheduled_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            content_id: previous.content_id.clone(),
            endpoint_id: previous.endpoint_id.clone(),
            action: previous.action,
            attempt_count,
            scheduled_at,
            content_created_at: previous.content_created_at,
            content_revision: previous.content_revision,
            retry_of: Some(previous.id.clone()),
            now,
        }
    }
}

#[async_trait]
impl JobStore for DashMapJobStore {
    async fn create(&self, job: NewJob) -> Result<DispatchJob, JobStoreError> {
        let _guard = self.transitions.lock();
        let now = Utc::now();
        let revision = job.content_revision;
        let pair = (job.content_id.clone(), job.endpoint_id.clone());

        if let Some(open_id) = self.open.get(&pair).map(|e| e.value().clone()) {
            if let Some(mut open) = self.jobs.get_mut(&open_id) {
                if open.status == JobStatus::Pending && open.content_revision < revision {
                    open.content_revision = revision;
                    open.action = job.action;
                    open.updated_at = now;
                    self.revisions.insert(pair, revision);
                }
            }
            return Err(JobStoreError::DuplicateJob {
                content_id: job.content_id,
                endpoint_id: job.endpoint_id,
            });
        }

        let created = self.insert_pending(PendingTemplate {
            content_id: job.content_id,
            endpoint_id: job.endpoint_id,
            action: job.action,
            attempt_count: 1,
            scheduled_at: job.scheduled_at,
            content_created_at: job.content_created_at,
            content_revision: revision,
            retry_of: None,
            now,
        })?;
        self.revisions.insert(created.pair(), revision);
        Ok(created)
    }

    async fn get(&self, id: &JobId) -> Option<DispatchJob> {
        self.jobs.get(id).map(|j| j.value().clone())
    }

    async fn open_job(&self, content_id: &ContentId, endpoint_id: &EndpointId) -> Option<DispatchJob> {
        let id = self
            .open
            .get(&(content_id.clone(), endpoint_id.clone()))
            .map(|e| e.value().clone())?;
        self.jobs.get(&id).map(|j| j.value().clone())
    }

    async fn due_jobs(&self, now: DateTime<Utc>) -> Vec<DispatchJob> {
        Self::sorted(
            self.jobs
                .iter()
                .filter(|j| j.is_due(now))
                .map(|j| j.value().clone())
                .collect(),
        )
    }

    async fn mark_in_progress(&self, id: &JobId, now: DateTime<Utc>) -> Result<DispatchJob, JobStoreError> {
        let _guard = self.transitions.lock();
        let mut job = self.load(id)?;
        Self::expect_status(&job, &[JobStatus::Pending], JobStatus::InProgress)?;
        job.status = JobStatus::InProgress;
        job.updated_at = now;
        Ok(self.store(job))
    }

    async fn mark_succeeded(
        &self,
        id: &JobId,
        remote_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<DispatchJob, JobStoreError> {
        let _guard = self.transitions.lock();
        let mut job = self.load(id)?;
        Self::expect_status(&job, &[JobStatus::InProgress], JobStatus::Succeeded)?;

        match job.action {
            JobAction::Push => {
                if let Some(remote) = &remote_id {
                    self.remote_ids.insert(job.pair(), remote.clone());
                }
            }
            JobAction::Delete => {
                self.remote_ids.remove(&job.pair());
            }
        }

        job.status = JobStatus::Succeeded;
        job.remote_id = remote_id;
        job.last_error = None;
        job.error_kind = None;
        job.updated_at = now;
        self.close(&job);
        Ok(self.store(job))
    }

    async fn mark_failed(
        &self,
        id: &JobId,
        failure: &DeliveryFailure,
        now: DateTime<Utc>,
    ) -> Result<DispatchJob, JobStoreError> {
        let _guard = self.transitions.lock();
        let mut job = self.load(id)?;
        Self::expect_status(&job, &[JobStatus::InProgress], JobStatus::Failed)?;
        job.status = JobStatus::Failed;
        job.last_error = Some(failure.message.clone());
        job.error_kind = Some(failure.kind.clone());
        job.updated_at = now;
        self.close(&job);
        Ok(self.store(job))
    }

    async fn schedule_retry(
        &self,
        failed: &JobId,
        scheduled_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<DispatchJob, JobStoreError> {
        let _guard = self.transitions.lock();
        let previous = self.load(failed)?;
        Self::expect_status(&previous, &[JobStatus::Failed], JobStatus::Pending)?;
        if self.superseded.contains_key(failed) {
            return Err(JobStoreError::InvalidTransition {
                job_id: failed.clone(),
                from: JobStatus::Failed,
                to: JobStatus::Pending,
            });
        }

        // A newer revision may already have opened a job for the pair; it
        // delivers the same content, so it stands in for the retry.
        if let Some(open_id) = self.open.get(&previous.pair()).map(|e| e.value().clone()) {
            self.superseded.insert(failed.clone(), open_id.clone());
            return self.load(&open_id);
        }

        let retry = self.insert_pending(PendingTemplate::follow_up(
            &previous,
            previous.attempt_count + 1,
            scheduled_at,
            now,
        ))?;
        self.superseded.insert(failed.clone(), retry.id.clone());
        Ok(retry)
    }

    async fn mark_abandoned(&self, id: &JobId, now: DateTime<Utc>) -> Result<DispatchJob, JobStoreError> {
        let _guard = self.transitions.lock();
        let mut job = self.load(id)?;
        Self::expect_status(&job, &[JobStatus::Failed, JobStatus::Pending], JobStatus::Abandoned)?;
        job.status = JobStatus::Abandoned;
        job.updated_at = now;
        self.close(&job);
        Ok(self.store(job))
    }

    async fn revive(&self, abandoned: &JobId, now: DateTime<Utc>) -> Result<DispatchJob, JobStoreError> {
        let _guard = self.transitions.lock();
        let previous = self.load(abandoned)?;
        Self::expect_status(&previous, &[JobStatus::Abandoned], JobStatus::Pending)?;
        self.insert_pending(PendingTemplate::follow_up(&previous, 1, now, now))
    }

    async fn requeue_interrupted(&self, id: &JobId, now: DateTime<Utc>) -> Result<DispatchJob, JobStoreError> {
        let _guard = self.transitions.lock();
        let mut job = self.load(id)?;
        Self::expect_status(&job, &[JobStatus::InProgress], JobStatus::Pending)?;
        job.status = JobStatus::Pending;
        job.scheduled_at = now;
        job.updated_at = now;
        Ok(self.store(job))
    }

    async fn reschedule(&self, id: &JobId, scheduled_at: DateTime<Utc>) -> Result<DispatchJob, JobStoreError> {
        let _guard = self.transitions.lock();
        let mut job = self.load(id)?;
        Self::expect_status(&job, &[JobStatus::Pending], JobStatus::Pending)?;
        job.scheduled_at = scheduled_at;
        Ok(self.store(job))
    }

    async fn list(&self, query: &JobQuery) -> Vec<DispatchJob> {
        Self::sorted(
            self.jobs
                .iter()
                .filter(|j| query.matches(j.value()))
                .map(|j| j.value().clone())
                .collect(),
        )
    }

    async fn unresolved_failures(&self) -> Vec<DispatchJob> {
        Self::sorted(
            self.jobs
                .iter()
                .filter(|j| j.status == JobStatus::Failed && !self.superseded.contains_key(&j.id))
                .map(|j| j.value().clone())
                .collect(),
        )
    }

    async fn remote_id(&self, content_id: &ContentId, endpoint_id: &EndpointId) -> Option<String> {
        self.remote_ids
            .get(&(content_id.clone(), endpoint_id.clone()))
            .map(|r| r.value().clone())
    }

    async fn last_enqueued_revision(
        &self,
        content_id: &ContentId,
        endpoint_id: &EndpointId,
    ) -> Option<DateTime<Utc>> {
        self.revisions
            .get(&(content_id.clone(), endpoint_id.clone()))
            .map(|r| *r.value())
    }

    async fn counts(&self) -> JobCounts {
        let mut counts = JobCounts::default();
        for job in self.jobs.iter() {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::InProgress => counts.in_progress += 1,
                JobStatus::Succeeded => counts.succeeded += 1,
                JobStatus::Failed => counts.failed += 1,
                JobStatus::Abandoned => counts.abandoned += 1,
            }
        }
        counts
    }
}
