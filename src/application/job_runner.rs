//! Job Runner
//!
//! Creates dispatch jobs for changed content and drives due jobs through
//! the transport clients.
//!
//! Jobs are grouped into one queue per endpoint. Queues run concurrently on
//! a bounded worker pool; inside a queue jobs run one at a time in
//! content-creation order.

use crate::application::events::{EventBus, SyndicationEvent};
use crate::domain::entities::{ContentItem, DeliveryFailure, DispatchJob, Endpoint, EndpointFilter};
use crate::domain::ports::{Clock, ContentSource, EndpointRegistry, JobStore, NewJob, TransportLookup};
use crate::domain::services::TargetResolver;
use crate::domain::value_objects::{EndpointId, ErrorKind, JobAction};
use crate::error::{ContentError, JobStoreError, RegistryError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Cooperative cancellation checked between jobs.
pub type CancelFlag = Arc<AtomicBool>;

/// Job runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Endpoint queues processed in parallel
    pub worker_count: usize,
    /// Deadline for a single push or delete call
    pub push_timeout: Duration,
    /// Propagate local deletions to endpoints holding a remote copy
    pub delete_pushed: bool,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            worker_count: 8,
            push_timeout: Duration::from_secs(30),
            delete_pushed: false,
        }
    }
}

/// What one enqueue pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnqueueReport {
    pub created: usize,
    /// Pairs that already had an open job
    pub already_open: usize,
    /// Pairs whose revision was already enqueued
    pub unchanged: usize,
}

/// What one dispatch pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub succeeded: usize,
    pub failed: usize,
    pub abandoned: usize,
    /// Due jobs left pending because their endpoint is disabled
    pub deferred: usize,
    /// Due jobs left pending because the cycle was cancelled
    pub cancelled: usize,
}

impl DispatchReport {
    fn merge(&mut self, other: DispatchReport) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.abandoned += other.abandoned;
        self.deferred += other.deferred;
        self.cancelled += other.cancelled;
    }
}

enum Delivery {
    Done { remote_id: Option<String>, updated: bool },
    Failed(DeliveryFailure),
}

pub struct JobRunner {
    registry: Arc<dyn EndpointRegistry>,
    jobs: Arc<dyn JobStore>,
    content: Arc<dyn ContentSource>,
    transports: Arc<dyn TransportLookup>,
    events: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    settings: RunnerSettings,
}

impl JobRunner {
    pub fn new(
        registry: Arc<dyn EndpointRegistry>,
        jobs: Arc<dyn JobStore>,
        content: Arc<dyn ContentSource>,
        transports: Arc<dyn TransportLookup>,
        events: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            registry,
            jobs,
            content,
            transports,
            events,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Create pending jobs for every (item, target endpoint) pair that has
    /// not seen the item's current revision.
    ///
    /// Disabled endpoints still receive jobs; they wait until re-enabled.
    pub async fn enqueue(&self, items: &[ContentItem]) -> EnqueueReport {
        let mut report = EnqueueReport::default();
        if items.is_empty() {
            return report;
        }

        let now = self.clock.now();
        let groups = self.registry.list_groups().await;
        let endpoints: Vec<Endpoint> = self
            .registry
            .list(&EndpointFilter::default())
            .await
            .into_iter()
            .filter(|e| !e.transport_type.is_pull())
            .collect();

        for item in items {
            for endpoint in TargetResolver::resolve(&item.subscriptions, &groups, &endpoints) {
                let action = if item.is_deleted() {
                    if !self.settings.delete_pushed
                        || self.jobs.remote_id(&item.id, &endpoint.id).await.is_none()
                    {
                        continue;
                    }
                    JobAction::Delete
                } else {
                    JobAction::Push
                };

                if let Some(last) = self.jobs.last_enqueued_revision(&item.id, &endpoint.id).await {
                    if item.modified_at <= last {
                        report.unchanged += 1;
                        continue;
                    }
                }

                let new_job = NewJob {
                    content_id: item.id.clone(),
                    endpoint_id: endpoint.id.clone(),
                    action,
                    content_created_at: item.created_at,
                    content_revision: item.modified_at,
                    scheduled_at: now,
                };
                match self.jobs.create(new_job).await {
                    Ok(job) => {
                        tracing::debug!("job {} created: {:?} {} -> {}", job.id, action, item.id, endpoint.id);
                        report.created += 1;
                    }
                    Err(JobStoreError::DuplicateJob { .. }) => {
                        tracing::debug!("open job exists for {} -> {}", item.id, endpoint.id);
                        report.already_open += 1;
                    }
                    Err(e) => tracing::warn!("failed to create job for {} -> {}: {}", item.id, endpoint.id, e),
                }
            }
        }

        if report.created > 0 {
            tracing::info!("enqueued {} job(s) for {} changed item(s)", report.created, items.len());
        }
        report
    }

    /// Run every due job. Returns once all endpoint queues have drained or
    /// stopped at a job boundary after `cancel` was raised.
    pub async fn process(self: &Arc<Self>, cancel: &CancelFlag) -> DispatchReport {
        let now = self.clock.now();
        let mut queues: BTreeMap<EndpointId, Vec<DispatchJob>> = BTreeMap::new();
        for job in self.jobs.due_jobs(now).await {
            queues.entry(job.endpoint_id.clone()).or_default().push(job);
        }
        for queue in queues.values_mut() {
            queue.sort_by(|a, b| {
                a.content_created_at
                    .cmp(&b.content_created_at)
                    .then_with(|| a.seq.cmp(&b.seq))
            });
        }

        let mut report = DispatchReport::default();
        if queues.is_empty() {
            return report;
        }
        tracing::debug!("dispatching due jobs across {} endpoint queue(s)", queues.len());

        let workers = Arc::new(Semaphore::new(self.settings.worker_count.max(1)));
        let mut tasks = JoinSet::new();
        for (endpoint_id, queue) in queues {
            let runner = Arc::clone(self);
            let workers = Arc::clone(&workers);
            let cancel = Arc::clone(cancel);
            tasks.spawn(async move {
                let Ok(_permit) = workers.acquire_owned().await else {
                    return DispatchReport::default();
                };
                runner.run_queue(&endpoint_id, queue, &cancel).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(queue_report) => report.merge(queue_report),
                Err(e) => tracing::error!("endpoint queue task failed: {}", e),
            }
        }
        report
    }

    async fn run_queue(&self, endpoint_id: &EndpointId, queue: Vec<DispatchJob>, cancel: &AtomicBool) -> DispatchReport {
        let mut report = DispatchReport::default();
        let total = queue.len();

        for (index, job) in queue.into_iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                report.cancelled += total - index;
                tracing::info!("queue for {} stopped: cycle cancelled", endpoint_id);
                break;
            }

            // Re-read every time: a disable must take effect at the next job.
            let endpoint = match self.registry.get(endpoint_id).await {
                Ok(endpoint) => endpoint,
                Err(RegistryError::EndpointNotFound(_)) => {
                    self.abandon(&job, "endpoint no longer exists").await;
                    report.abandoned += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!("queue for {} stopped: {}", endpoint_id, e);
                    break;
                }
            };
            if !endpoint.enabled {
                report.deferred += total - index;
                tracing::debug!("endpoint {} disabled; {} job(s) deferred", endpoint_id, total - index);
                break;
            }

            match self.execute(job, &endpoint).await {
                Some(true) => report.succeeded += 1,
                Some(false) => report.failed += 1,
                None => {}
            }
        }
        report
    }

    /// Run one job. `Some(success)` when the job reached a terminal record.
    async fn execute(&self, job: DispatchJob, endpoint: &Endpoint) -> Option<bool> {
        let item = match job.action {
            JobAction::Push => match self.content.get(&job.content_id).await {
                Ok(item) => Some(item),
                Err(ContentError::NotFound(_)) => {
                    self.abandon(&job, "content item no longer exists").await;
                    return None;
                }
                Err(e) => {
                    tracing::warn!("job {} postponed: {}", job.id, e);
                    return None;
                }
            },
            JobAction::Delete => None,
        };

        let job = match self.jobs.mark_in_progress(&job.id, self.clock.now()).await {
            Ok(job) => job,
            Err(e) => {
                tracing::debug!("job {} skipped: {}", job.id, e);
                return None;
            }
        };

        let delivery = match &item {
            Some(item) => self.push(&job, item, endpoint).await,
            None => self.delete(&job, endpoint).await,
        };

        let finished_at = self.clock.now();
        match delivery {
            Delivery::Done { remote_id, updated } => {
                match self.jobs.mark_succeeded(&job.id, remote_id, finished_at).await {
                    Ok(job) => {
                        tracing::info!(
                            "job {} succeeded: {:?} {} -> {} (attempt {})",
                            job.id,
                            job.action,
                            job.content_id,
                            job.endpoint_id,
                            job.attempt_count
                        );
                        self.events
                            .emit(SyndicationEvent::JobSucceeded {
                                job,
                                updated,
                                at: finished_at,
                            })
                            .await;
                        Some(true)
                    }
                    Err(e) => {
                        tracing::warn!("job {} outcome lost: {}", job.id, e);
                        None
                    }
                }
            }
            Delivery::Failed(failure) => match self.jobs.mark_failed(&job.id, &failure, finished_at).await {
                Ok(job) => {
                    tracing::warn!(
                        "job {} failed on {} (attempt {}): {} ({})",
                        job.id,
                        job.endpoint_id,
                        job.attempt_count,
                        failure.message,
                        failure.kind
                    );
                    self.events
                        .emit(SyndicationEvent::JobFailed { job, at: finished_at })
                        .await;
                    Some(false)
                }
                Err(e) => {
                    tracing::warn!("job {} outcome lost: {}", job.id, e);
                    None
                }
            },
        }
    }

    async fn push(&self, job: &DispatchJob, item: &ContentItem, endpoint: &Endpoint) -> Delivery {
        let existing = self.jobs.remote_id(&job.content_id, &endpoint.id).await;
        if item.is_deleted() {
            tracing::debug!("job {}: content {} deleted before push", job.id, item.id);
            return Delivery::Done {
                remote_id: existing,
                updated: false,
            };
        }

        let client = self.transports.client(endpoint.transport_type);
        let call = client.push(item, endpoint, existing.as_deref());
        match tokio::time::timeout(self.settings.push_timeout, call).await {
            Err(_) => Delivery::Failed(self.timed_out("push")),
            Ok(Err(e)) => Delivery::Failed(DeliveryFailure {
                kind: ErrorKind::Configuration,
                message: e.to_string(),
            }),
            Ok(Ok(result)) if result.success => Delivery::Done {
                updated: existing.is_some(),
                remote_id: result.remote_id.or(existing),
            },
            Ok(Ok(result)) => Delivery::Failed(result.error.unwrap_or_else(Self::unexplained)),
        }
    }

    async fn delete(&self, job: &DispatchJob, endpoint: &Endpoint) -> Delivery {
        let Some(remote_id) = self.jobs.remote_id(&job.content_id, &endpoint.id).await else {
            tracing::debug!("job {}: no remote copy to delete", job.id);
            return Delivery::Done {
                remote_id: None,
                updated: false,
            };
        };

        let client = self.transports.client(endpoint.transport_type);
        match tokio::time::timeout(self.settings.push_timeout, client.delete(&remote_id, endpoint)).await {
            Err(_) => Delivery::Failed(self.timed_out("delete")),
            Ok(Err(e)) => Delivery::Failed(DeliveryFailure {
                kind: ErrorKind::Configuration,
                message: e.to_string(),
            }),
            Ok(Ok(result)) if result.success => Delivery::Done {
                remote_id: Some(remote_id),
                updated: true,
            },
            Ok(Ok(result)) => Delivery::Failed(result.error.unwrap_or_else(Self::unexplained)),
        }
    }

    fn timed_out(&self, operation: &str) -> DeliveryFailure {
        DeliveryFailure {
            kind: ErrorKind::Timeout,
            message: format!("{} timed out after {}s", operation, self.settings.push_timeout.as_secs_f64()),
        }
    }

    fn unexplained() -> DeliveryFailure {
        DeliveryFailure {
            kind: ErrorKind::MalformedResponse,
            message: "transport reported failure without detail".to_string(),
        }
    }

    async fn abandon(&self, job: &DispatchJob, reason: &str) {
        let now = self.clock.now();
        match self.jobs.mark_abandoned(&job.id, now).await {
            Ok(abandoned) => {
                tracing::warn!("job {} abandoned: {}", job.id, reason);
                self.events
                    .emit(SyndicationEvent::JobAbandoned {
                        job: abandoned,
                        reason: reason.to_string(),
                        at: now,
                    })
                    .await;
            }
            Err(e) => tracing::debug!("job {} not abandoned: {}", job.id, e),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::adapters::outbound::{DashMapEndpointRegistry, DashMapJobStore, MemoryContentStore};
    use crate::domain::entities::{DeliveryResult, NewEndpoint};
    use crate::domain::ports::{ManualClock, TransportClient};
    use crate::domain::value_objects::{ContentId, JobStatus, TransportType};
    use crate::error::ConfigurationError;
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;

    /// Scripted transport: records calls, answers from a fixed behaviour.
    struct Scripted {
        behaviour: Behaviour,
        calls: Mutex<Vec<(String, Option<String>)>>,
    }

    #[derive(Clone, Copy)]
    enum Behaviour {
        Succeed,
        Fail,
        Hang,
        Misconfigured,
    }

    impl Scripted {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TransportClient for Scripted {
        fn transport_type(&self) -> TransportType {
            TransportType::XmlPush
        }

        async fn push(
            &self,
            item: &ContentItem,
            endpoint: &Endpoint,
            remote_id: Option<&str>,
        ) -> Result<DeliveryResult, ConfigurationError> {
            self.calls
                .lock()
                .push((format!("push {} {}", item.id, endpoint.id), remote_id.map(str::to_string)));
            match self.behaviour {
                Behaviour::Succeed => Ok(DeliveryResult::ok(Some(format!("remote-{}", item.id)))),
                Behaviour::Fail => Ok(DeliveryResult::failed(ErrorKind::HttpStatus { status: 503 }, "unavailable")),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(DeliveryResult::ok(None))
                }
                Behaviour::Misconfigured => Err(ConfigurationError::MissingCredential {
                    endpoint_id: endpoint.id.clone(),
                    key: "password",
                }),
            }
        }

        async fn delete(&self, remote_id: &str, endpoint: &Endpoint) -> Result<DeliveryResult, ConfigurationError> {
            self.calls
                .lock()
                .push((format!("delete {}", endpoint.id), Some(remote_id.to_string())));
            Ok(DeliveryResult::ok(None))
        }

        async fn test_connection(&self, _endpoint: &Endpoint) -> bool {
            true
        }
    }

    struct Fixed(Arc<Scripted>);

    impl TransportLookup for Fixed {
        fn client(&self, _transport_type: TransportType) -> Arc<dyn TransportClient> {
            self.0.clone()
        }
    }

    struct Harness {
        registry: Arc<DashMapEndpointRegistry>,
        jobs: Arc<DashMapJobStore>,
        content: Arc<MemoryContentStore>,
        transport: Arc<Scripted>,
        runner: Arc<JobRunner>,
        cancel: CancelFlag,
    }

    fn harness(behaviour: Behaviour, settings: RunnerSettings) -> Harness {
        let registry = Arc::new(DashMapEndpointRegistry::new());
        let jobs = Arc::new(DashMapJobStore::new());
        let content = Arc::new(MemoryContentStore::new());
        let transport = Scripted::new(behaviour);
        let runner = Arc::new(JobRunner::new(
            registry.clone(),
            jobs.clone(),
            content.clone(),
            Arc::new(Fixed(transport.clone())),
            Arc::new(EventBus::new()),
            Arc::new(ManualClock::default()),
            settings,
        ));
        Harness {
            registry,
            jobs,
            content,
            transport,
            runner,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn endpoint(h: &Harness, name: &str) -> EndpointId {
        h.registry
            .register(NewEndpoint::new(name, TransportType::XmlPush, "https://site.example/xmlrpc.php"))
            .await
            .unwrap()
    }

    fn post(id: &str, to: &EndpointId) -> ContentItem {
        ContentItem::new(id, "title", "body").subscribe_endpoint(to.clone())
    }

    // ===== Enqueue Tests =====

    #[tokio::test]
    async fn test_enqueue_creates_one_job_per_pair() {
        let h = harness(Behaviour::Succeed, RunnerSettings::default());
        let a = endpoint(&h, "a").await;
        let item = post("post-1", &a);

        let report = h.runner.enqueue(&[item.clone()]).await;
        assert_eq!(report.created, 1);

        // Same revision again: nothing new
        let again = h.runner.enqueue(&[item]).await;
        assert_eq!(again.created, 0);
        assert_eq!(again.unchanged, 1);
        assert_eq!(h.jobs.counts().await.pending, 1);
    }

    #[tokio::test]
    async fn test_enqueue_skips_pull_endpoints() {
        let h = harness(Behaviour::Succeed, RunnerSettings::default());
        let feed = h
            .registry
            .register(NewEndpoint::new("feed", TransportType::RssPull, "https://feed.example/rss"))
            .await
            .unwrap();

        let report = h.runner.enqueue(&[post("post-1", &feed)]).await;
        assert_eq!(report, EnqueueReport::default());
    }

    #[tokio::test]
    async fn test_deleted_item_ignored_unless_delete_pushed() {
        let h = harness(Behaviour::Succeed, RunnerSettings::default());
        let a = endpoint(&h, "a").await;
        let mut item = post("post-1", &a);
        h.runner.enqueue(&[item.clone()]).await;
        h.runner.process(&h.cancel).await;

        item.status = crate::domain::entities::ContentStatus::Deleted;
        item.modified_at = Utc::now() + chrono::Duration::seconds(5);
        let report = h.runner.enqueue(&[item]).await;
        assert_eq!(report.created, 0);
    }

    #[tokio::test]
    async fn test_deleted_item_removes_remote_copy() {
        let h = harness(
            Behaviour::Succeed,
            RunnerSettings {
                delete_pushed: true,
                ..Default::default()
            },
        );
        let a = endpoint(&h, "a").await;
        let mut item = post("post-1", &a);
        h.content.publish(item.clone());
        h.runner.enqueue(&[item.clone()]).await;
        h.runner.process(&h.cancel).await;
        assert!(h.jobs.remote_id(&item.id, &a).await.is_some());

        item.status = crate::domain::entities::ContentStatus::Deleted;
        item.modified_at = Utc::now() + chrono::Duration::seconds(5);
        assert_eq!(h.runner.enqueue(&[item.clone()]).await.created, 1);
        let report = h.runner.process(&h.cancel).await;

        assert_eq!(report.succeeded, 1);
        assert!(h.jobs.remote_id(&item.id, &a).await.is_none());
        let calls = h.transport.calls.lock();
        assert_eq!(calls[1], (format!("delete {}", a), Some("remote-post-1".to_string())));
    }

    // ===== Dispatch Tests =====

    #[tokio::test]
    async fn test_success_records_remote_id_and_updates_later() {
        let h = harness(Behaviour::Succeed, RunnerSettings::default());
        let a = endpoint(&h, "a").await;
        let mut item = post("post-1", &a);
        h.content.publish(item.clone());

        h.runner.enqueue(&[item.clone()]).await;
        let report = h.runner.process(&h.cancel).await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(h.jobs.remote_id(&item.id, &a).await.as_deref(), Some("remote-post-1"));

        item.modified_at = Utc::now() + chrono::Duration::seconds(5);
        h.content.publish(item.clone());
        h.runner.enqueue(&[item]).await;
        h.runner.process(&h.cancel).await;

        let calls = h.transport.calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, None);
        assert_eq!(calls[1].1.as_deref(), Some("remote-post-1"));
    }

    #[tokio::test]
    async fn test_remote_failure_marks_job_failed() {
        let h = harness(Behaviour::Fail, RunnerSettings::default());
        let a = endpoint(&h, "a").await;
        let item = post("post-1", &a);
        h.content.publish(item.clone());
        h.runner.enqueue(&[item]).await;

        let report = h.runner.process(&h.cancel).await;
        assert_eq!(report.failed, 1);

        let failed = h.jobs.list(&Default::default()).await.remove(0);
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error_kind, Some(ErrorKind::HttpStatus { status: 503 }));
        assert_eq!(failed.last_error.as_deref(), Some("unavailable"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_push_times_out() {
        let h = harness(
            Behaviour::Hang,
            RunnerSettings {
                push_timeout: Duration::from_secs(2),
                ..Default::default()
            },
        );
        let a = endpoint(&h, "a").await;
        let item = post("post-1", &a);
        h.content.publish(item.clone());
        h.runner.enqueue(&[item]).await;

        let report = h.runner.process(&h.cancel).await;
        assert_eq!(report.failed, 1);
        let failed = h.jobs.list(&Default::default()).await.remove(0);
        assert_eq!(failed.error_kind, Some(ErrorKind::Timeout));
    }

    #[tokio::test]
    async fn test_configuration_error_classified() {
        let h = harness(Behaviour::Misconfigured, RunnerSettings::default());
        let a = endpoint(&h, "a").await;
        let item = post("post-1", &a);
        h.content.publish(item.clone());
        h.runner.enqueue(&[item]).await;
        h.runner.process(&h.cancel).await;

        let failed = h.jobs.list(&Default::default()).await.remove(0);
        assert_eq!(failed.error_kind, Some(ErrorKind::Configuration));
        assert!(!failed.is_retryable());
    }

    #[tokio::test]
    async fn test_disabled_endpoint_jobs_deferred() {
        let h = harness(Behaviour::Succeed, RunnerSettings::default());
        let a = endpoint(&h, "a").await;
        let item = post("post-1", &a);
        h.content.publish(item.clone());
        h.runner.enqueue(&[item]).await;
        h.registry.disable(&a).await.unwrap();

        let report = h.runner.process(&h.cancel).await;
        assert_eq!(report.deferred, 1);
        assert!(h.transport.calls.lock().is_empty());
        assert_eq!(h.jobs.counts().await.pending, 1);
    }

    #[tokio::test]
    async fn test_queue_follows_content_creation_order() {
        let h = harness(Behaviour::Succeed, RunnerSettings::default());
        let a = endpoint(&h, "a").await;
        let base = Utc::now();
        let mut newer = post("newer", &a);
        newer.created_at = base;
        let mut older = post("older", &a);
        older.created_at = base - chrono::Duration::hours(1);
        h.content.publish(newer.clone());
        h.content.publish(older.clone());

        // Enqueued newest first; processed oldest first
        h.runner.enqueue(&[newer, older]).await;
        h.runner.process(&h.cancel).await;

        let calls = h.transport.calls.lock();
        assert_eq!(calls[0].0, format!("push older {}", a));
        assert_eq!(calls[1].0, format!("push newer {}", a));
    }

    #[tokio::test]
    async fn test_cancelled_cycle_leaves_jobs_pending() {
        let h = harness(Behaviour::Succeed, RunnerSettings::default());
        let a = endpoint(&h, "a").await;
        let item = post("post-1", &a);
        h.content.publish(item.clone());
        h.runner.enqueue(&[item]).await;

        h.cancel.store(true, Ordering::SeqCst);
        let report = h.runner.process(&h.cancel).await;
        assert_eq!(report.cancelled, 1);
        assert_eq!(h.jobs.counts().await.pending, 1);
    }

    #[tokio::test]
    async fn test_missing_content_abandons_job() {
        let h = harness(Behaviour::Succeed, RunnerSettings::default());
        let a = endpoint(&h, "a").await;
        h.runner.enqueue(&[post("ghost", &a)]).await;

        h.runner.process(&h.cancel).await;
        let job = h.jobs.list(&Default::default()).await.remove(0);
        assert_eq!(job.status, JobStatus::Abandoned);
        assert_eq!(job.content_id, ContentId::new("ghost"));
    }

    #[tokio::test]
    async fn test_deleted_endpoint_abandons_job() {
        let h = harness(Behaviour::Succeed, RunnerSettings::default());
        let a = endpoint(&h, "a").await;
        let item = post("post-1", &a);
        h.content.publish(item.clone());
        h.runner.enqueue(&[item]).await;
        h.registry.delete(&a).await.unwrap();

        let report = h.runner.process(&h.cancel).await;
        assert_eq!(report.abandoned, 1);
        assert_eq!(h.jobs.counts().await.abandoned, 1);
    }
}
