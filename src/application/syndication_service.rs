//! Syndication Service - Main application use case
//!
//! Owns the observers and the job runner, composes them into dispatch
//! cycles, and exposes the authoring and administrative operations used by
//! the admin API.
//!
//! A cycle runs these phases in order:
//! 0. requeue jobs left in_progress by an interrupted cycle
//! 1. pull every due feed endpoint and ingest its items
//! 2. enqueue jobs for content changed since the last watermark
//! 3. sweep failed records that never got a retry decision
//! 4. dispatch due jobs
//! 5. prune expired event windows

use crate::application::event_counter::{EventCounter, EventCounts, WindowCounts};
use crate::application::events::{EventBus, SyndicationEvent};
use crate::application::failure_monitor::{FailureMonitor, FailureMonitorConfig};
use crate::application::job_runner::{CancelFlag, DispatchReport, EnqueueReport, JobRunner, RunnerSettings};
use crate::application::notifier::Notifier;
use crate::application::retry_scheduler::RetryScheduler;
use crate::config::Config;
use crate::domain::entities::{
    ContentDraft, ContentItem, ContentStatus, DeliveryFailure, DispatchJob, Endpoint, EndpointFilter, EndpointUpdate, FailureRecord, Group,
    GroupDeletePolicy, HealthUpdate, NewEndpoint,
};
use crate::domain::ports::{
    Clock, ContentPublisher, ContentSink, ContentSource, EndpointRegistry, IngestReport, JobCounts, JobQuery, JobStore,
    NotificationKind, NotificationSink, TransportLookup,
};
use crate::domain::services::BackoffPolicy;
use crate::domain::value_objects::{ContentId, EndpointId, ErrorKind, GroupId, JobId, JobStatus, TransportType};
use crate::error::{ContentError, JobStoreError, RegistryError, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Tunables for the service and everything it owns.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub runner: RunnerSettings,
    pub monitor: FailureMonitorConfig,
    pub backoff: BackoffPolicy,
    /// Minimum time between two pulls of the same feed
    pub pull_interval: Duration,
    /// Overwrite already ingested feed items when they change
    pub update_pulled: bool,
    /// A cycle running longer than this is cancelled by the next trigger
    pub stuck_after: Duration,
    pub event_window: Duration,
    pub event_retention: Duration,
    /// Optional notification kinds (new, edit, delete)
    pub notify_on: BTreeSet<NotificationKind>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ServiceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            runner: RunnerSettings {
                worker_count: config.worker_count,
                push_timeout: config.push_timeout(),
                delete_pushed: config.delete_pushed,
            },
            monitor: FailureMonitorConfig {
                threshold: config.failure_threshold,
                auto_reenable: config.auto_reenable,
            },
            backoff: config.backoff(),
            pull_interval: Duration::from_secs(config.pull_interval_secs),
            update_pulled: config.update_pulled,
            stuck_after: Duration::from_secs(config.stuck_cycle_secs),
            event_window: Duration::from_secs(config.event_window_secs),
            event_retention: Duration::from_secs(config.event_retention_secs),
            notify_on: config.notify_on.clone(),
        }
    }
}

/// Collaborators injected at start-up.
#[derive(Clone)]
pub struct SyndicationDeps {
    pub registry: Arc<dyn EndpointRegistry>,
    pub jobs: Arc<dyn JobStore>,
    pub content: Arc<dyn ContentSource>,
    pub publisher: Arc<dyn ContentPublisher>,
    pub sink: Arc<dyn ContentSink>,
    pub transports: Arc<dyn TransportLookup>,
    pub notifications: Arc<dyn NotificationSink>,
    pub clock: Arc<dyn Clock>,
}

/// Feed pulls performed in one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PullSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub ingested: IngestReport,
}

/// What one cycle did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pulls: PullSummary,
    /// In-progress jobs of an interrupted cycle put back to pending
    pub recovered: usize,
    pub changed_items: usize,
    pub enqueued: EnqueueReport,
    pub swept: usize,
    pub dispatch: DispatchReport,
    pub cancelled: bool,
}

/// Result of a `run_cycle` call.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Another cycle held the run-lock
    Skipped,
}

/// Per-endpoint line of the stats report.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointStats {
    pub endpoint_id: EndpointId,
    pub name: String,
    pub transport_type: TransportType,
    pub enabled: bool,
    pub consecutive_failures: u32,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub counts: EventCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyndicationStats {
    pub jobs: JobCounts,
    pub totals: EventCounts,
    pub endpoints: Vec<EndpointStats>,
    pub cycle_active: bool,
    pub watermark: Option<DateTime<Utc>>,
    pub last_cycle: Option<CycleReport>,
}

struct ActiveCycle {
    started_at: DateTime<Utc>,
    cancel: CancelFlag,
}

/// Clears the active-cycle slot even when the cycle future is dropped.
struct ActiveGuard<'a>(&'a Mutex<Option<ActiveCycle>>);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

pub struct SyndicationService {
    registry: Arc<dyn EndpointRegistry>,
    jobs: Arc<dyn JobStore>,
    content: Arc<dyn ContentSource>,
    publisher: Arc<dyn ContentPublisher>,
    sink: Arc<dyn ContentSink>,
    transports: Arc<dyn TransportLookup>,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    runner: Arc<JobRunner>,
    monitor: Arc<FailureMonitor>,
    retries: Arc<RetryScheduler>,
    counter: Arc<EventCounter>,
    settings: ServiceSettings,
    run_lock: tokio::sync::Mutex<()>,
    active: Mutex<Option<ActiveCycle>>,
    watermark: Mutex<Option<DateTime<Utc>>>,
    last_cycle: Mutex<Option<CycleReport>>,
}

impl SyndicationService {
    /// Wire the observers in their delivery order: failure monitor, retry
    /// scheduler, event counter, notifier.
    pub fn new(deps: SyndicationDeps, settings: ServiceSettings) -> Self {
        let events = Arc::new(EventBus::new());

        let monitor = Arc::new(FailureMonitor::new(settings.monitor.clone(), deps.registry.clone()));
        let retries = Arc::new(RetryScheduler::new(
            settings.backoff.clone(),
            deps.jobs.clone(),
            deps.clock.clone(),
        ));
        let counter = Arc::new(EventCounter::new(settings.event_window, settings.event_retention));
        let notifier = Arc::new(Notifier::new(deps.notifications.clone(), settings.notify_on.clone()));

        events.subscribe(monitor.clone());
        events.subscribe(retries.clone());
        events.subscribe(counter.clone());
        events.subscribe(notifier);

        let runner = Arc::new(JobRunner::new(
            deps.registry.clone(),
            deps.jobs.clone(),
            deps.content.clone(),
            deps.transports.clone(),
            events.clone(),
            deps.clock.clone(),
            settings.runner.clone(),
        ));

        Self {
            registry: deps.registry,
            jobs: deps.jobs,
            content: deps.content,
            publisher: deps.publisher,
            sink: deps.sink,
            transports: deps.transports,
            clock: deps.clock,
            events,
            runner,
            monitor,
            retries,
            counter,
            settings,
            run_lock: tokio::sync::Mutex::new(()),
            active: Mutex::new(None),
            watermark: Mutex::new(None),
            last_cycle: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    // ===== Cycle =====

    /// Run one dispatch cycle unless another one is active.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        self.run_cycle_with(Arc::new(AtomicBool::new(false))).await
    }

    /// Run one cycle that stops at the next job boundary once `cancel` is
    /// raised, by the caller or by the stuck check.
    pub async fn run_cycle_with(&self, cancel: CancelFlag) -> Result<CycleOutcome> {
        let Ok(_lock) = self.run_lock.try_lock() else {
            self.check_stuck();
            return Ok(CycleOutcome::Skipped);
        };

        let started_at = self.clock.now();
        *self.active.lock() = Some(ActiveCycle {
            started_at,
            cancel: cancel.clone(),
        });
        tracing::debug!("cycle started");

        let result = {
            let _active = ActiveGuard(&self.active);
            self.cycle(started_at, &cancel).await
        };

        match result {
            Ok(report) => {
                tracing::info!(
                    "cycle finished: {} changed, {} enqueued, {} succeeded, {} failed, {} pulls{}",
                    report.changed_items,
                    report.enqueued.created,
                    report.dispatch.succeeded,
                    report.dispatch.failed,
                    report.pulls.succeeded + report.pulls.failed,
                    if report.cancelled { " (cancelled)" } else { "" }
                );
                *self.last_cycle.lock() = Some(report.clone());
                Ok(CycleOutcome::Completed(report))
            }
            Err(e) => {
                tracing::error!("cycle aborted: {}", e);
                Err(e)
            }
        }
    }

    async fn cycle(&self, started_at: DateTime<Utc>, cancel: &CancelFlag) -> Result<CycleReport> {
        let recovered = self.recover_interrupted(started_at).await;
        let pulls = self.pull_due(started_at, cancel).await;

        let since = *self.watermark.lock();
        let items = self.content.changed_since(since).await?;
        let enqueued = self.runner.enqueue(&items).await;
        *self.watermark.lock() = Some(started_at);

        let abandoned = self.retries.sweep().await;
        let swept = abandoned.len();
        self.events.emit_all(abandoned).await;

        let dispatch = self.runner.process(cancel).await;
        let finished_at = self.clock.now();
        self.counter.prune(finished_at);

        Ok(CycleReport {
            started_at,
            finished_at,
            pulls,
            recovered,
            changed_items: items.len(),
            enqueued,
            swept,
            dispatch,
            cancelled: cancel.load(Ordering::SeqCst),
        })
    }

    /// The run-lock is held, so any in_progress record belongs to a cycle
    /// that was dropped or whose queue task died mid-push.
    async fn recover_interrupted(&self, now: DateTime<Utc>) -> usize {
        let query = JobQuery {
            status: Some(JobStatus::InProgress),
            ..Default::default()
        };
        let mut recovered = 0;
        for job in self.jobs.list(&query).await {
            match self.jobs.requeue_interrupted(&job.id, now).await {
                Ok(_) => recovered += 1,
                Err(e) => tracing::warn!("job {} left in_progress: {}", job.id, e),
            }
        }
        if recovered > 0 {
            tracing::warn!("requeued {} job(s) interrupted by a previous cycle", recovered);
        }
        recovered
    }

    /// Called by a trigger that found the run-lock held.
    fn check_stuck(&self) {
        let now = self.clock.now();
        let active = self.active.lock();
        let Some(active) = active.as_ref() else {
            return;
        };

        let running = (now - active.started_at).to_std().unwrap_or_default();
        if running < self.settings.stuck_after {
            tracing::debug!("previous cycle still running ({}s); skipping", running.as_secs());
        } else if !active.cancel.swap(true, Ordering::SeqCst) {
            tracing::warn!(
                "cycle running for {}s exceeds stuck threshold; cancelling at next job boundary",
                running.as_secs()
            );
        }
    }

    /// Ask the active cycle to stop at the next job boundary.
    pub fn cancel_active_cycle(&self) -> bool {
        match self.active.lock().as_ref() {
            Some(active) => {
                active.cancel.store(true, Ordering::SeqCst);
                tracing::info!("active cycle cancellation requested");
                true
            }
            None => false,
        }
    }

    pub fn cycle_active(&self) -> bool {
        self.active.lock().is_some()
    }

    pub fn last_cycle(&self) -> Option<CycleReport> {
        self.last_cycle.lock().clone()
    }

    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        *self.watermark.lock()
    }

    // ===== Pull =====

    async fn pull_due(&self, now: DateTime<Utc>, cancel: &AtomicBool) -> PullSummary {
        let mut summary = PullSummary::default();
        let filter = EndpointFilter {
            transport_type: Some(TransportType::RssPull),
            enabled: Some(true),
            ..Default::default()
        };

        for endpoint in self.registry.list(&filter).await {
            if cancel.load(Ordering::SeqCst) {
                break;
            }
            let due = endpoint.last_pull_at.map_or(true, |last| {
                (now - last).to_std().map_or(true, |elapsed| elapsed >= self.settings.pull_interval)
            });
            if !due {
                continue;
            }

            match self.pull_endpoint(&endpoint).await {
                Some(report) => {
                    summary.succeeded += 1;
                    summary.ingested.inserted += report.inserted;
                    summary.ingested.updated += report.updated;
                    summary.ingested.skipped += report.skipped;
                }
                None => summary.failed += 1,
            }
        }
        summary
    }

    /// Pull one feed and ingest it. `None` when the pull failed.
    async fn pull_endpoint(&self, endpoint: &Endpoint) -> Option<IngestReport> {
        let client = self.transports.client(endpoint.transport_type);
        let timeout = self.settings.runner.push_timeout;

        let outcome = match tokio::time::timeout(timeout, client.pull(endpoint)).await {
            Err(_) => Err(DeliveryFailure {
                kind: ErrorKind::Timeout,
                message: format!("pull timed out after {}s", timeout.as_secs_f64()),
            }),
            Ok(Err(e)) => Err(DeliveryFailure {
                kind: ErrorKind::Configuration,
                message: e.to_string(),
            }),
            Ok(Ok(outcome)) => match outcome.error {
                Some(failure) => Err(failure),
                None => Ok(outcome.items),
            },
        };

        let at = self.clock.now();
        if let Err(e) = self.registry.record_health(&endpoint.id, HealthUpdate::Pulled { at }).await {
            tracing::debug!("pull stamp for {} skipped: {}", endpoint.id, e);
        }

        match outcome {
            Ok(items) => {
                let fetched = items.len();
                let report = match self.sink.ingest(&endpoint.id, items, self.settings.update_pulled).await {
                    Ok(report) => report,
                    Err(e) => {
                        tracing::warn!("ingest from {} failed: {}", endpoint.id, e);
                        return None;
                    }
                };
                tracing::info!(
                    "pulled {} item(s) from {}: {} new, {} updated, {} skipped",
                    fetched,
                    endpoint.id,
                    report.inserted,
                    report.updated,
                    report.skipped
                );
                self.events
                    .emit(SyndicationEvent::PullSucceeded {
                        endpoint_id: endpoint.id.clone(),
                        report,
                        at,
                    })
                    .await;
                Some(report)
            }
            Err(failure) => {
                tracing::warn!("pull from {} failed: {} ({})", endpoint.id, failure.message, failure.kind);
                self.events
                    .emit(SyndicationEvent::PullFailed {
                        endpoint_id: endpoint.id.clone(),
                        failure,
                        at,
                    })
                    .await;
                None
            }
        }
    }

    // ===== Content =====

    /// Create or replace a local item. It is picked up by the next cycle.
    ///
    /// An existing item keeps its creation time; every save is a new
    /// revision stamped with the current time.
    pub async fn publish_content(&self, id: Option<ContentId>, draft: ContentDraft) -> Result<ContentItem> {
        if draft.title.trim().is_empty() {
            return Err(RegistryError::validation("content title must not be empty").into());
        }
        for endpoint_id in &draft.subscriptions.endpoints {
            self.registry.get(endpoint_id).await?;
        }
        for group_id in &draft.subscriptions.groups {
            self.registry.get_group(group_id).await?;
        }

        let now = self.clock.now();
        let id = id.unwrap_or_else(ContentId::generate);
        let created_at = match self.content.get(&id).await {
            Ok(existing) => existing.created_at,
            Err(ContentError::NotFound(_)) => now,
            Err(e) => return Err(e.into()),
        };

        let item = ContentItem {
            id,
            title: draft.title,
            body: draft.body,
            taxonomy: draft.taxonomy,
            created_at,
            modified_at: now,
            status: ContentStatus::Published,
            subscriptions: draft.subscriptions,
            source_guid: None,
        };
        let item = self.publisher.save_item(item).await?;
        tracing::info!(
            "content {} saved for {} endpoint(s) and {} group(s)",
            item.id,
            item.subscriptions.endpoints.len(),
            item.subscriptions.groups.len()
        );
        Ok(item)
    }

    /// Mark an item deleted; pushed copies are removed when deletes are
    /// propagated.
    pub async fn trash_content(&self, id: &ContentId) -> Result<ContentItem> {
        let item = self.publisher.trash_item(id, self.clock.now()).await?;
        tracing::info!("content {} trashed", id);
        Ok(item)
    }

    pub async fn get_content(&self, id: &ContentId) -> Result<ContentItem> {
        Ok(self.content.get(id).await?)
    }

    // ===== Endpoints =====

    pub async fn register_endpoint(&self, endpoint: NewEndpoint) -> Result<Endpoint> {
        let id = self.registry.register(endpoint).await?;
        let endpoint = self.registry.get(&id).await?;
        tracing::info!("registered {} endpoint {} ({})", endpoint.transport_type, id, endpoint.name);
        Ok(endpoint)
    }

    pub async fn get_endpoint(&self, id: &EndpointId) -> Result<Endpoint> {
        Ok(self.registry.get(id).await?)
    }

    pub async fn list_endpoints(&self, filter: &EndpointFilter) -> Vec<Endpoint> {
        self.registry.list(filter).await
    }

    pub async fn update_endpoint(&self, id: &EndpointId, update: EndpointUpdate) -> Result<Endpoint> {
        let endpoint = self.registry.update(id, update).await?;
        tracing::info!("updated endpoint {}", id);
        Ok(endpoint)
    }

    /// Remove an endpoint and abandon its pending jobs.
    pub async fn delete_endpoint(&self, id: &EndpointId) -> Result<Endpoint> {
        let endpoint = self.registry.delete(id).await?;
        let now = self.clock.now();

        let query = JobQuery {
            status: Some(JobStatus::Pending),
            endpoint_id: Some(id.clone()),
            content_id: None,
        };
        let mut abandoned = 0;
        for job in self.jobs.list(&query).await {
            if self.jobs.mark_abandoned(&job.id, now).await.is_ok() {
                abandoned += 1;
            }
        }

        self.monitor.forget(id);
        self.counter.reset(id);
        tracing::info!("deleted endpoint {} ({} pending job(s) abandoned)", id, abandoned);
        Ok(endpoint)
    }

    /// Manual re-enable; clears the failure record and counters.
    pub async fn enable_endpoint(&self, id: &EndpointId) -> Result<Endpoint> {
        let changed = self.registry.enable(id).await?;
        self.monitor.reset(id).await;
        self.counter.reset(id);
        if changed {
            tracing::info!("endpoint {} re-enabled", id);
        }
        Ok(self.registry.get(id).await?)
    }

    pub async fn disable_endpoint(&self, id: &EndpointId) -> Result<Endpoint> {
        if self.registry.disable(id).await? {
            tracing::info!("endpoint {} disabled by operator", id);
        }
        Ok(self.registry.get(id).await?)
    }

    /// Reachability check through the endpoint's transport client.
    pub async fn test_connection(&self, id: &EndpointId) -> Result<bool> {
        let endpoint = self.registry.get(id).await?;
        let client = self.transports.client(endpoint.transport_type);
        let reachable = tokio::time::timeout(self.settings.runner.push_timeout, client.test_connection(&endpoint))
            .await
            .unwrap_or(false);
        tracing::info!("connection test for {}: {}", id, if reachable { "ok" } else { "failed" });
        Ok(reachable)
    }

    pub fn failure_record(&self, id: &EndpointId) -> Option<FailureRecord> {
        self.monitor.record(id)
    }

    pub fn failure_records(&self) -> Vec<FailureRecord> {
        self.monitor.records()
    }

    // ===== Groups =====

    pub async fn create_group(&self, name: &str, parent_id: Option<GroupId>) -> Result<Group> {
        let id = self.registry.create_group(name, parent_id).await?;
        Ok(self.registry.get_group(&id).await?)
    }

    pub async fn list_groups(&self) -> Vec<Group> {
        self.registry.list_groups().await
    }

    pub async fn move_group(&self, id: &GroupId, parent_id: Option<GroupId>) -> Result<Group> {
        Ok(self.registry.move_group(id, parent_id).await?)
    }

    pub async fn delete_group(&self, id: &GroupId, policy: GroupDeletePolicy) -> Result<()> {
        self.registry.delete_group(id, policy).await?;
        tracing::info!("deleted group {} ({:?})", id, policy);
        Ok(())
    }

    // ===== Jobs =====

    pub async fn list_jobs(&self, query: &JobQuery) -> Vec<DispatchJob> {
        self.jobs.list(query).await
    }

    pub async fn get_job(&self, id: &JobId) -> Result<DispatchJob> {
        self.jobs
            .get(id)
            .await
            .ok_or_else(|| JobStoreError::NotFound(id.clone()).into())
    }

    /// Manual retry: an abandoned job gets a fresh attempt-1 job, a pending
    /// one is moved to run at the next cycle.
    pub async fn retry_job(&self, id: &JobId) -> Result<DispatchJob> {
        let job = self.get_job(id).await?;
        let now = self.clock.now();
        let retried = match job.status {
            JobStatus::Abandoned => self.jobs.revive(id, now).await?,
            JobStatus::Pending => self.jobs.reschedule(id, now).await?,
            from => {
                return Err(JobStoreError::InvalidTransition {
                    job_id: id.clone(),
                    from,
                    to: JobStatus::Pending,
                }
                .into())
            }
        };
        tracing::info!("job {} manually retried as {}", id, retried.id);
        Ok(retried)
    }

    // ===== Stats =====

    pub async fn stats(&self) -> SyndicationStats {
        let endpoints = self
            .registry
            .list(&EndpointFilter::default())
            .await
            .into_iter()
            .map(|e| EndpointStats {
                counts: self.counter.totals(&e.id),
                endpoint_id: e.id,
                name: e.name,
                transport_type: e.transport_type,
                enabled: e.enabled,
                consecutive_failures: e.consecutive_failures,
                last_success_at: e.last_success_at,
                last_failure_at: e.last_failure_at,
            })
            .collect();

        SyndicationStats {
            jobs: self.jobs.counts().await,
            totals: self.counter.overall(),
            endpoints,
            cycle_active: self.cycle_active(),
            watermark: self.watermark(),
            last_cycle: self.last_cycle(),
        }
    }

    pub fn event_windows(&self, endpoint_id: Option<&EndpointId>) -> Vec<WindowCounts> {
        self.counter.windows(endpoint_id)
    }
}
