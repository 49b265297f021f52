//! Event Counter
//!
//! Aggregates dispatch and pull outcomes per endpoint, both as running
//! totals and as fixed-width time windows.

use crate::application::events::{SyndicationEvent, SyndicationObserver};
use crate::domain::value_objects::EndpointId;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one endpoint.
#[derive(Debug, Default)]
struct Counters {
    succeeded: AtomicU64,
    failed: AtomicU64,
    abandoned: AtomicU64,
    pulls_succeeded: AtomicU64,
    pulls_failed: AtomicU64,
}

impl Counters {
    fn bump(&self, event: &SyndicationEvent) {
        let counter = match event {
            SyndicationEvent::JobSucceeded { .. } => &self.succeeded,
            SyndicationEvent::JobFailed { .. } => &self.failed,
            SyndicationEvent::JobAbandoned { .. } => &self.abandoned,
            SyndicationEvent::PullSucceeded { .. } => &self.pulls_succeeded,
            SyndicationEvent::PullFailed { .. } => &self.pulls_failed,
            SyndicationEvent::EndpointDisabled { .. } => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> EventCounts {
        EventCounts {
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            pulls_succeeded: self.pulls_succeeded.load(Ordering::Relaxed),
            pulls_failed: self.pulls_failed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of an endpoint's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventCounts {
    pub succeeded: u64,
    pub failed: u64,
    pub abandoned: u64,
    pub pulls_succeeded: u64,
    pub pulls_failed: u64,
}

impl EventCounts {
    fn add(&mut self, other: &EventCounts) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.abandoned += other.abandoned;
        self.pulls_succeeded += other.pulls_succeeded;
        self.pulls_failed += other.pulls_failed;
    }
}

/// Counts for one endpoint in one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowCounts {
    pub endpoint_id: EndpointId,
    pub window_start: DateTime<Utc>,
    pub counts: EventCounts,
}

/// Per-endpoint and per-window outcome counter.
pub struct EventCounter {
    window: Duration,
    retention: Duration,
    totals: DashMap<EndpointId, Counters>,
    windows: DashMap<(EndpointId, i64), Counters>,
}

impl EventCounter {
    pub fn new(window: std::time::Duration, retention: std::time::Duration) -> Self {
        let window = Duration::from_std(window)
            .ok()
            .filter(|w| w.num_seconds() > 0)
            .unwrap_or_else(|| Duration::hours(1));
        let retention = Duration::from_std(retention).unwrap_or_else(|_| Duration::days(7));
        Self {
            window,
            retention,
            totals: DashMap::new(),
            windows: DashMap::new(),
        }
    }

    /// Start of the window containing `at`, in unix seconds.
    fn window_key(&self, at: DateTime<Utc>) -> i64 {
        let width = self.window.num_seconds();
        at.timestamp().div_euclid(width) * width
    }

    pub fn record(&self, event: &SyndicationEvent) {
        let endpoint_id = event.endpoint_id().clone();
        let key = self.window_key(event.at());
        self.totals.entry(endpoint_id.clone()).or_default().bump(event);
        self.windows.entry((endpoint_id, key)).or_default().bump(event);
    }

    pub fn totals(&self, endpoint_id: &EndpointId) -> EventCounts {
        self.totals
            .get(endpoint_id)
            .map(|c| c.snapshot())
            .unwrap_or_default()
    }

    /// Sum over every endpoint.
    pub fn overall(&self) -> EventCounts {
        let mut sum = EventCounts::default();
        for entry in self.totals.iter() {
            sum.add(&entry.value().snapshot());
        }
        sum
    }

    pub fn all_totals(&self) -> Vec<(EndpointId, EventCounts)> {
        let mut all: Vec<_> = self
            .totals
            .iter()
            .map(|e| (e.key().clone(), e.value().snapshot()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Windows for one endpoint (or all endpoints), oldest first.
    pub fn windows(&self, endpoint_id: Option<&EndpointId>) -> Vec<WindowCounts> {
        let mut windows: Vec<WindowCounts> = self
            .windows
            .iter()
            .filter(|e| endpoint_id.map_or(true, |id| &e.key().0 == id))
            .filter_map(|e| {
                let (endpoint_id, start) = e.key();
                Some(WindowCounts {
                    endpoint_id: endpoint_id.clone(),
                    window_start: Utc.timestamp_opt(*start, 0).single()?,
                    counts: e.value().snapshot(),
                })
            })
            .collect();
        windows.sort_by(|a, b| {
            a.window_start
                .cmp(&b.window_start)
                .then_with(|| a.endpoint_id.cmp(&b.endpoint_id))
        });
        windows
    }

    /// Drop windows that ended before the retention horizon.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        // A retention reaching past the earliest representable instant keeps everything.
        let Some(horizon) = now.checked_sub_signed(self.retention) else {
            return 0;
        };
        let horizon = horizon.timestamp();
        let width = self.window.num_seconds();
        let before = self.windows.len();
        self.windows.retain(|(_, start), _| start + width > horizon);
        let pruned = before.saturating_sub(self.windows.len());
        if pruned > 0 {
            tracing::debug!("pruned {} event window(s)", pruned);
        }
        pruned
    }

    /// Clear an endpoint's totals and windows.
    pub fn reset(&self, endpoint_id: &EndpointId) {
        self.totals.remove(endpoint_id);
        self.windows.retain(|(id, _), _| id != endpoint_id);
    }
}

#[async_trait]
impl SyndicationObserver for EventCounter {
    async fn on_event(&self, event: &SyndicationEvent) -> Vec<SyndicationEvent> {
        self.record(event);
        Vec::new()
    }
}
