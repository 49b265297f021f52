//! syndication - content syndication daemon
//!
//! This is the composition root that wires together all the components.

use std::sync::Arc;
use std::time::Duration;
use syndication::adapters::inbound::ApiServer;
use syndication::adapters::outbound::transports::build_client;
use syndication::adapters::outbound::{
    DashMapEndpointRegistry, DashMapJobStore, FanoutSink, LogNotificationSink, MemoryContentStore,
    SqliteEndpointStore, TransportSet, WebhookNotificationSink,
};
use syndication::application::{ServiceSettings, SyndicationDeps, SyndicationService};
use syndication::config::load_config;
use syndication::domain::ports::{NotificationSink, SystemClock};
use syndication::infrastructure::{shutdown_signal, Scheduler, ShutdownController};
use tracing_subscriber::fmt::format::FmtSpan;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    tracing::info!(
        "starting syndication cycle={}s workers={} threshold={}",
        cfg.cycle_interval_secs,
        cfg.worker_count,
        cfg.failure_threshold
    );

    // ===== COMPOSITION ROOT =====

    // 1. Outbound adapters

    // Endpoint registry, optionally backed by SQLite
    let registry = Arc::new(DashMapEndpointRegistry::new());
    let store = match &cfg.db_path {
        Some(path) => {
            let store = Arc::new(SqliteEndpointStore::open(path.clone())?);
            let count = store.load(&registry).await?;
            tracing::info!("loaded {} endpoint(s) from {}", count, path);
            store.clone().start_persist(registry.clone(), cfg.persist_interval_secs);
            Some(store)
        }
        None => {
            tracing::warn!("SYNDICATION_DB_PATH not set; endpoints are kept in memory only");
            None
        }
    };

    let jobs = Arc::new(DashMapJobStore::new());
    let content = Arc::new(MemoryContentStore::new());

    let http = build_client(cfg.push_timeout())?;
    let transports = Arc::new(TransportSet::new(http.clone()));

    let notifications: Arc<dyn NotificationSink> = match &cfg.notify_webhook_url {
        Some(url) => {
            tracing::info!("notifications go to webhook {}", url);
            Arc::new(FanoutSink::new(vec![
                Arc::new(LogNotificationSink),
                Arc::new(WebhookNotificationSink::new(http, url.clone())),
            ]))
        }
        None => Arc::new(LogNotificationSink),
    };

    // 2. Application service
    let service = Arc::new(SyndicationService::new(
        SyndicationDeps {
            registry: registry.clone(),
            jobs,
            content: content.clone(),
            publisher: content.clone(),
            sink: content,
            transports,
            notifications,
            clock: Arc::new(SystemClock),
        },
        ServiceSettings::from_config(&cfg),
    ));

    // 3. Scheduler and inbound adapter
    let shutdown = ShutdownController::new();
    let scheduler = Scheduler::new(
        service.clone(),
        Duration::from_secs(cfg.cycle_interval_secs),
        shutdown.clone(),
    )
    .start();

    let api = if cfg.api_enabled {
        let server = ApiServer::new(cfg.api_listen_addr.clone(), service.clone());
        let stop = shutdown.clone();
        Some(tokio::spawn(async move {
            let result = server.run(async move { stop.stopped().await }).await;
            if let Err(e) = result {
                tracing::error!("admin API stopped: {:?}", e);
            }
        }))
    } else {
        None
    };

    shutdown_signal(shutdown.clone()).await;

    // 4. Drain
    if let Err(e) = scheduler.await {
        tracing::error!("scheduler task failed: {}", e);
    }
    shutdown.wait_for_drain(DRAIN_TIMEOUT).await;
    if let Some(api) = api {
        let _ = api.await;
    }
    if let Some(store) = store {
        store.save(&registry).await?;
        tracing::info!("registry saved");
    }

    tracing::info!("shutdown complete");
    Ok(())
}
