use crate::domain::ports::NotificationKind;
use crate::domain::services::BackoffPolicy;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // Dispatch cycle settings
    pub cycle_interval_secs: u64,
    pub pull_interval_secs: u64,
    pub worker_count: usize,
    pub push_timeout_secs: u64,
    pub stuck_cycle_secs: u64,
    pub delete_pushed: bool,
    pub update_pulled: bool,
    pub debug: bool,

    // Failure monitoring
    pub failure_threshold: u32,
    pub auto_reenable: bool,

    // Retry backoff
    pub retry_base_secs: u64,
    pub retry_multiplier: u32,
    pub retry_max_interval_secs: u64,
    pub max_attempts: u32,

    // Event counter
    pub event_window_secs: u64,
    pub event_retention_secs: u64,

    // Persistence
    pub db_path: Option<String>,
    pub persist_interval_secs: u64,

    // Admin API settings
    pub api_enabled: bool,
    pub api_listen_addr: String,

    // Notifications
    pub notify_webhook_url: Option<String>,
    pub notify_on: BTreeSet<NotificationKind>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 60,
            pull_interval_secs: 3600,
            worker_count: 8,
            push_timeout_secs: 30,
            stuck_cycle_secs: 900,
            delete_pushed: false,
            update_pulled: true,
            debug: false,
            failure_threshold: 5,
            auto_reenable: false,
            retry_base_secs: 60,
            retry_multiplier: 2,
            retry_max_interval_secs: 3600,
            max_attempts: 5,
            event_window_secs: 3600,
            event_retention_secs: 7 * 24 * 3600,
            db_path: None,
            persist_interval_secs: 30,
            api_enabled: false,
            api_listen_addr: "0.0.0.0:8081".to_string(),
            notify_webhook_url: None,
            notify_on: BTreeSet::new(),
        }
    }
}

impl Config {
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_secs(self.retry_base_secs),
            multiplier: self.retry_multiplier,
            max_interval: Duration::from_secs(self.retry_max_interval_secs),
            max_attempts: self.max_attempts,
        }
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_secs(self.push_timeout_secs)
    }
}

pub fn load_config() -> anyhow::Result<Config> {
    load_config_from(|key| std::env::var(key).ok())
}

/// Build the configuration from an arbitrary variable lookup.
pub fn load_config_from<F>(lookup: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = Config::default();

    let number = |key: &str, default: u64| -> u64 {
        lookup(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
    };
    let flag = |key: &str, default: bool| -> bool {
        lookup(key)
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(default)
    };
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    let cycle_interval_secs = number("SYNDICATION_CYCLE_INTERVAL_SECS", defaults.cycle_interval_secs).max(1);
    let pull_interval_secs = number("SYNDICATION_PULL_INTERVAL_SECS", defaults.pull_interval_secs);
    let worker_count = (number("SYNDICATION_WORKER_COUNT", defaults.worker_count as u64) as usize).max(1);
    let push_timeout_secs = number("SYNDICATION_PUSH_TIMEOUT_SECS", defaults.push_timeout_secs).max(1);
    let stuck_cycle_secs = number("SYNDICATION_STUCK_CYCLE_SECS", defaults.stuck_cycle_secs);
    let delete_pushed = flag("SYNDICATION_DELETE_PUSHED", defaults.delete_pushed);
    let update_pulled = flag("SYNDICATION_UPDATE_PULLED", defaults.update_pulled);
    let debug = lookup("DEBUG").is_some();

    // Failure monitoring
    let failure_threshold = (number("SYNDICATION_FAILURE_THRESHOLD", defaults.failure_threshold as u64) as u32).max(1);
    let auto_reenable = flag("SYNDICATION_AUTO_REENABLE", defaults.auto_reenable);

    // Retry backoff
    let retry_base_secs = number("SYNDICATION_RETRY_BASE_SECS", defaults.retry_base_secs);
    let retry_multiplier = number("SYNDICATION_RETRY_MULTIPLIER", defaults.retry_multiplier as u64) as u32;
    let retry_max_interval_secs = number("SYNDICATION_RETRY_MAX_INTERVAL_SECS", defaults.retry_max_interval_secs);
    let max_attempts = (number("SYNDICATION_MAX_ATTEMPTS", defaults.max_attempts as u64) as u32).max(1);

    // Event counter
    let event_window_secs = number("SYNDICATION_EVENT_WINDOW_SECS", defaults.event_window_secs).max(1);
    let event_retention_secs = number("SYNDICATION_EVENT_RETENTION_SECS", defaults.event_retention_secs);

    // Persistence
    let db_path = non_empty("SYNDICATION_DB_PATH");
    let persist_interval_secs = number("SYNDICATION_PERSIST_INTERVAL_SECS", defaults.persist_interval_secs).max(1);

    // Admin API settings
    let api_enabled = flag("SYNDICATION_API_ENABLED", defaults.api_enabled);
    let api_listen_addr = lookup("SYNDICATION_API_LISTEN_ADDR").unwrap_or(defaults.api_listen_addr);

    // Notifications
    let notify_webhook_url = non_empty("SYNDICATION_NOTIFY_WEBHOOK_URL");
    let notify_on = match lookup("SYNDICATION_NOTIFY_ON") {
        Some(raw) => parse_kinds(&raw)?,
        None => defaults.notify_on,
    };

    Ok(Config {
        cycle_interval_secs,
        pull_interval_secs,
        worker_count,
        push_timeout_secs,
        stuck_cycle_secs,
        delete_pushed,
        update_pulled,
        debug,
        failure_threshold,
        auto_reenable,
        retry_base_secs,
        retry_multiplier,
        retry_max_interval_secs,
        max_attempts,
        event_window_secs,
        event_retention_secs,
        db_path,
        persist_interval_secs,
        api_enabled,
        api_listen_addr,
        notify_webhook_url,
        notify_on,
    })
}

fn parse_kinds(raw: &str) -> anyhow::Result<BTreeSet<NotificationKind>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| NotificationKind::parse(s).ok_or_else(|| anyhow::anyhow!("unknown notification kind: {}", s)))
        .collect()
}
