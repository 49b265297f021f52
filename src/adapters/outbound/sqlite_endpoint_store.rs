//! SQLite Endpoint Store
//!
//! Persists the endpoint registry (groups, endpoints and their health
//! stamps) to a SQLite file. The registry is seeded from the file at start
//! up and written back periodically by a background task.

use super::dashmap_endpoint_registry::{DashMapEndpointRegistry, RegistrySnapshot};
use crate::domain::entities::{Endpoint, Group};
use crate::domain::value_objects::{Credentials, EndpointId, GroupId, TransportType};
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS groups (
    id        TEXT PRIMARY KEY,
    name      TEXT NOT NULL,
    parent_id TEXT
);
CREATE TABLE IF NOT EXISTS endpoints (
    id                   TEXT PRIMARY KEY,
    name                 TEXT NOT NULL,
    transport_type       TEXT NOT NULL,
    target_url           TEXT NOT NULL,
    credentials          TEXT NOT NULL,
    group_ids            TEXT NOT NULL,
    enabled              INTEGER NOT NULL,
    consecutive_failures INTEGER NOT NULL,
    last_success_at      TEXT,
    last_failure_at      TEXT,
    last_pull_at         TEXT,
    created_at           TEXT NOT NULL
);
";

/// Endpoint row as stored, before domain conversion.
struct EndpointRow {
    id: String,
    name: String,
    transport_type: String,
    target_url: String,
    credentials: String,
    group_ids: String,
    enabled: i64,
    consecutive_failures: i64,
    last_success_at: Option<String>,
    last_failure_at: Option<String>,
    last_pull_at: Option<String>,
    created_at: String,
}

/// SQLite-backed persistence for the endpoint registry.
pub struct SqliteEndpointStore {
    db_path: String,
    version: Arc<AtomicU64>,
}

impl SqliteEndpointStore {
    /// Open (creating if needed) the database file and its schema.
    pub fn open(db_path: impl Into<String>) -> Result<Self, StoreError> {
        let db_path = db_path.into();
        let conn = Connection::open(&db_path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            db_path,
            version: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Number of completed saves.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Read the stored registry and restore it into `registry`.
    pub async fn load(&self, registry: &DashMapEndpointRegistry) -> Result<usize, StoreError> {
        let db_path = self.db_path.clone();
        let snapshot = tokio::task::spawn_blocking(move || Self::load_from_sqlite(&db_path))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))??;

        let count = snapshot.endpoints.len();
        registry.restore(snapshot);
        Ok(count)
    }

    /// Write the whole registry in a single transaction.
    pub async fn save(&self, registry: &DashMapEndpointRegistry) -> Result<(), StoreError> {
        let snapshot = registry.snapshot();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || Self::save_to_sqlite(&db_path, &snapshot))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))??;

        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!("registry persisted, version={}", version);
        Ok(())
    }

    /// Start the background persist task.
    ///
    /// Saves the registry every `interval_secs` until the task is aborted.
    pub fn start_persist(
        self: Arc<Self>,
        registry: Arc<DashMapEndpointRegistry>,
        interval_secs: u64,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                sleep(Duration::from_secs(interval_secs)).await;
                if let Err(e) = self.save(&registry).await {
                    tracing::error!("error persisting registry: {:?}", e);
                }
            }
        })
    }

    fn load_from_sqlite(db_path: &str) -> Result<RegistrySnapshot, StoreError> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch(SCHEMA)?;

        let mut stmt = conn.prepare("SELECT id, name, parent_id FROM groups ORDER BY id")?;
        let groups = stmt
            .query_map([], |row| {
                Ok(Group {
                    id: GroupId::new(row.get::<_, String>(0)?),
                    name: row.get(1)?,
                    parent_id: row.get::<_, Option<String>>(2)?.map(GroupId::new),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT id, name, transport_type, target_url, credentials, group_ids, enabled,
                    consecutive_failures, last_success_at, last_failure_at, last_pull_at, created_at
             FROM endpoints ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| Self::read_endpoint_row(row))?
            .collect::<Result<Vec<_>, _>>()?;

        let endpoints = rows
            .into_iter()
            .map(Self::row_to_endpoint)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RegistrySnapshot { groups, endpoints })
    }

    fn save_to_sqlite(db_path: &str, snapshot: &RegistrySnapshot) -> Result<(), StoreError> {
        let mut conn = Connection::open(db_path)?;
        conn.execute_batch(SCHEMA)?;

        let tx = conn.transaction()?;
        tx.execute("DELETE FROM endpoints", [])?;
        tx.execute("DELETE FROM groups", [])?;

        for group in &snapshot.groups {
            tx.execute(
                "INSERT INTO groups (id, name, parent_id) VALUES (?1, ?2, ?3)",
                params![
                    group.id.as_str(),
                    group.name,
                    group.parent_id.as_ref().map(GroupId::as_str)
                ],
            )?;
        }

        for endpoint in &snapshot.endpoints {
            let credentials = serde_json::to_string(&endpoint.credentials)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
            let group_ids = serde_json::to_string(&endpoint.group_ids)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
            tx.execute(
                "INSERT INTO endpoints (id, name, transport_type, target_url, credentials, group_ids,
                    enabled, consecutive_failures, last_success_at, last_failure_at, last_pull_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    endpoint.id.as_str(),
                    endpoint.name,
                    endpoint.transport_type.as_str(),
                    endpoint.target_url,
                    credentials,
                    group_ids,
                    endpoint.enabled as i64,
                    endpoint.consecutive_failures as i64,
                    endpoint.last_success_at.map(|t| t.to_rfc3339()),
                    endpoint.last_failure_at.map(|t| t.to_rfc3339()),
                    endpoint.last_pull_at.map(|t| t.to_rfc3339()),
                    endpoint.created_at.to_rfc3339(),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn read_endpoint_row(row: &Row) -> rusqlite::Result<EndpointRow> {
        Ok(EndpointRow {
            id: row.get(0)?,
            name: row.get(1)?,
            transport_type: row.get(2)?,
            target_url: row.get(3)?,
            credentials: row.get(4)?,
            group_ids: row.get(5)?,
            enabled: row.get(6)?,
            consecutive_failures: row.get(7)?,
            last_success_at: row.get(8)?,
            last_failure_at: row.get(9)?,
            last_pull_at: row.get(10)?,
            created_at: row.get(11)?,
        })
    }

    /// Convert a stored row to an Endpoint entity.
    fn row_to_endpoint(row: EndpointRow) -> Result<Endpoint, StoreError> {
        let transport_type = TransportType::from_str(&row.transport_type)
            .map_err(|e| StoreError::Corrupt(format!("endpoint {}: {}", row.id, e)))?;
        let credentials: Credentials = serde_json::from_str(&row.credentials)
            .map_err(|e| StoreError::Corrupt(format!("endpoint {} credentials: {}", row.id, e)))?;
        let group_ids: BTreeSet<GroupId> = serde_json::from_str(&row.group_ids)
            .map_err(|e| StoreError::Corrupt(format!("endpoint {} group_ids: {}", row.id, e)))?;

        Ok(Endpoint {
            transport_type,
            credentials,
            group_ids,
            name: row.name,
            target_url: row.target_url,
            enabled: row.enabled != 0,
            consecutive_failures: u32::try_from(row.consecutive_failures).unwrap_or(0),
            last_success_at: parse_optional_time(row.last_success_at)?,
            last_failure_at: parse_optional_time(row.last_failure_at)?,
            last_pull_at: parse_optional_time(row.last_pull_at)?,
            created_at: parse_time(&row.created_at)?,
            id: EndpointId::new(row.id),
        })
    }
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {:?}: {}", raw, e)))
}

fn parse_optional_time(raw: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    raw.as_deref().map(parse_time).transpose()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::domain::entities::{HealthUpdate, NewEndpoint};
    use crate::domain::ports::EndpointRegistry;
    use tempfile::TempDir;

    fn db_in(dir: &TempDir) -> String {
        dir.path().join("syndication.db").to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_empty_database_loads_nothing() {
        let dir = TempDir::new().unwrap();
        let store = SqliteEndpointStore::open(db_in(&dir)).unwrap();
        let registry = DashMapEndpointRegistry::new();

        assert_eq!(store.load(&registry).await.unwrap(), 0);
        assert!(registry.snapshot().endpoints.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load_preserves_registry() {
        let dir = TempDir::new().unwrap();
        let store = SqliteEndpointStore::open(db_in(&dir)).unwrap();

        let registry = DashMapEndpointRegistry::new();
        let group = registry.create_group("news", None).await.unwrap();
        let id = registry
            .register(
                NewEndpoint::new("partner", TransportType::RestPushV2, "https://partner.example/wp-json")
                    .with_credentials(Credentials::new().with("username", "u").with("password", "p"))
                    .in_group(group.clone()),
            )
            .await
            .unwrap();
        registry
            .record_health(
                &id,
                HealthUpdate::Failure {
                    at: Utc::now(),
                    consecutive_failures: 2,
                },
            )
            .await
            .unwrap();
        registry.disable(&id).await.unwrap();

        store.save(&registry).await.unwrap();
        assert_eq!(store.version(), 1);

        let restored = DashMapEndpointRegistry::new();
        assert_eq!(store.load(&restored).await.unwrap(), 1);

        let endpoint = restored.get(&id).await.unwrap();
        assert!(!endpoint.enabled);
        assert_eq!(endpoint.consecutive_failures, 2);
        assert_eq!(endpoint.credentials.get("password"), Some("p"));
        assert!(endpoint.group_ids.contains(&group));
        assert_eq!(restored.get_group(&group).await.unwrap().name, "news");
    }

    #[tokio::test]
    async fn test_save_replaces_previous_contents() {
        let dir = TempDir::new().unwrap();
        let store = SqliteEndpointStore::open(db_in(&dir)).unwrap();
        let registry = DashMapEndpointRegistry::new();

        let id = registry
            .register(NewEndpoint::new("a", TransportType::RssPull, "https://feeds.example/rss"))
            .await
            .unwrap();
        store.save(&registry).await.unwrap();

        registry.delete(&id).await.unwrap();
        store.save(&registry).await.unwrap();

        let restored = DashMapEndpointRegistry::new();
        assert_eq!(store.load(&restored).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_transport_type_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = db_in(&dir);
        let store = SqliteEndpointStore::open(path.clone()).unwrap();

        let conn = Connection::open(&path).unwrap();
        conn.execute(
            "INSERT INTO endpoints VALUES ('x', 'x', 'telegraph', 'https://x.example', '{}', '[]', 1, 0, NULL, NULL, NULL, '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();

        let err = store.load(&DashMapEndpointRegistry::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }
}
