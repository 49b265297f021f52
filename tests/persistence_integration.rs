//! Integration tests for SQLite persistence of the endpoint registry
//!
//! Uses a temporary database file per test.

use std::sync::Arc;
use syndication::adapters::outbound::{DashMapEndpointRegistry, SqliteEndpointStore};
use syndication::domain::entities::{EndpointFilter, HealthUpdate, NewEndpoint};
use syndication::domain::ports::EndpointRegistry;
use syndication::domain::value_objects::{Credentials, TransportType};
use tempfile::TempDir;

fn db_path(dir: &TempDir) -> String {
    dir.path().join("registry.db").to_string_lossy().into_owned()
}

/// Test that endpoints, groups and health survive a restart
#[tokio::test]
async fn test_registry_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = db_path(&dir);

    let registry = DashMapEndpointRegistry::new();
    let parent = registry.create_group("partners", None).await.unwrap();
    let child = registry.create_group("eu", Some(parent.clone())).await.unwrap();
    let id = registry
        .register(
            NewEndpoint::new("blog", TransportType::XmlPush, "https://blog.example/xmlrpc.php")
                .with_credentials(Credentials::new().with("username", "editor").with("password", "secret"))
                .in_group(child.clone()),
        )
        .await
        .unwrap();
    registry
        .register(NewEndpoint::new("feed", TransportType::RssPull, "https://feed.example/rss"))
        .await
        .unwrap();
    registry
        .record_health(
            &id,
            HealthUpdate::Failure {
                at: chrono::Utc::now(),
                consecutive_failures: 2,
            },
        )
        .await
        .unwrap();
    registry.disable(&id).await.unwrap();

    let store = SqliteEndpointStore::open(path.clone()).unwrap();
    store.save(&registry).await.unwrap();
    assert_eq!(store.version(), 1);

    let restored = DashMapEndpointRegistry::new();
    let reopened = SqliteEndpointStore::open(path).unwrap();
    assert_eq!(reopened.load(&restored).await.unwrap(), 2);

    let blog = restored.get(&id).await.unwrap();
    assert_eq!(blog, registry.get(&id).await.unwrap());
    assert!(!blog.enabled);
    assert_eq!(blog.consecutive_failures, 2);
    assert_eq!(blog.credentials.get("password"), Some("secret"));

    let groups = restored.list_groups().await;
    assert_eq!(groups.len(), 2);
    assert_eq!(restored.get_group(&child).await.unwrap().parent_id, Some(parent));

    let feeds = restored
        .list(&EndpointFilter {
            transport_type: Some(TransportType::RssPull),
            ..Default::default()
        })
        .await;
    assert_eq!(feeds.len(), 1);
}

/// Test that a save replaces rows removed since the previous save
#[tokio::test]
async fn test_save_reflects_deletions() {
    let dir = TempDir::new().unwrap();
    let store = SqliteEndpointStore::open(db_path(&dir)).unwrap();

    let registry = DashMapEndpointRegistry::new();
    let keep = registry
        .register(NewEndpoint::new("keep", TransportType::RestPush, "https://a.example/api"))
        .await
        .unwrap();
    let drop_me = registry
        .register(NewEndpoint::new("drop", TransportType::RestPush, "https://b.example/api"))
        .await
        .unwrap();
    store.save(&registry).await.unwrap();

    registry.delete(&drop_me).await.unwrap();
    store.save(&registry).await.unwrap();

    let restored = DashMapEndpointRegistry::new();
    assert_eq!(store.load(&restored).await.unwrap(), 1);
    assert!(restored.get(&keep).await.is_ok());
    assert!(restored.get(&drop_me).await.is_err());
}

/// Test that the background task persists on its interval
#[tokio::test]
async fn test_background_persist() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteEndpointStore::open(db_path(&dir)).unwrap());
    let registry = Arc::new(DashMapEndpointRegistry::new());
    registry
        .register(NewEndpoint::new("site", TransportType::RestPushV2, "https://c.example/wp-json"))
        .await
        .unwrap();

    let handle = store.clone().start_persist(registry.clone(), 1);
    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
    handle.abort();

    assert!(store.version() >= 1);
    let restored = DashMapEndpointRegistry::new();
    assert_eq!(store.load(&restored).await.unwrap(), 1);
}
