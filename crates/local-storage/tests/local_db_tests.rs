//! Local dashboard store behaviour over the real backends

use presto_config::Ttl;
use presto_local_storage::{
    FileStorage, JsonStorageExt, KeyValueStorage, LocalDashboardStore, MemoryStorage,
};
use presto_shared::{DashboardRecord, DashboardStore, PrestoError};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

fn record(title: &str, tags: &[&str]) -> DashboardRecord {
    DashboardRecord::from_json(json!({ "title": title, "tags": tags, "rows": [] })).unwrap()
}

fn index<S: KeyValueStorage>(storage: &S, bucket: &str) -> BTreeMap<String, Vec<String>> {
    storage.get_json(bucket).unwrap().unwrap_or_default()
}

fn all_listed_ids<S: KeyValueStorage>(storage: &S) -> Vec<String> {
    ["t", "l"]
        .iter()
        .flat_map(|bucket| index(storage, bucket).into_values().flatten())
        .collect()
}

#[test]
fn test_save_indexes_title_and_tags() {
    let store = LocalDashboardStore::new(MemoryStorage::new());
    let id = store.save(&record("CPU Overview", &["prod", "cpu"])).unwrap();

    assert_eq!(id, "cpu-overview");
    assert_eq!(store.titles().unwrap(), vec!["CPU Overview"]);
    assert_eq!(store.tags().unwrap(), vec!["cpu", "prod"]);
    assert_eq!(index(store.storage(), "t")["prod"], vec!["cpu-overview"]);

    let stored = store.get("cpu-overview", false).unwrap().unwrap();
    assert_eq!(stored.dashboard["title"], "CPU Overview");
}

#[test]
fn test_resave_replaces_stale_tags() {
    let store = LocalDashboardStore::new(MemoryStorage::new());
    store.save(&record("CPU", &["prod", "old"])).unwrap();
    store.save(&record("CPU", &["prod", "new"])).unwrap();

    let tags = index(store.storage(), "t");
    assert!(!tags.contains_key("old"));
    assert_eq!(tags["prod"], vec!["cpu"]);
    assert_eq!(tags["new"], vec!["cpu"]);
    assert_eq!(index(store.storage(), "l")["CPU"], vec!["cpu"]);
}

#[test]
fn test_delete_scrubs_only_that_id() {
    let store = LocalDashboardStore::new(MemoryStorage::new());
    store.save(&record("CPU", &["prod", "shared"])).unwrap();
    store.save(&record("Disk", &["prod"])).unwrap();
    store.save(&record("Net", &["shared"])).unwrap();

    assert!(store.delete("cpu").unwrap());

    let listed = all_listed_ids(store.storage());
    assert!(!listed.contains(&"cpu".to_string()));
    assert!(store.get("cpu", false).unwrap().is_none());

    assert_eq!(index(store.storage(), "t")["prod"], vec!["disk"]);
    assert_eq!(index(store.storage(), "t")["shared"], vec!["net"]);
    assert!(store.get("disk", false).unwrap().is_some());
    assert!(store.get("net", false).unwrap().is_some());

    assert!(!store.delete("cpu").unwrap());
}

#[test]
fn test_search_dedups_and_respects_scope() {
    let store = LocalDashboardStore::new(MemoryStorage::new());
    store.save(&record("Prod CPU", &["prod"])).unwrap();
    store.save(&record("Disk", &["production", "io"])).unwrap();

    let pattern = regex::Regex::new("(?i).*prod.*").unwrap();
    let both = store.search(Some(&pattern), Some(&pattern)).unwrap();
    let ids: Vec<_> = both.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["prod-cpu", "disk"]);

    let titles_only = store.search(None, Some(&pattern)).unwrap();
    assert_eq!(titles_only.len(), 1);
    assert_eq!(titles_only[0].tags, vec!["prod"]);
}

#[tokio::test]
async fn test_store_contract() {
    let store = LocalDashboardStore::new(MemoryStorage::new());

    let saved = store.save_dashboard(record("Web Latency", &["web"])).await.unwrap();
    assert_eq!(saved.url, "/dashboard/db/web-latency");

    let hits = store.search_dashboards("tags!:WEB").await.unwrap();
    assert!(hits.tags_only);
    assert_eq!(hits.tags, vec!["web"]);
    assert_eq!(hits.dashboards[0].title, "Web Latency");

    let hits = store.search_dashboards("title:latency").await.unwrap();
    assert!(!hits.tags_only);
    assert_eq!(hits.dashboards.len(), 1);

    let dashboard: Value = store.get_dashboard("web-latency", false).await.unwrap();
    assert_eq!(dashboard["title"], "Web Latency");

    assert_eq!(store.delete_dashboard("web-latency").await.unwrap(), "web-latency");
    assert!(matches!(
        store.get_dashboard("web-latency", false).await,
        Err(PrestoError::DashboardNotFound { .. })
    ));
    assert!(matches!(
        store.delete_dashboard("web-latency").await,
        Err(PrestoError::DashboardNotFound { .. })
    ));
}

#[tokio::test]
async fn test_temp_dashboards_expire() {
    let fresh = LocalDashboardStore::new(MemoryStorage::new());
    let temp = DashboardRecord::from_json(json!({ "title": "Shared View", "temp": true })).unwrap();

    let saved = fresh.save_dashboard(temp.clone()).await.unwrap();
    assert_eq!(saved.url, "#dashboard/temp/shared-view");
    assert!(fresh.get_dashboard("shared-view", true).await.is_ok());
    // temporary dashboards stay out of search
    assert!(fresh.titles().unwrap().is_empty());

    let expired = LocalDashboardStore::new(MemoryStorage::new()).with_temp_ttl(Ttl::parse("0m").unwrap());
    expired.save(&temp).unwrap();
    assert!(expired.get("shared-view", true).unwrap().is_none());
}

#[test]
fn test_file_backend_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dashboards.json");

    {
        let store = LocalDashboardStore::new(FileStorage::new(&path));
        store.save(&record("CPU", &["prod"])).unwrap();
    }

    let store = LocalDashboardStore::new(Arc::new(FileStorage::new(&path)));
    assert_eq!(store.titles().unwrap(), vec!["CPU"]);
    assert!(store.get("cpu", false).unwrap().is_some());
}
