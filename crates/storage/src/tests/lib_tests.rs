use super::*;

#[tokio::test]
async fn stores_reads_and_deletes_draft_text() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    assert_eq!(storage.get("project-a").await.expect("get"), None);

    storage.set("project-a", "{\"v\":1}").await.expect("set");
    assert_eq!(
        storage.get("project-a").await.expect("get").as_deref(),
        Some("{\"v\":1}")
    );

    storage.delete("project-a").await.expect("delete");
    assert_eq!(storage.get("project-a").await.expect("get"), None);
}

#[tokio::test]
async fn overwrites_existing_key() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.set("k", "first").await.expect("first");
    storage.set("k", "second").await.expect("second");

    let entries = storage.list_entries().await.expect("entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].value, "second");
}

#[tokio::test]
async fn deleting_missing_key_is_not_an_error() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.delete("never-written").await.expect("delete");
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn purges_only_entries_older_than_cutoff() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.set("old", "a").await.expect("old");
    sqlx::query("UPDATE drafts SET updated_at_ms = 10 WHERE key = 'old'")
        .execute(storage.pool())
        .await
        .expect("age row");
    storage.set("new", "b").await.expect("new");

    let purged = storage.purge_older_than(1_000).await.expect("purge");
    assert_eq!(purged, 1);
    let keys: Vec<String> = storage
        .list_entries()
        .await
        .expect("entries")
        .into_iter()
        .map(|entry| entry.key)
        .collect();
    assert_eq!(keys, vec!["new".to_string()]);
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("drafts.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[tokio::test]
async fn memory_store_counts_writes() {
    let store = MemoryStore::new();
    store.set("a", "1").await.expect("set");
    store.set("a", "2").await.expect("set");
    store.delete("a").await.expect("delete");

    assert_eq!(store.write_count(), 2);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn disabled_store_fails_every_call() {
    let store = DisabledStore;
    assert!(store.get("k").await.is_err());
    assert!(store.set("k", "v").await.is_err());
    assert!(store.delete("k").await.is_err());
}

#[test]
fn sqlite_path_ignores_memory_and_strips_query() {
    assert_eq!(sqlite_path("sqlite::memory:"), None);
    assert_eq!(
        sqlite_path("sqlite://./data/drafts.db?mode=rwc"),
        Some(PathBuf::from("./data/drafts.db"))
    );
}
