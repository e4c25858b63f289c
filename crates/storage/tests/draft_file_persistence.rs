use storage::{DraftKvStore, Storage};

#[tokio::test]
async fn drafts_survive_reopening_the_database_file() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("drafts.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    {
        let storage = Storage::new(&database_url).await.expect("db");
        storage
            .set("https://preview.example/acme", "{\"step\":\"summary\"}")
            .await
            .expect("set");
        storage.pool().close().await;
    }

    let reopened = Storage::new(&database_url).await.expect("reopen");
    let value = reopened
        .get("https://preview.example/acme")
        .await
        .expect("get");
    assert_eq!(value.as_deref(), Some("{\"step\":\"summary\"}"));
}
