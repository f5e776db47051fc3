//! End-to-end coverage of the save -> list -> get -> manage path against a
//! mocked remote backend, per spec.md §8.

use mockito::Matcher;
use notecache_bridge::cache::CacheHandle;
use notecache_bridge::client::BackendClient;
use notecache_bridge::config::Config;
use notecache_bridge::protocol::ToolHandler;
use notecache_bridge::sync::SyncEngine;
use notecache_bridge::tools::{GetNoteTool, ListNotesTool, ManageNotesTool, SaveNoteTool};
use notecache_bridge::NOTES_BUCKET;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn test_config(dir: &std::path::Path, server_url: &str) -> Config {
    Config {
        username: "alice".into(),
        password: "secret".into(),
        db_encryption_key: None,
        db_encryption_kdf_iterations: 310_000,
        sync_interval: Duration::from_secs(300),
        api_timeout: Duration::from_secs(5),
        log_level: tracing::Level::WARN,
        log_file_path: None,
        cache_dir: dir.to_path_buf(),
        auth_base_url: server_url.to_string(),
        data_base_url: format!("{server_url}/1"),
        app_id: "notecache".into(),
        app_key: "test-key".into(),
    }
}

#[tokio::test]
async fn save_list_get_and_manage_round_trip() {
    let mut server = mockito::Server::new_async().await;
    let _auth_mock = server
        .mock("POST", "/notecache/authorize/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "access_token": "tok-123", "userid": "u1" }).to_string())
        .create_async()
        .await;

    let _save_mock = server
        .mock("POST", Matcher::Regex(r"^/1/note/i/[0-9a-fA-F-]+$".to_string()))
        .with_status(200)
        .with_header("X-Version", "1")
        .with_header("content-type", "application/json")
        .with_body("{}")
        .create_async()
        .await;

    let dir = tempdir().unwrap();
    let config = test_config(dir.path(), &server.url());
    let owner_hash = notecache_bridge::cache::owner_identity_hash(&config.username);
    let (cache, open_outcome) = CacheHandle::spawn(&config, &owner_hash).unwrap();
    assert!(!open_outcome.full_resync_required());

    let client = BackendClient::new(&config).unwrap();
    let sync_engine = Arc::new(SyncEngine::new(
        Arc::clone(&client),
        cache.clone(),
        NOTES_BUCKET.to_string(),
        config.sync_interval,
        false,
    ));

    let save_tool = SaveNoteTool::new(cache.clone(), Arc::clone(&client), NOTES_BUCKET.to_string());
    let saved = save_tool
        .call(json!({ "text": "hello world", "tags": ["work"] }))
        .await
        .expect("save_note should succeed");
    let id = saved["id"].as_str().expect("saved note has an id").to_string();
    assert_eq!(saved["local_version"], json!(1));
    assert_eq!(saved["text"], json!("hello world"));

    let list_tool = ListNotesTool::new(cache.clone());
    let listed = list_tool.call(json!({})).await.expect("list_notes should succeed");
    assert_eq!(listed["total_items"], json!(1));
    assert_eq!(listed["content"][0]["id"], json!(id));

    let get_tool = GetNoteTool::new(cache.clone());
    let fetched = get_tool
        .call(json!({ "id": id.clone() }))
        .await
        .expect("get_note should succeed");
    assert_eq!(fetched["text"], json!("hello world"));

    let manage_tool = ManageNotesTool::new(
        cache.clone(),
        Arc::clone(&client),
        Arc::clone(&sync_engine),
        NOTES_BUCKET.to_string(),
        &config,
        &owner_hash,
    );
    let stats = manage_tool
        .call(json!({ "action": "get_stats" }))
        .await
        .expect("get_stats should succeed");
    assert_eq!(stats["total_notes"], json!(1));
    assert_eq!(stats["schema_version"], json!(1));
}

#[tokio::test]
async fn reset_cache_deletes_store_files() {
    let server = mockito::Server::new_async().await;
    let dir = tempdir().unwrap();
    let config = test_config(dir.path(), &server.url());
    let owner_hash = notecache_bridge::cache::owner_identity_hash(&config.username);
    let (cache, _) = CacheHandle::spawn(&config, &owner_hash).unwrap();

    let client = BackendClient::new(&config).unwrap();
    let sync_engine = Arc::new(SyncEngine::new(
        Arc::clone(&client),
        cache.clone(),
        NOTES_BUCKET.to_string(),
        config.sync_interval,
        false,
    ));

    let manage_tool = ManageNotesTool::new(
        cache.clone(),
        Arc::clone(&client),
        Arc::clone(&sync_engine),
        NOTES_BUCKET.to_string(),
        &config,
        &owner_hash,
    );

    let cache_path = config.cache_file_path(&owner_hash);
    assert!(cache_path.exists());

    let result = manage_tool
        .call(json!({ "action": "reset_cache" }))
        .await
        .expect("reset_cache should succeed");
    assert_eq!(result["acknowledged"], json!(true));
    assert!(!cache_path.exists());
}
