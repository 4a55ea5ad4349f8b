//! End-to-end tests against an in-process server on an ephemeral port

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use turbocache::daemon::{self, DaemonClient, DaemonStatus};
use turbocache::server::{self, DaemonContext};
use turbocache_core::{LatencyTracker, Result, RetentionPolicy};
use turbocache_storage::{
    Artifact, ByteStream, FilesystemProvider, ListingEntry, StorageProvider, TimedProvider,
};

struct Running {
    base_url: String,
    ctx: Arc<DaemonContext>,
    handle: JoinHandle<std::io::Result<()>>,
}

async fn spawn_server(provider: Arc<dyn StorageProvider>, retention: RetentionPolicy) -> Running {
    let tracker = Arc::new(LatencyTracker::new());
    let ctx = Arc::new(DaemonContext::new(provider, tracker, retention));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let handle = tokio::spawn(server::serve(listener, Arc::clone(&ctx)));
    Running {
        base_url,
        ctx,
        handle,
    }
}

fn filesystem(dir: &tempfile::TempDir) -> Arc<dyn StorageProvider> {
    Arc::new(FilesystemProvider::new(dir.path()))
}

#[tokio::test]
async fn test_upload_then_download_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let server = spawn_server(filesystem(&dir), RetentionPolicy::default()).await;
    let http = reqwest::Client::new();
    let url = format!("{}/v8/artifacts/abc123", server.base_url);

    let put = http
        .put(&url)
        .header("content-type", "application/octet-stream")
        .header("x-artifact-tag", "build1")
        .body(b"0123456789".to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(put.status(), 200);
    let body: serde_json::Value = put.json().await.unwrap();
    assert_eq!(body["ok"], true);

    let get = http.get(&url).send().await.unwrap();
    assert_eq!(get.status(), 200);
    assert_eq!(get.headers()["content-length"], "10");
    assert_eq!(get.headers()["content-type"], "application/octet-stream");
    assert_eq!(get.bytes().await.unwrap().as_ref(), b"0123456789");
}

#[tokio::test]
async fn test_tag_is_returned_when_the_provider_keeps_it() {
    let server = spawn_server(Arc::new(TaggedMemory::default()), RetentionPolicy::default()).await;
    let http = reqwest::Client::new();
    let url = format!("{}/v8/artifacts/abc123", server.base_url);

    http.put(&url)
        .header("x-artifact-tag", "build1")
        .body(b"0123456789".to_vec())
        .send()
        .await
        .unwrap();

    let get = http.get(&url).send().await.unwrap();
    assert_eq!(get.status(), 200);
    assert_eq!(get.headers()["x-artifact-tag"], "build1");
    assert_eq!(get.headers()["content-length"], "10");
    assert_eq!(get.bytes().await.unwrap().as_ref(), b"0123456789");
}

#[tokio::test]
async fn test_unknown_artifact_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let server = spawn_server(filesystem(&dir), RetentionPolicy::default()).await;

    let response = reqwest::get(format!("{}/v8/artifacts/doesnotexist", server.base_url))
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "ok": false }));
}

#[tokio::test]
async fn test_head_reports_length_without_body() {
    let dir = tempfile::tempdir().unwrap();
    let server = spawn_server(filesystem(&dir), RetentionPolicy::default()).await;
    let http = reqwest::Client::new();
    let url = format!("{}/v8/artifacts/headcheck", server.base_url);
    http.put(&url).body(b"abcd".to_vec()).send().await.unwrap();

    let head = http.head(&url).send().await.unwrap();
    assert_eq!(head.status(), 200);
    assert_eq!(head.headers()["content-length"], "4");
}

#[tokio::test]
async fn test_backend_failure_is_500_and_server_keeps_serving() {
    let server = spawn_server(Arc::new(Failing), RetentionPolicy::default()).await;

    let response = reqwest::get(format!("{}/v8/artifacts/abc", server.base_url))
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["ok"], false);
    assert!(body["error"].as_str().unwrap().contains("backend down"));

    let client = DaemonClient::new(&server.base_url).unwrap();
    assert_eq!(client.detect().await, DaemonStatus::Running);
}

#[tokio::test]
async fn test_ping_self_test_through_client() {
    let dir = tempfile::tempdir().unwrap();
    let server = spawn_server(filesystem(&dir), RetentionPolicy::default()).await;
    let client = DaemonClient::new(&server.base_url).unwrap();

    let report = daemon::ping(&client).await.unwrap();
    assert!(report.ok);
    assert_eq!(report.tests, vec!["save", "get", "delete"]);
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn test_ping_reports_provider_failure() {
    let server = spawn_server(Arc::new(Failing), RetentionPolicy::default()).await;
    let client = DaemonClient::new(&server.base_url).unwrap();

    let report = client.ping().await.unwrap();
    assert!(!report.ok);
    assert!(report.tests.is_empty());
    assert!(report.error.unwrap().contains("save failed"));
    assert!(daemon::ping(&client).await.is_err());
}

#[tokio::test]
async fn test_shutdown_runs_retention_then_stops() {
    let provider = Arc::new(CountingProvider::with_old_entries(3));
    let tracker = Arc::new(LatencyTracker::new());
    let timed: Arc<dyn StorageProvider> = Arc::new(TimedProvider::new(
        Arc::clone(&provider) as Arc<dyn StorageProvider>,
        Arc::clone(&tracker),
    ));
    let ctx = Arc::new(DaemonContext::new(
        timed,
        Arc::clone(&tracker),
        RetentionPolicy {
            max_age: Some(Duration::from_secs(3600)),
            ..RetentionPolicy::default()
        },
    ));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(server::serve(listener, Arc::clone(&ctx)));
    let client = DaemonClient::new(format!("http://{addr}")).unwrap();

    daemon::kill(&client).await.unwrap();

    assert_eq!(provider.deletes.load(Ordering::SeqCst), 3);
    let calls: Vec<u64> = tracker.summary().entries.iter().map(|e| e.calls).collect();
    assert_eq!(calls, vec![0, 0, 3, 1]);

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
    assert!(ctx.shutdown.is_cancelled());
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_shutdown_without_budgets_deletes_nothing() {
    let provider = Arc::new(CountingProvider::with_old_entries(3));
    let server = spawn_server(
        Arc::clone(&provider) as Arc<dyn StorageProvider>,
        RetentionPolicy::default(),
    )
    .await;

    let reply = DaemonClient::new(&server.base_url)
        .unwrap()
        .shutdown()
        .await
        .unwrap();
    assert!(reply.ok);
    assert_eq!(provider.lists.load(Ordering::SeqCst), 0);
    assert_eq!(provider.deletes.load(Ordering::SeqCst), 0);

    tokio::time::timeout(Duration::from_secs(5), server.handle)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
    assert!(server.ctx.shutdown.is_cancelled());
}

/// Lists `entries`, counts deletes, stores nothing.
#[derive(Default)]
struct CountingProvider {
    entries: Vec<ListingEntry>,
    lists: AtomicUsize,
    deletes: AtomicUsize,
}

impl CountingProvider {
    fn with_old_entries(count: usize) -> Self {
        let entries = (0..count)
            .map(|i| ListingEntry {
                path: format!("old-{i}"),
                created_at: Utc::now() - chrono::Duration::days(7),
                size: 10,
            })
            .collect();
        Self {
            entries,
            ..Self::default()
        }
    }
}

#[async_trait]
impl StorageProvider for CountingProvider {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn entry_path(&self, hash: &str, _tag: Option<&str>) -> String {
        hash.to_string()
    }

    async fn save(&self, _hash: &str, _tag: Option<&str>, _body: ByteStream) -> Result<()> {
        Ok(())
    }

    async fn get(&self, _hash: &str) -> Result<Option<Artifact>> {
        Ok(None)
    }

    async fn delete(&self, _path: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ListingEntry>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        Ok(self.entries.clone())
    }
}

/// Keeps artifacts and their tags in memory.
#[derive(Default)]
struct TaggedMemory {
    items: Mutex<Vec<(String, Option<String>, Vec<u8>)>>,
}

#[async_trait]
impl StorageProvider for TaggedMemory {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn entry_path(&self, hash: &str, _tag: Option<&str>) -> String {
        hash.to_string()
    }

    async fn save(&self, hash: &str, tag: Option<&str>, body: ByteStream) -> Result<()> {
        let bytes = turbocache_storage::collect_bytes(body)
            .await
            .map_err(|e| turbocache_core::Error::io_no_path(e, "read body"))?;
        self.items
            .lock()
            .unwrap()
            .push((hash.to_string(), tag.map(str::to_owned), bytes));
        Ok(())
    }

    async fn get(&self, hash: &str) -> Result<Option<Artifact>> {
        let items = self.items.lock().unwrap();
        Ok(items.iter().find(|(h, _, _)| h == hash).map(|(_, tag, bytes)| Artifact {
            size: Some(bytes.len() as u64),
            tag: tag.clone(),
            body: turbocache_storage::byte_stream_from(bytes.clone()),
        }))
    }

    async fn delete(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ListingEntry>> {
        Ok(Vec::new())
    }
}

/// Fails every call.
struct Failing;

#[async_trait]
impl StorageProvider for Failing {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn entry_path(&self, hash: &str, _tag: Option<&str>) -> String {
        hash.to_string()
    }

    async fn save(&self, _hash: &str, _tag: Option<&str>, _body: ByteStream) -> Result<()> {
        Err(turbocache_core::Error::backend("failing", "save", "backend down", Some(503)))
    }

    async fn get(&self, _hash: &str) -> Result<Option<Artifact>> {
        Err(turbocache_core::Error::backend("failing", "get", "backend down", Some(503)))
    }

    async fn delete(&self, _path: &str) -> Result<()> {
        Err(turbocache_core::Error::unsupported("failing", "delete"))
    }

    async fn list(&self) -> Result<Vec<ListingEntry>> {
        Err(turbocache_core::Error::unsupported("failing", "list"))
    }
}
