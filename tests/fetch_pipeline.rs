//! Fetch pipeline: files and fake sources through gzip, unpack, the decode executor and the cache.

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures_util::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

use conflictstats::fetch::worker::{DecodeRequest, Spawner, WorkerStatus};
use conflictstats::fetch::{
    decode_url, BinaryFetchCache, BodyStream, DatasetSource, DecodeError, DecodeExecutor, LocalSource, WorkerLink,
};

fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(bytes).unwrap();
    enc.finish().unwrap()
}

fn packed(value: &Value) -> Vec<u8> {
    gzip(&rmp_serde::to_vec_named(value).unwrap())
}

fn write_dataset(dir: &Path, name: &str, value: &Value) -> String {
    let path = dir.join(name);
    fs::write(&path, packed(value)).unwrap();
    path.to_string_lossy().into_owned()
}

fn graph_payload() -> Value {
    json!({
        "name": "Test War",
        "start": 1_700_000_000_000u64,
        "end": 1_700_172_800_000u64,
        "turn_start": 0,
        "turn_end": 23,
        "metric_names": ["nation", "wars"],
        "metrics_day": [0, 1],
        "metrics_turn": [],
        "coalitions": [{
            "name": "Red",
            "alliance_ids": [10],
            "alliance_names": ["Ten"],
            "cities": [5, 10],
            "turn": { "range": [0, -1], "data": [] },
            "day": {
                "range": [0, 2],
                "data": [
                    [[[1.0, 1.0], [1.0, 1.0], [1.0, 1.0]]],
                    [[[1.0, 2.0], [0.0, 1.0], [3.0, 0.0]]]
                ]
            }
        }]
    })
}

/// Serves one fixed body and counts how often it was opened.
struct CountingSource {
    body: Vec<u8>,
    opens: AtomicUsize,
    /// Opens that fail before the body is served
    failures: AtomicUsize,
    delay: Duration,
}

impl CountingSource {
    fn new(value: &Value) -> Self {
        Self {
            body: packed(value),
            opens: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            delay: Duration::from_millis(0),
        }
    }

    fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatasetSource for CountingSource {
    async fn open(&self, url: &str) -> Result<BodyStream, DecodeError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DecodeError::Status {
                url: url.to_string(),
                status: 503,
            });
        }
        let chunks: Vec<Result<Vec<u8>, DecodeError>> = self.body.chunks(5).map(|c| Ok(c.to_vec())).collect();
        Ok(stream::iter(chunks).boxed())
    }
}

/// A worker that answers every request with an error.
fn failing_worker() -> Spawner {
    Box::new(|_source: Arc<dyn DatasetSource>| {
        let (req_tx, mut req_rx) = mpsc::unbounded_channel::<DecodeRequest>();
        tokio::spawn(async move {
            while let Some(req) = req_rx.recv().await {
                let _ = req.reply.send(Err("worker exploded".to_string()));
            }
        });
        Ok(WorkerLink::new(req_tx))
    })
}

/// Panics on the first open, then serves a file.
struct PanicOnceSource {
    path: String,
    opens: AtomicUsize,
}

#[async_trait]
impl DatasetSource for PanicOnceSource {
    async fn open(&self, _url: &str) -> Result<BodyStream, DecodeError> {
        if self.opens.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("source blew up mid-decode");
        }
        LocalSource.open(&self.path).await
    }
}

// ---------------------------------------------------------------------------
// decode_url
// ---------------------------------------------------------------------------

#[tokio::test]
async fn local_file_decodes_to_value() {
    let dir = TempDir::new().unwrap();
    let path = write_dataset(dir.path(), "graph.gzip", &graph_payload());
    let value = decode_url(&LocalSource, &path).await.unwrap();
    assert_eq!(value["name"], "Test War");
    assert_eq!(value["coalitions"][0]["cities"], json!([5, 10]));
    assert_eq!(value["coalitions"][0]["day"]["data"][1][0][2], json!([3.0, 0.0]));
}

#[tokio::test]
async fn file_url_is_accepted() {
    let dir = TempDir::new().unwrap();
    let path = write_dataset(dir.path(), "graph.gzip", &graph_payload());
    let url = url::Url::from_file_path(&path).unwrap().to_string();
    let value = decode_url(&LocalSource, &url).await.unwrap();
    assert_eq!(value["metric_names"], json!(["nation", "wars"]));
}

#[tokio::test]
async fn empty_body_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.gzip");
    fs::write(&path, b"").unwrap();
    let err = decode_url(&LocalSource, path.to_str().unwrap()).await.unwrap_err();
    assert!(matches!(err, DecodeError::EmptyBody(_)), "got {:?}", err);
}

#[tokio::test]
async fn non_gzip_body_is_a_decompress_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("garbage.gzip");
    fs::write(&path, b"this file was never gzip compressed, not even a little").unwrap();
    let err = decode_url(&LocalSource, path.to_str().unwrap()).await.unwrap_err();
    assert!(matches!(err, DecodeError::Decompress(_)), "got {:?}", err);
}

// ---------------------------------------------------------------------------
// DecodeExecutor
// ---------------------------------------------------------------------------

#[tokio::test]
async fn worker_thread_decodes_local_file() {
    let dir = TempDir::new().unwrap();
    let path = write_dataset(dir.path(), "graph.gzip", &graph_payload());
    let executor = DecodeExecutor::with_worker(Arc::new(LocalSource));
    assert_eq!(executor.status(), WorkerStatus::Uninitialized);
    let value = executor.decode(&path).await.unwrap();
    assert_eq!(value["name"], "Test War");
    assert_eq!(executor.status(), WorkerStatus::Available);
}

#[tokio::test]
async fn worker_failure_falls_back_inline() {
    let source = Arc::new(CountingSource::new(&json!({ "ok": true })));
    let executor = DecodeExecutor::with_spawner(source.clone(), failing_worker());
    let value = executor.decode("mem://a").await.unwrap();
    assert_eq!(value, json!({ "ok": true }));
    // the fake worker never opens the source; only the inline rerun does
    assert_eq!(source.opens(), 1);
    assert_eq!(executor.status(), WorkerStatus::Available);
}

#[tokio::test]
async fn spawn_failure_is_remembered() {
    let source = Arc::new(CountingSource::new(&json!([1, 2, 3])));
    let spawns = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&spawns);
    let spawner: Spawner = Box::new(move |_source: Arc<dyn DatasetSource>| {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(io::Error::new(io::ErrorKind::Other, "no threads today"))
    });
    let executor = DecodeExecutor::with_spawner(source.clone(), spawner);
    assert_eq!(executor.decode("mem://a").await.unwrap(), json!([1, 2, 3]));
    assert_eq!(executor.decode("mem://b").await.unwrap(), json!([1, 2, 3]));
    assert_eq!(spawns.load(Ordering::SeqCst), 1);
    assert_eq!(executor.status(), WorkerStatus::Unavailable);
}

#[tokio::test]
async fn vanished_worker_is_retired() {
    let source = Arc::new(CountingSource::new(&json!("payload")));
    let spawner: Spawner = Box::new(|_source: Arc<dyn DatasetSource>| {
        let (req_tx, req_rx) = mpsc::unbounded_channel::<DecodeRequest>();
        drop(req_rx);
        Ok(WorkerLink::new(req_tx))
    });
    let executor = DecodeExecutor::with_spawner(source, spawner);
    assert_eq!(executor.decode("mem://a").await.unwrap(), json!("payload"));
    assert_eq!(executor.status(), WorkerStatus::Unavailable);
}

#[tokio::test]
async fn panicking_worker_decode_falls_back_inline() {
    let dir = TempDir::new().unwrap();
    let path = write_dataset(dir.path(), "graph.gzip", &graph_payload());
    let source = Arc::new(PanicOnceSource {
        path,
        opens: AtomicUsize::new(0),
    });
    let executor = DecodeExecutor::with_worker(source.clone());
    let value = tokio::time::timeout(Duration::from_secs(5), executor.decode("mem://graph"))
        .await
        .expect("decode hung after a worker panic")
        .unwrap();
    assert_eq!(value["name"], "Test War");
    assert_eq!(source.opens.load(Ordering::SeqCst), 2);
    // the worker thread survives a panicking task
    assert_eq!(executor.status(), WorkerStatus::Available);
}

#[test]
fn worker_outlives_the_runtime_that_started_it() {
    let dir = TempDir::new().unwrap();
    let path = write_dataset(dir.path(), "graph.gzip", &graph_payload());
    let executor = Arc::new(DecodeExecutor::with_worker(Arc::new(LocalSource)));
    let runtime = || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    };

    let first = runtime();
    let value = first.block_on(executor.decode(&path)).unwrap();
    assert_eq!(value["name"], "Test War");
    drop(first);

    let second = runtime();
    let value = second
        .block_on(async { tokio::time::timeout(Duration::from_secs(5), executor.decode(&path)).await })
        .expect("decode hung on a fresh runtime")
        .unwrap();
    assert_eq!(value["name"], "Test War");
    assert_eq!(executor.status(), WorkerStatus::Available);
}

#[test]
fn cache_refresh_survives_runtime_restart() {
    let dir = TempDir::new().unwrap();
    let path = write_dataset(dir.path(), "graph.gzip", &graph_payload());
    let cache = BinaryFetchCache::new(DecodeExecutor::with_worker(Arc::new(LocalSource)));
    let runtime = || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    };

    let first = runtime();
    first.block_on(cache.fetch(&path, false)).unwrap();
    drop(first);

    let second = runtime();
    let refreshed = second
        .block_on(async { tokio::time::timeout(Duration::from_secs(5), cache.fetch(&path, true)).await })
        .expect("refresh hung on a fresh runtime")
        .unwrap();
    assert_eq!(refreshed["name"], "Test War");
}

// ---------------------------------------------------------------------------
// BinaryFetchCache
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_fetches_share_one_decode() {
    let mut source = CountingSource::new(&graph_payload());
    source.delay = Duration::from_millis(50);
    let source = Arc::new(source);
    let cache = BinaryFetchCache::new(DecodeExecutor::inline(source.clone()));

    let (a, b) = tokio::join!(cache.fetch("mem://graph", false), cache.fetch("mem://graph", false));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(source.opens(), 1);

    let c = cache.fetch("mem://graph", false).await.unwrap();
    assert!(Arc::ptr_eq(&a, &c));
    assert_eq!(source.opens(), 1);
}

#[tokio::test]
async fn failed_decode_is_evicted() {
    let source = CountingSource::new(&json!({ "n": 1 }));
    source.failures.store(1, Ordering::SeqCst);
    let source = Arc::new(source);
    let cache = BinaryFetchCache::new(DecodeExecutor::inline(source.clone()));

    let err = cache.fetch("mem://x", false).await.unwrap_err();
    assert!(matches!(err, DecodeError::Status { status: 503, .. }));
    assert!(!cache.contains("mem://x"));

    let value = cache.fetch("mem://x", false).await.unwrap();
    assert_eq!(*value, json!({ "n": 1 }));
    assert!(cache.contains("mem://x"));
    assert_eq!(source.opens(), 2);
}

#[tokio::test]
async fn force_refresh_decodes_again() {
    let source = Arc::new(CountingSource::new(&json!({ "n": 2 })));
    let cache = BinaryFetchCache::new(DecodeExecutor::inline(source.clone()));
    let first = cache.fetch("mem://x", false).await.unwrap();
    let second = cache.fetch("mem://x", true).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(first, second);
    assert_eq!(source.opens(), 2);

    assert!(cache.evict("mem://x"));
    assert!(!cache.evict("mem://x"));
}

#[tokio::test]
async fn typed_loaders_report_shape_errors() {
    let dir = TempDir::new().unwrap();
    let graph = write_dataset(dir.path(), "graph.gzip", &graph_payload());
    let cache = BinaryFetchCache::new(DecodeExecutor::inline(Arc::new(LocalSource)));

    let data = cache.load_graph(&graph, false).await.unwrap();
    assert_eq!(data.name, "Test War");
    assert_eq!(data.coalitions[0].day.range, (0, 2));

    let err = cache.load_conflict(&graph, false).await.unwrap_err();
    assert!(err.to_string().contains("unexpected conflict payload"), "got {}", err);
}
