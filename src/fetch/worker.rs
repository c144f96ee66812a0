//! Off-thread decoding with an inline fallback.
//!
//! Worker lifecycle:
//! - `Uninitialized` until the first decode, which tries to spawn the worker once
//! - `Available` while the worker answers; any failure there reruns the URL inline
//! - `Unavailable` after a spawn failure or once the worker is gone; never retried

use serde_json::Value;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};

use super::{decode_url, DatasetSource, DecodeError};
use crate::logging::{debug, obj, v_num, v_str, warn, Domain};

/// One decode job. The worker answers on `reply`; dropping it unanswered fails the request.
#[derive(Debug)]
pub struct DecodeRequest {
    pub id: u64,
    pub url: String,
    pub reply: oneshot::Sender<Result<Value, String>>,
}

/// Caller side of a worker. Each request carries its own reply channel, so nothing
/// on the caller's runtime has to stay alive between requests.
pub struct WorkerLink {
    requests: mpsc::UnboundedSender<DecodeRequest>,
    next_id: AtomicU64,
}

impl WorkerLink {
    pub fn new(requests: mpsc::UnboundedSender<DecodeRequest>) -> Self {
        Self {
            requests,
            next_id: AtomicU64::new(0),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.requests.is_closed()
    }

    pub async fn request(&self, url: &str) -> Result<Value, String> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(DecodeRequest {
                id,
                url: url.to_string(),
                reply,
            })
            .map_err(|_| "decode worker is gone".to_string())?;
        rx.await
            .map_err(|_| "decode worker dropped the request".to_string())?
    }
}

/// Runs one request to completion. A panicking decode still answers, with an error.
async fn serve(source: Arc<dyn DatasetSource>, req: DecodeRequest) {
    let DecodeRequest { id, url, reply } = req;
    let job = tokio::spawn(async move { decode_url(source.as_ref(), &url).await });
    let outcome = match job.await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(e) => Err(format!("decode task failed: {}", e)),
    };
    if reply.send(outcome).is_err() {
        debug(Domain::Worker, "stale_response", obj(&[("request_id", v_num(id as f64))]));
    }
}

/// Starts the dedicated decode thread with its own single-threaded runtime.
pub fn spawn_thread(source: Arc<dyn DatasetSource>) -> io::Result<WorkerLink> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let (req_tx, mut req_rx) = mpsc::unbounded_channel::<DecodeRequest>();
    std::thread::Builder::new()
        .name("decompress-worker".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                while let Some(req) = req_rx.recv().await {
                    tokio::spawn(serve(Arc::clone(&source), req));
                }
            })
        })?;
    Ok(WorkerLink::new(req_tx))
}

pub type Spawner = Box<dyn Fn(Arc<dyn DatasetSource>) -> io::Result<WorkerLink> + Send + Sync>;

enum WorkerState {
    Uninitialized,
    Available(Arc<WorkerLink>),
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Uninitialized,
    Available,
    Unavailable,
}

/// Runs decodes on the worker when it can, inline otherwise. The two paths produce the
/// same result, so worker trouble never reaches the caller.
pub struct DecodeExecutor {
    source: Arc<dyn DatasetSource>,
    state: Mutex<WorkerState>,
    spawner: Spawner,
}

impl DecodeExecutor {
    pub fn with_worker(source: Arc<dyn DatasetSource>) -> Self {
        Self::with_spawner(source, Box::new(spawn_thread))
    }

    pub fn with_spawner(source: Arc<dyn DatasetSource>, spawner: Spawner) -> Self {
        Self {
            source,
            state: Mutex::new(WorkerState::Uninitialized),
            spawner,
        }
    }

    /// Never touches a worker.
    pub fn inline(source: Arc<dyn DatasetSource>) -> Self {
        Self {
            source,
            state: Mutex::new(WorkerState::Unavailable),
            spawner: Box::new(|_source: Arc<dyn DatasetSource>| Err(io::Error::new(io::ErrorKind::Unsupported, "inline executor"))),
        }
    }

    pub fn status(&self) -> WorkerStatus {
        match &*self.state.lock().unwrap_or_else(PoisonError::into_inner) {
            WorkerState::Uninitialized => WorkerStatus::Uninitialized,
            WorkerState::Available(_) => WorkerStatus::Available,
            WorkerState::Unavailable => WorkerStatus::Unavailable,
        }
    }

    fn link(&self) -> Option<Arc<WorkerLink>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match &*state {
            WorkerState::Available(link) => Some(Arc::clone(link)),
            WorkerState::Unavailable => None,
            WorkerState::Uninitialized => match (self.spawner)(Arc::clone(&self.source)) {
                Ok(link) => {
                    let link = Arc::new(link);
                    *state = WorkerState::Available(Arc::clone(&link));
                    Some(link)
                }
                Err(e) => {
                    warn(
                        Domain::Worker,
                        "worker_unavailable",
                        obj(&[("reason", v_str(&e.to_string())), ("msg", v_str("decoding inline"))]),
                    );
                    *state = WorkerState::Unavailable;
                    None
                }
            },
        }
    }

    fn retire(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = WorkerState::Unavailable;
    }

    pub async fn decode(&self, url: &str) -> Result<Value, DecodeError> {
        if let Some(link) = self.link() {
            match link.request(url).await {
                Ok(value) => return Ok(value),
                Err(reason) => {
                    debug(
                        Domain::Worker,
                        "worker_fallback",
                        obj(&[("url", v_str(url)), ("reason", v_str(&reason))]),
                    );
                    if link.is_closed() {
                        self.retire();
                    }
                }
            }
        }
        decode_url(self.source.as_ref(), url).await
    }
}
