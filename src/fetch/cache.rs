use anyhow::{Context, Result};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use super::worker::DecodeExecutor;
use super::{DecodeError, HttpSource, RoutingSource};
use crate::config::Config;
use crate::logging::{debug, obj, v_num, v_str, warn, Domain};
use crate::model::{Conflict, GraphData};

type SharedDecode = Shared<BoxFuture<'static, Result<Arc<Value>, DecodeError>>>;

struct CacheEntry {
    /// Distinguishes this decode from a later one stored under the same URL.
    generation: u64,
    decode: SharedDecode,
}

type Entries = Arc<Mutex<HashMap<String, CacheEntry>>>;

/// Per-URL memo of in-flight and finished decodes.
///
/// Concurrent callers for one URL share a single decode. Failed decodes evict
/// themselves, so the next call starts over.
pub struct BinaryFetchCache {
    executor: Arc<DecodeExecutor>,
    entries: Entries,
    generation: AtomicU64,
}

static GLOBAL: OnceLock<BinaryFetchCache> = OnceLock::new();

impl BinaryFetchCache {
    pub fn new(executor: DecodeExecutor) -> Self {
        Self {
            executor: Arc::new(executor),
            entries: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let source = Arc::new(RoutingSource::new(HttpSource::new(cfg.http_timeout_secs)?));
        let executor = if cfg.use_worker {
            DecodeExecutor::with_worker(source)
        } else {
            DecodeExecutor::inline(source)
        };
        Ok(Self::new(executor))
    }

    /// Process-wide instance configured from the environment.
    pub fn global() -> Result<&'static BinaryFetchCache> {
        if let Some(cache) = GLOBAL.get() {
            return Ok(cache);
        }
        let cache = Self::from_config(&Config::from_env())?;
        Ok(GLOBAL.get_or_init(|| cache))
    }

    pub fn executor(&self) -> &DecodeExecutor {
        &self.executor
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(url)
    }

    pub fn evict(&self, url: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(url)
            .is_some()
    }

    pub async fn fetch(&self, url: &str, force_refresh: bool) -> Result<Arc<Value>, DecodeError> {
        let decode = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            if force_refresh && entries.remove(url).is_some() {
                debug(Domain::Fetch, "cache_evict", obj(&[("url", v_str(url)), ("msg", v_str("forced refresh"))]));
            }
            match entries.get(url) {
                Some(entry) => {
                    debug(Domain::Fetch, "cache_hit", obj(&[("url", v_str(url))]));
                    entry.decode.clone()
                }
                None => {
                    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                    let decode = self.start(url, generation);
                    entries.insert(
                        url.to_string(),
                        CacheEntry {
                            generation,
                            decode: decode.clone(),
                        },
                    );
                    decode
                }
            }
        };
        decode.await
    }

    fn start(&self, url: &str, generation: u64) -> SharedDecode {
        let executor = Arc::clone(&self.executor);
        let entries = Arc::clone(&self.entries);
        let url = url.to_string();
        async move {
            let result = executor.decode(&url).await.map(Arc::new);
            if let Err(err) = &result {
                let mut entries = entries.lock().unwrap_or_else(PoisonError::into_inner);
                if entries.get(&url).map(|e| e.generation) == Some(generation) {
                    entries.remove(&url);
                }
                warn(
                    Domain::Fetch,
                    "decode_failed",
                    obj(&[
                        ("url", v_str(&url)),
                        ("generation", v_num(generation as f64)),
                        ("msg", v_str(&err.to_string())),
                    ]),
                );
            }
            result
        }
        .boxed()
        .shared()
    }

    pub async fn load_conflict(&self, url: &str, force_refresh: bool) -> Result<Conflict> {
        let value = self.fetch(url, force_refresh).await?;
        Conflict::deserialize(&*value).with_context(|| format!("unexpected conflict payload at {}", url))
    }

    pub async fn load_graph(&self, url: &str, force_refresh: bool) -> Result<GraphData> {
        let value = self.fetch(url, force_refresh).await?;
        GraphData::deserialize(&*value).with_context(|| format!("unexpected graph payload at {}", url))
    }
}
