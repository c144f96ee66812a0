//! Dataset fetch pipeline: body stream -> gzip -> MessagePack -> `serde_json::Value`.

pub mod cache;
pub mod decode;
pub mod unpack;
pub mod worker;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::logging::{debug, obj, v_num, v_str, Domain, ProfileScope};
use decode::GzipSink;

pub use cache::BinaryFetchCache;
pub use unpack::unpack;
pub use worker::{DecodeExecutor, WorkerLink};

/// Everything that can go wrong between a URL and a decoded value.
/// `Clone` so a single failure can be handed to every caller sharing the decode.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DecodeError {
    #[error("fetch {url} failed: {reason}")]
    Fetch { url: String, reason: String },
    #[error("fetch {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("fetch {0} returned no body")]
    EmptyBody(String),
    #[error("gzip decompression failed: {0}")]
    Decompress(String),
    #[error("unpack failed at byte {offset}: {reason}")]
    Unpack { offset: usize, reason: String },
}

pub type BodyStream = BoxStream<'static, Result<Vec<u8>, DecodeError>>;

/// Where compressed dataset bytes come from.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    async fn open(&self, url: &str) -> Result<BodyStream, DecodeError>;
}

pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new(timeout_secs: u64) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DatasetSource for HttpSource {
    async fn open(&self, url: &str) -> Result<BodyStream, DecodeError> {
        let resp = self.client.get(url).send().await.map_err(|e| DecodeError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DecodeError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let url = url.to_string();
        Ok(resp
            .bytes_stream()
            .map(move |chunk| {
                chunk.map(|b| b.to_vec()).map_err(|e| DecodeError::Fetch {
                    url: url.clone(),
                    reason: e.to_string(),
                })
            })
            .boxed())
    }
}

const LOCAL_CHUNK: usize = 64 * 1024;

/// Reads dataset files from disk; accepts plain paths and `file://` URLs.
#[derive(Debug, Default, Clone)]
pub struct LocalSource;

impl LocalSource {
    pub fn path_of(url: &str) -> PathBuf {
        Url::parse(url)
            .ok()
            .filter(|u| u.scheme() == "file")
            .and_then(|u| u.to_file_path().ok())
            .unwrap_or_else(|| PathBuf::from(url))
    }
}

#[async_trait]
impl DatasetSource for LocalSource {
    async fn open(&self, url: &str) -> Result<BodyStream, DecodeError> {
        let bytes = tokio::fs::read(Self::path_of(url))
            .await
            .map_err(|e| DecodeError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        let chunks: Vec<Result<Vec<u8>, DecodeError>> =
            bytes.chunks(LOCAL_CHUNK).map(|c| Ok(c.to_vec())).collect();
        Ok(stream::iter(chunks).boxed())
    }
}

/// Local files when the path exists, HTTP otherwise.
pub struct RoutingSource {
    http: HttpSource,
    local: LocalSource,
}

impl RoutingSource {
    pub fn new(http: HttpSource) -> Self {
        Self {
            http,
            local: LocalSource,
        }
    }
}

#[async_trait]
impl DatasetSource for RoutingSource {
    async fn open(&self, url: &str) -> Result<BodyStream, DecodeError> {
        if LocalSource::path_of(url).exists() {
            self.local.open(url).await
        } else {
            self.http.open(url).await
        }
    }
}

/// Full fetch + inflate + unpack of one URL on the current task.
pub async fn decode_url(source: &dyn DatasetSource, url: &str) -> Result<Value, DecodeError> {
    let _profile = ProfileScope::with_context("fetch.decode_url", &[("url", v_str(url))]);
    let mut body = source.open(url).await?;
    let mut sink = GzipSink::new();
    while let Some(chunk) = body.next().await {
        sink.push(&chunk?)?;
    }
    if sink.compressed_len() == 0 {
        return Err(DecodeError::EmptyBody(url.to_string()));
    }
    let inflated = sink.finish()?;
    debug(
        Domain::Decode,
        "inflated",
        obj(&[
            ("url", v_str(url)),
            ("compressed_bytes", v_num(inflated.compressed_len as f64)),
            ("bytes", v_num(inflated.bytes.len() as f64)),
            ("sha256", v_str(&inflated.sha256)),
        ]),
    );
    unpack(&inflated.bytes)
}
