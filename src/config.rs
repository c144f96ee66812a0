use anyhow::{Context, Result};
use url::Url;

use crate::formatting::format_duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub data_base: String,
    pub data_version: String,
    pub http_timeout_secs: u64,
    /// Decode on a dedicated worker thread; `DECODE_WORKER=off` keeps everything inline.
    pub use_worker: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            data_base: std::env::var("CONFLICT_DATA_BASE").unwrap_or_else(|_| {
                "https://locutus.s3.ap-southeast-2.amazonaws.com/conflicts".to_string()
            }),
            data_version: std::env::var("CONFLICT_DATA_VERSION").unwrap_or_else(|_| "0".to_string()),
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(30),
            use_worker: !matches!(std::env::var("DECODE_WORKER").as_deref(), Ok("off") | Ok("0")),
        }
    }

    /// `<base>/<id>.gzip?<version>`
    pub fn conflict_url(&self, conflict_id: &str) -> Result<String> {
        self.dataset_url(&format!("{}.gzip", conflict_id))
    }

    /// `<base>/graphs/<id>.gzip?<version>`
    pub fn graph_url(&self, conflict_id: &str) -> Result<String> {
        self.dataset_url(&format!("graphs/{}.gzip", conflict_id))
    }

    fn dataset_url(&self, path: &str) -> Result<String> {
        let base = format!("{}/", self.data_base.trim_end_matches('/'));
        let mut url = Url::parse(&base)
            .with_context(|| format!("invalid CONFLICT_DATA_BASE {}", self.data_base))?
            .join(path)
            .with_context(|| format!("invalid dataset path {}", path))?;
        url.set_query(Some(&self.data_version));
        Ok(url.to_string())
    }
}

/// `Version: <v>` plus a "last updated" suffix when the update time is known.
pub fn provenance(version: &str, update_ms: Option<i64>, now_ms: i64) -> String {
    let mut text = format!("Version: {}", version);
    if let Some(update_ms) = update_ms {
        let secs_ago = ((now_ms - update_ms) as f64 / 1000.0).round().max(0.0) as u64;
        text.push_str(&format!(" • Last updated {} ago", format_duration(secs_ago)));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(base: &str) -> Config {
        Config {
            data_base: base.to_string(),
            data_version: "42".to_string(),
            http_timeout_secs: 5,
            use_worker: true,
        }
    }

    #[test]
    fn urls_carry_version_query() {
        let c = cfg("https://data.example.test/conflicts/");
        assert_eq!(
            c.conflict_url("17").unwrap(),
            "https://data.example.test/conflicts/17.gzip?42"
        );
        assert_eq!(
            c.graph_url("17").unwrap(),
            "https://data.example.test/conflicts/graphs/17.gzip?42"
        );
    }

    #[test]
    fn bad_base_is_an_error() {
        assert!(cfg("not a url").conflict_url("1").is_err());
    }

    #[test]
    fn provenance_mentions_age() {
        assert_eq!(provenance("7", None, 0), "Version: 7");
        assert_eq!(
            provenance("7", Some(0), 61_000),
            "Version: 7 • Last updated 1 minute and 1 second ago"
        );
    }
}
