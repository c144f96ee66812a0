//! Background aggregation with latest-request-wins delivery.
//!
//! Aggregations are pure and run on the blocking pool. Each submission gets a
//! fresh id; a result whose id is no longer the latest is dropped instead of delivered.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::bubble::{self, BubbleResult};
use crate::logging::{debug, obj, v_num, Domain};
use crate::model::{GraphData, TierMetric};
use crate::tiering::{self, TieringResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobResponse<T> {
    pub id: u64,
    /// `Err` carries the failure text when the job panicked.
    pub result: Result<T, String>,
}

#[derive(Debug, Clone, Default)]
pub struct AggregationChannel {
    latest: Arc<AtomicU64>,
}

impl AggregationChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }

    /// Runs `job` off the async threads; `None` when a newer job was submitted meanwhile.
    pub async fn run<T, F>(&self, job: F) -> Option<JobResponse<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let id = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let result = tokio::task::spawn_blocking(job).await.map_err(|e| e.to_string());
        let latest = self.latest();
        if latest != id {
            debug(
                Domain::System,
                "stale_job_dropped",
                obj(&[("request_id", v_num(id as f64)), ("latest", v_num(latest as f64))]),
            );
            return None;
        }
        Some(JobResponse { id, result })
    }

    pub async fn tiering(
        &self,
        data: Arc<GraphData>,
        metrics: Vec<TierMetric>,
        selections: Vec<Vec<i64>>,
        single_color: bool,
    ) -> Option<JobResponse<Option<TieringResult>>> {
        self.run(move || tiering::build(&data, &metrics, &selections, single_color))
            .await
    }

    pub async fn bubble(
        &self,
        data: Arc<GraphData>,
        metrics: [TierMetric; 3],
        min_city: i64,
        max_city: i64,
    ) -> Option<JobResponse<Option<BubbleResult>>> {
        self.run(move || bubble::build(&data, &metrics, min_city, max_city))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn delivers_latest_result() {
        let channel = AggregationChannel::new();
        let out = channel.run(|| 2 + 2).await.unwrap();
        assert_eq!(out, JobResponse { id: 1, result: Ok(4) });
    }

    #[tokio::test]
    async fn drops_superseded_result() {
        let channel = AggregationChannel::new();
        let slow = channel.run(|| {
            std::thread::sleep(Duration::from_millis(200));
            "slow"
        });
        let fast = channel.run(|| "fast");
        let (slow, fast) = tokio::join!(slow, fast);
        assert!(slow.is_none());
        assert_eq!(fast.unwrap().result, Ok("fast"));
    }

    #[tokio::test]
    async fn panicking_job_reports_error() {
        let channel = AggregationChannel::new();
        let out = channel.run(|| -> u8 { panic!("boom") }).await.unwrap();
        assert!(out.result.is_err());
    }
}
