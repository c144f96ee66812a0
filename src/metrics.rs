//! Maps named metric requests onto dataset ids, granularity slots and normalization divisors.

use crate::logging::{obj, v_num, v_str, warn, Domain};
use crate::model::{GraphData, TierMetric};

/// Metric name -> units a single city supports. `infra` (1) divides by city count.
pub const UNITS_PER_CITY: [(&str, u32); 5] = [
    ("soldier", 15_000),
    ("tank", 1_250),
    ("aircraft", 75),
    ("ship", 15),
    ("infra", 1),
];

/// Day-granularity slot holding nation counts per alliance and city bucket.
pub const NATION_COUNT_SLOT: usize = 0;

/// Divisor selector. The wire/legacy code is `-1` (off), `0` (nation count) or `k > 0`
/// (nation count x city size x k).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    Off,
    NationCount,
    Cities,
    Units(u32),
}

impl Normalization {
    pub fn from_code(code: i64) -> Self {
        match code {
            c if c < 0 => Normalization::Off,
            0 => Normalization::NationCount,
            1 => Normalization::Cities,
            k => Normalization::Units(u32::try_from(k).unwrap_or(u32::MAX)),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Normalization::Off => -1,
            Normalization::NationCount => 0,
            Normalization::Cities => 1,
            Normalization::Units(k) => k as i64,
        }
    }

    pub fn is_active(self) -> bool {
        self != Normalization::Off
    }

    /// Denominator contribution of `nations` nations sitting in a `city` bucket.
    pub fn weight(self, nations: f64, city: i64) -> f64 {
        match self {
            Normalization::Off | Normalization::NationCount => nations,
            Normalization::Cities => nations * city as f64,
            Normalization::Units(k) => nations * city as f64 * k as f64,
        }
    }

    fn for_metric(name: &str) -> Self {
        let per_city = UNITS_PER_CITY
            .iter()
            .find(|(metric, _)| *metric == name)
            .map(|(_, units)| *units as i64)
            .unwrap_or(0);
        Normalization::from_code(per_city)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricAccessor {
    /// Position in `metric_names`
    pub id: usize,
    /// Position of `id` within `metrics_turn` or `metrics_day`
    pub slot: usize,
    pub is_turn: bool,
    pub normalize: Normalization,
    pub cumulative: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricAccessors {
    pub metrics: Vec<MetricAccessor>,
    /// Any turn metric forces the whole walk onto the turn timeline.
    pub is_any_turn: bool,
}

impl MetricAccessors {
    pub fn any_normalized(&self) -> bool {
        self.metrics.iter().any(|m| m.normalize.is_active())
    }
}

/// Resolves every requested metric or none of them.
pub fn resolve(data: &GraphData, requested: &[TierMetric]) -> Option<MetricAccessors> {
    let mut metrics = Vec::with_capacity(requested.len());
    for metric in requested {
        let Some(id) = data.metric_names.iter().position(|n| *n == metric.name) else {
            warn(
                Domain::Metrics,
                "metric_missing",
                obj(&[("metric", v_str(&metric.name)), ("msg", v_str("metric not in dataset"))]),
            );
            return None;
        };
        let turn_slot = data.metrics_turn.iter().position(|m| *m == id);
        let (is_turn, slot) = match turn_slot {
            Some(slot) => (true, Some(slot)),
            None => (false, data.metrics_day.iter().position(|m| *m == id)),
        };
        let Some(slot) = slot else {
            warn(
                Domain::Metrics,
                "metric_unindexed",
                obj(&[
                    ("metric", v_str(&metric.name)),
                    ("metric_id", v_num(id as f64)),
                    ("msg", v_str("metric has no turn or day slot")),
                ]),
            );
            return None;
        };
        let normalize = if metric.normalize {
            Normalization::for_metric(&metric.name)
        } else {
            Normalization::Off
        };
        metrics.push(MetricAccessor {
            id,
            slot,
            is_turn,
            normalize,
            cumulative: metric.cumulative,
        });
    }
    let is_any_turn = metrics.iter().any(|m| m.is_turn);
    Some(MetricAccessors { metrics, is_any_turn })
}
