//! Dataset shapes as they come off the wire.
//!
//! Both roots are read-only snapshots; aggregators borrow them and allocate fresh output.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::ops::Deref;
use std::str::FromStr;

use crate::formatting::format_alliance_name;

/// A vector that may be `nil` on the wire; `nil` reads as empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Sparse<T>(pub Vec<T>);

impl<T> Default for Sparse<T> {
    fn default() -> Self {
        Sparse(Vec::new())
    }
}

impl<T> Deref for Sparse<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.0
    }
}

impl<T> From<Vec<T>> for Sparse<T> {
    fn from(v: Vec<T>) -> Self {
        Sparse(v)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Sparse<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Sparse(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default()))
    }
}

/// Values per city bucket index (aligned with `GraphCoalitionData::cities`).
pub type CityValues = Sparse<Option<f64>>;
/// `[timeOffset][cityIndex]` for one alliance.
pub type TimeSeries = Sparse<CityValues>;
/// `[allianceIndex][timeOffset][cityIndex]` for one metric slot.
pub type MetricBlock = Sparse<TimeSeries>;

// =============================================================================
// Conflict (tabular views)
// =============================================================================

fn ongoing() -> i64 {
    -1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub name: String,
    #[serde(default)]
    pub wiki: Option<String>,
    #[serde(default)]
    pub start: i64,
    /// `-1` while the conflict is ongoing
    #[serde(default = "ongoing")]
    pub end: i64,
    #[serde(default)]
    pub cb: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// post name -> (post id, url fragment, timestamp)
    #[serde(default)]
    pub posts: BTreeMap<String, (i64, String, i64)>,
    pub coalitions: Vec<ConflictCoalition>,
    #[serde(default)]
    pub counts_header: Vec<String>,
    pub damage_header: Vec<String>,
    pub header_type: Vec<u8>,
    #[serde(default)]
    pub war_web: WarWeb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCoalition {
    pub name: String,
    pub alliance_ids: Vec<i64>,
    pub alliance_names: Vec<Option<String>>,
    #[serde(default)]
    pub nation_ids: Vec<i64>,
    #[serde(default)]
    pub nation_names: Vec<Option<String>>,
    #[serde(default)]
    pub nation_aa: Vec<i64>,
    /// Flat per-entity stat vectors: `[coalition self, coalition enemy,
    /// alliance0 self, alliance0 enemy, ..., nation0 self, nation0 enemy, ...]`.
    #[serde(default)]
    pub counts: Vec<Vec<f64>>,
    #[serde(default)]
    pub damage: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WarWeb {
    pub headers: Vec<String>,
    /// `[header][allianceGlobalIndex][allianceGlobalIndex]`, directed row -> column
    pub data: Vec<Sparse<Sparse<Option<f64>>>>,
}

impl ConflictCoalition {
    pub fn alliance_name(&self, index: usize) -> String {
        let id = self.alliance_ids.get(index).copied().unwrap_or_default();
        format_alliance_name(self.alliance_names.get(index).and_then(|n| n.as_deref()), id)
    }

    /// Offset of an alliance's `self` vector inside `damage`/`counts`.
    pub fn alliance_offset(&self, alliance_index: usize) -> usize {
        2 + alliance_index * 2
    }

    /// Offset of a nation's `self` vector inside `damage`/`counts`.
    pub fn nation_offset(&self, nation_index: usize) -> usize {
        2 + self.alliance_ids.len() * 2 + nation_index * 2
    }
}

impl Conflict {
    /// Coalition 1 alliance ids followed by coalition 2 ids (war-web matrix order).
    pub fn alliance_id_space(&self) -> Vec<i64> {
        self.coalitions
            .iter()
            .flat_map(|c| c.alliance_ids.iter().copied())
            .collect()
    }
}

// =============================================================================
// GraphData (time-series views)
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphData {
    pub name: String,
    #[serde(default)]
    pub start: i64,
    #[serde(default)]
    pub end: i64,
    #[serde(default)]
    pub turn_start: i64,
    #[serde(default)]
    pub turn_end: i64,
    pub metric_names: Vec<String>,
    /// slot -> metric id for day-granularity series
    pub metrics_day: Vec<usize>,
    /// slot -> metric id for turn-granularity series
    pub metrics_turn: Vec<usize>,
    pub coalitions: Vec<GraphCoalitionData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphCoalitionData {
    pub name: String,
    pub alliance_ids: Vec<i64>,
    pub alliance_names: Vec<Option<String>>,
    /// Ascending city-count buckets present in the data
    pub cities: Vec<i64>,
    pub turn: TimeWindow,
    pub day: TimeWindow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Inclusive `[startTick, endTick]`
    pub range: (i64, i64),
    /// `[metricSlot][allianceIndex][timeOffset][cityIndex]`
    #[serde(default)]
    pub data: Vec<MetricBlock>,
}

impl TimeWindow {
    /// Alliance series for a slot, `None` when absent or empty.
    pub fn series(&self, slot: usize, alliance: usize) -> Option<&TimeSeries> {
        self.data
            .get(slot)
            .and_then(|block| block.get(alliance))
            .filter(|series| !series.is_empty())
    }

    /// City values recorded at `offset`, `None` when absent or empty.
    pub fn sample(&self, slot: usize, alliance: usize, offset: i64) -> Option<&CityValues> {
        let series = self.series(slot, alliance)?;
        let offset = usize::try_from(offset).ok()?;
        series.get(offset).filter(|values| !values.is_empty())
    }
}

impl GraphCoalitionData {
    pub fn window(&self, is_turn: bool) -> &TimeWindow {
        if is_turn {
            &self.turn
        } else {
            &self.day
        }
    }

    pub fn alliance_name(&self, index: usize) -> String {
        let id = self.alliance_ids.get(index).copied().unwrap_or_default();
        format_alliance_name(self.alliance_names.get(index).and_then(|n| n.as_deref()), id)
    }
}

// =============================================================================
// Metric requests
// =============================================================================

/// One requested series: cumulative running sum and/or per-city normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierMetric {
    pub name: String,
    pub cumulative: bool,
    pub normalize: bool,
}

impl TierMetric {
    pub fn new(name: &str, cumulative: bool, normalize: bool) -> Self {
        Self {
            name: name.to_string(),
            cumulative,
            normalize,
        }
    }
}

/// `name[:c][:n]`, e.g. `soldier:n` or `wars:c`.
impl FromStr for TierMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let name = parts.next().map(str::trim).unwrap_or_default();
        if name.is_empty() {
            return Err(format!("empty metric name in {:?}", s));
        }
        let mut metric = TierMetric::new(name, false, false);
        for flag in parts {
            match flag.trim() {
                "c" | "cumulative" => metric.cumulative = true,
                "n" | "normalize" => metric.normalize = true,
                other => return Err(format!("unknown metric flag {:?} in {:?}", other, s)),
            }
        }
        Ok(metric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sparse_reads_null_as_empty() {
        let window: TimeWindow = serde_json::from_value(json!({
            "range": [3, 5],
            "data": [[null, [[1.0, null], [], null]]]
        }))
        .unwrap();
        assert_eq!(window.range, (3, 5));
        assert!(window.series(0, 0).is_none());
        assert_eq!(window.sample(0, 1, 0).unwrap().0, vec![Some(1.0), None]);
        assert!(window.sample(0, 1, 1).is_none());
        assert!(window.sample(0, 1, 2).is_none());
        assert!(window.sample(0, 1, -1).is_none());
        assert!(window.sample(4, 0, 0).is_none());
    }

    #[test]
    fn flat_offsets_follow_entity_layout() {
        let c = ConflictCoalition {
            name: "A".into(),
            alliance_ids: vec![1, 2, 3],
            alliance_names: vec![Some("One".into()), None, Some(" ".into())],
            nation_ids: vec![],
            nation_names: vec![],
            nation_aa: vec![],
            counts: vec![],
            damage: vec![],
        };
        assert_eq!(c.alliance_offset(0), 2);
        assert_eq!(c.alliance_offset(2), 6);
        assert_eq!(c.nation_offset(0), 8);
        assert_eq!(c.nation_offset(4), 16);
        assert_eq!(c.alliance_name(1), "AA:2");
        assert_eq!(c.alliance_name(2), "AA:3");
    }

    #[test]
    fn tier_metric_parses_flags() {
        let m: TierMetric = "soldier:c:n".parse().unwrap();
        assert_eq!(m, TierMetric::new("soldier", true, true));
        let m: TierMetric = "wars".parse().unwrap();
        assert!(!m.cumulative && !m.normalize);
        assert!("wars:x".parse::<TierMetric>().is_err());
        assert!(":c".parse::<TierMetric>().is_err());
    }
}
