//! Stacked per-city-bucket series over a shared timeline.
//!
//! One series per selected alliance when a single raw metric is requested, otherwise one
//! series per (coalition, metric) summed over the coalition's selected alliances.

use serde::Serialize;
use std::collections::HashSet;

use crate::colors;
use crate::logging::{v_num, ProfileScope};
use crate::metrics::{self, MetricAccessors, Normalization, NATION_COUNT_SLOT};
use crate::model::{GraphCoalitionData, GraphData, TierMetric};
use crate::series::{CityBuffer, DayGate, ForwardFill};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSet {
    /// Coalition index the series belongs to
    pub group: usize,
    pub label: String,
    pub color: String,
    /// `[timeOffset][cityBucket]`; `None` only before the series' first frame
    pub data: Vec<Option<Vec<f64>>>,
}

impl DataSet {
    /// Values of one city bucket across time.
    pub fn bucket(&self, bucket: usize) -> Vec<Option<f64>> {
        self.data
            .iter()
            .map(|frame| frame.as_ref().and_then(|v| v.get(bucket).copied()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TieringResult {
    pub series: Vec<DataSet>,
    /// Inclusive city counts covered by bucket `0..=max-min`. Every series shares
    /// this one dense axis, so bucket `i` is city count `min + i` even where no
    /// nation has that many cities. `bucket_index` maps a city count to its bucket
    /// and `occupied_buckets` lists the buckets that hold real nations.
    pub city_range: (i64, i64),
    /// Inclusive ticks covered by offset `0..=max-min`
    pub time_range: (i64, i64),
    pub is_turn: bool,
}

impl TieringResult {
    pub fn bucket_index(&self, city: i64) -> Option<usize> {
        let (min, max) = self.city_range;
        if city < min || city > max {
            return None;
        }
        usize::try_from(city - min).ok()
    }

    /// City counts that actually occur in the dataset, as bucket indices.
    pub fn occupied_buckets(&self, data: &GraphData) -> Vec<usize> {
        let mut cities: Vec<i64> = data.coalitions.iter().flat_map(|c| c.cities.iter().copied()).collect();
        cities.sort_unstable();
        cities.dedup();
        cities.into_iter().filter_map(|c| self.bucket_index(c)).collect()
    }
}

struct SeriesBuilder {
    group: usize,
    label: String,
    color: String,
    frames: Vec<Option<Vec<f64>>>,
    /// Present only for series whose metric normalizes.
    denominators: Option<Vec<Option<Vec<f64>>>>,
}

impl SeriesBuilder {
    fn new(group: usize, label: String, color: String, time_len: usize, normalized: bool) -> Self {
        Self {
            group,
            label,
            color,
            frames: vec![None; time_len],
            denominators: normalized.then(|| vec![None; time_len]),
        }
    }

    fn add_frame(&mut self, at: usize, values: &[f64]) {
        let Some(slot) = self.frames.get_mut(at) else {
            return;
        };
        let frame = slot.get_or_insert_with(|| vec![0.0; values.len()]);
        for (acc, v) in frame.iter_mut().zip(values) {
            *acc += v;
        }
    }

    fn add_denominator(&mut self, at: usize, nations: &CityBuffer, norm: Normalization) {
        let Some(slot) = self.denominators.as_mut().and_then(|d| d.get_mut(at)) else {
            return;
        };
        let frame = slot.get_or_insert_with(|| vec![0.0; nations.values().len()]);
        for (bucket, acc) in frame.iter_mut().enumerate() {
            *acc += norm.weight(nations.values()[bucket], nations.city_at(bucket));
        }
    }

    fn finish(self) -> DataSet {
        let mut fill = ForwardFill::default();
        let denominators = self.denominators;
        let data = self
            .frames
            .into_iter()
            .enumerate()
            .map(|(t, frame)| {
                let frame = match (frame, &denominators) {
                    (Some(values), Some(den)) => {
                        Some(divide(values, den.get(t).and_then(|d| d.as_deref())))
                    }
                    (frame, _) => frame,
                };
                fill.fill(frame)
            })
            .collect();
        DataSet {
            group: self.group,
            label: self.label,
            color: self.color,
            data,
        }
    }
}

/// Zero or missing divisors yield 0.
fn divide(mut values: Vec<f64>, divisors: Option<&[f64]>) -> Vec<f64> {
    for (bucket, v) in values.iter_mut().enumerate() {
        let d = divisors.and_then(|d| d.get(bucket)).copied().unwrap_or(0.0);
        let q = if d != 0.0 { *v / d } else { 0.0 };
        *v = if q.is_finite() { q } else { 0.0 };
    }
    values
}

/// Inclusive city range across every coalition; `(0, 0)` when no cities exist.
fn city_range(data: &GraphData) -> (i64, i64) {
    let mut cities = data.coalitions.iter().flat_map(|c| c.cities.iter().copied());
    let Some(first) = cities.next() else {
        return (0, 0);
    };
    cities.fold((first, first), |(lo, hi), c| (lo.min(c), hi.max(c)))
}

/// Union of the coalitions' turn or day ranges.
fn time_range(data: &GraphData, is_turn: bool) -> Option<(i64, i64)> {
    data.coalitions
        .iter()
        .map(|c| c.window(is_turn).range)
        .reduce(|(lo, hi), (s, e)| (lo.min(s), hi.max(e)))
}

struct Timeline {
    is_turn: bool,
    time_min: i64,
    min_city: i64,
    width: usize,
}

pub fn build(
    data: &GraphData,
    metrics: &[TierMetric],
    selections: &[Vec<i64>],
    single_color: bool,
) -> Option<TieringResult> {
    let _profile = ProfileScope::with_context("tiering.build", &[("metrics", v_num(metrics.len() as f64))]);
    let accessors = metrics::resolve(data, metrics)?;
    let is_turn = accessors.is_any_turn;
    let city_range = city_range(data);
    let Some(time_range) = time_range(data, is_turn) else {
        return Some(TieringResult {
            series: Vec::new(),
            city_range,
            time_range: (0, 0),
            is_turn,
        });
    };
    let timeline = Timeline {
        is_turn,
        time_min: time_range.0,
        min_city: city_range.0,
        width: usize::try_from(city_range.1 - city_range.0 + 1).unwrap_or(0),
    };
    let time_len = usize::try_from(time_range.1 - time_range.0 + 1).unwrap_or(0);
    let stack_by_alliance = !accessors.any_normalized() && metrics.len() == 1;

    let mut builders: Vec<SeriesBuilder> = Vec::new();
    for (ci, coalition) in data.coalitions.iter().enumerate() {
        let allowed: HashSet<i64> = selections
            .get(ci)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        let selected: Vec<usize> = coalition
            .alliance_ids
            .iter()
            .enumerate()
            .filter(|(_, id)| allowed.contains(id))
            .map(|(j, _)| j)
            .collect();

        let color_len = if single_color {
            1
        } else if stack_by_alliance {
            selected.len()
        } else {
            metrics.len()
        };
        let palette = colors::series_colors(ci, color_len);
        let color_at = |n: usize| {
            let n = if single_color { 0 } else { n };
            palette.get(n).or_else(|| palette.first()).cloned().unwrap_or_default()
        };

        let first = builders.len();
        if stack_by_alliance {
            for (n, &j) in selected.iter().enumerate() {
                builders.push(SeriesBuilder::new(ci, coalition.alliance_name(j), color_at(n), time_len, false));
            }
        } else {
            for (k, metric) in metrics.iter().enumerate() {
                let label = if metrics.len() > 1 {
                    format!("{}({})", coalition.name, metric.name)
                } else {
                    coalition.name.clone()
                };
                let normalized = accessors.metrics[k].normalize.is_active();
                builders.push(SeriesBuilder::new(ci, label, color_at(k), time_len, normalized));
            }
        }

        for (n, &j) in selected.iter().enumerate() {
            let targets: Vec<usize> = (0..metrics.len())
                .map(|k| if stack_by_alliance { first + n } else { first + k })
                .collect();
            walk_alliance(coalition, j, &accessors, &timeline, &targets, &mut builders);
        }
    }

    Some(TieringResult {
        series: builders.into_iter().map(SeriesBuilder::finish).collect(),
        city_range,
        time_range,
        is_turn,
    })
}

fn walk_alliance(
    coalition: &GraphCoalitionData,
    alliance: usize,
    accessors: &MetricAccessors,
    timeline: &Timeline,
    targets: &[usize],
    builders: &mut [SeriesBuilder],
) {
    let (col_min, col_max) = coalition.window(timeline.is_turn).range;
    let mut buffers: Vec<CityBuffer> = accessors
        .metrics
        .iter()
        .map(|_| CityBuffer::new(timeline.min_city, timeline.width))
        .collect();
    let mut nations = CityBuffer::new(timeline.min_city, timeline.width);
    let mut gate = DayGate::default();

    for tick in col_min..=col_max {
        let Ok(at) = usize::try_from(tick - timeline.time_min) else {
            continue;
        };
        let col = tick - col_min;
        let turn = if timeline.is_turn { col } else { col * 12 };
        let day = if timeline.is_turn { col.div_euclid(12) } else { col };

        for (k, acc) in accessors.metrics.iter().enumerate() {
            if !gate.admits(acc.is_turn, day) {
                continue;
            }
            let target = &mut builders[targets[k]];
            if acc.normalize.is_active() {
                if coalition.day.series(NATION_COUNT_SLOT, alliance).is_none() {
                    continue;
                }
                if let Some(sample) = coalition.day.sample(NATION_COUNT_SLOT, alliance, day) {
                    nations.apply(&coalition.cities, sample, false);
                }
                target.add_denominator(at, &nations, acc.normalize);
            }
            let offset = if acc.is_turn { turn } else { day };
            if let Some(sample) = coalition.window(acc.is_turn).sample(acc.slot, alliance, offset) {
                buffers[k].apply(&coalition.cities, sample, acc.cumulative);
            }
            target.add_frame(at, buffers[k].values());
        }
        gate.close_tick(day);
    }
}
