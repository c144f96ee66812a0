//! Animated (x, y, size) traces: one point per alliance per tick.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::logging::{v_num, ProfileScope};
use crate::metrics::{self, MetricAccessor, NATION_COUNT_SLOT};
use crate::model::{GraphCoalitionData, GraphData, TierMetric};
use crate::series::DayGate;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Trace {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    /// Bubble size
    pub customdata: Vec<f64>,
    pub id: Vec<i64>,
    pub text: Vec<String>,
}

impl Trace {
    fn push(&mut self, point: [f64; 3], id: i64, text: &str) {
        self.x.push(point[0]);
        self.y.push(point[1]);
        self.customdata.push(point[2]);
        self.id.push(id);
        self.text.push(text.to_string());
    }
}

/// Inclusive tick span of the emitted traces; `end < start` when nothing was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeFrame {
    pub start: i64,
    pub end: i64,
    pub is_turn: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Extent {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValueRanges {
    pub x: Extent,
    pub y: Extent,
    pub z: Extent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BubbleResult {
    /// tick -> coalition index -> trace
    pub traces: BTreeMap<i64, BTreeMap<usize, Trace>>,
    pub times: TimeFrame,
    pub ranges: ValueRanges,
}

#[derive(Default)]
struct RangeTracker {
    bounds: Option<[(f64, f64); 3]>,
}

impl RangeTracker {
    fn observe(&mut self, point: [f64; 3]) {
        let bounds = self.bounds.get_or_insert([(point[0], point[0]), (point[1], point[1]), (point[2], point[2])]);
        for (b, v) in bounds.iter_mut().zip(point) {
            b.0 = b.0.min(v);
            b.1 = b.1.max(v);
        }
    }

    fn finish(self) -> ValueRanges {
        let [x, y, z] = self
            .bounds
            .unwrap_or([(0.0, 0.0); 3])
            .map(|(min, max)| Extent { min, max });
        ValueRanges { x, y, z }
    }
}

/// Inclusive index band of `cities` inside `[min_city, max_city]`.
/// Falls back to the first/last bucket when a bound is never met.
fn city_band(cities: &[i64], min_city: i64, max_city: i64) -> (usize, usize) {
    let lo = cities.iter().position(|c| *c >= min_city).unwrap_or(0);
    let hi = cities
        .iter()
        .rposition(|c| *c <= max_city)
        .unwrap_or(cities.len().saturating_sub(1));
    (lo, hi)
}

fn band_sum(values: &[Option<f64>], lo: usize, hi: usize) -> f64 {
    (lo..=hi).filter_map(|l| values.get(l).copied().flatten()).sum()
}

pub fn build(
    data: &GraphData,
    metrics: &[TierMetric; 3],
    min_city: i64,
    max_city: i64,
) -> Option<BubbleResult> {
    let _profile = ProfileScope::with_context(
        "bubble.build",
        &[("min_city", v_num(min_city as f64)), ("max_city", v_num(max_city as f64))],
    );
    let accessors = metrics::resolve(data, metrics)?;
    let is_turn = accessors.is_any_turn;

    let mut traces: BTreeMap<i64, BTreeMap<usize, Trace>> = BTreeMap::new();
    let mut ranges = RangeTracker::default();

    for (ci, coalition) in data.coalitions.iter().enumerate() {
        let band = city_band(&coalition.cities, min_city, max_city);
        let (start, end) = coalition.window(is_turn).range;
        for (j, &alliance_id) in coalition.alliance_ids.iter().enumerate() {
            let name = coalition.alliance_name(j);
            let mut buffer = [0.0f64; 3];
            let mut gate = DayGate::default();
            for tick in start..=end {
                let turn = if is_turn { tick } else { tick * 12 };
                let day = if is_turn { tick.div_euclid(12) } else { tick };
                for (k, acc) in accessors.metrics.iter().enumerate() {
                    if !gate.admits(acc.is_turn, day) {
                        continue;
                    }
                    let Some(total) = tick_total(coalition, j, acc, band, turn, day) else {
                        continue;
                    };
                    if metrics[k].cumulative {
                        buffer[k] += total;
                    } else {
                        buffer[k] = total;
                    }
                }
                traces
                    .entry(tick)
                    .or_default()
                    .entry(ci)
                    .or_default()
                    .push(buffer, alliance_id, &name);
                ranges.observe(buffer);
                gate.close_tick(day);
            }
        }
    }

    let times = TimeFrame {
        start: traces.keys().next().copied().unwrap_or(0),
        end: traces.keys().next_back().copied().unwrap_or(-1),
        is_turn,
    };
    Some(BubbleResult {
        traces,
        times,
        ranges: ranges.finish(),
    })
}

/// Band total of one metric at one tick, `None` when there is nothing to apply.
/// A zero nation count leaves the total undivided.
fn tick_total(
    coalition: &GraphCoalitionData,
    alliance: usize,
    acc: &MetricAccessor,
    (lo, hi): (usize, usize),
    turn: i64,
    day: i64,
) -> Option<f64> {
    let window = coalition.window(acc.is_turn);
    let offset = if acc.is_turn {
        turn - coalition.turn.range.0
    } else {
        day - coalition.day.range.0
    };
    let values = window.sample(acc.slot, alliance, offset)?;
    let mut total = band_sum(values, lo, hi);
    if acc.normalize.is_active() {
        let counts = coalition
            .day
            .sample(NATION_COUNT_SLOT, alliance, day - coalition.day.range.0)?;
        let nations: f64 = (lo..=hi)
            .filter_map(|l| {
                let count = counts.get(l).copied().flatten()?;
                let city = coalition.cities.get(l).copied().unwrap_or_default();
                Some(acc.normalize.weight(count, city))
            })
            .sum();
        if nations != 0.0 {
            total /= nations;
        }
    }
    Some(total)
}
