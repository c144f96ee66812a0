//! Per-tick bookkeeping shared by the tiering and bubble walks.

use crate::model::CityValues;

/// Decides whether a metric is sampled on the current tick.
///
/// Turn metrics are sampled every tick. Day metrics are sampled once per day, even
/// while the walk advances turn by turn.
#[derive(Debug, Default, Clone)]
pub struct DayGate {
    last_day: Option<i64>,
}

impl DayGate {
    pub fn admits(&self, is_turn: bool, day: i64) -> bool {
        is_turn || self.last_day != Some(day)
    }

    /// Call once every metric has been handled for the tick.
    pub fn close_tick(&mut self, day: i64) {
        self.last_day = Some(day);
    }
}

/// Substitutes the most recent non-empty frame for missing ones. Never looks ahead.
#[derive(Debug, Default, Clone)]
pub struct ForwardFill {
    last: Option<Vec<f64>>,
}

impl ForwardFill {
    pub fn fill(&mut self, frame: Option<Vec<f64>>) -> Option<Vec<f64>> {
        match frame {
            Some(values) if !values.is_empty() => {
                self.last = Some(values.clone());
                Some(values)
            }
            _ => self.last.clone(),
        }
    }
}

/// Dense per-city buffer covering every city count in `[min_city, min_city + width)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CityBuffer {
    min_city: i64,
    values: Vec<f64>,
}

impl CityBuffer {
    pub fn new(min_city: i64, width: usize) -> Self {
        Self {
            min_city,
            values: vec![0.0; width],
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn city_at(&self, bucket: usize) -> i64 {
        self.min_city + bucket as i64
    }

    fn bucket_of(&self, city: i64) -> Option<usize> {
        usize::try_from(city - self.min_city)
            .ok()
            .filter(|b| *b < self.values.len())
    }

    /// Folds one sample (indexed like `cities`) into the buffer.
    /// Cumulative metrics add; instantaneous ones overwrite. `None` cells leave the bucket alone.
    pub fn apply(&mut self, cities: &[i64], sample: &CityValues, cumulative: bool) {
        for (value, city) in sample.iter().zip(cities) {
            let (Some(value), Some(bucket)) = (value, self.bucket_of(*city)) else {
                continue;
            };
            if cumulative {
                self.values[bucket] += value;
            } else {
                self.values[bucket] = *value;
            }
        }
    }
}
