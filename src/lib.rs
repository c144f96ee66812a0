//! Conflict statistics: dataset decoding plus the chart and table aggregations built on it.

pub mod aava;
pub mod bubble;
pub mod colors;
pub mod config;
pub mod fetch;
pub mod formatting;
pub mod jobs;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod selection;
pub mod series;
pub mod table;
pub mod tiering;
pub mod warweb;
