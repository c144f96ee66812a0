//! Alliance-vs-alliance sums over one war-web matrix.

use serde::Serialize;
use std::collections::HashMap;

use crate::formatting::format_alliance_name;
use crate::logging::{obj, v_str, warn, Domain};
use crate::model::{Conflict, Sparse};
use crate::warweb::{trim_header, MetricMeta};

pub const AAVA_METRIC_KEYS: [&str; 7] = [
    "primary_to_row",
    "row_to_primary",
    "net",
    "total",
    "primary_share_pct",
    "row_share_pct",
    "abs_net",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AavaRow {
    /// (display name, alliance id)
    pub alliance: (String, i64),
    pub primary_to_row: f64,
    pub row_to_primary: f64,
    pub net: f64,
    pub total: f64,
    pub primary_share_pct: f64,
    pub row_share_pct: f64,
    pub abs_net: f64,
}

impl AavaRow {
    pub fn metric(&self, key: &str) -> Option<f64> {
        match key {
            "primary_to_row" => Some(self.primary_to_row),
            "row_to_primary" => Some(self.row_to_primary),
            "net" => Some(self.net),
            "total" => Some(self.total),
            "primary_share_pct" => Some(self.primary_share_pct),
            "row_share_pct" => Some(self.row_share_pct),
            "abs_net" => Some(self.abs_net),
            _ => None,
        }
    }
}

pub fn metric_label(metric: &str, header: &str) -> String {
    let meta = MetricMeta::resolve(header);
    match metric {
        "primary_to_row" => meta.primary_to_row_label(header),
        "row_to_primary" => meta.row_to_primary_label(header),
        "net" => "Net".to_string(),
        "total" => "Total".to_string(),
        "primary_share_pct" => "Selected share %".to_string(),
        "row_share_pct" => "Compared share %".to_string(),
        "abs_net" => "Abs Net".to_string(),
        other => trim_header(other),
    }
}

fn cell(matrix: &[Sparse<Option<f64>>], row: usize, col: usize) -> f64 {
    matrix
        .get(row)
        .and_then(|r| r.get(col).copied().flatten())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

fn share(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}

/// One row per resolvable compared alliance. Unknown header or ids degrade to fewer rows.
pub fn aggregate(conflict: &Conflict, header: &str, primary: &[i64], compared: &[i64]) -> Vec<AavaRow> {
    let Some(header_index) = conflict.war_web.headers.iter().position(|h| h == header) else {
        warn(
            Domain::Aava,
            "header_missing",
            obj(&[("header", v_str(header)), ("msg", v_str("war-web header not in dataset"))]),
        );
        return Vec::new();
    };
    let matrix: &[_] = conflict
        .war_web
        .data
        .get(header_index)
        .map(|m| m.0.as_slice())
        .unwrap_or(&[]);

    let id_space = conflict.alliance_id_space();
    let mut names: HashMap<i64, String> = HashMap::new();
    for coalition in &conflict.coalitions {
        for (i, id) in coalition.alliance_ids.iter().enumerate() {
            names.insert(*id, coalition.alliance_name(i));
        }
    }
    let index_of = |id: &i64| id_space.iter().position(|x| x == id);
    let primary_idx: Vec<usize> = primary.iter().filter_map(index_of).collect();
    let compared_idx: Vec<usize> = compared.iter().filter_map(index_of).collect();

    let mut rows: Vec<AavaRow> = compared_idx
        .iter()
        .map(|&r| {
            let (p2r, r2p) = primary_idx.iter().fold((0.0, 0.0), |(p2r, r2p), &p| {
                (p2r + cell(matrix, p, r), r2p + cell(matrix, r, p))
            });
            let id = id_space[r];
            let name = names
                .get(&id)
                .cloned()
                .unwrap_or_else(|| format_alliance_name(None, id));
            AavaRow {
                alliance: (name, id),
                primary_to_row: p2r,
                row_to_primary: r2p,
                net: p2r - r2p,
                total: p2r + r2p,
                primary_share_pct: 0.0,
                row_share_pct: 0.0,
                abs_net: (p2r - r2p).abs(),
            }
        })
        .collect();

    let sum_p2r: f64 = rows.iter().map(|r| r.primary_to_row).sum();
    let sum_r2p: f64 = rows.iter().map(|r| r.row_to_primary).sum();
    for row in &mut rows {
        row.primary_share_pct = share(row.primary_to_row, sum_p2r);
        row.row_share_pct = share(row.row_to_primary, sum_r2p);
    }
    rows
}
