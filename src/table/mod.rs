//! Flat damage tables at coalition, alliance or nation grain.

pub mod adapter;
pub mod formatters;

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::formatting::format_nation_name;
use crate::logging::{debug, obj, v_num, v_str, Domain};
use crate::model::{Conflict, ConflictCoalition};
use crate::warweb::trim_header;

pub use adapter::{TableAdapter, TextTableAdapter};
pub use formatters::{Cell, FormatterRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Grain {
    Coalition,
    Alliance,
    Nation,
}

impl Grain {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Grain::Coalition),
            1 => Some(Grain::Alliance),
            2 => Some(Grain::Nation),
            _ => None,
        }
    }

    /// Formatter applied to the `name` column.
    pub fn name_formatter(self) -> &'static str {
        match self {
            Grain::Coalition => "formatCol",
            Grain::Alliance => "formatAA",
            Grain::Nation => "formatNation",
        }
    }
}

impl FromStr for Grain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" | "coalition" => Ok(Grain::Coalition),
            "1" | "alliance" => Ok(Grain::Alliance),
            "2" | "nation" => Ok(Grain::Nation),
            other => Err(format!("unknown grain {:?} (coalition|alliance|nation)", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    Asc,
    Desc,
}

impl FromStr for SortDir {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDir::Asc),
            "desc" => Ok(SortDir::Desc),
            other => Err(format!("unknown sort direction {:?}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowKey {
    Coalition { index: usize, name: String },
    Alliance { name: String, id: i64 },
    Nation { name: String, id: i64, alliance_id: i64 },
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Coalition { name, .. } | RowKey::Alliance { name, .. } | RowKey::Nation { name, .. } => {
                f.write_str(name)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub key: RowKey,
    /// One value per non-name column
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableData {
    pub columns: Vec<String>,
    pub rows: Vec<TableRow>,
    pub searchable: Vec<usize>,
    pub visible: Vec<usize>,
    /// formatter name -> column indices
    pub cell_format: BTreeMap<String, Vec<usize>>,
    pub sort: (usize, SortDir),
}

impl TableData {
    /// Formatter assigned to a column, if any.
    pub fn formatter_for(&self, column: usize) -> Option<&str> {
        self.cell_format
            .iter()
            .find(|(_, cols)| cols.contains(&column))
            .map(|(name, _)| name.as_str())
    }
}

/// How a raw (taken, dealt) pair expands into three columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairKind {
    /// loss / dealt / net = dealt - loss
    LossDealt,
    /// def / off / both = def + off
    DefOff,
}

impl PairKind {
    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PairKind::LossDealt),
            1 => Some(PairKind::DefOff),
            _ => None,
        }
    }

    fn columns(self, header: &str) -> [String; 3] {
        match self {
            PairKind::LossDealt => {
                let base = header.replacen("_loss", "", 1).replacen("loss_", "", 1);
                [format!("loss:{}", header), format!("dealt:{}", base), format!("net:{}", base)]
            }
            PairKind::DefOff => [format!("def:{}", header), format!("off:{}", header), format!("both:{}", header)],
        }
    }

    fn total(self, taken: f64, dealt: f64) -> f64 {
        match self {
            PairKind::LossDealt => dealt - taken,
            PairKind::DefOff => dealt + taken,
        }
    }
}

fn is_money_column(name: &str) -> bool {
    name.contains('~') || name.contains("damage") || (name.contains("infra") && !name.contains("attacks"))
}

fn stat_values(kinds: &[(usize, PairKind)], damage: &[Vec<f64>], offset: usize) -> Vec<f64> {
    let taken = damage.get(offset).map(Vec::as_slice).unwrap_or(&[]);
    let dealt = damage.get(offset + 1).map(Vec::as_slice).unwrap_or(&[]);
    let mut values = Vec::with_capacity(kinds.len() * 3);
    for &(i, kind) in kinds {
        let t = taken.get(i).copied().unwrap_or(0.0);
        let d = dealt.get(i).copied().unwrap_or(0.0);
        values.extend([t, d, kind.total(t, d)]);
    }
    values
}

fn coalition_rows(index: usize, coalition: &ConflictCoalition, grain: Grain, kinds: &[(usize, PairKind)]) -> Vec<TableRow> {
    match grain {
        Grain::Coalition => vec![TableRow {
            key: RowKey::Coalition {
                index,
                name: coalition.name.clone(),
            },
            values: stat_values(kinds, &coalition.damage, 0),
        }],
        Grain::Alliance => coalition
            .alliance_ids
            .iter()
            .enumerate()
            .map(|(i, id)| TableRow {
                key: RowKey::Alliance {
                    name: coalition.alliance_name(i),
                    id: *id,
                },
                values: stat_values(kinds, &coalition.damage, coalition.alliance_offset(i)),
            })
            .collect(),
        Grain::Nation => coalition
            .nation_ids
            .iter()
            .enumerate()
            .map(|(i, id)| TableRow {
                key: RowKey::Nation {
                    name: format_nation_name(coalition.nation_names.get(i).and_then(|n| n.as_deref()), *id),
                    id: *id,
                    alliance_id: coalition.nation_aa.get(i).copied().unwrap_or_default(),
                },
                values: stat_values(kinds, &coalition.damage, coalition.nation_offset(i)),
            })
            .collect(),
    }
}

pub fn project(conflict: &Conflict, grain: Grain, layout: &[String], sort_by: &str, sort_dir: SortDir) -> TableData {
    let mut kinds = Vec::with_capacity(conflict.damage_header.len());
    let mut columns = vec!["name".to_string()];
    for (i, raw) in conflict.damage_header.iter().enumerate() {
        let code = conflict.header_type.get(i).copied().unwrap_or(u8::MAX);
        let Some(kind) = PairKind::from_code(code) else {
            debug(
                Domain::Table,
                "header_skipped",
                obj(&[("header", v_str(raw)), ("header_type", v_num(code as f64))]),
            );
            continue;
        };
        kinds.push((i, kind));
        columns.extend(kind.columns(&trim_header(raw)));
    }

    let mut cell_format: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    cell_format.insert(grain.name_formatter().to_string(), vec![0]);
    let mut number = Vec::new();
    let mut money = Vec::new();
    let mut visible = Vec::new();
    for (i, name) in columns.iter().enumerate() {
        if layout.iter().any(|l| l == name) {
            visible.push(i);
        }
        if i > 0 {
            if is_money_column(name) {
                money.push(i);
            } else {
                number.push(i);
            }
        }
    }
    cell_format.insert("formatNumber".to_string(), number);
    cell_format.insert("formatMoney".to_string(), money);

    let sort_index = columns.iter().position(|c| c == sort_by).unwrap_or(0);
    let rows = conflict
        .coalitions
        .iter()
        .enumerate()
        .flat_map(|(ci, c)| coalition_rows(ci, c, grain, &kinds))
        .collect();

    TableData {
        columns,
        rows,
        searchable: vec![0],
        visible,
        cell_format,
        sort: (sort_index, sort_dir),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conflict() -> Conflict {
        serde_json::from_value(json!({
            "name": "c",
            "coalitions": [{
                "name": "Red",
                "alliance_ids": [11, 12],
                "alliance_names": ["Eleven", "Twelve"],
                "nation_ids": [100],
                "nation_names": ["Nat"],
                "nation_aa": [11],
                "damage": [
                    [1, 2], [3, 4],
                    [5, 6], [7, 8],
                    [9, 10], [11, 12],
                    [13, 14], [15, 16]
                ]
            }],
            "damage_header": ["loss_value", "wars"],
            "header_type": [0, 1]
        }))
        .unwrap()
    }

    #[test]
    fn derives_three_columns_per_header() {
        let layout = vec!["name".to_string(), "net:damage".to_string()];
        let table = project(&conflict(), Grain::Coalition, &layout, "both:wars", SortDir::Desc);
        assert_eq!(
            table.columns,
            vec!["name", "loss:damage", "dealt:damage", "net:damage", "def:wars", "off:wars", "both:wars"]
        );
        assert_eq!(table.visible, vec![0, 3]);
        assert_eq!(table.sort, (6, SortDir::Desc));
        assert_eq!(table.cell_format["formatCol"], vec![0]);
        assert_eq!(table.cell_format["formatMoney"], vec![1, 2, 3]);
        assert_eq!(table.cell_format["formatNumber"], vec![4, 5, 6]);
        assert_eq!(table.rows[0].values, vec![1.0, 3.0, 2.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn alliance_and_nation_rows_use_flat_offsets() {
        let table = project(&conflict(), Grain::Alliance, &[], "missing", SortDir::Asc);
        assert_eq!(table.sort.0, 0);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1].key, RowKey::Alliance { name: "Twelve".into(), id: 12 });
        assert_eq!(table.rows[1].values[..3], [9.0, 11.0, 2.0]);

        let table = project(&conflict(), Grain::Nation, &[], "name", SortDir::Asc);
        assert_eq!(
            table.rows[0].key,
            RowKey::Nation { name: "Nat".into(), id: 100, alliance_id: 11 }
        );
        assert_eq!(table.rows[0].values[..3], [13.0, 15.0, 2.0]);
        assert_eq!(table.formatter_for(0), Some("formatNation"));
    }

    #[test]
    fn money_classification() {
        assert!(is_money_column("loss:~$infra"));
        assert!(is_money_column("dealt:infra"));
        assert!(!is_money_column("off:infra attacks"));
        assert!(!is_money_column("def:wars"));
    }
}
