//! Named cell formatters, injected into whichever table adapter renders the data.

use std::collections::HashMap;

use super::RowKey;
use crate::formatting::{commafy, format_date};

#[derive(Debug, Clone, Copy)]
pub enum Cell<'a> {
    Key(&'a RowKey),
    Number(f64),
}

pub type Formatter = fn(Cell<'_>) -> String;

fn plain(v: f64) -> String {
    if v == 0.0 {
        "0".to_string()
    } else if v > -1000.0 && v < 1000.0 {
        v.to_string()
    } else {
        commafy(v)
    }
}

pub fn format_number(cell: Cell<'_>) -> String {
    match cell {
        Cell::Number(v) => plain(v),
        Cell::Key(key) => key.to_string(),
    }
}

pub fn format_money(cell: Cell<'_>) -> String {
    match cell {
        Cell::Number(v) => format!("${}", plain(v)),
        Cell::Key(key) => key.to_string(),
    }
}

pub fn format_epoch_ms(cell: Cell<'_>) -> String {
    match cell {
        Cell::Number(v) if v.is_finite() => format_date(Some(v as i64)),
        Cell::Number(_) => format_date(None),
        Cell::Key(key) => key.to_string(),
    }
}

fn format_key(cell: Cell<'_>) -> String {
    match cell {
        Cell::Key(RowKey::Coalition { index, name }) => format!("{} (coalition {})", name, index + 1),
        Cell::Key(RowKey::Alliance { name, id }) => format!("{} [{}]", name, id),
        Cell::Key(RowKey::Nation { name, id, alliance_id }) => format!("{} [{}] of AA:{}", name, id, alliance_id),
        Cell::Number(v) => plain(v),
    }
}

pub struct FormatterRegistry {
    formatters: HashMap<String, Formatter>,
}

impl Default for FormatterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl FormatterRegistry {
    pub fn empty() -> Self {
        Self {
            formatters: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("formatNumber", format_number);
        registry.register("formatMoney", format_money);
        registry.register("formatDate", format_epoch_ms);
        registry.register("formatCol", format_key);
        registry.register("formatAA", format_key);
        registry.register("formatNation", format_key);
        registry
    }

    pub fn register(&mut self, name: &str, formatter: Formatter) {
        self.formatters.insert(name.to_string(), formatter);
    }

    pub fn get(&self, name: &str) -> Option<Formatter> {
        self.formatters.get(name).copied()
    }

    /// Falls back to `formatNumber` semantics for unknown or missing formatter names.
    pub fn format(&self, name: Option<&str>, cell: Cell<'_>) -> String {
        name.and_then(|n| self.get(n)).unwrap_or(format_number)(cell)
    }
}
