use anyhow::{bail, Result};
use std::cmp::Ordering;
use std::collections::BTreeSet;

use super::formatters::{Cell, FormatterRegistry};
use super::{RowKey, SortDir, TableData};

/// Rendering surface for projected tables.
pub trait TableAdapter {
    fn render(&mut self, table: &TableData, formatters: &FormatterRegistry) -> Result<()>;
    fn set_column_visible(&mut self, column: usize, visible: bool) -> Result<()>;
    fn on_row_select(&mut self, handler: Box<dyn FnMut(&RowKey) + Send>);
}

/// Plain-text renderer used by the CLI and tests.
#[derive(Default)]
pub struct TextTableAdapter {
    table: Option<TableData>,
    /// Display order of row indices after sorting
    order: Vec<usize>,
    visible: BTreeSet<usize>,
    lines: Vec<String>,
    handlers: Vec<Box<dyn FnMut(&RowKey) + Send>>,
    formatters: Option<FormatterRegistry>,
}

impl TextTableAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(&self) -> String {
        self.lines.join("\n")
    }

    /// Fires select handlers for the row shown at `display_index`.
    pub fn select_row(&mut self, display_index: usize) -> bool {
        let Some(table) = &self.table else {
            return false;
        };
        let Some(key) = self.order.get(display_index).and_then(|r| table.rows.get(*r)).map(|r| &r.key) else {
            return false;
        };
        for handler in &mut self.handlers {
            handler(key);
        }
        true
    }

    fn cell_text(table: &TableData, formatters: &FormatterRegistry, row: usize, column: usize) -> String {
        let row = &table.rows[row];
        let cell = if column == 0 {
            Cell::Key(&row.key)
        } else {
            Cell::Number(row.values.get(column - 1).copied().unwrap_or(0.0))
        };
        formatters.format(table.formatter_for(column), cell)
    }

    fn sort_rows(table: &TableData) -> Vec<usize> {
        let (column, dir) = table.sort;
        let mut order: Vec<usize> = (0..table.rows.len()).collect();
        order.sort_by(|&a, &b| {
            let (ra, rb) = (&table.rows[a], &table.rows[b]);
            let ord = if column == 0 {
                ra.key.to_string().cmp(&rb.key.to_string())
            } else {
                let va = ra.values.get(column - 1).copied().unwrap_or(0.0);
                let vb = rb.values.get(column - 1).copied().unwrap_or(0.0);
                va.partial_cmp(&vb).unwrap_or(Ordering::Equal)
            };
            match dir {
                SortDir::Asc => ord,
                SortDir::Desc => ord.reverse(),
            }
        });
        order
    }

    fn redraw(&mut self) {
        self.lines.clear();
        let (Some(table), Some(formatters)) = (&self.table, &self.formatters) else {
            return;
        };
        let columns: Vec<usize> = self.visible.iter().copied().collect();
        let mut grid: Vec<Vec<String>> = vec![columns.iter().map(|&c| table.columns[c].clone()).collect()];
        for &r in &self.order {
            grid.push(columns.iter().map(|&c| Self::cell_text(table, formatters, r, c)).collect());
        }
        let widths: Vec<usize> = (0..columns.len())
            .map(|i| grid.iter().map(|row| row[i].chars().count()).max().unwrap_or(0))
            .collect();
        for row in grid {
            let line: Vec<String> = row
                .iter()
                .zip(&widths)
                .map(|(text, w)| format!("{:<width$}", text, width = *w))
                .collect();
            self.lines.push(line.join("  ").trim_end().to_string());
        }
    }
}

impl TableAdapter for TextTableAdapter {
    fn render(&mut self, table: &TableData, formatters: &FormatterRegistry) -> Result<()> {
        if let Some(bad) = table.visible.iter().find(|c| **c >= table.columns.len()) {
            bail!("visible column {} out of range ({} columns)", bad, table.columns.len());
        }
        self.visible = table.visible.iter().copied().collect();
        self.order = Self::sort_rows(table);
        self.table = Some(table.clone());
        let mut registry = FormatterRegistry::empty();
        for name in table.cell_format.keys() {
            if let Some(f) = formatters.get(name) {
                registry.register(name, f);
            }
        }
        self.formatters = Some(registry);
        self.redraw();
        Ok(())
    }

    fn set_column_visible(&mut self, column: usize, visible: bool) -> Result<()> {
        let Some(table) = &self.table else {
            bail!("set_column_visible before render");
        };
        if column >= table.columns.len() {
            bail!("column {} out of range ({} columns)", column, table.columns.len());
        }
        if visible {
            self.visible.insert(column);
        } else {
            self.visible.remove(&column);
        }
        self.redraw();
        Ok(())
    }

    fn on_row_select(&mut self, handler: Box<dyn FnMut(&RowKey) + Send>) {
        self.handlers.push(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::TableRow;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    fn table() -> TableData {
        let mut cell_format = BTreeMap::new();
        cell_format.insert("formatAA".to_string(), vec![0]);
        cell_format.insert("formatMoney".to_string(), vec![1]);
        cell_format.insert("formatNumber".to_string(), vec![2]);
        TableData {
            columns: vec!["name".into(), "loss:damage".into(), "def:wars".into()],
            rows: vec![
                TableRow {
                    key: RowKey::Alliance { name: "Small".into(), id: 1 },
                    values: vec![10.0, 1.0],
                },
                TableRow {
                    key: RowKey::Alliance { name: "Big".into(), id: 2 },
                    values: vec![2500.0, 3.0],
                },
            ],
            searchable: vec![0],
            visible: vec![0, 1],
            cell_format,
            sort: (1, SortDir::Desc),
        }
    }

    #[test]
    fn renders_sorted_visible_columns() {
        let mut adapter = TextTableAdapter::new();
        adapter.render(&table(), &FormatterRegistry::with_defaults()).unwrap();
        let out = adapter.output();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("name"));
        assert!(lines[1].starts_with("Big [2]"));
        assert!(lines[1].ends_with("$2,500"));
        assert!(!out.contains("def:wars"));

        adapter.set_column_visible(2, true).unwrap();
        assert!(adapter.output().contains("def:wars"));
        assert!(adapter.set_column_visible(9, true).is_err());
    }

    #[test]
    fn row_select_reports_display_row() {
        let picked = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&picked);
        let mut adapter = TextTableAdapter::new();
        adapter.on_row_select(Box::new(move |key| sink.lock().unwrap().push(key.clone())));
        adapter.render(&table(), &FormatterRegistry::with_defaults()).unwrap();
        assert!(adapter.select_row(1));
        assert!(!adapter.select_row(5));
        assert_eq!(
            *picked.lock().unwrap(),
            vec![RowKey::Alliance { name: "Small".into(), id: 1 }]
        );
    }
}
