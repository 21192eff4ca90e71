//! Tabular relation - the uniform in-memory result shape
//!
//! Every component exchanges data as an ordered list of rows keyed by column
//! name, plus the column order the producer emitted.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

pub type Row = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Column names in producer order
    pub columns: Vec<String>,

    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from rows, collecting columns in first-seen order.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        Self { columns, rows }
    }

    pub fn push_row(&mut self, row: Row) {
        for key in row.keys() {
            if !self.has_column(key) {
                self.columns.push(key.clone());
            }
        }
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn value(&self, row_idx: usize, column: &str) -> Option<&Value> {
        self.rows.get(row_idx).and_then(|row| row.get(column))
    }

    pub fn f64_at(&self, row_idx: usize, column: &str) -> Option<f64> {
        self.value(row_idx, column).and_then(Value::as_f64)
    }

    /// A column is numeric when it holds at least one value and every
    /// non-null value is a JSON number.
    pub fn is_numeric_column(&self, column: &str) -> bool {
        let mut seen = false;
        for row in &self.rows {
            match row.get(column) {
                None | Some(Value::Null) => continue,
                Some(Value::Number(_)) => seen = true,
                Some(_) => return false,
            }
        }
        seen
    }

    pub fn numeric_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| self.is_numeric_column(c))
            .map(String::as_str)
            .collect()
    }

    /// Rename a column in place. A rename never overwrites a column that is
    /// already present; returns whether the rename happened.
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        if from == to || !self.has_column(from) || self.has_column(to) {
            return false;
        }
        for column in self.columns.iter_mut() {
            if column.as_str() == from {
                *column = to.to_string();
            }
        }
        for row in self.rows.iter_mut() {
            if let Some(value) = row.remove(from) {
                row.insert(to.to_string(), value);
            }
        }
        true
    }

    /// Stable sort by a numeric column; rows without a number sort last.
    pub fn sort_by_number(&mut self, column: &str, descending: bool) {
        self.rows.sort_by(|a, b| {
            let left = a.get(column).and_then(Value::as_f64);
            let right = b.get(column).and_then(Value::as_f64);
            match (left, right) {
                (Some(l), Some(r)) => {
                    let ord = l.partial_cmp(&r).unwrap_or(Ordering::Equal);
                    if descending {
                        ord.reverse()
                    } else {
                        ord
                    }
                }
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        });
    }

    pub fn truncate(&mut self, len: usize) {
        self.rows.truncate(len);
    }

    /// Keep rows whose string value in `column` equals one of `values`, ignoring case.
    pub fn retain_matching(&mut self, column: &str, values: &[String]) {
        let wanted: Vec<String> = values.iter().map(|v| v.to_lowercase()).collect();
        self.rows.retain(|row| {
            row.get(column)
                .and_then(Value::as_str)
                .map(|s| wanted.contains(&s.to_lowercase()))
                .unwrap_or(false)
        });
    }
}

/// Render a cell for prose: strings without quotes, whole floats without
/// a fractional part, null as "n/a".
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "n/a".to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            (None, Some(f)) => format!("{:.2}", f),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn sample() -> Table {
        Table::from_rows(vec![
            row(json!({"state": "Punjab", "avg_value": 10.0})),
            row(json!({"state": "Gujarat", "avg_value": null})),
            row(json!({"state": "Kerala", "avg_value": 30.5})),
        ])
    }

    #[test]
    fn test_from_rows_collects_columns() {
        let table = sample();
        assert_eq!(table.len(), 3);
        assert!(table.has_column("state"));
        assert!(table.has_column("avg_value"));
    }

    #[test]
    fn test_numeric_detection() {
        let table = sample();
        assert!(table.is_numeric_column("avg_value"));
        assert!(!table.is_numeric_column("state"));
        assert_eq!(table.numeric_columns(), vec!["avg_value"]);
    }

    #[test]
    fn test_sort_puts_nulls_last() {
        let mut table = sample();
        table.sort_by_number("avg_value", true);
        assert_eq!(table.value(0, "state"), Some(&json!("Kerala")));
        assert_eq!(table.value(2, "state"), Some(&json!("Gujarat")));
    }

    #[test]
    fn test_rename_never_overwrites() {
        let mut table = Table::from_rows(vec![row(json!({"state_name": "Bihar", "state": "Bihar"}))]);
        assert!(!table.rename_column("state_name", "state"));

        let mut table = Table::from_rows(vec![row(json!({"commodity": "Rice"}))]);
        assert!(table.rename_column("commodity", "crop"));
        assert_eq!(table.value(0, "crop"), Some(&json!("Rice")));
        assert!(!table.has_column("commodity"));
    }

    #[test]
    fn test_retain_matching_ignores_case() {
        let mut table = sample();
        table.retain_matching("state", &["punjab".to_string(), "KERALA".to_string()]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&json!(2014)), "2014");
        assert_eq!(display_value(&json!(2014.0)), "2014");
        assert_eq!(display_value(&json!(12.345)), "12.35");
        assert_eq!(display_value(&json!("Rice")), "Rice");
        assert_eq!(display_value(&Value::Null), "n/a");
    }
}
