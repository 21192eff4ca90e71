//! Polars bridge for fetched relations
//!
//! Live data arrives as loosely typed rows. Aggregations over it run through
//! a polars `DataFrame` and come back as a `Table`.

use crate::error::{QaError, Result};
use crate::intent::Aggregation;
use crate::table::{Row, Table};
use polars::prelude::*;
use serde_json::Value;

pub const AVG_COLUMN: &str = "avg_value";
pub const COUNT_COLUMN: &str = "record_count";

/// Build a DataFrame: numeric columns become Int64/Float64, everything else
/// is rendered as strings.
pub fn table_to_dataframe(table: &Table) -> Result<DataFrame> {
    let mut series = Vec::with_capacity(table.columns.len());
    for column in &table.columns {
        let cells: Vec<Option<&Value>> = table
            .rows
            .iter()
            .map(|row| row.get(column).filter(|v| !v.is_null()))
            .collect();

        let s = if table.is_numeric_column(column) {
            if cells.iter().flatten().all(|v| v.is_i64()) {
                Series::new(column, cells.iter().map(|v| v.and_then(Value::as_i64)).collect::<Vec<_>>())
            } else {
                Series::new(column, cells.iter().map(|v| v.and_then(Value::as_f64)).collect::<Vec<_>>())
            }
        } else {
            Series::new(
                column,
                cells
                    .iter()
                    .map(|v| {
                        v.map(|value| match value {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                    })
                    .collect::<Vec<Option<String>>>(),
            )
        };
        series.push(s);
    }
    Ok(DataFrame::new(series)?)
}

pub fn dataframe_to_table(df: &DataFrame) -> Result<Table> {
    let columns: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    let mut table = Table::new(columns.clone());

    for row_idx in 0..df.height() {
        let mut row = Row::new();
        for col_name in &columns {
            let series = df.column(col_name)?;
            row.insert(col_name.clone(), series_value(series, row_idx)?);
        }
        table.rows.push(row);
    }
    Ok(table)
}

fn series_value(series: &Series, row_idx: usize) -> Result<Value> {
    let any_val = series
        .get(row_idx)
        .map_err(|e| QaError::Execution(format!("Failed to get value: {}", e)))?;

    let float = |f: f64| serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null);
    Ok(match any_val {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Bool(b),
        AnyValue::String(s) => Value::String(s.to_string()),
        AnyValue::Int32(i) => Value::from(i),
        AnyValue::Int64(i) => Value::from(i),
        AnyValue::UInt32(u) => Value::from(u),
        AnyValue::UInt64(u) => Value::from(u),
        AnyValue::Float32(f) => float(f as f64),
        AnyValue::Float64(f) => float(f),
        other => Value::String(format!("{}", other)),
    })
}

fn agg_expr(column: &str, aggregation: Aggregation) -> Expr {
    match aggregation {
        Aggregation::Avg => col(column).mean(),
        Aggregation::Sum => col(column).sum(),
        Aggregation::Max => col(column).max(),
        Aggregation::Min => col(column).min(),
    }
}

/// Rows where every listed column is non-null.
fn non_null(columns: &[&str]) -> Expr {
    columns
        .iter()
        .map(|c| col(c).is_not_null())
        .reduce(|acc, e| acc.and(e))
        .unwrap_or_else(|| lit(true))
}

fn require_columns(table: &Table, columns: &[&str]) -> Result<()> {
    match columns.iter().find(|c| !table.has_column(c)) {
        Some(missing) => Err(QaError::Execution(format!("column '{}' not present", missing))),
        None => Ok(()),
    }
}

/// Mean of `metric` and row count per group, groups in first-seen order.
/// Rows without a metric value are dropped first.
pub fn group_mean(table: &Table, keys: &[&str], metric: &str) -> Result<Table> {
    let mut required = keys.to_vec();
    required.push(metric);
    require_columns(table, &required)?;

    let df = table_to_dataframe(table)?;
    let key_exprs: Vec<Expr> = keys.iter().map(|k| col(k)).collect();
    let out = df
        .lazy()
        .filter(non_null(&[metric]))
        .group_by_stable(key_exprs)
        .agg([
            col(metric).mean().alias(AVG_COLUMN),
            col(metric).count().alias(COUNT_COLUMN),
        ])
        .collect()?;
    dataframe_to_table(&out)
}

/// Means of several metrics per group; `metrics` pairs a column with its output alias.
pub fn group_means(table: &Table, keys: &[&str], metrics: &[(&str, &str)]) -> Result<Table> {
    let mut required = keys.to_vec();
    required.extend(metrics.iter().map(|(column, _)| *column));
    require_columns(table, &required)?;

    let df = table_to_dataframe(table)?;
    let key_exprs: Vec<Expr> = keys.iter().map(|k| col(k)).collect();
    let aggs: Vec<Expr> = metrics
        .iter()
        .map(|(column, alias)| col(column).mean().alias(alias))
        .collect();
    let columns: Vec<&str> = metrics.iter().map(|(column, _)| *column).collect();
    let out = df
        .lazy()
        .filter(non_null(&columns))
        .group_by_stable(key_exprs)
        .agg(aggs)
        .collect()?;
    dataframe_to_table(&out)
}

/// Single summary row: `<op>_value` plus `record_count`.
pub fn summarize(table: &Table, metric: &str, aggregation: Aggregation) -> Result<Table> {
    require_columns(table, &[metric])?;

    let df = table_to_dataframe(table)?;
    let out = df
        .lazy()
        .filter(non_null(&[metric]))
        .select([
            agg_expr(metric, aggregation).alias(&aggregation.value_column()),
            col(metric).count().alias(COUNT_COLUMN),
        ])
        .collect()?;
    dataframe_to_table(&out)
}
