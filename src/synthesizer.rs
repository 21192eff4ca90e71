//! Answer Synthesizer
//!
//! Pure formatting: a query result plus its sources become an answer
//! paragraph, the structured rows and the citations. Nothing here fails.

use crate::citation::{build_citations, Citation};
use crate::execution::frame::{AVG_COLUMN, COUNT_COLUMN};
use crate::execution::resolve_metric_column;
use crate::execution::result::{DataSource, QueryResult};
use crate::execution::stats::{correlation_direction, correlation_strength};
use crate::intent::{Intent, QueryType};
use crate::inventory::SourceDescriptor;
use crate::table::{display_value, Row, Table};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const RANKING_SHOWN: usize = 5;
pub const FALLBACK_SHOWN: usize = 10;

const PAIRED_PRODUCTION: &str = "avg_production";
const PAIRED_RAINFALL: &str = "avg_rainfall";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    pub answer_text: String,
    pub columns: Vec<String>,
    pub structured_results: Vec<Row>,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone)]
pub struct AnswerSynthesizer {
    portal_url: String,
}

impl AnswerSynthesizer {
    pub fn new(portal_url: impl Into<String>) -> Self {
        Self {
            portal_url: portal_url.into(),
        }
    }

    pub fn synthesize(&self, intent: &Intent, result: &QueryResult, sources: &[SourceDescriptor]) -> Synthesis {
        let citations = if result.data_source == DataSource::MockData {
            vec![Citation::illustrative_prices(&self.portal_url)]
        } else {
            build_citations(sources, &self.portal_url)
        };

        if result.error.is_some() || result.results.is_empty() {
            return Synthesis {
                answer_text: apology(result),
                columns: Vec::new(),
                structured_results: Vec::new(),
                citations,
            };
        }

        let table = &result.results;
        let body = match result.data_source {
            DataSource::MockData => mock_answer(table, result.message.as_deref()),
            source if source.is_fallback() => fallback_answer(table),
            _ => match intent.query_type {
                QueryType::Comparison => comparison_answer(table, &result.metric),
                QueryType::Trend => trend_answer(table, &result.metric),
                QueryType::Correlation => correlation_answer(table, result.statistic),
                QueryType::Ranking => ranking_answer(table, &result.metric),
                QueryType::Current | QueryType::Aggregation | QueryType::General => {
                    general_answer(intent, table, &result.metric)
                }
            },
        };

        Synthesis {
            answer_text: format!("{}\n\nData source: {}", body, result.data_source),
            columns: table.columns.clone(),
            structured_results: table.rows.clone(),
            citations,
        }
    }
}

fn apology(result: &QueryResult) -> String {
    if let Some(message) = &result.message {
        return message.clone();
    }
    match &result.error {
        Some(error) => format!(
            "I'm sorry, I couldn't find data to answer that question ({}). Try rephrasing it or naming a specific state or crop.",
            error
        ),
        None => "I'm sorry, I couldn't find any matching records. Try rephrasing the question or naming a specific state or crop."
            .to_string(),
    }
}

/// "production (tonnes)" for "production_tonnes".
pub fn metric_label(metric: &str) -> String {
    match metric {
        "production_tonnes" => "production (tonnes)".to_string(),
        "rainfall_mm" => "rainfall (mm)".to_string(),
        "price_per_quintal" => "price (per quintal)".to_string(),
        "area_hectares" => "area (hectares)".to_string(),
        "yield_kg_per_ha" => "yield (kg/ha)".to_string(),
        other => other.replace('_', " "),
    }
}

/// Column holding the figure to talk about.
fn value_column(table: &Table) -> Option<String> {
    if table.has_column(AVG_COLUMN) {
        return Some(AVG_COLUMN.to_string());
    }
    if let Some(column) = table.columns.iter().find(|c| c.ends_with("_value")) {
        return Some(column.clone());
    }
    resolve_metric_column(table)
}

/// Text columns joined, with the year appended when present.
fn row_label(table: &Table, row: &Row) -> String {
    let text: Vec<String> = table
        .columns
        .iter()
        .filter_map(|c| row.get(c).and_then(Value::as_str).map(str::to_string))
        .collect();
    let year = row.get("year").filter(|v| !v.is_null()).map(display_value);
    match (text.is_empty(), year) {
        (true, Some(year)) => year,
        (true, None) => "n/a".to_string(),
        (false, Some(year)) => format!("{} ({})", text.join(" / "), year),
        (false, None) => text.join(" / "),
    }
}

fn row_value(row: &Row, column: &str) -> Option<f64> {
    row.get(column).and_then(Value::as_f64)
}

fn fmt_number(value: f64) -> String {
    display_value(&serde_json::json!(value))
}

fn comparison_answer(table: &Table, metric: &str) -> String {
    if table.has_column(PAIRED_PRODUCTION) && table.has_column(PAIRED_RAINFALL) {
        return paired_answer(table);
    }
    let Some(column) = value_column(table) else {
        return itemize(table, table.len());
    };
    let valued: Vec<(&Row, f64)> = table
        .rows
        .iter()
        .filter_map(|row| row_value(row, &column).map(|v| (row, v)))
        .collect();
    let (Some(highest), Some(lowest)) = (
        valued.iter().max_by(|a, b| a.1.total_cmp(&b.1)),
        valued.iter().min_by(|a, b| a.1.total_cmp(&b.1)),
    ) else {
        return itemize(table, table.len());
    };

    let mut answer = format!(
        "Comparing average {}: {} is highest at {} and {} is lowest at {}.",
        metric_label(metric),
        row_label(table, highest.0),
        fmt_number(highest.1),
        row_label(table, lowest.0),
        fmt_number(lowest.1),
    );
    if valued.len() > 2 {
        let ranking = valued
            .iter()
            .sorted_by(|a, b| b.1.total_cmp(&a.1))
            .enumerate()
            .map(|(i, (row, v))| format!("{}. {}: {}", i + 1, row_label(table, row), fmt_number(*v)))
            .join("\n");
        answer.push_str("\n\nFull ranking:\n");
        answer.push_str(&ranking);
    }
    answer
}

/// Production and rainfall means side by side, one line per (state, year).
fn paired_answer(table: &Table) -> String {
    let figure = |row: &Row, column: &str| {
        row_value(row, column).map(fmt_number).unwrap_or_else(|| "n/a".to_string())
    };
    let mut lines = vec![format!(
        "Comparing average {} and {} by state and year:",
        metric_label("production_tonnes"),
        metric_label("rainfall_mm")
    )];
    for row in &table.rows {
        lines.push(format!(
            "- {}: production {}, rainfall {}",
            row_label(table, row),
            figure(row, PAIRED_PRODUCTION),
            figure(row, PAIRED_RAINFALL)
        ));
    }
    lines.join("\n")
}

fn trend_answer(table: &Table, metric: &str) -> String {
    let Some(column) = value_column(table) else {
        return itemize(table, table.len());
    };
    let points: Vec<(String, f64)> = table
        .rows
        .iter()
        .filter_map(|row| {
            let label = match row.get("year") {
                Some(year) if !year.is_null() => display_value(year),
                _ => row_label(table, row),
            };
            row_value(row, &column).map(|v| (label, v))
        })
        .collect();
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return itemize(table, table.len());
    };

    let change = last.1 - first.1;
    let percent = if first.1 != 0.0 {
        format!(" ({:+.1}%)", change / first.1 * 100.0)
    } else {
        String::new()
    };
    let mut answer = format!(
        "From {} to {}, average {} went from {} to {}, a change of {}{}{}.",
        first.0,
        last.0,
        metric_label(metric),
        fmt_number(first.1),
        fmt_number(last.1),
        if change >= 0.0 { "+" } else { "" },
        fmt_number(change),
        percent,
    );
    let peak = points.iter().max_by(|a, b| a.1.total_cmp(&b.1));
    let trough = points.iter().min_by(|a, b| a.1.total_cmp(&b.1));
    if let (Some(peak), Some(trough)) = (peak, trough) {
        answer.push_str(&format!(
            " The peak was {} in {} and the low point {} in {}.",
            fmt_number(peak.1),
            peak.0,
            fmt_number(trough.1),
            trough.0
        ));
    }
    answer
}

fn correlation_answer(table: &Table, statistic: Option<f64>) -> String {
    match statistic {
        Some(r) => format!(
            "The correlation between crop production and rainfall is {:.2}, a {} {} relationship, across {} data points.",
            r,
            correlation_strength(r),
            correlation_direction(r),
            table.len()
        ),
        None => format!(
            "There are not enough varied data points ({}) to compute a correlation between production and rainfall.",
            table.len()
        ),
    }
}

fn ranking_answer(table: &Table, metric: &str) -> String {
    let Some(column) = value_column(table) else {
        return itemize(table, RANKING_SHOWN);
    };
    let mut lines = vec![format!("Top results by average {}:", metric_label(metric))];
    for (i, row) in table.rows.iter().take(RANKING_SHOWN).enumerate() {
        let value = row.get(&column).map(display_value).unwrap_or_else(|| "n/a".to_string());
        lines.push(format!("{}. {}: {}", i + 1, row_label(table, row), value));
    }
    if table.len() > RANKING_SHOWN {
        lines.push(format!("...and {} more.", table.len() - RANKING_SHOWN));
    }
    lines.join("\n")
}

fn general_answer(intent: &Intent, table: &Table, metric: &str) -> String {
    if table.len() == 1 {
        let column = intent.aggregation.value_column();
        let row = &table.rows[0];
        if let Some(value) = row.get(&column).filter(|v| !v.is_null()) {
            let count = row
                .get(COUNT_COLUMN)
                .map(display_value)
                .unwrap_or_else(|| "n/a".to_string());
            return format!(
                "The {} {} is {} across {} records.",
                intent.aggregation.describe(),
                metric_label(metric),
                display_value(value),
                count
            );
        }
    }
    itemize(table, table.len())
}

fn mock_answer(table: &Table, disclaimer: Option<&str>) -> String {
    let mut lines = vec!["Live market prices are unavailable. Illustrative prices:".to_string()];
    for row in &table.rows {
        lines.push(format!(
            "- {} in {}: {} per quintal ({})",
            row.get("crop").map(display_value).unwrap_or_default(),
            row.get("state").map(display_value).unwrap_or_default(),
            row.get("price_per_quintal").map(display_value).unwrap_or_default(),
            row.get("date").map(display_value).unwrap_or_default(),
        ));
    }
    if let Some(disclaimer) = disclaimer {
        lines.push(String::new());
        lines.push(disclaimer.to_string());
    }
    lines.join("\n")
}

fn fallback_answer(table: &Table) -> String {
    format!(
        "I couldn't match your question exactly, so here are the closest records I found:\n{}",
        itemize(table, FALLBACK_SHOWN)
    )
}

/// Rows verbatim as `column: value` pairs, in column order.
fn itemize(table: &Table, limit: usize) -> String {
    let mut lines: Vec<String> = table
        .rows
        .iter()
        .take(limit)
        .map(|row| {
            let fields = table
                .columns
                .iter()
                .filter_map(|c| row.get(c).map(|v| format!("{}: {}", c, display_value(v))))
                .join(", ");
            format!("- {}", fields)
        })
        .collect();
    if table.len() > limit {
        lines.push(format!("...and {} more rows.", table.len() - limit));
    }
    lines.join("\n")
}
