//! Resolver trait - contract shared by the local and live resolvers

use crate::execution::result::QueryResult;
use crate::intent::Intent;
use crate::inventory::SourceDescriptor;
use crate::table::Table;
use async_trait::async_trait;

/// Preferred metric columns, best first.
pub const METRIC_PRIORITY: [&str; 3] = ["price_per_quintal", "production_tonnes", "rainfall_mm"];

/// Turns an intent into a query result.
///
/// Implementations never fail: every problem is reported through
/// `QueryResult::error` with an empty relation.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolver name (e.g., "local", "live")
    fn name(&self) -> &'static str;

    async fn execute(&self, intent: &Intent, sources: &[SourceDescriptor]) -> QueryResult;
}

/// Pick the metric column among `available` using the fixed priority list.
pub fn ranked_metric_column<'a>(available: &[&'a str]) -> Option<&'a str> {
    METRIC_PRIORITY
        .iter()
        .find_map(|preferred| available.iter().find(|c| *c == preferred).copied())
}

/// Metric column of a fetched relation: the ranked choice if it is numeric,
/// else the first numeric column other than `year`.
pub fn resolve_metric_column(table: &Table) -> Option<String> {
    let numeric = table.numeric_columns();
    if let Some(column) = ranked_metric_column(&numeric) {
        return Some(column.to_string());
    }
    numeric
        .into_iter()
        .find(|c| *c != "year")
        .map(str::to_string)
}
