//! Live Resolver - query shapes over relations fetched from the remote catalog

use crate::error::{QaError, ResolutionIssue, Result};
use crate::execution::frame::{self, AVG_COLUMN};
use crate::execution::resolver::{resolve_metric_column, Resolver};
use crate::execution::result::{DataSource, QueryResult};
use crate::execution::stats::column_correlation;
use crate::intent::{Intent, QueryType};
use crate::inventory::{DatasetCategory, SourceDescriptor};
use crate::live_fetcher::{LiveCategory, LiveDataSource, LiveFilters};
use crate::table::Table;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

pub const RAW_ROW_LIMIT: usize = 20;
pub const RANKING_LIMIT: usize = 10;
pub const NO_LIVE_DATA: &str = "no live data available";

pub struct LiveResolver {
    source: Arc<dyn LiveDataSource>,
}

impl LiveResolver {
    pub fn new(source: Arc<dyn LiveDataSource>) -> Self {
        Self { source }
    }

    /// Accessor order: market prices first for price questions, otherwise
    /// whatever the selected sources imply.
    pub fn strategy_order(intent: &Intent, sources: &[SourceDescriptor]) -> Vec<LiveCategory> {
        if intent.is_price_flavored() {
            return vec![LiveCategory::MarketPrices, LiveCategory::Agriculture];
        }
        let mut order = Vec::new();
        for source in sources {
            let category = match source.category {
                DatasetCategory::Live => LiveCategory::MarketPrices,
                DatasetCategory::Agriculture => LiveCategory::Agriculture,
                DatasetCategory::Climate => LiveCategory::Rainfall,
                DatasetCategory::Other => continue,
            };
            if !order.contains(&category) {
                order.push(category);
            }
        }
        if order.is_empty() {
            order = vec![LiveCategory::Agriculture, LiveCategory::MarketPrices];
        }
        order
    }

    fn shape(&self, intent: &Intent, table: Table) -> Result<(String, Table, Option<f64>)> {
        match intent.query_type {
            QueryType::Correlation => {
                if !(table.has_column("production_tonnes") && table.has_column("rainfall_mm")) {
                    return Err(QaError::Execution(
                        "correlation needs production and rainfall columns in live data".to_string(),
                    ));
                }
                let joined = frame::group_means(
                    &table,
                    &["state", "year"],
                    &[("production_tonnes", "avg_production"), ("rainfall_mm", "avg_rainfall")],
                )?;
                let r = column_correlation(&joined, "avg_production", "avg_rainfall");
                Ok(("production_tonnes vs rainfall_mm".to_string(), joined, r))
            }
            _ => {
                let metric = resolve_metric_column(&table)
                    .ok_or_else(|| QaError::Execution("no numeric column in live data".to_string()))?;
                let shaped = match intent.query_type {
                    QueryType::Comparison => comparison(intent, &table, &metric)?,
                    QueryType::Trend => grouped_or_raw(&table, &["year"], &metric, false, None)?,
                    QueryType::Ranking => {
                        let mut keys = vec!["state"];
                        if !intent.crops.is_empty() && table.has_column("crop") {
                            keys.push("crop");
                        }
                        grouped_or_raw(&table, &keys, &metric, true, Some(RANKING_LIMIT))?
                    }
                    QueryType::Current => {
                        let keys: Vec<&str> = ["state", "crop"]
                            .into_iter()
                            .filter(|k| table.has_column(k))
                            .collect();
                        if keys.is_empty() {
                            frame::summarize(&table, &metric, intent.aggregation)?
                        } else {
                            grouped_or_raw(&table, &keys, &metric, true, Some(RAW_ROW_LIMIT))?
                        }
                    }
                    // correlation is shaped in the outer arm
                    QueryType::Aggregation | QueryType::General | QueryType::Correlation => {
                        frame::summarize(&table, &metric, intent.aggregation)?
                    }
                };
                Ok((metric, shaped, None))
            }
        }
    }
}

fn comparison(intent: &Intent, table: &Table, metric: &str) -> Result<Table> {
    let (key, wanted) = if intent.states.len() < 2 && intent.crops.len() >= 2 {
        ("crop", &intent.crops)
    } else if intent.states.len() >= 2 {
        ("state", &intent.states)
    } else {
        return Err(QaError::Execution(
            "comparison needs at least two states or two crops".to_string(),
        ));
    };
    let mut grouped = grouped_or_raw(table, &[key], metric, true, None)?;
    if grouped.has_column(key) {
        grouped.retain_matching(key, wanted);
    }
    Ok(grouped)
}

/// Mean per group, or the raw rows (capped) when a grouping column is absent.
fn grouped_or_raw(
    table: &Table,
    keys: &[&str],
    metric: &str,
    descending: bool,
    limit: Option<usize>,
) -> Result<Table> {
    if keys.iter().any(|k| !table.has_column(k)) {
        warn!("Live data lacks {:?}, returning raw rows", keys);
        let mut raw = table.clone();
        raw.truncate(RAW_ROW_LIMIT);
        return Ok(raw);
    }
    let mut grouped = frame::group_mean(table, keys, metric)?;
    if descending {
        grouped.sort_by_number(AVG_COLUMN, true);
    } else {
        grouped.sort_by_number(keys[0], false);
    }
    if let Some(limit) = limit {
        grouped.truncate(limit);
    }
    Ok(grouped)
}

#[async_trait]
impl Resolver for LiveResolver {
    fn name(&self) -> &'static str {
        "live"
    }

    async fn execute(&self, intent: &Intent, sources: &[SourceDescriptor]) -> QueryResult {
        let filters = LiveFilters {
            states: intent.states.clone(),
            crops: intent.crops.clone(),
        };

        let mut fetched = None;
        for category in Self::strategy_order(intent, sources) {
            let table = self.source.fetch_category(category, &filters).await;
            if table.is_empty() {
                info!("Live {} data empty, trying next strategy", category);
                continue;
            }
            fetched = Some((category, table));
            break;
        }

        let Some((category, table)) = fetched else {
            let mut result = QueryResult::failure(
                ResolutionIssue::RemoteUnavailable,
                "unknown",
                "live fetch",
                DataSource::LiveApi,
            );
            result.error = Some(NO_LIVE_DATA.to_string());
            return result;
        };

        let description = format!(
            "{} over live {} data (states: {:?}, crops: {:?})",
            intent.query_type, category, filters.states, filters.crops
        );
        let table_used = format!("live:{}", category);
        match self.shape(intent, table) {
            Ok((metric, shaped, statistic)) => QueryResult::success(shaped, &metric, description, DataSource::LiveApi)
                .with_table(&table_used)
                .with_statistic(statistic),
            Err(e) => QueryResult::failure(
                ResolutionIssue::QueryExecutionError(e.to_string()),
                "unknown",
                description,
                DataSource::LiveApi,
            )
            .with_table(&table_used),
        }
    }
}
