//! Resolution Cascade
//!
//! Sequences the live and local resolvers, three relaxed fallback tiers and
//! a terminal (mock prices or guidance). The cascade always returns a
//! `QueryResult` with a `results` relation and never propagates an error.
//!
//! START -> ROUTE_DECISION -> {LIVE_ATTEMPT, LOCAL_ATTEMPT}
//!       -> FALLBACK_TIER_1..3 -> TERMINAL(success | synthetic | guidance)

use crate::error::{ResolutionIssue, Result};
use crate::execution::frame::COUNT_COLUMN;
use crate::execution::local::{Relation, AGRI, CLIMATE};
use crate::execution::result::{DataSource, QueryResult};
use crate::execution::store::{FilterClause, LocalStore, SelectBuilder, AGRI_TABLE};
use crate::execution::Resolver;
use crate::intent::{Intent, MetricTag, QueryType};
use crate::inventory::SourceDescriptor;
use crate::table::{Row, Table};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

pub const SEARCH_LIMIT: usize = 10;
pub const SAMPLE_LIMIT: usize = 8;
pub const NO_PRICE_DATA: &str = "local store has no price data";

pub const MOCK_DISCLAIMER: &str = "These prices are illustrative sample values, not live market data. \
     Live market prices could not be retrieved right now.";

pub const GUIDANCE_MESSAGE: &str = "I understand you're asking about agriculture or climate data, but I need \
     more specific information to find relevant results. Try naming a state, a crop and what you want to \
     know, for example: 'Compare rice production in Punjab and Maharashtra'.";

/// Illustrative crop x state prices (per quintal) for the synthetic terminal.
const MOCK_PRICES: &[(&str, &str, f64)] = &[
    ("Rice", "Punjab", 2200.0),
    ("Rice", "Maharashtra", 2100.0),
    ("Rice", "West Bengal", 2000.0),
    ("Cotton", "Punjab", 5500.0),
    ("Cotton", "Gujarat", 5800.0),
    ("Cotton", "Maharashtra", 5400.0),
    ("Wheat", "Punjab", 2000.0),
    ("Wheat", "Uttar Pradesh", 1950.0),
    ("Wheat", "Haryana", 2050.0),
];
const MOCK_DEFAULT_CROPS: [&str; 3] = ["Rice", "Cotton", "Wheat"];
const MOCK_DEFAULT_STATES: [&str; 3] = ["Punjab", "Maharashtra", "Gujarat"];
const MOCK_DATE: &str = "2024-01-15";
const MOCK_GENERIC_PRICE: f64 = 2200.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CascadeState {
    Start,
    RouteDecision,
    LiveAttempt,
    LocalAttempt,
    FallbackTier1,
    FallbackTier2,
    FallbackTier3,
    TerminalSuccess,
    TerminalSynthetic,
    TerminalGuidance,
}

impl fmt::Display for CascadeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CascadeState::Start => "START",
            CascadeState::RouteDecision => "ROUTE_DECISION",
            CascadeState::LiveAttempt => "LIVE_ATTEMPT",
            CascadeState::LocalAttempt => "LOCAL_ATTEMPT",
            CascadeState::FallbackTier1 => "FALLBACK_TIER_1",
            CascadeState::FallbackTier2 => "FALLBACK_TIER_2",
            CascadeState::FallbackTier3 => "FALLBACK_TIER_3",
            CascadeState::TerminalSuccess => "TERMINAL_SUCCESS",
            CascadeState::TerminalSynthetic => "TERMINAL_SYNTHETIC",
            CascadeState::TerminalGuidance => "TERMINAL_GUIDANCE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    LiveFirst,
    LocalFirst,
}

impl Route {
    pub fn decide(intent: &Intent) -> Route {
        if intent.has_metric(MetricTag::Price)
            || intent.has_live_trigger()
            || intent.query_type == QueryType::Current
        {
            Route::LiveFirst
        } else {
            Route::LocalFirst
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub state: CascadeState,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<ResolutionIssue>,
}

#[derive(Debug, Clone)]
pub struct CascadeOutcome {
    pub result: QueryResult,
    pub route: Route,
    pub trace: Vec<TraceStep>,
}

impl CascadeOutcome {
    /// Descriptions of every query that was actually executed, in order.
    pub fn query_descriptions(&self) -> Vec<String> {
        self.trace.iter().filter_map(|step| step.query.clone()).collect()
    }
}

#[derive(Default)]
struct Trace {
    steps: Vec<TraceStep>,
}

impl Trace {
    fn record(&mut self, state: CascadeState, description: impl Into<String>, issue: Option<ResolutionIssue>) {
        self.steps.push(TraceStep {
            state,
            description: description.into(),
            query: None,
            issue,
        });
    }

    fn record_result(&mut self, state: CascadeState, result: &QueryResult) {
        let issue = if result.is_usable() {
            None
        } else {
            result.failure_kind()
        };
        match &issue {
            Some(issue) => warn!("{} did not resolve: {}", state, issue),
            None => info!("{} returned {} rows", state, result.results.len()),
        }
        self.steps.push(TraceStep {
            state,
            description: format!("{} ({} rows)", result.data_source, result.results.len()),
            query: Some(result.query.clone()).filter(|q| !q.is_empty()),
            issue,
        });
    }
}

pub struct ResolutionCascade {
    live: Arc<dyn Resolver>,
    local: Arc<dyn Resolver>,
    store: LocalStore,
}

impl ResolutionCascade {
    pub fn new(live: Arc<dyn Resolver>, local: Arc<dyn Resolver>, store: LocalStore) -> Self {
        Self { live, local, store }
    }

    pub async fn resolve(&self, intent: &Intent, sources: &[SourceDescriptor]) -> CascadeOutcome {
        let mut trace = Trace::default();
        trace.record(CascadeState::Start, intent.question.clone(), None);
        if intent.is_ambiguous() {
            trace.record(CascadeState::Start, "no entities or metrics extracted", Some(ResolutionIssue::ParseAmbiguity));
        }

        let route = Route::decide(intent);
        let price_flavored = intent.is_price_flavored();
        let source_issue = sources.is_empty().then_some(ResolutionIssue::SourceNotFound);
        trace.record(CascadeState::RouteDecision, format!("{:?}", route), source_issue);
        info!("Route decision: {:?} for '{}'", route, intent.question);

        let attempts = match route {
            Route::LiveFirst => [
                (CascadeState::LiveAttempt, &self.live),
                (CascadeState::LocalAttempt, &self.local),
            ],
            Route::LocalFirst => [
                (CascadeState::LocalAttempt, &self.local),
                (CascadeState::LiveAttempt, &self.live),
            ],
        };

        for (state, resolver) in attempts {
            if state == CascadeState::LocalAttempt && price_flavored {
                trace.record(
                    state,
                    "skipped",
                    Some(ResolutionIssue::QueryExecutionError(NO_PRICE_DATA.to_string())),
                );
                continue;
            }
            let result = resolver.execute(intent, sources).await;
            trace.record_result(state, &result);
            if result.is_usable() {
                return finish(result, route, trace);
            }
        }

        let tiers: [(CascadeState, fn(&Self, &Intent) -> Result<QueryResult>); 3] = [
            (CascadeState::FallbackTier1, Self::relaxed_aggregation),
            (CascadeState::FallbackTier2, Self::keyword_search),
            (CascadeState::FallbackTier3, Self::static_sample),
        ];
        for (state, tier) in tiers {
            if price_flavored {
                trace.record(
                    state,
                    "skipped",
                    Some(ResolutionIssue::QueryExecutionError(NO_PRICE_DATA.to_string())),
                );
                continue;
            }
            match tier(self, intent) {
                Ok(result) => {
                    trace.record_result(state, &result);
                    if result.is_usable() {
                        return finish(result, route, trace);
                    }
                }
                Err(e) => {
                    warn!("{} failed: {}", state, e);
                    trace.record(state, "failed", Some(ResolutionIssue::QueryExecutionError(e.to_string())));
                }
            }
        }

        if price_flavored {
            let result = mock_prices(intent);
            info!("Serving {} illustrative price rows", result.results.len());
            trace.record_result(CascadeState::TerminalSynthetic, &result);
            return CascadeOutcome {
                result,
                route,
                trace: trace.steps,
            };
        }

        info!("All resolution strategies exhausted, returning guidance");
        let result = guidance();
        trace.record(CascadeState::TerminalGuidance, "guidance", None);
        CascadeOutcome {
            result,
            route,
            trace: trace.steps,
        }
    }

    /// Tier 1: the general shape over a relation guessed from question
    /// keywords, entity filters only when present.
    fn relaxed_aggregation(&self, intent: &Intent) -> Result<QueryResult> {
        let relation: Relation = if intent.is_climate_flavored() { CLIMATE } else { AGRI };
        let metric = relation.metric();
        let op = intent.aggregation;
        let builder = SelectBuilder::new(relation.table)
            .column(&format!("{}({}) AS {}", op.sql_function(), metric, op.value_column()))
            .column(&format!("COUNT(*) AS {}", COUNT_COLUMN));
        let builder = relation
            .entity_filters(&intent.states, &intent.crops)
            .into_iter()
            .fold(builder, |b, f| b.filter(f));
        let (sql, params) = builder.build();
        let mut table = self.store.query(&sql, &params)?;
        if table.f64_at(0, COUNT_COLUMN) == Some(0.0) {
            table.rows.clear();
        }
        Ok(QueryResult::success(table, metric, sql, DataSource::FallbackRelaxed).with_table(relation.table))
    }

    /// Tier 2: top agriculture rows for whatever entities were named.
    fn keyword_search(&self, intent: &Intent) -> Result<QueryResult> {
        let builder = SelectBuilder::new(AGRI_TABLE)
            .column("state")
            .column("crop")
            .column("year")
            .column("production_tonnes AS value")
            .column("'Agriculture Data' AS source")
            .filter(FilterClause::one_of("state", &intent.states))
            .filter(FilterClause::one_of("crop", &intent.crops))
            .order_by("production_tonnes DESC")
            .limit(SEARCH_LIMIT);
        let table = self.store.run(&builder)?;
        Ok(
            QueryResult::success(table, "production_tonnes", builder.build().0, DataSource::FallbackSearch)
                .with_table(AGRI_TABLE),
        )
    }

    /// Tier 3: a fixed sample so the caller gets something concrete.
    fn static_sample(&self, _intent: &Intent) -> Result<QueryResult> {
        let builder = SelectBuilder::new(AGRI_TABLE)
            .column("state")
            .column("district")
            .column("year")
            .column("crop")
            .column("production_tonnes")
            .order_by("production_tonnes DESC")
            .limit(SAMPLE_LIMIT);
        let table = self.store.run(&builder)?;
        Ok(
            QueryResult::success(table, "production_tonnes", builder.build().0, DataSource::FallbackSample)
                .with_table(AGRI_TABLE),
        )
    }
}

fn finish(result: QueryResult, route: Route, mut trace: Trace) -> CascadeOutcome {
    trace.record(CascadeState::TerminalSuccess, result.data_source.to_string(), None);
    CascadeOutcome {
        result,
        route,
        trace: trace.steps,
    }
}

/// Synthetic price rows for the named crops and states (or a default set).
pub fn mock_prices(intent: &Intent) -> QueryResult {
    let crops: Vec<&str> = if intent.crops.is_empty() {
        MOCK_DEFAULT_CROPS.to_vec()
    } else {
        intent.crops.iter().map(String::as_str).collect()
    };
    let states: Vec<&str> = if intent.states.is_empty() {
        MOCK_DEFAULT_STATES.to_vec()
    } else {
        intent.states.iter().map(String::as_str).collect()
    };

    let columns = ["crop", "state", "price_per_quintal", "date", "source"];
    let mut table = Table::new(columns.iter().map(|c| c.to_string()).collect());
    for crop in &crops {
        for state in &states {
            let hit = MOCK_PRICES
                .iter()
                .find(|(c, s, _)| c.eq_ignore_ascii_case(crop) && s.eq_ignore_ascii_case(state));
            if let Some((c, s, price)) = hit {
                table.push_row(mock_row(c, s, *price));
            }
        }
    }
    if table.is_empty() {
        let crop = intent.crops.first().map_or("Rice", String::as_str);
        let state = intent.states.first().map_or("Punjab", String::as_str);
        table.push_row(mock_row(crop, state, MOCK_GENERIC_PRICE));
    }

    QueryResult::success(table, "price_per_quintal", "illustrative price lookup", DataSource::MockData)
        .with_message(MOCK_DISCLAIMER)
}

fn mock_row(crop: &str, state: &str, price: f64) -> Row {
    let mut row = Row::new();
    row.insert("crop".to_string(), Value::from(crop));
    row.insert("state".to_string(), Value::from(state));
    row.insert("price_per_quintal".to_string(), json!(price));
    row.insert("date".to_string(), Value::from(MOCK_DATE));
    row.insert("source".to_string(), Value::from("Mock Data"));
    row
}

pub fn guidance() -> QueryResult {
    QueryResult::success(Table::default(), "none", "", DataSource::FallbackGuidance).with_message(GUIDANCE_MESSAGE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::IntentParser;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedResolver {
        name: &'static str,
        result: QueryResult,
        calls: AtomicUsize,
    }

    impl FixedResolver {
        fn new(name: &'static str, result: QueryResult) -> Arc<Self> {
            Arc::new(Self {
                name,
                result,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Resolver for FixedResolver {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn execute(&self, _intent: &Intent, _sources: &[SourceDescriptor]) -> QueryResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn failing(source: DataSource) -> QueryResult {
        QueryResult::failure(ResolutionIssue::RemoteUnavailable, "m", "q", source)
    }

    fn one_row(source: DataSource) -> QueryResult {
        let mut table = Table::default();
        table.push_row(json!({"state": "Punjab", "avg_value": 1.0}).as_object().cloned().unwrap());
        QueryResult::success(table, "production_tonnes", "q", source)
    }

    fn missing_store() -> LocalStore {
        LocalStore::new("/nonexistent/canonical.sqlite")
    }

    #[test]
    fn test_route_decision() {
        let parser = IntentParser::new();
        assert_eq!(Route::decide(&parser.parse("latest wheat output in Punjab")), Route::LiveFirst);
        assert_eq!(Route::decide(&parser.parse("mandi rates for onion")), Route::LiveFirst);
        assert_eq!(
            Route::decide(&parser.parse("Compare rice production in Punjab and Maharashtra")),
            Route::LocalFirst
        );
    }

    #[tokio::test]
    async fn test_preferred_success_skips_other_resolver() {
        let live = FixedResolver::new("live", one_row(DataSource::LiveApi));
        let local = FixedResolver::new("local", one_row(DataSource::Local));
        let cascade = ResolutionCascade::new(live.clone(), local.clone(), missing_store());

        let intent = IntentParser::new().parse("Compare rice production in Punjab and Maharashtra");
        let outcome = cascade.resolve(&intent, &[]).await;
        assert_eq!(outcome.result.data_source, DataSource::Local);
        assert_eq!(local.calls.load(Ordering::SeqCst), 1);
        assert_eq!(live.calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.trace.last().unwrap().state, CascadeState::TerminalSuccess);
    }

    #[tokio::test]
    async fn test_falls_through_to_other_resolver() {
        let live = FixedResolver::new("live", one_row(DataSource::LiveApi));
        let local = FixedResolver::new("local", failing(DataSource::Local));
        let cascade = ResolutionCascade::new(live.clone(), local.clone(), missing_store());

        let intent = IntentParser::new().parse("Compare rice production in Punjab and Maharashtra");
        let outcome = cascade.resolve(&intent, &[]).await;
        assert_eq!(outcome.result.data_source, DataSource::LiveApi);
        assert_eq!(live.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_price_question_reaches_mock_prices() {
        let live = FixedResolver::new("live", failing(DataSource::LiveApi));
        let local = FixedResolver::new("local", one_row(DataSource::Local));
        let cascade = ResolutionCascade::new(live.clone(), local.clone(), missing_store());

        let intent = IntentParser::new().parse("What are today's mandi prices for wheat in Punjab?");
        let outcome = cascade.resolve(&intent, &[]).await;
        assert_eq!(outcome.route, Route::LiveFirst);
        assert_eq!(outcome.result.data_source, DataSource::MockData);
        assert_eq!(outcome.result.results.len(), 1);
        assert_eq!(outcome.result.results.f64_at(0, "price_per_quintal"), Some(2000.0));
        assert!(outcome.result.message.is_some());
        assert_eq!(local.calls.load(Ordering::SeqCst), 0);

        let skipped = outcome
            .trace
            .iter()
            .filter(|s| s.issue == Some(ResolutionIssue::QueryExecutionError(NO_PRICE_DATA.to_string())))
            .count();
        assert_eq!(skipped, 4);
    }

    #[tokio::test]
    async fn test_everything_failing_returns_guidance() {
        let live = FixedResolver::new("live", failing(DataSource::LiveApi));
        let local = FixedResolver::new("local", failing(DataSource::Local));
        let cascade = ResolutionCascade::new(live, local, missing_store());

        let intent = IntentParser::new().parse("hello there");
        let outcome = cascade.resolve(&intent, &[]).await;
        assert_eq!(outcome.result.data_source, DataSource::FallbackGuidance);
        assert!(outcome.result.results.is_empty());
        assert_eq!(outcome.result.message.as_deref(), Some(GUIDANCE_MESSAGE));
        assert!(outcome
            .trace
            .iter()
            .any(|s| s.issue == Some(ResolutionIssue::ParseAmbiguity)));
        assert!(outcome
            .trace
            .iter()
            .any(|s| s.issue == Some(ResolutionIssue::SourceNotFound)));
    }

    #[test]
    fn test_mock_prices_defaults_and_generic_row() {
        let intent = IntentParser::new().parse("market prices");
        let result = mock_prices(&intent);
        // Rice x2, Cotton x3, Wheat x1 of the default states
        assert_eq!(result.results.len(), 6);
        assert_eq!(result.results.columns[0], "crop");

        let intent = IntentParser::new().parse("onion prices in Kerala");
        let result = mock_prices(&intent);
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results.value(0, "crop"), Some(&json!("Onion")));
        assert_eq!(result.results.value(0, "state"), Some(&json!("Kerala")));
        assert_eq!(result.results.f64_at(0, "price_per_quintal"), Some(MOCK_GENERIC_PRICE));
        assert_eq!(result.results.value(0, "source"), Some(&json!("Mock Data")));

        // no state named
        let intent = IntentParser::new().parse("sugarcane prices");
        let result = mock_prices(&intent);
        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results.value(0, "crop"), Some(&json!("Sugarcane")));
        assert_eq!(result.results.value(0, "state"), Some(&json!("Punjab")));
    }
}
