//! QA Assistant - the single entry point: question in, cited answer out
//!
//! Wires the intent parser, source selector, resolution cascade and answer
//! synthesizer. `resolve` never fails; every degradation ends in a
//! labelled answer.

use crate::cascade::{ResolutionCascade, Route, TraceStep};
use crate::citation::Citation;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::execution::{LiveResolver, LocalResolver, LocalStore};
use crate::intent::{Intent, IntentParser};
use crate::inventory::Inventory;
use crate::live_fetcher::{LiveDataFetcher, LiveDataSource};
use crate::source_selector::SourceSelector;
use crate::synthesizer::AnswerSynthesizer;
use crate::table::Row;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// Response returned to the boundary layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantResponse {
    pub request_id: String,

    /// RFC 3339 time the request was received
    pub timestamp: String,

    pub question: String,

    pub answer_text: String,

    /// Result rows, field-for-field as the resolver produced them
    pub structured_results: Vec<Row>,

    /// Column order of `structured_results`
    pub columns: Vec<String>,

    pub citations: Vec<Citation>,

    /// local | live_api | mock_data | fallback-*
    pub data_source_tag: String,

    /// Executed SQL text or live request descriptions, in execution order
    pub raw_query_descriptions: Vec<String>,

    pub intent: Intent,

    pub route: Route,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,

    pub trace: Vec<TraceStep>,

    pub processing_time_ms: u64,
}

pub struct QaAssistant {
    parser: IntentParser,
    selector: SourceSelector,
    cascade: ResolutionCascade,
    synthesizer: AnswerSynthesizer,
    store: LocalStore,
    live_enabled: bool,
}

impl QaAssistant {
    /// Load the inventory and build the HTTP-backed live source.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let inventory = Arc::new(Inventory::load(&config.inventory_path)?);
        let fetcher = LiveDataFetcher::new(config)?;
        let live_enabled = fetcher.is_enabled();
        let store = LocalStore::new(config.db_path.clone());
        let mut assistant = Self::from_parts(inventory, Arc::new(fetcher), store, &config.portal_url);
        assistant.live_enabled = live_enabled;
        Ok(assistant)
    }

    /// Assemble from already-built collaborators (tests inject a stub live source).
    pub fn from_parts(
        inventory: Arc<Inventory>,
        live_source: Arc<dyn LiveDataSource>,
        store: LocalStore,
        portal_url: &str,
    ) -> Self {
        let live = Arc::new(LiveResolver::new(live_source));
        let local = Arc::new(LocalResolver::new(store.clone()));
        Self {
            parser: IntentParser::new(),
            selector: SourceSelector::new(inventory),
            cascade: ResolutionCascade::new(live, local, store.clone()),
            synthesizer: AnswerSynthesizer::new(portal_url),
            store,
            live_enabled: true,
        }
    }

    pub fn inventory(&self) -> &Inventory {
        self.selector.inventory()
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn live_enabled(&self) -> bool {
        self.live_enabled
    }

    pub async fn resolve(&self, question: &str) -> AssistantResponse {
        let started = Instant::now();
        let request_id = Uuid::new_v4().to_string();
        let timestamp = chrono::Utc::now().to_rfc3339();
        info!("[{}] Resolving: {}", request_id, question);

        let intent = self.parser.parse(question);
        info!(
            "[{}] Intent: type={}, states={:?}, crops={:?}, metrics={:?}",
            request_id, intent.query_type, intent.states, intent.crops, intent.metrics
        );

        let sources = self.selector.select(&intent);
        let outcome = self.cascade.resolve(&intent, &sources).await;
        let raw_query_descriptions = outcome.query_descriptions();
        let synthesis = self.synthesizer.synthesize(&intent, &outcome.result, &sources);

        let processing_time_ms = started.elapsed().as_millis() as u64;
        info!(
            "[{}] Answered from {} with {} rows in {}ms",
            request_id,
            outcome.result.data_source,
            synthesis.structured_results.len(),
            processing_time_ms
        );

        AssistantResponse {
            request_id,
            timestamp,
            question: question.to_string(),
            answer_text: synthesis.answer_text,
            structured_results: synthesis.structured_results,
            columns: synthesis.columns,
            citations: synthesis.citations,
            data_source_tag: outcome.result.data_source.to_string(),
            raw_query_descriptions,
            suggestion: intent.suggestion.clone(),
            intent,
            route: outcome.route,
            trace: outcome.trace,
            processing_time_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live_fetcher::{LiveCategory, LiveFilters};
    use crate::table::Table;
    use async_trait::async_trait;

    struct NoLiveData;

    #[async_trait]
    impl LiveDataSource for NoLiveData {
        async fn fetch_category(&self, _category: LiveCategory, _filters: &LiveFilters) -> Table {
            Table::default()
        }
    }

    #[tokio::test]
    async fn test_missing_store_still_answers() {
        let inventory = Inventory::from_csv_str(
            "dataset_id,dataset_title,publisher,resource_url\nagri-1,Crop production,MoA,https://example.org/a1\n",
        )
        .unwrap();
        let assistant = QaAssistant::from_parts(
            Arc::new(inventory),
            Arc::new(NoLiveData),
            LocalStore::new("/nonexistent/dir/canonical.sqlite"),
            "https://data.gov.in",
        );

        let response = assistant.resolve("Compare rice production in Punjab and Maharashtra").await;
        assert_eq!(response.data_source_tag, "fallback-guidance");
        assert!(response.structured_results.is_empty());
        assert!(!response.answer_text.is_empty());
        assert_eq!(response.citations.len(), 1);
        assert!(chrono::DateTime::parse_from_rfc3339(&response.timestamp).is_ok());
        assert_eq!(Uuid::parse_str(&response.request_id).unwrap().get_version_num(), 4);
    }
}
