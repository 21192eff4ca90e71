mod common;

use agriclimate_qa::cascade::{CascadeState, Route};
use agriclimate_qa::citation::AccessStatus;
use agriclimate_qa::live_fetcher::LiveCategory;
use agriclimate_qa::{QaAssistant, QueryType, ResolutionIssue};
use common::{table, Fixture, StubLive};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_state_comparison_end_to_end() {
    let fixture = Fixture::new();
    let assistant = fixture.assistant_with(Arc::new(StubLive::default()));

    let response = assistant
        .resolve("Compare rice production in Punjab and Maharashtra")
        .await;

    assert_eq!(response.intent.query_type, QueryType::Comparison);
    assert_eq!(response.route, Route::LocalFirst);
    assert_eq!(response.data_source_tag, "local");
    assert_eq!(response.structured_results.len(), 2);
    assert_eq!(response.structured_results[0]["state"], json!("Punjab"));
    assert_eq!(response.structured_results[0]["avg_value"], json!(1200.0));
    assert!(response.answer_text.contains("Punjab is highest"));
    assert!(response.raw_query_descriptions[0].contains("agri_production"));

    assert!(!response.citations.is_empty() && response.citations.len() <= 3);
    assert!(response
        .citations
        .iter()
        .all(|c| c.access_status == AccessStatus::SearchPortal));
    assert_eq!(response.citations[0].title, "District-wise crop production");
}

#[tokio::test]
async fn test_production_and_rainfall_comparison_end_to_end() {
    let fixture = Fixture::new();
    let assistant = fixture.assistant_with(Arc::new(StubLive::default()));

    let response = assistant
        .resolve("Compare rice production and rainfall in Punjab and Maharashtra")
        .await;

    assert_eq!(response.data_source_tag, "local");
    assert_eq!(response.columns, vec!["state", "year", "avg_production", "avg_rainfall"]);
    assert_eq!(response.structured_results.len(), 6);
    assert_eq!(response.structured_results[0]["state"], json!("Maharashtra"));
    assert_eq!(response.structured_results[0]["year"], json!(2013));
    assert!(response
        .answer_text
        .contains("- Punjab (2014): production 1200, rainfall 650"));
}

#[tokio::test]
async fn test_phrasal_up_does_not_filter_by_state() {
    let fixture = Fixture::new();
    let assistant = fixture.assistant_with(Arc::new(StubLive::default()));

    let response = assistant.resolve("sum up the total rice production").await;

    assert!(response.intent.states.is_empty());
    assert_eq!(response.data_source_tag, "local");
    assert_eq!(response.structured_results.len(), 1);
    assert_eq!(response.structured_results[0]["sum_value"], json!(5400.0));
}

#[tokio::test]
async fn test_price_question_without_api_key_serves_mock_prices() {
    let fixture = Fixture::new();
    let assistant = QaAssistant::new(&fixture.config()).unwrap();
    assert!(!assistant.live_enabled());

    let response = assistant
        .resolve("What are today's mandi prices for wheat in Punjab?")
        .await;

    assert_eq!(response.intent.query_type, QueryType::Current);
    assert_eq!(response.route, Route::LiveFirst);
    assert_eq!(response.data_source_tag, "mock_data");
    assert_eq!(response.structured_results.len(), 1);
    assert_eq!(response.structured_results[0]["crop"], json!("Wheat"));
    assert_eq!(response.structured_results[0]["price_per_quintal"], json!(2000.0));
    assert_eq!(response.citations.len(), 1);
    assert_eq!(response.citations[0].title, "Illustrative market price table");

    let local = response
        .trace
        .iter()
        .find(|step| step.state == CascadeState::LocalAttempt)
        .unwrap();
    assert!(matches!(local.issue, Some(ResolutionIssue::QueryExecutionError(_))));
    assert_eq!(
        response.trace.last().map(|step| step.state),
        Some(CascadeState::TerminalSynthetic)
    );
}

#[tokio::test]
async fn test_live_prices_win_over_mock() {
    let fixture = Fixture::new();
    let prices = table(json!([
        {"state": "Punjab", "crop": "Wheat", "price_per_quintal": 2100.0},
        {"state": "Punjab", "crop": "Wheat", "price_per_quintal": 2300.0},
    ]));
    let assistant = fixture.assistant_with(Arc::new(StubLive::with(LiveCategory::MarketPrices, prices)));

    let response = assistant
        .resolve("What are today's mandi prices for wheat in Punjab?")
        .await;

    assert_eq!(response.data_source_tag, "live_api");
    assert_eq!(response.structured_results.len(), 1);
    assert_eq!(response.structured_results[0]["avg_value"], json!(2200.0));
    assert!(response.raw_query_descriptions[0].contains("market_prices"));
}

#[tokio::test]
async fn test_failed_comparison_falls_through_to_sample_tier() {
    let fixture = Fixture::new();
    let assistant = fixture.assistant_with(Arc::new(StubLive::default()));

    let response = assistant.resolve("compare cotton in gujarat").await;

    assert_eq!(response.data_source_tag, "fallback-sample");
    assert_eq!(response.structured_results.len(), 8);
    assert!(response.answer_text.contains("closest records"));
    assert!(response.suggestion.is_some());

    let states: Vec<CascadeState> = response.trace.iter().map(|step| step.state).collect();
    assert!(states.contains(&CascadeState::FallbackTier1));
    assert!(states.contains(&CascadeState::FallbackTier2));
    assert_eq!(states.last(), Some(&CascadeState::TerminalSuccess));
    let tier1 = response
        .trace
        .iter()
        .find(|step| step.state == CascadeState::FallbackTier1)
        .unwrap();
    assert_eq!(tier1.issue, Some(ResolutionIssue::QueryEmpty));
}

#[tokio::test]
async fn test_correlation_reports_coefficient() {
    let fixture = Fixture::new();
    let assistant = fixture.assistant_with(Arc::new(StubLive::default()));

    let response = assistant
        .resolve("What is the impact of rainfall on rice production?")
        .await;

    assert_eq!(response.intent.query_type, QueryType::Correlation);
    assert_eq!(response.data_source_tag, "local");
    assert!(response.answer_text.contains("negative"));
    assert!(response.structured_results.len() >= 2);
}

#[tokio::test]
async fn test_every_question_gets_an_answer() {
    let fixture = Fixture::new();
    let assistant = fixture.assistant_with(Arc::new(StubLive::default()));

    for question in [
        "",
        "hello there",
        "average rainfall in Kerala",
        "Which state has the highest rice production?",
        "rice production trend in Maharashtra over the last 2 years",
        "cotton prices in Gujarat",
    ] {
        let response = assistant.resolve(question).await;
        assert!(!response.answer_text.is_empty(), "empty answer for '{}'", question);
        assert!(
            !response.structured_results.is_empty() || response.data_source_tag == "fallback-guidance",
            "no rows for '{}' ({})",
            question,
            response.data_source_tag
        );
        let first = response.trace.first().map(|step| step.state);
        assert_eq!(first, Some(CascadeState::Start));
    }
}

#[tokio::test]
async fn test_response_serializes_contract_fields() {
    let fixture = Fixture::new();
    let assistant = fixture.assistant_with(Arc::new(StubLive::default()));

    let response = assistant.resolve("average rainfall in Kerala").await;
    let value = serde_json::to_value(&response).unwrap();

    for field in [
        "answer_text",
        "structured_results",
        "citations",
        "data_source_tag",
        "raw_query_descriptions",
        "request_id",
        "timestamp",
    ] {
        assert!(value.get(field).is_some(), "missing {}", field);
    }
    assert_eq!(value["structured_results"][0]["avg_value"], json!(3000.0));
    assert_eq!(value["citations"][0]["publisher"], json!("India Meteorological Department"));
}
