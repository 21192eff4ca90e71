//! Query Result - uniform output of every resolver and cascade tier

use crate::error::ResolutionIssue;
use crate::table::Table;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a result's rows came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSource {
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "live_api")]
    LiveApi,
    #[serde(rename = "mock_data")]
    MockData,
    #[serde(rename = "fallback-relaxed")]
    FallbackRelaxed,
    #[serde(rename = "fallback-search")]
    FallbackSearch,
    #[serde(rename = "fallback-sample")]
    FallbackSample,
    #[serde(rename = "fallback-guidance")]
    FallbackGuidance,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Local => "local",
            DataSource::LiveApi => "live_api",
            DataSource::MockData => "mock_data",
            DataSource::FallbackRelaxed => "fallback-relaxed",
            DataSource::FallbackSearch => "fallback-search",
            DataSource::FallbackSample => "fallback-sample",
            DataSource::FallbackGuidance => "fallback-guidance",
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            DataSource::FallbackRelaxed
                | DataSource::FallbackSearch
                | DataSource::FallbackSample
                | DataSource::FallbackGuidance
        )
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Standardized result from a resolver or cascade tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub results: Table,

    /// Metric label, e.g. `production_tonnes`
    pub metric: String,

    /// Human-readable description of what was executed
    pub query: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_used: Option<String>,

    pub data_source: DataSource,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Classified failure kind when `error` is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<ResolutionIssue>,

    /// Scalar statistic such as a correlation coefficient
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistic: Option<f64>,

    /// Message for the caller (disclaimers, guidance)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl QueryResult {
    pub fn success(results: Table, metric: &str, query: impl Into<String>, data_source: DataSource) -> Self {
        Self {
            results,
            metric: metric.to_string(),
            query: query.into(),
            table_used: None,
            data_source,
            error: None,
            issue: None,
            statistic: None,
            message: None,
        }
    }

    /// Labelled failure with an empty relation.
    pub fn failure(issue: ResolutionIssue, metric: &str, query: impl Into<String>, data_source: DataSource) -> Self {
        let error = match &issue {
            ResolutionIssue::QueryExecutionError(msg) => msg.clone(),
            other => other.to_string(),
        };
        Self {
            results: Table::default(),
            metric: metric.to_string(),
            query: query.into(),
            table_used: None,
            data_source,
            error: Some(error),
            issue: Some(issue),
            statistic: None,
            message: None,
        }
    }

    pub fn with_table(mut self, table: &str) -> Self {
        self.table_used = Some(table.to_string());
        self
    }

    pub fn with_statistic(mut self, statistic: Option<f64>) -> Self {
        self.statistic = statistic;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Non-empty and error-free: the cascade stops on the first such result.
    pub fn is_usable(&self) -> bool {
        self.error.is_none() && !self.results.is_empty()
    }

    /// Why this result is not usable, if it is not.
    pub fn failure_kind(&self) -> Option<ResolutionIssue> {
        if let Some(issue) = &self.issue {
            return Some(issue.clone());
        }
        if let Some(error) = &self.error {
            return Some(ResolutionIssue::QueryExecutionError(error.clone()));
        }
        if self.results.is_empty() {
            return Some(ResolutionIssue::QueryEmpty);
        }
        None
    }
}
