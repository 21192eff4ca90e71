//! Citations for the datasets behind an answer

use crate::inventory::{DatasetCategory, SourceDescriptor};
use reqwest::Url;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessStatus {
    /// Rows come straight from the live catalog API
    LiveApi,
    /// Follow the portal search link to find the dataset
    SearchPortal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub url: String,
    pub publisher: String,
    pub usage_note: String,
    pub search_url: String,
    pub access_status: AccessStatus,
}

impl Citation {
    pub fn from_source(source: &SourceDescriptor, portal_url: &str) -> Self {
        let access_status = if source.category == DatasetCategory::Live {
            AccessStatus::LiveApi
        } else {
            AccessStatus::SearchPortal
        };
        Self {
            title: source.title.clone(),
            url: source.resource_url.clone(),
            publisher: source.publisher.clone(),
            usage_note: format!(
                "Used {} table for {} level data",
                source.table_name, source.geo_granularity
            ),
            search_url: search_url(portal_url, &source.title),
            access_status,
        }
    }

    /// Citation attached to illustrative (mock) price rows.
    pub fn illustrative_prices(portal_url: &str) -> Self {
        Self {
            title: "Illustrative market price table".to_string(),
            url: portal_url.to_string(),
            publisher: "Built-in sample values".to_string(),
            usage_note: "Sample prices shown because live market data was unavailable".to_string(),
            search_url: search_url(portal_url, "mandi prices"),
            access_status: AccessStatus::SearchPortal,
        }
    }
}

/// One citation per selected source, in selection order.
pub fn build_citations(sources: &[SourceDescriptor], portal_url: &str) -> Vec<Citation> {
    sources
        .iter()
        .map(|source| Citation::from_source(source, portal_url))
        .collect()
}

/// `{portal}/search?title=<encoded title>`; the bare portal URL if it does not parse.
pub fn search_url(portal_url: &str, title: &str) -> String {
    let base = format!("{}/search", portal_url.trim_end_matches('/'));
    Url::parse_with_params(&base, &[("title", title)])
        .map(|url| url.to_string())
        .unwrap_or_else(|_| portal_url.to_string())
}
