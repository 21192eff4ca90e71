//! Live Data Fetcher
//!
//! Calls the remote open-data catalog per resource identifier and normalizes
//! whatever comes back into the canonical column names. Every failure
//! (missing key, network, non-2xx, unparsable payload) degrades to an empty
//! relation and a warning.

use crate::config::EngineConfig;
use crate::error::{QaError, Result};
use crate::table::{Row, Table};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{debug, info, warn};

lazy_static! {
    static ref DATE_YEAR_RE: Regex = Regex::new(r"\b(?:19|20)\d{2}\b").unwrap();
}

/// Provider field name -> canonical column. Applied in order; a rename never
/// replaces a column that is already present.
const COLUMN_ALIASES: &[(&str, &str)] = &[
    ("state_name", "state"),
    ("subdivision", "state"),
    ("district_name", "district"),
    ("commodity", "crop"),
    ("modal_price", "price_per_quintal"),
    ("crop_year", "year"),
    ("area", "area_hectares"),
    ("production", "production_tonnes"),
    ("annual", "rainfall_mm"),
    ("rainfall", "rainfall_mm"),
    ("arrival_date", "date"),
];

const NUMERIC_COLUMNS: &[&str] = &[
    "price_per_quintal",
    "min_price",
    "max_price",
    "production_tonnes",
    "area_hectares",
    "rainfall_mm",
    "year",
];

/// A remote resource and the provider fields its filters apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogResource {
    pub resource_id: &'static str,
    pub state_field: Option<&'static str>,
    pub crop_field: Option<&'static str>,
}

const MARKET_PRICE_RESOURCE: CatalogResource = CatalogResource {
    resource_id: "9ef84268-d588-465a-a308-a864a43d0070",
    state_field: Some("state"),
    crop_field: Some("commodity"),
};

const AGRICULTURE_RESOURCES: &[CatalogResource] = &[CatalogResource {
    resource_id: "3b01bcb8-0b14-4abf-b6f2-c1bfd384ba69",
    state_field: Some("state_name"),
    crop_field: Some("crop"),
}];

const MARKET_PRICE_RESOURCES: &[CatalogResource] = &[MARKET_PRICE_RESOURCE];

const RAINFALL_RESOURCES: &[CatalogResource] = &[
    CatalogResource {
        resource_id: "88f07c0b-e66b-4b8e-9c2e-4d0d8c6e8c8e",
        state_field: Some("state"),
        crop_field: None,
    },
    CatalogResource {
        resource_id: "01c563b6-31a3-4f3e-9c8e-7e8e8e8e8e8e",
        state_field: Some("state"),
        crop_field: None,
    },
    MARKET_PRICE_RESOURCE,
];

/// Families of live data, each backed by an ordered list of resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveCategory {
    Agriculture,
    MarketPrices,
    Rainfall,
}

impl LiveCategory {
    pub fn resources(&self) -> &'static [CatalogResource] {
        match self {
            LiveCategory::Agriculture => AGRICULTURE_RESOURCES,
            LiveCategory::MarketPrices => MARKET_PRICE_RESOURCES,
            LiveCategory::Rainfall => RAINFALL_RESOURCES,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LiveCategory::Agriculture => "agriculture",
            LiveCategory::MarketPrices => "market_prices",
            LiveCategory::Rainfall => "rainfall",
        }
    }
}

impl fmt::Display for LiveCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveFilters {
    pub states: Vec<String>,
    pub crops: Vec<String>,
}

impl LiveFilters {
    /// Query parameters for one resource; filters the resource has no field for are dropped.
    fn params_for(&self, resource: &CatalogResource) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let (Some(field), false) = (resource.state_field, self.states.is_empty()) {
            params.push((format!("filters[{}]", field), self.states.join(",")));
        }
        if let (Some(field), false) = (resource.crop_field, self.crops.is_empty()) {
            params.push((format!("filters[{}]", field), self.crops.join(",")));
        }
        params
    }
}

/// Source of live relations. Accessors never fail; no data is an empty table.
#[async_trait]
pub trait LiveDataSource: Send + Sync {
    async fn fetch_category(&self, category: LiveCategory, filters: &LiveFilters) -> Table;

    async fn agriculture_data(&self, filters: &LiveFilters) -> Table {
        self.fetch_category(LiveCategory::Agriculture, filters).await
    }

    async fn market_prices(&self, filters: &LiveFilters) -> Table {
        self.fetch_category(LiveCategory::MarketPrices, filters).await
    }

    async fn rainfall_data(&self, filters: &LiveFilters) -> Table {
        self.fetch_category(LiveCategory::Rainfall, filters).await
    }
}

/// HTTP client for the remote catalog API.
pub struct LiveDataFetcher {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    limit: usize,
}

impl LiveDataFetcher {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.api_timeout()).build()?;
        if config.api_key.is_none() {
            warn!("GOV_API_KEY not set, live data fetching is disabled");
        }
        Ok(Self {
            client,
            base_url: config.api_base_url.clone(),
            api_key: config.api_key.clone(),
            limit: config.fetch_limit,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// Fetch one resource; any failure yields an empty relation.
    pub async fn fetch(&self, resource_id: &str, filters: &[(String, String)], limit: usize) -> Table {
        match self.try_fetch(resource_id, filters, limit).await {
            Ok(table) => {
                info!("Fetched {} rows from resource {}", table.len(), resource_id);
                table
            }
            Err(e) => {
                warn!("Live fetch of {} failed: {}", resource_id, e);
                Table::default()
            }
        }
    }

    async fn try_fetch(&self, resource_id: &str, filters: &[(String, String)], limit: usize) -> Result<Table> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| QaError::Remote("no API key configured".to_string()))?;

        let url = format!("{}/{}", self.base_url, resource_id);
        let mut query: Vec<(String, String)> = vec![
            ("api-key".to_string(), api_key.to_string()),
            ("format".to_string(), "json".to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        query.extend(filters.iter().cloned());
        debug!("GET {} filters={:?}", url, filters);

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| QaError::Remote(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(QaError::Remote(format!("status {}", status)));
        }
        let body = response
            .text()
            .await
            .map_err(|e| QaError::Remote(format!("failed to read body: {}", e)))?;

        Ok(standardize(parse_payload(&body)?))
    }
}

#[async_trait]
impl LiveDataSource for LiveDataFetcher {
    /// First resource returning rows wins; results are never merged.
    async fn fetch_category(&self, category: LiveCategory, filters: &LiveFilters) -> Table {
        if !self.is_enabled() {
            return Table::default();
        }
        for resource in category.resources() {
            let table = self
                .fetch(resource.resource_id, &filters.params_for(resource), self.limit)
                .await;
            if !table.is_empty() {
                return table;
            }
        }
        Table::default()
    }
}

/// Parse a JSON (`records` list, bare list, single object) or CSV payload.
pub fn parse_payload(body: &str) -> Result<Table> {
    let trimmed = body.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        let value: Value = serde_json::from_str(trimmed)?;
        let rows: Vec<Row> = match value {
            Value::Object(mut object) => match object.remove("records") {
                Some(Value::Array(records)) => object_rows(records),
                _ => vec![object],
            },
            Value::Array(items) => object_rows(items),
            _ => Vec::new(),
        };
        return Ok(Table::from_rows(rows));
    }
    parse_csv(trimmed)
}

fn object_rows(items: Vec<Value>) -> Vec<Row> {
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(row) => Some(row),
            _ => None,
        })
        .collect()
}

fn parse_csv(body: &str) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(body.as_bytes());
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.len() < 2 {
        return Err(QaError::Remote("payload is neither JSON nor CSV".to_string()));
    }

    let mut table = Table::new(headers.clone());
    for record in reader.records() {
        let record = record?;
        let row: Row = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), Value::String(v.to_string())))
            .collect();
        table.rows.push(row);
    }
    Ok(table)
}

/// Rename provider columns to the canonical schema, coerce numeric columns
/// and derive `year` from `date` when needed.
pub fn standardize(table: Table) -> Table {
    let mut table = lowercase_headers(table);

    for (from, to) in COLUMN_ALIASES {
        table.rename_column(from, to);
    }

    for column in NUMERIC_COLUMNS {
        if table.has_column(column) {
            for row in table.rows.iter_mut() {
                if let Some(value) = row.get_mut(*column) {
                    *value = coerce_number(value, *column == "year");
                }
            }
        }
    }

    if table.has_column("date") && !table.has_column("year") {
        for row in table.rows.iter_mut() {
            let year = row
                .get("date")
                .and_then(Value::as_str)
                .and_then(|date| DATE_YEAR_RE.find(date))
                .and_then(|m| m.as_str().parse::<i64>().ok())
                .map(Value::from)
                .unwrap_or(Value::Null);
            row.insert("year".to_string(), year);
        }
        table.columns.push("year".to_string());
    }
    table
}

fn lowercase_headers(table: Table) -> Table {
    let mut columns: Vec<String> = Vec::new();
    for column in &table.columns {
        let key = column.trim().to_lowercase();
        if !columns.contains(&key) {
            columns.push(key);
        }
    }
    let rows = table
        .rows
        .into_iter()
        .map(|row| {
            let mut out = Row::new();
            for (key, value) in row {
                out.entry(key.trim().to_lowercase()).or_insert(value);
            }
            out
        })
        .collect();
    Table { columns, rows }
}

/// Unparsable values become null rather than failing the transform.
fn coerce_number(value: &Value, integral: bool) -> Value {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(f) if integral && f.fract() == 0.0 => Value::from(f as i64),
        Some(f) => serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_records_payload() {
        let table = parse_payload(r#"{"total": 2, "records": [{"state": "Punjab"}, {"state": "Bihar"}]}"#).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.columns, vec!["state"]);
    }

    #[test]
    fn test_parse_list_and_object_payloads() {
        assert_eq!(parse_payload(r#"[{"a": 1}, {"a": 2}, 3]"#).unwrap().len(), 2);
        let single = parse_payload(r#"{"state": "Goa", "annual": "3000"}"#).unwrap();
        assert_eq!(single.len(), 1);
    }

    #[test]
    fn test_parse_csv_payload() {
        let table = parse_payload("State_Name,Crop,Production\nPunjab,Rice,\"1,200\"\nBihar,Wheat,abc\n").unwrap();
        assert_eq!(table.len(), 2);
        let table = standardize(table);
        assert_eq!(table.value(0, "state"), Some(&json!("Punjab")));
        assert_eq!(table.value(0, "production_tonnes"), Some(&json!(1200.0)));
        assert_eq!(table.value(1, "production_tonnes"), Some(&Value::Null));
    }

    #[test]
    fn test_garbage_payload_is_error() {
        assert!(parse_payload("<html>Service Unavailable</html>").is_err());
        assert!(parse_payload("{not json").is_err());
    }

    #[test]
    fn test_standardize_market_prices() {
        let table = parse_payload(
            r#"{"records": [{"State": "Punjab", "Commodity": "Wheat", "Modal_Price": "2150",
                             "Min_Price": "2000", "Arrival_Date": "15/01/2024"}]}"#,
        )
        .unwrap();
        let table = standardize(table);
        assert_eq!(table.value(0, "crop"), Some(&json!("Wheat")));
        assert_eq!(table.value(0, "price_per_quintal"), Some(&json!(2150.0)));
        assert_eq!(table.value(0, "min_price"), Some(&json!(2000.0)));
        assert_eq!(table.value(0, "year"), Some(&json!(2024)));
        assert!(table.is_numeric_column("price_per_quintal"));
    }

    #[test]
    fn test_rename_does_not_overwrite() {
        let table = Table::from_rows(vec![json!({"state": "Kerala", "subdivision": "Coastal Karnataka"})
            .as_object()
            .cloned()
            .unwrap()]);
        let table = standardize(table);
        assert_eq!(table.value(0, "state"), Some(&json!("Kerala")));
        assert!(table.has_column("subdivision"));
    }

    #[test]
    fn test_filter_params() {
        let filters = LiveFilters {
            states: vec!["Punjab".to_string(), "Haryana".to_string()],
            crops: vec!["Wheat".to_string()],
        };
        let params = filters.params_for(&MARKET_PRICE_RESOURCE);
        assert_eq!(
            params,
            vec![
                ("filters[state]".to_string(), "Punjab,Haryana".to_string()),
                ("filters[commodity]".to_string(), "Wheat".to_string()),
            ]
        );
        assert_eq!(filters.params_for(&RAINFALL_RESOURCES[0]).len(), 1);
    }

    #[tokio::test]
    async fn test_missing_key_yields_empty_relation() {
        let fetcher = LiveDataFetcher::new(&EngineConfig::default()).unwrap();
        assert!(!fetcher.is_enabled());
        assert!(fetcher.market_prices(&LiveFilters::default()).await.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_api_yields_empty_relation() {
        let config = EngineConfig {
            api_key: Some("test-key".to_string()),
            api_base_url: "http://127.0.0.1:9/resource".to_string(),
            api_timeout_secs: 2,
            ..EngineConfig::default()
        };
        let fetcher = LiveDataFetcher::new(&config).unwrap();
        let table = fetcher.fetch("9ef84268-d588-465a-a308-a864a43d0070", &[], 10).await;
        assert!(table.is_empty());
    }
}
