//! Static dataset inventory
//!
//! The inventory is a CSV file listing every dataset the engine knows about.
//! It is loaded once at startup and shared read-only between requests.

use crate::error::{QaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::info;

/// Geographic resolution of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoGranularity {
    District,
    State,
    Block,
    Village,
    Gridded,
    Unknown,
}

impl GeoGranularity {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "district" => GeoGranularity::District,
            "state" => GeoGranularity::State,
            "block" => GeoGranularity::Block,
            "village" => GeoGranularity::Village,
            "gridded" | "grid" => GeoGranularity::Gridded,
            _ => GeoGranularity::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GeoGranularity::District => "district",
            GeoGranularity::State => "state",
            GeoGranularity::Block => "block",
            GeoGranularity::Village => "village",
            GeoGranularity::Gridded => "gridded",
            GeoGranularity::Unknown => "unknown",
        }
    }
}

impl fmt::Display for GeoGranularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dataset family, derived from the dataset id prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetCategory {
    Agriculture,
    Climate,
    Live,
    Other,
}

impl DatasetCategory {
    pub fn from_dataset_id(dataset_id: &str) -> Self {
        let id = dataset_id.to_lowercase();
        if id.starts_with("agri") {
            DatasetCategory::Agriculture
        } else if id.starts_with("climate") {
            DatasetCategory::Climate
        } else if id.starts_with("live") {
            DatasetCategory::Live
        } else {
            DatasetCategory::Other
        }
    }

    fn table_prefix(&self) -> &'static str {
        match self {
            DatasetCategory::Agriculture => "agri",
            DatasetCategory::Climate => "climate",
            DatasetCategory::Live => "live",
            DatasetCategory::Other => "other",
        }
    }
}

/// One row of the inventory CSV.
#[derive(Debug, Clone, Deserialize)]
struct InventoryRecord {
    dataset_id: String,
    dataset_title: String,
    publisher: String,
    resource_url: String,
    #[serde(default)]
    resource_format: String,
    #[serde(default)]
    geo_granularity: String,
    #[serde(default)]
    temporal_granularity: String,
    #[serde(default)]
    available_years: String,
    #[serde(default)]
    fields_summary: String,
    #[serde(default)]
    access_notes: String,
}

/// A dataset the engine can cite and query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub dataset_id: String,
    pub title: String,
    pub publisher: String,
    pub resource_url: String,
    pub resource_format: String,
    pub geo_granularity: GeoGranularity,
    pub temporal_granularity: String,
    /// Inclusive first/last year, when the inventory states a range
    pub available_years: Option<(i32, i32)>,
    pub fields_summary: String,
    pub access_notes: String,
    pub category: DatasetCategory,
    /// Canonical table name derived from the dataset id
    pub table_name: String,
    /// 1 = best match; assigned by the source selector
    pub priority: u8,
}

impl SourceDescriptor {
    fn from_record(record: InventoryRecord) -> Self {
        let category = DatasetCategory::from_dataset_id(&record.dataset_id);
        let table_name = format!(
            "{}_{}",
            category.table_prefix(),
            record.dataset_id.replace('-', "_")
        );
        Self {
            available_years: parse_year_range(&record.available_years),
            geo_granularity: GeoGranularity::parse(&record.geo_granularity),
            dataset_id: record.dataset_id,
            title: record.dataset_title,
            publisher: record.publisher,
            resource_url: record.resource_url,
            resource_format: record.resource_format,
            temporal_granularity: record.temporal_granularity,
            fields_summary: record.fields_summary,
            access_notes: record.access_notes,
            category,
            table_name,
            priority: 3,
        }
    }

    /// Access requires registration or approval with the publisher.
    pub fn is_registration_gated(&self) -> bool {
        let notes = self.access_notes.to_lowercase();
        notes.contains("registration")
    }
}

/// Parse "2010-2014", "2010 to 2014" or a single "2012".
fn parse_year_range(raw: &str) -> Option<(i32, i32)> {
    let years: Vec<i32> = raw
        .split(|c: char| !c.is_ascii_digit())
        .filter(|part| part.len() == 4)
        .filter_map(|part| part.parse().ok())
        .collect();
    match years.as_slice() {
        [] => None,
        [single] => Some((*single, *single)),
        [first, .., last] => Some((*first.min(last), *first.max(last))),
    }
}

#[derive(Debug, Clone, Default)]
pub struct Inventory {
    sources: Vec<SourceDescriptor>,
}

impl Inventory {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| QaError::Inventory(format!("Failed to open {}: {}", path.display(), e)))?;
        let inventory = Self::from_reader(reader)?;
        info!("Loaded {} datasets from {}", inventory.len(), path.display());
        Ok(inventory)
    }

    pub fn from_csv_str(text: &str) -> Result<Self> {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());
        Self::from_reader(reader)
    }

    fn from_reader<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Self> {
        let mut sources = Vec::new();
        for record in reader.deserialize::<InventoryRecord>() {
            sources.push(SourceDescriptor::from_record(record?));
        }
        Ok(Self { sources })
    }

    pub fn from_sources(sources: Vec<SourceDescriptor>) -> Self {
        Self { sources }
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    pub fn by_category(&self, category: DatasetCategory) -> impl Iterator<Item = &SourceDescriptor> {
        self.sources.iter().filter(move |s| s.category == category)
    }

    pub fn get(&self, dataset_id: &str) -> Option<&SourceDescriptor> {
        self.sources.iter().find(|s| s.dataset_id == dataset_id)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
dataset_id,dataset_title,publisher,resource_url,resource_format,geo_granularity,temporal_granularity,available_years,fields_summary,access_notes
agri-1,District-wise crop production,Ministry of Agriculture,https://example.org/agri1.csv,csv,district,annual,1997-2015,state;district;crop,open
climate-2,Gridded rainfall,IMD,https://example.org/grid,nc,gridded,daily,1901-2020,rainfall,Requires registration with IMD
live-1,Daily mandi prices,Agmarknet,https://example.org/live,json,district,daily,,commodity;modal_price,live api
";

    #[test]
    fn test_load_from_csv() {
        let inventory = Inventory::from_csv_str(CSV).unwrap();
        assert_eq!(inventory.len(), 3);

        let agri = inventory.get("agri-1").unwrap();
        assert_eq!(agri.category, DatasetCategory::Agriculture);
        assert_eq!(agri.geo_granularity, GeoGranularity::District);
        assert_eq!(agri.table_name, "agri_agri_1");
        assert_eq!(agri.available_years, Some((1997, 2015)));

        let live = inventory.get("live-1").unwrap();
        assert_eq!(live.available_years, None);
        assert_eq!(inventory.by_category(DatasetCategory::Live).count(), 1);
    }

    #[test]
    fn test_registration_gate() {
        let inventory = Inventory::from_csv_str(CSV).unwrap();
        assert!(inventory.get("climate-2").unwrap().is_registration_gated());
        assert!(!inventory.get("agri-1").unwrap().is_registration_gated());
    }

    #[test]
    fn test_year_range_parsing() {
        assert_eq!(parse_year_range("2014 to 2010"), Some((2010, 2014)));
        assert_eq!(parse_year_range("2012"), Some((2012, 2012)));
        assert_eq!(parse_year_range("n/a"), None);
    }

    #[test]
    fn test_missing_file_is_inventory_error() {
        let err = Inventory::load("/nonexistent/inventory.csv").unwrap_err();
        assert!(matches!(err, QaError::Inventory(_)));
    }
}
