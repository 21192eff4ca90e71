//! Shared fixture: a small canonical store and inventory in a temp directory.

#![allow(dead_code)]

use agriclimate_qa::execution::LocalStore;
use agriclimate_qa::inventory::Inventory;
use agriclimate_qa::live_fetcher::{LiveCategory, LiveDataSource, LiveFilters};
use agriclimate_qa::{EngineConfig, QaAssistant, Table};
use async_trait::async_trait;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const INVENTORY_CSV: &str = "\
dataset_id,dataset_title,publisher,resource_url,resource_format,geo_granularity,temporal_granularity,available_years,fields_summary,access_notes
agri-1,District-wise crop production,Ministry of Agriculture,https://example.org/agri-1,csv,district,annual,1997-2015,\"state, district, crop, year, production\",open data
agri-2,State-wise area and production,Directorate of Economics and Statistics,https://example.org/agri-2,csv,state,annual,2001-2014,\"state, crop, year, area, production\",open data
climate-1,Sub-divisional monthly rainfall,India Meteorological Department,https://example.org/climate-1,csv,state,monthly,1901-2017,\"subdivision, year, annual\",open data
climate-2,Gridded daily temperature,India Meteorological Department,https://example.org/climate-2,binary,gridded,daily,1951-2020,\"lat, lon, date\",requires registration
live-1,Daily mandi prices,Agmarknet,https://example.org/live-1,json,district,daily,,\"state, commodity, modal_price\",live api
";

const STORE_SQL: &str = "
CREATE TABLE agri_production (state TEXT, district TEXT, year INTEGER, crop TEXT,
    production_tonnes REAL, area_hectares REAL, yield_kg_per_ha REAL);
CREATE TABLE climate_obs (state TEXT, district TEXT, year INTEGER,
    rainfall_mm REAL, temperature_avg REAL);
INSERT INTO agri_production VALUES
    ('Punjab', 'Ludhiana', 2013, 'Rice', 1000, 300, 3300),
    ('Punjab', 'Ludhiana', 2014, 'Rice', 1200, 300, 4000),
    ('Punjab', 'Ludhiana', 2015, 'Rice', 1400, 300, 4600),
    ('Punjab', 'Ludhiana', 2014, 'Wheat', 1600, 400, 4000),
    ('Maharashtra', 'Pune', 2013, 'Rice', 400, 200, 2000),
    ('Maharashtra', 'Pune', 2014, 'Rice', 500, 200, 2500),
    ('Maharashtra', 'Pune', 2015, 'Rice', 600, 200, 3000),
    ('Kerala', 'Thrissur', 2015, 'Rice', 300, 150, 2000);
INSERT INTO climate_obs VALUES
    ('Punjab', 'Ludhiana', 2013, 600, 24.0),
    ('Punjab', 'Ludhiana', 2014, 650, 24.5),
    ('Punjab', 'Ludhiana', 2015, 700, 25.0),
    ('Maharashtra', 'Pune', 2013, 1100, 26.0),
    ('Maharashtra', 'Pune', 2014, 1000, 26.5),
    ('Maharashtra', 'Pune', 2015, 900, 27.0),
    ('Kerala', 'Thrissur', 2015, 3000, 28.0);
";

pub struct Fixture {
    pub dir: TempDir,
    pub db_path: PathBuf,
    pub inventory_path: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("canonical.sqlite");
        let conn = Connection::open(&db_path).unwrap();
        conn.execute_batch(STORE_SQL).unwrap();

        let inventory_path = dir.path().join("data_inventory.csv");
        std::fs::write(&inventory_path, INVENTORY_CSV).unwrap();

        Self {
            dir,
            db_path,
            inventory_path,
        }
    }

    /// Configuration without an API key: the real fetcher degrades to empty relations.
    pub fn config(&self) -> EngineConfig {
        EngineConfig {
            db_path: self.db_path.clone(),
            inventory_path: self.inventory_path.clone(),
            ..EngineConfig::default()
        }
    }

    pub fn assistant_with(&self, live: Arc<dyn LiveDataSource>) -> QaAssistant {
        let inventory = Inventory::load(&self.inventory_path).unwrap();
        QaAssistant::from_parts(
            Arc::new(inventory),
            live,
            LocalStore::new(self.db_path.clone()),
            "https://data.gov.in",
        )
    }
}

/// In-memory live source keyed by accessor category.
#[derive(Default)]
pub struct StubLive {
    pub tables: HashMap<LiveCategory, Table>,
    pub calls: Mutex<Vec<LiveCategory>>,
}

impl StubLive {
    pub fn with(category: LiveCategory, table: Table) -> Self {
        let mut stub = Self::default();
        stub.tables.insert(category, table);
        stub
    }
}

#[async_trait]
impl LiveDataSource for StubLive {
    async fn fetch_category(&self, category: LiveCategory, _filters: &LiveFilters) -> Table {
        self.calls.lock().unwrap().push(category);
        self.tables.get(&category).cloned().unwrap_or_default()
    }
}

pub fn table(value: serde_json::Value) -> Table {
    let rows = value
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row.as_object().cloned().unwrap())
        .collect();
    Table::from_rows(rows)
}
