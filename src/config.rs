//! Engine configuration read from the process environment.

use crate::error::{QaError, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DB_PATH: &str = "db/canonical.sqlite";
pub const DEFAULT_INVENTORY_PATH: &str = "data/data_inventory.csv";
pub const DEFAULT_API_BASE_URL: &str = "https://api.data.gov.in/resource";
pub const DEFAULT_PORTAL_URL: &str = "https://data.gov.in";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Canonical analytical store (SQLite file holding agri_production and climate_obs)
    pub db_path: PathBuf,

    /// Static dataset inventory CSV
    pub inventory_path: PathBuf,

    /// Access token for the remote catalog API; live fetching is disabled without it
    pub api_key: Option<String>,

    pub api_base_url: String,

    /// Fixed per-call timeout for remote requests
    pub api_timeout_secs: u64,

    /// Row limit sent with every remote request
    pub fetch_limit: usize,

    /// Open-data portal used to build citation search links
    pub portal_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            inventory_path: PathBuf::from(DEFAULT_INVENTORY_PATH),
            api_key: None,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_timeout_secs: 30,
            fetch_limit: 100,
            portal_url: DEFAULT_PORTAL_URL.to_string(),
        }
    }
}

impl EngineConfig {
    /// Build the configuration from environment variables.
    ///
    /// Call `dotenv::dotenv()` first if a `.env` file should be honoured.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_timeout_secs = match non_empty("LIVE_API_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|e| QaError::Config(format!("LIVE_API_TIMEOUT_SECS '{}': {}", raw, e)))?,
            None => defaults.api_timeout_secs,
        };
        let fetch_limit = match non_empty("LIVE_FETCH_LIMIT") {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|e| QaError::Config(format!("LIVE_FETCH_LIMIT '{}': {}", raw, e)))?,
            None => defaults.fetch_limit,
        };

        Ok(Self {
            db_path: non_empty("DB_PATH").map(PathBuf::from).unwrap_or(defaults.db_path),
            inventory_path: non_empty("INVENTORY_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.inventory_path),
            api_key: non_empty("GOV_API_KEY"),
            api_base_url: non_empty("LIVE_API_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base_url),
            api_timeout_secs,
            fetch_limit,
            portal_url: non_empty("DATA_PORTAL_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.portal_url),
        })
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}
