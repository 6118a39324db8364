// Pipeline settings
// Loaded from --config <path>, or ~/.config/uaplaces/uaplaces.toml when present

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Input and output files, relative to the working directory unless absolute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// The record collection read and rewritten by every step.
    pub data: PathBuf,
    /// KATOTTH classifier export (`;`-separated).
    pub classifier: PathBuf,
    /// KATOTTH → KOATUU comparison table (`;`-separated).
    pub comparison_table: PathBuf,
    /// Place table with OSM ids and postal codes (`,`-separated).
    pub places: PathBuf,
    pub oblast_map: PathBuf,
    pub district_map: PathBuf,
    pub community_map: PathBuf,
    /// Pre-2020 ADMIN_3 community map; supplies codes and geometry the
    /// current community map lacks.
    pub previous_community_map: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            data: PathBuf::from("assets/data/settlements.json"),
            classifier: PathBuf::from("assets/kodifikator/kodifikator.csv"),
            comparison_table: PathBuf::from("assets/kodifikator/Порівняльна таблиця.csv"),
            places: PathBuf::from("assets/ua-name-places.csv"),
            oblast_map: PathBuf::from("assets/maps/ukraine_oblasti.geojson"),
            district_map: PathBuf::from("assets/maps/districts.geojson"),
            community_map: PathBuf::from("assets/maps/communities.geojson"),
            previous_community_map: PathBuf::from("assets/maps/old_maps/ua-2021/ADMIN_3.geojson"),
        }
    }
}

/// Request pacing for every remote source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    /// Pause after every request, successful or not.
    pub pause_ms: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            batch_size: 15,
            max_retries: 2,
            retry_delay_secs: 2,
            pause_ms: 1000,
            timeout_secs: 60,
            user_agent: "UASettlementsBot/1.0".to_string(),
        }
    }
}

impl FetchSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSettings {
    pub overpass: String,
    pub wikidata_sparql: String,
    pub wikidata_api: String,
    pub decentralization: String,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            overpass: "https://overpass-api.de/api/interpreter".to_string(),
            wikidata_sparql: "https://query.wikidata.org/sparql".to_string(),
            wikidata_api: "https://www.wikidata.org/w/api.php".to_string(),
            decentralization: "https://decentralization.ua/graphql".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub paths: PathSettings,
    pub fetch: FetchSettings,
    pub endpoints: EndpointSettings,
}

impl Settings {
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch.batch_size == 0 {
            return Err(ConfigError::Invalid("fetch.batch_size must be at least 1".into()));
        }
        if self.fetch.user_agent.trim().is_empty() {
            return Err(ConfigError::Invalid("fetch.user_agent must not be empty".into()));
        }
        let endpoints = [
            ("endpoints.overpass", &self.endpoints.overpass),
            ("endpoints.wikidata_sparql", &self.endpoints.wikidata_sparql),
            ("endpoints.wikidata_api", &self.endpoints.wikidata_api),
            ("endpoints.decentralization", &self.endpoints.decentralization),
        ];
        for (name, url) in endpoints {
            if url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }

    /// Default settings file location.
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("uaplaces");
        config_dir.join("uaplaces.toml")
    }

    /// Load from `explicit` when given (it must exist), otherwise from the
    /// default location when present, otherwise defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = Self::config_path();
                if !path.exists() {
                    return Ok(Self::default());
                }
                path
            }
        };
        let contents = fs::read_to_string(&path).map_err(|e| ConfigError::Read {
            path: path.clone(),
            message: e.to_string(),
        })?;
        Self::from_toml(&contents)
    }

    /// Commented default file, suitable for `uaplaces config init`.
    pub fn default_toml() -> &'static str {
        r#"# uaplaces settings

[paths]
data = "assets/data/settlements.json"
classifier = "assets/kodifikator/kodifikator.csv"
comparison_table = "assets/kodifikator/Порівняльна таблиця.csv"
places = "assets/ua-name-places.csv"
oblast_map = "assets/maps/ukraine_oblasti.geojson"
district_map = "assets/maps/districts.geojson"
community_map = "assets/maps/communities.geojson"
previous_community_map = "assets/maps/old_maps/ua-2021/ADMIN_3.geojson"

[fetch]
batch_size = 15
max_retries = 2
retry_delay_secs = 2
# Pause after every request
pause_ms = 1000
timeout_secs = 60
user_agent = "UASettlementsBot/1.0"

[endpoints]
overpass = "https://overpass-api.de/api/interpreter"
wikidata_sparql = "https://query.wikidata.org/sparql"
wikidata_api = "https://www.wikidata.org/w/api.php"
decentralization = "https://decentralization.ua/graphql"
"#
    }
}
