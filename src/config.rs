use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::client::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS, normalize_base_url};
use crate::error::CatalogError;
use crate::offline::PrecacheEntry;

pub const CONFIG_FILE: &str = "pending-catalog.json";
pub const BASE_URL_ENV: &str = "PENDING_API_URL";

pub const DEFAULT_REVISION: &str = "0";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub cache_dir: Option<String>,
    #[serde(default)]
    pub precache: Vec<PrecacheConfigEntry>,
    #[serde(default)]
    pub routes: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PrecacheConfigEntry {
    Shorthand(String),
    Detailed(PrecacheEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PrecacheEntryObject {
    pub url: String,
    #[serde(default)]
    pub revision: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub base_url: String,
    pub timeout: Duration,
    pub cache_dir: Option<Utf8PathBuf>,
    pub precache: Vec<PrecacheEntry>,
    pub routes: Vec<String>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `pending-catalog.json` when it exists. Without either,
    /// built-in defaults apply. `PENDING_API_URL` overrides `base_url`.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, CatalogError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE),
        };

        let mut config = if path.is_none() && !config_path.exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| CatalogError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content)
                .map_err(|err| CatalogError::ConfigParse(err.to_string()))?
        };

        if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
            if !base_url.trim().is_empty() {
                config.base_url = Some(base_url);
            }
        }

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, CatalogError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let base_url =
            normalize_base_url(config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL))?;
        let timeout = Duration::from_secs(
            config
                .timeout_secs
                .unwrap_or(DEFAULT_TIMEOUT_SECS)
                .max(1),
        );

        let precache = if config.precache.is_empty() {
            default_precache()
        } else {
            config
                .precache
                .into_iter()
                .map(|entry| match entry {
                    PrecacheConfigEntry::Shorthand(url) => PrecacheEntry {
                        url,
                        revision: DEFAULT_REVISION.to_string(),
                    },
                    PrecacheConfigEntry::Detailed(obj) => PrecacheEntry {
                        url: obj.url,
                        revision: obj.revision.unwrap_or_else(|| DEFAULT_REVISION.to_string()),
                    },
                })
                .collect()
        };

        let routes = if config.routes.is_empty() {
            default_routes()
        } else {
            config.routes
        };
        for pattern in &routes {
            Regex::new(pattern).map_err(|err| CatalogError::InvalidRoute {
                pattern: pattern.clone(),
                message: err.to_string(),
            })?;
        }

        Ok(ResolvedConfig {
            schema_version,
            base_url,
            timeout,
            cache_dir: config.cache_dir.map(Utf8PathBuf::from),
            precache,
            routes,
        })
    }
}

pub fn default_precache() -> Vec<PrecacheEntry> {
    ["/", "/api/list"]
        .into_iter()
        .map(|url| PrecacheEntry {
            url: url.to_string(),
            revision: DEFAULT_REVISION.to_string(),
        })
        .collect()
}

pub fn default_routes() -> Vec<String> {
    vec![r"/[^/]+/metadata$".to_string(), r"/api/list$".to_string()]
}
