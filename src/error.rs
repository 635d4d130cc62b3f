use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CatalogError {
    #[error("invalid API identifier: {0}")]
    InvalidApiIdentifier(String),

    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),

    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("{url} returned status {status}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("API not found in catalog: {0}")]
    ApiNotFound(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid route pattern {pattern}: {message}")]
    InvalidRoute { pattern: String, message: String },

    #[error("{0} is not cached and the network is unavailable")]
    CacheMiss(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl CatalogError {
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            CatalogError::Http { .. } | CatalogError::Status { .. } | CatalogError::Decode { .. }
        )
    }
}
