use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::domain::ApiIdentifier;
use crate::error::CatalogError;

pub const DEFAULT_BASE_URL: &str = "https://pending.biothings.io";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub trait CatalogClient: Send + Sync {
    /// `GET {base}/api/list`, returned as sent (bare names or route patterns).
    fn fetch_list(&self) -> Result<Vec<String>, CatalogError>;
    fn fetch_metadata(&self, id: &ApiIdentifier) -> Result<Value, CatalogError>;
}

pub trait AssetFetcher: Send + Sync {
    fn fetch_asset(&self, url: &str) -> Result<Vec<u8>, CatalogError>;
}

#[derive(Clone)]
pub struct CatalogHttpClient {
    client: Client,
    base_url: String,
}

impl CatalogHttpClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CatalogError> {
        let base_url = normalize_base_url(base_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("pending-catalog/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CatalogError::InvalidBaseUrl(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| CatalogError::Http {
                url: base_url.clone(),
                message: err.to_string(),
            })?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, url: &str) -> Result<Response, CatalogError> {
        tracing::debug!(url = %url, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| CatalogError::Http {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .ok()
                .filter(|text| !text.trim().is_empty())
                .unwrap_or_else(|| "request failed".to_string());
            return Err(CatalogError::Status {
                url: url.to_string(),
                status,
                message,
            });
        }
        Ok(response)
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, CatalogError> {
        self.get(url)?.json::<T>().map_err(|err| CatalogError::Decode {
            url: url.to_string(),
            message: err.to_string(),
        })
    }
}

impl CatalogClient for CatalogHttpClient {
    fn fetch_list(&self) -> Result<Vec<String>, CatalogError> {
        self.get_json(&join_url(&self.base_url, "/api/list"))
    }

    fn fetch_metadata(&self, id: &ApiIdentifier) -> Result<Value, CatalogError> {
        self.get_json(&join_url(&self.base_url, &format!("/{id}/metadata")))
    }
}

impl AssetFetcher for CatalogHttpClient {
    fn fetch_asset(&self, url: &str) -> Result<Vec<u8>, CatalogError> {
        let url = join_url(&self.base_url, url);
        let bytes = self.get(&url)?.bytes().map_err(|err| CatalogError::Http {
            url: url.clone(),
            message: err.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}

/// Trims a trailing `/` and rejects anything that is not an absolute http(s) URL.
pub fn normalize_base_url(base_url: &str) -> Result<String, CatalogError> {
    let trimmed = base_url.trim().trim_end_matches('/');
    let has_host = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .is_some_and(|host| !host.is_empty());
    if !has_host {
        return Err(CatalogError::InvalidBaseUrl(base_url.to_string()));
    }
    Ok(trimmed.to_string())
}

pub fn join_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base_url.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}
