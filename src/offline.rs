use std::collections::BTreeMap;
use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::client::{AssetFetcher, join_url};
use crate::error::CatalogError;

const MANIFEST_FILE: &str = "manifest.json";
const ENTRIES_DIR: &str = "entries";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecacheEntry {
    pub url: String,
    pub revision: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file: String,
    #[serde(default)]
    pub revision: Option<String>,
    pub cached_at: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    entries: BTreeMap<String, ManifestEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    Navigate,
    Asset,
}

#[derive(Debug, Clone)]
pub struct CacheRequest {
    pub url: String,
    pub mode: RequestMode,
}

impl CacheRequest {
    pub fn asset(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mode: RequestMode::Asset,
        }
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mode: RequestMode::Navigate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheSource {
    Cache,
    Network,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct CacheResponse {
    pub url: String,
    pub source: CacheSource,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PrecacheReport {
    pub stored: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<PrecacheFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrecacheFailure {
    pub url: String,
    pub error: String,
}

#[derive(Debug)]
pub struct OfflineCache {
    root: Utf8PathBuf,
    base_url: String,
    routes: Vec<Regex>,
    manifest: Manifest,
}

impl OfflineCache {
    pub fn open(root: Utf8PathBuf, base_url: &str) -> Result<Self, CatalogError> {
        let manifest = read_manifest(&root.join(MANIFEST_FILE))?;
        Ok(Self {
            root,
            base_url: base_url.trim_end_matches('/').to_string(),
            routes: Vec::new(),
            manifest,
        })
    }

    pub fn default_root() -> Result<Utf8PathBuf, CatalogError> {
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("pending-catalog"))
                    .ok()
            })
            .ok_or_else(|| CatalogError::Cache("unable to resolve cache directory".to_string()))
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn resolve(&self, url: &str) -> String {
        join_url(&self.base_url, url)
    }

    pub fn register_route(&mut self, pattern: &str) -> Result<(), CatalogError> {
        let regex = Regex::new(pattern).map_err(|err| CatalogError::InvalidRoute {
            pattern: pattern.to_string(),
            message: err.to_string(),
        })?;
        self.routes.push(regex);
        Ok(())
    }

    pub fn matches_route(&self, url: &str) -> bool {
        let url = self.resolve(url);
        self.routes.iter().any(|route| route.is_match(&url))
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &ManifestEntry)> {
        self.manifest.entries.iter()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.manifest.entries.contains_key(&self.resolve(url))
    }

    /// An index entry whose body file is gone counts as a miss.
    pub fn lookup(&self, url: &str) -> Result<Option<Vec<u8>>, CatalogError> {
        let url = self.resolve(url);
        let Some(entry) = self.manifest.entries.get(&url) else {
            return Ok(None);
        };
        let path = self.root.join(ENTRIES_DIR).join(&entry.file);
        match fs::read(path.as_std_path()) {
            Ok(body) => Ok(Some(body)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(url = %url, file = %path, "cached body missing");
                Ok(None)
            }
            Err(err) => Err(CatalogError::Filesystem(err.to_string())),
        }
    }

    pub fn put(
        &mut self,
        url: &str,
        revision: Option<&str>,
        body: &[u8],
    ) -> Result<(), CatalogError> {
        let url = self.resolve(url);
        let file = match self.manifest.entries.get(&url) {
            Some(entry) => entry.file.clone(),
            None => {
                self.manifest.next_id += 1;
                format!("{:08}.body", self.manifest.next_id)
            }
        };

        let entries_dir = self.root.join(ENTRIES_DIR);
        write_bytes_atomic(&entries_dir.join(&file), body)?;

        self.manifest.entries.insert(
            url,
            ManifestEntry {
                file,
                revision: revision.map(str::to_string),
                cached_at: chrono::Utc::now().to_rfc3339(),
            },
        );
        self.write_manifest()
    }

    pub fn precache<F>(
        &mut self,
        fetcher: &F,
        entries: &[PrecacheEntry],
    ) -> Result<PrecacheReport, CatalogError>
    where
        F: AssetFetcher + ?Sized,
    {
        let mut report = PrecacheReport::default();
        for entry in entries {
            let url = self.resolve(&entry.url);
            let is_current = self
                .manifest
                .entries
                .get(&url)
                .is_some_and(|cached| cached.revision.as_deref() == Some(entry.revision.as_str()));
            if is_current && self.lookup(&url)?.is_some() {
                report.skipped.push(url);
                continue;
            }

            match fetcher.fetch_asset(&url) {
                Ok(body) => {
                    self.put(&url, Some(&entry.revision), &body)?;
                    tracing::info!(url = %url, revision = %entry.revision, "precached");
                    report.stored.push(url);
                }
                Err(err) => {
                    tracing::warn!(url = %url, error = %err, "precache failed");
                    report.failed.push(PrecacheFailure {
                        url,
                        error: err.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    /// Network responses are stored for registered routes and for URLs already
    /// in the index, keeping their revision.
    pub fn respond<F>(
        &mut self,
        fetcher: &F,
        request: &CacheRequest,
    ) -> Result<CacheResponse, CatalogError>
    where
        F: AssetFetcher + ?Sized,
    {
        let url = self.resolve(&request.url);
        if let Some(body) = self.lookup(&url)? {
            tracing::debug!(url = %url, "cache hit");
            return Ok(CacheResponse {
                url,
                source: CacheSource::Cache,
                body,
            });
        }

        tracing::debug!(url = %url, "cache miss");
        match fetcher.fetch_asset(&url) {
            Ok(body) => {
                let precached = self
                    .manifest
                    .entries
                    .get(&url)
                    .map(|entry| entry.revision.clone());
                if precached.is_some() || self.matches_route(&url) {
                    let revision = precached.flatten();
                    if let Err(err) = self.put(&url, revision.as_deref(), &body) {
                        tracing::warn!(url = %url, error = %err, "failed to store response");
                    }
                }
                Ok(CacheResponse {
                    url,
                    source: CacheSource::Network,
                    body,
                })
            }
            Err(err) => {
                if request.mode == RequestMode::Navigate {
                    if let Some(body) = self.lookup("/")? {
                        tracing::info!(url = %url, "offline; serving root document");
                        return Ok(CacheResponse {
                            url,
                            source: CacheSource::Fallback,
                            body,
                        });
                    }
                }
                if err.is_network() {
                    tracing::warn!(url = %url, error = %err, "offline and not cached");
                    return Err(CatalogError::CacheMiss(url));
                }
                Err(err)
            }
        }
    }

    pub fn clear(&mut self) -> Result<(), CatalogError> {
        if self.root.as_std_path().exists() {
            fs::remove_dir_all(self.root.as_std_path())
                .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
        }
        self.manifest = Manifest::default();
        Ok(())
    }

    fn write_manifest(&self) -> Result<(), CatalogError> {
        let content = serde_json::to_vec_pretty(&self.manifest)
            .map_err(|err| CatalogError::Cache(err.to_string()))?;
        write_bytes_atomic(&self.root.join(MANIFEST_FILE), &content)
    }
}

fn read_manifest(path: &Utf8Path) -> Result<Manifest, CatalogError> {
    let content = match fs::read(path.as_std_path()) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Manifest::default());
        }
        Err(err) => return Err(CatalogError::Filesystem(err.to_string())),
    };
    match serde_json::from_slice(&content) {
        Ok(manifest) => Ok(manifest),
        Err(err) => {
            tracing::warn!(path = %path, error = %err, "cache manifest corrupted; starting empty");
            Ok(Manifest::default())
        }
    }
}

fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), CatalogError> {
    let parent = path
        .parent()
        .ok_or_else(|| CatalogError::Filesystem("invalid destination path".to_string()))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix("pending-catalog")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_urls_resolve_against_base() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let cache = OfflineCache::open(root, "https://pending.biothings.io/").unwrap();
        assert_eq!(
            cache.resolve("/static/css/app.css"),
            "https://pending.biothings.io/static/css/app.css"
        );
    }

    #[test]
    fn corrupted_manifest_starts_empty() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        fs::write(root.join(MANIFEST_FILE).as_std_path(), b"{not json").unwrap();
        let cache = OfflineCache::open(root, "https://pending.biothings.io").unwrap();
        assert_eq!(cache.entries().count(), 0);
    }
}
