use std::io::{self, Write};

use serde::Serialize;

use crate::catalog::{LoadFailure, ProgressEvent, ProgressSink};
use crate::domain::{ApiMetadata, TypeTag};
use crate::offline::{CacheSource, PrecacheReport};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub query: String,
    pub total: usize,
    pub apis: Vec<ApiMetadata>,
    pub failed: Vec<LoadFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TypesResult {
    pub biothing_types: Vec<TypeTag>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShowResult {
    pub name: String,
    pub metadata: Option<ApiMetadata>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheGetResult {
    pub url: String,
    pub source: CacheSource,
    pub size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheEntryResult {
    pub url: String,
    pub revision: Option<String>,
    pub cached_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearResult {
    pub cleared: bool,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_list(result: &ListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_types(result: &TypesResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_show(result: &ShowResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_precache(result: &PrecacheReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_cache_get(result: &CacheGetResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_cache_entries(result: &[CacheEntryResult]) -> io::Result<()> {
        Self::print_json(&result)
    }

    pub fn print_clear(result: &ClearResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::info!(
                elapsed_ms = elapsed.as_millis() as u64,
                "{}",
                event.message
            ),
            None => tracing::info!("{}", event.message),
        }
    }
}
