use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::client::CatalogClient;
use crate::domain::{ApiIdentifier, ApiMetadata, TypeTag};
use crate::error::CatalogError;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Default)]
pub struct LoadingSignal(Arc<AtomicBool>);

impl LoadingSignal {
    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn set(&self, value: bool) {
        self.0.store(value, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub listed: usize,
    pub loaded: usize,
    pub failed: Vec<LoadFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadFailure {
    pub name: ApiIdentifier,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DetailRoute {
    Detail {
        id: ApiIdentifier,
        metadata: Option<ApiMetadata>,
    },
    NotFound,
}

/// `apis` is always a subset of `apis_backup`, in the same order.
#[derive(Debug, Default)]
pub struct CatalogStore {
    list: Vec<ApiIdentifier>,
    apis: Vec<ApiMetadata>,
    apis_backup: Vec<ApiMetadata>,
    biothing_types: Vec<TypeTag>,
    query: String,
    loading: LoadingSignal,
}

impl CatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<ApiMetadata>) -> Self {
        let mut store = Self::new();
        for record in records {
            if let Ok(id) = record.name.parse::<ApiIdentifier>() {
                if !store.list.contains(&id) {
                    store.list.push(id);
                }
            }
            store.insert_metadata(record);
        }
        store
    }

    pub fn list(&self) -> &[ApiIdentifier] {
        &self.list
    }

    pub fn apis(&self) -> &[ApiMetadata] {
        &self.apis
    }

    pub fn apis_backup(&self) -> &[ApiMetadata] {
        &self.apis_backup
    }

    pub fn biothing_types(&self) -> &[TypeTag] {
        &self.biothing_types
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn loading(&self) -> bool {
        self.loading.get()
    }

    pub fn loading_signal(&self) -> LoadingSignal {
        self.loading.clone()
    }

    pub fn find(&self, id: &ApiIdentifier) -> Option<&ApiMetadata> {
        self.apis_backup.iter().find(|api| api.name == id.as_str())
    }

    /// The loading flag stays set until every metadata request has resolved.
    pub fn fetch_catalog<C>(
        &mut self,
        client: &C,
        sink: &dyn ProgressSink,
    ) -> Result<LoadReport, CatalogError>
    where
        C: CatalogClient + ?Sized,
    {
        self.loading.set(true);
        let start = Instant::now();
        sink.event(ProgressEvent {
            message: "phase=List; fetching API list".to_string(),
            elapsed: None,
        });

        let entries = match client.fetch_list() {
            Ok(entries) => entries,
            Err(err) => {
                self.loading.set(false);
                tracing::error!(error = %err, "failed to fetch API list");
                return Err(err);
            }
        };

        let mut ids = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry.parse::<ApiIdentifier>() {
                Ok(id) => ids.push(id),
                Err(err) => tracing::warn!(entry = %entry, error = %err, "skipping list entry"),
            }
        }
        self.list = ids.clone();
        tracing::info!(count = ids.len(), "API list fetched");
        sink.event(ProgressEvent {
            message: format!("phase=Metadata; fetching {} records", ids.len()),
            elapsed: Some(start.elapsed()),
        });

        let mut report = LoadReport {
            listed: ids.len(),
            loaded: 0,
            failed: Vec::new(),
        };

        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel();
            for id in &ids {
                let tx = tx.clone();
                scope.spawn(move || {
                    let result = client
                        .fetch_metadata(id)
                        .and_then(|raw| ApiMetadata::from_raw(id, raw));
                    let _ = tx.send((id, result));
                });
            }
            drop(tx);

            for (id, result) in rx {
                match result {
                    Ok(metadata) => {
                        self.insert_metadata(metadata);
                        report.loaded += 1;
                        sink.event(ProgressEvent {
                            message: format!("metadata {id} loaded"),
                            elapsed: Some(start.elapsed()),
                        });
                    }
                    Err(err) => {
                        tracing::warn!(api = %id, error = %err, "metadata fetch failed");
                        sink.event(ProgressEvent {
                            message: format!("metadata {id} failed"),
                            elapsed: Some(start.elapsed()),
                        });
                        report.failed.push(LoadFailure {
                            name: id.clone(),
                            error: err.to_string(),
                        });
                    }
                }
            }
        });

        self.loading.set(false);
        sink.event(ProgressEvent {
            message: format!(
                "phase=Done; {} loaded, {} failed",
                report.loaded,
                report.failed.len()
            ),
            elapsed: Some(start.elapsed()),
        });
        Ok(report)
    }

    pub fn register_type(&mut self, type_name: &str) {
        if self.biothing_types.iter().any(|tag| tag.name == type_name) {
            return;
        }
        self.biothing_types.push(TypeTag::new(type_name));
    }

    pub fn toggle_type(&mut self, name: &str, exclusive: bool) -> bool {
        if exclusive {
            for tag in self.biothing_types.iter_mut().filter(|tag| tag.name != name) {
                tag.active = false;
            }
        }
        let found = match self.biothing_types.iter_mut().find(|tag| tag.name == name) {
            Some(tag) => {
                tag.active = !tag.active;
                true
            }
            None => false,
        };
        self.recompute_visible();
        found
    }

    pub fn set_query(&mut self, query: &str) {
        self.query = query.to_string();
        self.recompute_visible();
    }

    pub fn recompute_visible(&mut self) {
        let active = self.active_types();
        let visible = self
            .apis_backup
            .iter()
            .filter(|api| is_visible(api, &self.query, &active))
            .cloned()
            .collect();
        self.apis = visible;
    }

    pub fn ensure_loaded<C>(
        &mut self,
        client: &C,
        sink: &dyn ProgressSink,
    ) -> Result<(), CatalogError>
    where
        C: CatalogClient + ?Sized,
    {
        if self.list.is_empty() {
            self.fetch_catalog(client, sink)?;
        }
        Ok(())
    }

    /// `name` must match a listed identifier exactly. Resets the query.
    pub fn enter_detail<C>(
        &mut self,
        client: &C,
        name: &str,
        sink: &dyn ProgressSink,
    ) -> Result<DetailRoute, CatalogError>
    where
        C: CatalogClient + ?Sized,
    {
        self.ensure_loaded(client, sink)?;
        let Some(id) = self.list.iter().find(|id| id.as_str() == name).cloned() else {
            return Ok(DetailRoute::NotFound);
        };
        self.set_query("");
        let metadata = self.find(&id).cloned();
        Ok(DetailRoute::Detail { id, metadata })
    }

    fn active_types(&self) -> HashSet<String> {
        self.biothing_types
            .iter()
            .filter(|tag| tag.active)
            .map(|tag| tag.name.clone())
            .collect()
    }

    fn insert_metadata(&mut self, metadata: ApiMetadata) {
        if let Some(biothing_type) = &metadata.biothing_type {
            self.register_type(biothing_type);
        }

        match self
            .apis_backup
            .iter()
            .position(|api| api.name == metadata.name)
        {
            Some(index) => {
                self.apis_backup[index] = metadata;
                self.recompute_visible();
            }
            None => {
                if is_visible(&metadata, &self.query, &self.active_types()) {
                    self.apis.push(metadata.clone());
                }
                self.apis_backup.push(metadata);
            }
        }
    }
}

fn is_visible(api: &ApiMetadata, query: &str, active: &HashSet<String>) -> bool {
    let type_matches = active.is_empty()
        || api
            .biothing_type
            .as_ref()
            .is_some_and(|biothing_type| active.contains(biothing_type));
    let query_matches = query.is_empty() || api.name.contains(query);
    type_matches && query_matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CatalogStore {
        CatalogStore::from_records(vec![
            ApiMetadata::new("mygene.info").with_biothing_type("gene"),
            ApiMetadata::new("myvariant.info").with_biothing_type("variant"),
            ApiMetadata::new("ccle"),
        ])
    }

    #[test]
    fn query_matches_name_substring_only() {
        let mut store = sample();
        store.set_query("gene");
        let names: Vec<_> = store.apis().iter().map(|api| api.name.as_str()).collect();
        assert_eq!(names, vec!["mygene.info"]);
    }

    #[test]
    fn query_is_case_sensitive() {
        let mut store = sample();
        store.set_query("GENE");
        assert!(store.apis().is_empty());
    }

    #[test]
    fn register_type_keeps_existing_state() {
        let mut store = sample();
        store.toggle_type("gene", false);
        store.register_type("gene");
        let genes: Vec<_> = store
            .biothing_types()
            .iter()
            .filter(|tag| tag.name == "gene")
            .collect();
        assert_eq!(genes.len(), 1);
        assert!(genes[0].active);
    }

    #[test]
    fn unknown_tag_toggle_reports_false() {
        let mut store = sample();
        assert!(!store.toggle_type("pathway", false));
        assert_eq!(store.apis().len(), 3);
    }
}
