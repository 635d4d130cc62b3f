use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use assert_matches::assert_matches;
use serde_json::{Value, json};

use pending_catalog::catalog::{
    CatalogStore, DetailRoute, LoadingSignal, ProgressEvent, ProgressSink,
};
use pending_catalog::client::CatalogClient;
use pending_catalog::domain::{ApiIdentifier, ApiMetadata, TypeTag};
use pending_catalog::error::CatalogError;

struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Default)]
struct MockClient {
    list: Option<Vec<String>>,
    metadata: HashMap<String, Value>,
    loading: Option<LoadingSignal>,
    observed_loading: Mutex<Vec<bool>>,
    list_calls: AtomicUsize,
}

impl MockClient {
    fn new(list: &[&str]) -> Self {
        Self {
            list: Some(list.iter().map(|name| name.to_string()).collect()),
            ..Self::default()
        }
    }

    fn with_metadata(mut self, name: &str, metadata: Value) -> Self {
        self.metadata.insert(name.to_string(), metadata);
        self
    }
}

impl CatalogClient for MockClient {
    fn fetch_list(&self) -> Result<Vec<String>, CatalogError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.list.clone().ok_or_else(|| CatalogError::Status {
            url: "/api/list".to_string(),
            status: 503,
            message: "unavailable".to_string(),
        })
    }

    fn fetch_metadata(&self, id: &ApiIdentifier) -> Result<Value, CatalogError> {
        if let Some(signal) = &self.loading {
            self.observed_loading.lock().unwrap().push(signal.get());
        }
        self.metadata
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| CatalogError::Status {
                url: format!("/{id}/metadata"),
                status: 500,
                message: "boom".to_string(),
            })
    }
}

fn names(apis: &[ApiMetadata]) -> Vec<&str> {
    apis.iter().map(|api| api.name.as_str()).collect()
}

fn two_api_store() -> CatalogStore {
    CatalogStore::from_records(vec![
        ApiMetadata::new("mygene.info").with_biothing_type("gene"),
        ApiMetadata::new("myvariant.info").with_biothing_type("variant"),
    ])
}

#[test]
fn failed_metadata_fetch_does_not_block_siblings() {
    let client =
        MockClient::new(&["gene", "variant"]).with_metadata("gene", json!({"biothing_type": "gene"}));
    let mut store = CatalogStore::new();

    let report = store.fetch_catalog(&client, &NoopSink).unwrap();

    assert_eq!(
        store.apis_backup(),
        &[ApiMetadata::new("gene").with_biothing_type("gene")]
    );
    assert_eq!(store.apis(), store.apis_backup());
    assert_eq!(
        store.biothing_types(),
        &[TypeTag {
            name: "gene".to_string(),
            active: false,
            color: "#669BE8".to_string(),
        }]
    );
    assert!(!store.loading());
    assert_eq!(report.listed, 2);
    assert_eq!(report.loaded, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].name.as_str(), "variant");
}

#[test]
fn list_failure_leaves_catalog_empty() {
    let client = MockClient::default();
    let mut store = CatalogStore::new();

    let err = store.fetch_catalog(&client, &NoopSink).unwrap_err();

    assert_matches!(err, CatalogError::Status { status: 503, .. });
    assert!(!store.loading());
    assert!(store.list().is_empty());
    assert!(store.apis_backup().is_empty());
    assert!(store.biothing_types().is_empty());
}

#[test]
fn loading_stays_set_until_metadata_resolves() {
    let mut store = CatalogStore::new();
    let signal = store.loading_signal();
    let client = MockClient {
        loading: Some(store.loading_signal()),
        ..MockClient::new(&["gene", "variant", "chemical"])
    }
    .with_metadata("gene", json!({}))
    .with_metadata("chemical", json!({}));

    assert!(!signal.get());
    store.fetch_catalog(&client, &NoopSink).unwrap();

    let observed = client.observed_loading.lock().unwrap();
    assert_eq!(observed.len(), 3);
    assert!(observed.iter().all(|loading| *loading));
    assert!(!signal.get());
}

#[test]
fn metadata_is_normalized() {
    let client = MockClient::new(&["/mygene/.*"]).with_metadata(
        "mygene",
        json!({
            "name": "server-name",
            "biothing_type": "gene",
            "build_date": "2021-03-05T00:00:00",
            "stats": {"total": 42},
            "src": {"entrez": {"version": "2021"}}
        }),
    );
    let mut store = CatalogStore::new();
    store.fetch_catalog(&client, &NoopSink).unwrap();

    let api = &store.apis_backup()[0];
    assert_eq!(api.name, "mygene");
    assert_eq!(api.build_date.as_deref(), Some("3-5-2021"));
    assert_eq!(api.extra.get("stats"), Some(&json!({"total": 42})));
    assert!(api.extra.contains_key("src"));
    assert!(!api.extra.contains_key("name"));
}

#[test]
fn unparseable_build_date_keeps_item() {
    let client =
        MockClient::new(&["ccle"]).with_metadata("ccle", json!({"build_date": "last tuesday"}));
    let mut store = CatalogStore::new();
    store.fetch_catalog(&client, &NoopSink).unwrap();

    assert_eq!(store.apis_backup().len(), 1);
    assert_eq!(
        store.apis_backup()[0].build_date.as_deref(),
        Some("Invalid date")
    );
}

#[test]
fn reload_replaces_entries_by_name() {
    let client = MockClient::new(&["gene", "variant"])
        .with_metadata("gene", json!({"biothing_type": "gene"}))
        .with_metadata("variant", json!({"biothing_type": "variant"}));
    let mut store = CatalogStore::new();

    store.fetch_catalog(&client, &NoopSink).unwrap();
    store.fetch_catalog(&client, &NoopSink).unwrap();

    assert_eq!(store.apis_backup().len(), 2);
    assert_eq!(store.apis().len(), 2);
    assert_eq!(store.biothing_types().len(), 2);
}

#[test]
fn invalid_list_entries_are_skipped() {
    let client = MockClient::new(&["gene", "", "a/b"]).with_metadata("gene", json!({}));
    let mut store = CatalogStore::new();
    let report = store.fetch_catalog(&client, &NoopSink).unwrap();

    assert_eq!(report.listed, 1);
    assert_eq!(store.list().len(), 1);
}

#[test]
fn query_without_types_filters_by_name() {
    let mut store = two_api_store();
    store.set_query("gene");
    assert_eq!(names(store.apis()), vec!["mygene.info"]);
}

#[test]
fn active_type_without_query_filters_by_type() {
    let mut store = two_api_store();
    assert!(store.toggle_type("variant", false));
    assert_eq!(names(store.apis()), vec!["myvariant.info"]);
}

#[test]
fn query_and_type_intersect() {
    let mut store = CatalogStore::from_records(vec![
        ApiMetadata::new("mygene.info").with_biothing_type("gene"),
        ApiMetadata::new("geneset").with_biothing_type("association"),
        ApiMetadata::new("myvariant.info").with_biothing_type("variant"),
        ApiMetadata::new("go"),
    ]);
    store.toggle_type("gene", false);
    store.toggle_type("variant", false);
    store.set_query("info");
    assert_eq!(names(store.apis()), vec!["mygene.info", "myvariant.info"]);

    store.set_query("gene");
    assert_eq!(names(store.apis()), vec!["mygene.info"]);
}

#[test]
fn no_filters_shows_full_catalog_in_order() {
    let mut store = two_api_store();
    store.set_query("gene");
    store.set_query("");
    assert_eq!(store.apis(), store.apis_backup());
}

#[test]
fn untyped_records_hidden_when_types_active() {
    let mut store = CatalogStore::from_records(vec![
        ApiMetadata::new("mygene.info").with_biothing_type("gene"),
        ApiMetadata::new("ccle"),
    ]);
    store.toggle_type("gene", false);
    assert_eq!(names(store.apis()), vec!["mygene.info"]);
}

#[test]
fn register_type_is_idempotent() {
    let mut store = CatalogStore::new();
    store.register_type("pathway");
    store.register_type("pathway");
    assert_eq!(store.biothing_types().len(), 1);
    assert_eq!(store.biothing_types()[0].color, "#501cbe");
}

#[test]
fn exclusive_toggle_leaves_single_active_tag() {
    let mut store = CatalogStore::from_records(vec![
        ApiMetadata::new("mygene.info").with_biothing_type("gene"),
        ApiMetadata::new("myvariant.info").with_biothing_type("variant"),
        ApiMetadata::new("mychem.info").with_biothing_type("chemical"),
    ]);
    store.toggle_type("gene", false);
    store.toggle_type("variant", false);

    store.toggle_type("chemical", true);

    let active: Vec<_> = store
        .biothing_types()
        .iter()
        .filter(|tag| tag.active)
        .map(|tag| tag.name.as_str())
        .collect();
    assert_eq!(active, vec!["chemical"]);
    assert_eq!(names(store.apis()), vec!["mychem.info"]);
}

#[test]
fn visible_is_subset_of_backup() {
    let mut store = two_api_store();
    store.toggle_type("gene", false);
    store.set_query("my");
    for api in store.apis() {
        assert!(store.apis_backup().contains(api));
    }
}

#[test]
fn filters_apply_to_records_loaded_later() {
    let client = MockClient::new(&["mygene.info", "myvariant.info"])
        .with_metadata("mygene.info", json!({"biothing_type": "gene"}))
        .with_metadata("myvariant.info", json!({"biothing_type": "variant"}));
    let mut store = CatalogStore::new();
    store.set_query("variant");

    store.fetch_catalog(&client, &NoopSink).unwrap();

    assert_eq!(store.apis_backup().len(), 2);
    assert_eq!(names(store.apis()), vec!["myvariant.info"]);
}

#[test]
fn detail_route_loads_lazily_once() {
    let client = MockClient::new(&["gene", "variant"]).with_metadata("gene", json!({}));
    let mut store = CatalogStore::new();
    store.set_query("gen");

    let route = store.enter_detail(&client, "gene", &NoopSink).unwrap();
    assert_matches!(route, DetailRoute::Detail { metadata: Some(_), .. });
    assert_eq!(store.query(), "");

    let route = store.enter_detail(&client, "variant", &NoopSink).unwrap();
    assert_matches!(route, DetailRoute::Detail { metadata: None, .. });
    assert_eq!(client.list_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn detail_route_not_found() {
    let client = MockClient::new(&["gene"]).with_metadata("gene", json!({}));
    let mut store = CatalogStore::new();
    store.set_query("ge");

    let route = store.enter_detail(&client, "kaviar", &NoopSink).unwrap();
    assert_eq!(route, DetailRoute::NotFound);
    assert_eq!(store.query(), "ge");
}

#[test]
fn reload_keeps_visible_in_backup_order() {
    let first = MockClient::new(&["x", "y"])
        .with_metadata("x", json!({"biothing_type": "gene"}))
        .with_metadata("y", json!({"biothing_type": "variant"}));
    let mut store = CatalogStore::new();
    store.fetch_catalog(&first, &NoopSink).unwrap();
    store.toggle_type("variant", false);
    assert_eq!(names(store.apis()), vec!["y"]);

    let second = MockClient::new(&["x", "y"])
        .with_metadata("x", json!({"biothing_type": "variant"}))
        .with_metadata("y", json!({"biothing_type": "variant"}));
    store.fetch_catalog(&second, &NoopSink).unwrap();

    let expected: Vec<_> = names(store.apis_backup());
    assert_eq!(expected.len(), 2);
    assert_eq!(names(store.apis()), expected);
}

#[test]
fn reload_hides_records_that_stop_matching() {
    let first = MockClient::new(&["x", "y"])
        .with_metadata("x", json!({"biothing_type": "variant"}))
        .with_metadata("y", json!({"biothing_type": "variant"}));
    let mut store = CatalogStore::new();
    store.fetch_catalog(&first, &NoopSink).unwrap();
    store.toggle_type("variant", false);

    let second = MockClient::new(&["x", "y"])
        .with_metadata("x", json!({"biothing_type": "gene"}))
        .with_metadata("y", json!({"biothing_type": "variant"}));
    store.fetch_catalog(&second, &NoopSink).unwrap();

    assert_eq!(names(store.apis()), vec!["y"]);
    let visible = store.apis().to_vec();
    store.recompute_visible();
    assert_eq!(store.apis(), visible.as_slice());
}

#[test]
fn detail_route_requires_exact_name() {
    let client = MockClient::new(&["gene"]).with_metadata("gene", json!({}));
    let mut store = CatalogStore::new();

    let route = store.enter_detail(&client, "/gene/.*", &NoopSink).unwrap();
    assert_eq!(route, DetailRoute::NotFound);
}
