//! Data-source lifecycle against the memory and scripted vendors.

use std::sync::Arc;
use std::time::Duration;
use strata_core::{
    AdvancedConfig, DaoError, DaoOptions, DataSourceConfig, ErrorKey, ItemType, RetryPolicy,
    VendorConfig,
};
use strata_graph::testing::{
    scripted_registry_with, CountingDriver, ScriptedConnector, SCRIPTED_VENDOR,
};
use strata_graph::{GraphDao, GraphFeatures, GraphRegistry, GraphSettings, NewNode};
use strata_index::testing::{scripted_index_registry, RecordingIndexDriver, SCRIPTED_INDEX_VENDOR};
use strata_index::{IndexFeatures, IndexRegistry};
use strata_source::{DataSource, SourceState};

fn quick_retries() -> RetryPolicy {
    RetryPolicy::new(3, Duration::ZERO)
}

fn scripted_source(connector: Arc<ScriptedConnector>) -> DataSource {
    let registry = scripted_registry_with(
        GraphFeatures::default(),
        connector,
        Arc::new(CountingDriver::default()),
    );
    let graph = GraphDao::create(
        &registry,
        SCRIPTED_VENDOR,
        DaoOptions::new(),
        GraphSettings::default(),
    )
    .unwrap();
    DataSource::new("scripted", Arc::new(graph), None, quick_retries())
}

fn advanced() -> AdvancedConfig {
    AdvancedConfig {
        connection_retries: 2,
        connection_retry_delay_ms: 0,
        commit_retry_delay_ms: 0,
        ..AdvancedConfig::default()
    }
}

/// Memory graph indexed by the scripted index vendor
fn indexed_config(index_options: DaoOptions) -> DataSourceConfig {
    DataSourceConfig {
        name: "movies".to_string(),
        graphdb: VendorConfig {
            vendor: "memory".to_string(),
            options: DaoOptions::new(),
        },
        index: Some(VendorConfig {
            vendor: SCRIPTED_INDEX_VENDOR.to_string(),
            options: index_options,
        }),
    }
}

fn index_registry(driver: Arc<RecordingIndexDriver>) -> IndexRegistry {
    scripted_index_registry(IndexFeatures::default(), None, driver)
}

// =============================================================================
// Connection
// =============================================================================

#[tokio::test]
async fn test_connect_and_disconnect() {
    let connector = Arc::new(ScriptedConnector::up("1.0.0"));
    let source = scripted_source(connector.clone());
    assert_eq!(source.state(), SourceState::Offline);

    source.connect().await.unwrap();
    assert_eq!(source.state(), SourceState::Ready);
    assert_eq!(source.store_id().as_deref(), Some("scripted-store"));
    assert_eq!(connector.connects(), 1);

    let status = source.status();
    assert_eq!(status.graph.unwrap().driver, "scripted");
    assert!(status.index.is_none());

    source.disconnect().await;
    source.disconnect().await;
    assert_eq!(source.state(), SourceState::Offline);
    assert_eq!(connector.disconnects(), 2);
}

#[tokio::test]
async fn test_connection_is_retried() {
    let connector = Arc::new(ScriptedConnector::down("connection refused"));
    let source = scripted_source(connector.clone());

    let err = source.connect().await.unwrap_err();
    assert_eq!(err.key(), ErrorKey::GraphUnreachable);
    assert_eq!(connector.connects(), 3);
    assert_eq!(
        source.state(),
        SourceState::Failed("connection refused".to_string())
    );
}

#[tokio::test]
async fn test_invalid_parameter_is_not_retried() {
    let connector = Arc::new(ScriptedConnector::failing(DaoError::invalid_parameter(
        "Please check the username and password.",
    )));
    let source = scripted_source(connector.clone());

    let err = source.connect().await.unwrap_err();
    assert_eq!(err.key(), ErrorKey::InvalidParameter);
    assert_eq!(connector.connects(), 1);
}

#[tokio::test]
async fn test_changed_store_is_reported_once() {
    let connector = Arc::new(ScriptedConnector::up("1.0.0"));
    let source = scripted_source(connector.clone());
    source.connect().await.unwrap();

    connector.set_store_id("another-store");
    let err = source.connect().await.unwrap_err();
    assert!(err.is_business());
    assert_eq!(err.key(), ErrorKey::Critical);
    assert_eq!(
        err.message(),
        "Please retry connecting the data-source (the database has changed)."
    );
    assert!(matches!(source.state(), SourceState::Failed(_)));

    source.connect().await.unwrap();
    assert_eq!(source.store_id().as_deref(), Some("another-store"));
    assert_eq!(source.state(), SourceState::Ready);
}

#[tokio::test]
async fn test_failed_check_up_marks_offline() {
    let connector = Arc::new(ScriptedConnector::up("1.0.0"));
    let source = scripted_source(connector.clone());
    source.connect().await.unwrap();
    source.check_up().await.unwrap();
    assert_eq!(source.state(), SourceState::Ready);

    connector.set_healthy(false);
    let err = source.check_up().await.unwrap_err();
    assert!(err.is_technical());
    assert_eq!(source.state(), SourceState::Offline);
}

// =============================================================================
// Configuration
// =============================================================================

#[tokio::test]
async fn test_index_name_defaults_to_source_name() {
    let driver = Arc::new(RecordingIndexDriver::default());
    let source = DataSource::from_config(
        &indexed_config(DaoOptions::new()),
        &advanced(),
        &GraphRegistry::builtin(),
        &index_registry(driver),
    )
    .unwrap();

    let index = source.index().unwrap();
    assert_eq!(index.options().get_str("indexName"), Some("movies"));
    assert_eq!(source.graph().vendor(), "memory");
    assert!(source.graph().options().get("vendor").is_none());
}

#[tokio::test]
async fn test_explicit_index_name_is_kept() {
    let driver = Arc::new(RecordingIndexDriver::default());
    let source = DataSource::from_config(
        &indexed_config(DaoOptions::new().with("indexName", "films")),
        &advanced(),
        &GraphRegistry::builtin(),
        &index_registry(driver),
    )
    .unwrap();
    assert_eq!(
        source.index().unwrap().options().get_str("indexName"),
        Some("films")
    );
}

#[tokio::test]
async fn test_unknown_vendor_fails_construction() {
    let mut config = indexed_config(DaoOptions::new());
    config.graphdb.vendor = "oracle".to_string();
    let err = DataSource::from_config(
        &config,
        &advanced(),
        &GraphRegistry::builtin(),
        &index_registry(Arc::new(RecordingIndexDriver::default())),
    )
    .unwrap_err();
    assert_eq!(err.key(), ErrorKey::UnknownVendor);
}

// =============================================================================
// Indexation
// =============================================================================

#[tokio::test]
async fn test_reindex() {
    let driver = Arc::new(RecordingIndexDriver::default());
    let source = DataSource::from_config(
        &indexed_config(DaoOptions::new()),
        &advanced(),
        &GraphRegistry::builtin(),
        &index_registry(driver.clone()),
    )
    .unwrap();
    source.connect().await.unwrap();
    assert!(source.status().index.is_some());

    for name in ["Ada", "Alan"] {
        source
            .graph()
            .create_node(NewNode {
                categories: vec!["Person".to_string()],
                data: [("name".to_string(), serde_json::json!(name))]
                    .into_iter()
                    .collect(),
            })
            .await
            .unwrap();
    }

    let progress = source.reindex().await.unwrap();
    assert_eq!(progress.indexed(ItemType::Node), 1);
    assert_eq!(driver.calls("deleteIfExists"), 1);
    assert_eq!(driver.calls("createIndex"), 1);
    assert_eq!(driver.calls("indexSource"), 1);
    assert_eq!(driver.calls("commit"), 1);
}

#[tokio::test]
async fn test_reindex_requires_connection_and_index() {
    let driver = Arc::new(RecordingIndexDriver::default());
    let source = DataSource::from_config(
        &indexed_config(DaoOptions::new()),
        &advanced(),
        &GraphRegistry::builtin(),
        &index_registry(driver.clone()),
    )
    .unwrap();
    let err = source.reindex().await.unwrap_err();
    assert_eq!(err.key(), ErrorKey::NotConnected);
    assert_eq!(driver.total_calls(), 0);

    let bare = scripted_source(Arc::new(ScriptedConnector::up("1.0.0")));
    bare.connect().await.unwrap();
    let err = bare.reindex().await.unwrap_err();
    assert_eq!(err.key(), ErrorKey::NotSupported);
}
