//! Index DAO integration tests against the scripted vendors.

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use strata_core::{
    DaoOptions, Edge, ErrorKey, ItemType, Node, Properties, RetryPolicy, SearchHit, SearchResults,
};
use strata_graph::testing::{scripted_registry, CountingDriver, SCRIPTED_VENDOR};
use strata_graph::{GraphDao, GraphFeatures, GraphSettings};
use strata_index::testing::{scripted_index_registry, RecordingIndexDriver, SCRIPTED_INDEX_VENDOR};
use strata_index::{
    IndexDao, IndexEntry, IndexFeatures, IndexProgress, IndexSettings, SearchOptions,
};

async fn scripted_graph() -> (Arc<GraphDao>, Arc<CountingDriver>) {
    let driver = Arc::new(CountingDriver::default());
    let registry = scripted_registry(GraphFeatures::default(), "1.0.0", driver.clone());
    let graph = GraphDao::create(
        &registry,
        SCRIPTED_VENDOR,
        DaoOptions::new(),
        GraphSettings::default(),
    )
    .unwrap();
    graph.connect().await.unwrap();
    (Arc::new(graph), driver)
}

fn settings() -> IndexSettings {
    IndexSettings {
        commit: RetryPolicy::new(3, Duration::ZERO),
        ..IndexSettings::default()
    }
}

async fn scripted_index(
    features: IndexFeatures,
    driver: RecordingIndexDriver,
) -> (IndexDao, Arc<RecordingIndexDriver>, Arc<CountingDriver>) {
    let (graph, graph_driver) = scripted_graph().await;
    let driver = Arc::new(driver);
    let registry = scripted_index_registry(features, None, driver.clone());
    let dao = IndexDao::create(
        &registry,
        SCRIPTED_INDEX_VENDOR,
        DaoOptions::new().with("indexName", "movies"),
        graph,
        settings(),
    )
    .unwrap();
    dao.connect().await.unwrap();
    (dao, driver, graph_driver)
}

fn hit(id: &str, category: &str) -> SearchHit {
    SearchHit {
        id: id.to_string(),
        categories: vec![category.to_string()],
        name: format!("item {id}"),
        ..Default::default()
    }
}

fn nodes(ids: &[&str]) -> Vec<Node> {
    ids.iter()
        .map(|id| Node::new(*id, vec!["Thing".to_string()], Properties::new()))
        .collect()
}

// =============================================================================
// Construction
// =============================================================================

#[tokio::test]
async fn test_index_name_is_required() {
    let (graph, _) = scripted_graph().await;
    let registry =
        scripted_index_registry(IndexFeatures::default(), None, Arc::new(RecordingIndexDriver::default()));
    let err = IndexDao::create(
        &registry,
        SCRIPTED_INDEX_VENDOR,
        DaoOptions::new(),
        graph,
        settings(),
    )
    .unwrap_err();
    assert_eq!(err.key(), ErrorKey::MissingField);
    assert!(err.message().contains("indexName"));
}

#[tokio::test]
async fn test_incompatible_graph_vendor() {
    let (graph, _) = scripted_graph().await;
    let registry = scripted_index_registry(
        IndexFeatures::default(),
        Some(vec!["neo4j".to_string()]),
        Arc::new(RecordingIndexDriver::default()),
    );
    let err = IndexDao::create(
        &registry,
        SCRIPTED_INDEX_VENDOR,
        DaoOptions::new().with("indexName", "movies"),
        graph,
        settings(),
    )
    .unwrap_err();
    assert_eq!(err.key(), ErrorKey::InvalidParameter);
    assert!(err.message().contains("\"scripted\""));
    assert!(err.message().contains("neo4j"));
}

#[tokio::test]
async fn test_edges_skipped_when_not_indexable() {
    let features = IndexFeatures {
        can_index_edges: false,
        ..IndexFeatures::default()
    };
    let (dao, driver, _) = scripted_index(features, RecordingIndexDriver::default()).await;

    assert!(dao.skip_edge_indexation());
    assert_eq!(dao.name(), "Index DAO (scriptedIndex)");

    let response = dao
        .search(ItemType::Edge, "knows", &SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(response.total_hits, Some(0));
    assert!(response.results.is_empty());
    assert_eq!(driver.calls("search"), 0);
}

// =============================================================================
// Search
// =============================================================================

#[tokio::test]
async fn test_search_validation() {
    let (dao, driver, _) = scripted_index(IndexFeatures::default(), RecordingIndexDriver::default()).await;

    let err = dao
        .search(ItemType::Node, "", &SearchOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.key(), ErrorKey::MissingField);

    let options = SearchOptions {
        full: true,
        id_only: true,
        ..SearchOptions::default()
    };
    let err = dao.search(ItemType::Node, "ada", &options).await.unwrap_err();
    assert_eq!(err.key(), ErrorKey::InvalidParameter);
    assert_eq!(
        err.message(),
        "'options.full' and 'options.idOnly' cannot be both true."
    );

    let options = SearchOptions {
        size: Some(0),
        ..SearchOptions::default()
    };
    let err = dao.search(ItemType::Node, "ada", &options).await.unwrap_err();
    assert_eq!(err.key(), ErrorKey::InvalidParameter);

    let options = SearchOptions {
        fuzziness: Some(f64::NAN),
        ..SearchOptions::default()
    };
    let err = dao.search(ItemType::Node, "ada", &options).await.unwrap_err();
    assert_eq!(err.key(), ErrorKey::InvalidParameter);

    assert_eq!(driver.calls("search"), 0);
}

#[tokio::test]
async fn test_search_defaults_and_clamping() {
    let (dao, driver, _) = scripted_index(IndexFeatures::default(), RecordingIndexDriver::default()).await;

    dao.search(ItemType::Node, "ada", &SearchOptions::default())
        .await
        .unwrap();
    let query = driver.last_query().unwrap();
    assert_eq!(query.from, 0);
    assert_eq!(query.size, IndexSettings::DEFAULT_PAGE_SIZE);
    assert_eq!(query.fuzziness, 0.9);

    for (given, used) in [(0.01, 0.1), (3.0, 1.0), (0.5, 0.5)] {
        let options = SearchOptions {
            fuzziness: Some(given),
            ..SearchOptions::default()
        };
        dao.search(ItemType::Node, "ada", &options).await.unwrap();
        assert_eq!(driver.last_query().unwrap().fuzziness, used, "{given}");
    }
}

#[tokio::test]
async fn test_category_filter_moves_aside() {
    let (dao, driver, _) = scripted_index(IndexFeatures::default(), RecordingIndexDriver::default()).await;

    let options = SearchOptions {
        filter: vec![
            ("[categories]".to_string(), "Person".to_string()),
            ("city".to_string(), "London".to_string()),
        ],
        ..SearchOptions::default()
    };
    dao.search(ItemType::Node, "ada", &options).await.unwrap();

    let query = driver.last_query().unwrap();
    assert_eq!(query.categories_or_types, Some(vec!["Person".to_string()]));
    assert_eq!(query.filter, vec![("city".to_string(), "London".to_string())]);
}

#[tokio::test]
async fn test_every_category_filter_is_kept() {
    let (dao, driver, _) = scripted_index(IndexFeatures::default(), RecordingIndexDriver::default()).await;

    let options = SearchOptions {
        filter: vec![
            ("[type]".to_string(), "KNOWS".to_string()),
            ("since".to_string(), "1999".to_string()),
            ("[type]".to_string(), "LIKES".to_string()),
        ],
        categories_or_types: Some(vec!["WORKS_WITH".to_string()]),
        ..SearchOptions::default()
    };
    dao.search(ItemType::Edge, "ada", &options).await.unwrap();

    let query = driver.last_query().unwrap();
    assert_eq!(
        query.categories_or_types,
        Some(vec![
            "WORKS_WITH".to_string(),
            "KNOWS".to_string(),
            "LIKES".to_string()
        ])
    );
    assert_eq!(query.filter, vec![("since".to_string(), "1999".to_string())]);
}

#[tokio::test]
async fn test_search_groups_sorted_by_title() {
    let hits = vec![hit("1", "Person"), hit("2", "Movie"), hit("3", "Person")];
    let (dao, _, _) = scripted_index(IndexFeatures::default(), RecordingIndexDriver::with_hits(hits)).await;

    let response = dao
        .search(ItemType::Node, "ada", &SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(response.total_hits, Some(3));
    let SearchResults::Groups(groups) = response.results else {
        panic!("expected groups");
    };
    assert_eq!(groups[0].title, "Movie");
    assert_eq!(groups[1].title, "Person");
    assert_eq!(groups[1].children.len(), 2);
}

#[tokio::test]
async fn test_search_id_only_and_full() {
    let hits = vec![hit("4", "Person"), hit("2", "Movie")];
    let (dao, _, graph_driver) =
        scripted_index(IndexFeatures::default(), RecordingIndexDriver::with_hits(hits)).await;

    let options = SearchOptions {
        id_only: true,
        ..SearchOptions::default()
    };
    let response = dao.search(ItemType::Node, "ada", &options).await.unwrap();
    assert_eq!(
        response.results,
        SearchResults::Ids(vec!["4".to_string(), "2".to_string()])
    );

    let options = SearchOptions {
        full: true,
        ..SearchOptions::default()
    };
    let response = dao.search(ItemType::Node, "ada", &options).await.unwrap();
    let SearchResults::Nodes(nodes) = response.results else {
        panic!("expected nodes");
    };
    assert_eq!(nodes.len(), 2);
    assert_eq!(graph_driver.calls("getNodesByID"), 1);
}

// =============================================================================
// Feature gates
// =============================================================================

#[tokio::test]
async fn test_count_requires_feature() {
    let features = IndexFeatures {
        can_count: false,
        ..IndexFeatures::default()
    };
    let (dao, driver, _) = scripted_index(features, RecordingIndexDriver::default()).await;

    let err = dao.get_size(ItemType::Node).await.unwrap_err();
    assert_eq!(err.key(), ErrorKey::NotSupported);
    assert_eq!(driver.calls("getSize"), 0);
}

#[tokio::test]
async fn test_untyped_index_has_no_property_types() {
    let (dao, driver, _) = scripted_index(IndexFeatures::default(), RecordingIndexDriver::default()).await;
    assert!(dao.get_property_types(ItemType::Node).await.unwrap().is_empty());
    assert_eq!(driver.calls("getPropertyTypes"), 0);

    let features = IndexFeatures {
        typing: true,
        ..IndexFeatures::default()
    };
    let (dao, driver, _) = scripted_index(features, RecordingIndexDriver::default()).await;
    assert_eq!(dao.get_property_types(ItemType::Node).await.unwrap().len(), 1);
    assert_eq!(driver.calls("getPropertyTypes"), 1);
}

#[tokio::test]
async fn test_schema_falls_back_to_graph() {
    let (dao, driver, graph_driver) =
        scripted_index(IndexFeatures::default(), RecordingIndexDriver::default()).await;

    dao.get_schema().await.unwrap();
    assert_eq!(driver.calls("getSchema"), 0);
    assert_eq!(graph_driver.calls("getSimpleSchema"), 1);
}

#[tokio::test]
async fn test_external_index_writes_are_noops() {
    let features = IndexFeatures {
        external: true,
        ..IndexFeatures::default()
    };
    let (dao, driver, _) = scripted_index(features, RecordingIndexDriver::default()).await;

    let node = nodes(&["1"]).remove(0);
    dao.add_entries(&[node.clone()], &[]).await.unwrap();
    assert_eq!(dao.upsert_entry(&IndexEntry::Node(node)).await.unwrap(), 1);
    dao.delete_entry(ItemType::Node, "1", false).await.unwrap();
    dao.clear().await.unwrap();
    dao.commit().await.unwrap();
    dao.index_source(&IndexProgress::new("movies", 0, 0))
        .await
        .unwrap();

    assert_eq!(driver.total_calls(), 0);
}

// =============================================================================
// Writes
// =============================================================================

#[tokio::test]
async fn test_internal_index_writes() {
    let (dao, driver, _) = scripted_index(IndexFeatures::default(), RecordingIndexDriver::default()).await;

    dao.add_entries(&[], &[]).await.unwrap();
    assert_eq!(driver.calls("addEntries"), 0);
    dao.add_entries(&nodes(&["1", "2"]), &[]).await.unwrap();
    assert_eq!(driver.calls("addEntries"), 1);

    let entry = IndexEntry::Node(nodes(&["1"]).remove(0));
    assert_eq!(dao.upsert_entry(&entry).await.unwrap(), 2);

    let err = dao.delete_entry(ItemType::Edge, "", true).await.unwrap_err();
    assert_eq!(err.key(), ErrorKey::MissingField);

    dao.clear().await.unwrap();
    assert_eq!(driver.calls("deleteIfExists"), 1);
    assert_eq!(driver.calls("createIndex"), 1);
}

#[tokio::test]
async fn test_set_versions() {
    let (dao, _, _) = scripted_index(IndexFeatures::default(), RecordingIndexDriver::default()).await;
    let mut items = nodes(&["1", "2"]);
    dao.set_versions(&mut items, &mut []).await.unwrap();
    assert!(items.iter().all(|n| n.version == Some(1)));

    let features = IndexFeatures {
        versions: true,
        ..IndexFeatures::default()
    };
    let driver = RecordingIndexDriver::with_versions(BTreeMap::from([
        ("1".to_string(), 4),
        ("e1".to_string(), 2),
    ]));
    let (dao, driver, _) = scripted_index(features, driver).await;

    let mut items = nodes(&["1", "2"]);
    let mut edges = vec![Edge::new("e1", "KNOWS", "1", "2", Properties::new())];
    dao.set_versions(&mut items, &mut edges).await.unwrap();
    assert_eq!(items[0].version, Some(4));
    assert_eq!(items[1].version, Some(0));
    assert_eq!(edges[0].version, Some(2));
    assert_eq!(driver.calls("getItemVersions"), 2);
}

#[tokio::test]
async fn test_commit_retries_technical_failures() {
    let driver = RecordingIndexDriver::default();
    driver.commit_failures.store(2, Ordering::SeqCst);
    let (dao, driver, _) = scripted_index(IndexFeatures::default(), driver).await;

    dao.commit().await.unwrap();
    assert_eq!(driver.calls("commit"), 3);

    driver.commit_failures.store(5, Ordering::SeqCst);
    let err = dao.commit().await.unwrap_err();
    assert_eq!(err.key(), ErrorKey::IndexUnreachable);
    assert_eq!(driver.calls("commit"), 6);
}

#[tokio::test]
async fn test_index_source_commits() {
    let (dao, driver, graph_driver) =
        scripted_index(IndexFeatures::default(), RecordingIndexDriver::default()).await;

    let progress = IndexProgress::new("movies", 1, 0);
    dao.index_source(&progress).await.unwrap();

    assert_eq!(graph_driver.calls("onInternalIndexation"), 1);
    assert_eq!(driver.calls("indexSource"), 1);
    assert_eq!(driver.calls("commit"), 1);
    assert_eq!(progress.indexed(ItemType::Node), 1);
    assert_eq!(progress.percent(), 100.0);
}
