//! End-to-end tests of the `memory` vendor through the graph DAO.

use futures::TryStreamExt;
use serde_json::json;
use strata_core::{DaoOptions, ErrorKey, Properties};
use strata_graph::{
    AdjacentEdgesOptions, AdjacentNodesOptions, EdgeUpdate, GetEdgeOptions, GetNodeOptions,
    GraphDao, GraphRegistry, GraphSettings, NewEdge, NewNode, NodeUpdate, NodesByIdOptions,
    RawQueryOptions, ShortestPathOptions, StatisticsOptions, StreamOptions,
};

fn props(value: serde_json::Value) -> Properties {
    value.as_object().cloned().unwrap_or_default()
}

async fn connected(options: DaoOptions) -> GraphDao {
    let dao = GraphDao::create(
        &GraphRegistry::builtin(),
        "memory",
        options,
        GraphSettings::default(),
    )
    .unwrap();
    dao.connect().await.unwrap();
    dao
}

async fn node(dao: &GraphDao, categories: &[&str], data: serde_json::Value) -> String {
    dao.create_node(NewNode {
        categories: categories.iter().map(|c| c.to_string()).collect(),
        data: props(data),
    })
    .await
    .unwrap()
    .id
}

async fn edge(dao: &GraphDao, source: &str, target: &str, edge_type: &str) -> String {
    dao.create_edge(NewEdge {
        source: source.to_string(),
        target: target.to_string(),
        edge_type: edge_type.to_string(),
        data: Properties::new(),
    })
    .await
    .unwrap()
    .id
}

/// a - b - c, plus a - d - c
async fn diamond(dao: &GraphDao) -> [String; 4] {
    let a = node(dao, &["City"], json!({"name": "Paris", "uid": "p"})).await;
    let b = node(dao, &["City"], json!({"name": "Lyon"})).await;
    let c = node(dao, &["City"], json!({"name": "Nice"})).await;
    let d = node(dao, &["Town"], json!({"name": "Dijon"})).await;
    edge(dao, &a, &b, "ROAD").await;
    edge(dao, &b, &c, "ROAD").await;
    edge(dao, &a, &d, "RAIL").await;
    edge(dao, &d, &c, "RAIL").await;
    [a, b, c, d]
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_connect_and_store_id() {
    let dao = connected(DaoOptions::new().with("storeId", "store-42")).await;

    let info = dao.connection_info().unwrap();
    assert_eq!(info.driver, "memory");
    assert!(info.warning.is_none());
    dao.check_up().await.unwrap();
    assert_eq!(dao.store_id().await.unwrap(), "store-42");
}

#[tokio::test]
async fn test_unknown_option_rejected() {
    let err = GraphDao::create(
        &GraphRegistry::builtin(),
        "memory",
        DaoOptions::new().with("bogus", true),
        GraphSettings::default(),
    )
    .unwrap_err();
    assert_eq!(err.key(), ErrorKey::InvalidParameter);
}

// =============================================================================
// Writes
// =============================================================================

#[tokio::test]
async fn test_node_crud() {
    let dao = connected(DaoOptions::new()).await;

    let id = node(&dao, &["Person", "Actor"], json!({"name": "Ann", "age": 31})).await;
    let created = dao
        .get_node(&GetNodeOptions {
            id: id.clone(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(created.categories, vec!["Actor", "Person"]);
    assert_eq!(created.data["name"], "Ann");

    let updated = dao
        .update_node(
            &id,
            NodeUpdate {
                data: props(json!({"age": 32})),
                deleted_properties: vec!["name".to_string()],
                added_categories: vec!["Director".to_string()],
                deleted_categories: vec!["Actor".to_string()],
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.categories, vec!["Director", "Person"]);
    assert_eq!(updated.data["age"], 32);
    assert!(!updated.data.contains_key("name"));

    dao.delete_node(&id).await.unwrap();
    let err = dao
        .get_node(&GetNodeOptions {
            id: id.clone(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.key(), ErrorKey::NodeNotFound);
    assert_eq!(dao.delete_node(&id).await.unwrap_err().key(), ErrorKey::NodeNotFound);
}

#[tokio::test]
async fn test_edge_crud() {
    let dao = connected(DaoOptions::new()).await;
    let a = node(&dao, &["Person"], json!({})).await;
    let b = node(&dao, &["Person"], json!({})).await;

    let id = edge(&dao, &a, &b, "KNOWS").await;
    let found = dao
        .get_edge(&GetEdgeOptions {
            id: id.clone(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!((found.source.as_str(), found.target.as_str()), (a.as_str(), b.as_str()));
    assert_eq!(found.edge_type, "KNOWS");

    let updated = dao
        .update_edge(
            &id,
            EdgeUpdate {
                data: props(json!({"since": 2001})),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.data["since"], 2001);

    let err = dao
        .update_edge(
            &id,
            EdgeUpdate {
                edge_type: Some("LIKES".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.key(), ErrorKey::NotImplemented);

    dao.delete_edge(&id).await.unwrap();
    assert_eq!(dao.get_edge_count(false).await.unwrap(), 0);
}

#[tokio::test]
async fn test_edge_to_missing_node() {
    let dao = connected(DaoOptions::new()).await;
    let a = node(&dao, &["Person"], json!({})).await;

    let err = dao
        .create_edge(NewEdge {
            source: a,
            target: "999".to_string(),
            edge_type: "KNOWS".to_string(),
            data: Properties::new(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.key(), ErrorKey::CreationFailed);

    let err = dao
        .create_edge(NewEdge {
            source: String::new(),
            target: "1".to_string(),
            edge_type: "KNOWS".to_string(),
            data: Properties::new(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.key(), ErrorKey::MissingField);
}

// =============================================================================
// Reads
// =============================================================================

#[tokio::test]
async fn test_counts_and_schema() {
    let dao = connected(DaoOptions::new()).await;
    diamond(&dao).await;

    assert_eq!(dao.get_node_count(false).await.unwrap(), 4);
    assert_eq!(dao.get_edge_count(true).await.unwrap(), 4);

    let schema = dao.get_simple_schema().await.unwrap();
    assert_eq!(schema.node_categories, vec!["City", "Town"]);
    assert_eq!(schema.edge_types, vec!["RAIL", "ROAD"]);
    assert!(schema.node_properties.contains(&"name".to_string()));
}

#[tokio::test]
async fn test_all_shortest_paths() {
    let dao = connected(DaoOptions::new()).await;
    let [a, _, c, _] = diamond(&dao).await;

    let paths = dao
        .get_all_shortest_paths(&a, &c, &ShortestPathOptions::default())
        .await
        .unwrap();
    assert_eq!(paths.len(), 2);
    for path in &paths {
        assert_eq!(path.len(), 3);
        assert_eq!(path[0].id, a);
        assert_eq!(path[2].id, c);
        assert_eq!(path[0].edges.as_ref().map(Vec::len), Some(1));
        assert_eq!(path[2].edges.as_ref().map(Vec::len), Some(0));
    }

    let too_short = ShortestPathOptions {
        max_depth: Some(1),
        ..Default::default()
    };
    let paths = dao.get_all_shortest_paths(&a, &c, &too_short).await.unwrap();
    assert!(paths.is_empty());
}

#[tokio::test]
async fn test_nodes_by_id_missing() {
    let dao = connected(DaoOptions::new()).await;
    let [a, b, _, _] = diamond(&dao).await;

    let options = NodesByIdOptions {
        ids: vec![a.clone(), b.clone(), "404".to_string()],
        ..Default::default()
    };
    let err = dao.get_nodes_by_id(&options).await.unwrap_err();
    assert_eq!(err.key(), ErrorKey::NodeNotFound);

    let options = NodesByIdOptions {
        ignore_missing: true,
        ..options
    };
    assert_eq!(dao.get_nodes_by_id(&options).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_alternative_node_id() {
    let dao = connected(DaoOptions::new()).await;
    let [a, _, _, _] = diamond(&dao).await;

    let found = dao
        .get_node(&GetNodeOptions {
            id: "p".to_string(),
            alternative_id: Some("uid".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(found.id, a);
}

#[tokio::test]
async fn test_adjacent_nodes_and_edges() {
    let dao = connected(DaoOptions::new()).await;
    let [a, b, _, d] = diamond(&dao).await;

    let nodes = dao
        .get_adjacent_nodes(std::slice::from_ref(&a), &AdjacentNodesOptions::default())
        .await
        .unwrap();
    let mut found: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    found.sort();
    let mut expected = vec![a.as_str(), b.as_str(), d.as_str()];
    expected.sort();
    assert_eq!(found, expected);

    let towns = AdjacentNodesOptions {
        node_category: Some("Town".to_string()),
        ..Default::default()
    };
    let nodes = dao
        .get_adjacent_nodes(std::slice::from_ref(&a), &towns)
        .await
        .unwrap();
    assert!(nodes.iter().any(|n| n.id == d));
    assert!(nodes.iter().all(|n| n.id != b));

    let outgoing = dao
        .get_adjacent_edges(&AdjacentEdgesOptions {
            source: Some(a.clone()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(outgoing.len(), 2);

    let err = dao
        .get_adjacent_edges(&AdjacentEdgesOptions {
            source: Some(a.clone()),
            target: Some(b.clone()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.key(), ErrorKey::InvalidParameter);
}

#[tokio::test]
async fn test_statistics() {
    let dao = connected(DaoOptions::new()).await;
    let [a, _, _, _] = diamond(&dao).await;

    let options = StatisticsOptions {
        with_digest: true,
        with_degree: true,
        ..Default::default()
    };
    let statistics = dao.get_statistics(&a, &options).await.unwrap();
    assert!(!statistics.supernode);
    assert_eq!(statistics.degree, Some(2));
    let digest = statistics.digest.unwrap();
    assert_eq!(digest.len(), 2);
    assert!(digest.iter().all(|item| item.nodes == 1 && item.edges == 1));

    let simple = dao.get_simple_digest(&a, None).await.unwrap();
    assert_eq!(simple.len(), 2);
}

#[tokio::test]
async fn test_raw_query_by_category() {
    let dao = connected(DaoOptions::new()).await;
    diamond(&dao).await;

    let matches = dao.raw_query(&RawQueryOptions::new("City", 10)).await.unwrap();
    assert_eq!(matches.len(), 3);

    let matches = dao.raw_query(&RawQueryOptions::new("*", 2)).await.unwrap();
    assert_eq!(matches.len(), 2);

    let err = dao
        .raw_query(&RawQueryOptions::new("*", 0))
        .await
        .unwrap_err();
    assert_eq!(err.key(), ErrorKey::InvalidParameter);
}

#[tokio::test]
async fn test_node_stream() {
    let dao = connected(DaoOptions::new()).await;
    diamond(&dao).await;

    dao.on_internal_indexation().await.unwrap();
    let nodes: Vec<_> = dao
        .get_node_stream(StreamOptions {
            chunk_size: 3,
            offset: 1,
        })
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(nodes.len(), 3);
}

#[tokio::test]
async fn test_fixture_loaded_on_connect() {
    let path = std::env::temp_dir().join(format!("strata-fixture-{}.json", uuid::Uuid::new_v4()));
    let fixture = json!({
        "nodes": [
            {"key": "x", "categories": ["Person"], "data": {"name": "X"}},
            {"key": "y", "categories": ["Person"], "data": {"name": "Y"}}
        ],
        "edges": [{"source": "x", "target": "y", "type": "KNOWS"}]
    });
    std::fs::write(&path, fixture.to_string()).unwrap();

    let dao = connected(DaoOptions::new().with("fixture", path.display().to_string())).await;
    assert_eq!(dao.get_node_count(false).await.unwrap(), 2);
    assert_eq!(dao.get_edge_count(false).await.unwrap(), 1);

    // reconnecting does not load the fixture twice
    dao.connect().await.unwrap();
    assert_eq!(dao.get_node_count(false).await.unwrap(), 2);

    std::fs::remove_file(&path).unwrap();
}
