//! Elasticsearch vendor against a local HTTP fixture server.

use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use strata_core::{DaoOptions, ErrorKey, ItemType, Node, Properties, SearchResults};
use strata_graph::{GraphDao, GraphRegistry, GraphSettings, NewEdge, NewNode};
use strata_index::{
    IndexDao, IndexEntry, IndexProgress, IndexRegistry, IndexSettings, PropertyType,
    SearchOptions,
};

/// Documents by index then id, with their version
type Documents = BTreeMap<String, BTreeMap<String, (Value, i64)>>;

#[derive(Default)]
struct Fixture {
    documents: Mutex<Documents>,
    searches: Mutex<Vec<Value>>,
}

impl Fixture {
    fn last_search(&self) -> Value {
        self.searches.lock().unwrap().last().cloned().unwrap_or(Value::Null)
    }
}

/// Minimal Elasticsearch 7 REST surface; documents with a `broken`
/// property are rejected like a mapping conflict
async fn elastic(
    State(fixture): State<Arc<Fixture>>,
    method: Method,
    uri: Uri,
    body: String,
) -> (StatusCode, Json<Value>) {
    let segments: Vec<&str> = uri.path().trim_matches('/').split('/').collect();
    let mut documents = fixture.documents.lock().unwrap();

    match (method, segments.as_slice()) {
        (Method::GET, [""]) => (
            StatusCode::OK,
            Json(json!({"version": {"number": "7.17.9"}, "cluster_uuid": "es-cluster"})),
        ),
        (Method::PUT, [index]) => {
            documents.insert(index.to_string(), BTreeMap::new());
            (StatusCode::OK, Json(json!({"acknowledged": true})))
        }
        (Method::DELETE, [index]) => match documents.remove(*index) {
            Some(_) => (StatusCode::OK, Json(json!({"acknowledged": true}))),
            None => (StatusCode::NOT_FOUND, Json(json!({"error": {"reason": "no such index"}}))),
        },
        (Method::POST, ["_bulk"]) => {
            let lines: Vec<Value> = body
                .lines()
                .filter(|l| !l.is_empty())
                .map(|l| serde_json::from_str(l).unwrap())
                .collect();
            let mut items = Vec::new();
            let mut errors = false;
            for pair in lines.chunks(2) {
                let index = pair[0]["index"]["_index"].as_str().unwrap().to_string();
                let id = pair[0]["index"]["_id"].as_str().unwrap().to_string();
                if pair[1].get("broken").is_some() {
                    errors = true;
                    items.push(json!({"index": {"_id": id, "status": 400, "error": {
                        "type": "mapper_parsing_exception",
                        "reason": "failed to parse [broken]"
                    }}}));
                    continue;
                }
                let docs = documents.entry(index).or_default();
                let version = docs.get(&id).map_or(1, |(_, v)| v + 1);
                docs.insert(id.clone(), (pair[1].clone(), version));
                items.push(json!({"index": {"_id": id, "status": 201, "_version": version}}));
            }
            (StatusCode::OK, Json(json!({"errors": errors, "items": items})))
        }
        (Method::POST, [_, "_flush"]) => (StatusCode::OK, Json(json!({}))),
        (Method::GET, [index, "_count"]) => match documents.get(*index) {
            Some(docs) => (StatusCode::OK, Json(json!({"count": docs.len()}))),
            None => (StatusCode::NOT_FOUND, Json(json!({}))),
        },
        (Method::POST, [index, "_search"]) => {
            fixture
                .searches
                .lock()
                .unwrap()
                .push(serde_json::from_str(&body).unwrap());
            let hits: Vec<Value> = documents
                .get(*index)
                .map(|docs| {
                    docs.iter()
                        .map(|(id, (source, _))| json!({"_id": id, "_source": source}))
                        .collect()
                })
                .unwrap_or_default();
            (
                StatusCode::OK,
                Json(json!({"hits": {"total": {"value": hits.len(), "relation": "eq"}, "hits": hits}})),
            )
        }
        (Method::POST, [index, "_mget"]) => {
            let request: Value = serde_json::from_str(&body).unwrap();
            let docs: Vec<Value> = request["ids"]
                .as_array()
                .unwrap()
                .iter()
                .map(|id| {
                    let id = id.as_str().unwrap();
                    match documents.get(*index).and_then(|d| d.get(id)) {
                        Some((_, version)) => json!({"_id": id, "found": true, "_version": version}),
                        None => json!({"_id": id, "found": false}),
                    }
                })
                .collect();
            (StatusCode::OK, Json(json!({"docs": docs})))
        }
        (Method::GET, [index, "_mapping"]) => {
            let mappings = json!({"mappings": {"properties": {
                "name": {"type": "text"},
                "born": {"type": "long"},
                "lk_categories": {"type": "text"}
            }}});
            let mut body = serde_json::Map::new();
            body.insert(index.to_string(), mappings);
            (StatusCode::OK, Json(Value::Object(body)))
        }
        (Method::DELETE, [index, "_doc", id]) => {
            match documents.get_mut(*index).and_then(|d| d.remove(*id)) {
                Some(_) => (StatusCode::OK, Json(json!({"result": "deleted"}))),
                None => (StatusCode::NOT_FOUND, Json(json!({"result": "not_found"}))),
            }
        }
        _ => (StatusCode::BAD_REQUEST, Json(json!({"error": {"reason": "unexpected"}}))),
    }
}

async fn serve(fixture: Arc<Fixture>) -> SocketAddr {
    let app = Router::new().fallback(elastic).with_state(fixture);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn props(value: Value) -> Properties {
    value.as_object().cloned().unwrap_or_default()
}

/// Memory graph holding Ada, The Matrix and one edge between them
async fn movie_graph() -> Arc<GraphDao> {
    let graph = GraphDao::create(
        &GraphRegistry::builtin(),
        "memory",
        DaoOptions::new(),
        GraphSettings::default(),
    )
    .unwrap();
    graph.connect().await.unwrap();

    let ada = graph
        .create_node(NewNode {
            categories: vec!["Person".to_string()],
            data: props(json!({"name": "Ada", "born": 1815})),
        })
        .await
        .unwrap();
    let matrix = graph
        .create_node(NewNode {
            categories: vec!["Movie".to_string()],
            data: props(json!({"title": "The Matrix"})),
        })
        .await
        .unwrap();
    graph
        .create_edge(NewEdge {
            source: ada.id,
            target: matrix.id,
            edge_type: "WATCHED".to_string(),
            data: Properties::new(),
        })
        .await
        .unwrap();
    Arc::new(graph)
}

async fn connected_index() -> (IndexDao, Arc<Fixture>) {
    let fixture = Arc::new(Fixture::default());
    let addr = serve(fixture.clone()).await;
    let dao = IndexDao::create(
        &IndexRegistry::builtin(),
        "elasticSearch",
        DaoOptions::new()
            .with("host", "127.0.0.1")
            .with("port", addr.port())
            .with("indexName", "Movies"),
        movie_graph().await,
        IndexSettings::default(),
    )
    .unwrap();
    assert_eq!(dao.connect().await.unwrap(), "7.17.9");
    (dao, fixture)
}

async fn indexed() -> (IndexDao, Arc<Fixture>) {
    let (dao, fixture) = connected_index().await;
    dao.clear().await.unwrap();
    let progress = IndexProgress::new("movies", 2, 1);
    dao.index_source(&progress).await.unwrap();
    assert_eq!(progress.indexed(ItemType::Node), 2);
    assert_eq!(progress.indexed(ItemType::Edge), 1);
    (dao, fixture)
}

// =============================================================================
// Connection and indexation
// =============================================================================

#[tokio::test]
async fn test_connect_selects_es7() {
    let (dao, _) = connected_index().await;
    let info = dao.connection_info().unwrap();
    assert_eq!(info.connector, "elasticSearchHttp");
    assert_eq!(info.driver, "es7");
    dao.check_up().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_server() {
    let dao = IndexDao::create(
        &IndexRegistry::builtin(),
        "elasticSearch",
        DaoOptions::new()
            .with("host", "127.0.0.1")
            .with("port", 1)
            .with("indexName", "movies"),
        movie_graph().await,
        IndexSettings::default(),
    )
    .unwrap();
    let err = dao.connect().await.unwrap_err();
    assert!(err.is_technical());
    assert_eq!(err.key(), ErrorKey::IndexUnreachable);
}

#[tokio::test]
async fn test_index_source_fills_both_indices() {
    let (dao, fixture) = indexed().await;

    assert_eq!(dao.get_size(ItemType::Node).await.unwrap(), 2);
    assert_eq!(dao.get_size(ItemType::Edge).await.unwrap(), 1);

    let documents = fixture.documents.lock().unwrap();
    let edge = documents["movies_edges"].values().next().unwrap();
    assert_eq!(edge.0["lk_type"], json!("WATCHED"));
}

// =============================================================================
// Search
// =============================================================================

#[tokio::test]
async fn test_simple_search() {
    let (dao, fixture) = indexed().await;

    let response = dao
        .search(ItemType::Node, "ada", &SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(response.total_hits, Some(2));
    let SearchResults::Groups(groups) = response.results else {
        panic!("expected groups");
    };
    let titles: Vec<&str> = groups.iter().map(|g| g.title.as_str()).collect();
    assert_eq!(titles, vec!["Movie", "Person"]);
    assert_eq!(groups[0].children[0].name, "The Matrix");
    assert_eq!(groups[1].children[0].name, "Ada");

    let body = fixture.last_search();
    assert_eq!(body["size"], json!(20));
    let should = &body["query"]["bool"]["should"];
    assert_eq!(should[0]["multi_match"]["type"], json!("phrase_prefix"));
    assert_eq!(should[1]["multi_match"]["fuzziness"], json!("AUTO"));
    assert!(body.get("highlight").is_some());
}

#[tokio::test]
async fn test_advanced_search_and_category_filter() {
    let (dao, fixture) = indexed().await;

    let options = SearchOptions {
        categories_or_types: Some(vec!["Person".to_string(), "[no_category]".to_string()]),
        id_only: true,
        ..SearchOptions::default()
    };
    dao.search(ItemType::Node, "name:ada", &options).await.unwrap();

    let body = fixture.last_search();
    assert_eq!(body["_source"], json!(false));
    assert!(body.get("highlight").is_none());
    assert_eq!(
        body["query"]["bool"]["should"][0]["query_string"]["query"],
        json!("name:ada")
    );
    let categories = &body["query"]["bool"]["filter"][0]["bool"]["should"];
    assert_eq!(
        categories[0]["match"]["lk_categories.raw"]["query"],
        json!("Person")
    );
    assert_eq!(
        categories[1]["bool"]["must_not"]["exists"]["field"],
        json!("lk_categories")
    );
}

// =============================================================================
// Entries
// =============================================================================

#[tokio::test]
async fn test_versions_and_upsert() {
    let (dao, _) = indexed().await;

    let mut nodes = vec![
        Node::new("1", vec![], Properties::new()),
        Node::new("404", vec![], Properties::new()),
    ];
    dao.set_versions(&mut nodes, &mut []).await.unwrap();
    assert_eq!(nodes[0].version, Some(1));
    assert_eq!(nodes[1].version, Some(0));

    let version = dao
        .upsert_entry(&IndexEntry::Node(nodes.remove(0)))
        .await
        .unwrap();
    assert_eq!(version, 2);
}

#[tokio::test]
async fn test_mapping_conflict_is_business_error() {
    let (dao, _) = indexed().await;

    let node = Node::new("9", vec!["Person".to_string()], props(json!({"broken": "yes"})));
    let err = dao.add_entries(&[node], &[]).await.unwrap_err();
    assert!(err.is_business());
    assert_eq!(err.key(), ErrorKey::IndexMappingError);
    assert_eq!(err.message(), "The property broken had an unexpected type.");
}

#[tokio::test]
async fn test_delete_entry() {
    let (dao, _) = indexed().await;

    dao.delete_entry(ItemType::Node, "1", false).await.unwrap();
    assert_eq!(dao.get_size(ItemType::Node).await.unwrap(), 1);

    let err = dao
        .delete_entry(ItemType::Node, "1", false)
        .await
        .unwrap_err();
    assert_eq!(err.key(), ErrorKey::NodeNotFound);
    dao.delete_entry(ItemType::Node, "1", true).await.unwrap();
}

#[tokio::test]
async fn test_property_types() {
    let (dao, _) = indexed().await;

    let types = dao.get_property_types(ItemType::Node).await.unwrap();
    assert_eq!(types.len(), 2);
    assert_eq!(types["name"], PropertyType::String);
    assert_eq!(types["born"], PropertyType::Integer);
}
