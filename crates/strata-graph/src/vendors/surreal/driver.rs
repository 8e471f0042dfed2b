//! Graph driver storing nodes in table `node` and edges as `edge` relations.
//!
//! Node records are `{categories, data}`; edge records are
//! `{type, data}` related `in -> out`. Encoded ids are record keys.

use super::connector::{request_error, SurrealConnector};
use crate::driver::{
    AdjacentEdgesQuery, AdjacentNodesQuery, EdgeCreation, EdgePolicy, EdgeUpdate, GraphDriver,
    GraphDriverContext, ItemRef, ItemRefs, LimitType, NewNode, NodeUpdate, Orientation,
    QueryMatch, RawQuery, ReadableFilter,
};
use crate::util::populate_nodes_with_edges;
use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use strata_core::{
    downcast_connector, CategoryFilter, DaoError, DigestItem, Driver, Edge, ErrorKey, NativeId,
    Node, Properties, Result, SimpleDigestItem, SimpleSchema,
};

pub const SURREALQL_DIALECT: &str = "surrealql";

/// Statements rejected in read-only raw queries
const WRITE_STATEMENTS: [&str; 9] = [
    "CREATE", "DEFINE", "DELETE", "INSERT", "RELATE", "REMOVE", "UPDATE", "UPSERT", "KILL",
];

/// Record-id function of the server generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurrealFlavor {
    /// 1.x: `meta::id`
    V1,
    /// 2.x: `record::id`
    V2,
}

impl SurrealFlavor {
    fn id_fn(&self) -> &'static str {
        match self {
            SurrealFlavor::V1 => "meta::id",
            SurrealFlavor::V2 => "record::id",
        }
    }

    fn node_fields(&self) -> String {
        format!("{}(id) AS id, categories, data", self.id_fn())
    }

    fn edge_fields(&self) -> String {
        let f = self.id_fn();
        format!("{f}(id) AS id, type, {f}(in) AS source, {f}(out) AS target, data")
    }
}

#[derive(Debug, Deserialize)]
struct NodeRow {
    id: String,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    data: Properties,
}

impl From<NodeRow> for Node {
    fn from(row: NodeRow) -> Self {
        Node::new(row.id, row.categories, row.data)
    }
}

#[derive(Debug, Deserialize)]
struct EdgeRow {
    id: String,
    #[serde(rename = "type")]
    edge_type: String,
    source: String,
    target: String,
    #[serde(default)]
    data: Properties,
}

impl From<EdgeRow> for Edge {
    fn from(row: EdgeRow) -> Self {
        Edge::new(row.id, row.edge_type, row.source, row.target, row.data)
    }
}

#[derive(Debug, Serialize)]
struct NodeContent {
    categories: Vec<String>,
    data: Properties,
}

#[derive(Debug, Deserialize)]
struct CountRow {
    count: u64,
}

pub struct SurrealDriver {
    connector: Arc<SurrealConnector>,
    flavor: SurrealFlavor,
}

type Binds = Vec<(&'static str, Value)>;

impl SurrealDriver {
    pub fn create(
        context: GraphDriverContext,
        flavor: SurrealFlavor,
    ) -> Result<Arc<dyn GraphDriver>> {
        let connector = downcast_connector::<SurrealConnector>(context.connector)?;
        Ok(Arc::new(Self { connector, flavor }))
    }

    /// Run one statement and deserialize its result set
    async fn rows<T: DeserializeOwned>(&self, sql: String, binds: Binds) -> Result<Vec<T>> {
        let client = self.connector.client()?;
        let mut query = client.query(sql);
        for (key, value) in binds {
            query = query.bind((key, value));
        }
        query
            .await
            .map_err(request_error("SurrealDB query failed"))?
            .take(0)
            .map_err(|e| {
                DaoError::technical(
                    ErrorKey::UnexpectedResponse,
                    format!("Result extraction failed: {e}"),
                )
            })
    }

    async fn nodes(&self, ids: &[String]) -> Result<Vec<Node>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<NodeRow> = self
            .rows(
                format!(
                    "SELECT {} FROM node WHERE {}(id) IN $ids",
                    self.flavor.node_fields(),
                    self.flavor.id_fn()
                ),
                vec![("ids", Value::from(ids.to_vec()))],
            )
            .await?;
        let mut nodes: Vec<Node> = rows.into_iter().map(Node::from).collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(nodes)
    }

    async fn edges(&self, ids: &[String]) -> Result<Vec<Edge>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<EdgeRow> = self
            .rows(
                format!(
                    "SELECT {} FROM edge WHERE {}(id) IN $ids",
                    self.flavor.edge_fields(),
                    self.flavor.id_fn()
                ),
                vec![("ids", Value::from(ids.to_vec()))],
            )
            .await?;
        let mut edges: Vec<Edge> = rows.into_iter().map(Edge::from).collect();
        edges.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(edges)
    }

    /// Every edge touching one of `node_ids`, ordered by id
    async fn incident(&self, node_ids: &[String]) -> Result<Vec<Edge>> {
        if node_ids.is_empty() {
            return Ok(Vec::new());
        }
        let f = self.flavor.id_fn();
        let rows: Vec<EdgeRow> = self
            .rows(
                format!(
                    "SELECT {} FROM edge WHERE {f}(in) IN $ids OR {f}(out) IN $ids",
                    self.flavor.edge_fields()
                ),
                vec![("ids", Value::from(node_ids.to_vec()))],
            )
            .await?;
        let mut edges: Vec<Edge> = rows.into_iter().map(Edge::from).collect();
        edges.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(edges)
    }

    /// Neighbours of `node_ids` through edges accepted by `types`, with the
    /// connecting edges, excluding the inputs
    async fn neighbourhood(
        &self,
        node_ids: &[String],
        types: Option<&[String]>,
    ) -> Result<(Vec<Edge>, BTreeSet<String>)> {
        let inputs: HashSet<&str> = node_ids.iter().map(String::as_str).collect();
        let edges: Vec<Edge> = self
            .incident(node_ids)
            .await?
            .into_iter()
            .filter(|e| types.map_or(true, |t| t.contains(&e.edge_type)))
            .collect();
        let others = edges
            .iter()
            .flat_map(|e| [e.source.clone(), e.target.clone()])
            .filter(|id| !inputs.contains(id.as_str()))
            .collect();
        Ok((edges, others))
    }

    async fn degrees(&self, node_ids: &[String]) -> Result<HashMap<String, u64>> {
        Ok(count_degrees(self.incident(node_ids).await?))
    }

    async fn lookup_nodes(&self, refs: &ItemRefs) -> Result<Vec<Node>> {
        match refs {
            ItemRefs::Native(ids) => self.nodes(&keys(ids)).await,
            ItemRefs::Alternative { .. } => Err(DaoError::not_supported(
                "Alternative ids not supported by surrealdb.",
            )),
        }
    }

    async fn count(&self, table: &str) -> Result<u64> {
        let rows: Vec<CountRow> = self
            .rows(format!("SELECT count() FROM {table} GROUP ALL"), Vec::new())
            .await?;
        Ok(rows.first().map_or(0, |r| r.count))
    }

    async fn distinct(&self, sql: &str) -> Result<Vec<String>> {
        let rows: Vec<Value> = self.rows(sql.to_string(), Vec::new()).await?;
        let mut names: Vec<String> = rows
            .first()
            .and_then(|row| row.get("names"))
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| n.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Edge count per endpoint; a self-loop counts once
fn count_degrees(edges: impl IntoIterator<Item = Edge>) -> HashMap<String, u64> {
    let mut degrees: HashMap<String, u64> = HashMap::new();
    for edge in edges {
        let self_loop = edge.source == edge.target;
        *degrees.entry(edge.source).or_default() += 1;
        if !self_loop {
            *degrees.entry(edge.target).or_default() += 1;
        }
    }
    degrees
}

fn keys(ids: &[NativeId]) -> Vec<String> {
    ids.iter().map(NativeId::to_string).collect()
}

fn accepts_categories(categories: Option<&[String]>, node: &Node) -> bool {
    categories.map_or(true, |filters| {
        filters
            .iter()
            .any(|f| CategoryFilter::parse(f).matches(&node.categories))
    })
}

fn decode(key: &str, id: &str) -> Result<NativeId> {
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(NativeId::Str(id.to_string()))
    } else {
        Err(DaoError::invalid_parameter(format!(
            "\"{key}\" must be a SurrealDB record key (got \"{id}\")"
        )))
    }
}

fn select_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\W*SELECT\b").ok())
        .as_ref()
}

fn write_statement_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!(r"(?i)\b({})\b", WRITE_STATEMENTS.join("|"))).ok())
        .as_ref()
}

/// Reject write statements, or anything but a `SELECT`
fn check_read_only(query: &str) -> Result<()> {
    let (Some(select), Some(write)) = (select_re(), write_statement_re()) else {
        return Err(DaoError::bug("Invalid SurrealQL pattern"));
    };
    if !select.is_match(query) {
        return Err(DaoError::business(
            ErrorKey::WriteForbidden,
            "The query must start with \"SELECT\"",
        ));
    }
    if let Some(statement) = write.find(query) {
        return Err(DaoError::business(
            ErrorKey::WriteForbidden,
            format!(
                "The query cannot use statement \"{}\", or any of {}",
                statement.as_str().to_uppercase(),
                WRITE_STATEMENTS.join(", ")
            ),
        ));
    }
    Ok(())
}

impl Driver for SurrealDriver {}

#[async_trait]
impl GraphDriver for SurrealDriver {
    fn check_node_id(&self, key: &str, id: &str) -> Result<NativeId> {
        decode(key, id)
    }

    fn check_edge_id(&self, key: &str, id: &str) -> Result<NativeId> {
        decode(key, id)
    }

    async fn get_simple_schema(&self) -> Result<SimpleSchema> {
        Ok(SimpleSchema {
            node_categories: self
                .distinct("SELECT array::group(categories) AS names FROM node GROUP ALL")
                .await?,
            edge_types: self
                .distinct("SELECT array::group(type) AS names FROM edge GROUP ALL")
                .await?,
            node_properties: self
                .distinct("SELECT array::group(object::keys(data)) AS names FROM node GROUP ALL")
                .await?,
            edge_properties: self
                .distinct("SELECT array::group(object::keys(data)) AS names FROM edge GROUP ALL")
                .await?,
        })
    }

    async fn get_node_count(&self, _approx: bool) -> Result<u64> {
        self.count("node").await
    }

    async fn get_edge_count(&self, _approx: bool) -> Result<u64> {
        self.count("edge").await
    }

    async fn get_node(&self, id: &ItemRef, with_edges: bool) -> Result<Option<Node>> {
        let refs = match id {
            ItemRef::Native(id) => ItemRefs::Native(vec![id.clone()]),
            ItemRef::Alternative { property, value } => ItemRefs::Alternative {
                property: property.clone(),
                values: vec![value.clone()],
            },
        };
        let policy = if with_edges { EdgePolicy::All } else { EdgePolicy::None };
        Ok(self.get_nodes_by_id(&refs, policy).await?.into_iter().next())
    }

    async fn get_nodes_by_id(&self, ids: &ItemRefs, edges: EdgePolicy) -> Result<Vec<Node>> {
        let nodes = self.lookup_nodes(ids).await?;
        if edges == EdgePolicy::None {
            return Ok(nodes);
        }
        let found: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
        let incident = self.incident(&found).await?;
        Ok(populate_nodes_with_edges(nodes, incident, edges, &[]))
    }

    async fn get_edges_by_id(&self, ids: &ItemRefs) -> Result<Vec<Edge>> {
        match ids {
            ItemRefs::Native(ids) => self.edges(&keys(ids)).await,
            ItemRefs::Alternative { .. } => Err(DaoError::not_supported(
                "Alternative ids not supported by surrealdb.",
            )),
        }
    }

    async fn get_adjacent_nodes(
        &self,
        node_ids: &[NativeId],
        query: &AdjacentNodesQuery,
    ) -> Result<Vec<Node>> {
        let sources = keys(node_ids);
        let excluded: HashSet<String> = keys(&query.visible_node_ids)
            .into_iter()
            .chain(keys(&query.ignored_node_ids))
            .collect();
        let (edges, others) = self.neighbourhood(&sources, query.types.as_deref()).await?;

        let candidates: Vec<String> = others
            .into_iter()
            .filter(|id| !excluded.contains(id))
            .collect();
        let mut neighbours: Vec<Node> = self
            .nodes(&candidates)
            .await?
            .into_iter()
            .filter(|n| accepts_categories(query.categories.as_deref(), n))
            .collect();

        if query.limit_type != LimitType::Id {
            let ids: Vec<String> = neighbours.iter().map(|n| n.id.clone()).collect();
            let degrees = self.degrees(&ids).await?;
            let degree = |n: &Node| degrees.get(&n.id).copied().unwrap_or(0);
            match query.limit_type {
                LimitType::LowestDegree => {
                    neighbours.sort_by(|a, b| (degree(a), &a.id).cmp(&(degree(b), &b.id)))
                }
                _ => neighbours
                    .sort_by(|a, b| (Reverse(degree(a)), &a.id).cmp(&(Reverse(degree(b)), &b.id))),
            }
        }
        if let Some(limit) = query.limit {
            neighbours.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }

        let mut nodes = self.nodes(&sources).await?;
        nodes.extend(neighbours);

        let reachable: HashSet<String> = nodes
            .iter()
            .map(|n| n.id.clone())
            .chain(keys(&query.visible_node_ids))
            .collect();
        let edges = edges
            .into_iter()
            .filter(|e| reachable.contains(&e.source) && reachable.contains(&e.target))
            .collect();
        Ok(populate_nodes_with_edges(nodes, edges, EdgePolicy::All, &[]))
    }

    async fn get_simple_digest(
        &self,
        node_id: &NativeId,
        readable_types: Option<&[String]>,
    ) -> Result<Vec<SimpleDigestItem>> {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for edge in self.incident(&[node_id.to_string()]).await? {
            if readable_types.map_or(true, |t| t.contains(&edge.edge_type)) {
                *counts.entry(edge.edge_type).or_default() += 1;
            }
        }
        Ok(counts
            .into_iter()
            .map(|(edge_type, edges)| SimpleDigestItem { edge_type, edges })
            .collect())
    }

    async fn get_adjacency_digest(&self, node_ids: &[NativeId]) -> Result<Vec<DigestItem>> {
        let inputs = keys(node_ids);
        let (edges, others) = self.neighbourhood(&inputs, None).await?;
        let others: Vec<String> = others.into_iter().collect();
        let categories: HashMap<String, Vec<String>> = self
            .nodes(&others)
            .await?
            .into_iter()
            .map(|n| (n.id, n.categories))
            .collect();

        let inputs: HashSet<&str> = inputs.iter().map(String::as_str).collect();
        let mut groups: BTreeMap<(Vec<String>, String), (BTreeSet<String>, u64)> = BTreeMap::new();
        for edge in edges {
            let other = if inputs.contains(edge.source.as_str()) {
                &edge.target
            } else {
                &edge.source
            };
            let node_categories = categories.get(other).cloned().unwrap_or_default();
            let entry = groups.entry((node_categories, edge.edge_type.clone())).or_default();
            entry.0.insert(other.clone());
            entry.1 += 1;
        }
        Ok(groups
            .into_iter()
            .map(|((node_categories, edge_type), (nodes, edges))| DigestItem {
                node_categories,
                edge_type,
                nodes: nodes.len() as u64,
                edges,
            })
            .collect())
    }

    async fn is_super_node(&self, node_id: &NativeId, threshold: u64) -> Result<bool> {
        let id = node_id.to_string();
        let degrees = self.degrees(std::slice::from_ref(&id)).await?;
        Ok(degrees.get(&id).copied().unwrap_or(0) >= threshold)
    }

    async fn get_node_degree(&self, node_ids: &[NativeId], filter: &ReadableFilter) -> Result<u64> {
        let (_, others) = self
            .neighbourhood(&keys(node_ids), filter.readable_types.as_deref())
            .await?;
        if filter.readable_categories.is_none() {
            return Ok(others.len() as u64);
        }
        let others: Vec<String> = others.into_iter().collect();
        Ok(self
            .nodes(&others)
            .await?
            .iter()
            .filter(|n| accepts_categories(filter.readable_categories.as_deref(), n))
            .count() as u64)
    }

    async fn create_node(&self, node: NewNode) -> Result<Option<Node>> {
        let content = serde_json::to_value(NodeContent {
            categories: node.categories,
            data: node.data,
        })?;
        let rows: Vec<NodeRow> = self
            .rows(
                format!(
                    "CREATE node CONTENT $content RETURN {}",
                    self.flavor.node_fields()
                ),
                vec![("content", content)],
            )
            .await?;
        Ok(rows.into_iter().next().map(Node::from))
    }

    async fn update_node(&self, id: &NativeId, update: NodeUpdate) -> Result<Option<Node>> {
        let Some(mut node) = self.nodes(&[id.to_string()]).await?.into_iter().next() else {
            return Ok(None);
        };
        for property in &update.deleted_properties {
            node.data.remove(property);
        }
        node.data.extend(update.data);
        node.categories.retain(|c| !update.deleted_categories.contains(c));
        for category in update.added_categories {
            if !node.categories.contains(&category) {
                node.categories.push(category);
            }
        }

        let content = serde_json::to_value(NodeContent {
            categories: node.categories,
            data: node.data,
        })?;
        let rows: Vec<NodeRow> = self
            .rows(
                format!(
                    "UPDATE type::thing('node', $id) CONTENT $content RETURN {}",
                    self.flavor.node_fields()
                ),
                vec![("id", Value::from(id.clone())), ("content", content)],
            )
            .await?;
        Ok(rows.into_iter().next().map(Node::from))
    }

    async fn delete_node(&self, id: &NativeId) -> Result<bool> {
        let key = id.to_string();
        if self.nodes(std::slice::from_ref(&key)).await?.is_empty() {
            return Ok(false);
        }
        let f = self.flavor.id_fn();
        let _: Vec<Value> = self
            .rows(
                format!("DELETE edge WHERE {f}(in) = $id OR {f}(out) = $id"),
                vec![("id", Value::from(key.clone()))],
            )
            .await?;
        let _: Vec<Value> = self
            .rows(
                "DELETE type::thing('node', $id)".to_string(),
                vec![("id", Value::from(key))],
            )
            .await?;
        Ok(true)
    }

    async fn get_adjacent_edges(&self, query: &AdjacentEdgesQuery) -> Result<Vec<Edge>> {
        let node = query.node_id.to_string();
        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let limit = query
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));

        Ok(self
            .incident(std::slice::from_ref(&node))
            .await?
            .into_iter()
            .filter(|e| match query.orientation {
                Orientation::Both => true,
                Orientation::Source => e.source == node,
                Orientation::Target => e.target == node,
            })
            .filter(|e| query.edge_type.as_ref().map_or(true, |t| *t == e.edge_type))
            .skip(skip)
            .take(limit)
            .collect())
    }

    async fn get_edge(&self, id: &ItemRef) -> Result<Option<Edge>> {
        match id {
            ItemRef::Native(id) => Ok(self.edges(&[id.to_string()]).await?.into_iter().next()),
            ItemRef::Alternative { .. } => Err(DaoError::not_supported(
                "Alternative ids not supported by surrealdb.",
            )),
        }
    }

    async fn create_edge(&self, edge: EdgeCreation) -> Result<Option<Edge>> {
        let endpoints = [edge.source.to_string(), edge.target.to_string()];
        let mut wanted: Vec<String> = endpoints.to_vec();
        wanted.dedup();
        if self.nodes(&wanted).await?.len() != wanted.len() {
            return Ok(None);
        }

        let [source, target] = endpoints;
        let rows: Vec<EdgeRow> = self
            .rows(
                format!(
                    "RELATE (type::thing('node', $source))->edge->(type::thing('node', $target)) \
                     CONTENT {{ type: $type, data: $data }} RETURN {}",
                    self.flavor.edge_fields()
                ),
                vec![
                    ("source", Value::from(source)),
                    ("target", Value::from(target)),
                    ("type", Value::from(edge.edge_type)),
                    ("data", Value::Object(edge.data)),
                ],
            )
            .await?;
        Ok(rows.into_iter().next().map(Edge::from))
    }

    async fn update_edge(&self, id: &NativeId, update: EdgeUpdate) -> Result<Option<Edge>> {
        let Some(mut edge) = self.edges(&[id.to_string()]).await?.into_iter().next() else {
            return Ok(None);
        };
        for property in &update.deleted_properties {
            edge.data.remove(property);
        }
        edge.data.extend(update.data);

        let rows: Vec<EdgeRow> = self
            .rows(
                format!(
                    "UPDATE type::thing('edge', $id) SET data = $data RETURN {}",
                    self.flavor.edge_fields()
                ),
                vec![
                    ("id", Value::from(id.clone())),
                    ("data", Value::Object(edge.data)),
                ],
            )
            .await?;
        Ok(rows.into_iter().next().map(Edge::from))
    }

    async fn delete_edge(&self, id: &NativeId) -> Result<bool> {
        let key = id.to_string();
        if self.edges(std::slice::from_ref(&key)).await?.is_empty() {
            return Ok(false);
        }
        let _: Vec<Value> = self
            .rows(
                "DELETE type::thing('edge', $id)".to_string(),
                vec![("id", Value::from(key))],
            )
            .await?;
        Ok(true)
    }

    /// The query selects records of `node`; matches are those nodes
    async fn raw_query(&self, query: &RawQuery) -> Result<Vec<QueryMatch>> {
        if !query.can_write {
            check_read_only(&query.query)?;
        }
        let inner = query.query.trim().trim_end_matches(';');
        let rows: Vec<NodeRow> = self
            .rows(
                format!(
                    "SELECT {} FROM ({inner}) LIMIT $limit",
                    self.flavor.node_fields()
                ),
                vec![("limit", Value::from(query.limit))],
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let mut node = Node::from(row);
                if !query.populated {
                    node.data.clear();
                    node.categories.clear();
                }
                QueryMatch {
                    nodes: vec![node],
                    edges: Vec::new(),
                }
            })
            .collect())
    }
}
