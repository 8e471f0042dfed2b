//! Graph driver speaking Cypher over the transactional HTTP endpoint.

use super::connector::{Neo4jHttpConnector, Statement, StatementResult};
use super::cypher::{
    check_query, encode_labels, encode_name, encode_types, enforce_limit, CypherFlavor,
};
use crate::driver::{
    AdjacentEdgesQuery, AdjacentNodesQuery, EdgeCreation, EdgePolicy, EdgeUpdate, GraphDriver,
    GraphDriverContext, ItemRef, ItemRefs, LimitType, NewNode, NodeUpdate, Orientation,
    QueryMatch, RawQuery, ReadableFilter, StreamOptions,
};
use crate::util::{order_path, populate_nodes_with_edges};
use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use strata_core::{
    downcast_connector, CategoryFilter, DaoError, DigestItem, Driver, Edge, ItemStream, NativeId,
    Node, Properties, Result, SimpleDigestItem, SimpleSchema,
};

const NODE_MAP: &str = "{id: id(n), labels: labels(n), properties: properties(n)}";
const EDGE_MAP: &str =
    "{id: id(e), type: type(e), source: id(startNode(e)), target: id(endNode(e)), properties: properties(e)}";

#[derive(Debug, Deserialize)]
struct RowNode {
    id: i64,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    properties: Properties,
}

impl From<RowNode> for Node {
    fn from(row: RowNode) -> Self {
        Node::new(row.id.to_string(), row.labels, row.properties)
    }
}

#[derive(Debug, Deserialize)]
struct RowEdge {
    id: i64,
    #[serde(rename = "type")]
    edge_type: String,
    source: i64,
    target: i64,
    #[serde(default)]
    properties: Properties,
}

impl From<RowEdge> for Edge {
    fn from(row: RowEdge) -> Self {
        Edge::new(
            row.id.to_string(),
            row.edge_type,
            row.source.to_string(),
            row.target.to_string(),
            row.properties,
        )
    }
}

/// First column of every row
fn column<T: DeserializeOwned>(result: StatementResult) -> Result<Vec<T>> {
    result
        .rows()
        .filter_map(|row| row.into_iter().next())
        .map(|value| serde_json::from_value(value).map_err(DaoError::from))
        .collect()
}

fn count(result: &StatementResult) -> u64 {
    result.scalar().and_then(Value::as_u64).unwrap_or(0)
}

fn id_values(ids: &[NativeId]) -> Value {
    Value::Array(ids.iter().cloned().map(Value::from).collect())
}

/// `WHERE` fragment selecting `var` by category filters, OR-ed
fn category_clause(var: &str, categories: Option<&[String]>) -> String {
    let Some(categories) = categories else {
        return String::new();
    };
    let alternatives: Vec<String> = categories
        .iter()
        .map(|c| match CategoryFilter::parse(c) {
            CategoryFilter::Category(name) => format!("{var}:{}", encode_name(&name)),
            CategoryFilter::NoCategory => format!("size(labels({var})) = 0"),
        })
        .collect();
    if alternatives.is_empty() {
        // an empty whitelist matches nothing
        return " AND false".to_string();
    }
    format!(" AND ({})", alternatives.join(" OR "))
}

pub struct Neo4jDriver {
    connector: Arc<Neo4jHttpConnector>,
    flavor: CypherFlavor,
}

impl Neo4jDriver {
    pub fn create(context: GraphDriverContext, flavor: CypherFlavor) -> Result<Arc<dyn GraphDriver>> {
        let connector = downcast_connector::<Neo4jHttpConnector>(context.connector)?;
        Ok(Arc::new(Self { connector, flavor }))
    }

    async fn read(&self, statement: Statement) -> Result<StatementResult> {
        self.connector.query(statement, false).await
    }

    async fn write(&self, statement: Statement) -> Result<StatementResult> {
        self.connector.query(statement, true).await
    }

    async fn nodes(&self, statement: Statement) -> Result<Vec<Node>> {
        let rows: Vec<RowNode> = column(self.read(statement).await?)?;
        Ok(rows.into_iter().map(Node::from).collect())
    }

    async fn edges(&self, statement: Statement) -> Result<Vec<Edge>> {
        let rows: Vec<RowEdge> = column(self.read(statement).await?)?;
        Ok(rows.into_iter().map(Edge::from).collect())
    }

    /// Every edge touching one of `node_ids`
    async fn incident_edges(&self, node_ids: Value) -> Result<Vec<Edge>> {
        self.edges(
            Statement::new(format!(
                "MATCH (n)-[e]-() WHERE id(n) IN $ids RETURN DISTINCT {EDGE_MAP}"
            ))
            .param("ids", node_ids),
        )
        .await
    }

    fn node_selection(refs: &ItemRefs) -> Statement {
        match refs {
            ItemRefs::Native(ids) => Statement::new(format!(
                "MATCH (n) WHERE id(n) IN $ids RETURN {NODE_MAP} ORDER BY id(n)"
            ))
            .param("ids", id_values(ids)),
            ItemRefs::Alternative { property, values } => Statement::new(format!(
                "MATCH (n) WHERE toString(n[$property]) IN $values RETURN {NODE_MAP} ORDER BY id(n)"
            ))
            .param("property", property.as_str())
            .param("values", values.clone()),
        }
    }

    fn edge_selection(refs: &ItemRefs) -> Statement {
        match refs {
            ItemRefs::Native(ids) => Statement::new(format!(
                "MATCH ()-[e]->() WHERE id(e) IN $ids RETURN {EDGE_MAP} ORDER BY id(e)"
            ))
            .param("ids", id_values(ids)),
            ItemRefs::Alternative { property, values } => Statement::new(format!(
                "MATCH ()-[e]->() WHERE toString(e[$property]) IN $values RETURN {EDGE_MAP} ORDER BY id(e)"
            ))
            .param("property", property.as_str())
            .param("values", values.clone()),
        }
    }

    /// Chunked `SKIP`/`LIMIT` scan over `pattern`
    fn stream_of<T, R>(
        &self,
        pattern: &'static str,
        map: &'static str,
        order: &'static str,
        options: StreamOptions,
    ) -> ItemStream<T>
    where
        T: From<R> + Send + 'static,
        R: DeserializeOwned + Send + 'static,
    {
        let connector = self.connector.clone();
        let chunk = options.chunk_size.max(1) as u64;
        stream::try_unfold(Some(options.offset), move |skip| {
            let connector = connector.clone();
            async move {
                let Some(skip) = skip else {
                    return Ok(None);
                };
                let statement = Statement::new(format!(
                    "MATCH {pattern} RETURN {map} ORDER BY {order} SKIP $skip LIMIT $limit"
                ))
                .param("skip", skip)
                .param("limit", chunk);
                let rows: Vec<R> = column(connector.query(statement, false).await?)?;
                let next = (rows.len() as u64 == chunk).then_some(skip + chunk);
                Ok::<_, DaoError>(Some((rows, next)))
            }
        })
        .map_ok(|rows| stream::iter(rows.into_iter().map(|row| Ok(T::from(row)))))
        .try_flatten()
        .boxed()
    }
}

impl Driver for Neo4jDriver {}

#[async_trait]
impl GraphDriver for Neo4jDriver {
    fn check_node_id(&self, key: &str, id: &str) -> Result<NativeId> {
        decode(key, id)
    }

    fn check_edge_id(&self, key: &str, id: &str) -> Result<NativeId> {
        decode(key, id)
    }

    async fn get_all_shortest_paths(
        &self,
        start: &NativeId,
        end: &NativeId,
        max_depth: u64,
        max_results: u64,
    ) -> Result<Vec<Vec<Node>>> {
        let statement = Statement::new(format!(
            "MATCH (a), (b) WHERE id(a) = $start AND id(b) = $end \
             MATCH p = allShortestPaths((a)-[*..{max_depth}]-(b)) \
             RETURN [n IN nodes(p) | {NODE_MAP}], [e IN relationships(p) | {EDGE_MAP}] \
             LIMIT $limit"
        ))
        .param("start", start.clone())
        .param("end", end.clone())
        .param("limit", max_results);

        self.read(statement)
            .await?
            .rows()
            .map(|mut row| {
                let edges: Vec<RowEdge> = serde_json::from_value(row.pop().unwrap_or_default())?;
                let nodes: Vec<RowNode> = serde_json::from_value(row.pop().unwrap_or_default())?;
                order_path(
                    &start.to_string(),
                    nodes.into_iter().map(Node::from).collect(),
                    edges.into_iter().map(Edge::from).collect(),
                )
            })
            .collect()
    }

    async fn get_simple_schema(&self) -> Result<SimpleSchema> {
        let properties = if self.flavor.has_schema_procedures() {
            [
                "CALL db.schema.nodeTypeProperties() YIELD propertyName \
                 RETURN collect(DISTINCT propertyName)",
                "CALL db.schema.relTypeProperties() YIELD propertyName \
                 RETURN collect(DISTINCT propertyName)",
            ]
        } else {
            ["CALL db.propertyKeys() YIELD propertyKey RETURN collect(propertyKey)"; 2]
        };
        let statements = [
            Statement::new("CALL db.labels() YIELD label RETURN collect(label)"),
            Statement::new(
                "CALL db.relationshipTypes() YIELD relationshipType RETURN collect(relationshipType)",
            ),
            Statement::new(properties[0]),
            Statement::new(properties[1]),
        ];
        let results = self.connector.run(&statements, false).await?;

        let mut lists = results.iter().map(|result| {
            let mut names: Vec<String> = result
                .scalar()
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
            names
        });
        Ok(SimpleSchema {
            node_categories: lists.next().unwrap_or_default(),
            edge_types: lists.next().unwrap_or_default(),
            node_properties: lists.next().unwrap_or_default(),
            edge_properties: lists.next().unwrap_or_default(),
        })
    }

    async fn get_node_count(&self, _approx: bool) -> Result<u64> {
        let result = self.read(Statement::new("MATCH (n) RETURN count(n)")).await?;
        Ok(count(&result))
    }

    async fn get_edge_count(&self, _approx: bool) -> Result<u64> {
        let result = self
            .read(Statement::new("MATCH ()-[e]->() RETURN count(e)"))
            .await?;
        Ok(count(&result))
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
        let mut nodes = self.get_nodes_by_id(&refs, policy).await?;
        nodes.truncate(1);
        Ok(nodes.pop())
    }

    async fn get_node_stream(&self, options: StreamOptions) -> Result<ItemStream<Node>> {
        Ok(self.stream_of::<Node, RowNode>("(n)", NODE_MAP, "id(n)", options))
    }

    async fn get_edge_stream(&self, options: StreamOptions) -> Result<ItemStream<Edge>> {
        Ok(self.stream_of::<Edge, RowEdge>("()-[e]->()", EDGE_MAP, "id(e)", options))
    }

    async fn get_nodes_by_id(&self, ids: &ItemRefs, edges: EdgePolicy) -> Result<Vec<Node>> {
        let nodes = self.nodes(Self::node_selection(ids)).await?;
        if edges == EdgePolicy::None || nodes.is_empty() {
            return Ok(nodes);
        }
        let found: Vec<Value> = nodes
            .iter()
            .filter_map(|n| n.id.parse::<i64>().ok())
            .map(Value::from)
            .collect();
        let incident = self.incident_edges(Value::Array(found)).await?;
        Ok(populate_nodes_with_edges(nodes, incident, edges, &[]))
    }

    async fn get_edges_by_id(&self, ids: &ItemRefs) -> Result<Vec<Edge>> {
        self.edges(Self::edge_selection(ids)).await
    }

    async fn get_adjacent_nodes(
        &self,
        node_ids: &[NativeId],
        query: &AdjacentNodesQuery,
    ) -> Result<Vec<Node>> {
        let types = encode_types(query.types.as_deref());
        let excluded: Vec<NativeId> = node_ids
            .iter()
            .chain(&query.visible_node_ids)
            .chain(&query.ignored_node_ids)
            .cloned()
            .collect();
        let order = match query.limit_type {
            LimitType::Id => "id(n)",
            LimitType::LowestDegree => "degree ASC, id(n)",
            LimitType::HighestDegree => "degree DESC, id(n)",
        };
        let limit = query
            .limit
            .map(|l| format!(" LIMIT {l}"))
            .unwrap_or_default();

        let neighbours = self
            .nodes(
                Statement::new(format!(
                    "MATCH (s)-[{types}]-(n) WHERE id(s) IN $ids AND NOT id(n) IN $excluded{} \
                     WITH DISTINCT n WITH n, {} AS degree \
                     RETURN {NODE_MAP} ORDER BY {order}{limit}",
                    category_clause("n", query.categories.as_deref()),
                    self.flavor.degree("n", ""),
                ))
                .param("ids", id_values(node_ids))
                .param("excluded", id_values(&excluded)),
            )
            .await?;

        let mut nodes = self.nodes(Self::node_selection(&ItemRefs::Native(node_ids.to_vec()))).await?;
        nodes.extend(neighbours);

        let result_ids: Vec<Value> = nodes
            .iter()
            .filter_map(|n| n.id.parse::<i64>().ok())
            .map(Value::from)
            .collect();
        let mut reachable = result_ids.clone();
        reachable.extend(query.visible_node_ids.iter().cloned().map(Value::from));

        let edges = self
            .edges(
                Statement::new(format!(
                    "MATCH (n)-[e{types}]-(m) WHERE id(n) IN $result AND id(m) IN $reachable \
                     RETURN DISTINCT {EDGE_MAP}"
                ))
                .param("result", result_ids)
                .param("reachable", reachable),
            )
            .await?;
        Ok(populate_nodes_with_edges(nodes, edges, EdgePolicy::All, &[]))
    }

    async fn get_simple_digest(
        &self,
        node_id: &NativeId,
        readable_types: Option<&[String]>,
    ) -> Result<Vec<SimpleDigestItem>> {
        let statement = Statement::new(format!(
            "MATCH (n)-[e{}]-() WHERE id(n) = $id RETURN type(e), count(e) ORDER BY type(e)",
            encode_types(readable_types)
        ))
        .param("id", node_id.clone());

        Ok(self
            .read(statement)
            .await?
            .rows()
            .filter_map(|row| {
                Some(SimpleDigestItem {
                    edge_type: row.first()?.as_str()?.to_string(),
                    edges: row.get(1)?.as_u64()?,
                })
            })
            .collect())
    }

    async fn get_adjacency_digest(&self, node_ids: &[NativeId]) -> Result<Vec<DigestItem>> {
        let statement = Statement::new(
            "MATCH (n)-[e]-(m) WHERE id(n) IN $ids \
             RETURN labels(m), type(e), count(DISTINCT m), count(DISTINCT e)",
        )
        .param("ids", id_values(node_ids));

        // labels come unsorted, so equal sets may arrive as separate rows
        let mut groups: BTreeMap<(Vec<String>, String), (u64, u64)> = BTreeMap::new();
        for row in self.read(statement).await?.rows() {
            let mut categories: Vec<String> =
                serde_json::from_value(row.first().cloned().unwrap_or_default())?;
            categories.sort();
            let edge_type = row.get(1).and_then(Value::as_str).unwrap_or_default().to_string();
            let entry = groups.entry((categories, edge_type)).or_default();
            entry.0 += row.get(2).and_then(Value::as_u64).unwrap_or(0);
            entry.1 += row.get(3).and_then(Value::as_u64).unwrap_or(0);
        }
        Ok(groups
            .into_iter()
            .map(|((node_categories, edge_type), (nodes, edges))| DigestItem {
                node_categories,
                edge_type,
                nodes,
                edges,
            })
            .collect())
    }

    async fn is_super_node(&self, node_id: &NativeId, threshold: u64) -> Result<bool> {
        let statement = Statement::new(format!(
            "MATCH (n) WHERE id(n) = $id RETURN {} >= $threshold",
            self.flavor.degree("n", "")
        ))
        .param("id", node_id.clone())
        .param("threshold", threshold);
        let result = self.read(statement).await?;
        Ok(result.scalar().and_then(Value::as_bool).unwrap_or(false))
    }

    async fn get_node_degree(&self, node_ids: &[NativeId], filter: &ReadableFilter) -> Result<u64> {
        let statement = Statement::new(format!(
            "MATCH (n)-[{}]-(m) WHERE id(n) IN $ids AND NOT id(m) IN $ids{} \
             RETURN count(DISTINCT m)",
            encode_types(filter.readable_types.as_deref()),
            category_clause("m", filter.readable_categories.as_deref()),
        ))
        .param("ids", id_values(node_ids));
        Ok(count(&self.read(statement).await?))
    }

    async fn create_node(&self, node: NewNode) -> Result<Option<Node>> {
        let statement = Statement::new(format!(
            "CREATE (n{}) SET n = $data RETURN {NODE_MAP}",
            encode_labels(&node.categories)
        ))
        .param("data", node.data);
        let rows: Vec<RowNode> = column(self.write(statement).await?)?;
        Ok(rows.into_iter().next().map(Node::from))
    }

    async fn update_node(&self, id: &NativeId, update: NodeUpdate) -> Result<Option<Node>> {
        let mut query = String::from("MATCH (n) WHERE id(n) = $id SET n += $data");
        for property in &update.deleted_properties {
            query.push_str(&format!(" REMOVE n.{}", encode_name(property)));
        }
        if !update.added_categories.is_empty() {
            query.push_str(&format!(" SET n{}", encode_labels(&update.added_categories)));
        }
        if !update.deleted_categories.is_empty() {
            query.push_str(&format!(" REMOVE n{}", encode_labels(&update.deleted_categories)));
        }
        query.push_str(&format!(" RETURN {NODE_MAP}"));

        let statement = Statement::new(query)
            .param("id", id.clone())
            .param("data", update.data);
        let rows: Vec<RowNode> = column(self.write(statement).await?)?;
        Ok(rows.into_iter().next().map(Node::from))
    }

    async fn delete_node(&self, id: &NativeId) -> Result<bool> {
        let statement = Statement::new(
            "MATCH (n) WHERE id(n) = $id WITH n, 1 AS found DETACH DELETE n RETURN count(found)",
        )
        .param("id", id.clone());
        Ok(count(&self.write(statement).await?) > 0)
    }

    async fn get_adjacent_edges(&self, query: &AdjacentEdgesQuery) -> Result<Vec<Edge>> {
        let types = encode_types(query.edge_type.as_ref().map(std::slice::from_ref));
        let pattern = match query.orientation {
            Orientation::Both => format!("(n)-[e{types}]-()"),
            Orientation::Source => format!("(n)-[e{types}]->()"),
            Orientation::Target => format!("(n)<-[e{types}]-()"),
        };
        let limit = query
            .limit
            .map(|l| format!(" LIMIT {l}"))
            .unwrap_or_default();
        self.edges(
            Statement::new(format!(
                "MATCH {pattern} WHERE id(n) = $id RETURN DISTINCT {EDGE_MAP} \
                 ORDER BY id(e) SKIP $skip{limit}"
            ))
            .param("id", query.node_id.clone())
            .param("skip", query.skip),
        )
        .await
    }

    async fn get_edge(&self, id: &ItemRef) -> Result<Option<Edge>> {
        let refs = match id {
            ItemRef::Native(id) => ItemRefs::Native(vec![id.clone()]),
            ItemRef::Alternative { property, value } => ItemRefs::Alternative {
                property: property.clone(),
                values: vec![value.clone()],
            },
        };
        Ok(self.get_edges_by_id(&refs).await?.into_iter().next())
    }

    async fn create_edge(&self, edge: EdgeCreation) -> Result<Option<Edge>> {
        let statement = Statement::new(format!(
            "MATCH (a), (b) WHERE id(a) = $source AND id(b) = $target \
             CREATE (a)-[e:{}]->(b) SET e = $data RETURN {EDGE_MAP}",
            encode_name(&edge.edge_type)
        ))
        .param("source", edge.source)
        .param("target", edge.target)
        .param("data", edge.data);
        let rows: Vec<RowEdge> = column(self.write(statement).await?)?;
        Ok(rows.into_iter().next().map(Edge::from))
    }

    async fn update_edge(&self, id: &NativeId, update: EdgeUpdate) -> Result<Option<Edge>> {
        let mut query = String::from("MATCH ()-[e]->() WHERE id(e) = $id SET e += $data");
        for property in &update.deleted_properties {
            query.push_str(&format!(" REMOVE e.{}", encode_name(property)));
        }
        query.push_str(&format!(" RETURN {EDGE_MAP}"));

        let statement = Statement::new(query)
            .param("id", id.clone())
            .param("data", update.data);
        let rows: Vec<RowEdge> = column(self.write(statement).await?)?;
        Ok(rows.into_iter().next().map(Edge::from))
    }

    async fn delete_edge(&self, id: &NativeId) -> Result<bool> {
        let statement = Statement::new(
            "MATCH ()-[e]->() WHERE id(e) = $id WITH e, 1 AS found DELETE e RETURN count(found)",
        )
        .param("id", id.clone());
        Ok(count(&self.write(statement).await?) > 0)
    }

    async fn raw_query(&self, query: &RawQuery) -> Result<Vec<QueryMatch>> {
        check_query(&query.query, query.can_write)?;
        let cypher = enforce_limit(&query.query, query.limit)?;
        let result = self
            .connector
            .query(Statement::new(cypher).with_graph(), query.can_write)
            .await?;

        Ok(result
            .data
            .into_iter()
            .map(|record| {
                let graph = record.graph.unwrap_or_default();
                let mut nodes: Vec<Node> = graph
                    .nodes
                    .into_iter()
                    .map(|n| Node::new(n.id, n.labels, n.properties))
                    .collect();
                let mut edges: Vec<Edge> = graph
                    .relationships
                    .into_iter()
                    .map(|r| Edge::new(r.id, r.rel_type, r.start_node, r.end_node, r.properties))
                    .collect();
                if !query.populated {
                    nodes.iter_mut().for_each(|n| {
                        n.data.clear();
                        n.categories.clear();
                    });
                    edges.iter_mut().for_each(|e| e.data.clear());
                }
                QueryMatch { nodes, edges }
            })
            .collect())
    }
}

fn decode(key: &str, id: &str) -> Result<NativeId> {
    match id.parse::<i64>() {
        Ok(n) if n >= 0 => Ok(NativeId::Int(n)),
        _ => Err(DaoError::invalid_parameter(format!(
            "\"{key}\" must be a non-negative integer (got \"{id}\")"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_ids() {
        assert_eq!(decode("id", "0").unwrap(), NativeId::Int(0));
        assert!(decode("id", "-1").is_err());
        assert!(decode("id", "abc").is_err());
    }

    #[test]
    fn test_category_clause() {
        assert_eq!(category_clause("n", None), "");
        assert_eq!(
            category_clause("m", Some(&["City".to_string(), "[no_category]".to_string()][..])),
            " AND (m:`City` OR size(labels(m)) = 0)"
        );
        assert_eq!(category_clause("n", Some(&[][..])), " AND false");
    }

    #[test]
    fn test_rows_parse_into_items() {
        let node: RowNode = serde_json::from_value(json!({
            "id": 4, "labels": ["Person", "Author"], "properties": {"name": "Ada"}
        }))
        .unwrap();
        let node = Node::from(node);
        assert_eq!(node.id, "4");
        assert_eq!(node.categories, vec!["Author", "Person"]);

        let edge: RowEdge = serde_json::from_value(json!({
            "id": 9, "type": "WROTE", "source": 4, "target": 7, "properties": {}
        }))
        .unwrap();
        let edge = Edge::from(edge);
        assert_eq!((edge.source.as_str(), edge.target.as_str()), ("4", "7"));
    }
}
