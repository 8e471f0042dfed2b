//! Contract every graph driver satisfies.
//!
//! Identifiers reaching a driver are already decoded through its own
//! `check_node_id` / `check_edge_id`. Operations a vendor does not provide
//! keep their default body, which fails with `not_implemented`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use strata_core::{
    Connector, ConnectorData, DaoError, DaoOptions, DigestItem, Driver, Edge, ItemStream,
    NativeId, Node, Properties, Result, SimpleDigestItem, SimpleSchema,
};

// ============================================================================
// Inputs
// ============================================================================

/// Node to create
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNode {
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub data: Properties,
}

/// Changes applied to an existing node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdate {
    #[serde(default)]
    pub data: Properties,
    #[serde(default)]
    pub deleted_properties: Vec<String>,
    #[serde(default)]
    pub added_categories: Vec<String>,
    #[serde(default)]
    pub deleted_categories: Vec<String>,
}

/// Edge to create, with encoded endpoint ids
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: String,
    #[serde(default)]
    pub data: Properties,
}

/// Edge to create, endpoints decoded for the backend
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeCreation {
    pub source: NativeId,
    pub target: NativeId,
    pub edge_type: String,
    pub data: Properties,
}

/// Changes applied to an existing edge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeUpdate {
    #[serde(default)]
    pub data: Properties,
    #[serde(default)]
    pub deleted_properties: Vec<String>,
    /// Edge types are immutable; setting this is rejected
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub edge_type: Option<String>,
}

// ============================================================================
// Query shapes
// ============================================================================

/// One item, by native id or by an alternative-id property
#[derive(Debug, Clone, PartialEq)]
pub enum ItemRef {
    Native(NativeId),
    Alternative { property: String, value: String },
}

/// Several items, by native id or by an alternative-id property
#[derive(Debug, Clone, PartialEq)]
pub enum ItemRefs {
    Native(Vec<NativeId>),
    Alternative { property: String, values: Vec<String> },
}

impl ItemRefs {
    pub fn len(&self) -> usize {
        match self {
            ItemRefs::Native(ids) => ids.len(),
            ItemRefs::Alternative { values, .. } => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Which adjacent edges to attach to returned nodes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgePolicy {
    /// Every adjacent edge
    All,
    /// Only edges with both ends in the result (or visible)
    Strict,
    #[default]
    None,
}

impl FromStr for EdgePolicy {
    type Err = DaoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(EdgePolicy::All),
            "strict" => Ok(EdgePolicy::Strict),
            "none" => Ok(EdgePolicy::None),
            other => Err(DaoError::invalid_parameter(format!(
                "\"edges\" must be one of: all, strict, none (got \"{other}\")"
            ))),
        }
    }
}

/// Sort applied to neighbours before the limit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LimitType {
    #[default]
    Id,
    LowestDegree,
    HighestDegree,
}

impl FromStr for LimitType {
    type Err = DaoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "id" => Ok(LimitType::Id),
            "lowestDegree" => Ok(LimitType::LowestDegree),
            "highestDegree" => Ok(LimitType::HighestDegree),
            other => Err(DaoError::invalid_parameter(format!(
                "\"limitType\" must be one of: id, lowestDegree, highestDegree (got \"{other}\")"
            ))),
        }
    }
}

/// Direction of adjacent edges relative to the node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Both,
    /// Edges whose source is the node
    Source,
    /// Edges whose target is the node
    Target,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Both => write!(f, "adjacent"),
            Orientation::Source => write!(f, "source"),
            Orientation::Target => write!(f, "target"),
        }
    }
}

/// Neighbourhood expansion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdjacentNodesQuery {
    /// Never returned
    pub ignored_node_ids: Vec<NativeId>,
    /// Not returned, but edges towards them are
    pub visible_node_ids: Vec<NativeId>,
    /// Exclusive category restriction
    pub categories: Option<Vec<String>>,
    /// Exclusive edge-type restriction
    pub types: Option<Vec<String>>,
    pub limit: Option<u64>,
    pub limit_type: LimitType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdjacentEdgesQuery {
    pub node_id: NativeId,
    pub orientation: Orientation,
    pub edge_type: Option<String>,
    pub skip: u64,
    pub limit: Option<u64>,
}

/// Category/type restriction used when counting degrees
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadableFilter {
    pub readable_categories: Option<Vec<String>>,
    pub readable_types: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawQuery {
    pub dialect: String,
    pub query: String,
    pub can_write: bool,
    pub populated: bool,
    pub limit: u64,
}

/// One match of a raw query; unpopulated matches carry ids only
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryMatch {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    pub chunk_size: usize,
    pub offset: u64,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            offset: 0,
        }
    }
}

// ============================================================================
// Driver contract
// ============================================================================

/// Everything a graph driver factory receives
#[derive(Clone)]
pub struct GraphDriverContext {
    pub connector: Arc<dyn Connector>,
    pub graph_options: DaoOptions,
    pub connector_data: ConnectorData,
}

/// Builds a graph driver bound to a live connector
pub type GraphDriverFactory =
    Arc<dyn Fn(GraphDriverContext) -> Result<Arc<dyn GraphDriver>> + Send + Sync>;

#[async_trait]
pub trait GraphDriver: Driver {
    /// Decode an encoded node id, or fail with `invalid_parameter`
    fn check_node_id(&self, key: &str, id: &str) -> Result<NativeId>;

    /// Decode an encoded edge id, or fail with `invalid_parameter`
    fn check_edge_id(&self, key: &str, id: &str) -> Result<NativeId>;

    fn is_empty_node(&self, node: &NewNode) -> bool {
        node.data.is_empty() && node.categories.is_empty()
    }

    /// Called before an internal index reads every node and edge
    async fn on_internal_indexation(&self) -> Result<()> {
        Ok(())
    }

    /// Paths from `start` to `end`; each node carries the edge leading to
    /// the next one (see [`crate::util::order_path`])
    async fn get_all_shortest_paths(
        &self,
        _start: &NativeId,
        _end: &NativeId,
        _max_depth: u64,
        _max_results: u64,
    ) -> Result<Vec<Vec<Node>>> {
        Err(DaoError::not_implemented("getAllShortestPaths"))
    }

    async fn get_simple_schema(&self) -> Result<SimpleSchema> {
        Err(DaoError::not_implemented("getSimpleSchema"))
    }

    async fn get_node_count(&self, _approx: bool) -> Result<u64> {
        Err(DaoError::not_implemented("getNodeCount"))
    }

    async fn get_edge_count(&self, _approx: bool) -> Result<u64> {
        Err(DaoError::not_implemented("getEdgeCount"))
    }

    async fn get_node(&self, _id: &ItemRef, _with_edges: bool) -> Result<Option<Node>> {
        Err(DaoError::not_implemented("getNode"))
    }

    async fn get_node_stream(&self, _options: StreamOptions) -> Result<ItemStream<Node>> {
        Err(DaoError::not_implemented("getNodeStream"))
    }

    async fn get_edge_stream(&self, _options: StreamOptions) -> Result<ItemStream<Edge>> {
        Err(DaoError::not_implemented("getEdgeStream"))
    }

    async fn get_nodes_by_id(&self, _ids: &ItemRefs, _edges: EdgePolicy) -> Result<Vec<Node>> {
        Err(DaoError::not_implemented("getNodesByID"))
    }

    async fn get_edges_by_id(&self, _ids: &ItemRefs) -> Result<Vec<Edge>> {
        Err(DaoError::not_implemented("getEdgesByID"))
    }

    async fn get_adjacent_nodes(
        &self,
        _node_ids: &[NativeId],
        _query: &AdjacentNodesQuery,
    ) -> Result<Vec<Node>> {
        Err(DaoError::not_implemented("getAdjacentNodes"))
    }

    async fn get_simple_digest(
        &self,
        _node_id: &NativeId,
        _readable_types: Option<&[String]>,
    ) -> Result<Vec<SimpleDigestItem>> {
        Err(DaoError::not_implemented("getSimpleDigest"))
    }

    async fn get_adjacency_digest(&self, _node_ids: &[NativeId]) -> Result<Vec<DigestItem>> {
        Err(DaoError::not_implemented("getAdjacencyDigest"))
    }

    async fn is_super_node(&self, _node_id: &NativeId, _threshold: u64) -> Result<bool> {
        Err(DaoError::not_implemented("isSuperNode"))
    }

    async fn get_node_degree(&self, _node_ids: &[NativeId], _filter: &ReadableFilter) -> Result<u64> {
        Err(DaoError::not_implemented("getNodeDegree"))
    }

    /// `None` when the backend created nothing
    async fn create_node(&self, _node: NewNode) -> Result<Option<Node>> {
        Err(DaoError::not_implemented("createNode"))
    }

    /// `None` when the node does not exist
    async fn update_node(&self, _id: &NativeId, _update: NodeUpdate) -> Result<Option<Node>> {
        Err(DaoError::not_implemented("updateNode"))
    }

    /// Deletes the node and its edges; false when it did not exist
    async fn delete_node(&self, _id: &NativeId) -> Result<bool> {
        Err(DaoError::not_implemented("deleteNode"))
    }

    async fn get_adjacent_edges(&self, _query: &AdjacentEdgesQuery) -> Result<Vec<Edge>> {
        Err(DaoError::not_implemented("getAdjacentEdges"))
    }

    async fn get_edge(&self, _id: &ItemRef) -> Result<Option<Edge>> {
        Err(DaoError::not_implemented("getEdge"))
    }

    /// Endpoints of the given edges, each populated with those edges
    async fn get_nodes_by_edges_id(&self, edge_ids: &[NativeId]) -> Result<Vec<Node>> {
        let edges = self
            .get_edges_by_id(&ItemRefs::Native(edge_ids.to_vec()))
            .await?;
        let mut endpoints: Vec<&str> = edges
            .iter()
            .flat_map(|e| [e.source.as_str(), e.target.as_str()])
            .collect();
        endpoints.sort_unstable();
        endpoints.dedup();
        let node_ids = endpoints
            .into_iter()
            .map(|id| self.check_node_id("edge endpoint", id))
            .collect::<Result<Vec<_>>>()?;
        let nodes = self
            .get_nodes_by_id(&ItemRefs::Native(node_ids), EdgePolicy::None)
            .await?;
        Ok(crate::util::populate_nodes_with_edges(
            nodes,
            edges,
            EdgePolicy::All,
            &[],
        ))
    }

    async fn create_edge(&self, _edge: EdgeCreation) -> Result<Option<Edge>> {
        Err(DaoError::not_implemented("createEdge"))
    }

    async fn update_edge(&self, _id: &NativeId, _update: EdgeUpdate) -> Result<Option<Edge>> {
        Err(DaoError::not_implemented("updateEdge"))
    }

    async fn delete_edge(&self, _id: &NativeId) -> Result<bool> {
        Err(DaoError::not_implemented("deleteEdge"))
    }

    async fn raw_query(&self, _query: &RawQuery) -> Result<Vec<QueryMatch>> {
        Err(DaoError::not_implemented("rawQuery"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::ErrorKey;

    struct Minimal;

    impl Driver for Minimal {}

    #[async_trait]
    impl GraphDriver for Minimal {
        fn check_node_id(&self, _key: &str, id: &str) -> Result<NativeId> {
            Ok(NativeId::Str(id.to_string()))
        }

        fn check_edge_id(&self, _key: &str, id: &str) -> Result<NativeId> {
            Ok(NativeId::Str(id.to_string()))
        }
    }

    #[tokio::test]
    async fn test_unimplemented_operations_are_namespaced() {
        let driver = Minimal;
        let err = driver.get_node_count(false).await.unwrap_err();
        assert_eq!(err.key(), ErrorKey::NotImplemented);
        assert!(err.message().contains("getNodeCount"));

        let err = driver
            .raw_query(&RawQuery {
                dialect: "cypher".into(),
                query: "MATCH (n) RETURN n".into(),
                can_write: false,
                populated: true,
                limit: 10,
            })
            .await
            .unwrap_err();
        assert!(err.message().contains("rawQuery"));
    }

    #[test]
    fn test_is_empty_node() {
        assert!(Minimal.is_empty_node(&NewNode::default()));
        assert!(!Minimal.is_empty_node(&NewNode {
            categories: vec!["City".into()],
            ..Default::default()
        }));
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("strict".parse::<EdgePolicy>().unwrap(), EdgePolicy::Strict);
        assert!("some".parse::<EdgePolicy>().is_err());
        assert_eq!(
            "highestDegree".parse::<LimitType>().unwrap(),
            LimitType::HighestDegree
        );
        assert_eq!(Orientation::Both.to_string(), "adjacent");
    }
}
