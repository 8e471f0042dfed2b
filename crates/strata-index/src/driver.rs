//! Contract every index driver satisfies.
//!
//! Operations a vendor does not provide keep their default body, which
//! fails with `not_implemented`. The DAO has already applied the feature
//! gates and defaults by the time a driver is called.

use crate::params::SearchQuery;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use strata_core::{
    Connector, ConnectorData, DaoError, DaoOptions, Driver, Edge, ItemType, Node,
    RawSearchResult, Result, SimpleSchema,
};
use strata_graph::GraphDao;
use tracing::info;

/// One item written to the index
#[derive(Debug, Clone, PartialEq)]
pub enum IndexEntry {
    Node(Node),
    Edge(Edge),
}

impl IndexEntry {
    pub fn item_type(&self) -> ItemType {
        match self {
            IndexEntry::Node(_) => ItemType::Node,
            IndexEntry::Edge(_) => ItemType::Edge,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            IndexEntry::Node(node) => &node.id,
            IndexEntry::Edge(edge) => &edge.id,
        }
    }
}

impl From<Node> for IndexEntry {
    fn from(node: Node) -> Self {
        IndexEntry::Node(node)
    }
}

impl From<Edge> for IndexEntry {
    fn from(edge: Edge) -> Self {
        IndexEntry::Edge(edge)
    }
}

/// Type of an indexed property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropertyType::String => "string",
            PropertyType::Integer => "integer",
            PropertyType::Float => "float",
            PropertyType::Boolean => "boolean",
            PropertyType::Date => "date",
        };
        f.write_str(name)
    }
}

/// Progress of a full re-indexation, shared with the driver doing it
#[derive(Debug)]
pub struct IndexProgress {
    source: String,
    total_nodes: u64,
    total_edges: u64,
    nodes: AtomicU64,
    edges: AtomicU64,
    started: Instant,
}

impl IndexProgress {
    pub fn new(source: impl Into<String>, total_nodes: u64, total_edges: u64) -> Self {
        Self {
            source: source.into(),
            total_nodes,
            total_edges,
            nodes: AtomicU64::new(0),
            edges: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Count `count` more indexed items of `item_type`
    pub fn add(&self, item_type: ItemType, count: u64) {
        let counter = match item_type {
            ItemType::Node => &self.nodes,
            ItemType::Edge => &self.edges,
        };
        counter.fetch_add(count, Ordering::Relaxed);
        info!(
            source = %self.source,
            nodes = self.indexed(ItemType::Node),
            edges = self.indexed(ItemType::Edge),
            percent = format!("{:.1}", self.percent()),
            "indexation progress"
        );
    }

    pub fn indexed(&self, item_type: ItemType) -> u64 {
        match item_type {
            ItemType::Node => self.nodes.load(Ordering::Relaxed),
            ItemType::Edge => self.edges.load(Ordering::Relaxed),
        }
    }

    /// Share of the expected items already indexed, in `[0, 100]`
    pub fn percent(&self) -> f64 {
        let total = self.total_nodes + self.total_edges;
        if total == 0 {
            return 100.0;
        }
        let done = self.indexed(ItemType::Node) + self.indexed(ItemType::Edge);
        (done as f64 * 100.0 / total as f64).min(100.0)
    }

    /// Items per second since the indexation started
    pub fn rate(&self) -> f64 {
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        (self.indexed(ItemType::Node) + self.indexed(ItemType::Edge)) as f64 / elapsed
    }
}

/// Everything an index driver factory receives
#[derive(Clone)]
pub struct IndexDriverContext {
    pub connector: Arc<dyn Connector>,
    /// The graph DAO the index is paired with
    pub graph: Arc<GraphDao>,
    pub index_options: DaoOptions,
    pub connector_data: ConnectorData,
}

impl IndexDriverContext {
    /// Whether edges stay out of the index
    pub fn skip_edges(&self) -> bool {
        self.index_options
            .get_bool("skipEdgeIndexation")
            .unwrap_or(false)
    }

    pub fn index_name(&self) -> &str {
        self.index_options.get_str("indexName").unwrap_or_default()
    }
}

/// Builds an index driver bound to a live connector
pub type IndexDriverFactory =
    Arc<dyn Fn(IndexDriverContext) -> Result<Arc<dyn IndexDriver>> + Send + Sync>;

#[async_trait]
pub trait IndexDriver: Driver {
    /// Number of indexed items of `item_type`
    async fn get_size(&self, _item_type: ItemType) -> Result<u64> {
        Err(DaoError::not_implemented("getSize"))
    }

    /// Index a batch; never called with an empty batch
    async fn add_entries(&self, _nodes: &[Node], _edges: &[Edge]) -> Result<()> {
        Err(DaoError::not_implemented("addEntries"))
    }

    async fn search(&self, _query: &SearchQuery) -> Result<RawSearchResult> {
        Err(DaoError::not_implemented("search"))
    }

    /// Schema as known to the index
    async fn get_schema(&self) -> Result<SimpleSchema> {
        Err(DaoError::not_implemented("getSchema"))
    }

    async fn delete_if_exists(&self) -> Result<()> {
        Err(DaoError::not_implemented("deleteIfExists"))
    }

    async fn create_index(&self) -> Result<()> {
        Err(DaoError::not_implemented("createIndex"))
    }

    /// Make the entries written so far searchable
    async fn commit(&self) -> Result<()> {
        Err(DaoError::not_implemented("commit"))
    }

    /// Write one entry and return its new version
    async fn upsert_entry(&self, _entry: &IndexEntry) -> Result<i64> {
        Err(DaoError::not_implemented("upsertEntry"))
    }

    async fn delete_entry(
        &self,
        _item_type: ItemType,
        _id: &str,
        _ignore_not_found: bool,
    ) -> Result<()> {
        Err(DaoError::not_implemented("deleteEntry"))
    }

    /// Version of every indexed id; ids not indexed are absent
    async fn get_item_versions(
        &self,
        _item_type: ItemType,
        _ids: &[String],
    ) -> Result<BTreeMap<String, i64>> {
        Err(DaoError::not_implemented("getItemVersions"))
    }

    async fn get_property_types(
        &self,
        _item_type: ItemType,
    ) -> Result<BTreeMap<String, PropertyType>> {
        Err(DaoError::not_implemented("getPropertyTypes"))
    }

    /// Re-index the whole graph
    async fn index_source(&self, _progress: &IndexProgress) -> Result<()> {
        Err(DaoError::not_implemented("indexSource"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{ErrorKey, Properties};

    struct Bare;

    impl Driver for Bare {}
    impl IndexDriver for Bare {}

    #[tokio::test]
    async fn test_unimplemented_operations_are_namespaced() {
        let err = Bare.get_size(ItemType::Node).await.unwrap_err();
        assert_eq!(err.key(), ErrorKey::NotImplemented);
        assert!(err.message().contains("getSize"));

        let err = Bare.commit().await.unwrap_err();
        assert!(err.message().contains("commit"));
    }

    #[test]
    fn test_entry_accessors() {
        let entry = IndexEntry::Edge(Edge::new("e1", "KNOWS", "1", "2", Properties::new()));
        assert_eq!(entry.item_type(), ItemType::Edge);
        assert_eq!(entry.id(), "e1");
    }

    #[test]
    fn test_progress() {
        let progress = IndexProgress::new("movies", 30, 10);
        assert_eq!(progress.percent(), 0.0);
        progress.add(ItemType::Node, 30);
        progress.add(ItemType::Edge, 5);
        assert_eq!(progress.indexed(ItemType::Node), 30);
        assert_eq!(progress.percent(), 87.5);

        let empty = IndexProgress::new("empty", 0, 0);
        assert_eq!(empty.percent(), 100.0);
    }

    #[test]
    fn test_property_type_wire_form() {
        assert_eq!(
            serde_json::to_value(PropertyType::Float).unwrap(),
            serde_json::json!("float")
        );
        assert_eq!(PropertyType::Date.to_string(), "date");
    }
}
