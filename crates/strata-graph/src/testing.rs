//! Test doubles for code built on the graph DAO.

use crate::driver::{
    AdjacentNodesQuery, EdgePolicy, GraphDriver, ItemRef, ItemRefs, NewNode, ReadableFilter,
};
use crate::features::GraphFeatures;
use crate::registry::{GraphRegistry, GraphVendor};
use async_trait::async_trait;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use strata_core::{
    Connector, ConnectorContext, DaoError, DigestItem, Driver, ErrorKey, NativeId, Node,
    OptionSchema, Properties, Result, SimpleDigestItem, SimpleSchema,
};

pub const SCRIPTED_VENDOR: &str = "scripted";
pub const SCRIPTED_CONNECTOR: &str = "scripted";
pub const SCRIPTED_DRIVER: &str = "scripted";

/// Connector reporting a fixed version, or failing with a fixed error.
/// Its store id and health can be changed while connected.
pub struct ScriptedConnector {
    version: std::result::Result<String, DaoError>,
    store_id: Mutex<String>,
    healthy: AtomicBool,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl ScriptedConnector {
    pub fn up(version: impl Into<String>) -> Self {
        Self::with(Ok(version.into()))
    }

    /// Unreachable backend
    pub fn down(message: impl Into<String>) -> Self {
        Self::failing(DaoError::technical(ErrorKey::GraphUnreachable, message))
    }

    pub fn failing(error: DaoError) -> Self {
        Self::with(Err(error))
    }

    fn with(version: std::result::Result<String, DaoError>) -> Self {
        Self {
            version,
            store_id: Mutex::new("scripted-store".to_string()),
            healthy: AtomicBool::new(true),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn set_store_id(&self, store_id: impl Into<String>) {
        *self.store_id.lock().unwrap_or_else(PoisonError::into_inner) = store_id.into();
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self) -> Result<String> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.version.clone()
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    async fn check_up(&self) -> Result<()> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DaoError::technical(
                ErrorKey::GraphUnreachable,
                "scripted store is down",
            ))
        }
    }

    async fn store_id(&self) -> Result<String> {
        Ok(self
            .store_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Driver counting its calls. Statistics lookups pause briefly so that
/// concurrent calls overlap and the peak concurrency can be observed.
pub struct CountingDriver {
    calls: Mutex<BTreeMap<&'static str, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    pause: Duration,
    /// Degree reported for every node
    pub degree: u64,
}

impl Default for CountingDriver {
    fn default() -> Self {
        Self {
            calls: Mutex::new(BTreeMap::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            pause: Duration::from_millis(5),
            degree: 1,
        }
    }
}

impl CountingDriver {
    pub fn with_degree(degree: u64) -> Self {
        Self {
            degree,
            ..Self::default()
        }
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.lock().get(operation).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.lock().values().sum()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<&'static str, usize>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, operation: &'static str) {
        *self.lock().entry(operation).or_default() += 1;
    }

    async fn tracked<T>(&self, operation: &'static str, value: T) -> T {
        self.record(operation);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.pause).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        value
    }

    fn node(id: &NativeId) -> Node {
        Node::new(id.to_string(), vec!["Thing".to_string()], Properties::new())
    }
}

impl Driver for CountingDriver {}

#[async_trait]
impl GraphDriver for CountingDriver {
    fn check_node_id(&self, key: &str, id: &str) -> Result<NativeId> {
        id.parse::<i64>()
            .map(NativeId::Int)
            .map_err(|_| DaoError::invalid_parameter(format!("\"{key}\" must be an integer")))
    }

    fn check_edge_id(&self, key: &str, id: &str) -> Result<NativeId> {
        self.check_node_id(key, id)
    }

    async fn get_all_shortest_paths(
        &self,
        start: &NativeId,
        _end: &NativeId,
        _max_depth: u64,
        _max_results: u64,
    ) -> Result<Vec<Vec<Node>>> {
        self.record("getAllShortestPaths");
        Ok(vec![vec![Self::node(start)]])
    }

    async fn get_simple_schema(&self) -> Result<SimpleSchema> {
        self.record("getSimpleSchema");
        Ok(SimpleSchema::default())
    }

    async fn on_internal_indexation(&self) -> Result<()> {
        self.record("onInternalIndexation");
        Ok(())
    }

    async fn get_node_count(&self, _approx: bool) -> Result<u64> {
        self.record("getNodeCount");
        Ok(0)
    }

    async fn get_node(&self, id: &ItemRef, _with_edges: bool) -> Result<Option<Node>> {
        self.record("getNode");
        Ok(match id {
            ItemRef::Native(id) => Some(Self::node(id)),
            ItemRef::Alternative { .. } => None,
        })
    }

    async fn get_nodes_by_id(&self, ids: &ItemRefs, _edges: EdgePolicy) -> Result<Vec<Node>> {
        self.record("getNodesByID");
        Ok(match ids {
            ItemRefs::Native(ids) => ids.iter().map(Self::node).collect(),
            ItemRefs::Alternative { .. } => Vec::new(),
        })
    }

    async fn get_adjacent_nodes(
        &self,
        node_ids: &[NativeId],
        _query: &AdjacentNodesQuery,
    ) -> Result<Vec<Node>> {
        self.record("getAdjacentNodes");
        Ok(node_ids.iter().map(Self::node).collect())
    }

    async fn get_simple_digest(
        &self,
        _node_id: &NativeId,
        _readable_types: Option<&[String]>,
    ) -> Result<Vec<SimpleDigestItem>> {
        let digest = vec![SimpleDigestItem {
            edge_type: "LINK".to_string(),
            edges: self.degree,
        }];
        Ok(self.tracked("getSimpleDigest", digest).await)
    }

    async fn get_adjacency_digest(&self, _node_ids: &[NativeId]) -> Result<Vec<DigestItem>> {
        let digest = vec![DigestItem {
            node_categories: vec!["Thing".to_string()],
            edge_type: "LINK".to_string(),
            nodes: 1,
            edges: 1,
        }];
        Ok(self.tracked("getAdjacencyDigest", digest).await)
    }

    async fn is_super_node(&self, _node_id: &NativeId, threshold: u64) -> Result<bool> {
        let supernode = self.degree >= threshold;
        Ok(self.tracked("isSuperNode", supernode).await)
    }

    async fn get_node_degree(&self, _node_ids: &[NativeId], _filter: &ReadableFilter) -> Result<u64> {
        Ok(self.tracked("getNodeDegree", self.degree).await)
    }

    async fn create_node(&self, node: NewNode) -> Result<Option<Node>> {
        self.record("createNode");
        Ok(Some(Node::new("1", node.categories, node.data)))
    }
}

/// Vendor `scripted` with `features`, a single connector reporting
/// `version`, and `driver` bound on connection. Versions above 1.0.0 are
/// newer than tested, versions below are older.
pub fn scripted_registry(
    features: GraphFeatures,
    version: &str,
    driver: Arc<CountingDriver>,
) -> GraphRegistry {
    scripted_registry_with(features, Arc::new(ScriptedConnector::up(version)), driver)
}

/// Like [`scripted_registry`], every connection going through `connector`
pub fn scripted_registry_with(
    features: GraphFeatures,
    connector: Arc<ScriptedConnector>,
    driver: Arc<CountingDriver>,
) -> GraphRegistry {
    let mut registry = GraphRegistry::new();
    registry
        .register_vendor(SCRIPTED_VENDOR, move || GraphVendor {
            name: SCRIPTED_VENDOR.to_string(),
            features: features.clone(),
            options: OptionSchema::new(&[], &[]),
            connectors: vec![SCRIPTED_CONNECTOR.to_string()],
            drivers: vec![
                ("1.0.0", strata_core::driver::LATEST_DRIVER),
                ("1.0.0", SCRIPTED_DRIVER),
            ],
        })
        .register_connector(SCRIPTED_CONNECTOR, move |_context: &ConnectorContext| {
            Ok(connector.clone() as Arc<dyn Connector>)
        })
        .register_driver(SCRIPTED_DRIVER, move |_context| {
            Ok(driver.clone() as Arc<dyn GraphDriver>)
        });
    registry
}
