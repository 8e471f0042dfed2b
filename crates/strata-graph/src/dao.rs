//! Capability-gated graph DAO.
//!
//! Every operation checks the vendor's [`GraphFeatures`] and its own
//! parameter rules before the bound driver is touched, so an unsupported
//! call never reaches the network.

use crate::driver::{
    AdjacentEdgesQuery, AdjacentNodesQuery, EdgeCreation, EdgeUpdate, GraphDriver,
    GraphDriverContext, ItemRef, ItemRefs, NewEdge, NewNode, NodeUpdate, Orientation,
    QueryMatch, RawQuery, ReadableFilter, StreamOptions,
};
use crate::features::GraphFeatures;
use crate::params::{
    AdjacentEdgesOptions, AdjacentNodesOptions, EdgesByIdOptions, GetEdgeOptions, GetNodeOptions,
    GraphSettings, NodesByIdOptions, RawQueryOptions, ShortestPathOptions, StatisticsOptions,
};
use crate::registry::{GraphRegistry, GraphVendor};
use crate::util::{check_missing, normalize_properties, property_as_id};
use futures::{stream, StreamExt, TryStreamExt};
use serde_json::Value;
use std::sync::Arc;
use strata_core::checks::{
    check_exclusive, check_integer, check_non_empty, check_string_list, check_values,
};
use strata_core::{
    ConnectionInfo, DaoCore, DaoDeclaration, DaoError, DaoKind, DaoOptions, DigestItem,
    DriverTable, Edge, ErrorKey, ItemStream, NativeId, Node, NodeStatistics, Properties, Result,
    SimpleDigestItem, SimpleSchema,
};
use tracing::debug;

/// Upper bound of statistics lookups in flight for one call
pub const MAX_CONCURRENT_DIGEST_REQS: usize = 10;

/// Options every graph vendor accepts on top of its own
pub const GRAPH_OPTIONS: [&str; 4] = [
    "alternativeNodeId",
    "alternativeEdgeId",
    "latitudeProperty",
    "longitudeProperty",
];

/// Upper bound of `limit` for neighbour expansion
const MAX_ADJACENT_LIMIT: u64 = 1_000_000;

/// Graph DAO bound to one vendor
pub struct GraphDao {
    core: DaoCore<dyn GraphDriver>,
    features: GraphFeatures,
    settings: GraphSettings,
    registry: GraphRegistry,
}

impl GraphDao {
    /// Resolve `vendor` in the registry and build a DAO. Invalid options or
    /// a malformed vendor declaration fail here; nothing is connected.
    pub fn create(
        registry: &GraphRegistry,
        vendor: &str,
        options: DaoOptions,
        settings: GraphSettings,
    ) -> Result<Self> {
        let declaration = registry.vendor(vendor)?;
        Self::from_vendor(registry, declaration, options, settings)
    }

    pub fn from_vendor(
        registry: &GraphRegistry,
        vendor: GraphVendor,
        options: DaoOptions,
        settings: GraphSettings,
    ) -> Result<Self> {
        let GraphVendor {
            name,
            features,
            options: schema,
            connectors,
            drivers,
        } = vendor;

        features.validate(&name)?;
        let declaration = DaoDeclaration {
            kind: DaoKind::Graph,
            vendor: name,
            schema: schema.extend(&[], &GRAPH_OPTIONS),
            connectors,
            drivers: DriverTable::from_pairs(&drivers)?,
        };
        let core = DaoCore::new(
            declaration,
            options,
            None,
            Arc::new(registry.connectors().clone()),
            settings.connect_timeout,
        )?;

        Ok(Self {
            core,
            features,
            settings,
            registry: registry.clone(),
        })
    }

    // ========================================================================
    // Accessors and lifecycle
    // ========================================================================

    pub fn vendor(&self) -> &str {
        self.core.vendor()
    }

    /// e.g. `Graph DAO (neo4j)`
    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn options(&self) -> &DaoOptions {
        self.core.options()
    }

    pub fn get_option(&self, key: &str, default: Value) -> Value {
        self.core.get_option(key, default)
    }

    pub fn features(&self) -> &GraphFeatures {
        &self.features
    }

    pub fn settings(&self) -> &GraphSettings {
        &self.settings
    }

    pub fn connection_info(&self) -> Option<ConnectionInfo> {
        self.core.connection_info()
    }

    pub fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    /// Connect, negotiate a driver for the live version and return it
    pub async fn connect(&self) -> Result<String> {
        let graph_options = self.core.options().clone();
        let registry = &self.registry;
        self.core
            .connect(|binding| {
                let factory = registry.driver(&binding.driver)?;
                factory(GraphDriverContext {
                    connector: binding.connector,
                    graph_options,
                    connector_data: binding.connector_data,
                })
            })
            .await
    }

    /// Never fails, may be called repeatedly
    pub async fn disconnect(&self) {
        self.core.disconnect().await
    }

    pub async fn check_up(&self) -> Result<()> {
        self.core.check_up().await
    }

    pub async fn store_id(&self) -> Result<String> {
        self.core.store_id().await
    }

    pub async fn on_after_indexation(&self) -> Result<()> {
        self.core.on_after_indexation().await
    }

    /// Called before an internal index streams the whole graph
    pub async fn on_internal_indexation(&self) -> Result<()> {
        if !self.features.can_stream {
            return Err(self.unsupported("Internal indices are"));
        }
        self.driver()?.on_internal_indexation().await
    }

    fn driver(&self) -> Result<Arc<dyn GraphDriver>> {
        self.core.driver()
    }

    fn unsupported(&self, what: &str) -> DaoError {
        DaoError::not_supported(format!(
            "{what} not supported by {}.",
            self.core.vendor()
        ))
    }

    // ========================================================================
    // Identifiers
    // ========================================================================

    pub fn check_node_id(&self, key: &str, id: &str) -> Result<NativeId> {
        check_non_empty(key, id)?;
        self.driver()?.check_node_id(key, id)
    }

    pub fn check_edge_id(&self, key: &str, id: &str) -> Result<NativeId> {
        check_non_empty(key, id)?;
        self.driver()?.check_edge_id(key, id)
    }

    pub fn check_node_ids(&self, key: &str, ids: &[String], min: usize) -> Result<Vec<NativeId>> {
        check_array_len(key, ids.len(), min)?;
        let driver = self.driver()?;
        ids.iter()
            .enumerate()
            .map(|(i, id)| {
                let key = format!("{key}[{i}]");
                check_non_empty(&key, id)?;
                driver.check_node_id(&key, id)
            })
            .collect()
    }

    pub fn check_edge_ids(&self, key: &str, ids: &[String], min: usize) -> Result<Vec<NativeId>> {
        check_array_len(key, ids.len(), min)?;
        let driver = self.driver()?;
        ids.iter()
            .enumerate()
            .map(|(i, id)| {
                let key = format!("{key}[{i}]");
                check_non_empty(&key, id)?;
                driver.check_edge_id(&key, id)
            })
            .collect()
    }

    fn alternative_ids_supported(&self) -> Result<()> {
        if !self.features.alternative_ids {
            return Err(self.unsupported("Alternative ids are"));
        }
        Ok(())
    }

    fn node_ref(&self, key: &str, id: &str, alternative: Option<&str>) -> Result<ItemRef> {
        match alternative {
            None => Ok(ItemRef::Native(self.check_node_id(key, id)?)),
            Some(property) => {
                self.alternative_ids_supported()?;
                check_non_empty(key, id)?;
                Ok(ItemRef::Alternative {
                    property: property.to_string(),
                    value: id.to_string(),
                })
            }
        }
    }

    fn edge_ref(&self, key: &str, id: &str, alternative: Option<&str>) -> Result<ItemRef> {
        match alternative {
            None => Ok(ItemRef::Native(self.check_edge_id(key, id)?)),
            Some(property) => {
                self.alternative_ids_supported()?;
                check_non_empty(key, id)?;
                Ok(ItemRef::Alternative {
                    property: property.to_string(),
                    value: id.to_string(),
                })
            }
        }
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Digest and/or degree of one node; supernodes get the cheap variants
    pub async fn get_statistics(
        &self,
        node_id: &str,
        options: &StatisticsOptions,
    ) -> Result<NodeStatistics> {
        let mut statistics = NodeStatistics::default();
        if !options.is_requested() {
            return Ok(statistics);
        }

        let id = self.check_node_id("nodeId", node_id)?;
        let driver = self.driver()?;
        statistics.supernode = self.detect_supernode(&driver, &id).await?;

        if options.with_digest {
            if statistics.supernode {
                statistics.supernode_digest = Some(
                    driver
                        .get_simple_digest(&id, options.readable_types.as_deref())
                        .await?,
                );
            } else {
                statistics.digest =
                    Some(driver.get_adjacency_digest(std::slice::from_ref(&id)).await?);
            }
        }

        if options.with_degree {
            if statistics.supernode {
                statistics.supernode_degree = Some(self.settings.supernode_threshold);
            } else {
                let filter = ReadableFilter {
                    readable_categories: options.readable_categories.clone(),
                    readable_types: options.readable_types.clone(),
                };
                statistics.degree =
                    Some(driver.get_node_degree(std::slice::from_ref(&id), &filter).await?);
            }
        }

        Ok(statistics)
    }

    async fn detect_supernode(&self, driver: &Arc<dyn GraphDriver>, id: &NativeId) -> Result<bool> {
        if !self.features.detect_supernodes {
            return Ok(false);
        }
        driver
            .is_super_node(id, self.settings.supernode_threshold)
            .await
    }

    /// Attach statistics, at most [`MAX_CONCURRENT_DIGEST_REQS`] nodes at a time
    async fn enrich(&self, nodes: Vec<Node>, options: &StatisticsOptions) -> Result<Vec<Node>> {
        if !options.is_requested() || nodes.is_empty() {
            return Ok(nodes);
        }
        debug!(dao = %self.name(), nodes = nodes.len(), "adding node statistics");
        stream::iter(nodes)
            .map(|mut node| async move {
                node.statistics = Some(self.get_statistics(&node.id, options).await?);
                Ok::<_, DaoError>(node)
            })
            .buffered(MAX_CONCURRENT_DIGEST_REQS)
            .try_collect()
            .await
    }

    // ========================================================================
    // Read operations
    // ========================================================================

    /// All shortest paths between two nodes, as lists of nodes
    pub async fn get_all_shortest_paths(
        &self,
        start_node_id: &str,
        end_node_id: &str,
        options: &ShortestPathOptions,
    ) -> Result<Vec<Vec<Node>>> {
        if !self.features.shortest_paths {
            return Err(self.unsupported("Shortest paths are"));
        }

        let max_depth = options.max_depth.unwrap_or(GraphSettings::DEFAULT_MAX_DEPTH);
        check_integer("maxDepth", max_depth, 0, self.settings.max_path_length)?;
        if start_node_id.is_empty() {
            return Err(DaoError::invalid_parameter("startNode must be defined"));
        }
        let start = self.check_node_id("startNodeId", start_node_id)?;
        if end_node_id.is_empty() {
            return Err(DaoError::invalid_parameter("endNode must be defined"));
        }
        let end = self.check_node_id("endNodeId", end_node_id)?;

        let paths = self
            .driver()?
            .get_all_shortest_paths(
                &start,
                &end,
                max_depth,
                self.settings.shortest_paths_max_results,
            )
            .await?;

        let mut enriched = Vec::with_capacity(paths.len());
        for path in paths {
            enriched.push(self.enrich(path, &options.statistics).await?);
        }
        Ok(enriched)
    }

    pub async fn get_simple_schema(&self) -> Result<SimpleSchema> {
        self.driver()?.get_simple_schema().await
    }

    pub async fn get_node_count(&self, approx: bool) -> Result<u64> {
        if !self.features.can_count {
            return Err(self.unsupported("Counting nodes is"));
        }
        self.driver()?.get_node_count(approx).await
    }

    pub async fn get_edge_count(&self, approx: bool) -> Result<u64> {
        if !self.features.can_count {
            return Err(self.unsupported("Counting edges is"));
        }
        self.driver()?.get_edge_count(approx).await
    }

    pub async fn get_node(&self, options: &GetNodeOptions) -> Result<Node> {
        let id = self.node_ref("nodeId", &options.id, options.alternative_id.as_deref())?;
        let node = self
            .driver()?
            .get_node(&id, options.with_edges)
            .await?
            .ok_or_else(|| node_not_found(&options.id))?;
        let mut nodes = self.enrich(vec![sorted(node)], &options.statistics).await?;
        nodes.pop().ok_or_else(|| node_not_found(&options.id))
    }

    pub async fn get_node_stream(&self, options: StreamOptions) -> Result<ItemStream<Node>> {
        if !self.features.can_stream {
            return Err(self.unsupported("Internal indices are"));
        }
        self.driver()?.get_node_stream(options).await
    }

    pub async fn get_edge_stream(&self, options: StreamOptions) -> Result<ItemStream<Edge>> {
        if !self.features.can_stream {
            return Err(self.unsupported("Internal indices are"));
        }
        self.driver()?.get_edge_stream(options).await
    }

    pub async fn get_nodes_by_id(&self, options: &NodesByIdOptions) -> Result<Vec<Node>> {
        if options.ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids = match &options.alternative_id {
            None => ItemRefs::Native(self.check_node_ids("options.ids", &options.ids, 0)?),
            Some(property) => {
                self.alternative_ids_supported()?;
                check_string_list("options.ids", &options.ids, 0, None)?;
                ItemRefs::Alternative {
                    property: property.clone(),
                    values: options.ids.clone(),
                }
            }
        };

        let nodes: Vec<Node> = self
            .driver()?
            .get_nodes_by_id(&ids, options.edges)
            .await?
            .into_iter()
            .map(sorted)
            .collect();

        if !options.ignore_missing {
            let found = found_ids(&nodes, options.alternative_id.as_deref(), |n| {
                (&n.id, &n.data)
            });
            check_missing("node", &options.ids, found.iter().map(String::as_str))?;
        }

        self.enrich(nodes, &options.statistics).await
    }

    pub async fn get_edges_by_id(&self, options: &EdgesByIdOptions) -> Result<Vec<Edge>> {
        if options.ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids = match &options.alternative_id {
            None => ItemRefs::Native(self.check_edge_ids("options.ids", &options.ids, 0)?),
            Some(property) => {
                self.alternative_ids_supported()?;
                check_string_list("options.ids", &options.ids, 0, None)?;
                ItemRefs::Alternative {
                    property: property.clone(),
                    values: options.ids.clone(),
                }
            }
        };

        let edges = self.driver()?.get_edges_by_id(&ids).await?;
        if !options.ignore_missing {
            let found = found_ids(&edges, options.alternative_id.as_deref(), |e| {
                (&e.id, &e.data)
            });
            check_missing("edge", &options.ids, found.iter().map(String::as_str))?;
        }
        Ok(edges)
    }

    /// Neighbours of `node_ids`
    pub async fn get_adjacent_nodes(
        &self,
        node_ids: &[String],
        options: &AdjacentNodesOptions,
    ) -> Result<Vec<Node>> {
        let ids = self.check_node_ids("ids", node_ids, 1)?;
        let ignored = self.check_node_ids("ignoredNodeIds", &options.ignored_node_ids, 0)?;
        let visible = self.check_node_ids("visibleNodeIds", &options.visible_node_ids, 0)?;

        let categories = match &options.node_category {
            Some(category) => {
                check_non_empty("nodeCategory", category)?;
                Some(vec![category.clone()])
            }
            None => options.statistics.readable_categories.clone(),
        };
        let types = match &options.edge_type {
            Some(edge_type) => {
                check_non_empty("edgeType", edge_type)?;
                Some(vec![edge_type.clone()])
            }
            None => options.statistics.readable_types.clone(),
        };
        if let Some(limit) = options.limit {
            check_integer("limit", limit, 1, MAX_ADJACENT_LIMIT)?;
        }

        let query = AdjacentNodesQuery {
            ignored_node_ids: ignored,
            visible_node_ids: visible,
            categories,
            types,
            limit: options.limit,
            limit_type: options.limit_type,
        };
        let nodes = self
            .driver()?
            .get_adjacent_nodes(&ids, &query)
            .await?
            .into_iter()
            .map(sorted)
            .collect();
        self.enrich(nodes, &options.statistics).await
    }

    /// Neighbour count per edge type; supernode-capable vendors only
    pub async fn get_simple_digest(
        &self,
        node_id: &str,
        readable_types: Option<&[String]>,
    ) -> Result<Vec<SimpleDigestItem>> {
        if !self.features.detect_supernodes {
            return Err(self.unsupported("Computing the simple digest is"));
        }
        let id = self.check_node_id("nodeId", node_id)?;
        self.driver()?.get_simple_digest(&id, readable_types).await
    }

    pub async fn get_adjacency_digest(&self, node_ids: &[String]) -> Result<Vec<DigestItem>> {
        let ids = self.check_node_ids("nodeIds", node_ids, 1)?;
        self.driver()?.get_adjacency_digest(&ids).await
    }

    /// False whenever the vendor cannot detect supernodes
    pub async fn is_super_node(&self, node_id: &str) -> Result<bool> {
        if !self.features.detect_supernodes {
            return Ok(false);
        }
        let id = self.check_node_id("nodeId", node_id)?;
        self.detect_supernode(&self.driver()?, &id).await
    }

    pub async fn get_node_degree(&self, node_ids: &[String], filter: &ReadableFilter) -> Result<u64> {
        let ids = self.check_node_ids("nodeIds", node_ids, 1)?;
        self.driver()?.get_node_degree(&ids, filter).await
    }

    pub async fn get_adjacent_edges(&self, options: &AdjacentEdgesOptions) -> Result<Vec<Edge>> {
        check_exclusive(&[
            ("adjacent", options.adjacent.is_some()),
            ("source", options.source.is_some()),
            ("target", options.target.is_some()),
        ])?;

        let (node_id, orientation) = match (&options.adjacent, &options.source, &options.target) {
            (Some(id), _, _) => (id, Orientation::Both),
            (_, Some(id), _) => (id, Orientation::Source),
            (_, _, Some(id)) => (id, Orientation::Target),
            _ => {
                return Err(DaoError::missing_field(
                    "One of \"adjacent\", \"source\" or \"target\" is required",
                ))
            }
        };
        let node_id = self.check_node_id(&orientation.to_string(), node_id)?;

        if let Some(edge_type) = &options.edge_type {
            check_non_empty("type", edge_type)?;
        }
        if let Some(limit) = options.limit {
            check_integer("limit", limit, 1, u64::MAX)?;
        }

        let query = AdjacentEdgesQuery {
            node_id,
            orientation,
            edge_type: options.edge_type.clone(),
            skip: options.skip.unwrap_or(0),
            limit: options.limit,
        };
        self.driver()?.get_adjacent_edges(&query).await
    }

    pub async fn get_edge(&self, options: &GetEdgeOptions) -> Result<Edge> {
        let id = self.edge_ref("edgeId", &options.id, options.alternative_id.as_deref())?;
        self.driver()?
            .get_edge(&id)
            .await?
            .ok_or_else(|| edge_not_found(&options.id))
    }

    /// Endpoints of the given edges
    pub async fn get_nodes_by_edges_id(
        &self,
        edge_ids: &[String],
        options: &StatisticsOptions,
    ) -> Result<Vec<Node>> {
        if edge_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = self.check_edge_ids("edgeIds", edge_ids, 1)?;
        let nodes = self
            .driver()?
            .get_nodes_by_edges_id(&ids)
            .await?
            .into_iter()
            .map(sorted)
            .collect();
        self.enrich(nodes, options).await
    }

    /// Run a query in one of the vendor's dialects
    pub async fn raw_query(&self, options: &RawQueryOptions) -> Result<Vec<QueryMatch>> {
        let dialect = match options.dialect.as_deref() {
            None | Some("") => self.features.default_dialect().to_string(),
            Some(dialect) => dialect.to_string(),
        };
        let dialects: Vec<&str> = self.features.dialects.iter().map(String::as_str).collect();
        check_values("dialect", &dialect, &dialects)?;
        check_non_empty("options.query", &options.query)?;
        check_integer(
            "options.limit",
            options.limit,
            1,
            self.settings.max_matches_limit,
        )?;

        let query = RawQuery {
            dialect,
            query: options.query.clone(),
            can_write: options.can_write,
            populated: options.populated,
            limit: options.limit,
        };
        let matches = self.driver()?.raw_query(&query).await?;
        if !options.populated {
            // ids only, nothing to enrich
            return Ok(matches);
        }

        let mut enriched = Vec::with_capacity(matches.len());
        for mut found in matches {
            let nodes = std::mem::take(&mut found.nodes).into_iter().map(sorted).collect();
            found.nodes = self.enrich(nodes, &options.statistics).await?;
            enriched.push(found);
        }
        Ok(enriched)
    }

    // ========================================================================
    // Write operations
    // ========================================================================

    pub async fn create_node(&self, node: NewNode) -> Result<Node> {
        let data = normalize_properties(node.data, self.features.serialize_array_properties)?;
        check_string_list(
            "categories",
            &node.categories,
            self.features.min_node_categories,
            self.features.max_node_categories,
        )?;
        let node = NewNode {
            categories: node.categories,
            data,
        };

        let driver = self.driver()?;
        if !self.features.empty_nodes && driver.is_empty_node(&node) {
            return Err(DaoError::invalid_parameter(
                "A node must have at least one property or one category.",
            ));
        }

        driver.create_node(node).await?.map(sorted).ok_or_else(|| {
            DaoError::business(ErrorKey::CreationFailed, "Could not create the given node.")
        })
    }

    pub async fn update_node(&self, node_id: &str, update: NodeUpdate) -> Result<Node> {
        let id = self.check_node_id("nodeId", node_id)?;
        let data = normalize_properties(update.data, self.features.serialize_array_properties)?;
        check_string_list("deletedProperties", &update.deleted_properties, 0, None)?;
        check_string_list("addedCategories", &update.added_categories, 0, None)?;
        check_string_list("deletedCategories", &update.deleted_categories, 0, None)?;

        if self.features.immutable_node_categories {
            if !update.added_categories.is_empty() {
                return Err(DaoError::business(
                    ErrorKey::NotImplemented,
                    "Cannot add categories to a node (immutable).",
                ));
            }
            if !update.deleted_categories.is_empty() {
                return Err(DaoError::business(
                    ErrorKey::NotImplemented,
                    "Cannot delete categories from a node (immutable).",
                ));
            }
        }

        let update = NodeUpdate { data, ..update };
        self.driver()?
            .update_node(&id, update)
            .await?
            .map(sorted)
            .ok_or_else(|| node_not_found(node_id))
    }

    pub async fn delete_node(&self, node_id: &str) -> Result<()> {
        let id = self.check_node_id("nodeId", node_id)?;
        if self.driver()?.delete_node(&id).await? {
            Ok(())
        } else {
            Err(node_not_found(node_id))
        }
    }

    pub async fn create_edge(&self, edge: NewEdge) -> Result<Edge> {
        if edge.source.is_empty() || edge.target.is_empty() {
            return Err(DaoError::missing_field("Missing source and/or target."));
        }
        let source = self.check_node_id("source", &edge.source)?;
        let target = self.check_node_id("target", &edge.target)?;
        check_non_empty("type", &edge.edge_type)?;

        let data = self.normalize_edge_properties(edge.data)?;

        self.driver()?
            .create_edge(EdgeCreation {
                source,
                target,
                edge_type: edge.edge_type,
                data,
            })
            .await?
            .ok_or_else(|| {
                DaoError::business(ErrorKey::CreationFailed, "Could not create the given edge.")
            })
    }

    pub async fn update_edge(&self, edge_id: &str, update: EdgeUpdate) -> Result<Edge> {
        if !self.features.edge_properties {
            return Err(self.unsupported("Edge properties are"));
        }
        let id = self.check_edge_id("edgeId", edge_id)?;
        check_string_list("deletedProperties", &update.deleted_properties, 0, None)?;
        let data = self.normalize_edge_properties(update.data)?;
        if update.edge_type.is_some() {
            return Err(DaoError::business(
                ErrorKey::NotImplemented,
                "Cannot change the type of an edge.",
            ));
        }

        let update = EdgeUpdate {
            data,
            deleted_properties: update.deleted_properties,
            edge_type: None,
        };
        self.driver()?
            .update_edge(&id, update)
            .await?
            .ok_or_else(|| edge_not_found(edge_id))
    }

    pub async fn delete_edge(&self, edge_id: &str) -> Result<()> {
        let id = self.check_edge_id("edgeId", edge_id)?;
        if self.driver()?.delete_edge(&id).await? {
            Ok(())
        } else {
            Err(edge_not_found(edge_id))
        }
    }

    fn normalize_edge_properties(&self, data: Properties) -> Result<Properties> {
        if !self.features.edge_properties && !data.is_empty() {
            return Err(self.unsupported("Edge properties are"));
        }
        normalize_properties(data, self.features.serialize_array_properties)
    }
}

impl std::fmt::Debug for GraphDao {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphDao")
            .field("core", &self.core)
            .field("features", &self.features)
            .finish()
    }
}

fn check_array_len(key: &str, len: usize, min: usize) -> Result<()> {
    if len < min {
        return Err(DaoError::invalid_parameter(format!(
            "\"{key}\" must contain at least {min} item(s)"
        )));
    }
    Ok(())
}

fn sorted(mut node: Node) -> Node {
    node.sort_categories();
    node
}

/// Ids as callers know them: native, or the alternative-id property value
fn found_ids<T>(
    items: &[T],
    alternative: Option<&str>,
    parts: impl Fn(&T) -> (&String, &Properties),
) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| {
            let (id, data) = parts(item);
            match alternative {
                None => Some(id.clone()),
                Some(property) => property_as_id(data, property),
            }
        })
        .collect()
}

fn node_not_found(id: &str) -> DaoError {
    DaoError::business(ErrorKey::NodeNotFound, format!("Node #{id} was not found."))
}

fn edge_not_found(id: &str) -> DaoError {
    DaoError::business(ErrorKey::EdgeNotFound, format!("Edge #{id} was not found."))
}
