//! Capability-gated index DAO.
//!
//! An index DAO is always paired with a graph DAO: connectors read the
//! graph options, drivers read the graph through it, and `full` searches
//! are answered with items fetched from it.

use crate::driver::{IndexDriver, IndexDriverContext, IndexEntry, IndexProgress, PropertyType};
use crate::features::IndexFeatures;
use crate::params::{IndexSettings, SearchOptions, SearchQuery};
use crate::registry::{IndexRegistry, IndexVendor};
use crate::util::build_search_response;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use strata_core::checks::{check_integer, check_non_empty, check_string_list};
use strata_core::{
    retry, ConnectionInfo, DaoCore, DaoDeclaration, DaoError, DaoKind, DaoOptions, DriverTable,
    Edge, ItemType, Node, RawSearchResult, Result, SearchResponse, SearchResults, SimpleSchema,
};
use strata_graph::{EdgesByIdOptions, GraphDao, NodesByIdOptions};
use tracing::{debug, info};

/// Options every index vendor requires
pub const INDEX_REQUIRED_OPTIONS: [&str; 1] = ["indexName"];

/// Options every index vendor accepts on top of its own
pub const INDEX_OPTIONS: [&str; 1] = ["skipEdgeIndexation"];

/// Lowest accepted fuzziness; 1 means exact
pub const MIN_FUZZINESS: f64 = 0.1;

/// Index DAO bound to one vendor and one graph DAO
pub struct IndexDao {
    core: DaoCore<dyn IndexDriver>,
    features: IndexFeatures,
    settings: IndexSettings,
    node_version_offset: i64,
    graph: Arc<GraphDao>,
    registry: IndexRegistry,
}

impl IndexDao {
    /// Resolve `vendor` and build a DAO on top of `graph`. Invalid options,
    /// a malformed declaration or an unsupported graph vendor fail here.
    pub fn create(
        registry: &IndexRegistry,
        vendor: &str,
        options: DaoOptions,
        graph: Arc<GraphDao>,
        settings: IndexSettings,
    ) -> Result<Self> {
        let declaration = registry.vendor(vendor)?;
        Self::from_vendor(registry, declaration, options, graph, settings)
    }

    pub fn from_vendor(
        registry: &IndexRegistry,
        vendor: IndexVendor,
        mut options: DaoOptions,
        graph: Arc<GraphDao>,
        settings: IndexSettings,
    ) -> Result<Self> {
        let IndexVendor {
            name,
            features,
            options: schema,
            connectors,
            drivers,
            graph_vendors,
            node_version_offset,
        } = vendor;

        features.validate(&name)?;
        if let Some(supported) = &graph_vendors {
            if !supported.iter().any(|v| v == graph.vendor()) {
                return Err(DaoError::invalid_parameter(format!(
                    "Index vendor {name} is not compatible with the graph vendor \"{}\". \
                     Please use one of the following instead: {}",
                    graph.vendor(),
                    supported.join(", ")
                )));
            }
        }
        if !features.can_index_edges {
            options.insert("skipEdgeIndexation", true);
        }

        let declaration = DaoDeclaration {
            kind: DaoKind::Index,
            vendor: name,
            schema: schema.extend(&INDEX_REQUIRED_OPTIONS, &INDEX_OPTIONS),
            connectors,
            drivers: DriverTable::from_pairs(&drivers)?,
        };
        let core = DaoCore::new(
            declaration,
            options,
            Some(graph.options().clone()),
            Arc::new(registry.connectors().clone()),
            settings.connect_timeout,
        )?;

        Ok(Self {
            core,
            features,
            settings,
            node_version_offset,
            graph,
            registry: registry.clone(),
        })
    }

    // ========================================================================
    // Accessors and lifecycle
    // ========================================================================

    pub fn vendor(&self) -> &str {
        self.core.vendor()
    }

    /// e.g. `Index DAO (elasticSearch)`
    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn options(&self) -> &DaoOptions {
        self.core.options()
    }

    pub fn get_option(&self, key: &str, default: Value) -> Value {
        self.core.get_option(key, default)
    }

    pub fn features(&self) -> &IndexFeatures {
        &self.features
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    pub fn graph(&self) -> &Arc<GraphDao> {
        &self.graph
    }

    /// Whether edges stay out of the index
    pub fn skip_edge_indexation(&self) -> bool {
        self.core
            .options()
            .get_bool("skipEdgeIndexation")
            .unwrap_or(false)
    }

    pub fn connection_info(&self) -> Option<ConnectionInfo> {
        self.core.connection_info()
    }

    pub fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    /// Connect, negotiate a driver for the live version and return it
    pub async fn connect(&self) -> Result<String> {
        let index_options = self.core.options().clone();
        let graph = self.graph.clone();
        let registry = &self.registry;
        self.core
            .connect(|binding| {
                let factory = registry.driver(&binding.driver)?;
                factory(IndexDriverContext {
                    connector: binding.connector,
                    graph,
                    index_options,
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

    pub async fn on_after_indexation(&self) -> Result<()> {
        self.core.on_after_indexation().await
    }

    fn driver(&self) -> Result<Arc<dyn IndexDriver>> {
        self.core.driver()
    }

    fn unsupported(&self, what: &str) -> DaoError {
        DaoError::not_supported(format!(
            "{what} not supported by {}.",
            self.core.vendor()
        ))
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Full-text search of nodes or edges
    pub async fn search(
        &self,
        item_type: ItemType,
        text: &str,
        options: &SearchOptions,
    ) -> Result<SearchResponse> {
        if text.is_empty() {
            return Err(DaoError::missing_field("Query `q` is required"));
        }
        if item_type == ItemType::Edge && !self.features.can_index_edges {
            return Ok(SearchResponse::empty(item_type));
        }

        let query = self.search_query(item_type, text, options)?;
        debug!(dao = %self.name(), %item_type, from = query.from, size = query.size, "search");
        let raw = self.driver()?.search(&query).await?;

        if options.full {
            return self.full_response(item_type, raw).await;
        }
        Ok(build_search_response(item_type, raw, options.id_only))
    }

    /// Validate `options`, apply defaults and move category filters aside
    fn search_query(
        &self,
        item_type: ItemType,
        text: &str,
        options: &SearchOptions,
    ) -> Result<SearchQuery> {
        if let Some(size) = options.size {
            check_integer("options.size", size, 1, u64::MAX)?;
        }
        if let Some(categories) = &options.categories_or_types {
            check_string_list("options.categoriesOrTypes", categories, 0, None)?;
        }
        for (i, (key, _)) in options.filter.iter().enumerate() {
            check_non_empty(&format!("options.filter[{i}][0]"), key)?;
        }
        if options.full && options.id_only {
            return Err(DaoError::invalid_parameter(
                "'options.full' and 'options.idOnly' cannot be both true.",
            ));
        }

        let fuzziness = match options.fuzziness {
            Some(f) if !f.is_finite() => {
                return Err(DaoError::invalid_parameter(
                    "\"options.fuzziness\" must be a number",
                ))
            }
            Some(f) => f,
            None => self.settings.default_fuzziness,
        };

        let category_key = SearchQuery::category_filter_key(item_type);
        let (category_filters, filter): (Vec<_>, Vec<_>) = options
            .filter
            .iter()
            .cloned()
            .partition(|(key, _)| key == category_key);
        let mut categories_or_types = options.categories_or_types.clone();
        if !category_filters.is_empty() {
            categories_or_types
                .get_or_insert_with(Vec::new)
                .extend(category_filters.into_iter().map(|(_, value)| value));
        }

        Ok(SearchQuery {
            item_type,
            text: text.to_string(),
            from: options.from.unwrap_or(0),
            size: options.size.unwrap_or(IndexSettings::DEFAULT_PAGE_SIZE),
            fuzziness: fuzziness.clamp(MIN_FUZZINESS, 1.0),
            filter,
            categories_or_types,
            id_only: options.id_only,
        })
    }

    /// Replace hits with the items read from the graph, in hit order
    async fn full_response(&self, item_type: ItemType, raw: RawSearchResult) -> Result<SearchResponse> {
        let ids: Vec<String> = raw.hits.into_iter().map(|hit| hit.id).collect();
        let results = match item_type {
            ItemType::Node => {
                let options = NodesByIdOptions {
                    ids,
                    ignore_missing: true,
                    ..Default::default()
                };
                SearchResults::Nodes(self.graph.get_nodes_by_id(&options).await?)
            }
            ItemType::Edge => {
                let options = EdgesByIdOptions {
                    ids,
                    ignore_missing: true,
                    ..Default::default()
                };
                SearchResults::Edges(self.graph.get_edges_by_id(&options).await?)
            }
        };
        Ok(SearchResponse {
            item_type,
            total_hits: raw.total_hits,
            more_results: raw.more_results,
            results,
        })
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Number of indexed nodes or edges
    pub async fn get_size(&self, item_type: ItemType) -> Result<u64> {
        if !self.features.can_count {
            return Err(self.unsupported("Counting nodes and edges is"));
        }
        self.driver()?.get_size(item_type).await
    }

    /// Schema from the index when it knows properties, otherwise the graph's
    pub async fn get_schema(&self) -> Result<SimpleSchema> {
        if self.features.schema.properties {
            return self.driver()?.get_schema().await;
        }
        self.graph.get_simple_schema().await
    }

    /// Property name → type; empty when the index is untyped
    pub async fn get_property_types(
        &self,
        item_type: ItemType,
    ) -> Result<BTreeMap<String, PropertyType>> {
        if !self.features.typing {
            return Ok(BTreeMap::new());
        }
        self.driver()?.get_property_types(item_type).await
    }

    /// Set `version` on every item: 1 everywhere when the index has no
    /// versions, otherwise the indexed version or 0 when not indexed
    pub async fn set_versions(&self, nodes: &mut [Node], edges: &mut [Edge]) -> Result<()> {
        if nodes.is_empty() && edges.is_empty() {
            return Ok(());
        }
        if !self.features.versions {
            nodes.iter_mut().for_each(|n| n.version = Some(1));
            edges.iter_mut().for_each(|e| e.version = Some(1));
            return Ok(());
        }

        let driver = self.driver()?;
        let node_versions = if nodes.is_empty() {
            BTreeMap::new()
        } else {
            let ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
            driver.get_item_versions(ItemType::Node, &ids).await?
        };
        let edge_versions = if edges.is_empty() {
            BTreeMap::new()
        } else {
            let ids: Vec<String> = edges.iter().map(|e| e.id.clone()).collect();
            driver.get_item_versions(ItemType::Edge, &ids).await?
        };

        for node in nodes.iter_mut() {
            node.version = Some(
                node_versions
                    .get(&node.id)
                    .map_or(0, |v| v + self.node_version_offset),
            );
        }
        for edge in edges.iter_mut() {
            edge.version = Some(edge_versions.get(&edge.id).copied().unwrap_or(0));
        }
        Ok(())
    }

    // ========================================================================
    // Writes (no-ops on external indices)
    // ========================================================================

    pub async fn add_entries(&self, nodes: &[Node], edges: &[Edge]) -> Result<()> {
        if self.features.external || (nodes.is_empty() && edges.is_empty()) {
            return Ok(());
        }
        self.driver()?.add_entries(nodes, edges).await
    }

    /// Write one entry and return its version
    pub async fn upsert_entry(&self, entry: &IndexEntry) -> Result<i64> {
        if self.features.external {
            return Ok(1);
        }
        check_non_empty("id", entry.id())?;
        self.driver()?.upsert_entry(entry).await
    }

    pub async fn delete_entry(
        &self,
        item_type: ItemType,
        id: &str,
        ignore_not_found: bool,
    ) -> Result<()> {
        if self.features.external {
            return Ok(());
        }
        check_non_empty("id", id)?;
        self.driver()?
            .delete_entry(item_type, id, ignore_not_found)
            .await
    }

    /// Drop every entry and start from an empty index
    pub async fn clear(&self) -> Result<()> {
        if self.features.external {
            return Ok(());
        }
        let driver = self.driver()?;
        info!(dao = %self.name(), "clearing the index");
        driver.delete_if_exists().await?;
        driver.create_index().await
    }

    /// Make written entries searchable; retried on technical failures
    pub async fn commit(&self) -> Result<()> {
        if self.features.external {
            return Ok(());
        }
        let driver = self.driver()?;
        retry(
            "Index commit",
            self.settings.commit,
            DaoError::is_business,
            || driver.commit(),
        )
        .await
    }

    /// Re-index the whole graph through the driver, then commit
    pub async fn index_source(&self, progress: &IndexProgress) -> Result<()> {
        if self.features.external {
            return Ok(());
        }
        let driver = self.driver()?;
        self.graph.on_internal_indexation().await?;
        info!(dao = %self.name(), "indexing the graph");
        driver.index_source(progress).await?;
        self.commit().await
    }
}

impl std::fmt::Debug for IndexDao {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexDao")
            .field("core", &self.core)
            .field("features", &self.features)
            .finish()
    }
}
