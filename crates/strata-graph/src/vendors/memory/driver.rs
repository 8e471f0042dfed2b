//! Graph driver over the in-process store.

use super::store::{MemoryGraph, MemoryStore};
use super::MemoryConnector;
use crate::driver::{
    AdjacentEdgesQuery, AdjacentNodesQuery, EdgeCreation, EdgePolicy, EdgeUpdate, GraphDriver,
    GraphDriverContext, ItemRef, ItemRefs, LimitType, NewNode, NodeUpdate, Orientation,
    QueryMatch, RawQuery, ReadableFilter, StreamOptions,
};
use crate::util::{order_path, populate_nodes_with_edges};
use async_trait::async_trait;
use futures::{stream, StreamExt};
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use strata_core::{
    downcast_connector, CategoryFilter, DaoError, DigestItem, Driver, Edge, ItemStream, NativeId,
    Node, Result, SimpleDigestItem, SimpleSchema,
};

/// Dialect of [`MemoryDriver::raw_query`]: comma-separated categories,
/// or `*` for every node
pub const CATEGORY_DIALECT: &str = "categories";

pub struct MemoryDriver {
    store: Arc<MemoryStore>,
}

impl MemoryDriver {
    pub fn create(context: GraphDriverContext) -> Result<Arc<dyn GraphDriver>> {
        let connector = downcast_connector::<MemoryConnector>(context.connector)?;
        Ok(Arc::new(Self {
            store: connector.store(),
        }))
    }
}

fn decode(key: &str, id: &str) -> Result<NativeId> {
    match id.parse::<i64>() {
        Ok(n) if n > 0 => Ok(NativeId::Int(n)),
        _ => Err(DaoError::invalid_parameter(format!(
            "\"{key}\" must be a positive integer (got \"{id}\")"
        ))),
    }
}

fn native(id: &NativeId) -> Result<u64> {
    match id {
        NativeId::Int(n) if *n > 0 => Ok(*n as u64),
        other => Err(DaoError::bug(format!("Undecoded memory id \"{other}\""))),
    }
}

fn natives(ids: &[NativeId]) -> Result<Vec<u64>> {
    ids.iter().map(native).collect()
}

fn accepts_type(types: Option<&[String]>, edge: &Edge) -> bool {
    types.map_or(true, |types| types.iter().any(|t| *t == edge.edge_type))
}

fn accepts_categories(categories: Option<&[String]>, node_categories: &[String]) -> bool {
    categories.map_or(true, |filters| {
        filters
            .iter()
            .any(|f| CategoryFilter::parse(f).matches(node_categories))
    })
}

impl MemoryDriver {
    fn node_ids(graph: &MemoryGraph, refs: &ItemRefs) -> Result<Vec<u64>> {
        match refs {
            ItemRefs::Native(ids) => natives(ids),
            ItemRefs::Alternative { property, values } => Ok(values
                .iter()
                .flat_map(|v| graph.nodes_by_property(property, v))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()),
        }
    }

    fn edges_for(graph: &MemoryGraph, nodes: &[Node], policy: EdgePolicy) -> Vec<Edge> {
        if policy == EdgePolicy::None {
            return Vec::new();
        }
        let mut seen = HashSet::new();
        nodes
            .iter()
            .filter_map(|n| n.id.parse::<u64>().ok())
            .flat_map(|id| graph.incident_edges(id, None))
            .filter(|e| seen.insert(e.id.clone()))
            .collect()
    }
}

impl Driver for MemoryDriver {}

#[async_trait]
impl GraphDriver for MemoryDriver {
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
        let graph = self.store.read();
        let steps = graph.shortest_paths(
            native(start)?,
            native(end)?,
            max_depth,
            usize::try_from(max_results).unwrap_or(usize::MAX),
        );

        steps
            .into_iter()
            .map(|(node_ids, edge_ids)| {
                let nodes = node_ids.iter().filter_map(|id| graph.node(*id)).collect();
                let edges = edge_ids.iter().filter_map(|id| graph.edge(*id)).collect();
                order_path(&start.to_string(), nodes, edges)
            })
            .collect()
    }

    async fn get_simple_schema(&self) -> Result<SimpleSchema> {
        let (node_categories, edge_types, node_properties, edge_properties) =
            self.store.read().schema();
        Ok(SimpleSchema {
            node_categories,
            edge_types,
            node_properties,
            edge_properties,
        })
    }

    async fn get_node_count(&self, _approx: bool) -> Result<u64> {
        Ok(self.store.read().node_count() as u64)
    }

    async fn get_edge_count(&self, _approx: bool) -> Result<u64> {
        Ok(self.store.read().edge_count() as u64)
    }

    async fn get_node(&self, id: &ItemRef, with_edges: bool) -> Result<Option<Node>> {
        let graph = self.store.read();
        let id = match id {
            ItemRef::Native(id) => Some(native(id)?),
            ItemRef::Alternative { property, value } => {
                graph.nodes_by_property(property, value).into_iter().next()
            }
        };
        let Some(node) = id.and_then(|id| graph.node(id)) else {
            return Ok(None);
        };
        if !with_edges {
            return Ok(Some(node));
        }
        let nodes = vec![node];
        let edges = Self::edges_for(&graph, &nodes, EdgePolicy::All);
        Ok(populate_nodes_with_edges(nodes, edges, EdgePolicy::All, &[])
            .into_iter()
            .next())
    }

    async fn get_node_stream(&self, options: StreamOptions) -> Result<ItemStream<Node>> {
        let offset = usize::try_from(options.offset).unwrap_or(usize::MAX);
        let nodes: Vec<Node> = self.store.read().all_nodes().into_iter().skip(offset).collect();
        Ok(stream::iter(nodes.into_iter().map(Ok)).boxed())
    }

    async fn get_edge_stream(&self, options: StreamOptions) -> Result<ItemStream<Edge>> {
        let offset = usize::try_from(options.offset).unwrap_or(usize::MAX);
        let edges: Vec<Edge> = self.store.read().all_edges().into_iter().skip(offset).collect();
        Ok(stream::iter(edges.into_iter().map(Ok)).boxed())
    }

    async fn get_nodes_by_id(&self, ids: &ItemRefs, edges: EdgePolicy) -> Result<Vec<Node>> {
        let graph = self.store.read();
        let nodes: Vec<Node> = Self::node_ids(&graph, ids)?
            .into_iter()
            .filter_map(|id| graph.node(id))
            .collect();
        let found = Self::edges_for(&graph, &nodes, edges);
        Ok(populate_nodes_with_edges(nodes, found, edges, &[]))
    }

    async fn get_edges_by_id(&self, ids: &ItemRefs) -> Result<Vec<Edge>> {
        let graph = self.store.read();
        let ids: Vec<u64> = match ids {
            ItemRefs::Native(ids) => natives(ids)?,
            ItemRefs::Alternative { property, values } => values
                .iter()
                .flat_map(|v| graph.edges_by_property(property, v))
                .collect(),
        };
        Ok(ids.into_iter().filter_map(|id| graph.edge(id)).collect())
    }

    async fn get_adjacent_nodes(
        &self,
        node_ids: &[NativeId],
        query: &AdjacentNodesQuery,
    ) -> Result<Vec<Node>> {
        let graph = self.store.read();
        let sources = natives(node_ids)?;
        let source_set: HashSet<u64> = sources.iter().copied().collect();
        let visible: HashSet<u64> = natives(&query.visible_node_ids)?.into_iter().collect();
        let ignored: HashSet<u64> = natives(&query.ignored_node_ids)?.into_iter().collect();
        let types = query.types.as_deref();

        let mut neighbours = BTreeSet::new();
        for source in &sources {
            for (_, other) in graph.neighbours(*source, |e| accepts_type(types, e)) {
                if source_set.contains(&other) || visible.contains(&other) || ignored.contains(&other)
                {
                    continue;
                }
                let categories = graph
                    .stored_node(other)
                    .map(|n| n.categories.as_slice())
                    .unwrap_or_default();
                if accepts_categories(query.categories.as_deref(), categories) {
                    neighbours.insert(other);
                }
            }
        }

        let mut neighbours: Vec<u64> = neighbours.into_iter().collect();
        match query.limit_type {
            LimitType::Id => {}
            LimitType::LowestDegree => neighbours.sort_by_key(|id| (graph.degree(*id), *id)),
            LimitType::HighestDegree => {
                neighbours.sort_by_key(|id| (Reverse(graph.degree(*id)), *id))
            }
        }
        if let Some(limit) = query.limit {
            neighbours.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }

        let mut result_ids: Vec<u64> = sources
            .iter()
            .copied()
            .filter(|id| graph.contains_node(*id))
            .collect();
        result_ids.extend(neighbours);
        let nodes: Vec<Node> = result_ids.iter().filter_map(|id| graph.node(*id)).collect();

        // edges between the result and the result plus visible nodes
        let reachable: HashSet<String> = result_ids
            .iter()
            .chain(visible.iter())
            .map(u64::to_string)
            .collect();
        let edges: Vec<Edge> = Self::edges_for(&graph, &nodes, EdgePolicy::All)
            .into_iter()
            .filter(|e| accepts_type(types, e))
            .filter(|e| reachable.contains(&e.source) && reachable.contains(&e.target))
            .collect();
        Ok(populate_nodes_with_edges(nodes, edges, EdgePolicy::All, &[]))
    }

    async fn get_simple_digest(
        &self,
        node_id: &NativeId,
        readable_types: Option<&[String]>,
    ) -> Result<Vec<SimpleDigestItem>> {
        let graph = self.store.read();
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for edge in graph.incident_edges(native(node_id)?, None) {
            if accepts_type(readable_types, &edge) {
                *counts.entry(edge.edge_type).or_default() += 1;
            }
        }
        Ok(counts
            .into_iter()
            .map(|(edge_type, edges)| SimpleDigestItem { edge_type, edges })
            .collect())
    }

    async fn get_adjacency_digest(&self, node_ids: &[NativeId]) -> Result<Vec<DigestItem>> {
        let graph = self.store.read();
        let mut groups: BTreeMap<(Vec<String>, String), (BTreeSet<u64>, BTreeSet<String>)> =
            BTreeMap::new();
        for id in natives(node_ids)? {
            for (edge, other) in graph.neighbours(id, |_| true) {
                let categories = graph
                    .stored_node(other)
                    .map(|n| {
                        let mut c = n.categories.clone();
                        c.sort();
                        c
                    })
                    .unwrap_or_default();
                let entry = groups.entry((categories, edge.edge_type.clone())).or_default();
                entry.0.insert(other);
                entry.1.insert(edge.id);
            }
        }
        Ok(groups
            .into_iter()
            .map(|((node_categories, edge_type), (nodes, edges))| DigestItem {
                node_categories,
                edge_type,
                nodes: nodes.len() as u64,
                edges: edges.len() as u64,
            })
            .collect())
    }

    async fn is_super_node(&self, node_id: &NativeId, threshold: u64) -> Result<bool> {
        let graph = self.store.read();
        let id = native(node_id)?;
        Ok(graph.contains_node(id) && graph.degree(id) as u64 >= threshold)
    }

    async fn get_node_degree(&self, node_ids: &[NativeId], filter: &ReadableFilter) -> Result<u64> {
        let graph = self.store.read();
        let ids = natives(node_ids)?;
        let inputs: HashSet<u64> = ids.iter().copied().collect();
        let types = filter.readable_types.as_deref();

        let mut neighbours = HashSet::new();
        for id in ids {
            for (_, other) in graph.neighbours(id, |e| accepts_type(types, e)) {
                if inputs.contains(&other) {
                    continue;
                }
                let categories = graph
                    .stored_node(other)
                    .map(|n| n.categories.as_slice())
                    .unwrap_or_default();
                if accepts_categories(filter.readable_categories.as_deref(), categories) {
                    neighbours.insert(other);
                }
            }
        }
        Ok(neighbours.len() as u64)
    }

    async fn create_node(&self, node: NewNode) -> Result<Option<Node>> {
        Ok(Some(self.store.write().add_node(node.categories, node.data)))
    }

    async fn update_node(&self, id: &NativeId, update: NodeUpdate) -> Result<Option<Node>> {
        Ok(self.store.write().update_node(
            native(id)?,
            update.data,
            &update.deleted_properties,
            &update.added_categories,
            &update.deleted_categories,
        ))
    }

    async fn delete_node(&self, id: &NativeId) -> Result<bool> {
        Ok(self.store.write().remove_node(native(id)?))
    }

    async fn get_adjacent_edges(&self, query: &AdjacentEdgesQuery) -> Result<Vec<Edge>> {
        let direction = match query.orientation {
            Orientation::Both => None,
            Orientation::Source => Some(Direction::Outgoing),
            Orientation::Target => Some(Direction::Incoming),
        };
        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let limit = query
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));

        Ok(self
            .store
            .read()
            .incident_edges(native(&query.node_id)?, direction)
            .into_iter()
            .filter(|e| query.edge_type.as_ref().map_or(true, |t| *t == e.edge_type))
            .skip(skip)
            .take(limit)
            .collect())
    }

    async fn get_edge(&self, id: &ItemRef) -> Result<Option<Edge>> {
        let graph = self.store.read();
        let id = match id {
            ItemRef::Native(id) => Some(native(id)?),
            ItemRef::Alternative { property, value } => {
                graph.edges_by_property(property, value).into_iter().next()
            }
        };
        Ok(id.and_then(|id| graph.edge(id)))
    }

    async fn create_edge(&self, edge: EdgeCreation) -> Result<Option<Edge>> {
        Ok(self.store.write().add_edge(
            native(&edge.source)?,
            native(&edge.target)?,
            edge.edge_type,
            edge.data,
        ))
    }

    async fn update_edge(&self, id: &NativeId, update: EdgeUpdate) -> Result<Option<Edge>> {
        Ok(self
            .store
            .write()
            .update_edge(native(id)?, update.data, &update.deleted_properties))
    }

    async fn delete_edge(&self, id: &NativeId) -> Result<bool> {
        Ok(self.store.write().remove_edge(native(id)?))
    }

    async fn raw_query(&self, query: &RawQuery) -> Result<Vec<QueryMatch>> {
        if query.dialect != CATEGORY_DIALECT {
            return Err(DaoError::invalid_parameter(format!(
                "Unsupported dialect \"{}\"",
                query.dialect
            )));
        }
        let filters: Vec<String> = query
            .query
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        let everything = filters.iter().any(|f| f == "*");

        let graph = self.store.read();
        let limit = usize::try_from(query.limit).unwrap_or(usize::MAX);
        Ok(graph
            .all_nodes()
            .into_iter()
            .filter(|n| everything || accepts_categories(Some(filters.as_slice()), &n.categories))
            .take(limit)
            .map(|mut node| {
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
