//! In-process property graph backed by a petgraph `StableGraph`.
//!
//! Node and edge ids are monotonic counters kept apart from petgraph
//! indices, so a deleted id is never handed out again.

use crate::util::property_as_id;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use strata_core::{DaoError, Edge, Node, Properties, Result};

#[derive(Debug, Clone)]
pub struct StoredNode {
    pub id: u64,
    pub categories: Vec<String>,
    pub data: Properties,
}

#[derive(Debug, Clone)]
pub struct StoredEdge {
    pub id: u64,
    pub edge_type: String,
    pub data: Properties,
}

/// Serialized graph used to seed a store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub nodes: Vec<FixtureNode>,
    #[serde(default)]
    pub edges: Vec<FixtureEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureNode {
    /// Local key referenced by fixture edges
    pub key: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub data: Properties,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: String,
    #[serde(default)]
    pub data: Properties,
}

/// Node ids of a path, in order, and the edge ids joining them
pub type PathSteps = (Vec<u64>, Vec<u64>);

#[derive(Debug, Default)]
pub struct MemoryGraph {
    graph: StableGraph<StoredNode, StoredEdge>,
    nodes: HashMap<u64, NodeIndex>,
    edges: HashMap<u64, EdgeIndex>,
    last_node_id: u64,
    last_edge_id: u64,
}

impl MemoryGraph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains_node(&self, id: u64) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn stored_node(&self, id: u64) -> Option<&StoredNode> {
        self.nodes.get(&id).and_then(|ix| self.graph.node_weight(*ix))
    }

    pub fn node(&self, id: u64) -> Option<Node> {
        self.stored_node(id).map(to_node)
    }

    pub fn edge(&self, id: u64) -> Option<Edge> {
        let ix = *self.edges.get(&id)?;
        self.to_edge(ix)
    }

    fn to_edge(&self, ix: EdgeIndex) -> Option<Edge> {
        let stored = self.graph.edge_weight(ix)?;
        let (source, target) = self.graph.edge_endpoints(ix)?;
        Some(Edge::new(
            stored.id.to_string(),
            stored.edge_type.clone(),
            self.graph[source].id.to_string(),
            self.graph[target].id.to_string(),
            stored.data.clone(),
        ))
    }

    /// Every node, by ascending id
    pub fn all_nodes(&self) -> Vec<Node> {
        let mut ids: Vec<u64> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter().filter_map(|id| self.node(id)).collect()
    }

    /// Every edge, by ascending id
    pub fn all_edges(&self) -> Vec<Edge> {
        let mut ids: Vec<u64> = self.edges.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter().filter_map(|id| self.edge(id)).collect()
    }

    /// Nodes whose `property` reads as `value`
    pub fn nodes_by_property(&self, property: &str, value: &str) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .graph
            .node_weights()
            .filter(|n| property_as_id(&n.data, property).as_deref() == Some(value))
            .map(|n| n.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn edges_by_property(&self, property: &str, value: &str) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .graph
            .edge_weights()
            .filter(|e| property_as_id(&e.data, property).as_deref() == Some(value))
            .map(|e| e.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Edges touching `node` in the given direction (`None` for both),
    /// self-loops once, by ascending edge id
    pub fn incident_edges(&self, node: u64, direction: Option<Direction>) -> Vec<Edge> {
        let Some(ix) = self.nodes.get(&node).copied() else {
            return Vec::new();
        };
        let directions: &[Direction] = match direction {
            Some(Direction::Outgoing) => &[Direction::Outgoing],
            Some(Direction::Incoming) => &[Direction::Incoming],
            None => &[Direction::Outgoing, Direction::Incoming],
        };

        let mut seen = BTreeSet::new();
        for dir in directions {
            for edge in self.graph.edges_directed(ix, *dir) {
                seen.insert(edge.id());
            }
        }
        let mut edges: Vec<Edge> = seen.into_iter().filter_map(|e| self.to_edge(e)).collect();
        edges.sort_by_key(|e| e.id.parse::<u64>().unwrap_or(u64::MAX));
        edges
    }

    /// Number of edges touching the node
    pub fn degree(&self, node: u64) -> usize {
        self.incident_edges(node, None).len()
    }

    pub fn add_node(&mut self, categories: Vec<String>, data: Properties) -> Node {
        self.last_node_id += 1;
        let stored = StoredNode {
            id: self.last_node_id,
            categories,
            data,
        };
        let node = to_node(&stored);
        let ix = self.graph.add_node(stored);
        self.nodes.insert(self.last_node_id, ix);
        node
    }

    /// `None` when an endpoint does not exist
    pub fn add_edge(
        &mut self,
        source: u64,
        target: u64,
        edge_type: String,
        data: Properties,
    ) -> Option<Edge> {
        let source_ix = *self.nodes.get(&source)?;
        let target_ix = *self.nodes.get(&target)?;
        self.last_edge_id += 1;
        let id = self.last_edge_id;
        let ix = self.graph.add_edge(
            source_ix,
            target_ix,
            StoredEdge {
                id,
                edge_type,
                data,
            },
        );
        self.edges.insert(id, ix);
        self.to_edge(ix)
    }

    pub fn update_node(
        &mut self,
        id: u64,
        data: Properties,
        deleted_properties: &[String],
        added_categories: &[String],
        deleted_categories: &[String],
    ) -> Option<Node> {
        let ix = *self.nodes.get(&id)?;
        let node = self.graph.node_weight_mut(ix)?;
        for key in deleted_properties {
            node.data.remove(key);
        }
        node.data.extend(data);

        let mut categories: BTreeSet<String> = node.categories.drain(..).collect();
        for category in deleted_categories {
            categories.remove(category);
        }
        categories.extend(added_categories.iter().cloned());
        node.categories = categories.into_iter().collect();

        Some(to_node(node))
    }

    pub fn update_edge(
        &mut self,
        id: u64,
        data: Properties,
        deleted_properties: &[String],
    ) -> Option<Edge> {
        let ix = *self.edges.get(&id)?;
        let edge = self.graph.edge_weight_mut(ix)?;
        for key in deleted_properties {
            edge.data.remove(key);
        }
        edge.data.extend(data);
        self.to_edge(ix)
    }

    /// Remove a node and its edges; false when absent
    pub fn remove_node(&mut self, id: u64) -> bool {
        let Some(ix) = self.nodes.remove(&id) else {
            return false;
        };
        for edge in self.incident_edges_of(ix) {
            if let Some(stored) = self.graph.edge_weight(edge) {
                self.edges.remove(&stored.id);
            }
        }
        self.graph.remove_node(ix).is_some()
    }

    pub fn remove_edge(&mut self, id: u64) -> bool {
        match self.edges.remove(&id) {
            Some(ix) => self.graph.remove_edge(ix).is_some(),
            None => false,
        }
    }

    fn incident_edges_of(&self, ix: NodeIndex) -> Vec<EdgeIndex> {
        let mut edges: Vec<EdgeIndex> = self
            .graph
            .edges_directed(ix, Direction::Outgoing)
            .chain(self.graph.edges_directed(ix, Direction::Incoming))
            .map(|e| e.id())
            .collect();
        edges.sort_unstable();
        edges.dedup();
        edges
    }

    /// All shortest undirected paths, as node ids and the edge ids joining
    /// them, at most `max_results` of them and no longer than `max_depth`
    pub fn shortest_paths(
        &self,
        start: u64,
        end: u64,
        max_depth: u64,
        max_results: usize,
    ) -> Vec<PathSteps> {
        let (Some(&start_ix), Some(&end_ix)) = (self.nodes.get(&start), self.nodes.get(&end))
        else {
            return Vec::new();
        };
        if start_ix == end_ix {
            return vec![(vec![start], Vec::new())];
        }

        // breadth-first, keeping every predecessor at the previous level
        let mut depth: HashMap<NodeIndex, u64> = HashMap::from([(start_ix, 0)]);
        let mut predecessors: HashMap<NodeIndex, Vec<(NodeIndex, EdgeIndex)>> = HashMap::new();
        let mut queue = VecDeque::from([start_ix]);

        while let Some(current) = queue.pop_front() {
            let level = depth[&current];
            if level >= max_depth || depth.get(&end_ix).is_some_and(|d| *d <= level) {
                continue;
            }
            for edge in self.incident_edges_of(current) {
                let Some((a, b)) = self.graph.edge_endpoints(edge) else {
                    continue;
                };
                let next = if a == current { b } else { a };
                match depth.get(&next) {
                    None => {
                        depth.insert(next, level + 1);
                        predecessors.entry(next).or_default().push((current, edge));
                        queue.push_back(next);
                    }
                    Some(d) if *d == level + 1 => {
                        predecessors.entry(next).or_default().push((current, edge));
                    }
                    Some(_) => {}
                }
            }
        }

        if !depth.contains_key(&end_ix) {
            return Vec::new();
        }

        let mut paths = Vec::new();
        let mut stack: Vec<(NodeIndex, Vec<NodeIndex>, Vec<EdgeIndex>)> =
            vec![(end_ix, vec![end_ix], Vec::new())];
        while let Some((node, nodes, edges)) = stack.pop() {
            if paths.len() >= max_results {
                break;
            }
            if node == start_ix {
                paths.push((
                    nodes.iter().rev().map(|ix| self.graph[*ix].id).collect(),
                    edges.iter().rev().map(|ix| self.graph[*ix].id).collect(),
                ));
                continue;
            }
            for (previous, edge) in predecessors.get(&node).into_iter().flatten().rev() {
                let mut nodes = nodes.clone();
                nodes.push(*previous);
                let mut edges = edges.clone();
                edges.push(*edge);
                stack.push((*previous, nodes, edges));
            }
        }
        paths
    }

    /// Seed the graph; fixture keys are replaced by fresh ids
    pub fn load(&mut self, fixture: Fixture) -> Result<()> {
        let mut keys = HashMap::new();
        for node in fixture.nodes {
            if keys.contains_key(&node.key) {
                return Err(DaoError::invalid_parameter(format!(
                    "Fixture node \"{}\" is declared twice",
                    node.key
                )));
            }
            self.add_node(node.categories, node.data);
            keys.insert(node.key, self.last_node_id);
        }
        for edge in fixture.edges {
            let endpoint = |key: &str| {
                keys.get(key).copied().ok_or_else(|| {
                    DaoError::invalid_parameter(format!(
                        "Fixture edge refers to unknown node \"{key}\""
                    ))
                })
            };
            let (source, target) = (endpoint(&edge.source)?, endpoint(&edge.target)?);
            self.add_edge(source, target, edge.edge_type, edge.data);
        }
        Ok(())
    }

    /// Distinct categories, edge types and property keys, sorted
    pub fn schema(&self) -> (Vec<String>, Vec<String>, Vec<String>, Vec<String>) {
        let mut categories = BTreeSet::new();
        let mut node_properties = BTreeSet::new();
        for node in self.graph.node_weights() {
            categories.extend(node.categories.iter().cloned());
            node_properties.extend(node.data.keys().cloned());
        }
        let mut types = BTreeSet::new();
        let mut edge_properties = BTreeSet::new();
        for edge in self.graph.edge_weights() {
            types.insert(edge.edge_type.clone());
            edge_properties.extend(edge.data.keys().cloned());
        }
        (
            categories.into_iter().collect(),
            types.into_iter().collect(),
            node_properties.into_iter().collect(),
            edge_properties.into_iter().collect(),
        )
    }

    /// Neighbour ids of `node` across edges accepted by `edge_filter`
    pub fn neighbours(&self, node: u64, edge_filter: impl Fn(&Edge) -> bool) -> Vec<(Edge, u64)> {
        let id = node.to_string();
        self.incident_edges(node, None)
            .into_iter()
            .filter(|e| edge_filter(e))
            .filter_map(|e| {
                let other = if e.source == id { &e.target } else { &e.source };
                let other = other.parse::<u64>().ok()?;
                Some((e, other))
            })
            .collect()
    }

    /// Ids among `ids` that exist
    pub fn existing(&self, ids: &[u64]) -> HashSet<u64> {
        ids.iter().copied().filter(|id| self.contains_node(*id)).collect()
    }
}

fn to_node(stored: &StoredNode) -> Node {
    Node::new(
        stored.id.to_string(),
        stored.categories.clone(),
        stored.data.clone(),
    )
}

/// Shared, lock-protected graph plus the identity of the store
#[derive(Debug)]
pub struct MemoryStore {
    id: String,
    graph: RwLock<MemoryGraph>,
}

impl MemoryStore {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            graph: RwLock::new(MemoryGraph::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn read(&self) -> RwLockReadGuard<'_, MemoryGraph> {
        self.graph.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, MemoryGraph> {
        self.graph.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn triangle() -> MemoryGraph {
        let mut graph = MemoryGraph::default();
        let fixture: Fixture = serde_json::from_value(json!({
            "nodes": [
                {"key": "a", "categories": ["Person"], "data": {"name": "Ada"}},
                {"key": "b", "categories": ["Person"], "data": {"name": "Bob"}},
                {"key": "c", "categories": ["City"], "data": {"name": "Paris"}},
                {"key": "d"}
            ],
            "edges": [
                {"source": "a", "target": "b", "type": "KNOWS"},
                {"source": "a", "target": "c", "type": "LIVES_IN"},
                {"source": "b", "target": "c", "type": "LIVES_IN"},
                {"source": "c", "target": "d", "type": "NEAR"}
            ]
        }))
        .unwrap();
        graph.load(fixture).unwrap();
        graph
    }

    #[test]
    fn test_load_fixture() {
        let graph = triangle();
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(graph.node(1).unwrap().data["name"], "Ada");
        assert_eq!(graph.degree(3), 3);
    }

    #[test]
    fn test_load_rejects_unknown_keys() {
        let fixture: Fixture = serde_json::from_value(json!({
            "nodes": [{"key": "a"}],
            "edges": [{"source": "a", "target": "zz", "type": "X"}]
        }))
        .unwrap();
        assert!(MemoryGraph::default().load(fixture).is_err());
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut graph = triangle();
        assert!(graph.remove_node(4));
        assert!(!graph.remove_node(4));
        assert_eq!(graph.edge_count(), 3);
        let node = graph.add_node(vec![], Properties::new());
        assert_eq!(node.id, "5");
    }

    #[test]
    fn test_shortest_paths() {
        let graph = triangle();
        let paths = graph.shortest_paths(1, 4, 15, 10);
        assert_eq!(paths, vec![(vec![1, 3, 4], vec![2, 4])]);

        assert_eq!(graph.shortest_paths(2, 4, 15, 10).len(), 1);
        let paths = graph.shortest_paths(1, 4, 1, 10);
        assert!(paths.is_empty());
    }

    #[test]
    fn test_all_shortest_paths_limited() {
        let mut graph = MemoryGraph::default();
        let ends: Vec<u64> = (0..4)
            .map(|_| graph.add_node(vec![], Properties::new()).id.parse().unwrap())
            .collect();
        // 1 -> {2, 3} -> 4
        graph.add_edge(ends[0], ends[1], "R".into(), Properties::new());
        graph.add_edge(ends[0], ends[2], "R".into(), Properties::new());
        graph.add_edge(ends[1], ends[3], "R".into(), Properties::new());
        graph.add_edge(ends[2], ends[3], "R".into(), Properties::new());

        assert_eq!(graph.shortest_paths(1, 4, 15, 10).len(), 2);
        assert_eq!(graph.shortest_paths(1, 4, 15, 1).len(), 1);
    }

    #[test]
    fn test_update_node_categories() {
        let mut graph = triangle();
        let node = graph
            .update_node(
                1,
                json!({"age": 36}).as_object().cloned().unwrap(),
                &["name".to_string()],
                &["Admin".to_string()],
                &["Person".to_string()],
            )
            .unwrap();
        assert_eq!(node.categories, vec!["Admin"]);
        assert!(!node.data.contains_key("name"));
        assert_eq!(node.data["age"], 36);
    }
}
