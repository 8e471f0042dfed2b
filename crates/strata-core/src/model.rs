//! Graph items and search results passed between the DAO façades and the
//! vendor drivers.

use crate::error::{DaoError, Result};
use futures::stream::BoxStream;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Item properties
pub type Properties = Map<String, Value>;

/// Stream of items read from a backend
pub type ItemStream<T> = BoxStream<'static, Result<T>>;

/// Property keys tried, in order, when captioning an item
const CAPTION_KEYS: [&str; 4] = ["name", "title", "label", "caption"];

// ============================================================================
// Identifiers
// ============================================================================

/// Graph or search item kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Node,
    Edge,
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemType::Node => write!(f, "node"),
            ItemType::Edge => write!(f, "edge"),
        }
    }
}

impl FromStr for ItemType {
    type Err = DaoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "node" => Ok(ItemType::Node),
            "edge" => Ok(ItemType::Edge),
            other => Err(DaoError::invalid_parameter(format!(
                "\"type\" must be one of: node, edge (got \"{other}\")"
            ))),
        }
    }
}

/// Backend-native identifier produced by a driver's ID codec
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NativeId {
    Int(i64),
    Str(String),
}

impl fmt::Display for NativeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeId::Int(id) => write!(f, "{id}"),
            NativeId::Str(id) => f.write_str(id),
        }
    }
}

impl From<NativeId> for Value {
    fn from(id: NativeId) -> Self {
        match id {
            NativeId::Int(id) => Value::from(id),
            NativeId::Str(id) => Value::from(id),
        }
    }
}

// ============================================================================
// Categories
// ============================================================================

/// A category filter entry; `NoCategory` selects nodes without any category
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CategoryFilter {
    Category(String),
    NoCategory,
}

impl CategoryFilter {
    /// Wire form of [`CategoryFilter::NoCategory`]
    pub const NO_CATEGORY_LABEL: &'static str = "[no_category]";

    pub fn parse(value: &str) -> Self {
        if value == Self::NO_CATEGORY_LABEL {
            CategoryFilter::NoCategory
        } else {
            CategoryFilter::Category(value.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CategoryFilter::Category(name) => name,
            CategoryFilter::NoCategory => Self::NO_CATEGORY_LABEL,
        }
    }

    /// Whether an item with these categories passes the filter
    pub fn matches(&self, categories: &[String]) -> bool {
        match self {
            CategoryFilter::Category(name) => categories.iter().any(|c| c == name),
            CategoryFilter::NoCategory => categories.is_empty(),
        }
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CategoryFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CategoryFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(CategoryFilter::parse(&raw))
    }
}

// ============================================================================
// Nodes and edges
// ============================================================================

/// A graph node
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub data: Properties,
    /// Always sorted by name
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edges: Option<Vec<Edge>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<NodeStatistics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

impl Node {
    pub fn new(id: impl Into<String>, mut categories: Vec<String>, data: Properties) -> Self {
        categories.sort();
        Self {
            id: id.into(),
            data,
            categories,
            ..Default::default()
        }
    }

    /// Restore the sorted-categories invariant after a driver built the node
    pub fn sort_categories(&mut self) {
        self.categories.sort();
    }

    /// Human-readable label for search results
    pub fn caption(&self) -> String {
        caption_of(&self.data).unwrap_or_else(|| self.id.clone())
    }
}

/// A graph edge
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    #[serde(rename = "type")]
    pub edge_type: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub data: Properties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        edge_type: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        data: Properties,
    ) -> Self {
        Self {
            id: id.into(),
            edge_type: edge_type.into(),
            source: source.into(),
            target: target.into(),
            data,
            version: None,
        }
    }

    pub fn caption(&self) -> String {
        caption_of(&self.data).unwrap_or_else(|| self.edge_type.clone())
    }
}

fn caption_of(data: &Properties) -> Option<String> {
    CAPTION_KEYS.iter().find_map(|key| match data.get(*key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

// ============================================================================
// Statistics
// ============================================================================

/// Neighbour counts grouped by node categories and edge type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestItem {
    pub node_categories: Vec<String>,
    pub edge_type: String,
    pub nodes: u64,
    pub edges: u64,
}

/// Cheap digest used for supernodes: edge count per edge type only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleDigestItem {
    pub edge_type: String,
    pub edges: u64,
}

/// Per-node statistics attached by the enrichment step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatistics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<Vec<DigestItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degree: Option<u64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub supernode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supernode_digest: Option<Vec<SimpleDigestItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supernode_degree: Option<u64>,
}

/// Categories, types and property keys known to a graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleSchema {
    pub node_categories: Vec<String>,
    pub edge_types: Vec<String>,
    pub node_properties: Vec<String>,
    pub edge_properties: Vec<String>,
}

// ============================================================================
// Search
// ============================================================================

/// One search hit as returned by an index driver
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: String,
    /// Node categories, or the single edge type
    pub categories: Vec<String>,
    /// Caption of the item
    pub name: String,
    /// Highlighted property, when the engine reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Hits returned by an index driver before grouping
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSearchResult {
    pub total_hits: Option<u64>,
    pub more_results: Option<bool>,
    pub hits: Vec<SearchHit>,
}

/// Hits sharing the same categories (nodes) or type (edges)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchGroup {
    pub title: String,
    pub categories: Vec<String>,
    pub children: Vec<SearchHit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchResults {
    Ids(Vec<String>),
    Groups(Vec<SearchGroup>),
    Nodes(Vec<Node>),
    Edges(Vec<Edge>),
}

impl SearchResults {
    pub fn len(&self) -> usize {
        match self {
            SearchResults::Ids(items) => items.len(),
            SearchResults::Groups(items) => items.len(),
            SearchResults::Nodes(items) => items.len(),
            SearchResults::Edges(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of a search through an index DAO
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(rename = "type")]
    pub item_type: ItemType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_hits: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub more_results: Option<bool>,
    pub results: SearchResults,
}

impl SearchResponse {
    /// `{totalHits: 0, results: []}`
    pub fn empty(item_type: ItemType) -> Self {
        Self {
            item_type,
            total_hits: Some(0),
            more_results: None,
            results: SearchResults::Groups(Vec::new()),
        }
    }
}

/// Group hits by category set (nodes) or type (edges), first-seen order
pub fn build_search_groups(hits: Vec<SearchHit>) -> Vec<SearchGroup> {
    let mut groups: Vec<SearchGroup> = Vec::new();
    for mut hit in hits {
        hit.categories.sort();
        let title = if hit.categories.is_empty() {
            CategoryFilter::NO_CATEGORY_LABEL.to_string()
        } else {
            hit.categories.join(", ")
        };
        match groups.iter_mut().find(|g| g.title == title) {
            Some(group) => group.children.push(hit),
            None => groups.push(SearchGroup {
                title,
                categories: hit.categories.clone(),
                children: vec![hit],
            }),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hit(id: &str, categories: &[&str]) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            categories: categories.iter().map(|c| c.to_string()).collect(),
            name: id.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_node_categories_sorted() {
        let node = Node::new(
            "1",
            vec!["Person".into(), "Actor".into()],
            Properties::new(),
        );
        assert_eq!(node.categories, vec!["Actor", "Person"]);
    }

    #[test]
    fn test_caption() {
        let data = json!({"title": "The Matrix"}).as_object().cloned().unwrap();
        assert_eq!(Node::new("1", vec![], data).caption(), "The Matrix");
        assert_eq!(Node::new("7", vec![], Properties::new()).caption(), "7");
    }

    #[test]
    fn test_edge_serializes_type() {
        let edge = Edge::new("e1", "ACTED_IN", "1", "2", Properties::new());
        let value = serde_json::to_value(&edge).unwrap();
        assert_eq!(value["type"], "ACTED_IN");
        assert!(value.get("version").is_none());
    }

    #[test]
    fn test_category_filter_wire_form() {
        assert_eq!(CategoryFilter::parse("[no_category]"), CategoryFilter::NoCategory);
        assert_eq!(
            CategoryFilter::parse("Person"),
            CategoryFilter::Category("Person".into())
        );
        let parsed: Vec<CategoryFilter> =
            serde_json::from_value(json!(["City", "[no_category]"])).unwrap();
        assert_eq!(parsed[1], CategoryFilter::NoCategory);
        assert!(CategoryFilter::NoCategory.matches(&[]));
        assert!(!CategoryFilter::NoCategory.matches(&["City".to_string()]));
    }

    #[test]
    fn test_item_type_parse() {
        assert_eq!("edge".parse::<ItemType>().unwrap(), ItemType::Edge);
        assert!("vertex".parse::<ItemType>().is_err());
    }

    #[test]
    fn test_build_search_groups() {
        let groups = build_search_groups(vec![
            hit("1", &["Person", "Actor"]),
            hit("2", &["Movie"]),
            hit("3", &["Actor", "Person"]),
            hit("4", &[]),
        ]);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].title, "Actor, Person");
        assert_eq!(groups[0].children.len(), 2);
        assert_eq!(groups[2].title, "[no_category]");
    }

    #[test]
    fn test_empty_search_response() {
        let response = SearchResponse::empty(ItemType::Edge);
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value, json!({"type": "edge", "totalHits": 0, "results": []}));
    }
}
