//! Capability matrix of a graph vendor.

use serde::{Deserialize, Serialize};
use strata_core::{DaoError, Result};

/// What a graph vendor supports; immutable once the DAO is built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphFeatures {
    /// Edges may carry properties
    pub edge_properties: bool,
    /// Categories cannot change after creation
    pub immutable_node_categories: bool,
    pub min_node_categories: usize,
    pub max_node_categories: Option<usize>,
    /// Array properties are stored as JSON strings
    pub serialize_array_properties: bool,
    pub can_count: bool,
    pub alerts: bool,
    pub shortest_paths: bool,
    /// Items may be looked up by a property instead of the native id
    pub alternative_ids: bool,
    /// Nodes without properties and categories are allowed
    pub empty_nodes: bool,
    /// Raw query dialects, the first is the default
    pub dialects: Vec<String>,
    /// Nodes and edges can be streamed for internal indexation
    pub can_stream: bool,
    pub detect_supernodes: bool,
}

impl GraphFeatures {
    /// Reject a malformed matrix at construction
    pub fn validate(&self, vendor: &str) -> Result<()> {
        if self.dialects.is_empty() {
            return Err(DaoError::bug(format!(
                "{vendor}: features.dialects must contain at least one dialect"
            )));
        }
        if self.dialects.iter().any(String::is_empty) {
            return Err(DaoError::bug(format!(
                "{vendor}: features.dialects must not contain empty strings"
            )));
        }
        if let Some(max) = self.max_node_categories {
            if max < self.min_node_categories {
                return Err(DaoError::bug(format!(
                    "{vendor}: features.maxNodeCategories ({max}) is lower than minNodeCategories ({})",
                    self.min_node_categories
                )));
            }
        }
        if self.alternative_ids && !self.edge_properties {
            return Err(DaoError::bug(format!(
                "{vendor}: features.alternativeIds requires features.edgeProperties"
            )));
        }
        Ok(())
    }

    pub fn default_dialect(&self) -> &str {
        self.dialects.first().map(String::as_str).unwrap_or_default()
    }

    pub fn supports_dialect(&self, dialect: &str) -> bool {
        self.dialects.iter().any(|d| d == dialect)
    }
}

impl Default for GraphFeatures {
    fn default() -> Self {
        Self {
            edge_properties: true,
            immutable_node_categories: false,
            min_node_categories: 0,
            max_node_categories: None,
            serialize_array_properties: false,
            can_count: true,
            alerts: false,
            shortest_paths: true,
            alternative_ids: false,
            empty_nodes: true,
            dialects: vec!["cypher".to_string()],
            can_stream: true,
            detect_supernodes: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        GraphFeatures::default().validate("test").unwrap();
        assert_eq!(GraphFeatures::default().default_dialect(), "cypher");
    }

    #[test]
    fn test_rejects_empty_dialects() {
        let features = GraphFeatures {
            dialects: vec![],
            ..Default::default()
        };
        assert!(features.validate("test").is_err());

        let features = GraphFeatures {
            dialects: vec!["cypher".into(), String::new()],
            ..Default::default()
        };
        assert!(features.validate("test").is_err());
    }

    #[test]
    fn test_rejects_inverted_category_bounds() {
        let features = GraphFeatures {
            min_node_categories: 2,
            max_node_categories: Some(1),
            ..Default::default()
        };
        let err = features.validate("janus").unwrap_err();
        assert!(err.message().contains("maxNodeCategories"));
    }

    #[test]
    fn test_alternative_ids_need_edge_properties() {
        let features = GraphFeatures {
            alternative_ids: true,
            edge_properties: false,
            ..Default::default()
        };
        assert!(features.validate("rdf").is_err());
    }

    #[test]
    fn test_serde_camel_case() {
        let value = serde_json::to_value(GraphFeatures::default()).unwrap();
        assert_eq!(value["shortestPaths"], true);
        assert_eq!(value["maxNodeCategories"], serde_json::Value::Null);
    }
}
