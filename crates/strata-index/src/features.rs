//! Capability matrix of an index vendor.

use serde::{Deserialize, Serialize};
use strata_core::{DaoError, Result};

/// What the index can say about the graph schema
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaFeatures {
    /// Categories and properties come with counts
    pub counts: bool,
    pub properties: bool,
    /// Inferred categories and types are discovered
    pub inferred: bool,
}

/// What an index vendor supports; immutable once the DAO is built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexFeatures {
    /// The index follows the graph database on its own
    pub external: bool,
    pub schema: SchemaFeatures,
    pub can_count: bool,
    /// Property types can be read back from the index
    pub typing: bool,
    pub fuzzy: bool,
    pub can_index_edges: bool,
    pub can_index_categories: bool,
    /// Entries carry a version for conflict detection
    pub versions: bool,
    pub advanced_query_dialect: Option<String>,
    /// Responses carry `totalHits`; otherwise `moreResults`
    pub search_hits_count: bool,
}

impl IndexFeatures {
    /// Reject a malformed matrix at construction
    pub fn validate(&self, vendor: &str) -> Result<()> {
        if self
            .advanced_query_dialect
            .as_deref()
            .is_some_and(str::is_empty)
        {
            return Err(DaoError::bug(format!(
                "{vendor}: features.advancedQueryDialect must not be empty"
            )));
        }
        if self.schema.counts && !self.schema.properties && !self.external {
            return Err(DaoError::bug(format!(
                "{vendor}: features.schema.counts requires features.schema.properties"
            )));
        }
        Ok(())
    }
}

impl Default for IndexFeatures {
    fn default() -> Self {
        Self {
            external: false,
            schema: SchemaFeatures::default(),
            can_count: true,
            typing: false,
            fuzzy: true,
            can_index_edges: true,
            can_index_categories: true,
            versions: false,
            advanced_query_dialect: None,
            search_hits_count: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        IndexFeatures::default().validate("test").unwrap();
    }

    #[test]
    fn test_rejects_empty_dialect() {
        let features = IndexFeatures {
            advanced_query_dialect: Some(String::new()),
            ..Default::default()
        };
        let err = features.validate("es").unwrap_err();
        assert!(err.message().contains("advancedQueryDialect"));
    }

    #[test]
    fn test_serde_camel_case() {
        let value = serde_json::to_value(IndexFeatures::default()).unwrap();
        assert_eq!(value["canIndexEdges"], true);
        assert_eq!(value["schema"]["counts"], false);
        assert_eq!(value["advancedQueryDialect"], serde_json::Value::Null);
    }
}
