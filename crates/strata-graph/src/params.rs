//! Caller-facing parameters of the graph DAO operations.
//!
//! Ids in here are encoded (as seen by callers); the DAO decodes them
//! through the bound driver before anything reaches the backend.

use crate::driver::{EdgePolicy, LimitType};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strata_core::AdvancedConfig;

/// Limits applied by the graph DAO
#[derive(Debug, Clone, PartialEq)]
pub struct GraphSettings {
    /// Ceiling of `maxDepth` for shortest paths
    pub max_path_length: u64,
    pub shortest_paths_max_results: u64,
    pub supernode_threshold: u64,
    /// Ceiling of a raw query's `limit`
    pub max_matches_limit: u64,
    pub connect_timeout: Duration,
}

impl GraphSettings {
    /// `maxDepth` used when a shortest-path call gives none
    pub const DEFAULT_MAX_DEPTH: u64 = 15;
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self::from(&AdvancedConfig::default())
    }
}

impl From<&AdvancedConfig> for GraphSettings {
    fn from(config: &AdvancedConfig) -> Self {
        Self {
            max_path_length: config.max_path_length,
            shortest_paths_max_results: config.shortest_paths_max_results,
            supernode_threshold: config.supernode_threshold,
            max_matches_limit: config.max_matches_limit,
            connect_timeout: config.connect_timeout(),
        }
    }
}

/// Which statistics to attach to returned nodes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatisticsOptions {
    pub with_digest: bool,
    pub with_degree: bool,
    pub readable_categories: Option<Vec<String>>,
    pub readable_types: Option<Vec<String>>,
}

impl StatisticsOptions {
    pub fn is_requested(&self) -> bool {
        self.with_digest || self.with_degree
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShortestPathOptions {
    pub max_depth: Option<u64>,
    #[serde(flatten)]
    pub statistics: StatisticsOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetNodeOptions {
    pub id: String,
    /// Property holding the id, instead of the native id
    #[serde(default)]
    pub alternative_id: Option<String>,
    #[serde(default)]
    pub with_edges: bool,
    #[serde(flatten)]
    pub statistics: StatisticsOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodesByIdOptions {
    pub ids: Vec<String>,
    #[serde(default)]
    pub alternative_id: Option<String>,
    #[serde(default)]
    pub edges: EdgePolicy,
    #[serde(default)]
    pub ignore_missing: bool,
    #[serde(flatten)]
    pub statistics: StatisticsOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgesByIdOptions {
    pub ids: Vec<String>,
    #[serde(default)]
    pub alternative_id: Option<String>,
    #[serde(default)]
    pub ignore_missing: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetEdgeOptions {
    pub id: String,
    #[serde(default)]
    pub alternative_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdjacentNodesOptions {
    pub ignored_node_ids: Vec<String>,
    pub visible_node_ids: Vec<String>,
    /// Single category; overrides `readableCategories`
    pub node_category: Option<String>,
    /// Single edge type; overrides `readableTypes`
    pub edge_type: Option<String>,
    pub limit: Option<u64>,
    pub limit_type: LimitType,
    #[serde(flatten)]
    pub statistics: StatisticsOptions,
}

/// Exactly one of `adjacent`, `source`, `target` must be set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdjacentEdgesOptions {
    pub adjacent: Option<String>,
    pub source: Option<String>,
    pub target: Option<String>,
    #[serde(rename = "type")]
    pub edge_type: Option<String>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawQueryOptions {
    /// Defaults to the vendor's first dialect
    #[serde(default)]
    pub dialect: Option<String>,
    pub query: String,
    #[serde(default)]
    pub can_write: bool,
    #[serde(default = "default_true")]
    pub populated: bool,
    pub limit: u64,
    #[serde(flatten)]
    pub statistics: StatisticsOptions,
}

impl RawQueryOptions {
    /// Read-only, populated query
    pub fn new(query: impl Into<String>, limit: u64) -> Self {
        Self {
            dialect: None,
            query: query.into(),
            can_write: false,
            populated: true,
            limit,
            statistics: StatisticsOptions::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_settings_from_config() {
        let settings = GraphSettings::default();
        assert_eq!(settings.max_path_length, 20);
        assert_eq!(settings.supernode_threshold, 10_000);
        assert_eq!(settings.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_raw_query_defaults() {
        let options: RawQueryOptions =
            serde_json::from_value(json!({"query": "MATCH (n) RETURN n", "limit": 10})).unwrap();
        assert!(options.populated);
        assert!(!options.can_write);
        assert_eq!(options, RawQueryOptions::new("MATCH (n) RETURN n", 10));
    }

    #[test]
    fn test_flattened_statistics() {
        let options: NodesByIdOptions = serde_json::from_value(json!({
            "ids": ["1", "2"],
            "edges": "strict",
            "withDigest": true
        }))
        .unwrap();
        assert_eq!(options.edges, EdgePolicy::Strict);
        assert!(options.statistics.with_digest);
        assert!(options.statistics.is_requested());
    }
}
