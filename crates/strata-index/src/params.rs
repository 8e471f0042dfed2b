//! Caller-facing parameters of the index DAO operations.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use strata_core::{AdvancedConfig, ItemType, RetryPolicy};

/// Limits and retry policy applied by the index DAO
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSettings {
    /// Fuzziness used when a search gives none
    pub default_fuzziness: f64,
    pub commit: RetryPolicy,
    pub connect_timeout: Duration,
}

impl IndexSettings {
    /// Page size used when a search gives none
    pub const DEFAULT_PAGE_SIZE: u64 = 20;
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self::from(&AdvancedConfig::default())
    }
}

impl From<&AdvancedConfig> for IndexSettings {
    fn from(config: &AdvancedConfig) -> Self {
        Self {
            default_fuzziness: config.default_fuzziness,
            commit: RetryPolicy::new(
                config.commit_retries,
                Duration::from_millis(config.commit_retry_delay_ms),
            ),
            connect_timeout: config.connect_timeout(),
        }
    }
}

/// Options of a search, as given by callers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchOptions {
    pub size: Option<u64>,
    pub from: Option<u64>,
    /// Normalized similarity, 1 is exact and 0.1 very fuzzy
    pub fuzziness: Option<f64>,
    /// `(property, value)` pairs; `[categories]` / `[type]` restrict the
    /// search to node categories / edge types
    pub filter: Vec<(String, String)>,
    pub categories_or_types: Option<Vec<String>>,
    /// Return full nodes or edges read from the graph
    pub full: bool,
    /// Return ids only, neither grouped nor sorted
    pub id_only: bool,
}

/// A validated search as handed to the driver
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub item_type: ItemType,
    pub text: String,
    pub from: u64,
    pub size: u64,
    pub fuzziness: f64,
    pub filter: Vec<(String, String)>,
    pub categories_or_types: Option<Vec<String>>,
    pub id_only: bool,
}

impl SearchQuery {
    /// Filter property holding categories (nodes) or the type (edges)
    pub fn category_filter_key(item_type: ItemType) -> &'static str {
        match item_type {
            ItemType::Node => "[categories]",
            ItemType::Edge => "[type]",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_settings_from_config() {
        let settings = IndexSettings::default();
        assert_eq!(settings.default_fuzziness, 0.9);
        assert!(settings.commit.attempts >= 1);
    }

    #[test]
    fn test_search_options_from_json() {
        let options: SearchOptions = serde_json::from_value(json!({
            "size": 5,
            "filter": [["[categories]", "Person"], ["name", "ada"]],
            "idOnly": true
        }))
        .unwrap();
        assert_eq!(options.size, Some(5));
        assert_eq!(options.filter.len(), 2);
        assert_eq!(options.filter[0].1, "Person");
        assert!(options.id_only);
        assert!(!options.full);
    }
}
