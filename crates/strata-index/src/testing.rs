//! Test doubles for code built on the index DAO.

use crate::driver::{IndexDriver, IndexEntry, IndexProgress, PropertyType};
use crate::features::IndexFeatures;
use crate::params::SearchQuery;
use crate::registry::{IndexRegistry, IndexVendor};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use strata_core::{
    Connector, ConnectorContext, DaoError, Driver, Edge, ErrorKey, ItemType, Node,
    OptionSchema, RawSearchResult, Result, SearchHit, SimpleSchema,
};
use strata_graph::testing::ScriptedConnector;

pub const SCRIPTED_INDEX_VENDOR: &str = "scriptedIndex";
pub const SCRIPTED_INDEX_CONNECTOR: &str = "scriptedIndex";
pub const SCRIPTED_INDEX_DRIVER: &str = "scriptedIndex";

/// Index driver answering from fixed data and counting its calls
#[derive(Default)]
pub struct RecordingIndexDriver {
    calls: Mutex<BTreeMap<&'static str, usize>>,
    last_query: Mutex<Option<SearchQuery>>,
    /// Returned by every search
    pub hits: Vec<SearchHit>,
    pub total_hits: Option<u64>,
    /// Indexed versions by id, nodes and edges alike
    pub versions: BTreeMap<String, i64>,
    /// Commits failing with a technical error before one succeeds
    pub commit_failures: AtomicUsize,
}

impl RecordingIndexDriver {
    pub fn with_hits(hits: Vec<SearchHit>) -> Self {
        Self {
            total_hits: Some(hits.len() as u64),
            hits,
            ..Default::default()
        }
    }

    pub fn with_versions(versions: BTreeMap<String, i64>) -> Self {
        Self {
            versions,
            ..Default::default()
        }
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.lock().get(operation).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.lock().values().sum()
    }

    /// The last query handed to `search`
    pub fn last_query(&self) -> Option<SearchQuery> {
        self.last_query
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<&'static str, usize>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, operation: &'static str) {
        *self.lock().entry(operation).or_default() += 1;
    }
}

impl Driver for RecordingIndexDriver {}

#[async_trait]
impl IndexDriver for RecordingIndexDriver {
    async fn get_size(&self, _item_type: ItemType) -> Result<u64> {
        self.record("getSize");
        Ok(self.hits.len() as u64)
    }

    async fn add_entries(&self, _nodes: &[Node], _edges: &[Edge]) -> Result<()> {
        self.record("addEntries");
        Ok(())
    }

    async fn search(&self, query: &SearchQuery) -> Result<RawSearchResult> {
        self.record("search");
        *self
            .last_query
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(query.clone());
        Ok(RawSearchResult {
            total_hits: self.total_hits,
            more_results: None,
            hits: self.hits.clone(),
        })
    }

    async fn get_schema(&self) -> Result<SimpleSchema> {
        self.record("getSchema");
        Ok(SimpleSchema::default())
    }

    async fn delete_if_exists(&self) -> Result<()> {
        self.record("deleteIfExists");
        Ok(())
    }

    async fn create_index(&self) -> Result<()> {
        self.record("createIndex");
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.record("commit");
        let failing = self
            .commit_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DaoError::technical(
                ErrorKey::IndexUnreachable,
                "scripted commit failure",
            ));
        }
        Ok(())
    }

    async fn upsert_entry(&self, _entry: &IndexEntry) -> Result<i64> {
        self.record("upsertEntry");
        Ok(2)
    }

    async fn delete_entry(&self, _item_type: ItemType, _id: &str, _ignore: bool) -> Result<()> {
        self.record("deleteEntry");
        Ok(())
    }

    async fn get_item_versions(
        &self,
        _item_type: ItemType,
        ids: &[String],
    ) -> Result<BTreeMap<String, i64>> {
        self.record("getItemVersions");
        Ok(ids
            .iter()
            .filter_map(|id| self.versions.get(id).map(|v| (id.clone(), *v)))
            .collect())
    }

    async fn get_property_types(
        &self,
        _item_type: ItemType,
    ) -> Result<BTreeMap<String, PropertyType>> {
        self.record("getPropertyTypes");
        Ok(BTreeMap::from([("name".to_string(), PropertyType::String)]))
    }

    async fn index_source(&self, progress: &IndexProgress) -> Result<()> {
        self.record("indexSource");
        progress.add(ItemType::Node, 1);
        Ok(())
    }
}

/// Vendor `scriptedIndex` with `features`, working with `graph_vendors`
/// (any when `None`) and binding `driver` on connection
pub fn scripted_index_registry(
    features: IndexFeatures,
    graph_vendors: Option<Vec<String>>,
    driver: Arc<RecordingIndexDriver>,
) -> IndexRegistry {
    let mut registry = IndexRegistry::new();
    registry
        .register_vendor(SCRIPTED_INDEX_VENDOR, move || IndexVendor {
            name: SCRIPTED_INDEX_VENDOR.to_string(),
            features: features.clone(),
            options: OptionSchema::new(&[], &[]),
            connectors: vec![SCRIPTED_INDEX_CONNECTOR.to_string()],
            drivers: vec![
                ("1.0.0", strata_core::driver::LATEST_DRIVER),
                ("1.0.0", SCRIPTED_INDEX_DRIVER),
            ],
            graph_vendors: graph_vendors.clone(),
            node_version_offset: 0,
        })
        .register_connector(SCRIPTED_INDEX_CONNECTOR, |_context: &ConnectorContext| {
            Ok(Arc::new(ScriptedConnector::up("1.0.0")) as Arc<dyn Connector>)
        })
        .register_driver(SCRIPTED_INDEX_DRIVER, move |_context| {
            Ok(driver.clone() as Arc<dyn IndexDriver>)
        });
    registry
}
