//! `memory` vendor: a petgraph-backed graph living in the process.
//!
//! Options:
//! - `fixture` (optional): JSON file loaded on the first connection
//! - `storeId` (optional): identity reported by the store, random otherwise

mod driver;
mod store;

pub use driver::{MemoryDriver, CATEGORY_DIALECT};
pub use store::{Fixture, FixtureEdge, FixtureNode, MemoryGraph, MemoryStore};

use crate::features::GraphFeatures;
use crate::registry::{GraphRegistry, GraphVendor};
use async_trait::async_trait;
use std::any::Any;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strata_core::{
    Connector, ConnectorContext, ConnectorData, DaoError, ErrorKey, OptionSchema, Result,
};
use tracing::info;
use uuid::Uuid;

pub const VENDOR: &str = "memory";
pub const CONNECTOR: &str = "memoryStore";
pub const DRIVER: &str = "memory";

/// Version reported by the in-process store
pub const STORE_VERSION: &str = "0.1.0";

pub fn vendor() -> GraphVendor {
    GraphVendor {
        name: VENDOR.to_string(),
        features: GraphFeatures {
            alternative_ids: true,
            dialects: vec![CATEGORY_DIALECT.to_string()],
            ..GraphFeatures::default()
        },
        options: OptionSchema::new(&[], &["fixture", "storeId"]),
        connectors: vec![CONNECTOR.to_string()],
        drivers: vec![("0.1.0", strata_core::driver::LATEST_DRIVER), ("0.1.0", DRIVER)],
    }
}

pub fn register(registry: &mut GraphRegistry) {
    registry
        .register_vendor(VENDOR, vendor)
        .register_connector(CONNECTOR, |context: &ConnectorContext| {
            Ok(Arc::new(MemoryConnector::from_context(context)) as Arc<dyn Connector>)
        })
        .register_driver(DRIVER, MemoryDriver::create);
}

/// Connector owning the store; the data outlives reconnections
pub struct MemoryConnector {
    store: Arc<MemoryStore>,
    fixture: Option<PathBuf>,
    loaded: AtomicBool,
    connected: AtomicBool,
}

impl MemoryConnector {
    pub fn new(store: Arc<MemoryStore>, fixture: Option<PathBuf>) -> Self {
        Self {
            store,
            fixture,
            loaded: AtomicBool::new(false),
            connected: AtomicBool::new(false),
        }
    }

    pub fn from_context(context: &ConnectorContext) -> Self {
        let options = &context.graph_options;
        let store_id = options
            .get_str("storeId")
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self::new(
            Arc::new(MemoryStore::new(store_id)),
            options.get_str("fixture").map(PathBuf::from),
        )
    }

    pub fn store(&self) -> Arc<MemoryStore> {
        self.store.clone()
    }

    async fn load_fixture(&self) -> Result<()> {
        let Some(path) = &self.fixture else {
            return Ok(());
        };
        if self.loaded.load(Ordering::SeqCst) {
            return Ok(());
        }

        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            DaoError::technical(
                ErrorKey::GraphUnreachable,
                format!("Cannot read fixture {}: {e}", path.display()),
            )
        })?;
        let fixture: Fixture = serde_json::from_str(&raw)?;
        let (nodes, edges) = (fixture.nodes.len(), fixture.edges.len());
        self.store.write().load(fixture)?;
        self.loaded.store(true, Ordering::SeqCst);
        info!(path = %path.display(), nodes, edges, "loaded memory fixture");
        Ok(())
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<String> {
        self.load_fixture().await?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(STORE_VERSION.to_string())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn check_up(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DaoError::technical(
                ErrorKey::GraphUnreachable,
                "The memory store is disconnected",
            ))
        }
    }

    async fn store_id(&self) -> Result<String> {
        Ok(self.store.id().to_string())
    }

    async fn connector_data(&self) -> Result<ConnectorData> {
        let mut data = ConnectorData::new();
        data.insert("storeId".into(), self.store.id().into());
        Ok(data)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
