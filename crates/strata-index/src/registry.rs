//! Vendor, driver and connector registry of the index DAO.

use crate::driver::{IndexDriver, IndexDriverContext, IndexDriverFactory};
use crate::features::IndexFeatures;
use crate::vendors;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use strata_core::{
    Connector, ConnectorContext, ConnectorRegistry, DaoError, ErrorKey, OptionSchema, Result,
};

/// Everything an index vendor declares; vendors carry no behaviour
#[derive(Debug, Clone)]
pub struct IndexVendor {
    pub name: String,
    pub features: IndexFeatures,
    pub options: OptionSchema,
    /// Connector names, most preferred first
    pub connectors: Vec<String>,
    /// `(minVersion, driverName)` rows, any order
    pub drivers: Vec<(&'static str, &'static str)>,
    /// Graph vendors the index works with; `None` means any
    pub graph_vendors: Option<Vec<String>>,
    /// Added to every node version read back from the index
    pub node_version_offset: i64,
}

pub type IndexVendorFactory = Arc<dyn Fn() -> IndexVendor + Send + Sync>;

/// Vendor name → declaration, plus the drivers and connectors they name
#[derive(Clone, Default)]
pub struct IndexRegistry {
    vendors: BTreeMap<String, IndexVendorFactory>,
    drivers: BTreeMap<String, IndexDriverFactory>,
    connectors: ConnectorRegistry,
}

impl IndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in index vendor
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        vendors::register_all(&mut registry);
        registry
    }

    pub fn register_vendor<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> IndexVendor + Send + Sync + 'static,
    {
        self.vendors.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn register_driver<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(IndexDriverContext) -> Result<Arc<dyn IndexDriver>> + Send + Sync + 'static,
    {
        self.drivers.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn register_connector<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&ConnectorContext) -> Result<Arc<dyn Connector>> + Send + Sync + 'static,
    {
        self.connectors.register(name, factory);
        self
    }

    /// Borrow connectors registered elsewhere, e.g. by a graph vendor
    pub fn merge_connectors(&mut self, connectors: &ConnectorRegistry) -> &mut Self {
        self.connectors.merge(connectors);
        self
    }

    pub fn vendor(&self, name: &str) -> Result<IndexVendor> {
        self.vendors.get(name).map(|factory| factory()).ok_or_else(|| {
            DaoError::technical(
                ErrorKey::UnknownVendor,
                format!("Index DAO: unknown vendor \"{name}\""),
            )
        })
    }

    pub fn driver(&self, name: &str) -> Result<IndexDriverFactory> {
        self.drivers
            .get(name)
            .cloned()
            .ok_or_else(|| DaoError::bug(format!("Index driver \"{name}\" is not registered")))
    }

    pub fn connectors(&self) -> &ConnectorRegistry {
        &self.connectors
    }

    pub fn vendor_names(&self) -> impl Iterator<Item = &str> {
        self.vendors.keys().map(String::as_str)
    }
}

impl fmt::Debug for IndexRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexRegistry")
            .field("vendors", &self.vendors.keys().collect::<Vec<_>>())
            .field("drivers", &self.drivers.keys().collect::<Vec<_>>())
            .field("connectors", &self.connectors)
            .finish()
    }
}
