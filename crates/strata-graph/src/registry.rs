//! Vendor, driver and connector registry of the graph DAO.

use crate::driver::{GraphDriver, GraphDriverContext, GraphDriverFactory};
use crate::features::GraphFeatures;
use crate::vendors;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use strata_core::{
    Connector, ConnectorContext, ConnectorRegistry, DaoError, ErrorKey, OptionSchema, Result,
};

/// Everything a graph vendor declares; vendors carry no behaviour
#[derive(Debug, Clone)]
pub struct GraphVendor {
    pub name: String,
    pub features: GraphFeatures,
    pub options: OptionSchema,
    /// Connector names, most preferred first
    pub connectors: Vec<String>,
    /// `(minVersion, driverName)` rows, any order
    pub drivers: Vec<(&'static str, &'static str)>,
}

pub type GraphVendorFactory = Arc<dyn Fn() -> GraphVendor + Send + Sync>;

/// Vendor name → declaration, plus the drivers and connectors they name
#[derive(Clone, Default)]
pub struct GraphRegistry {
    vendors: BTreeMap<String, GraphVendorFactory>,
    drivers: BTreeMap<String, GraphDriverFactory>,
    connectors: ConnectorRegistry,
}

impl GraphRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in vendor
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        vendors::register_all(&mut registry);
        registry
    }

    pub fn register_vendor<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> GraphVendor + Send + Sync + 'static,
    {
        self.vendors.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn register_driver<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(GraphDriverContext) -> Result<Arc<dyn GraphDriver>> + Send + Sync + 'static,
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

    /// Declaration of `name`, or a fatal `unknown_vendor` error
    pub fn vendor(&self, name: &str) -> Result<GraphVendor> {
        self.vendors.get(name).map(|factory| factory()).ok_or_else(|| {
            DaoError::technical(
                ErrorKey::UnknownVendor,
                format!("Graph DAO: unknown vendor \"{name}\""),
            )
        })
    }

    pub fn driver(&self, name: &str) -> Result<GraphDriverFactory> {
        self.drivers
            .get(name)
            .cloned()
            .ok_or_else(|| DaoError::bug(format!("Graph driver \"{name}\" is not registered")))
    }

    pub fn connectors(&self) -> &ConnectorRegistry {
        &self.connectors
    }

    pub fn vendor_names(&self) -> impl Iterator<Item = &str> {
        self.vendors.keys().map(String::as_str)
    }
}

impl fmt::Debug for GraphRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphRegistry")
            .field("vendors", &self.vendors.keys().collect::<Vec<_>>())
            .field("drivers", &self.drivers.keys().collect::<Vec<_>>())
            .field("connectors", &self.connectors)
            .finish()
    }
}
