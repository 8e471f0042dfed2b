//! Connectors own the raw transport to a backend.
//!
//! A vendor lists connector names in preference order; the names resolve
//! through a [`ConnectorRegistry`] when the DAO first connects.

use crate::error::{DaoError, ErrorKey, Result};
use crate::options::DaoOptions;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Vendor metadata a connector hands to the driver it is bound to
pub type ConnectorData = Map<String, Value>;

/// Everything a connector factory may need to build a transport
#[derive(Debug, Clone)]
pub struct ConnectorContext {
    /// Options of the graph DAO (or of the graph DAO an index depends on)
    pub graph_options: DaoOptions,
    /// Options of the index DAO, for index connectors
    pub index_options: Option<DaoOptions>,
    pub connect_timeout: Duration,
}

impl ConnectorContext {
    pub fn graph(graph_options: DaoOptions, connect_timeout: Duration) -> Self {
        Self {
            graph_options,
            index_options: None,
            connect_timeout,
        }
    }

    pub fn index(
        graph_options: DaoOptions,
        index_options: DaoOptions,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            graph_options,
            index_options: Some(index_options),
            connect_timeout,
        }
    }

    /// Index options when present, otherwise graph options
    pub fn own_options(&self) -> &DaoOptions {
        self.index_options.as_ref().unwrap_or(&self.graph_options)
    }
}

/// Raw transport to a vendor backend
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open the transport and report the live server version
    async fn connect(&self) -> Result<String>;

    /// Release the transport; never fails
    async fn disconnect(&self);

    /// Health check of an established transport
    async fn check_up(&self) -> Result<()>;

    /// Identifier of the backing store, stable across restarts
    async fn store_id(&self) -> Result<String>;

    /// Vendor metadata for the driver
    async fn connector_data(&self) -> Result<ConnectorData> {
        Ok(ConnectorData::new())
    }

    /// Upcast for drivers that need their concrete connector type
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Recover the concrete connector type a driver was written against
pub fn downcast_connector<C: Connector + 'static>(connector: Arc<dyn Connector>) -> Result<Arc<C>> {
    connector.into_any().downcast::<C>().map_err(|_| {
        DaoError::bug(format!(
            "Driver bound to an incompatible connector (expected {})",
            std::any::type_name::<C>()
        ))
    })
}

/// Builds a connector from the DAO's options
pub type ConnectorFactory =
    Arc<dyn Fn(&ConnectorContext) -> Result<Arc<dyn Connector>> + Send + Sync>;

/// Connector name → factory
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    factories: BTreeMap<String, ConnectorFactory>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&ConnectorContext) -> Result<Arc<dyn Connector>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Absorb every factory of `other`
    pub fn merge(&mut self, other: &ConnectorRegistry) -> &mut Self {
        for (name, factory) in &other.factories {
            self.factories.insert(name.clone(), factory.clone());
        }
        self
    }

    pub fn resolve(&self, name: &str) -> Result<ConnectorFactory> {
        self.factories.get(name).cloned().ok_or_else(|| {
            DaoError::technical(
                ErrorKey::Bug,
                format!("Connector \"{name}\" is not registered"),
            )
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("connectors", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
