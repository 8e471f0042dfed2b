//! Generic DAO core: option validation, connector fallback and driver
//! negotiation shared by the graph and index façades.

use crate::connector::{Connector, ConnectorContext, ConnectorData, ConnectorRegistry};
use crate::driver::{Driver, DriverTable};
use crate::error::{DaoError, ErrorKey, Result};
use crate::options::{DaoOptions, OptionSchema};
use crate::semver::Version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// The two families of DAO
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DaoKind {
    Graph,
    Index,
}

impl fmt::Display for DaoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaoKind::Graph => write!(f, "Graph"),
            DaoKind::Index => write!(f, "Index"),
        }
    }
}

impl FromStr for DaoKind {
    type Err = DaoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "graph" => Ok(DaoKind::Graph),
            "index" => Ok(DaoKind::Index),
            _ => Err(DaoError::bug(format!(
                "DAO: \"type\" must be one of: graph, index (got \"{s}\")"
            ))),
        }
    }
}

/// What a vendor contributes to the generic core
#[derive(Debug, Clone)]
pub struct DaoDeclaration {
    pub kind: DaoKind,
    pub vendor: String,
    pub schema: OptionSchema,
    /// Connector names, most preferred first
    pub connectors: Vec<String>,
    pub drivers: DriverTable,
}

/// Driver name, live connector and its metadata, handed to a driver factory
#[derive(Clone)]
pub struct DriverBinding {
    pub driver: String,
    pub connector: Arc<dyn Connector>,
    pub connector_data: ConnectorData,
}

/// Diagnostics about the last successful connect
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub connector: String,
    pub driver: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub connected_at: DateTime<Utc>,
}

#[derive(Clone)]
struct BoundConnector {
    name: String,
    connector: Arc<dyn Connector>,
}

struct Binding<D: ?Sized> {
    connector: Option<BoundConnector>,
    driver: Option<Arc<D>>,
    info: Option<ConnectionInfo>,
}

/// Connection state and negotiation logic of one DAO instance
pub struct DaoCore<D: ?Sized> {
    kind: DaoKind,
    vendor: String,
    name: String,
    options: DaoOptions,
    connectors: Vec<String>,
    drivers: DriverTable,
    registry: Arc<ConnectorRegistry>,
    context: ConnectorContext,
    binding: RwLock<Binding<D>>,
}

impl<D: Driver + ?Sized> DaoCore<D> {
    /// Validate the declaration and options; nothing is connected yet.
    ///
    /// `graph_options` are the options of the graph DAO an index DAO sits on.
    pub fn new(
        declaration: DaoDeclaration,
        options: DaoOptions,
        graph_options: Option<DaoOptions>,
        registry: Arc<ConnectorRegistry>,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let DaoDeclaration {
            kind,
            vendor,
            schema,
            connectors,
            drivers,
        } = declaration;

        if vendor.is_empty() {
            return Err(DaoError::bug("DAO: \"vendor\" must be a non-empty string"));
        }
        let name = format!("{kind} DAO ({vendor})");
        schema.validate(&name, &options)?;

        if connectors.is_empty() {
            return Err(DaoError::bug(format!(
                "{name}: at least one connector is required"
            )));
        }

        let context = match (kind, graph_options) {
            (DaoKind::Graph, _) => ConnectorContext::graph(options.clone(), connect_timeout),
            (DaoKind::Index, Some(graph)) => {
                ConnectorContext::index(graph, options.clone(), connect_timeout)
            }
            (DaoKind::Index, None) => {
                return Err(DaoError::bug(format!(
                    "{name}: an index DAO needs the options of its graph DAO"
                )))
            }
        };

        Ok(Self {
            kind,
            vendor,
            name,
            options,
            connectors,
            drivers,
            registry,
            context,
            binding: RwLock::new(Binding {
                connector: None,
                driver: None,
                info: None,
            }),
        })
    }

    pub fn kind(&self) -> DaoKind {
        self.kind
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    /// e.g. `Graph DAO (neo4j)`
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &DaoOptions {
        &self.options
    }

    pub fn get_option(&self, key: &str, default: Value) -> Value {
        match self.options.get(key) {
            Some(value) if !value.is_null() => value.clone(),
            _ => default,
        }
    }

    pub fn connector_candidates(&self) -> &[String] {
        &self.connectors
    }

    pub fn driver_table(&self) -> &DriverTable {
        &self.drivers
    }

    fn read(&self) -> RwLockReadGuard<'_, Binding<D>> {
        self.binding.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Binding<D>> {
        self.binding.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Try the configured connector candidates in order
    pub async fn first_connect(&self) -> Result<String> {
        self.first_connect_with(self.connectors.clone()).await
    }

    /// Try `candidates` in order, bind the first that connects and return
    /// the live version. Only the last candidate's error is surfaced.
    pub async fn first_connect_with(&self, candidates: Vec<String>) -> Result<String> {
        let mut remaining: VecDeque<String> = candidates.into();
        let Some(mut candidate) = remaining.pop_front() else {
            return Err(DaoError::bug(format!(
                "{}: at least one connector is required",
                self.name
            )));
        };

        loop {
            match self.try_connector(&candidate).await {
                Ok((connector, version)) => {
                    info!(dao = %self.name, connector = %candidate, %version, "will be using connector");
                    self.write().connector = Some(BoundConnector {
                        name: candidate,
                        connector,
                    });
                    return Ok(version);
                }
                Err(e) => match remaining.pop_front() {
                    Some(next) => {
                        debug!(dao = %self.name, connector = %candidate, error = %e, "connector failed, trying next candidate");
                        candidate = next;
                    }
                    None => return Err(e),
                },
            }
        }
    }

    async fn try_connector(&self, name: &str) -> Result<(Arc<dyn Connector>, String)> {
        let factory = self.registry.resolve(name)?;
        let connector = factory(&self.context)?;
        let version = connector.connect().await?;
        Ok((connector, version))
    }

    /// Connect (reusing the bound connector, if any), pick a driver for the
    /// live version, build it with `instantiate` and run its post-connect
    /// hook. Returns the live version.
    pub async fn connect<F>(&self, instantiate: F) -> Result<String>
    where
        F: FnOnce(DriverBinding) -> Result<Arc<D>>,
    {
        let bound = {
            let mut binding = self.write();
            binding.driver = None;
            binding.info = None;
            binding.connector.clone()
        };

        let version = match &bound {
            Some(bound) => bound.connector.connect().await?,
            None => self.first_connect().await?,
        };
        let bound = self.read().connector.clone().ok_or_else(|| {
            DaoError::bug(format!("{}: connector lost while connecting", self.name))
        })?;

        let actual = Version::parse(&version)?;
        let selection = self.drivers.select(&actual);
        if let Some(warning) = &selection.warning {
            warn!(dao = %self.name, "{warning}");
        }
        info!(dao = %self.name, driver = %selection.driver, "will be using driver");

        let connector_data = bound.connector.connector_data().await?;
        let driver = instantiate(DriverBinding {
            driver: selection.driver.clone(),
            connector: bound.connector.clone(),
            connector_data,
        })?;
        driver.on_after_connect().await?;

        let mut binding = self.write();
        binding.driver = Some(driver);
        binding.info = Some(ConnectionInfo {
            connector: bound.name,
            driver: selection.driver,
            version: version.clone(),
            warning: selection.warning.map(|w| w.to_string()),
            connected_at: Utc::now(),
        });
        Ok(version)
    }

    /// Drop the driver and release the connector. Never fails.
    pub async fn disconnect(&self) {
        let bound = {
            let mut binding = self.write();
            binding.driver = None;
            binding.info = None;
            binding.connector.clone()
        };
        if let Some(bound) = bound {
            bound.connector.disconnect().await;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.read().driver.is_some()
    }

    /// The bound driver, or `not_connected`
    pub fn driver(&self) -> Result<Arc<D>> {
        self.read().driver.clone().ok_or_else(|| self.not_connected())
    }

    pub fn connection_info(&self) -> Option<ConnectionInfo> {
        self.read().info.clone()
    }

    /// Name of the bound connector candidate
    pub fn connector_name(&self) -> Option<String> {
        self.read().connector.as_ref().map(|b| b.name.clone())
    }

    fn connector(&self) -> Result<Arc<dyn Connector>> {
        self.read()
            .connector
            .as_ref()
            .map(|b| b.connector.clone())
            .ok_or_else(|| self.not_connected())
    }

    pub async fn check_up(&self) -> Result<()> {
        self.connector()?.check_up().await
    }

    pub async fn store_id(&self) -> Result<String> {
        self.connector()?.store_id().await
    }

    pub async fn on_after_indexation(&self) -> Result<()> {
        self.driver()?.on_after_indexation().await
    }

    fn not_connected(&self) -> DaoError {
        DaoError::technical(
            ErrorKey::NotConnected,
            format!("{} is not connected", self.name),
        )
    }
}

impl<D: ?Sized> fmt::Debug for DaoCore<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DaoCore")
            .field("name", &self.name)
            .field("connectors", &self.connectors)
            .field("drivers", &self.drivers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedConnector {
        version: std::result::Result<String, String>,
        disconnects: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connector for FixedConnector {
        async fn connect(&self) -> Result<String> {
            self.version
                .clone()
                .map_err(|m| DaoError::technical(ErrorKey::GraphUnreachable, m))
        }
        async fn disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
        async fn check_up(&self) -> Result<()> {
            Ok(())
        }
        async fn store_id(&self) -> Result<String> {
            Ok("store-1".to_string())
        }
        fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    #[derive(Debug)]
    struct NamedDriver(String);

    impl Driver for NamedDriver {}

    fn registry(disconnects: Arc<AtomicUsize>) -> Arc<ConnectorRegistry> {
        let mut registry = ConnectorRegistry::new();
        for (name, version) in [
            ("down", Err("down is unreachable".to_string())),
            ("alsoDown", Err("alsoDown is unreachable".to_string())),
            ("v310", Ok("3.1.0".to_string())),
            ("v340", Ok("3.4.0".to_string())),
        ] {
            let disconnects = disconnects.clone();
            registry.register(name, move |_ctx: &ConnectorContext| {
                Ok(Arc::new(FixedConnector {
                    version: version.clone(),
                    disconnects: disconnects.clone(),
                }) as Arc<dyn Connector>)
            });
        }
        Arc::new(registry)
    }

    fn declaration(connectors: &[&str]) -> DaoDeclaration {
        DaoDeclaration {
            kind: DaoKind::Graph,
            vendor: "fake".to_string(),
            schema: OptionSchema::new(&["url"], &["user"]),
            connectors: connectors.iter().map(|c| c.to_string()).collect(),
            drivers: DriverTable::from_pairs(&[
                ("3.3.2", "[latest]"),
                ("3.0.0", "v300"),
                ("2.1.5", "v210"),
            ])
            .unwrap(),
        }
    }

    fn core(connectors: &[&str]) -> DaoCore<NamedDriver> {
        DaoCore::new(
            declaration(connectors),
            DaoOptions::new().with("url", "http://localhost"),
            None,
            registry(Arc::new(AtomicUsize::new(0))),
            Duration::from_secs(1),
        )
        .unwrap()
    }

    fn build(binding: DriverBinding) -> Result<Arc<NamedDriver>> {
        Ok(Arc::new(NamedDriver(binding.driver)))
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("graph".parse::<DaoKind>().unwrap(), DaoKind::Graph);
        assert!("table".parse::<DaoKind>().is_err());
    }

    #[test]
    fn test_name_and_options() {
        let core = core(&["v310"]);
        assert_eq!(core.name(), "Graph DAO (fake)");
        assert_eq!(core.get_option("url", Value::Null), "http://localhost");
        assert_eq!(core.get_option("user", Value::from("neo4j")), "neo4j");
    }

    #[test]
    fn test_rejects_bad_declarations() {
        let registry = registry(Arc::new(AtomicUsize::new(0)));
        let options = DaoOptions::new().with("url", "x");

        let mut empty_vendor = declaration(&["v310"]);
        empty_vendor.vendor.clear();
        assert!(DaoCore::<NamedDriver>::new(
            empty_vendor,
            options.clone(),
            None,
            registry.clone(),
            Duration::from_secs(1)
        )
        .is_err());

        let err = DaoCore::<NamedDriver>::new(
            declaration(&[]),
            options.clone(),
            None,
            registry.clone(),
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(err.message().contains("at least one connector is required"));

        let mut index = declaration(&["v310"]);
        index.kind = DaoKind::Index;
        assert!(
            DaoCore::<NamedDriver>::new(index, options, None, registry, Duration::from_secs(1))
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_fallback_binds_later_candidate() {
        let core = core(&["down", "v310"]);
        let version = core.connect(build).await.unwrap();
        assert_eq!(version, "3.1.0");
        assert_eq!(core.connector_name().as_deref(), Some("v310"));
        assert_eq!(core.driver().unwrap().0, "v300");

        let info = core.connection_info().unwrap();
        assert_eq!(info.driver, "v300");
        assert_eq!(info.warning, None);
    }

    #[tokio::test]
    async fn test_fallback_surfaces_last_error() {
        let core = core(&["down", "alsoDown"]);
        let err = core.connect(build).await.unwrap_err();
        assert_eq!(err.message(), "alsoDown is unreachable");
        assert!(!core.is_connected());
        assert!(core.connector_name().is_none());
    }

    #[tokio::test]
    async fn test_first_connect_with_empty_list() {
        let core = core(&["v310"]);
        let err = core.first_connect_with(Vec::new()).await.unwrap_err();
        assert_eq!(err.key(), ErrorKey::Bug);
    }

    #[tokio::test]
    async fn test_newer_version_warns() {
        let core = core(&["v340"]);
        core.connect(build).await.unwrap();
        let info = core.connection_info().unwrap();
        assert_eq!(info.driver, "v300");
        assert!(info.warning.unwrap().contains("newer than anything tested"));
    }

    #[tokio::test]
    async fn test_failed_instantiation_leaves_no_driver() {
        let core = core(&["v310"]);
        core.connect(build).await.unwrap();
        assert!(core.is_connected());

        let err = core
            .connect(|_| Err(DaoError::bug("no such driver")))
            .await
            .unwrap_err();
        assert_eq!(err.key(), ErrorKey::Bug);
        assert!(!core.is_connected());
        assert_eq!(core.driver().unwrap_err().key(), ErrorKey::NotConnected);
        // the connector binding survives
        assert_eq!(core.connector_name().as_deref(), Some("v310"));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let core: DaoCore<NamedDriver> = DaoCore::new(
            declaration(&["v310"]),
            DaoOptions::new().with("url", "x"),
            None,
            registry(disconnects.clone()),
            Duration::from_secs(1),
        )
        .unwrap();

        core.disconnect().await;
        core.connect(build).await.unwrap();
        core.disconnect().await;
        core.disconnect().await;
        assert!(!core.is_connected());
        assert_eq!(disconnects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_check_up_requires_connector() {
        let core = core(&["v310"]);
        assert_eq!(
            core.check_up().await.unwrap_err().key(),
            ErrorKey::NotConnected
        );
        core.connect(build).await.unwrap();
        core.check_up().await.unwrap();
        assert_eq!(core.store_id().await.unwrap(), "store-1");
    }
}
