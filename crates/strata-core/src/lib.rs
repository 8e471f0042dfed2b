//! Strata Core - DAO plugin framework
//!
//! Vendor-neutral building blocks shared by the graph and index DAOs:
//! - Error taxonomy (business vs technical, stable keys)
//! - Option schemas and parameter checks
//! - Lenient semantic versions and the driver table
//! - Connector/Driver traits and the connector registry
//! - The generic DAO core (connector fallback, driver negotiation)
//! - Shared data model and configuration

pub mod checks;
pub mod config;
pub mod connector;
pub mod dao;
pub mod driver;
pub mod error;
pub mod model;
pub mod options;
pub mod retry;
pub mod semver;

pub use config::{AdvancedConfig, AppConfig, ConfigError, DataSourceConfig, VendorConfig};
pub use connector::{
    downcast_connector, Connector, ConnectorContext, ConnectorData, ConnectorFactory,
    ConnectorRegistry,
};
pub use dao::{ConnectionInfo, DaoCore, DaoDeclaration, DaoKind, DriverBinding};
pub use driver::{Driver, DriverDescriptor, DriverSelection, DriverTable, VersionWarning};
pub use error::{DaoError, ErrorKey, Result};
pub use model::{
    build_search_groups, CategoryFilter, DigestItem, Edge, ItemStream, ItemType, NativeId, Node,
    NodeStatistics, Properties, RawSearchResult, SearchGroup, SearchHit, SearchResponse,
    SearchResults, SimpleDigestItem, SimpleSchema,
};
pub use options::{DaoOptions, OptionSchema};
pub use retry::{retry, RetryPolicy};
pub use semver::Version;
