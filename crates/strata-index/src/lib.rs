//! Strata Index - Index DAO
//!
//! Full-text search over the items of a graph DAO:
//! - The [`IndexDao`] façade, gating every operation on [`IndexFeatures`]
//! - The [`IndexDriver`] contract implemented per vendor and version
//! - Built-in vendors: `elasticSearch` (HTTP), `neo4jSearch` (Neo4j full-text indexes)

pub mod dao;
pub mod driver;
pub mod features;
pub mod params;
pub mod registry;
pub mod util;
pub mod vendors;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use dao::{IndexDao, INDEX_OPTIONS, INDEX_REQUIRED_OPTIONS, MIN_FUZZINESS};
pub use driver::{
    IndexDriver, IndexDriverContext, IndexDriverFactory, IndexEntry, IndexProgress, PropertyType,
};
pub use features::{IndexFeatures, SchemaFeatures};
pub use params::{IndexSettings, SearchOptions, SearchQuery};
pub use registry::{IndexRegistry, IndexVendor};
