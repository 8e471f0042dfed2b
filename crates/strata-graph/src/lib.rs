//! Strata Graph - Graph DAO
//!
//! Vendor-neutral access to graph databases:
//! - The [`GraphDao`] façade, gating every operation on [`GraphFeatures`]
//! - The [`GraphDriver`] contract implemented per vendor and version
//! - Built-in vendors: `memory` (petgraph), `neo4j` (HTTP), `surrealdb` (WebSocket)

pub mod dao;
pub mod driver;
pub mod features;
pub mod params;
pub mod registry;
pub mod util;
pub mod vendors;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use dao::{GraphDao, GRAPH_OPTIONS, MAX_CONCURRENT_DIGEST_REQS};
pub use driver::{
    AdjacentEdgesQuery, AdjacentNodesQuery, EdgeCreation, EdgePolicy, EdgeUpdate, GraphDriver,
    GraphDriverContext, GraphDriverFactory, ItemRef, ItemRefs, LimitType, NewEdge, NewNode,
    NodeUpdate, Orientation, QueryMatch, RawQuery, ReadableFilter, StreamOptions,
};
pub use features::GraphFeatures;
pub use params::{
    AdjacentEdgesOptions, AdjacentNodesOptions, EdgesByIdOptions, GetEdgeOptions, GetNodeOptions,
    GraphSettings, NodesByIdOptions, RawQueryOptions, ShortestPathOptions, StatisticsOptions,
};
pub use registry::{GraphRegistry, GraphVendor};
