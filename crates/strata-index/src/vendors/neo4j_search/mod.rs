//! `neo4jSearch` vendor: search the indexes Neo4j maintains itself.
//!
//! The index is external: Neo4j keeps it up to date, so writes, clears and
//! re-indexations are no-ops. It reuses the `neo4j` connectors and the
//! graph DAO options (`url`, credentials).
//!
//! Options:
//! - `nodeIndex`: full-text index searched for nodes, the first node index by default
//! - `edgeIndex`: full-text index searched for edges, the first relationship index by default

mod driver;

pub use driver::{parse_property_list, Neo4jSearchDriver, SearchFlavor, SearchIndex};

use crate::features::{IndexFeatures, SchemaFeatures};
use crate::registry::{IndexRegistry, IndexVendor};
use strata_graph::vendors::neo4j;
use strata_graph::GraphRegistry;

pub const VENDOR: &str = "neo4jSearch";
pub const QUERY_DIALECT: &str = "lucene";

pub fn vendor() -> IndexVendor {
    IndexVendor {
        name: VENDOR.to_string(),
        features: IndexFeatures {
            external: true,
            schema: SchemaFeatures::default(),
            can_count: false,
            typing: false,
            fuzzy: true,
            can_index_edges: true,
            can_index_categories: false,
            versions: false,
            advanced_query_dialect: Some(QUERY_DIALECT.to_string()),
            search_hits_count: false,
        },
        options: strata_core::OptionSchema::new(&[], &["nodeIndex", "edgeIndex"]),
        connectors: vec![
            neo4j::HTTP_CONNECTOR.to_string(),
            neo4j::LEGACY_HTTP_CONNECTOR.to_string(),
        ],
        drivers: vec![
            ("5.26.0", strata_core::driver::LATEST_DRIVER),
            ("4.0.0", "neo4jSearch400"),
            ("3.0.0", "neo4jSearch300"),
        ],
        graph_vendors: Some(vec![neo4j::VENDOR.to_string()]),
        node_version_offset: 0,
    }
}

pub fn register(registry: &mut IndexRegistry) {
    let mut graph_connectors = GraphRegistry::new();
    neo4j::register_connectors(&mut graph_connectors);

    registry
        .merge_connectors(graph_connectors.connectors())
        .register_vendor(VENDOR, vendor)
        .register_driver("neo4jSearch400", |context| {
            Neo4jSearchDriver::create(context, SearchFlavor::FullText)
        })
        .register_driver("neo4jSearch300", |context| {
            Neo4jSearchDriver::create(context, SearchFlavor::AutoIndex)
        });
}
