//! `neo4j` vendor: Cypher over the transactional HTTP API.
//!
//! Options:
//! - `url` (required): base URL, e.g. `http://localhost:7474`
//! - `user`, `password`: basic authentication
//! - `writeUrl`: base URL used for write statements (cluster leader)
//! - `database`: 4.x+ database name, `neo4j` by default
//! - `proxy`, `allowSelfSigned`: HTTP client settings

mod connector;
pub mod cypher;
mod driver;

pub use connector::{
    Endpoint, GraphNode, GraphRecord, GraphRelationship, Neo4jHttpConnector, Record, Statement,
    StatementResult,
};
pub use cypher::CypherFlavor;
pub use driver::Neo4jDriver;

use crate::features::GraphFeatures;
use crate::registry::{GraphRegistry, GraphVendor};
use std::sync::Arc;
use strata_core::{Connector, ConnectorContext, OptionSchema};

pub const VENDOR: &str = "neo4j";
pub const HTTP_CONNECTOR: &str = "neo4jHttp";
pub const LEGACY_HTTP_CONNECTOR: &str = "neo4jLegacyHttp";
pub const CYPHER_DIALECT: &str = "cypher";

/// Options shared with the `neo4jSearch` index vendor
pub const CONNECTION_OPTIONS: [&str; 6] = [
    "user",
    "password",
    "writeUrl",
    "database",
    "proxy",
    "allowSelfSigned",
];

pub fn vendor() -> GraphVendor {
    GraphVendor {
        name: VENDOR.to_string(),
        features: GraphFeatures {
            alerts: true,
            alternative_ids: true,
            dialects: vec![CYPHER_DIALECT.to_string()],
            ..GraphFeatures::default()
        },
        options: OptionSchema::new(&["url"], &CONNECTION_OPTIONS),
        connectors: vec![HTTP_CONNECTOR.to_string(), LEGACY_HTTP_CONNECTOR.to_string()],
        drivers: vec![
            ("5.26.0", strata_core::driver::LATEST_DRIVER),
            ("5.0.0", "neo4j500"),
            ("4.0.0", "neo4j400"),
            ("3.0.0", "neo4j300"),
        ],
    }
}

/// Register the two HTTP connectors without any driver
pub fn register_connectors(registry: &mut GraphRegistry) {
    registry
        .register_connector(HTTP_CONNECTOR, |context: &ConnectorContext| {
            let connector = Neo4jHttpConnector::from_context(context, Endpoint::Discovery)?;
            Ok(Arc::new(connector) as Arc<dyn Connector>)
        })
        .register_connector(LEGACY_HTTP_CONNECTOR, |context: &ConnectorContext| {
            let connector = Neo4jHttpConnector::from_context(context, Endpoint::Legacy)?;
            Ok(Arc::new(connector) as Arc<dyn Connector>)
        });
}

pub fn register(registry: &mut GraphRegistry) {
    register_connectors(registry);
    registry
        .register_vendor(VENDOR, vendor)
        .register_driver("neo4j500", |context| Neo4jDriver::create(context, CypherFlavor::V5))
        .register_driver("neo4j400", |context| Neo4jDriver::create(context, CypherFlavor::V4))
        .register_driver("neo4j300", |context| Neo4jDriver::create(context, CypherFlavor::V3));
}
