//! `surrealdb` vendor over the WebSocket engine.
//!
//! Options:
//! - `url` (required): `host:port`, a `ws://` / `wss://` prefix is accepted
//! - `user`, `password`: root credentials (`root` / `root` by default)
//! - `namespace`, `database`: `strata` / `graph` by default
//!
//! Raw queries (`surrealql`) select records of the `node` table.

mod connector;
mod driver;

pub use connector::{SurrealConnector, META_TABLE};
pub use driver::{SurrealDriver, SurrealFlavor, SURREALQL_DIALECT};

use crate::features::GraphFeatures;
use crate::registry::{GraphRegistry, GraphVendor};
use std::sync::Arc;
use strata_core::{Connector, ConnectorContext, OptionSchema};

pub const VENDOR: &str = "surrealdb";
pub const CONNECTOR: &str = "surrealWs";

pub fn vendor() -> GraphVendor {
    GraphVendor {
        name: VENDOR.to_string(),
        features: GraphFeatures {
            shortest_paths: false,
            can_stream: false,
            dialects: vec![SURREALQL_DIALECT.to_string()],
            ..GraphFeatures::default()
        },
        options: OptionSchema::new(&["url"], &["user", "password", "namespace", "database"]),
        connectors: vec![CONNECTOR.to_string()],
        drivers: vec![
            ("2.2.0", strata_core::driver::LATEST_DRIVER),
            ("2.0.0", "surreal200"),
            ("1.0.0", "surreal100"),
        ],
    }
}

pub fn register(registry: &mut GraphRegistry) {
    registry
        .register_vendor(VENDOR, vendor)
        .register_connector(CONNECTOR, |context: &ConnectorContext| {
            Ok(Arc::new(SurrealConnector::from_context(context)?) as Arc<dyn Connector>)
        })
        .register_driver("surreal200", |context| {
            SurrealDriver::create(context, SurrealFlavor::V2)
        })
        .register_driver("surreal100", |context| {
            SurrealDriver::create(context, SurrealFlavor::V1)
        });
}
