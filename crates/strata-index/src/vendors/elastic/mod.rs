//! `elasticSearch` vendor: an internal index kept in Elasticsearch.
//!
//! Options:
//! - `host`, `port` (required)
//! - `https`, `user`, `password`: transport settings
//! - `dynamicMapping`: let Elasticsearch infer property types; all
//!   properties are indexed as strings otherwise
//! - `forceStringMapping`: properties indexed as strings even with
//!   `dynamicMapping`
//! - `analyzer`: analyzer of string fields, `lk_analyzer` by default

mod connector;
mod driver;

pub use connector::{ElasticHttpConnector, EsResponse};
pub use driver::{
    edit_distance, is_advanced_query, ElasticDriver, EsFlavor, CATEGORIES_FIELD,
    DEFAULT_ANALYZER, TYPE_FIELD,
};

use crate::features::{IndexFeatures, SchemaFeatures};
use crate::registry::{IndexRegistry, IndexVendor};
use std::sync::Arc;
use strata_core::{Connector, ConnectorContext, OptionSchema};

pub const VENDOR: &str = "elasticSearch";
pub const HTTP_CONNECTOR: &str = "elasticSearchHttp";
pub const QUERY_DIALECT: &str = "elasticsearch";

pub fn vendor() -> IndexVendor {
    IndexVendor {
        name: VENDOR.to_string(),
        features: IndexFeatures {
            external: false,
            schema: SchemaFeatures::default(),
            can_count: true,
            typing: true,
            fuzzy: true,
            can_index_edges: true,
            can_index_categories: true,
            versions: true,
            advanced_query_dialect: Some(QUERY_DIALECT.to_string()),
            search_hits_count: true,
        },
        options: OptionSchema::new(
            &["host", "port"],
            &[
                "https",
                "user",
                "password",
                "dynamicMapping",
                "forceStringMapping",
                "analyzer",
            ],
        ),
        connectors: vec![HTTP_CONNECTOR.to_string()],
        drivers: vec![
            ("8.15.0", strata_core::driver::LATEST_DRIVER),
            ("7.0.0", "es7"),
            ("6.0.0", "es6"),
        ],
        graph_vendors: None,
        node_version_offset: 0,
    }
}

pub fn register(registry: &mut IndexRegistry) {
    registry
        .register_vendor(VENDOR, vendor)
        .register_connector(HTTP_CONNECTOR, |context: &ConnectorContext| {
            let connector = ElasticHttpConnector::from_context(context)?;
            Ok(Arc::new(connector) as Arc<dyn Connector>)
        })
        .register_driver("es7", |context| ElasticDriver::create(context, EsFlavor::V7))
        .register_driver("es6", |context| ElasticDriver::create(context, EsFlavor::V6));
}
