//! Built-in index vendors.

pub mod elastic;
pub mod neo4j_search;

use crate::registry::IndexRegistry;

pub fn register_all(registry: &mut IndexRegistry) {
    elastic::register(registry);
    neo4j_search::register(registry);
}
