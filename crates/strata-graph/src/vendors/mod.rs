//! Built-in graph vendors.

pub mod memory;
pub mod neo4j;
pub mod surreal;

use crate::registry::GraphRegistry;

pub fn register_all(registry: &mut GraphRegistry) {
    memory::register(registry);
    neo4j::register(registry);
    surreal::register(registry);
}
