//! Strata data sources
//!
//! A data source ties one graph DAO to an optional index DAO and owns their
//! common lifecycle: retried connection, store identity tracking, health
//! checks and full re-indexation.

pub mod source;
pub mod state;

pub use source::{DataSource, DataSourceStatus};
pub use state::SourceState;
