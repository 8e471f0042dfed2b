//! Strata CLI - Command-line interface
//!
//! Usage:
//!   strata vendors
//!   strata connect
//!   strata count <source>
//!   strata search <source> <query> [--edges] [--size N] [--fuzziness F]
//!   strata reindex <source>

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use strata_core::config::LoggingConfig;
use strata_core::{AppConfig, ItemType, OptionSchema};
use strata_graph::GraphRegistry;
use strata_index::{IndexRegistry, SearchOptions};
use strata_source::DataSource;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Graph databases and search indices behind one DAO layer")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = "strata.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the registered vendors and their feature matrices
    Vendors,
    /// Connect every configured data source and print its status
    Connect,
    /// Count the nodes and edges of a data source
    Count {
        /// Data-source name
        source: String,
    },
    /// Full-text search in the index of a data source
    Search {
        /// Data-source name
        source: String,
        /// Search text
        query: String,
        /// Search edges instead of nodes
        #[arg(long)]
        edges: bool,
        /// Page size
        #[arg(long)]
        size: Option<u64>,
        /// 1 is exact, 0.1 very fuzzy
        #[arg(long)]
        fuzziness: Option<f64>,
    },
    /// Rebuild the index of a data source from its graph
    Reindex {
        /// Data-source name
        source: String,
    },
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let config = if path.exists() {
        AppConfig::from_file(path)?
    } else {
        AppConfig::default()
    };
    Ok(config.with_env_override()?)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn options_json(schema: &OptionSchema) -> Value {
    json!({
        "required": schema.required().collect::<Vec<_>>(),
        "available": schema.available().collect::<Vec<_>>(),
    })
}

fn vendors_json(graphs: &GraphRegistry, indices: &IndexRegistry) -> anyhow::Result<Value> {
    let mut graph = Vec::new();
    for name in graphs.vendor_names() {
        let vendor = graphs.vendor(name)?;
        graph.push(json!({
            "name": vendor.name,
            "features": vendor.features,
            "options": options_json(&vendor.options),
            "connectors": vendor.connectors,
        }));
    }

    let mut index = Vec::new();
    for name in indices.vendor_names() {
        let vendor = indices.vendor(name)?;
        index.push(json!({
            "name": vendor.name,
            "features": vendor.features,
            "options": options_json(&vendor.options),
            "connectors": vendor.connectors,
            "graphVendors": vendor.graph_vendors,
        }));
    }
    Ok(json!({ "graph": graph, "index": index }))
}

/// Build and connect the data source called `name`
async fn connected_source(
    config: &AppConfig,
    graphs: &GraphRegistry,
    indices: &IndexRegistry,
    name: &str,
) -> anyhow::Result<DataSource> {
    let Some(source_config) = config.data_source(name) else {
        bail!("No data source named \"{name}\" in the configuration");
    };
    let source = DataSource::from_config(source_config, &config.advanced, graphs, indices)?;
    source
        .connect()
        .await
        .with_context(|| format!("Cannot connect data source \"{name}\""))?;
    Ok(source)
}

fn print(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    init_tracing(&config.logging);

    let graphs = GraphRegistry::builtin();
    let indices = IndexRegistry::builtin();

    match cli.command {
        Commands::Vendors => print(&vendors_json(&graphs, &indices)?)?,
        Commands::Connect => {
            if config.data_sources.is_empty() {
                tracing::warn!(config = %cli.config.display(), "no data source configured");
            }
            let mut statuses = Vec::new();
            for source_config in &config.data_sources {
                let source =
                    DataSource::from_config(source_config, &config.advanced, &graphs, &indices)?;
                // Failures show up in the printed state
                let _ = source.connect().await;
                statuses.push(serde_json::to_value(source.status())?);
                source.disconnect().await;
            }
            print(&Value::Array(statuses))?;
        }
        Commands::Count { source } => {
            let source = connected_source(&config, &graphs, &indices, &source).await?;
            let nodes = source.graph().get_node_count(false).await?;
            let edges = source.graph().get_edge_count(false).await?;
            source.disconnect().await;
            print(&json!({ "source": source.name(), "nodes": nodes, "edges": edges }))?;
        }
        Commands::Search {
            source,
            query,
            edges,
            size,
            fuzziness,
        } => {
            let source = connected_source(&config, &graphs, &indices, &source).await?;
            let index = source
                .index()
                .with_context(|| format!("Data source \"{}\" has no index", source.name()))?;
            let item_type = if edges { ItemType::Edge } else { ItemType::Node };
            let options = SearchOptions {
                size,
                fuzziness,
                ..SearchOptions::default()
            };
            let response = index.search(item_type, &query, &options).await?;
            source.disconnect().await;
            print(&serde_json::to_value(response)?)?;
        }
        Commands::Reindex { source } => {
            let source = connected_source(&config, &graphs, &indices, &source).await?;
            let progress = source.reindex().await?;
            source.disconnect().await;
            print(&json!({
                "source": source.name(),
                "nodes": progress.indexed(ItemType::Node),
                "edges": progress.indexed(ItemType::Edge),
            }))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search() {
        let cli = Cli::parse_from([
            "strata", "search", "movies", "ada", "--edges", "--size", "5", "--fuzziness", "0.5",
        ]);
        assert_eq!(cli.config, PathBuf::from("strata.toml"));
        match cli.command {
            Commands::Search {
                source,
                query,
                edges,
                size,
                fuzziness,
            } => {
                assert_eq!(source, "movies");
                assert_eq!(query, "ada");
                assert!(edges);
                assert_eq!(size, Some(5));
                assert_eq!(fuzziness, Some(0.5));
            }
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::parse_from(["strata", "count", "movies", "--config", "/etc/strata.toml"]);
        assert_eq!(cli.config, PathBuf::from("/etc/strata.toml"));
        assert!(matches!(cli.command, Commands::Count { .. }));
    }

    #[test]
    fn test_vendors_json_lists_builtins() {
        let vendors = vendors_json(&GraphRegistry::builtin(), &IndexRegistry::builtin()).unwrap();
        let graph: Vec<&str> = vendors["graph"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["name"].as_str().unwrap())
            .collect();
        assert!(graph.contains(&"neo4j"));
        assert!(graph.contains(&"memory"));

        let neo4j_search = vendors["index"]
            .as_array()
            .unwrap()
            .iter()
            .find(|v| v["name"] == "neo4jSearch")
            .unwrap();
        assert_eq!(neo4j_search["graphVendors"], json!(["neo4j"]));
    }

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let config = load_config(Path::new("/nonexistent/strata.toml")).unwrap();
        assert!(config.data_sources.is_empty());
    }
}
