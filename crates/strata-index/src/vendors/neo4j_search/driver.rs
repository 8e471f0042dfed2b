//! Search driver over the indexes Neo4j maintains itself.
//!
//! 4.x and later query full-text indexes through
//! `db.index.fulltext.queryNodes` / `queryRelationships`; 3.x reads the
//! legacy auto-indexes with `START`. Both first send the text unchanged, in
//! case it already is a Lucene query, and fall back to a fuzzy query built
//! from its words.

use crate::driver::{IndexDriver, IndexDriverContext};
use crate::params::SearchQuery;
use crate::util::{lucene_fuzzy_query, unique_tokens};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use strata_core::{
    downcast_connector, CategoryFilter, DaoError, Driver, ErrorKey, ItemType, Properties,
    RawSearchResult, Result, SearchHit,
};
use strata_graph::vendors::neo4j::cypher::encode_name;
use strata_graph::vendors::neo4j::{Neo4jHttpConnector, Statement};
use tracing::{debug, info};

/// Shortest last word also searched as a prefix
const MIN_PREFIX_LENGTH: usize = 2;

const JMX_CONFIGURATION: &str = "CALL dbms.queryJmx('org.neo4j:instance=kernel#0,name=Configuration') \
     YIELD attributes RETURN attributes";

/// Index kind the driver reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchFlavor {
    /// Neo4j 4.x+: named full-text indexes
    FullText,
    /// Neo4j 3.x: `node_auto_index` / `relationship_auto_index`
    AutoIndex,
}

impl SearchFlavor {
    /// Parameter reference in this flavor's Cypher
    fn param(self, name: &str) -> String {
        match self {
            SearchFlavor::FullText => format!("${name}"),
            SearchFlavor::AutoIndex => format!("{{{name}}}"),
        }
    }
}

/// A searchable index and the properties it covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchIndex {
    pub name: String,
    pub properties: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct Indexes {
    node: Option<SearchIndex>,
    edge: Option<SearchIndex>,
}

#[derive(Debug, Deserialize)]
struct RowItem {
    id: i64,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(rename = "type", default)]
    edge_type: Option<String>,
    #[serde(default)]
    properties: Properties,
}

/// Parse `[a, b]` or `a,b`; empty lists are rejected
pub fn parse_property_list(setting: &str, value: Option<&str>) -> Result<Vec<String>> {
    let trimmed = value.unwrap_or_default().trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .unwrap_or(trimmed);
    let properties: Vec<String> = inner
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    if properties.is_empty() {
        return Err(DaoError::business(
            ErrorKey::SourceActionNeeded,
            format!("\"{setting}\" must be a non-empty comma separated list of property keys."),
        ));
    }
    Ok(properties)
}

/// First property whose text contains one of the searched words
fn matched_property(data: &Properties, text: &str) -> Option<(String, String)> {
    let words: Vec<String> = unique_tokens(text).iter().map(|w| w.to_lowercase()).collect();
    data.iter().find_map(|(key, value)| {
        let value = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let lower = value.to_lowercase();
        words
            .iter()
            .any(|w| lower.contains(w.as_str()))
            .then(|| (key.clone(), value))
    })
}

pub struct Neo4jSearchDriver {
    connector: Arc<Neo4jHttpConnector>,
    flavor: SearchFlavor,
    node_index_option: Option<String>,
    edge_index_option: Option<String>,
    skip_edges: bool,
    indexes: RwLock<Indexes>,
}

impl Neo4jSearchDriver {
    pub fn create(context: IndexDriverContext, flavor: SearchFlavor) -> Result<Arc<dyn IndexDriver>> {
        let options = &context.index_options;
        Ok(Arc::new(Self {
            connector: downcast_connector(context.connector.clone())?,
            flavor,
            node_index_option: options.get_str("nodeIndex").map(str::to_string),
            edge_index_option: options.get_str("edgeIndex").map(str::to_string),
            skip_edges: context.skip_edges(),
            indexes: RwLock::new(Indexes::default()),
        }))
    }

    fn index(&self, item_type: ItemType) -> Option<SearchIndex> {
        let indexes = self.indexes.read().unwrap_or_else(PoisonError::into_inner);
        match item_type {
            ItemType::Node => indexes.node.clone(),
            ItemType::Edge => indexes.edge.clone(),
        }
    }

    /// Full-text indexes declared in the database
    async fn full_text_indexes(&self) -> Result<Indexes> {
        let statement = Statement::new(
            "SHOW FULLTEXT INDEXES YIELD name, entityType, properties \
             RETURN name, entityType, properties",
        );
        let mut node_indexes = Vec::new();
        let mut edge_indexes = Vec::new();
        for row in self.connector.query(statement, false).await?.rows() {
            let [name, entity_type, properties]: [Value; 3] = row.try_into().map_err(|_| {
                DaoError::technical(ErrorKey::UnexpectedResponse, "Unexpected full-text index row")
            })?;
            let index = SearchIndex {
                name: name.as_str().unwrap_or_default().to_string(),
                properties: serde_json::from_value(properties)?,
            };
            match entity_type.as_str() {
                Some("NODE") => node_indexes.push(index),
                Some("RELATIONSHIP") => edge_indexes.push(index),
                _ => {}
            }
        }

        let node = pick_index(&node_indexes, self.node_index_option.as_deref())?.ok_or_else(|| {
            DaoError::business(
                ErrorKey::SourceActionNeeded,
                "No full-text index on nodes was found in Neo4j. \
                 Please create one with \"CREATE FULLTEXT INDEX\".",
            )
        })?;
        let edge = pick_index(&edge_indexes, self.edge_index_option.as_deref())?;
        Ok(Indexes {
            node: Some(node),
            edge,
        })
    }

    /// Auto-index settings read from the kernel configuration
    async fn auto_indexes(&self) -> Result<Indexes> {
        let result = self.connector.query(Statement::new(JMX_CONFIGURATION), false).await?;
        let attributes = result.scalar().cloned().unwrap_or(Value::Null);
        let setting = |key: &str| {
            attributes
                .pointer(&format!("/{}/value", key.replace('/', "~1")))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        if setting("dbms.auto_index.nodes.enabled").as_deref() != Some("true") {
            return Err(DaoError::business(
                ErrorKey::SourceActionNeeded,
                "\"dbms.auto_index.nodes.enabled\" must be set to \"true\".",
            ));
        }
        let node = SearchIndex {
            name: "node_auto_index".to_string(),
            properties: parse_property_list(
                "dbms.auto_index.nodes.keys",
                setting("dbms.auto_index.nodes.keys").as_deref(),
            )?,
        };

        let edge = if setting("dbms.auto_index.relationships.enabled").as_deref() == Some("true") {
            Some(SearchIndex {
                name: "relationship_auto_index".to_string(),
                properties: parse_property_list(
                    "dbms.auto_index.relationships.keys",
                    setting("dbms.auto_index.relationships.keys").as_deref(),
                )?,
            })
        } else {
            None
        };
        Ok(Indexes {
            node: Some(node),
            edge,
        })
    }

    /// Cypher returning one page of `query` matches of `lucene` in `index`,
    /// one extra row telling whether more exist
    pub fn search_statement(
        &self,
        query: &SearchQuery,
        index: &SearchIndex,
        lucene: &str,
    ) -> Statement {
        let p = |name: &str| self.flavor.param(name);
        let source = match (self.flavor, query.item_type) {
            (SearchFlavor::FullText, ItemType::Node) => format!(
                "CALL db.index.fulltext.queryNodes({}, {}) YIELD node AS i, score",
                p("index"),
                p("query")
            ),
            (SearchFlavor::FullText, ItemType::Edge) => format!(
                "CALL db.index.fulltext.queryRelationships({}, {}) YIELD relationship AS i, score",
                p("index"),
                p("query")
            ),
            (SearchFlavor::AutoIndex, ItemType::Node) => {
                format!("START i=node:node_auto_index({}) WITH i", p("query"))
            }
            (SearchFlavor::AutoIndex, ItemType::Edge) => format!(
                "START i=relationship:relationship_auto_index({}) WITH i",
                p("query")
            ),
        };

        let mut statement = Statement::new(String::new())
            .param("index", index.name.clone())
            .param("query", lucene);
        let mut clauses = Vec::new();

        if let Some(categories) = &query.categories_or_types {
            match query.item_type {
                ItemType::Node => {
                    let no_category = categories
                        .iter()
                        .any(|c| CategoryFilter::parse(c) == CategoryFilter::NoCategory);
                    let readable: Vec<String> = categories
                        .iter()
                        .filter(|c| CategoryFilter::parse(c) != CategoryFilter::NoCategory)
                        .cloned()
                        .collect();
                    let mut clause =
                        format!("ANY(l IN labels(i) WHERE l IN {})", p("categories"));
                    if no_category {
                        clause.push_str(" OR size(labels(i)) = 0");
                    }
                    clauses.push(clause);
                    statement = statement.param("categories", readable);
                }
                ItemType::Edge => {
                    clauses.push(format!("type(i) IN {}", p("categories")));
                    statement = statement.param("categories", categories.clone());
                }
            }
        }
        for (n, (property, value)) in query.filter.iter().enumerate() {
            let name = format!("filter{n}");
            clauses.push(format!(
                "toLower(toString(i.{})) CONTAINS toLower({})",
                encode_name(property),
                p(&name)
            ));
            statement = statement.param(&name, value.clone());
        }

        let mut cypher = source;
        if !clauses.is_empty() {
            cypher.push_str(&format!(" WHERE ({})", clauses.join(") AND (")));
        }
        let projection = match query.item_type {
            ItemType::Node => "{id: id(i), labels: labels(i), properties: properties(i)}",
            ItemType::Edge => "{id: id(i), type: type(i), properties: properties(i)}",
        };
        cypher.push_str(&format!(" RETURN {projection}"));
        if self.flavor == SearchFlavor::FullText {
            cypher.push_str(" ORDER BY score DESC");
        }
        cypher.push_str(&format!(" SKIP {} LIMIT {}", query.from, query.size + 1));

        statement.statement = cypher;
        statement
    }

    async fn run_search(
        &self,
        query: &SearchQuery,
        index: &SearchIndex,
        lucene: &str,
    ) -> Result<Vec<RowItem>> {
        let statement = self.search_statement(query, index, lucene);
        self.connector
            .query(statement, false)
            .await?
            .rows()
            .filter_map(|row| row.into_iter().next())
            .map(|value| serde_json::from_value(value).map_err(DaoError::from))
            .collect()
    }
}

/// The index named `wanted`, or the first one when no name is given
fn pick_index(indexes: &[SearchIndex], wanted: Option<&str>) -> Result<Option<SearchIndex>> {
    match wanted {
        Some(name) => indexes
            .iter()
            .find(|i| i.name == name)
            .cloned()
            .map(Some)
            .ok_or_else(|| {
                DaoError::business(
                    ErrorKey::SourceActionNeeded,
                    format!("The full-text index \"{name}\" does not exist in Neo4j."),
                )
            }),
        None => Ok(indexes.first().cloned()),
    }
}

#[async_trait]
impl Driver for Neo4jSearchDriver {
    async fn on_after_connect(&self) -> Result<()> {
        let mut indexes = match self.flavor {
            SearchFlavor::FullText => self.full_text_indexes().await?,
            SearchFlavor::AutoIndex => self.auto_indexes().await?,
        };
        if self.skip_edges {
            indexes.edge = None;
        }
        info!(
            node_index = ?indexes.node.as_ref().map(|i| &i.name),
            edge_index = ?indexes.edge.as_ref().map(|i| &i.name),
            "neo4j search indexes"
        );
        *self.indexes.write().unwrap_or_else(PoisonError::into_inner) = indexes;
        Ok(())
    }
}

#[async_trait]
impl IndexDriver for Neo4jSearchDriver {
    async fn search(&self, query: &SearchQuery) -> Result<RawSearchResult> {
        let Some(index) = self.index(query.item_type) else {
            return Ok(RawSearchResult {
                total_hits: None,
                more_results: Some(false),
                hits: Vec::new(),
            });
        };

        let mut rows = match self.run_search(query, &index, &query.text).await {
            Ok(rows) => rows,
            Err(e) => {
                debug!(error = %e, "not a Lucene query, searching with a fuzzy query");
                let properties: &[String] = match self.flavor {
                    SearchFlavor::AutoIndex => index.properties.as_slice(),
                    SearchFlavor::FullText => &[],
                };
                let lucene =
                    lucene_fuzzy_query(&query.text, properties, query.fuzziness, MIN_PREFIX_LENGTH);
                self.run_search(query, &index, &lucene).await?
            }
        };

        let more_results = rows.len() as u64 > query.size;
        rows.truncate(query.size as usize);

        let hits = rows
            .into_iter()
            .map(|row| {
                let categories = match query.item_type {
                    ItemType::Node => row.labels,
                    ItemType::Edge => row.edge_type.into_iter().collect(),
                };
                let id = row.id.to_string();
                let (field, value) = matched_property(&row.properties, &query.text).unzip();
                let name = strata_core::Node::new(id.clone(), Vec::new(), row.properties).caption();
                SearchHit {
                    id,
                    categories,
                    name,
                    field,
                    value,
                }
            })
            .collect();

        Ok(RawSearchResult {
            total_hits: None,
            more_results: Some(more_results),
            hits,
        })
    }
}
