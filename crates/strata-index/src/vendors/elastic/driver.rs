//! Index driver for Elasticsearch 6.x and 7.x+.
//!
//! Nodes and edges live in two indices, `{indexName}_nodes` and
//! `{indexName}_edges`. Categories and edge types are stored in the
//! artificial fields `lk_categories` and `lk_type`, with a `.raw` keyword
//! sub-field used for exact filtering.

use super::connector::{ElasticHttpConnector, EsResponse};
use crate::driver::{IndexDriver, IndexDriverContext, IndexEntry, IndexProgress, PropertyType};
use crate::params::SearchQuery;
use async_trait::async_trait;
use futures::StreamExt;
use regex::Regex;
use reqwest::Method;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use strata_core::{
    downcast_connector, CategoryFilter, DaoError, Driver, Edge, ErrorKey, ItemType, Node,
    RawSearchResult, Result, SearchHit,
};
use strata_graph::{GraphDao, StreamOptions};
use tracing::{debug, warn};

pub const CATEGORIES_FIELD: &str = "lk_categories";
pub const TYPE_FIELD: &str = "lk_type";
pub const DEFAULT_ANALYZER: &str = "lk_analyzer";

/// Items sent per `_bulk` request during a full indexation
const BULK_SIZE: usize = 500;

/// Boosted on search and tried, in this order, as the hit name
const INTERESTING_FIELDS: [&str; 5] = ["name", "title", "label", "caption", "rdfs:label"];

/// Elasticsearch field type → property type
fn property_type(es_type: &str) -> Option<PropertyType> {
    match es_type {
        "text" | "keyword" | "string" => Some(PropertyType::String),
        "byte" | "short" | "integer" | "long" => Some(PropertyType::Integer),
        "float" | "half_float" | "scaled_float" | "double" => Some(PropertyType::Float),
        "boolean" => Some(PropertyType::Boolean),
        "date" => Some(PropertyType::Date),
        _ => None,
    }
}

fn advanced_query_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\sAND\s|\s\|\|\s|\s&&\s|\sOR\s|>|<|\[|:|\s\+|\s-)").ok())
        .as_ref()
}

fn bracketed_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(.*?)\]").ok()).as_ref()
}

/// Whether `text` looks like a Lucene query rather than plain words
pub fn is_advanced_query(text: &str) -> bool {
    advanced_query_re().is_some_and(|re| re.is_match(text))
}

/// Edit distance for a normalized fuzziness: exact at 1, `AUTO` down to
/// 0.4, two edits below
pub fn edit_distance(fuzziness: f64) -> Value {
    if fuzziness >= 1.0 {
        json!(0)
    } else if fuzziness >= 0.4 {
        json!("AUTO")
    } else {
        json!(2)
    }
}

fn boosted_fields() -> Vec<String> {
    INTERESTING_FIELDS.iter().map(|f| format!("{f}^1.5")).collect()
}

/// Candidate name fields: each interesting field as is, capitalized, upper-cased
fn display_name_fields() -> impl Iterator<Item = String> {
    INTERESTING_FIELDS.iter().flat_map(|field| {
        let mut chars = field.chars();
        let capitalized: String = chars
            .next()
            .map(|c| c.to_uppercase().chain(chars).collect())
            .unwrap_or_default();
        [field.to_string(), capitalized, field.to_uppercase()]
    })
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Keep ids usable as a single path segment
fn encode_id(id: &str) -> String {
    let mut encoded = String::with_capacity(id.len());
    for c in id.chars() {
        match c {
            '/' => encoded.push_str("%2F"),
            '?' => encoded.push_str("%3F"),
            '#' => encoded.push_str("%23"),
            '%' => encoded.push_str("%25"),
            ' ' => encoded.push_str("%20"),
            c => encoded.push(c),
        }
    }
    encoded
}

/// Wire differences between the supported major versions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EsFlavor {
    /// Mapping types: mappings and bulk actions name the `_doc` type, and
    /// `hits.total` is a number
    V6,
    /// Typeless: `hits.total` is `{value, relation}`
    V7,
}

impl EsFlavor {
    fn wrap_mappings(self, mappings: Value) -> Value {
        match self {
            EsFlavor::V6 => json!({ "_doc": mappings }),
            EsFlavor::V7 => mappings,
        }
    }

    fn mapping_properties(self, mappings: &Value) -> Option<&Map<String, Value>> {
        let pointer = match self {
            EsFlavor::V6 => "/_doc/properties",
            EsFlavor::V7 => "/properties",
        };
        mappings.pointer(pointer).and_then(Value::as_object)
    }

    fn bulk_action(self, index: &str, id: &str) -> Value {
        match self {
            EsFlavor::V6 => json!({"index": {"_index": index, "_type": "_doc", "_id": id}}),
            EsFlavor::V7 => json!({"index": {"_index": index, "_id": id}}),
        }
    }

    fn total_hits(self, body: &Value) -> Option<u64> {
        match self {
            EsFlavor::V6 => body.pointer("/hits/total").and_then(Value::as_u64),
            EsFlavor::V7 => body.pointer("/hits/total/value").and_then(Value::as_u64),
        }
    }
}

pub struct ElasticDriver {
    connector: Arc<ElasticHttpConnector>,
    graph: Arc<GraphDao>,
    flavor: EsFlavor,
    index_name: String,
    skip_edges: bool,
    analyzer: String,
    dynamic_mapping: bool,
    force_string_mapping: Vec<String>,
}

impl ElasticDriver {
    pub fn create(context: IndexDriverContext, flavor: EsFlavor) -> Result<Arc<dyn IndexDriver>> {
        let options = &context.index_options;
        let force_string_mapping = match options.get("forceStringMapping") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(fields)) => fields
                .iter()
                .map(|f| {
                    f.as_str().map(str::to_string).ok_or_else(|| {
                        DaoError::invalid_parameter(
                            "\"options.forceStringMapping\" must be a list of property names",
                        )
                    })
                })
                .collect::<Result<_>>()?,
            Some(_) => {
                return Err(DaoError::invalid_parameter(
                    "\"options.forceStringMapping\" must be a list of property names",
                ))
            }
        };

        Ok(Arc::new(Self {
            connector: downcast_connector(context.connector.clone())?,
            graph: context.graph.clone(),
            flavor,
            index_name: context.index_name().to_lowercase(),
            skip_edges: context.skip_edges(),
            analyzer: options
                .get_str("analyzer")
                .unwrap_or(DEFAULT_ANALYZER)
                .to_string(),
            dynamic_mapping: options.get_bool("dynamicMapping").unwrap_or(false),
            force_string_mapping,
        }))
    }

    fn index(&self, item_type: ItemType) -> String {
        match item_type {
            ItemType::Node => format!("{}_nodes", self.index_name),
            ItemType::Edge => format!("{}_edges", self.index_name),
        }
    }

    fn indices(&self) -> [String; 2] {
        [self.index(ItemType::Node), self.index(ItemType::Edge)]
    }

    fn category_field(item_type: ItemType) -> &'static str {
        match item_type {
            ItemType::Node => CATEGORIES_FIELD,
            ItemType::Edge => TYPE_FIELD,
        }
    }

    // ========================================================================
    // Index layout
    // ========================================================================

    /// Settings and dynamic templates of a new index
    pub fn index_body(&self, item_type: ItemType) -> Value {
        let string_mapping = json!({"type": "text", "analyzer": self.analyzer});
        let category_field = Self::category_field(item_type);

        let mut templates = vec![json!({
            format!("{category_field}_has_raw"): {
                "match": category_field,
                "mapping": {
                    "type": "text",
                    "analyzer": self.analyzer,
                    "fields": {"raw": {"type": "keyword"}}
                }
            }
        })];
        if self.dynamic_mapping {
            for field in &self.force_string_mapping {
                templates.push(json!({
                    format!("{field}_is_a_string"): {"match": field, "mapping": string_mapping}
                }));
            }
            templates.push(json!({
                "all_strings_use_this_analyzer": {
                    "match": "*",
                    "match_mapping_type": "string",
                    "mapping": string_mapping
                }
            }));
        } else {
            templates.push(json!({
                "all_fields_are_strings": {"match": "*", "mapping": string_mapping}
            }));
        }

        json!({
            "settings": {
                "index": {
                    "analysis": {
                        "char_filter": {
                            "dot_to_whitespace": {
                                "type": "pattern_replace",
                                "pattern": "(\\D)\\.(\\D)",
                                "replacement": "$1 $2"
                            },
                            "underscore_to_whitespace": {
                                "type": "pattern_replace",
                                "pattern": "_",
                                "replacement": " "
                            }
                        },
                        "filter": {
                            "asciifolding_original": {
                                "type": "asciifolding",
                                "preserve_original": true
                            }
                        },
                        "analyzer": {
                            DEFAULT_ANALYZER: {
                                "tokenizer": "standard",
                                "char_filter": ["dot_to_whitespace", "underscore_to_whitespace"],
                                "filter": ["asciifolding_original", "lowercase", "stop"]
                            }
                        }
                    }
                }
            },
            "mappings": self.flavor.wrap_mappings(json!({"dynamic_templates": templates}))
        })
    }

    fn document(item: &IndexEntry) -> Value {
        match item {
            IndexEntry::Node(node) => {
                let mut doc = node.data.clone();
                doc.insert(CATEGORIES_FIELD.to_string(), json!(node.categories));
                Value::Object(doc)
            }
            IndexEntry::Edge(edge) => {
                let mut doc = edge.data.clone();
                doc.insert(TYPE_FIELD.to_string(), json!(edge.edge_type));
                Value::Object(doc)
            }
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Index `entries` in one `_bulk` call and return the response items
    async fn bulk_index<I>(&self, item_type: ItemType, entries: I) -> Result<Vec<Value>>
    where
        I: IntoIterator<Item = IndexEntry>,
    {
        let index = self.index(item_type);
        let mut lines = String::new();
        for entry in entries {
            lines.push_str(&self.flavor.bulk_action(&index, entry.id()).to_string());
            lines.push('\n');
            lines.push_str(&Self::document(&entry).to_string());
            lines.push('\n');
        }

        let body = self.connector.bulk("_bulk", lines).await?.check_status(&[200])?.body;
        let items = body
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        if body.get("errors").and_then(Value::as_bool).unwrap_or(false) {
            let failed = items.iter().find(|item| {
                let status = item.pointer("/index/status").and_then(Value::as_u64);
                !matches!(status, Some(200) | Some(201))
            });
            if let Some(error) = failed.and_then(|item| item.pointer("/index/error")) {
                return Err(bulk_error(error));
            }
        }
        Ok(items)
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Request body of a search; `advanced` passes the text to `query_string`
    pub fn search_body(&self, query: &SearchQuery, advanced: bool) -> Value {
        let should = if advanced {
            let mut fields = boosted_fields();
            fields.push("*".to_string());
            vec![json!({
                "query_string": {
                    "fields": fields,
                    "lenient": true,
                    "query": query.text,
                    "analyzer": self.analyzer
                }
            })]
        } else {
            vec![
                json!({
                    "multi_match": {
                        "fields": ["*"],
                        "lenient": true,
                        "query": query.text,
                        "type": "phrase_prefix"
                    }
                }),
                json!({
                    "multi_match": {
                        "fields": boosted_fields(),
                        "lenient": true,
                        "query": query.text,
                        "fuzziness": edit_distance(query.fuzziness)
                    }
                }),
            ]
        };

        let mut body = json!({
            "query": {
                "bool": {
                    "minimum_should_match": 1,
                    "should": should,
                    "filter": self.search_filter(query)
                }
            },
            "size": query.size,
            "from": query.from,
            "sort": [{"_score": {"order": "desc"}}],
            "_source": !query.id_only
        });
        if !query.id_only {
            body["highlight"] = json!({
                "fields": {"*": {"pre_tags": ["[match]"], "post_tags": ["[/match]"]}},
                "require_field_match": false
            });
        }
        body
    }

    /// Every property filter must match, and at least one category or type
    fn search_filter(&self, query: &SearchQuery) -> Vec<Value> {
        let mut filters: Vec<Value> = query
            .filter
            .iter()
            .map(|(field, value)| json!({"match": {field.as_str(): {"query": value}}}))
            .collect();

        if let Some(categories) = query.categories_or_types.as_ref().filter(|c| !c.is_empty()) {
            let field = Self::category_field(query.item_type);
            let raw_field = format!("{field}.raw");
            let should: Vec<Value> = categories
                .iter()
                .map(|category| match CategoryFilter::parse(category) {
                    CategoryFilter::NoCategory => {
                        json!({"bool": {"must_not": {"exists": {"field": field}}}})
                    }
                    CategoryFilter::Category(name) => {
                        json!({"match": {raw_field.as_str(): {"query": name}}})
                    }
                })
                .collect();
            filters.push(json!({"bool": {"should": should, "minimum_should_match": 1}}));
        }
        filters
    }

    async fn run_search(&self, query: &SearchQuery, advanced: bool) -> Result<Value> {
        let path = format!("{}/_search", self.index(query.item_type));
        let body = self.search_body(query, advanced);
        Ok(self
            .connector
            .send(Method::POST, &path, Some(&body))
            .await?
            .check_status(&[200])?
            .body)
    }

    fn parse_hits(&self, item_type: ItemType, body: &Value) -> Vec<SearchHit> {
        body.pointer("/hits/hits")
            .and_then(Value::as_array)
            .map(|hits| hits.iter().map(|hit| search_hit(item_type, hit)).collect())
            .unwrap_or_default()
    }

    // ========================================================================
    // Full indexation
    // ========================================================================

    async fn index_nodes(&self, progress: &IndexProgress) -> Result<()> {
        let options = StreamOptions {
            chunk_size: BULK_SIZE,
            offset: 0,
        };
        let mut stream = self.graph.get_node_stream(options).await?;
        let mut batch: Vec<Node> = Vec::with_capacity(BULK_SIZE);
        while let Some(node) = stream.next().await {
            batch.push(node?);
            if batch.len() == BULK_SIZE {
                self.flush_batch(ItemType::Node, &mut batch, progress).await?;
            }
        }
        self.flush_batch(ItemType::Node, &mut batch, progress).await
    }

    async fn index_edges(&self, progress: &IndexProgress) -> Result<()> {
        let options = StreamOptions {
            chunk_size: BULK_SIZE,
            offset: 0,
        };
        let mut stream = self.graph.get_edge_stream(options).await?;
        let mut batch: Vec<Edge> = Vec::with_capacity(BULK_SIZE);
        while let Some(edge) = stream.next().await {
            batch.push(edge?);
            if batch.len() == BULK_SIZE {
                self.flush_batch(ItemType::Edge, &mut batch, progress).await?;
            }
        }
        self.flush_batch(ItemType::Edge, &mut batch, progress).await
    }

    async fn flush_batch<T>(
        &self,
        item_type: ItemType,
        batch: &mut Vec<T>,
        progress: &IndexProgress,
    ) -> Result<()>
    where
        T: Into<IndexEntry>,
    {
        if batch.is_empty() {
            return Ok(());
        }
        let count = batch.len() as u64;
        self.bulk_index(item_type, batch.drain(..).map(Into::into))
            .await?;
        progress.add(item_type, count);
        Ok(())
    }
}

/// Business error for mapping conflicts, critical otherwise
fn bulk_error(error: &Value) -> DaoError {
    let error_type = error.get("type").and_then(Value::as_str).unwrap_or_default();
    if error_type != "mapper_parsing_exception" && error_type != "illegal_argument_exception" {
        return DaoError::technical(
            ErrorKey::Critical,
            format!("ElasticSearch wasn't able to index the record. {error}"),
        );
    }

    let reason = error.get("reason").and_then(Value::as_str).unwrap_or_default();
    let mut message = match bracketed_re()
        .and_then(|re| re.captures(reason))
        .and_then(|c| c.get(1)) {
        Some(property) => format!("The property {} had an unexpected type.", property.as_str()),
        None => "A property had an unexpected type.".to_string(),
    };
    if error.pointer("/caused_by/type").and_then(Value::as_str) == Some("number_format_exception") {
        message.push_str(" (expecting a number)");
    }
    DaoError::business(ErrorKey::IndexMappingError, message)
}

/// Artificial field names are reported as the filter keys they stand for
fn public_field(field: &str) -> String {
    if field.starts_with(CATEGORIES_FIELD) {
        SearchQuery::category_filter_key(ItemType::Node).to_string()
    } else if field.starts_with(TYPE_FIELD) {
        SearchQuery::category_filter_key(ItemType::Edge).to_string()
    } else {
        field.to_string()
    }
}

/// One hit: categories from the artificial fields, name from the most
/// representative property, field and value from the highlight
fn search_hit(item_type: ItemType, hit: &Value) -> SearchHit {
    let id = hit.get("_id").map(value_text).unwrap_or_default();
    let empty = Map::new();
    let source = hit.get("_source").and_then(Value::as_object).unwrap_or(&empty);

    let categories = match item_type {
        ItemType::Node => source
            .get(CATEGORIES_FIELD)
            .and_then(Value::as_array)
            .map(|c| c.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default(),
        ItemType::Edge => source
            .get(TYPE_FIELD)
            .and_then(Value::as_str)
            .map(|t| vec![t.to_string()])
            .unwrap_or_default(),
    };

    let name_field = display_name_fields().find(|field| source.contains_key(field));
    let name_value = name_field
        .as_ref()
        .and_then(|field| source.get(field))
        .map(value_text);

    let highlight = hit
        .get("highlight")
        .and_then(Value::as_object)
        .filter(|h| !h.is_empty());
    let (name, field, value) = match highlight {
        Some(highlight) => {
            let field = name_field
                .clone()
                .filter(|f| highlight.contains_key(f))
                .or_else(|| highlight.keys().next().cloned())
                .unwrap_or_default();
            let value = highlight
                .get(&field)
                .and_then(|v| v.get(0))
                .map(value_text)
                .unwrap_or_default();
            let name = name_value.unwrap_or_else(|| value.clone());
            (name, Some(public_field(&field)), Some(value))
        }
        None => match (name_field, name_value) {
            (Some(field), Some(value)) => (value.clone(), Some(field), Some(value)),
            _ => (id.clone(), None, None),
        },
    };

    SearchHit {
        id,
        categories,
        name,
        field,
        value,
    }
}

impl Driver for ElasticDriver {}

#[async_trait]
impl IndexDriver for ElasticDriver {
    async fn get_size(&self, item_type: ItemType) -> Result<u64> {
        let path = format!("{}/_count", self.index(item_type));
        let response = self
            .connector
            .send(Method::GET, &path, None)
            .await?
            .check_status(&[200, 404])?;
        if response.status.as_u16() == 404 {
            return Ok(0);
        }
        Ok(response.body.get("count").and_then(Value::as_u64).unwrap_or(0))
    }

    async fn add_entries(&self, nodes: &[Node], edges: &[Edge]) -> Result<()> {
        if !nodes.is_empty() {
            self.bulk_index(ItemType::Node, nodes.iter().cloned().map(IndexEntry::Node))
                .await?;
        }
        if !edges.is_empty() && !self.skip_edges {
            self.bulk_index(ItemType::Edge, edges.iter().cloned().map(IndexEntry::Edge))
                .await?;
        }
        Ok(())
    }

    async fn search(&self, query: &SearchQuery) -> Result<RawSearchResult> {
        let mut body = None;
        if is_advanced_query(&query.text) {
            match self.run_search(query, true).await {
                Ok(advanced) => body = Some(advanced),
                Err(e) => debug!(error = %e, "advanced query failed, falling back to a simple query"),
            }
        }
        let body = match body {
            Some(body) => body,
            None => self.run_search(query, false).await?,
        };

        Ok(RawSearchResult {
            total_hits: self.flavor.total_hits(&body),
            more_results: None,
            hits: self.parse_hits(query.item_type, &body),
        })
    }

    async fn delete_if_exists(&self) -> Result<()> {
        let mut existed = Vec::with_capacity(2);
        for index in self.indices() {
            let response = self
                .connector
                .send(Method::DELETE, &index, None)
                .await?
                .check_status(&[200, 404])?;
            existed.push(response.status.as_u16() == 200);
        }
        if existed[0] != existed[1] {
            warn!(
                index = %self.index_name,
                "only one of the node and edge indices existed"
            );
        }
        Ok(())
    }

    async fn create_index(&self) -> Result<()> {
        for item_type in [ItemType::Node, ItemType::Edge] {
            let body = self.index_body(item_type);
            self.connector
                .send(Method::PUT, &self.index(item_type), Some(&body))
                .await?
                .check_status(&[200])?;
        }
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let path = format!("{}/_flush", self.indices().join(","));
        let flushed = self
            .connector
            .send(Method::POST, &path, None)
            .await
            .and_then(|response| response.check_status(&[200]));
        flushed.map(|_| ()).map_err(|e| {
            DaoError::technical(
                ErrorKey::Critical,
                format!("Couldn't flush indices: {}", e.message()),
            )
        })
    }

    async fn upsert_entry(&self, entry: &IndexEntry) -> Result<i64> {
        let items = self
            .bulk_index(entry.item_type(), std::iter::once(entry.clone()))
            .await?;
        items
            .first()
            .and_then(|item| item.pointer("/index/_version"))
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                DaoError::technical(
                    ErrorKey::UnexpectedResponse,
                    "ElasticSearch did not report the entry version",
                )
            })
    }

    async fn delete_entry(
        &self,
        item_type: ItemType,
        id: &str,
        ignore_not_found: bool,
    ) -> Result<()> {
        let path = format!("{}/_doc/{}", self.index(item_type), encode_id(id));
        let response: EsResponse = self
            .connector
            .send(Method::DELETE, &path, None)
            .await?
            .check_status(&[200, 404])?;
        if response.status.as_u16() == 404 && !ignore_not_found {
            return Err(match item_type {
                ItemType::Node => {
                    DaoError::business(ErrorKey::NodeNotFound, format!("Node #{id} was not found."))
                }
                ItemType::Edge => {
                    DaoError::business(ErrorKey::EdgeNotFound, format!("Edge #{id} was not found."))
                }
            });
        }
        Ok(())
    }

    async fn get_item_versions(
        &self,
        item_type: ItemType,
        ids: &[String],
    ) -> Result<BTreeMap<String, i64>> {
        let path = format!("{}/_mget", self.index(item_type));
        let body = json!({ "ids": ids });
        let response = self
            .connector
            .send(Method::POST, &path, Some(&body))
            .await?
            .check_status(&[200, 404])?;

        let docs = response
            .body
            .get("docs")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(docs
            .iter()
            .filter(|doc| doc.get("found").and_then(Value::as_bool).unwrap_or(false))
            .filter_map(|doc| {
                let id = doc.get("_id").map(value_text)?;
                let version = doc.get("_version").and_then(Value::as_i64)?;
                Some((id, version))
            })
            .collect())
    }

    async fn get_property_types(
        &self,
        item_type: ItemType,
    ) -> Result<BTreeMap<String, PropertyType>> {
        let index = self.index(item_type);
        let path = format!("{index}/_mapping");
        let body = self
            .connector
            .send(Method::GET, &path, None)
            .await?
            .check_status(&[200])?
            .body;

        let mappings = body
            .pointer(&format!("/{index}/mappings"))
            .cloned()
            .unwrap_or(Value::Null);
        let Some(properties) = self.flavor.mapping_properties(&mappings) else {
            return Ok(BTreeMap::new());
        };
        Ok(properties
            .iter()
            .filter(|(name, _)| name.as_str() != CATEGORIES_FIELD && name.as_str() != TYPE_FIELD)
            .filter_map(|(name, mapping)| {
                let es_type = mapping.get("type").and_then(Value::as_str)?;
                Some((name.clone(), property_type(es_type)?))
            })
            .collect())
    }

    async fn index_source(&self, progress: &IndexProgress) -> Result<()> {
        self.index_nodes(progress).await?;
        if !self.skip_edges {
            self.index_edges(progress).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advanced_query_detection() {
        assert!(is_advanced_query("name:ada"));
        assert!(is_advanced_query("ada AND lovelace"));
        assert!(is_advanced_query("age >30"));
        assert!(!is_advanced_query("ada lovelace"));
        assert!(!is_advanced_query("jean-pierre"));
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance(1.0), json!(0));
        assert_eq!(edit_distance(0.9), json!("AUTO"));
        assert_eq!(edit_distance(0.4), json!("AUTO"));
        assert_eq!(edit_distance(0.1), json!(2));
    }

    #[test]
    fn test_display_name_fields() {
        let fields: Vec<String> = display_name_fields().take(4).collect();
        assert_eq!(fields, vec!["name", "Name", "NAME", "title"]);
    }

    #[test]
    fn test_bulk_error_mapping() {
        let err = bulk_error(&json!({
            "type": "mapper_parsing_exception",
            "reason": "failed to parse [age]",
            "caused_by": {"type": "number_format_exception"}
        }));
        assert!(err.is_business());
        assert_eq!(err.key(), ErrorKey::IndexMappingError);
        assert_eq!(
            err.message(),
            "The property age had an unexpected type. (expecting a number)"
        );

        let err = bulk_error(&json!({"type": "es_rejected_execution_exception"}));
        assert_eq!(err.key(), ErrorKey::Critical);
    }

    #[test]
    fn test_hit_prefers_highlighted_name() {
        let hit = json!({
            "_id": "7",
            "_source": {"name": "Ada", "city": "London", CATEGORIES_FIELD: ["Person"]},
            "highlight": {"city": ["[match]London[/match]"], "name": ["[match]Ada[/match]"]}
        });
        let hit = search_hit(ItemType::Node, &hit);
        assert_eq!(hit.id, "7");
        assert_eq!(hit.categories, vec!["Person"]);
        assert_eq!(hit.name, "Ada");
        assert_eq!(hit.field.as_deref(), Some("name"));
        assert_eq!(hit.value.as_deref(), Some("[match]Ada[/match]"));
    }

    #[test]
    fn test_hit_without_name_or_highlight() {
        let hit = json!({"_id": 12, "_source": {TYPE_FIELD: "KNOWS"}});
        let hit = search_hit(ItemType::Edge, &hit);
        assert_eq!(hit.name, "12");
        assert_eq!(hit.categories, vec!["KNOWS"]);
        assert_eq!(hit.field, None);
    }

    #[test]
    fn test_highlighted_category_field_is_renamed() {
        assert_eq!(public_field("lk_categories.raw"), "[categories]");
        assert_eq!(public_field("lk_type"), "[type]");
        assert_eq!(public_field("title"), "title");
    }

    #[test]
    fn test_encode_id() {
        assert_eq!(encode_id("a/b c"), "a%2Fb%20c");
        assert_eq!(encode_id("42"), "42");
    }
}
