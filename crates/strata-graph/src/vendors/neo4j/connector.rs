//! Neo4j transactional HTTP endpoint, shared by the graph and search drivers.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::sync::{Arc, PoisonError, RwLock};
use strata_core::{Connector, ConnectorContext, ConnectorData, DaoError, ErrorKey, Properties, Result};
use tracing::debug;

/// How the server is discovered and where statements are committed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// 4.x and later: discovery at `/`, commits at `/db/{database}/tx/commit`
    Discovery,
    /// 3.x: discovery at `/db/data/`, commits at `/db/data/transaction/commit`
    Legacy,
}

// ============================================================================
// Wire format
// ============================================================================

/// One Cypher statement with its parameters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statement {
    pub statement: String,
    pub parameters: Map<String, Value>,
    pub result_data_contents: Vec<&'static str>,
}

impl Statement {
    /// Statement returning rows only
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            parameters: Map::new(),
            result_data_contents: vec!["row"],
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    /// Also return the nodes and relationships of every record
    pub fn with_graph(mut self) -> Self {
        self.result_data_contents = vec!["row", "graph"];
        self
    }
}

#[derive(Debug, Serialize)]
struct CommitRequest<'a> {
    statements: &'a [Statement],
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<ServerError>,
}

#[derive(Debug, Deserialize)]
struct ServerError {
    code: String,
    message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatementResult {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub data: Vec<Record>,
}

impl StatementResult {
    pub fn rows(self) -> impl Iterator<Item = Vec<Value>> {
        self.data.into_iter().map(|r| r.row)
    }

    /// First column of the first row
    pub fn scalar(&self) -> Option<&Value> {
        self.data.first().and_then(|r| r.row.first())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub row: Vec<Value>,
    #[serde(default)]
    pub graph: Option<GraphRecord>,
}

/// Graph view of a record; ids are strings here
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphRecord {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub relationships: Vec<GraphRelationship>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRelationship {
    pub id: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub start_node: String,
    pub end_node: String,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Deserialize)]
struct Discovery {
    neo4j_version: Option<String>,
}

// ============================================================================
// Connector
// ============================================================================

pub struct Neo4jHttpConnector {
    client: Client,
    url: String,
    write_url: String,
    database: String,
    user: Option<String>,
    password: Option<String>,
    endpoint: Endpoint,
    version: RwLock<Option<String>>,
}

impl Neo4jHttpConnector {
    /// Build from the graph options (`url`, `user`, `password`, `writeUrl`,
    /// `database`, `proxy`, `allowSelfSigned`)
    pub fn from_context(context: &ConnectorContext, endpoint: Endpoint) -> Result<Self> {
        let options = &context.graph_options;
        let url = options
            .get_str("url")
            .map(normalize_url)
            .ok_or_else(|| DaoError::missing_field("Neo4j: \"options.url\" is required"))?;
        let write_url = options
            .get_str("writeUrl")
            .map(normalize_url)
            .unwrap_or_else(|| url.clone());

        let mut builder = Client::builder()
            .connect_timeout(context.connect_timeout)
            .danger_accept_invalid_certs(options.get_bool("allowSelfSigned").unwrap_or(false));
        if let Some(proxy) = options.get_str("proxy") {
            let proxy = reqwest::Proxy::all(proxy).map_err(|e| {
                DaoError::invalid_parameter(format!("Neo4j: invalid \"proxy\" ({e})"))
            })?;
            builder = builder.proxy(proxy);
        }
        let client = builder.build().map_err(|e| {
            DaoError::technical(
                ErrorKey::Critical,
                format!("Cannot build the Neo4j HTTP client: {e}"),
            )
        })?;

        Ok(Self {
            client,
            url,
            write_url,
            database: options.get_str("database").unwrap_or("neo4j").to_string(),
            user: options.get_str("user").map(str::to_string),
            password: options.get_str("password").map(str::to_string),
            endpoint,
            version: RwLock::new(None),
        })
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Version reported by the last successful connection
    pub fn version(&self) -> Option<String> {
        self.version
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn discovery_url(&self) -> String {
        match self.endpoint {
            Endpoint::Discovery => format!("{}/", self.url),
            Endpoint::Legacy => format!("{}/db/data/", self.url),
        }
    }

    fn commit_url(&self, can_write: bool) -> String {
        let base = if can_write { &self.write_url } else { &self.url };
        match self.endpoint {
            Endpoint::Discovery => format!("{base}/db/{}/tx/commit", self.database),
            Endpoint::Legacy => format!("{base}/db/data/transaction/commit"),
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header("Accept", "application/json");
        match &self.user {
            Some(user) => builder.basic_auth(user, self.password.as_ref()),
            None => builder,
        }
    }

    /// Run statements in one auto-committed transaction
    pub async fn run(&self, statements: &[Statement], can_write: bool) -> Result<Vec<StatementResult>> {
        debug!(statements = statements.len(), can_write, "neo4j commit");
        let response = self
            .request(self.client.post(self.commit_url(can_write)))
            .json(&CommitRequest { statements })
            .send()
            .await
            .map_err(unreachable)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(DaoError::technical(
                ErrorKey::GraphRequestError,
                format!("Neo4j answered {status}: {error_text}"),
            ));
        }

        let body: CommitResponse = response.json().await.map_err(|e| {
            DaoError::technical(
                ErrorKey::UnexpectedResponse,
                format!("Failed to parse the Neo4j response: {e}"),
            )
        })?;

        if let Some(error) = body.errors.first() {
            let message = format!(
                "Neo4j wasn't able to execute the query: {}",
                error.message
            );
            return Err(if error.code.starts_with("Neo.ClientError.Statement") {
                DaoError::business(ErrorKey::GraphRequestError, message)
            } else {
                DaoError::technical(ErrorKey::GraphRequestError, message)
            });
        }
        Ok(body.results)
    }

    /// Run one statement
    pub async fn query(&self, statement: Statement, can_write: bool) -> Result<StatementResult> {
        let mut results = self.run(std::slice::from_ref(&statement), can_write).await?;
        Ok(results.pop().unwrap_or_default())
    }
}

#[async_trait]
impl Connector for Neo4jHttpConnector {
    async fn connect(&self) -> Result<String> {
        let response = self
            .request(self.client.get(self.discovery_url()))
            .send()
            .await
            .map_err(unreachable)?;

        match response.status() {
            StatusCode::UNAUTHORIZED => {
                return Err(DaoError::invalid_parameter(
                    "Please check the Neo4j username and password in the configuration.",
                ))
            }
            status if !status.is_success() => {
                return Err(DaoError::technical(
                    ErrorKey::GraphUnreachable,
                    format!("Neo4j discovery answered {status}"),
                ))
            }
            _ => {}
        }

        let discovery: Discovery = response.json().await.map_err(|e| {
            DaoError::technical(
                ErrorKey::UnexpectedResponse,
                format!("Failed to parse the Neo4j discovery document: {e}"),
            )
        })?;
        let version = discovery.neo4j_version.ok_or_else(|| {
            DaoError::technical(ErrorKey::Critical, "Cannot get Neo4j version.")
        })?;

        *self.version.write().unwrap_or_else(PoisonError::into_inner) = Some(version.clone());
        Ok(version)
    }

    async fn disconnect(&self) {
        *self.version.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    async fn check_up(&self) -> Result<()> {
        self.query(Statement::new("RETURN 1"), false).await.map(|_| ())
    }

    async fn store_id(&self) -> Result<String> {
        let statement = match self.endpoint {
            Endpoint::Discovery => Statement::new("CALL db.info() YIELD id RETURN id"),
            Endpoint::Legacy => Statement::new(
                "CALL dbms.queryJmx('org.neo4j:instance=kernel#0,name=Kernel') \
                 YIELD attributes RETURN attributes.StoreId.value",
            ),
        };
        let result = self.query(statement, false).await?;
        match result.scalar() {
            Some(Value::String(id)) => Ok(id.clone()),
            Some(Value::Number(id)) => Ok(id.to_string()),
            _ => Err(DaoError::technical(
                ErrorKey::UnexpectedResponse,
                "Neo4j did not report a store id",
            )),
        }
    }

    async fn connector_data(&self) -> Result<ConnectorData> {
        let mut data = ConnectorData::new();
        data.insert("url".into(), self.url.clone().into());
        if let Some(version) = self.version() {
            data.insert("version".into(), version.into());
        }
        Ok(data)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

fn unreachable(e: reqwest::Error) -> DaoError {
    DaoError::technical(
        ErrorKey::GraphUnreachable,
        format!("Neo4j is unreachable: {e}"),
    )
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
