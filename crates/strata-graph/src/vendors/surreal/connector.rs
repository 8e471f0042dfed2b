//! WebSocket connection to a SurrealDB server.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use strata_core::{Connector, ConnectorContext, ConnectorData, DaoError, ErrorKey, Result};
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;
use tracing::info;
use uuid::Uuid;

/// Record holding the identity of the store
pub const META_TABLE: &str = "strata_meta";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreRecord {
    store_id: String,
}

pub struct SurrealConnector {
    url: String,
    username: String,
    password: String,
    namespace: String,
    database: String,
    connect_timeout: Duration,
    client: RwLock<Option<Surreal<Client>>>,
}

impl SurrealConnector {
    /// Build from the graph options (`url`, `user`, `password`, `namespace`,
    /// `database`)
    pub fn from_context(context: &ConnectorContext) -> Result<Self> {
        let options = &context.graph_options;
        let url = options
            .get_str("url")
            .ok_or_else(|| DaoError::missing_field("SurrealDB: \"options.url\" is required"))?;
        // the ws engine adds the scheme itself
        let url = url
            .strip_prefix("ws://")
            .or_else(|| url.strip_prefix("wss://"))
            .unwrap_or(url)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            url,
            username: options.get_str("user").unwrap_or("root").to_string(),
            password: options.get_str("password").unwrap_or("root").to_string(),
            namespace: options.get_str("namespace").unwrap_or("strata").to_string(),
            database: options.get_str("database").unwrap_or("graph").to_string(),
            connect_timeout: context.connect_timeout,
            client: RwLock::new(None),
        })
    }

    /// The live client, or `graph_unreachable` before `connect`
    pub fn client(&self) -> Result<Surreal<Client>> {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| {
                DaoError::technical(ErrorKey::GraphUnreachable, "SurrealDB is not connected")
            })
    }
}

/// Map a client error to a technical DAO error
pub fn request_error(what: &'static str) -> impl Fn(surrealdb::Error) -> DaoError {
    move |e| DaoError::technical(ErrorKey::GraphRequestError, format!("{what}: {e}"))
}

fn unreachable(what: &'static str) -> impl Fn(surrealdb::Error) -> DaoError {
    move |e| DaoError::technical(ErrorKey::GraphUnreachable, format!("{what}: {e}"))
}

#[async_trait]
impl Connector for SurrealConnector {
    async fn connect(&self) -> Result<String> {
        let connecting = Surreal::new::<Ws>(self.url.as_str());
        let client = tokio::time::timeout(self.connect_timeout, connecting)
            .await
            .map_err(|_| {
                DaoError::technical(
                    ErrorKey::GraphUnreachable,
                    format!("SurrealDB connection timed out ({})", self.url),
                )
            })?
            .map_err(unreachable("SurrealDB connection failed"))?;

        client
            .signin(Root {
                username: &self.username,
                password: &self.password,
            })
            .await
            .map_err(|e| {
                DaoError::invalid_parameter(format!(
                    "Please check the SurrealDB username and password in the configuration ({e})"
                ))
            })?;

        client
            .use_ns(&self.namespace)
            .use_db(&self.database)
            .await
            .map_err(request_error("SurrealDB namespace error"))?;

        let version = client
            .version()
            .await
            .map_err(request_error("Cannot get SurrealDB version"))?
            .to_string();

        info!(
            url = %self.url,
            namespace = %self.namespace,
            database = %self.database,
            %version,
            "connected to SurrealDB"
        );
        *self.client.write().unwrap_or_else(PoisonError::into_inner) = Some(client);
        Ok(version)
    }

    async fn disconnect(&self) {
        self.client
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    async fn check_up(&self) -> Result<()> {
        self.client()?
            .health()
            .await
            .map_err(unreachable("SurrealDB health check failed"))
    }

    async fn store_id(&self) -> Result<String> {
        let client = self.client()?;
        let existing: Option<StoreRecord> = client
            .select((META_TABLE, "store"))
            .await
            .map_err(request_error("Cannot read the store id"))?;
        if let Some(record) = existing {
            return Ok(record.store_id);
        }

        let created: Option<StoreRecord> = client
            .create((META_TABLE, "store"))
            .content(StoreRecord {
                store_id: Uuid::new_v4().to_string(),
            })
            .await
            .map_err(request_error("Cannot create the store id"))?;
        created.map(|r| r.store_id).ok_or_else(|| {
            DaoError::technical(ErrorKey::UnexpectedResponse, "SurrealDB did not store the id")
        })
    }

    async fn connector_data(&self) -> Result<ConnectorData> {
        let mut data = ConnectorData::new();
        data.insert("namespace".into(), self.namespace.clone().into());
        data.insert("database".into(), self.database.clone().into());
        Ok(data)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
