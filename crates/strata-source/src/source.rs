//! Data source: one graph DAO, an optional index DAO, one lifecycle.

use crate::state::SourceState;
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use strata_core::{
    retry, AdvancedConfig, ConnectionInfo, DaoError, DataSourceConfig, ErrorKey, ItemType,
    Result, RetryPolicy,
};
use strata_graph::{GraphDao, GraphRegistry, GraphSettings};
use strata_index::{IndexDao, IndexProgress, IndexRegistry, IndexSettings};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Failures worth no further connection attempt
fn gives_up(error: &DaoError) -> bool {
    matches!(
        error.key(),
        ErrorKey::InvalidParameter | ErrorKey::NotSupported | ErrorKey::Critical
    )
}

/// Snapshot of a data source for display
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceStatus {
    pub name: String,
    pub state: SourceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<ConnectionInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<ConnectionInfo>,
}

pub struct DataSource {
    name: String,
    graph: Arc<GraphDao>,
    index: Option<IndexDao>,
    connection: RetryPolicy,
    state: RwLock<SourceState>,
    /// Store identity seen at the last successful connection
    store_id: RwLock<Option<String>>,
    /// Serializes connections
    connecting: Mutex<()>,
}

impl DataSource {
    pub fn new(
        name: impl Into<String>,
        graph: Arc<GraphDao>,
        index: Option<IndexDao>,
        connection: RetryPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            graph,
            index,
            connection,
            state: RwLock::new(SourceState::Offline),
            store_id: RwLock::new(None),
            connecting: Mutex::new(()),
        }
    }

    /// Build both DAOs of `config`. The index name defaults to the source
    /// name and the `vendor` keys never reach the DAOs.
    pub fn from_config(
        config: &DataSourceConfig,
        advanced: &AdvancedConfig,
        graphs: &GraphRegistry,
        indices: &IndexRegistry,
    ) -> Result<Self> {
        let graph = Arc::new(GraphDao::create(
            graphs,
            &config.graphdb.vendor,
            config.graphdb.options.clone(),
            GraphSettings::from(advanced),
        )?);

        let index = match &config.index {
            Some(index) => {
                let mut options = index.options.clone();
                if !options.has_value("indexName") {
                    options.insert("indexName", config.name.clone());
                }
                Some(IndexDao::create(
                    indices,
                    &index.vendor,
                    options,
                    graph.clone(),
                    IndexSettings::from(advanced),
                )?)
            }
            None => None,
        };

        let connection = RetryPolicy::new(
            advanced.connection_retries,
            Duration::from_millis(advanced.connection_retry_delay_ms),
        );
        Ok(Self::new(config.name.clone(), graph, index, connection))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &Arc<GraphDao> {
        &self.graph
    }

    pub fn index(&self) -> Option<&IndexDao> {
        self.index.as_ref()
    }

    pub fn state(&self) -> SourceState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn store_id(&self) -> Option<String> {
        self.store_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn status(&self) -> DataSourceStatus {
        DataSourceStatus {
            name: self.name.clone(),
            state: self.state(),
            store_id: self.store_id(),
            graph: self.graph.connection_info(),
            index: self.index.as_ref().and_then(IndexDao::connection_info),
        }
    }

    fn set_state(&self, state: SourceState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Connect the graph DAO, then the index DAO, each with retries
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.connecting.lock().await;
        self.set_state(SourceState::Connecting);
        match self.connect_daos().await {
            Ok(()) => {
                info!(source = %self.name, "data-source ready");
                self.set_state(SourceState::Ready);
                Ok(())
            }
            Err(e) => {
                warn!(source = %self.name, error = %e, "data-source connection failed");
                self.set_state(SourceState::Failed(e.message().to_string()));
                Err(e)
            }
        }
    }

    async fn connect_daos(&self) -> Result<()> {
        let description = format!("Connecting the graph database of \"{}\"", self.name);
        let version = retry(&description, self.connection, gives_up, || self.graph.connect()).await?;
        info!(source = %self.name, vendor = %self.graph.vendor(), %version, "graph database connected");

        self.check_store_id().await?;

        if let Some(index) = &self.index {
            let description = format!("Connecting the search index of \"{}\"", self.name);
            let version = retry(&description, self.connection, gives_up, || index.connect()).await?;
            info!(source = %self.name, vendor = %index.vendor(), %version, "search index connected");
        }
        Ok(())
    }

    /// Remember the store identity; a different one than last time means
    /// the source now points at another database
    async fn check_store_id(&self) -> Result<()> {
        let current = self.graph.store_id().await?;
        let previous = self
            .store_id
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(current.clone());
        match previous {
            Some(previous) if previous != current => {
                warn!(source = %self.name, %previous, %current, "store id changed");
                Err(DaoError::business(
                    ErrorKey::Critical,
                    "Please retry connecting the data-source (the database has changed).",
                ))
            }
            _ => Ok(()),
        }
    }

    /// Never fails, may be called repeatedly
    pub async fn disconnect(&self) {
        self.graph.disconnect().await;
        if let Some(index) = &self.index {
            index.disconnect().await;
        }
        self.set_state(SourceState::Offline);
    }

    /// Health of the graph database and the index; a failure marks the
    /// source offline
    pub async fn check_up(&self) -> Result<()> {
        let health = async {
            self.graph.check_up().await?;
            if let Some(index) = &self.index {
                index.check_up().await?;
            }
            Ok::<(), DaoError>(())
        }
        .await;

        if let Err(e) = &health {
            warn!(source = %self.name, error = %e, "health check failed, source is offline");
            self.set_state(SourceState::Offline);
        }
        health
    }

    /// Rebuild the index from the whole graph
    pub async fn reindex(&self) -> Result<IndexProgress> {
        let index = self.index.as_ref().ok_or_else(|| {
            DaoError::not_supported(format!(
                "The data-source \"{}\" has no search index.",
                self.name
            ))
        })?;
        if !self.state().is_ready() {
            return Err(DaoError::technical(
                ErrorKey::NotConnected,
                format!("The data-source \"{}\" is not connected.", self.name),
            ));
        }

        let progress = IndexProgress::new(
            self.name.clone(),
            self.count(ItemType::Node).await?,
            self.count(ItemType::Edge).await?,
        );
        index.clear().await?;
        index.index_source(&progress).await?;
        self.graph.on_after_indexation().await?;
        index.on_after_indexation().await?;

        info!(
            source = %self.name,
            nodes = progress.indexed(ItemType::Node),
            edges = progress.indexed(ItemType::Edge),
            "indexation done"
        );
        Ok(progress)
    }

    /// Approximate count used for progress, 0 when the graph cannot count
    async fn count(&self, item_type: ItemType) -> Result<u64> {
        if !self.graph.features().can_count {
            return Ok(0);
        }
        match item_type {
            ItemType::Node => self.graph.get_node_count(true).await,
            ItemType::Edge => self.graph.get_edge_count(true).await,
        }
    }
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}
