//! Memory service - orchestrates ingestion and queries
//!
//! Ingestion: payload → broker → hosting context → store. Any failure ends
//! that harvest event; it is logged and nothing is written.
//!
//! Queries: text → broker → hybrid search. Failures are returned to the
//! presentation layer, which renders them. Neither path leaves state behind
//! that would block the next call.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::core::config::Config;
use crate::core::paths::DataPaths;
use crate::core::record::{MemoryRecord, PagePayload};
use crate::offload::{ContextHost, OffloadBroker, OffloadError, OffscreenHost, RuntimeMessage};
use crate::search::embedding::{HtpLoader, ModelLoader};
use crate::search::engine::{HybridSearchEngine, ScoredRecord, SearchError, TimeFilter};
use crate::search::vectordb::{MemoryStore, StoreError, StoreStats};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Embedding failed: {0}")]
    Embedding(#[from] OffloadError),

    #[error("Search failed: {0}")]
    Search(#[from] SearchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// What happened to a harvested page
#[derive(Debug, Clone, PartialEq)]
pub enum HarvestOutcome {
    Saved { url: String },
    Abandoned { url: String, reason: String },
}

pub struct Mnemosyne {
    store: Arc<MemoryStore>,
    engine: HybridSearchEngine,
    broker: OffloadBroker,
    config: Config,
}

impl Mnemosyne {
    /// Open the on-disk store and start the built-in embedding host.
    /// Must be called within a Tokio runtime.
    pub fn open(paths: &DataPaths, config: Config) -> Result<Self> {
        paths
            .ensure_root()
            .with_context(|| format!("Failed to create data directory: {}", paths.root.display()))?;

        let store = MemoryStore::open(&paths.database)
            .with_context(|| format!("Failed to open memory store: {}", paths.database.display()))?;
        let loader: Arc<dyn ModelLoader> = Arc::new(HtpLoader);
        let host = Arc::new(OffscreenHost::new(loader));

        Ok(Self::with_parts(Arc::new(store), host, config)?)
    }

    /// Assemble from explicit parts.
    pub fn with_parts(
        store: Arc<MemoryStore>,
        host: Arc<dyn ContextHost>,
        config: Config,
    ) -> Result<Self, ServiceError> {
        let broker = OffloadBroker::new(host).map_err(OffloadError::from)?;

        Ok(Self {
            engine: HybridSearchEngine::new(Arc::clone(&store)),
            store,
            broker,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether the embedding model is loaded yet
    pub fn model_loaded(&self) -> bool {
        self.broker.model_loaded()
    }

    /// Close the embedding host context. Safe to call more than once.
    pub fn shutdown(&self) {
        self.broker.shutdown();
        debug!("Memory service shut down");
    }

    /// Dispatch a runtime message. Only `PAGE_HARVESTED` is handled here;
    /// embed requests belong to the hosting context.
    pub async fn handle_message(&self, message: RuntimeMessage) -> Option<HarvestOutcome> {
        match message {
            RuntimeMessage::PageHarvested { payload } => Some(self.handle_harvest(payload).await),
            RuntimeMessage::EmbedText { .. } => {
                debug!("Ignoring embed request outside the hosting context");
                None
            }
        }
    }

    /// Embed and remember a harvested page. Never fails; failures are logged
    /// and reported as [`HarvestOutcome::Abandoned`].
    pub async fn handle_harvest(&self, payload: PagePayload) -> HarvestOutcome {
        let url = payload.url.clone();

        match self.remember(payload).await {
            Ok(()) => {
                info!(url = %url, "Memory saved");
                HarvestOutcome::Saved { url }
            }
            Err(e) => {
                error!(url = %url, error = %e, "Harvest abandoned");
                HarvestOutcome::Abandoned {
                    url,
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn remember(&self, payload: PagePayload) -> Result<(), ServiceError> {
        let vector = self.broker.request_embedding(&payload.text).await?;
        debug!(url = %payload.url, dimensions = vector.len(), "Vector received");

        let record = MemoryRecord::new(payload, vector);
        self.with_store(move |store| store.upsert(&record)).await
    }

    /// Hybrid search for `query` within `time_filter`.
    pub async fn search(
        &self,
        query: &str,
        time_filter: TimeFilter,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>, ServiceError> {
        let vector = self.broker.request_embedding(query).await?;

        let engine = self.engine.clone();
        let query = query.to_string();
        let results = tokio::task::spawn_blocking(move || {
            engine.search(&vector, &query, limit, time_filter)
        })
        .await
        .map_err(|e| ServiceError::Task(e.to_string()))?;

        results.map_err(|e| {
            warn!(error = %e, "Search aborted");
            ServiceError::from(e)
        })
    }

    /// Forget a page. Unknown URLs are ignored.
    pub async fn delete(&self, url: &str) -> Result<(), ServiceError> {
        let url = url.to_string();
        self.with_store(move |store| store.delete(&url)).await
    }

    /// Every memory, newest first
    pub async fn list(&self) -> Result<Vec<MemoryRecord>, ServiceError> {
        self.with_store(|store| store.list_recent()).await
    }

    pub async fn stats(&self) -> Result<StoreStats, ServiceError> {
        self.with_store(|store| store.stats()).await
    }

    /// Run a store operation on the blocking pool
    async fn with_store<T, F>(&self, op: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&MemoryStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let result = tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| ServiceError::Task(e.to_string()))?;
        Ok(result?)
    }
}
