//! Hosting context for the embedding gateway.
//!
//! At most one context exists per host. It runs on its own task, computes
//! through the host's single [`EmbeddingGateway`], and is reached only
//! through its inbox channel.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::protocol::{EmbedResponse, Envelope, RuntimeMessage, OFFSCREEN_TARGET};
use crate::search::embedding::ModelLoader;
use crate::search::gateway::EmbeddingGateway;

/// Queued requests per context before senders wait
const INBOX_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HostError {
    #[error("Only a single offscreen context may be created")]
    AlreadyExists,

    #[error("Failed to create hosting context: {0}")]
    Spawn(String),
}

/// Somewhere a hosting context can be created and reached.
#[async_trait]
pub trait ContextHost: Send + Sync {
    /// Whether a live context exists right now
    async fn has_context(&self) -> bool;

    /// Create the context. Fails with [`HostError::AlreadyExists`] when a live
    /// one is already there.
    async fn create_context(&self) -> Result<(), HostError>;

    /// Inbox of the live context, if any
    fn inbox(&self) -> Option<mpsc::Sender<Envelope>>;

    /// Whether the embedding model has finished loading
    fn model_loaded(&self) -> bool {
        false
    }

    /// Tear down the live context, if any. Requests still queued are
    /// answered with no response.
    fn close_context(&self) {}
}

struct HostedContext {
    inbox: mpsc::Sender<Envelope>,
    task: JoinHandle<()>,
}

impl HostedContext {
    fn is_alive(&self) -> bool {
        !self.inbox.is_closed() && !self.task.is_finished()
    }
}

/// In-process host running the embedding context on a Tokio task.
///
/// The gateway outlives individual contexts: a recreated context keeps the
/// already loaded model and its compute lock.
pub struct OffscreenHost {
    gateway: Arc<EmbeddingGateway>,
    context: Mutex<Option<HostedContext>>,
}

impl OffscreenHost {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            gateway: Arc::new(EmbeddingGateway::new(loader)),
            context: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ContextHost for OffscreenHost {
    async fn has_context(&self) -> bool {
        self.context
            .lock()
            .map(|guard| guard.as_ref().is_some_and(HostedContext::is_alive))
            .unwrap_or(false)
    }

    async fn create_context(&self) -> Result<(), HostError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| HostError::Spawn(e.to_string()))?;

        let mut guard = self
            .context
            .lock()
            .map_err(|_| HostError::Spawn("host lock poisoned".to_string()))?;

        if guard.as_ref().is_some_and(HostedContext::is_alive) {
            return Err(HostError::AlreadyExists);
        }

        let (inbox, rx) = mpsc::channel(INBOX_CAPACITY);
        let task = runtime.spawn(run_context(Arc::clone(&self.gateway), rx));

        *guard = Some(HostedContext { inbox, task });
        info!("Created embedding host context");
        Ok(())
    }

    fn inbox(&self) -> Option<mpsc::Sender<Envelope>> {
        let guard = self.context.lock().ok()?;
        let inbox = guard
            .as_ref()
            .filter(|context| context.is_alive())
            .map(|context| context.inbox.clone());
        inbox
    }

    fn model_loaded(&self) -> bool {
        self.gateway.is_loaded()
    }

    fn close_context(&self) {
        if let Ok(mut guard) = self.context.lock() {
            if let Some(context) = guard.take() {
                context.task.abort();
                info!("Closed embedding host context");
            }
        }
    }
}

/// Context main loop: each request is handled on its own task so a slow
/// model load never stalls the inbox.
async fn run_context(gateway: Arc<EmbeddingGateway>, mut inbox: mpsc::Receiver<Envelope>) {
    while let Some(envelope) = inbox.recv().await {
        let gateway = Arc::clone(&gateway);
        tokio::spawn(async move {
            handle_envelope(&gateway, envelope).await;
        });
    }
    debug!("Embedding host inbox closed");
}

async fn handle_envelope(gateway: &EmbeddingGateway, envelope: Envelope) {
    let Envelope { message, reply } = envelope;

    match message {
        RuntimeMessage::EmbedText { target, text } if target == OFFSCREEN_TARGET => {
            let response = match gateway.embed(&text).await {
                Ok(vector) => EmbedResponse::Success { vector },
                Err(e) => {
                    tracing::error!(id = reply.id(), error = %e, "Embedding error");
                    EmbedResponse::Error {
                        error: e.to_string(),
                    }
                }
            };
            reply.send(response);
        }
        // Not addressed to us: drop the port unanswered
        other => debug!(id = reply.id(), message = ?other, "Ignoring message"),
    }
}
