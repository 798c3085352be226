//! Offload broker - routes embed requests to the hosting context.
//!
//! Each request gets a correlation id and a waiter in `pending`. The context
//! answers through the request's [`ReplyPort`]; a router task matches answers
//! back to waiters by id, so concurrent requests never receive each other's
//! vectors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info};

use super::host::{ContextHost, HostError};
use super::protocol::{EmbedResponse, Envelope, Reply, ReplyPort, RuntimeMessage};

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Option<EmbedResponse>>>>>;

/// Failures reaching the hosting context
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("Embedding host unavailable: {0}")]
    HostUnavailable(String),

    #[error("Embedding host channel closed")]
    ChannelClosed,

    #[error("The message port closed before a response was received")]
    NoResponse,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OffloadError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Failure reported by the embedding gateway itself
    #[error("{0}")]
    Embedding(String),
}

pub struct OffloadBroker {
    host: Arc<dyn ContextHost>,
    pending: Pending,
    next_id: AtomicU64,
    replies: mpsc::UnboundedSender<Reply>,
}

impl OffloadBroker {
    /// Create a broker and start its reply router. Needs a Tokio runtime.
    pub fn new(host: Arc<dyn ContextHost>) -> Result<Self, TransportError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::HostUnavailable(e.to_string()))?;

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (replies, rx) = mpsc::unbounded_channel();
        runtime.spawn(route_replies(rx, Arc::clone(&pending)));

        Ok(Self {
            host,
            pending,
            next_id: AtomicU64::new(1),
            replies,
        })
    }

    /// Make sure a hosting context exists, creating it if needed.
    ///
    /// Losing a creation race to another caller counts as success.
    pub async fn ensure_worker(&self) -> Result<(), TransportError> {
        if self.host.has_context().await {
            return Ok(());
        }

        match self.host.create_context().await {
            Ok(()) => Ok(()),
            Err(HostError::AlreadyExists) => {
                debug!("Hosting context created concurrently");
                Ok(())
            }
            Err(e) => Err(TransportError::HostUnavailable(e.to_string())),
        }
    }

    /// Whether the model behind the hosting context is loaded. Until it is,
    /// the next request also pays for the load.
    pub fn model_loaded(&self) -> bool {
        self.host.model_loaded()
    }

    /// Close the hosting context. A later request creates a new one.
    pub fn shutdown(&self) {
        self.host.close_context();
    }

    /// Embed `text` in the hosting context.
    pub async fn request_embedding(&self, text: &str) -> Result<Vec<f32>, OffloadError> {
        self.ensure_worker().await?;

        let inbox = self.host.inbox().ok_or_else(|| {
            TransportError::HostUnavailable("hosting context is gone".to_string())
        })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let envelope = Envelope {
            message: RuntimeMessage::embed_text(text),
            reply: ReplyPort::new(id, self.replies.clone()),
        };
        if inbox.send(envelope).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(TransportError::ChannelClosed.into());
        }
        debug!(id, "Embed request sent");

        match rx.await {
            Ok(Some(EmbedResponse::Success { vector })) => Ok(vector),
            Ok(Some(EmbedResponse::Error { error })) => Err(OffloadError::Embedding(error)),
            Ok(None) => Err(TransportError::NoResponse.into()),
            Err(_) => Err(TransportError::ChannelClosed.into()),
        }
    }
}

async fn route_replies(mut replies: mpsc::UnboundedReceiver<Reply>, pending: Pending) {
    while let Some(reply) = replies.recv().await {
        match pending.lock().await.remove(&reply.id) {
            // Waiter may have given up; that is fine
            Some(waiter) => {
                let _ = waiter.send(reply.response);
            }
            None => debug!(id = reply.id, "Reply without waiter"),
        }
    }
    info!("Reply router stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offload::host::OffscreenHost;
    use crate::search::embedding::{Embedder, HtpEmbedder, HtpLoader};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Host that always claims no context exists, forcing the create race
    struct StaleViewHost(OffscreenHost);

    #[async_trait]
    impl ContextHost for StaleViewHost {
        async fn has_context(&self) -> bool {
            false
        }

        async fn create_context(&self) -> Result<(), HostError> {
            self.0.create_context().await
        }

        fn inbox(&self) -> Option<mpsc::Sender<Envelope>> {
            self.0.inbox()
        }
    }

    struct BrokenHost;

    #[async_trait]
    impl ContextHost for BrokenHost {
        async fn has_context(&self) -> bool {
            false
        }

        async fn create_context(&self) -> Result<(), HostError> {
            Err(HostError::Spawn("sandbox refused".to_string()))
        }

        fn inbox(&self) -> Option<mpsc::Sender<Envelope>> {
            None
        }
    }

    /// Host that collects a batch of requests and answers them in reverse,
    /// each with a vector identifying its own text
    struct ReversingHost {
        inbox: mpsc::Sender<Envelope>,
        created: AtomicUsize,
    }

    impl ReversingHost {
        fn start(batch: usize) -> Self {
            let (inbox, mut rx) = mpsc::channel::<Envelope>(batch);
            tokio::spawn(async move {
                let mut held = Vec::new();
                while let Some(envelope) = rx.recv().await {
                    held.push(envelope);
                    if held.len() == batch {
                        while let Some(Envelope { message, reply }) = held.pop() {
                            if let RuntimeMessage::EmbedText { text, .. } = message {
                                let marker = text.len() as f32;
                                reply.send(EmbedResponse::Success { vector: vec![marker] });
                            }
                        }
                    }
                }
            });
            Self {
                inbox,
                created: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ContextHost for ReversingHost {
        async fn has_context(&self) -> bool {
            self.created.load(Ordering::SeqCst) > 0
        }

        async fn create_context(&self) -> Result<(), HostError> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn inbox(&self) -> Option<mpsc::Sender<Envelope>> {
            Some(self.inbox.clone())
        }
    }

    #[tokio::test]
    async fn test_request_embedding_matches_local_model() {
        let broker = OffloadBroker::new(Arc::new(OffscreenHost::new(Arc::new(HtpLoader)))).unwrap();

        let vector = broker.request_embedding("rust borrow checker").await.unwrap();
        let expected = HtpEmbedder::new().embed("rust borrow checker").unwrap();
        assert_eq!(vector, expected);
    }

    #[tokio::test]
    async fn test_already_exists_is_success() {
        let host = Arc::new(StaleViewHost(OffscreenHost::new(Arc::new(HtpLoader))));
        let broker = OffloadBroker::new(host.clone()).unwrap();

        broker.ensure_worker().await.unwrap();
        broker.ensure_worker().await.unwrap();
        assert!(broker.request_embedding("still reachable").await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_ensure_creates_one_context() {
        let host = Arc::new(OffscreenHost::new(Arc::new(HtpLoader)));
        let brokers: Vec<_> = (0..8)
            .map(|_| Arc::new(OffloadBroker::new(host.clone()).unwrap()))
            .collect();

        let handles: Vec<_> = brokers
            .iter()
            .cloned()
            .map(|broker| tokio::spawn(async move { broker.ensure_worker().await }))
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(host.has_context().await);
        assert_eq!(host.create_context().await, Err(HostError::AlreadyExists));
    }

    #[tokio::test]
    async fn test_other_creation_errors_propagate() {
        let broker = OffloadBroker::new(Arc::new(BrokenHost)).unwrap();

        let err = broker.ensure_worker().await.unwrap_err();
        assert!(matches!(err, TransportError::HostUnavailable(_)));

        let err = broker.request_embedding("text").await.unwrap_err();
        assert!(matches!(err, OffloadError::Transport(TransportError::HostUnavailable(_))));
    }

    #[tokio::test]
    async fn test_embedding_errors_are_distinct_from_transport() {
        let broker = OffloadBroker::new(Arc::new(OffscreenHost::new(Arc::new(HtpLoader)))).unwrap();

        let err = broker.request_embedding("").await.unwrap_err();
        assert!(matches!(err, OffloadError::Embedding(_)));

        // Broker and model stay usable
        assert!(broker.request_embedding("next request").await.is_ok());
    }

    #[tokio::test]
    async fn test_out_of_order_replies_are_not_cross_matched() {
        let broker = Arc::new(OffloadBroker::new(Arc::new(ReversingHost::start(3))).unwrap());

        let texts = ["a", "bbbb", "ccccccccc"];
        let handles: Vec<_> = texts
            .iter()
            .map(|text| {
                let broker = broker.clone();
                let text = text.to_string();
                tokio::spawn(async move { (text.len(), broker.request_embedding(&text).await) })
            })
            .collect();

        for handle in handles {
            let (len, result) = handle.await.unwrap();
            assert_eq!(result.unwrap(), vec![len as f32]);
        }
    }

    #[tokio::test]
    async fn test_closed_context_is_recreated() {
        let host = Arc::new(OffscreenHost::new(Arc::new(HtpLoader)));
        let broker = OffloadBroker::new(host.clone()).unwrap();

        broker.request_embedding("warm up").await.unwrap();
        broker.shutdown();
        assert!(!host.has_context().await);

        assert!(broker.request_embedding("after close").await.is_ok());
    }
}
