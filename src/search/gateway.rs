//! Embedding gateway - sole owner of the embedding model.
//!
//! The model is loaded lazily on the first request. Requests that arrive
//! while loading wait for that same load; a failed load is not cached, so the
//! next request tries again. Inference runs one call at a time on the blocking
//! pool because models are not assumed to be reentrant.

use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use super::embedding::{EmbedError, Embedder, ModelLoader};

pub struct EmbeddingGateway {
    loader: Arc<dyn ModelLoader>,
    model: OnceCell<Arc<dyn Embedder>>,
    /// Serializes the compute step across callers
    compute: Mutex<()>,
}

impl EmbeddingGateway {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            model: OnceCell::new(),
            compute: Mutex::new(()),
        }
    }

    /// Whether the model has finished loading.
    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    /// Embed `text` with the shared model.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let model = self.model().await?;

        let _guard = self.compute.lock().await;
        let text = text.to_string();
        tokio::task::spawn_blocking(move || model.embed(&text))
            .await
            .map_err(|e| EmbedError::Inference(format!("Embedding task failed: {}", e)))?
    }

    async fn model(&self) -> Result<Arc<dyn Embedder>, EmbedError> {
        let model = self
            .model
            .get_or_try_init(|| async {
                info!("Loading embedding model");
                let loader = Arc::clone(&self.loader);
                let result = tokio::task::spawn_blocking(move || loader.load())
                    .await
                    .map_err(|e| EmbedError::ModelInit(format!("Loader task failed: {}", e)))
                    .and_then(|r| r);

                match &result {
                    Ok(model) => info!(
                        model = model.name(),
                        dimensions = model.dimensions(),
                        "Embedding model loaded"
                    ),
                    Err(e) => warn!(error = %e, "Embedding model failed to load"),
                }
                result
            })
            .await?;

        debug!("Embedding model ready");
        Ok(Arc::clone(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::embedding::{HtpLoader, EMBEDDING_DIM};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Loader that counts loads and optionally fails the first N attempts
    struct CountingLoader {
        loads: AtomicUsize,
        fail_first: usize,
        delay: Duration,
    }

    impl CountingLoader {
        fn new(fail_first: usize, delay: Duration) -> Self {
            Self {
                loads: AtomicUsize::new(0),
                fail_first,
                delay,
            }
        }
    }

    impl ModelLoader for CountingLoader {
        fn load(&self) -> Result<Arc<dyn Embedder>, EmbedError> {
            let attempt = self.loads.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            if attempt < self.fail_first {
                return Err(EmbedError::ModelInit("weights unavailable".to_string()));
            }
            HtpLoader.load()
        }
    }

    /// Embedder that records how many calls overlap
    struct OverlapTracker {
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl Embedder for OverlapTracker {
        fn name(&self) -> &str {
            "overlap-tracker"
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![1.0, 0.0])
        }
    }

    struct TrackerLoader(Arc<OverlapTracker>);

    impl ModelLoader for TrackerLoader {
        fn load(&self) -> Result<Arc<dyn Embedder>, EmbedError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_calls_share_one_load() {
        let loader = Arc::new(CountingLoader::new(0, Duration::from_millis(50)));
        let gateway = Arc::new(EmbeddingGateway::new(loader.clone()));

        let mut handles = Vec::new();
        for i in 0..8 {
            let gateway = gateway.clone();
            handles.push(tokio::spawn(async move {
                gateway.embed(&format!("query number {i}")).await
            }));
        }
        for handle in handles {
            let vector = handle.await.unwrap().unwrap();
            assert_eq!(vector.len(), EMBEDDING_DIM);
        }

        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert!(gateway.is_loaded());
    }

    #[tokio::test]
    async fn test_failed_load_is_not_cached() {
        let loader = Arc::new(CountingLoader::new(1, Duration::ZERO));
        let gateway = EmbeddingGateway::new(loader.clone());

        let first = gateway.embed("hello").await;
        assert!(matches!(first, Err(EmbedError::ModelInit(_))));
        assert!(!gateway.is_loaded());

        let second = gateway.embed("hello").await;
        assert!(second.is_ok());
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_compute_is_serialized() {
        let tracker = Arc::new(OverlapTracker {
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        });
        let gateway = Arc::new(EmbeddingGateway::new(Arc::new(TrackerLoader(tracker.clone()))));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let gateway = gateway.clone();
            handles.push(tokio::spawn(async move { gateway.embed("text").await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(tracker.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_inference_error_keeps_gateway_usable() {
        let gateway = EmbeddingGateway::new(Arc::new(HtpLoader));
        assert!(!gateway.is_loaded());

        let err = gateway.embed("").await.unwrap_err();
        assert!(matches!(err, EmbedError::Inference(_)));

        assert!(gateway.embed("still works").await.is_ok());
    }
}
