//! Semantic memory search
//!
//! - `embedding`: embedder capability and the built-in HTP model
//! - `gateway`: lazily loaded, serialized access to the model
//! - `vectordb`: SQLite-backed memory store
//! - `engine`: hybrid semantic + keyword ranking

pub mod embedding;
pub mod engine;
pub mod gateway;
pub mod vectordb;

pub use embedding::{EmbedError, Embedder, HtpEmbedder, HtpLoader, ModelLoader};
pub use engine::{HybridSearchEngine, ScoredRecord, SearchError, TimeFilter};
pub use gateway::EmbeddingGateway;
pub use vectordb::{MemoryStore, StoreError, StoreStats};
