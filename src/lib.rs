//! mnemosyne library
//!
//! Local semantic memory of visited pages with hybrid vector + keyword search.
//!
//! # Modules
//!
//! - `core`: Records, harvested page text, data paths, configuration
//! - `search`: Embedding gateway, SQLite memory store, hybrid search engine
//! - `offload`: Hosting context for the model and the broker that reaches it
//! - `service`: Ingestion and query orchestration

pub mod core;
pub mod offload;
pub mod search;
pub mod service;

// Re-exports for convenience
pub use core::config::Config;
pub use core::harvest::{compose_semantic_text, snippet, PageParts};
pub use core::paths::DataPaths;
pub use core::record::{MemoryRecord, PagePayload};
pub use search::engine::{ScoredRecord, TimeFilter};
pub use service::{HarvestOutcome, Mnemosyne, ServiceError};
