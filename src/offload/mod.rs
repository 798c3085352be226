//! Compute offload: a single hosting context owns the embedding model and
//! every caller reaches it by message passing.

pub mod broker;
pub mod host;
pub mod protocol;

pub use broker::{OffloadBroker, OffloadError, TransportError};
pub use host::{ContextHost, HostError, OffscreenHost};
pub use protocol::{EmbedResponse, RuntimeMessage, OFFSCREEN_TARGET};
