//! Messages exchanged between contexts.
//!
//! JSON shapes are stable:
//! - `{"type":"PAGE_HARVESTED","payload":{url,title,text,favicon?}}`
//! - `{"type":"EMBED_TEXT","target":"offscreen","text":...}`
//! - `{"status":"success","vector":[...]}` / `{"status":"error","error":...}`
//!
//! In-process, requests travel inside an [`Envelope`] carrying a correlation
//! id and a [`ReplyPort`]; the port answers exactly once, even when the
//! handler drops it.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::record::PagePayload;

/// Target name of the embedding hosting context
pub const OFFSCREEN_TARGET: &str = "offscreen";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RuntimeMessage {
    #[serde(rename = "PAGE_HARVESTED")]
    PageHarvested { payload: PagePayload },

    #[serde(rename = "EMBED_TEXT")]
    EmbedText { target: String, text: String },
}

impl RuntimeMessage {
    /// Embed request addressed to the hosting context
    pub fn embed_text(text: impl Into<String>) -> Self {
        RuntimeMessage::EmbedText {
            target: OFFSCREEN_TARGET.to_string(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum EmbedResponse {
    Success { vector: Vec<f32> },
    Error { error: String },
}

/// Correlated answer routed back to the requesting broker.
/// `response` is `None` when the port closed without an answer.
#[derive(Debug)]
pub struct Reply {
    pub id: u64,
    pub response: Option<EmbedResponse>,
}

/// One request in flight to a hosting context
#[derive(Debug)]
pub struct Envelope {
    pub message: RuntimeMessage,
    pub reply: ReplyPort,
}

/// Answers a single request
#[derive(Debug)]
pub struct ReplyPort {
    id: u64,
    tx: Option<mpsc::UnboundedSender<Reply>>,
}

impl ReplyPort {
    pub fn new(id: u64, tx: mpsc::UnboundedSender<Reply>) -> Self {
        Self { id, tx: Some(tx) }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn send(mut self, response: EmbedResponse) {
        self.finish(Some(response));
    }

    fn finish(&mut self, response: Option<EmbedResponse>) {
        if let Some(tx) = self.tx.take() {
            // Receiver gone means the broker itself is gone
            let _ = tx.send(Reply {
                id: self.id,
                response,
            });
        }
    }
}

impl Drop for ReplyPort {
    fn drop(&mut self) {
        self.finish(None);
    }
}
