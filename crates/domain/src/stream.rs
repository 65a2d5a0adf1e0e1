use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for completion-backend streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Events emitted while streaming a completion from the model backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CompletionEvent {
    /// A text token chunk.
    #[serde(rename = "chunk")]
    Chunk { text: String },

    /// Stream finished cleanly.
    #[serde(rename = "done")]
    Done { finish_reason: Option<String> },

    /// An error occurred mid-stream. Chunks received before this are valid.
    #[serde(rename = "error")]
    Error { message: String },
}
