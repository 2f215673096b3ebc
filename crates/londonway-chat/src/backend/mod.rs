//! Generative-language backends and the degrade-once adapter around them.
//!
//! Defines the `ResponseBackend` async trait plus the HTTP and scripted
//! implementations.

pub mod adapter;
pub mod gemini;
pub mod scripted;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;

use londonway_core::types::GroundingSource;

use crate::error::BackendError;

pub use adapter::BackendAdapter;
pub use gemini::GeminiBackend;
pub use scripted::{Script, ScriptedBackend};

/// One streamed update: the full text so far plus any grounding sources
/// carried by the fragment that produced it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextDelta {
    pub text: String,
    pub sources: Option<Vec<GroundingSource>>,
}

impl TextDelta {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sources: None,
        }
    }

    pub fn with_sources(mut self, sources: Vec<GroundingSource>) -> Self {
        self.sources = Some(sources);
        self
    }
}

/// What the adapter reports to its caller while a response streams.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamUpdate {
    Delta(TextDelta),
    /// The attempt so far was abandoned and a fresh one begins. Anything
    /// merged from earlier deltas of this response is stale.
    Restarted,
}

/// Whether requests may use web-search augmentation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    #[default]
    Full,
    Degraded,
}

impl BackendMode {
    pub fn allows_search(&self) -> bool {
        matches!(self, BackendMode::Full)
    }
}

/// Finite stream of cumulative deltas that may end in a failure.
pub type DeltaStream = BoxStream<'static, Result<TextDelta, BackendError>>;

/// A conversational model endpoint.
///
/// Implementations keep their own multi-turn history; `reset` discards it.
#[async_trait]
pub trait ResponseBackend: Send + Sync {
    /// Start a streamed response to `prompt`.
    async fn stream(&self, prompt: &str, mode: BackendMode) -> Result<DeltaStream, BackendError>;

    /// Request a whole response to `prompt` in one call.
    async fn complete(&self, prompt: &str, mode: BackendMode) -> Result<String, BackendError>;

    /// Drop conversation history.
    fn reset(&self) {}
}
