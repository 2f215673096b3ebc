//! Conversational core for LondonWay.
//!
//! Extracts crowding, disruption, cost and accessibility tags from streamed
//! model text, reconciles each cumulative delta into the transcript, and
//! drives turns against a generative-language backend that degrades to
//! basic mode on permission failures.

pub mod backend;
pub mod error;
pub mod events;
pub mod extractor;
pub mod prompts;
pub mod session;
pub mod transcript;

pub use backend::{
    BackendAdapter, BackendMode, DeltaStream, GeminiBackend, ResponseBackend, Script,
    ScriptedBackend, StreamUpdate, TextDelta,
};
pub use error::{BackendError, ChatError};
pub use events::ChatEvent;
pub use extractor::{extract, settled_alert, strip_metadata, ExtractedMetadata, TagKind};
pub use prompts::QuickPrompt;
pub use session::ChatSession;
pub use transcript::{Transcript, FAILURE_NOTICE};
