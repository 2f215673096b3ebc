//! Session events for UI layers.

use serde::Serialize;

use londonway_core::types::Message;

/// Broadcast after every state change a renderer cares about.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A user message and its empty assistant placeholder were appended.
    TurnStarted { user: Message, assistant: Message },
    /// The in-flight assistant message changed.
    MessageUpdated { message: Message },
    /// The network status line changed.
    NetworkAlert { text: String },
    /// The assistant message reached a terminal state.
    TurnFinished { message: Message },
}
