//! Chat session: the coordinator wiring transcript, backend and favorites.
//!
//! Runs one turn at a time end to end. Backend failures are absorbed at the
//! turn boundary so the session stays usable.

use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use londonway_core::config::ChatConfig;
use londonway_core::types::{FavoriteJourney, Message};
use londonway_storage::FavoritesBook;

use crate::backend::{BackendAdapter, ResponseBackend, StreamUpdate};
use crate::error::ChatError;
use crate::events::ChatEvent;
use crate::extractor::{extract, settled_alert};
use crate::prompts::{
    favorite_route_prompt, QuickPrompt, FALLBACK_GREETING, GREETING_PROMPT,
    INITIAL_NETWORK_STATUS,
};
use crate::transcript::Transcript;

/// A single user's conversation with the travel assistant.
pub struct ChatSession<B> {
    transcript: Transcript,
    backend: BackendAdapter<B>,
    favorites: FavoritesBook,
    network_alert: String,
    max_message_length: usize,
    events: broadcast::Sender<ChatEvent>,
}

impl<B: ResponseBackend> ChatSession<B> {
    /// Create a session with an empty transcript.
    pub fn new(config: &ChatConfig, backend: BackendAdapter<B>, favorites: FavoritesBook) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            transcript: Transcript::new(),
            backend,
            favorites,
            network_alert: INITIAL_NETWORK_STATUS.to_string(),
            max_message_length: config.max_message_length,
            events,
        }
    }

    /// Subscribe to session events. Slow receivers may observe `Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn messages(&self) -> &[Message] {
        self.transcript.messages()
    }

    pub fn backend(&self) -> &BackendAdapter<B> {
        &self.backend
    }

    /// Latest disruption alert, or the initial status line.
    pub fn network_alert(&self) -> &str {
        &self.network_alert
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.transcript.is_awaiting_response()
    }

    /// Ask the backend for an opening message and append it.
    ///
    /// Never fails: any backend error or an empty reply falls back to the
    /// fixed welcome text.
    pub async fn greet(&mut self) -> Message {
        let text = match self.backend.complete(GREETING_PROMPT).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                warn!("Empty greeting from backend; using fallback");
                FALLBACK_GREETING.to_string()
            }
            Err(e) => {
                warn!(error = %e, "Greeting request failed; using fallback");
                FALLBACK_GREETING.to_string()
            }
        };
        let message = self.transcript.push_greeting(text).clone();
        self.emit(ChatEvent::TurnFinished {
            message: message.clone(),
        });
        message
    }

    /// Run one turn for `prompt`, returning the final assistant message.
    ///
    /// Validation errors leave the transcript untouched. A backend failure is
    /// not an error here: the returned message carries the failure notice.
    pub async fn send(&mut self, prompt: &str) -> Result<Message, ChatError> {
        if prompt.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if prompt.chars().count() > self.max_message_length {
            return Err(ChatError::MessageTooLong(self.max_message_length));
        }
        if self.transcript.is_awaiting_response() {
            return Err(ChatError::Busy);
        }

        let (user, assistant) = self.transcript.begin_turn(prompt)?;
        let assistant_id = assistant.id;
        info!(%assistant_id, chars = prompt.len(), "Turn started");
        self.emit(ChatEvent::TurnStarted { user, assistant });

        let alert_before = self.network_alert.clone();
        let Self {
            transcript,
            backend,
            events,
            network_alert,
            ..
        } = self;

        let outcome = backend
            .stream_response(prompt, |update| match update {
                StreamUpdate::Delta(delta) => {
                    if let Some(alert) = settled_alert(&delta.text) {
                        publish_alert(network_alert, events, alert);
                    }
                    let metadata = extract(&delta.text);
                    match transcript.apply_delta(assistant_id, &delta.text, &metadata, delta.sources) {
                        Ok(message) => {
                            let _ = events.send(ChatEvent::MessageUpdated {
                                message: message.clone(),
                            });
                        }
                        Err(e) => warn!(error = %e, "Delta dropped"),
                    }
                }
                StreamUpdate::Restarted => {
                    publish_alert(network_alert, events, alert_before.clone());
                    match transcript.restart_turn(assistant_id) {
                        Ok(message) => {
                            let _ = events.send(ChatEvent::MessageUpdated {
                                message: message.clone(),
                            });
                        }
                        Err(e) => warn!(error = %e, "Restart dropped"),
                    }
                }
            })
            .await;

        let message = match outcome {
            Ok(text) => {
                debug!(%assistant_id, chars = text.len(), "Turn complete");
                let message = self.transcript.finalize_turn()?.clone();
                if let Some(alert) = &message.disruption_alert {
                    publish_alert(&mut self.network_alert, &self.events, alert.clone());
                }
                message
            }
            Err(e) => {
                warn!(%assistant_id, error = %e, "Turn failed");
                self.transcript.fail_turn()?.clone()
            }
        };

        self.emit(ChatEvent::TurnFinished {
            message: message.clone(),
        });
        Ok(message)
    }

    /// Send one of the quick prompts.
    pub async fn send_quick(&mut self, quick: QuickPrompt) -> Result<Message, ChatError> {
        self.send(quick.prompt()).await
    }

    /// Favorites in creation order.
    pub fn favorites(&self) -> &[FavoriteJourney] {
        self.favorites.list()
    }

    /// Save a favorite anchored on an existing message.
    ///
    /// Endpoints are left empty; the label is what gets replayed.
    pub fn save_favorite(&mut self, message_id: Uuid, label: &str) -> Result<FavoriteJourney, ChatError> {
        if self.transcript.get(message_id).is_none() {
            return Err(ChatError::MessageNotFound(message_id));
        }
        let label = label.trim();
        if label.is_empty() {
            return Err(ChatError::EmptyLabel);
        }
        let saved = self.favorites.add(FavoriteJourney::new("", "", label))?;
        Ok(saved.clone())
    }

    pub fn remove_favorite(&mut self, id: &str) -> Result<FavoriteJourney, ChatError> {
        self.favorites
            .remove(id)?
            .ok_or_else(|| ChatError::FavoriteNotFound(id.to_string()))
    }

    /// Send the route-planning prompt for a saved favorite.
    pub async fn plan_favorite(&mut self, id: &str) -> Result<Message, ChatError> {
        let label = self
            .favorites
            .get(id)
            .map(|f| f.label.clone())
            .ok_or_else(|| ChatError::FavoriteNotFound(id.to_string()))?;
        self.send(&favorite_route_prompt(&label)).await
    }

    fn emit(&self, event: ChatEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

/// Replace the status line and announce it, if it changed.
fn publish_alert(current: &mut String, events: &broadcast::Sender<ChatEvent>, alert: String) {
    if *current != alert {
        current.clone_from(&alert);
        let _ = events.send(ChatEvent::NetworkAlert { text: alert });
    }
}

impl<B> std::fmt::Debug for ChatSession<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("messages", &self.transcript.len())
            .field("favorites", &self.favorites.len())
            .field("network_alert", &self.network_alert)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use londonway_core::types::{MessageStatus, Role};
    use londonway_storage::{MemoryStore, FAVORITES_KEY};

    use super::*;
    use crate::backend::{Script, ScriptedBackend};

    fn session(backend: ScriptedBackend) -> ChatSession<ScriptedBackend> {
        let favorites = FavoritesBook::load(Arc::new(MemoryStore::new()), FAVORITES_KEY).unwrap();
        ChatSession::new(&ChatConfig::default(), BackendAdapter::new(backend), favorites)
    }

    #[tokio::test]
    async fn test_send_rejects_empty_and_long() {
        let mut s = session(ScriptedBackend::new());
        assert!(matches!(s.send("   ").await, Err(ChatError::EmptyMessage)));

        let long = "a".repeat(2001);
        assert!(matches!(s.send(&long).await, Err(ChatError::MessageTooLong(2000))));
        assert!(s.messages().is_empty());
        assert!(s.backend().backend().calls().is_empty());
    }

    #[tokio::test]
    async fn test_send_multibyte_limit_counts_chars() {
        let backend = ScriptedBackend::new();
        backend.push_stream(Script::deltas(["ok"]));
        let mut s = session(backend);

        let prompt = "£".repeat(2000);
        assert!(s.send(&prompt).await.is_ok());
    }

    #[tokio::test]
    async fn test_send_updates_network_alert() {
        let backend = ScriptedBackend::new();
        backend.push_stream(Script::deltas([
            "Crowding: Lo",
            "Crowding: Low and ALERTE: Victoria delayed",
        ]));
        let mut s = session(backend);
        assert_eq!(s.network_alert(), "Checking London transport status...");

        let msg = s.send("Victoria line?").await.unwrap();
        assert_eq!(msg.status, MessageStatus::Complete);
        assert_eq!(s.network_alert(), "Victoria delayed");
    }

    #[tokio::test]
    async fn test_save_favorite_requires_message_and_label() {
        let mut s = session(ScriptedBackend::new());
        let greeting = s.greet().await;

        assert!(matches!(
            s.save_favorite(Uuid::new_v4(), "Home"),
            Err(ChatError::MessageNotFound(_))
        ));
        assert!(matches!(
            s.save_favorite(greeting.id, "  "),
            Err(ChatError::EmptyLabel)
        ));

        let fav = s.save_favorite(greeting.id, " Commute ").unwrap();
        assert_eq!(fav.label, "Commute");
        assert!(fav.from.is_empty() && fav.to.is_empty());
        assert_eq!(s.favorites().len(), 1);
    }

    #[tokio::test]
    async fn test_plan_favorite_sends_route_prompt() {
        let backend = ScriptedBackend::new();
        backend.push_stream(Script::deltas(["Take the Central line"]));
        let mut s = session(backend);
        let greeting = s.greet().await;
        let fav = s.save_favorite(greeting.id, "Gym").unwrap();

        s.plan_favorite(&fav.id).await.unwrap();
        let user = &s.messages()[1];
        assert_eq!(user.role, Role::User);
        assert_eq!(user.content, "Plan route: Gym");

        assert!(matches!(
            s.plan_favorite("missing").await,
            Err(ChatError::FavoriteNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_favorite() {
        let mut s = session(ScriptedBackend::new());
        let greeting = s.greet().await;
        let fav = s.save_favorite(greeting.id, "Home").unwrap();

        assert_eq!(s.remove_favorite(&fav.id).unwrap(), fav);
        assert!(s.favorites().is_empty());
        assert!(matches!(
            s.remove_favorite(&fav.id),
            Err(ChatError::FavoriteNotFound(_))
        ));
    }
}
