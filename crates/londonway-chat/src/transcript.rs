//! Transcript reconciliation for streamed turns.
//!
//! A turn appends a user message and an empty assistant placeholder, merges
//! each cumulative delta into the placeholder, then either finalizes it or
//! replaces it wholesale with a failure notice.

use londonway_core::types::{GroundingSource, Message, MessageStatus, Role};
use tracing::debug;
use uuid::Uuid;

use crate::error::ChatError;
use crate::extractor::ExtractedMetadata;

/// Content shown in place of a response whose stream failed.
pub const FAILURE_NOTICE: &str = "Signal failure. Please check your connection and try again.";

/// Ordered chat history with at most one in-flight assistant message.
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    active_turn: Option<Uuid>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Id of the assistant placeholder currently streaming, if any.
    pub fn active_turn(&self) -> Option<Uuid> {
        self.active_turn
    }

    /// True between `begin_turn` and `finalize_turn`/`fail_turn`.
    pub fn is_awaiting_response(&self) -> bool {
        self.active_turn.is_some()
    }

    /// Append a complete assistant greeting.
    pub fn push_greeting(&mut self, text: impl Into<String>) -> &Message {
        self.messages.push(Message::assistant(text));
        &self.messages[self.messages.len() - 1]
    }

    /// Start a turn: append the user message and an empty assistant
    /// placeholder, returning copies of both for immediate rendering.
    pub fn begin_turn(&mut self, user_text: &str) -> Result<(Message, Message), ChatError> {
        if self.active_turn.is_some() {
            return Err(ChatError::Busy);
        }

        let user = Message::user(user_text);
        let placeholder = Message::assistant_placeholder();
        self.active_turn = Some(placeholder.id);
        self.messages.push(user.clone());
        self.messages.push(placeholder.clone());

        debug!(user_id = %user.id, assistant_id = %placeholder.id, "Turn begun");
        Ok((user, placeholder))
    }

    /// Merge one cumulative delta into a streaming assistant message.
    ///
    /// Content is replaced by `full_text`. Sources and metadata fields are
    /// replaced only when a new value is present; absent values keep what
    /// earlier deltas extracted. Re-applying the same delta is a no-op.
    pub fn apply_delta(
        &mut self,
        assistant_id: Uuid,
        full_text: &str,
        metadata: &ExtractedMetadata,
        sources: Option<Vec<GroundingSource>>,
    ) -> Result<&Message, ChatError> {
        let message = self
            .messages
            .iter_mut()
            .find(|m| m.id == assistant_id)
            .ok_or(ChatError::MessageNotFound(assistant_id))?;

        if message.role != Role::Assistant || message.status != MessageStatus::Streaming {
            return Err(ChatError::NotStreaming(assistant_id));
        }

        message.content = full_text.to_string();
        if sources.is_some() {
            message.sources = sources;
        }
        if let Some(level) = metadata.crowding {
            message.crowding_level = Some(level);
        }
        if let Some(alert) = &metadata.alert {
            message.disruption_alert = Some(alert.clone());
        }
        if let Some(cost) = &metadata.cost {
            message.cost_estimate = Some(cost.clone());
        }
        if let Some(level) = metadata.access {
            message.accessibility_level = Some(level);
        }

        Ok(message)
    }

    /// Clear a streaming assistant message back to an empty placeholder,
    /// keeping its id. Used when the response is started over.
    pub fn restart_turn(&mut self, assistant_id: Uuid) -> Result<&Message, ChatError> {
        let message = self
            .messages
            .iter_mut()
            .find(|m| m.id == assistant_id)
            .ok_or(ChatError::MessageNotFound(assistant_id))?;

        if message.role != Role::Assistant || message.status != MessageStatus::Streaming {
            return Err(ChatError::NotStreaming(assistant_id));
        }

        message.content.clear();
        clear_extras(message);
        debug!(%assistant_id, "Turn restarted");
        Ok(message)
    }

    /// Mark the in-flight assistant message complete.
    pub fn finalize_turn(&mut self) -> Result<&Message, ChatError> {
        let message = self.take_active()?;
        message.status = MessageStatus::Complete;
        debug!(assistant_id = %message.id, "Turn finalized");
        Ok(message)
    }

    /// Replace the in-flight assistant message with the failure notice,
    /// discarding partial content, sources and metadata.
    pub fn fail_turn(&mut self) -> Result<&Message, ChatError> {
        let message = self.take_active()?;
        message.content = FAILURE_NOTICE.to_string();
        message.status = MessageStatus::Failed;
        clear_extras(message);
        debug!(assistant_id = %message.id, "Turn failed");
        Ok(message)
    }

    fn take_active(&mut self) -> Result<&mut Message, ChatError> {
        let id = self.active_turn.take().ok_or(ChatError::NoActiveTurn)?;
        self.messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(ChatError::MessageNotFound(id))
    }
}

fn clear_extras(message: &mut Message) {
    message.sources = None;
    message.crowding_level = None;
    message.disruption_alert = None;
    message.cost_estimate = None;
    message.accessibility_level = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::extract;
    use londonway_core::types::{AccessibilityLevel, CrowdingLevel};

    fn source(uri: &str) -> GroundingSource {
        GroundingSource {
            uri: uri.to_string(),
            title: "TfL".to_string(),
        }
    }

    fn apply(t: &mut Transcript, id: Uuid, text: &str) -> Message {
        t.apply_delta(id, text, &extract(text), None).unwrap().clone()
    }

    // ---- begin_turn ----

    #[test]
    fn test_begin_turn_appends_user_then_placeholder() {
        let mut t = Transcript::new();
        let (user, placeholder) = t.begin_turn("Fare Check").unwrap();

        assert_eq!(t.len(), 2);
        assert_eq!(t.messages()[0], user);
        assert_eq!(t.messages()[1], placeholder);
        assert_eq!(user.role, Role::User);
        assert_eq!(user.content, "Fare Check");
        assert_eq!(placeholder.role, Role::Assistant);
        assert!(placeholder.content.is_empty());
        assert_ne!(user.id, placeholder.id);
        assert_eq!(t.active_turn(), Some(placeholder.id));
        assert!(t.is_awaiting_response());
    }

    #[test]
    fn test_begin_turn_while_streaming_is_busy() {
        let mut t = Transcript::new();
        t.begin_turn("first").unwrap();
        assert!(matches!(t.begin_turn("second"), Err(ChatError::Busy)));
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_new_turn_after_finalize() {
        let mut t = Transcript::new();
        t.begin_turn("first").unwrap();
        t.finalize_turn().unwrap();
        t.begin_turn("second").unwrap();
        assert_eq!(t.len(), 4);
    }

    // ---- apply_delta ----

    #[test]
    fn test_apply_delta_sets_content_and_metadata() {
        let mut t = Transcript::new();
        let (_, p) = t.begin_turn("Victoria?").unwrap();

        apply(&mut t, p.id, "Crowding: Lo");
        let msg = apply(&mut t, p.id, "Crowding: Low and ALERTE: Victoria delayed");

        assert_eq!(msg.content, "Crowding: Low and ALERTE: Victoria delayed");
        assert_eq!(msg.crowding_level, Some(CrowdingLevel::Low));
        assert_eq!(msg.disruption_alert.as_deref(), Some("Victoria delayed"));
    }

    #[test]
    fn test_apply_delta_is_idempotent() {
        let mut t = Transcript::new();
        let (_, p) = t.begin_turn("q").unwrap();
        let text = "Cost: £2.80\nAccess: Partial";
        let meta = extract(text);

        let first = t
            .apply_delta(p.id, text, &meta, Some(vec![source("a")]))
            .unwrap()
            .clone();
        let second = t
            .apply_delta(p.id, text, &meta, Some(vec![source("a")]))
            .unwrap()
            .clone();
        assert_eq!(first, second);
    }

    #[test]
    fn test_apply_delta_keeps_fields_not_restated() {
        let mut t = Transcript::new();
        let (_, p) = t.begin_turn("q").unwrap();

        let meta = ExtractedMetadata {
            crowding: Some(CrowdingLevel::Low),
            ..Default::default()
        };
        t.apply_delta(p.id, "Crowding: Low", &meta, None).unwrap();

        let msg = t
            .apply_delta(p.id, "A longer answer", &ExtractedMetadata::default(), None)
            .unwrap();
        assert_eq!(msg.content, "A longer answer");
        assert_eq!(msg.crowding_level, Some(CrowdingLevel::Low));
    }

    #[test]
    fn test_apply_delta_overwrites_with_new_match() {
        let mut t = Transcript::new();
        let (_, p) = t.begin_turn("q").unwrap();

        apply(&mut t, p.id, "Access: Partial");
        let msg = apply(&mut t, p.id, "Access: Partial ... Access: Step-free");
        assert_eq!(msg.accessibility_level, Some(AccessibilityLevel::StepFree));
    }

    #[test]
    fn test_apply_delta_sources_replace_only_when_present() {
        let mut t = Transcript::new();
        let (_, p) = t.begin_turn("q").unwrap();

        let meta = ExtractedMetadata::default();
        t.apply_delta(p.id, "a", &meta, Some(vec![source("one")])).unwrap();
        let msg = t.apply_delta(p.id, "ab", &meta, None).unwrap();
        assert_eq!(msg.sources, Some(vec![source("one")]));

        let msg = t
            .apply_delta(p.id, "abc", &meta, Some(vec![source("two"), source("three")]))
            .unwrap();
        assert_eq!(msg.sources, Some(vec![source("two"), source("three")]));
    }

    #[test]
    fn test_apply_delta_unknown_id() {
        let mut t = Transcript::new();
        t.begin_turn("q").unwrap();
        let id = Uuid::new_v4();
        let err = t
            .apply_delta(id, "x", &ExtractedMetadata::default(), None)
            .unwrap_err();
        assert!(matches!(err, ChatError::MessageNotFound(found) if found == id));
    }

    #[test]
    fn test_apply_delta_rejects_user_and_finished_messages() {
        let mut t = Transcript::new();
        let (user, p) = t.begin_turn("q").unwrap();
        let meta = ExtractedMetadata::default();

        assert!(matches!(
            t.apply_delta(user.id, "x", &meta, None),
            Err(ChatError::NotStreaming(_))
        ));

        t.finalize_turn().unwrap();
        assert!(matches!(
            t.apply_delta(p.id, "x", &meta, None),
            Err(ChatError::NotStreaming(_))
        ));
    }

    // ---- finalize / fail ----

    #[test]
    fn test_finalize_marks_terminal() {
        let mut t = Transcript::new();
        let (_, p) = t.begin_turn("q").unwrap();
        apply(&mut t, p.id, "Done. Crowding: High");

        let msg = t.finalize_turn().unwrap();
        assert_eq!(msg.status, MessageStatus::Complete);
        assert_eq!(msg.crowding_level, Some(CrowdingLevel::High));
        assert!(t.last().unwrap().is_terminal());
        assert!(!t.is_awaiting_response());
    }

    #[test]
    fn test_finalize_without_turn() {
        let mut t = Transcript::new();
        assert!(matches!(t.finalize_turn(), Err(ChatError::NoActiveTurn)));
        assert!(matches!(t.fail_turn(), Err(ChatError::NoActiveTurn)));
    }

    #[test]
    fn test_fail_turn_replaces_everything() {
        let mut t = Transcript::new();
        let (_, p) = t.begin_turn("q").unwrap();
        let text = "Crowding: Low\nCost: £2.80";
        t.apply_delta(p.id, text, &extract(text), Some(vec![source("x")]))
            .unwrap();

        let msg = t.fail_turn().unwrap().clone();
        assert_eq!(msg.id, p.id);
        assert_eq!(msg.content, FAILURE_NOTICE);
        assert_eq!(msg.status, MessageStatus::Failed);
        assert!(!msg.has_metadata());
        assert!(msg.sources.is_none());
        assert!(t.last().unwrap().is_terminal());
        assert!(!t.is_awaiting_response());
    }

    #[test]
    fn test_restart_turn_clears_stale_fields() {
        let mut t = Transcript::new();
        let (_, p) = t.begin_turn("q").unwrap();
        let text = "ALERTE: Central - Suspended\nCrowding: High\nCost: £9.99";
        t.apply_delta(p.id, text, &extract(text), Some(vec![source("x")]))
            .unwrap();

        let msg = t.restart_turn(p.id).unwrap().clone();
        assert_eq!(msg.id, p.id);
        assert!(msg.content.is_empty());
        assert!(!msg.has_metadata());
        assert!(msg.sources.is_none());
        assert_eq!(msg.status, MessageStatus::Streaming);
        assert_eq!(t.active_turn(), Some(p.id));

        let msg = apply(&mut t, p.id, "Take the Jubilee line.");
        assert_eq!(msg.crowding_level, None);
        assert_eq!(msg.cost_estimate, None);
        assert_eq!(msg.disruption_alert, None);
    }

    #[test]
    fn test_restart_turn_rejects_finished_message() {
        let mut t = Transcript::new();
        let (_, p) = t.begin_turn("q").unwrap();
        t.finalize_turn().unwrap();
        assert!(matches!(t.restart_turn(p.id), Err(ChatError::NotStreaming(_))));
    }

    #[test]
    fn test_transcript_usable_after_failure() {
        let mut t = Transcript::new();
        t.begin_turn("q1").unwrap();
        t.fail_turn().unwrap();
        let (_, p) = t.begin_turn("q2").unwrap();
        assert_eq!(t.active_turn(), Some(p.id));
    }

    #[test]
    fn test_push_greeting() {
        let mut t = Transcript::new();
        let greeting = t.push_greeting("Welcome to LondonWay.").clone();
        assert_eq!(greeting.role, Role::Assistant);
        assert!(greeting.is_terminal());
        assert!(!t.is_awaiting_response());
    }
}
