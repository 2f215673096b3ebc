//! Terminal rendering of session events.
//!
//! Streams assistant text a line at a time with metadata tags stripped, then
//! prints badges and sources once the message is terminal.

use londonway_chat::{strip_metadata, ChatEvent};
use londonway_core::types::{CrowdingLevel, Message, MessageStatus};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct Renderer {
    current: Option<Uuid>,
    printed: String,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text to write for `event`, if any.
    pub fn render(&mut self, event: &ChatEvent) -> Option<String> {
        match event {
            ChatEvent::TurnStarted { assistant, .. } => {
                self.current = Some(assistant.id);
                self.printed.clear();
                None
            }
            ChatEvent::MessageUpdated { message } => {
                let complete = match message.content.rfind('\n') {
                    Some(pos) => &message.content[..=pos],
                    None => return None,
                };
                self.advance(message.id, &strip_metadata(complete))
            }
            ChatEvent::NetworkAlert { text } => Some(format!("\n  [network] {text}\n")),
            ChatEvent::TurnFinished { message } => {
                let mut out = self
                    .advance(message.id, &strip_metadata(&message.content))
                    .unwrap_or_default();
                out.push('\n');
                out.push_str(&footer(message));
                self.current = None;
                self.printed.clear();
                Some(out)
            }
        }
    }

    /// Emit the part of `clean` not yet printed. If the new text no longer
    /// extends what was printed (a retried stream), restart on a new line.
    fn advance(&mut self, id: Uuid, clean: &str) -> Option<String> {
        if self.current != Some(id) {
            self.current = Some(id);
            self.printed.clear();
        }
        let out = match clean.strip_prefix(self.printed.as_str()) {
            Some(suffix) => suffix.to_string(),
            None => format!("\n{clean}"),
        };
        self.printed = clean.to_string();
        (!out.is_empty()).then_some(out)
    }
}

fn footer(message: &Message) -> String {
    let mut badges = Vec::new();
    if let Some(alert) = &message.disruption_alert {
        badges.push(format!("ALERTE {alert}"));
    }
    if let Some(level) = message.crowding_level {
        let marker = match level {
            CrowdingLevel::Low => "",
            CrowdingLevel::Moderate => " (!)",
            CrowdingLevel::High => " (!!)",
        };
        badges.push(format!("Crowding: {level}{marker}"));
    }
    if let Some(access) = message.accessibility_level {
        badges.push(format!("Access: {}", access.as_str()));
    }
    if let Some(cost) = &message.cost_estimate {
        badges.push(format!("Cost: {cost}"));
    }

    let mut out = String::new();
    if message.status == MessageStatus::Failed {
        out.push_str("  (reply failed)\n");
    }
    if !badges.is_empty() {
        out.push_str(&format!("  [{}]\n", badges.join("] [")));
    }
    if let Some(sources) = message.sources.as_ref().filter(|s| !s.is_empty()) {
        out.push_str("  Sources:\n");
        for source in sources {
            out.push_str(&format!("    - {} <{}>\n", source.title, source.uri));
        }
    }
    out.push_str(&format!("  {}\n", message.timestamp.with_timezone(&chrono::Local).format("%H:%M")));
    out
}
