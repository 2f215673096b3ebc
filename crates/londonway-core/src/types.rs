use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Author of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Lifecycle of a message within its turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Assistant placeholder still receiving deltas.
    Streaming,
    /// Final content received.
    #[default]
    Complete,
    /// Stream failed; content is the failure notice.
    Failed,
}

/// Crowding level reported for a journey.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrowdingLevel {
    Low,
    Moderate,
    High,
}

impl CrowdingLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrowdingLevel::Low => "Low",
            CrowdingLevel::Moderate => "Moderate",
            CrowdingLevel::High => "High",
        }
    }
}

impl fmt::Display for CrowdingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Step-free access rating for a route.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessibilityLevel {
    #[serde(rename = "Step-free")]
    StepFree,
    Partial,
    Complex,
}

impl AccessibilityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessibilityLevel::StepFree => "Step-free",
            AccessibilityLevel::Partial => "Partial",
            AccessibilityLevel::Complex => "Complex",
        }
    }
}

impl fmt::Display for AccessibilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Structs
// =============================================================================

/// A citation supplied by the backend's web-grounding side channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingSource {
    pub uri: String,
    pub title: String,
}

/// A single entry in the chat transcript.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub status: MessageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<GroundingSource>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crowding_level: Option<CrowdingLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disruption_alert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_estimate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessibility_level: Option<AccessibilityLevel>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>, status: MessageStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            status,
            sources: None,
            crowding_level: None,
            disruption_alert: None,
            cost_estimate: None,
            accessibility_level: None,
        }
    }

    /// A complete message authored by the user.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, MessageStatus::Complete)
    }

    /// A complete assistant message, e.g. the greeting.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content, MessageStatus::Complete)
    }

    /// An empty assistant message awaiting streamed content.
    pub fn assistant_placeholder() -> Self {
        Self::new(Role::Assistant, String::new(), MessageStatus::Streaming)
    }

    /// Whether the message will receive no further updates.
    pub fn is_terminal(&self) -> bool {
        self.status != MessageStatus::Streaming
    }

    /// Whether any metadata badge is set.
    pub fn has_metadata(&self) -> bool {
        self.crowding_level.is_some()
            || self.disruption_alert.is_some()
            || self.cost_estimate.is_some()
            || self.accessibility_level.is_some()
    }
}

/// A user-created journey bookmark.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteJourney {
    pub id: String,
    pub from: String,
    pub to: String,
    pub label: String,
}

impl FavoriteJourney {
    /// Create a bookmark with a fresh id.
    pub fn new(from: impl Into<String>, to: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from: from.into(),
            to: to.into(),
            label: label.into(),
        }
    }
}
