//! Session, identity and index types.

use crate::conversation::message::{Message, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Best-effort contact details captured from the conversation.
///
/// Used only to prefill the booking surface. Never validated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Identity {
    /// Overwrite each field that has a fresh value (last match wins).
    ///
    /// Returns `true` if anything changed.
    pub fn absorb(&mut self, name: Option<String>, email: Option<String>) -> bool {
        let name_changed = replace_if_new(&mut self.name, name);
        let email_changed = replace_if_new(&mut self.email, email);
        name_changed || email_changed
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none()
    }
}

/// One conversation: its message log and captured identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub identity: Identity,
}

impl Session {
    /// Start an empty session with a fresh opaque id.
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
            identity: Identity::default(),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    #[must_use]
    pub fn first_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// Index entry for this session.
    #[must_use]
    pub fn summary(&self, preview_chars: usize) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            updated_at: self.updated_at,
            preview: preview(self.first_user_message().unwrap_or(""), preview_chars),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Entry in the recent-sessions index shown by the history browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub updated_at: DateTime<Utc>,
    pub preview: String,
}

fn replace_if_new(slot: &mut Option<String>, value: Option<String>) -> bool {
    match value {
        Some(v) if slot.as_deref() != Some(v.as_str()) => {
            *slot = Some(v);
            true
        }
        _ => false,
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut out: String = flat.chars().take(max_chars).collect();
    out.push('…');
    out
}
