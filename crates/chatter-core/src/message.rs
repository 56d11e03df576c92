//! The immutable chat message value and its wire rendering.
//!
//! A [`Message`] is created once — by a session on inbound input, or by the
//! server itself for join/leave/idle notices — and never mutated afterwards.
//! Rendering happens exactly once per fan-out, in the broadcaster, so every
//! recipient sees byte-identical text.

use chrono::{DateTime, Local};
use uuid::Uuid;

/// Opaque identity of one connected session, assigned at connect time.
pub type SessionId = Uuid;

/// Who produced a message.
///
/// Server-synthesized notices (arrivals, departures, the roster) carry
/// [`Sender::Server`]; they are delivered to every registered session,
/// whereas user messages are never echoed back to their own sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sender {
    /// The server itself; renders as `server`.
    Server,
    /// A connected user.
    User { id: SessionId, name: String },
}

impl Sender {
    /// The display name put on the wire for this sender.
    pub fn display_name(&self) -> &str {
        match self {
            Sender::Server => "server",
            Sender::User { name, .. } => name,
        }
    }

    /// The session ID, if this sender is a user.
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            Sender::Server => None,
            Sender::User { id, .. } => Some(*id),
        }
    }
}

/// An immutable chat message: sender, payload, and creation timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
    pub when: DateTime<Local>,
}

impl Message {
    /// Creates a user message stamped with the current wall-clock time.
    pub fn from_user(id: SessionId, name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User {
                id,
                name: name.into(),
            },
            text: text.into(),
            when: Local::now(),
        }
    }

    /// Creates a server notice stamped with the current wall-clock time.
    pub fn from_server(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Server,
            text: text.into(),
            when: Local::now(),
        }
    }

    /// Renders the line sent to recipients: `<time>: <sender>: <text>`.
    ///
    /// The time is rendered in twelve-hour "kitchen clock" style (`3:04PM`).
    pub fn render(&self) -> String {
        format!(
            "{}: {}: {}",
            self.when.format("%-I:%M%p"),
            self.sender.display_name(),
            self.text
        )
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
