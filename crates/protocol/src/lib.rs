//! Chat hub wire protocol definitions.
//!
//! All communication uses JSON frames over WebSocket, tagged on `type`.
//!
//! Frame types:
//! - `ClientFrame` — client → hub (`auth`, `message`, `list_users`)
//! - `ServerFrame` — hub → client (`error`, `user_list`, `user_status`, `message`)
//! - `PubSubEvent` — node → node envelope on the broker, tagged on `event`

use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

/// Largest inbound text frame the hub accepts. Oversized frames close the
/// connection without being delivered.
pub const MAX_FRAME_BYTES: usize = 1_048_576; // 1 MiB
/// How long an unauthenticated connection may wait for its `auth` frame.
pub const AUTH_TIMEOUT_MS: u64 = 5_000;

// ── Close codes ──────────────────────────────────────────────────────────────

pub mod close_codes {
    /// A newer session for the same identity replaced this one.
    pub const EVICTED: u16 = 4000;
    pub const AUTH_MISSING: u16 = 4001;
    pub const AUTH_INVALID: u16 = 4002;
    pub const AUTH_PAYLOAD: u16 = 4003;
}

// ── Broker channels and keys ─────────────────────────────────────────────────

pub mod channels {
    pub const MESSAGES: &str = "chat:messages";
    pub const PRESENCE: &str = "chat:presence";
}

pub mod keys {
    /// Set of identities currently online anywhere in the fleet.
    pub const ONLINE_SET: &str = "chat:online_users";

    /// Per-identity session refcount key.
    pub fn online_count(email: &str) -> String {
        format!("chat:online_count:{email}")
    }
}

// ── Inbound frames ───────────────────────────────────────────────────────────

/// Client → hub frame. Additional fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Auth {
        token: String,
    },
    Message {
        #[serde(default)]
        to: Option<String>,
        #[serde(default)]
        content: Option<String>,
    },
    ListUsers,
}

/// Why an inbound frame was rejected. `Display` is the client-facing
/// `error` frame message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("Invalid JSON payload.")]
    InvalidJson,
    #[error("Invalid message payload.")]
    NotAnObject,
    #[error("Unsupported message type.")]
    UnsupportedType,
    #[error("Invalid message payload.")]
    InvalidPayload,
}

impl ClientFrame {
    /// Parse and validate one inbound text frame.
    ///
    /// Distinguishes malformed JSON, non-object payloads, unknown `type` tags
    /// and schema mismatches so the caller can report the right error without
    /// closing the connection.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|_| FrameError::InvalidJson)?;
        if !value.is_object() {
            return Err(FrameError::NotAnObject);
        }
        let known = matches!(
            value.get("type").and_then(|t| t.as_str()),
            Some("auth" | "message" | "list_users")
        );
        if !known {
            return Err(FrameError::UnsupportedType);
        }
        serde_json::from_value(value).map_err(|_| FrameError::InvalidPayload)
    }
}

// ── Outbound frames ──────────────────────────────────────────────────────────

/// One entry in a `user_list` frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserEntry {
    pub email: String,
    pub online: bool,
}

/// A directed chat message as delivered to its recipient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DirectMessage {
    pub from: String,
    pub to: String,
    pub content: String,
    /// RFC 3339 UTC, set by the sender's node.
    pub timestamp: String,
}

/// Hub → client frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Error { message: String },
    UserList { users: Vec<UserEntry> },
    UserStatus { email: String, online: bool },
    Message(DirectMessage),
}

impl ServerFrame {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn user_list(emails: impl IntoIterator<Item = String>) -> Self {
        Self::UserList {
            users: emails
                .into_iter()
                .map(|email| UserEntry {
                    email,
                    online: true,
                })
                .collect(),
        }
    }
}

// ── Broker envelope ──────────────────────────────────────────────────────────

/// Presence transition as carried on the `chat:presence` channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PresenceUpdate {
    pub email: String,
    pub online: bool,
}

/// Node → node event envelope published on the broker.
///
/// `Presence` carries the originating node id so receivers can skip events
/// they produced themselves; `Message` events are consumed on every node
/// including the sender's.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PubSubEvent {
    Message { payload: ServerFrame },
    Presence { origin: String, payload: PresenceUpdate },
}
