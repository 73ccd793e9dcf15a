use std::{collections::HashMap, sync::Arc, time::Instant};

use {
    axum::extract::ws::{CloseFrame, Message},
    tokio::sync::{Mutex, mpsc},
    tracing::warn,
};

use {
    confab_auth::TokenVerifier,
    confab_broker::{Broker, PresenceCounter},
    confab_protocol::ServerFrame,
};

// ── Client handle ────────────────────────────────────────────────────────────

/// One authenticated WebSocket session bound in the registry.
///
/// All writes to the underlying socket go through the session's write-loop
/// task; the handle only enqueues. Cloning shares the queue.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    /// Unique per connection; distinguishes this session from a newer one
    /// bound to the same identity.
    pub conn_id: String,
    pub email: String,
    pub sender: mpsc::UnboundedSender<Message>,
    pub connected_at: Instant,
}

impl ClientHandle {
    pub fn new(email: impl Into<String>, sender: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            conn_id: uuid::Uuid::new_v4().to_string(),
            email: email.into(),
            sender,
            connected_at: Instant::now(),
        }
    }

    /// Serialise and enqueue one frame. Returns false when the connection is
    /// already gone; callers treat that as a no-op.
    pub fn send(&self, frame: &ServerFrame) -> bool {
        match serde_json::to_string(frame) {
            Ok(json) => self.sender.send(Message::Text(json.into())).is_ok(),
            Err(e) => {
                warn!(error = %e, "failed to serialize outbound frame");
                false
            },
        }
    }

    /// Initiate a graceful close; the write loop sends the close frame and
    /// exits.
    pub fn close(&self, code: u16, reason: &str) -> bool {
        self.sender
            .send(Message::Close(Some(CloseFrame {
                code,
                reason: reason.to_string().into(),
            })))
            .is_ok()
    }
}

// ── Hub state ────────────────────────────────────────────────────────────────

/// Shared state of one hub node, wrapped in `Arc` for use across tasks.
///
/// The client registry is the only shared mutable piece; it is guarded by a
/// single mutex and never held across socket or broker I/O.
pub struct HubState {
    /// Random id for the life of the process; stamps presence events so this
    /// node can ignore its own on the fabric.
    pub node_id: String,
    pub version: String,
    pub(crate) clients: Mutex<HashMap<String, ClientHandle>>,
    pub verifier: TokenVerifier,
    pub presence: PresenceCounter,
    pub broker: Option<Broker>,
}

impl HubState {
    pub fn new(
        verifier: TokenVerifier,
        presence: PresenceCounter,
        broker: Option<Broker>,
    ) -> Arc<Self> {
        Arc::new(Self {
            node_id: uuid::Uuid::new_v4().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            clients: Mutex::new(HashMap::new()),
            verifier,
            presence,
            broker,
        })
    }
}
