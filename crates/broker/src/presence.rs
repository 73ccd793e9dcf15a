use tracing::warn;

use crate::client::Broker;

/// Per-identity online refcount, shared across nodes through the broker.
///
/// Both mutators report whether a transition edge occurred (0↔1 across the
/// fleet); only edges warrant a `user_status` broadcast. Without a broker the
/// hub is the whole fleet, so every bind and every unbind is an edge. Broker
/// command failures degrade the same way: the edge is reported so locally
/// attached clients still observe status transitions during an outage.
pub struct PresenceCounter {
    broker: Option<Broker>,
}

impl PresenceCounter {
    pub fn new(broker: Option<Broker>) -> Self {
        Self { broker }
    }

    /// Record one more live session for `email`. True when the identity just
    /// came online fleet-wide.
    pub async fn increment(&self, email: &str) -> bool {
        let Some(broker) = &self.broker else {
            return true;
        };
        match broker.incr_online(email).await {
            Ok(edge) => edge,
            Err(e) => {
                warn!(email, error = %e, "presence increment failed, assuming edge");
                true
            },
        }
    }

    /// Record one fewer live session for `email`. True when the identity's
    /// last session anywhere closed.
    pub async fn decrement(&self, email: &str) -> bool {
        let Some(broker) = &self.broker else {
            return true;
        };
        match broker.decr_online(email).await {
            Ok(edge) => edge,
            Err(e) => {
                warn!(email, error = %e, "presence decrement failed, assuming edge");
                true
            },
        }
    }

    /// Fleet-wide online set, or None when the hub should fall back to its
    /// local registry (no broker, or the broker read failed).
    pub async fn online_users(&self) -> Option<Vec<String>> {
        let broker = self.broker.as_ref()?;
        match broker.online_users().await {
            Ok(users) => Some(users),
            Err(e) => {
                warn!(error = %e, "online set read failed, falling back to local registry");
                None
            },
        }
    }
}
