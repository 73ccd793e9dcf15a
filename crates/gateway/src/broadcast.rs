//! Local fan-out and the publish paths onto the pub/sub fabric.
//!
//! Delivery contract: a directed message is attempted exactly once, by
//! whichever node holds the recipient's session. With a healthy broker the
//! sender publishes and every node's subscriber (the sender's included)
//! checks its own registry; without one, or when the publish fails, the
//! sender delivers locally itself.

use std::sync::Arc;

use {axum::extract::ws::Message, tracing::{debug, warn}};

use confab_protocol::{
    DirectMessage, PresenceUpdate, PubSubEvent, ServerFrame, channels,
};

use crate::state::HubState;

/// Send a `user_status` frame to every socket on this node. Per-socket send
/// failures are swallowed; the fan-out never aborts.
pub async fn broadcast_user_status(state: &Arc<HubState>, email: &str, online: bool) {
    let frame = ServerFrame::UserStatus {
        email: email.to_string(),
        online,
    };
    let json = match serde_json::to_string(&frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "failed to serialize user_status");
            return;
        },
    };

    let senders = state.snapshot_senders().await;
    debug!(email, online, clients = senders.len(), "broadcasting user status");
    for sender in senders {
        let _ = sender.send(Message::Text(json.clone().into()));
    }
}

/// Deliver a directed message iff the recipient is bound on this node.
/// Unknown recipients are dropped silently.
pub async fn deliver_local(state: &Arc<HubState>, message: &DirectMessage) {
    let Some(sender) = state.sender_for(&message.to).await else {
        debug!(to = %message.to, "recipient not attached here, dropping");
        return;
    };
    let frame = ServerFrame::Message(message.clone());
    match serde_json::to_string(&frame) {
        Ok(json) => {
            let _ = sender.send(Message::Text(json.into()));
        },
        Err(e) => warn!(error = %e, "failed to serialize message frame"),
    }
}

/// Route a directed message: publish on the fabric when a broker is up,
/// otherwise (or when the publish fails) deliver locally. The publish is a
/// single attempt; delivery is at most once either way.
pub async fn publish_message(state: &Arc<HubState>, message: DirectMessage) {
    if let Some(broker) = &state.broker {
        let event = PubSubEvent::Message {
            payload: ServerFrame::Message(message.clone()),
        };
        match serde_json::to_string(&event) {
            Ok(json) => match broker.publish(channels::MESSAGES, &json).await {
                Ok(()) => return,
                Err(e) => {
                    warn!(error = %e, "message publish failed, delivering locally");
                },
            },
            Err(e) => warn!(error = %e, "failed to serialize message event"),
        }
    }
    deliver_local(state, &message).await;
}

/// Announce a presence edge: local sockets first, synchronously, then the
/// fabric. The event carries this node's id so our own subscriber skips it;
/// a publish failure only costs remote nodes the update.
pub async fn publish_presence(state: &Arc<HubState>, email: &str, online: bool) {
    broadcast_user_status(state, email, online).await;

    if let Some(broker) = &state.broker {
        let event = PubSubEvent::Presence {
            origin: state.node_id.clone(),
            payload: PresenceUpdate {
                email: email.to_string(),
                online,
            },
        };
        match serde_json::to_string(&event) {
            Ok(json) => {
                if let Err(e) = broker.publish(channels::PRESENCE, &json).await {
                    warn!(error = %e, "presence publish failed, local broadcast already ran");
                }
            },
            Err(e) => warn!(error = %e, "failed to serialize presence event"),
        }
    }
}
