//! Broker listener: one task per process consuming both hub channels.
//!
//! The fabric is authoritative for directed delivery, so `message` events are
//! applied on every node, the publisher's included; `presence` events carry
//! their origin and are skipped there, because the originating node already
//! ran its local broadcast. If the pub/sub connection drops the task logs and
//! exits and the hub keeps serving locally attached clients.

use std::sync::Arc;

use {futures::StreamExt, tracing::{debug, info, warn}};

use {
    confab_broker::Broker,
    confab_protocol::{PubSubEvent, ServerFrame},
};

use crate::{broadcast, state::HubState};

pub async fn run(state: Arc<HubState>, broker: Broker) {
    let mut pubsub = match broker.subscriber().await {
        Ok(pubsub) => pubsub,
        Err(e) => {
            warn!(error = %e, "broker subscriber failed to start, running local-only");
            return;
        },
    };
    info!(node_id = %state.node_id, "broker subscriber started");

    let mut stream = pubsub.on_message();
    while let Some(msg) = stream.next().await {
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "unreadable pubsub payload");
                continue;
            },
        };
        apply_event(&state, &payload).await;
    }

    warn!("broker subscriber stream ended, hub continues in local-only mode");
}

/// Apply one fabric event to this node.
pub(crate) async fn apply_event(state: &Arc<HubState>, payload: &str) {
    let event: PubSubEvent = match serde_json::from_str(payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "ignoring malformed pubsub event");
            return;
        },
    };

    match event {
        PubSubEvent::Message {
            payload: ServerFrame::Message(message),
        } => {
            broadcast::deliver_local(state, &message).await;
        },
        PubSubEvent::Message { .. } => {
            debug!("ignoring non-message payload on the message channel");
        },
        PubSubEvent::Presence { origin, payload } => {
            if origin == state.node_id {
                return;
            }
            broadcast::broadcast_user_status(state, &payload.email, payload.online).await;
        },
    }
}
