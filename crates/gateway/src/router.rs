//! Inbound frame dispatch for authenticated sessions.

use std::sync::Arc;

use chrono::Utc;

use confab_protocol::{ClientFrame, DirectMessage, ServerFrame};

use crate::{
    broadcast,
    state::{ClientHandle, HubState},
};

/// Parse and dispatch one inbound text frame. Invalid frames are answered
/// with an `error` frame; the connection stays open.
pub async fn handle_frame(state: &Arc<HubState>, session: &ClientHandle, text: &str) {
    let frame = match ClientFrame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            session.send(&ServerFrame::error(e.to_string()));
            return;
        },
    };

    match frame {
        ClientFrame::Message { to, content } => {
            handle_chat_message(state, session, to, content).await;
        },
        ClientFrame::ListUsers => send_user_list(state, session).await,
        // A second auth frame after the handshake is just an unknown request.
        ClientFrame::Auth { .. } => {
            session.send(&ServerFrame::error("Unsupported message type."));
        },
    }
}

async fn handle_chat_message(
    state: &Arc<HubState>,
    session: &ClientHandle,
    to: Option<String>,
    content: Option<String>,
) {
    let Some(to) = to.filter(|t| !t.is_empty()) else {
        session.send(&ServerFrame::error("Missing recipient."));
        return;
    };
    let content = content.unwrap_or_default();
    let content = content.trim();
    if content.is_empty() {
        session.send(&ServerFrame::error("Message cannot be empty."));
        return;
    }

    let message = DirectMessage {
        from: session.email.clone(),
        to,
        content: content.to_string(),
        timestamp: Utc::now().to_rfc3339(),
    };
    broadcast::publish_message(state, message).await;
}

/// Answer with a point-in-time `user_list`: the fleet-wide online set when a
/// broker is reachable, this node's registry otherwise.
pub async fn send_user_list(state: &Arc<HubState>, session: &ClientHandle) {
    let emails = match state.presence.online_users().await {
        Some(users) => users,
        None => state.local_identities().await,
    };
    session.send(&ServerFrame::user_list(emails));
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        axum::extract::ws::Message,
        confab_auth::TokenVerifier,
        confab_broker::PresenceCounter,
        tokio::sync::mpsc,
    };

    use super::*;

    fn test_state() -> Arc<HubState> {
        HubState::new(
            TokenVerifier::new("secret"),
            PresenceCounter::new(None),
            None,
        )
    }

    fn session(email: &str) -> (ClientHandle, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ClientHandle::new(email, tx), rx)
    }

    fn next_frame(rx: &mut mpsc::UnboundedReceiver<Message>) -> ServerFrame {
        match rx.try_recv().expect("expected a frame") {
            Message::Text(text) => serde_json::from_str(&text).expect("valid server frame"),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_json_reports_error_without_closing() {
        let state = test_state();
        let (alice, mut rx) = session("alice@x");
        state.bind(alice.clone()).await;

        handle_frame(&state, &alice, "{oops").await;
        assert_eq!(next_frame(&mut rx), ServerFrame::error("Invalid JSON payload."));

        // The session still works afterwards.
        handle_frame(&state, &alice, r#"{"type":"list_users"}"#).await;
        assert!(matches!(
            next_frame(&mut rx),
            ServerFrame::UserList { .. }
        ));
    }

    #[tokio::test]
    async fn unknown_type_reports_error() {
        let state = test_state();
        let (alice, mut rx) = session("alice@x");
        state.bind(alice.clone()).await;

        handle_frame(&state, &alice, r#"{"type":"subscribe"}"#).await;
        assert_eq!(
            next_frame(&mut rx),
            ServerFrame::error("Unsupported message type.")
        );
    }

    #[tokio::test]
    async fn message_requires_recipient_and_content() {
        let state = test_state();
        let (alice, mut rx) = session("alice@x");
        state.bind(alice.clone()).await;

        handle_frame(&state, &alice, r#"{"type":"message","content":"hi"}"#).await;
        assert_eq!(next_frame(&mut rx), ServerFrame::error("Missing recipient."));

        handle_frame(&state, &alice, r#"{"type":"message","to":"","content":"hi"}"#).await;
        assert_eq!(next_frame(&mut rx), ServerFrame::error("Missing recipient."));

        handle_frame(&state, &alice, r#"{"type":"message","to":"bob@x","content":"   "}"#).await;
        assert_eq!(
            next_frame(&mut rx),
            ServerFrame::error("Message cannot be empty.")
        );
    }

    #[tokio::test]
    async fn message_is_trimmed_and_delivered_without_echo() {
        let state = test_state();
        let (alice, mut alice_rx) = session("alice@x");
        let (bob, mut bob_rx) = session("bob@x");
        state.bind(alice.clone()).await;
        state.bind(bob).await;

        handle_frame(
            &state,
            &alice,
            r#"{"type":"message","to":"bob@x","content":"  hi  "}"#,
        )
        .await;

        match next_frame(&mut bob_rx) {
            ServerFrame::Message(m) => {
                assert_eq!(m.from, "alice@x");
                assert_eq!(m.to, "bob@x");
                assert_eq!(m.content, "hi");
                assert!(m.timestamp.ends_with("+00:00") || m.timestamp.ends_with('Z'));
            },
            other => panic!("expected message frame, got {other:?}"),
        }
        assert!(alice_rx.try_recv().is_err(), "sender must not get an echo");
    }

    #[tokio::test]
    async fn unknown_recipient_is_dropped_silently() {
        let state = test_state();
        let (alice, mut rx) = session("alice@x");
        state.bind(alice.clone()).await;

        handle_frame(
            &state,
            &alice,
            r#"{"type":"message","to":"ghost@x","content":"hi"}"#,
        )
        .await;
        assert!(rx.try_recv().is_err(), "no error and no delivery expected");
    }

    #[tokio::test]
    async fn user_list_enumerates_local_identities_without_broker() {
        let state = test_state();
        let (alice, mut rx) = session("alice@x");
        let (bob, _bob_rx) = session("bob@x");
        state.bind(alice.clone()).await;
        state.bind(bob).await;

        send_user_list(&state, &alice).await;
        match next_frame(&mut rx) {
            ServerFrame::UserList { users } => {
                let mut emails: Vec<_> = users.iter().map(|u| u.email.clone()).collect();
                emails.sort();
                assert_eq!(emails, vec!["alice@x", "bob@x"]);
                assert!(users.iter().all(|u| u.online));
            },
            other => panic!("expected user_list, got {other:?}"),
        }
    }
}
