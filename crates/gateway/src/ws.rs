use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    axum::extract::ws::{CloseFrame, Message, WebSocket},
    futures::{SinkExt, stream::{SplitStream, StreamExt}},
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

use {
    confab_auth::AuthError,
    confab_protocol::{AUTH_TIMEOUT_MS, ClientFrame, ServerFrame, close_codes},
};

use crate::{
    broadcast, router,
    state::{ClientHandle, HubState},
};

/// Handle a single WebSocket connection through its full lifecycle:
/// authentication → registration → read loop → cleanup.
pub async fn handle_connection(
    socket: WebSocket,
    state: Arc<HubState>,
    remote_addr: SocketAddr,
    query_token: Option<String>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<Message>();

    // Write loop: forwards enqueued frames to the socket. A Close frame is
    // forwarded and then ends the loop.
    let write_handle = tokio::spawn(async move {
        while let Some(msg) = client_rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_tx.send(msg).await.is_err() {
                debug!("ws: write loop closed");
                break;
            }
            if closing {
                let _ = ws_tx.flush().await;
                break;
            }
        }
    });

    // ── Auth phase ───────────────────────────────────────────────────────

    let email = match authenticate(&state, &mut ws_rx, query_token).await {
        Ok(email) => email,
        Err(err) => {
            warn!(remote = %remote_addr, error = %err, "ws: auth failed");
            let (code, reason) = auth_close(&err);
            if let Ok(json) = serde_json::to_string(&ServerFrame::error(err.to_string())) {
                let _ = client_tx.send(Message::Text(json.into()));
            }
            let _ = client_tx.send(Message::Close(Some(CloseFrame {
                code,
                reason: reason.into(),
            })));
            drop(client_tx);
            // Let the write loop flush the error and close frames.
            let _ = write_handle.await;
            return;
        },
    };

    let session = ClientHandle::new(email.clone(), client_tx.clone());
    let conn_id = session.conn_id.clone();
    info!(conn_id = %conn_id, email = %email, remote = %remote_addr, "ws: authenticated");

    // ── Registration ─────────────────────────────────────────────────────

    let prior = state.bind(session.clone()).await;
    let fresh = prior.is_none();
    if let Some(prior) = prior {
        // Same identity reconnected on this node: close the old socket and
        // hand the slot over. The refcount already carries this session, so
        // no presence edge is possible.
        info!(conn_id = %conn_id, email = %email, evicted = %prior.conn_id, "ws: evicting previous session");
        prior.close(close_codes::EVICTED, "New connection");
    }

    let online_edge = if fresh {
        state.presence.increment(&email).await
    } else {
        false
    };

    router::send_user_list(&state, &session).await;
    if online_edge {
        broadcast::publish_presence(&state, &email, true).await;
    }

    // ── Read loop ────────────────────────────────────────────────────────

    while let Some(msg) = ws_rx.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "ws: read error");
                break;
            },
        };

        router::handle_frame(&state, &session, &text).await;
    }

    // ── Cleanup ──────────────────────────────────────────────────────────

    if state.unbind_if_current(&email, &conn_id).await {
        let offline_edge = state.presence.decrement(&email).await;
        if offline_edge {
            broadcast::publish_presence(&state, &email, false).await;
        }
    }

    info!(
        conn_id = %conn_id,
        email = %email,
        duration_secs = session.connected_at.elapsed().as_secs(),
        "ws: connection closed"
    );

    drop(client_tx);
    write_handle.abort();
}

/// Resolve the connection's identity: query token if supplied, otherwise one
/// `auth` frame within the auth window.
async fn authenticate(
    state: &HubState,
    ws_rx: &mut SplitStream<WebSocket>,
    query_token: Option<String>,
) -> Result<String, AuthError> {
    let token = match query_token {
        Some(token) => Some(token),
        None => wait_for_auth_frame(ws_rx).await,
    };
    let Some(token) = token else {
        return Err(AuthError::Missing);
    };
    state.verifier.verify(&token)
}

/// Wait for the client's first data frame. Anything other than a well-formed
/// `auth` frame inside the window counts as a missing token.
async fn wait_for_auth_frame(ws_rx: &mut SplitStream<WebSocket>) -> Option<String> {
    let first_text = async {
        while let Some(msg) = ws_rx.next().await {
            match msg {
                Ok(Message::Text(t)) => return Some(t.to_string()),
                Ok(Message::Ping(_) | Message::Pong(_)) => continue,
                _ => return None,
            }
        }
        None
    };

    let text = tokio::time::timeout(Duration::from_millis(AUTH_TIMEOUT_MS), first_text)
        .await
        .ok()
        .flatten()?;

    match ClientFrame::parse(&text) {
        Ok(ClientFrame::Auth { token }) => Some(token),
        _ => None,
    }
}

fn auth_close(err: &AuthError) -> (u16, &'static str) {
    match err {
        AuthError::Missing => (close_codes::AUTH_MISSING, "Missing auth token"),
        AuthError::Invalid => (close_codes::AUTH_INVALID, "Invalid auth token"),
        AuthError::Payload => (close_codes::AUTH_PAYLOAD, "Invalid auth payload"),
    }
}
