use std::{net::SocketAddr, sync::Arc};

use {
    axum::{
        Json, Router,
        extract::{ConnectInfo, Query, State, WebSocketUpgrade},
        response::IntoResponse,
        routing::get,
    },
    serde::Deserialize,
    tokio::net::TcpListener,
    tracing::{info, warn},
};

use {
    confab_auth::TokenVerifier,
    confab_broker::{Broker, PresenceCounter},
    confab_protocol::MAX_FRAME_BYTES,
};

use crate::{config::HubConfig, state::HubState, subscriber, ws};

#[derive(Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// Build the hub's router: WebSocket upgrade on `/` (and any other path) plus
/// a JSON health endpoint.
pub fn build_hub_app(state: Arc<HubState>) -> Router {
    Router::new()
        .route("/", get(ws_upgrade_handler))
        .route("/health", get(health_handler))
        .route("/{*path}", get(ws_upgrade_handler))
        .with_state(state)
}

/// Bootstrap and run one hub node until a shutdown signal arrives.
pub async fn start_hub(config: HubConfig) -> anyhow::Result<()> {
    config.validate()?;

    let broker = match &config.broker_url {
        Some(url) => {
            match Broker::connect(
                url,
                config.broker_connect_attempts,
                config.broker_connect_delay,
            )
            .await
            {
                Ok(broker) => Some(broker),
                Err(e) if config.broker_required => return Err(e.into()),
                Err(e) => {
                    warn!(error = %e, "broker unreachable, starting in single-node mode");
                    None
                },
            }
        },
        None => None,
    };

    let state = HubState::new(
        TokenVerifier::new(&config.secret),
        PresenceCounter::new(broker.clone()),
        broker.clone(),
    );

    let listener_task = broker.map(|b| tokio::spawn(subscriber::run(Arc::clone(&state), b)));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, node_id = %state.node_id, "hub listening");

    let app = build_hub_app(Arc::clone(&state));
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some(task) = listener_task {
        task.abort();
    }
    info!("hub stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<HubState>>,
) -> impl IntoResponse {
    // Oversized frames are refused by the transport before the hub sees
    // them; the offending connection's read loop ends with an error.
    ws.max_message_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| ws::handle_connection(socket, state, addr, query.token))
}

async fn health_handler(State(state): State<Arc<HubState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": state.version,
        "node_id": state.node_id,
        "connections": state.client_count().await,
    }))
}
