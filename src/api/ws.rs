//! WebSocket API with JWT authentication.
//!
//! The upgrade request carries the same bearer header and refresh cookie as
//! any HTTP call and passes the same verification gate. After the upgrade the
//! connection sits in its user's private room and may join channel rooms.

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket, rejection::WebSocketUpgradeRejection},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::auth::{AuthContext, CookieConfig, gate};
use crate::db::Database;
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;
use crate::realtime::{ConnectionRegistry, Handshake, ServerEvent, handle_client_message};

/// Interval between keep-alive pings.
const PING_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

/// Outbound queue depth per connection.
const OUTBOUND_QUEUE: usize = 32;

/// State for WebSocket endpoints.
#[derive(Clone)]
pub struct WsState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub cookies: Arc<CookieConfig>,
    pub registry: Arc<ConnectionRegistry>,
}

impl_has_auth_backend!(WsState);

pub fn router(state: WsState) -> Router {
    Router::new().route("/", get(ws_handler)).with_state(state)
}

async fn ws_handler(
    State(state): State<WsState>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let ctx = match gate::verify(&Handshake::new(&headers), &state).await {
        Ok(ctx) => ctx,
        Err(e) => return e.into_response(),
    };

    // Check for WebSocket upgrade
    let ws = match ws {
        Ok(ws) => ws,
        Err(_) => {
            return (StatusCode::BAD_REQUEST, "Expected WebSocket upgrade").into_response();
        }
    };

    let registry = state.registry.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, ctx, registry))
}

async fn handle_socket(socket: WebSocket, ctx: AuthContext, registry: Arc<ConnectionRegistry>) {
    let (mut sender, mut receiver) = socket.split();

    // Send connected message with user info
    let connected_msg = ServerEvent::Connected { user: ctx };
    if let Ok(json) = serde_json::to_string(&connected_msg) {
        if sender.send(Message::Text(json.into())).await.is_err() {
            return;
        }
    }

    // Create channel for sending messages
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(OUTBOUND_QUEUE);
    let conn_id = registry.register(ctx.user_id, tx.clone());
    info!(user_id = ctx.user_id, connection = %conn_id, "WebSocket connected");

    // Spawn task to forward messages to WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    // Spawn ping task to keep connection alive
    let tx_ping = tx.clone();
    let mut ping_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(PING_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            if tx_ping.send(ServerEvent::Ping).await.is_err() {
                break;
            }
        }
    });

    // Handle incoming messages
    let recv_registry = registry.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if let Some(reply) = handle_client_message(&recv_registry, conn_id, text.as_str()) {
                        if tx.send(reply).await.is_err() {
                            break;
                        }
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for any task to complete (connection closed)
    tokio::select! {
        _ = &mut send_task => {},
        _ = &mut recv_task => {},
        _ = &mut ping_task => {},
    }

    // Clean up
    send_task.abort();
    recv_task.abort();
    ping_task.abort();
    let rooms = registry.rooms_of(conn_id).len();
    registry.unregister(conn_id);

    info!(user_id = ctx.user_id, connection = %conn_id, rooms, "WebSocket disconnected");
}
