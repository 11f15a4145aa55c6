//! Live feed for viewers: WebSocket stream plus a few JSON endpoints

use crate::config::ClearMode;
use crate::routes::AppState;
use crate::store::Subscription;
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::{get, post},
    Json, Router,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use reqtap_common::{constants, FeedEvent, RequestLog, ViewerCommand};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

/// Build the feed router
pub fn router() -> Router<AppState> {
    Router::new()
        .route(constants::FEED_WS_PATH, get(ws_handler))
        .route(constants::FEED_REQUESTS_PATH, get(get_requests))
        .route(constants::FEED_CLEAR_PATH, post(clear_requests))
        .route(constants::FEED_HEALTH_PATH, get(health_check))
}

// ============================================================================
// JSON Endpoints
// ============================================================================

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub service: String,
    pub version: String,
    pub records: usize,
    pub viewers: usize,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        service: constants::SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        records: state.store.len().await,
        viewers: state.store.viewer_count(),
    })
}

/// Get the current history, oldest first
async fn get_requests(State(state): State<AppState>) -> Json<Vec<RequestLog>> {
    Json(state.store.get_requests().await)
}

/// Outcome of a clear request
#[derive(Debug, Serialize, Deserialize)]
pub struct ClearResponse {
    pub scope: String,
    pub cleared: bool,
}

/// Clear the shared history when the server runs in shared mode
async fn clear_requests(State(state): State<AppState>) -> Json<ClearResponse> {
    let cleared = apply_clear(&state).await;
    Json(ClearResponse {
        scope: state.config.clear_mode.as_str().to_string(),
        cleared,
    })
}

/// Returns whether the shared history was touched
async fn apply_clear(state: &AppState) -> bool {
    match state.config.clear_mode {
        ClearMode::Local => {
            tracing::debug!("Clear request left shared history intact (local mode)");
            false
        }
        ClearMode::Shared => {
            let removed = state.store.clear().await;
            tracing::info!("Cleared {} records from shared history", removed);
            true
        }
    }
}

// ============================================================================
// WebSocket
// ============================================================================

/// WebSocket handler for live updates
async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_viewer(socket, state))
}

/// Handle one viewer connection until it closes, falls behind or stalls
async fn handle_viewer(socket: WebSocket, state: AppState) {
    let viewer_id = Uuid::new_v4();
    let send_timeout = state.config.send_timeout;
    let Subscription {
        snapshot,
        mut events,
    } = state.store.subscribe().await;
    tracing::info!("Viewer {} connected ({} records in history)", viewer_id, snapshot.len());

    let (mut sender, mut receiver) = socket.split();

    let history = FeedEvent::ExistingRequests(snapshot);
    if !deliver(&mut sender, &history, send_timeout, viewer_id).await {
        tracing::info!("Viewer {} dropped before receiving history", viewer_id);
        return;
    }

    loop {
        tokio::select! {
            result = events.recv() => match result {
                Ok(event) => {
                    if !deliver(&mut sender, &event, send_timeout, viewer_id).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "Viewer {} fell {} events behind, disconnecting",
                        viewer_id,
                        skipped
                    );
                    let close = Message::Close(Some(CloseFrame {
                        code: close_code::AGAIN,
                        reason: "viewer fell behind".into(),
                    }));
                    let _ = tokio::time::timeout(send_timeout, sender.send(close)).await;
                    break;
                }
                Err(RecvError::Closed) => break,
            },
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => handle_command(&state, viewer_id, text.as_str()).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!("Viewer {} WebSocket error: {}", viewer_id, e);
                    break;
                }
                // Pong is handled automatically by axum
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::info!("Viewer {} disconnected", viewer_id);
}

/// Send one event within `limit`; false once the viewer is unreachable
async fn deliver(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &FeedEvent,
    limit: Duration,
    viewer_id: Uuid,
) -> bool {
    match tokio::time::timeout(limit, send_event(sender, event)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::debug!("Viewer {} unreachable, dropping: {}", viewer_id, e);
            false
        }
        Err(_) => {
            tracing::warn!(
                "Viewer {} stopped reading ({:?} send timeout), dropping",
                viewer_id,
                limit
            );
            false
        }
    }
}

/// Apply a command sent by a viewer
async fn handle_command(state: &AppState, viewer_id: Uuid, text: &str) {
    match ViewerCommand::from_json(text) {
        Ok(ViewerCommand::ClearAll) => {
            tracing::debug!("Viewer {} asked to clear all", viewer_id);
            apply_clear(state).await;
        }
        Err(e) => {
            tracing::debug!("Ignoring unknown message from viewer {}: {}", viewer_id, e);
        }
    }
}

/// Serialize and send one feed event
async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &FeedEvent,
) -> Result<(), axum::Error> {
    match event.to_json() {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(e) => {
            tracing::error!("Failed to serialize feed event: {}", e);
            Ok(())
        }
    }
}
