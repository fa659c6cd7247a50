//! WebSocket surface - event fan-out and input-lock frames
//!
//! Every bus event goes to every connected client as a JSON frame.
//! Inbound frames carry the input-lock protocol: acquire, release,
//! heartbeat, and typing. Lock state changes broadcast through the bus
//! as `input_lock_changed`, so direct replies only cover the
//! acquire/heartbeat results the requesting client needs.

use crate::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Build the WebSocket router (served on its own port)
pub fn router(state: AppState) -> Router {
    Router::new().route("/", get(ws_handler)).with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientFrame {
    #[serde(rename = "type")]
    frame_type: String,
    session_id: String,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    typing: Option<bool>,
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4().to_string();
    info!("websocket client connected: {}", connection_id);

    let (mut sink, mut source) = socket.split();
    let mut events = state.runtime.bus.subscribe();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<String>();

    // Single writer: interleaves bus events with direct replies.
    let writer = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                event = events.next() => match event {
                    Some(event) => serde_json::to_string(&event).ok(),
                    None => break,
                },
                reply = reply_rx.recv() => match reply {
                    Some(reply) => Some(reply),
                    None => break,
                },
            };
            if let Some(text) = frame {
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        }
    });

    while let Some(Ok(message)) = source.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(frame) = serde_json::from_str::<ClientFrame>(&text) else {
            debug!("ignoring malformed client frame: {}", text);
            continue;
        };
        if let Some(reply) = handle_client_frame(&state, &connection_id, &frame) {
            if reply_tx.send(reply.to_string()).is_err() {
                break;
            }
        }
    }

    writer.abort();
    info!("websocket client disconnected: {}", connection_id);
}

/// Apply one client frame; returns the direct reply, if any
fn handle_client_frame(
    state: &AppState,
    connection_id: &str,
    frame: &ClientFrame,
) -> Option<Value> {
    let client_id = frame.client_id.as_deref().unwrap_or(connection_id);
    let locks = &state.runtime.input_locks;

    match frame.frame_type.as_str() {
        "input_lock_acquire" => {
            let outcome = locks.acquire(&frame.session_id, client_id);
            Some(json!({
                "type": "input_lock_result",
                "sessionId": frame.session_id,
                "granted": outcome.granted,
                "lockedBy": outcome.locked_by,
                "expiresAt": outcome.expires_at,
            }))
        }
        "input_lock_release" => {
            locks.release(&frame.session_id, client_id);
            None
        }
        "input_lock_heartbeat" => {
            let outcome = locks.heartbeat(&frame.session_id, client_id);
            Some(json!({
                "type": "input_lock_heartbeat_ack",
                "sessionId": frame.session_id,
                "alive": outcome.alive,
                "expiresAt": outcome.expires_at,
            }))
        }
        "typing_indicator" => {
            locks.set_typing(&frame.session_id, client_id, frame.typing.unwrap_or(false));
            None
        }
        other => {
            debug!("unknown client frame type: {}", other);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::ServerEnv;
    use finger_core::system_clock;
    use finger_runtime::{AgentRuntime, AgentRuntimeOptions};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let runtime = AgentRuntime::new(AgentRuntimeOptions::new(
            dir.path().to_path_buf(),
            system_clock(),
        ));
        let env = ServerEnv {
            port: 0,
            ws_port: 0,
            home: PathBuf::from(dir.path()),
            body_limit_bytes: 1024,
            ask_tool_timeout_ms: 1_000,
            primary_orchestrator_target: "orchestrator".to_string(),
            allow_direct_agent_route: true,
        };
        (AppState { runtime, env }, dir)
    }

    fn frame(frame_type: &str, client_id: Option<&str>) -> ClientFrame {
        ClientFrame {
            frame_type: frame_type.to_string(),
            session_id: "session-1".to_string(),
            client_id: client_id.map(String::from),
            typing: Some(true),
        }
    }

    #[tokio::test]
    async fn test_acquire_frame_grants_lock() {
        let (state, _dir) = state();
        let reply =
            handle_client_frame(&state, "conn-1", &frame("input_lock_acquire", Some("client-a")))
                .unwrap();
        assert_eq!(reply["type"], "input_lock_result");
        assert_eq!(reply["granted"], true);
        assert_eq!(reply["lockedBy"], "client-a");
    }

    #[tokio::test]
    async fn test_heartbeat_ack_for_holder() {
        let (state, _dir) = state();
        handle_client_frame(&state, "conn-1", &frame("input_lock_acquire", Some("client-a")));

        let ack =
            handle_client_frame(&state, "conn-1", &frame("input_lock_heartbeat", Some("client-a")))
                .unwrap();
        assert_eq!(ack["type"], "input_lock_heartbeat_ack");
        assert_eq!(ack["alive"], true);

        let stale =
            handle_client_frame(&state, "conn-1", &frame("input_lock_heartbeat", Some("client-b")))
                .unwrap();
        assert_eq!(stale["alive"], false);
    }

    #[tokio::test]
    async fn test_connection_id_used_without_client_id() {
        let (state, _dir) = state();
        let reply = handle_client_frame(&state, "conn-9", &frame("input_lock_acquire", None)).unwrap();
        assert_eq!(reply["lockedBy"], "conn-9");
    }

    #[tokio::test]
    async fn test_unknown_frame_is_ignored() {
        let (state, _dir) = state();
        assert!(handle_client_frame(&state, "conn-1", &frame("mystery", None)).is_none());
    }
}
