//! WebSocket push channel for browser renderers.

use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;

use crate::api::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Message Types
// ─────────────────────────────────────────────────────────────────────────────

/// Messages sent by the browser.
#[derive(Debug, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
enum WsIncoming {
    Heartbeat,
    SwitchView { view: String },
    /// The browser started playing a camera stream, or failed to.
    CameraStreamStatus { camera_id: String, ok: bool },
    /// The user asked a camera tile to start or stop streaming.
    CameraStreamRequest { camera_id: String, start: bool },
    DoorbellDismiss,
}

/// Messages sent to the browser, besides forwarded client events.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum WsOutgoing {
    HeartbeatAck,
    Error { message: String },
    InitialState { payload: Value },
}

impl WsOutgoing {
    /// Serializes the message to a WebSocket text message.
    fn to_message(&self) -> Option<Message> {
        serde_json::to_string(self)
            .ok()
            .map(|s| Message::Text(s.into()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Message Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Snapshot sent once per session before any forwarded event.
fn initial_state_payload(state: &AppState) -> Value {
    json!({
        "connection": state.client.state(),
        "view": state.views.current_view(),
        "views": state.views.views(),
        "panels": state.panels.snapshots(),
        "entities": state.store.to_json(),
    })
}

fn build_initial_state(state: &AppState) -> Option<Message> {
    WsOutgoing::InitialState {
        payload: initial_state_payload(state),
    }
    .to_message()
}

/// Applies one browser message. Returns the direct reply, if any.
///
/// Effects of successful actions reach the browser as forwarded events.
fn handle_incoming(state: &AppState, text: &str) -> Option<WsOutgoing> {
    let incoming = match serde_json::from_str::<WsIncoming>(text) {
        Ok(incoming) => incoming,
        Err(e) => {
            log::debug!("[WS] Ignoring unrecognised message: {}", e);
            return None;
        }
    };

    let result = match incoming {
        WsIncoming::Heartbeat => return Some(WsOutgoing::HeartbeatAck),
        WsIncoming::SwitchView { view } => state.views.switch_view(&view).map(|_| ()),
        WsIncoming::CameraStreamStatus { camera_id, ok } => {
            state.cameras.report_stream_status(&camera_id, ok)
        }
        WsIncoming::CameraStreamRequest { camera_id, start } => {
            state.cameras.request_stream(&camera_id, start)
        }
        WsIncoming::DoorbellDismiss => {
            state.doorbell.hide();
            Ok(())
        }
    };

    result.err().map(|e| WsOutgoing::Error {
        message: e.to_string(),
    })
}

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Main WebSocket session loop.
async fn handle_ws(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut events_rx = state.event_bridge.subscribe();
    let mut last_activity = Instant::now();
    let heartbeat_timeout = Duration::from_secs(state.config.ws_heartbeat_timeout_secs);

    let conn_guard = state.ws_manager.register();
    let cancel_token = conn_guard.cancel_token().clone();

    if let Some(msg) = build_initial_state(&state) {
        if sender.send(msg).await.is_err() {
            log::warn!("[WS] Failed to send initial state, client disconnected");
            return;
        }
    }

    // Delay mode skips missed ticks rather than bursting to catch up
    let mut heartbeat_interval = tokio::time::interval(Duration::from_secs(
        state.config.ws_heartbeat_check_interval_secs.max(1),
    ));
    heartbeat_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                log::info!("[WS] Session force-closed: {}", conn_guard.id());
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            msg = receiver.next() => {
                last_activity = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_incoming(&state, text.as_str()) {
                            if let Some(msg) = reply.to_message() {
                                if sender.send(msg).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            event = events_rx.recv() => {
                match event {
                    Ok(event) => {
                        if let Ok(json) = serde_json::to_string(&event) {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // Resync the renderer rather than leave gaps
                        log::warn!("[WS] {} lagged by {} event(s), resending state", conn_guard.id(), skipped);
                        if let Some(msg) = build_initial_state(&state) {
                            if sender.send(msg).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            _ = heartbeat_interval.tick() => {
                if last_activity.elapsed() > heartbeat_timeout {
                    log::warn!("[WS] Heartbeat timeout: {}", conn_guard.id());
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::test_support::dashboard;
    use crate::config::{CameraConfig, CameraMode};
    use crate::panels::Panel;

    fn camera() -> CameraConfig {
        CameraConfig {
            id: "porch".into(),
            name: "Porch".into(),
            stream_url: "/cam/porch".into(),
            snapshot_url: "/cam/porch.jpg".into(),
            mode: CameraMode::Live,
            stream_type: None,
            stream_fallbacks: Vec::new(),
            snapshot_refresh_ms: 20_000,
            stream_timeout_ms: 90_000,
        }
    }

    #[test]
    fn parses_incoming_messages() {
        let msg: WsIncoming =
            serde_json::from_str(r#"{"type":"CAMERA_STREAM_STATUS","cameraId":"porch","ok":false}"#)
                .unwrap();
        assert!(matches!(
            msg,
            WsIncoming::CameraStreamStatus { ref camera_id, ok: false } if camera_id == "porch"
        ));

        let msg: WsIncoming = serde_json::from_str(r#"{"type":"DOORBELL_DISMISS"}"#).unwrap();
        assert!(matches!(msg, WsIncoming::DoorbellDismiss));
    }

    #[test]
    fn outgoing_messages_are_tagged() {
        let json = serde_json::to_value(WsOutgoing::Error {
            message: "nope".into(),
        })
        .unwrap();
        assert_eq!(json, json!({"type": "ERROR", "message": "nope"}));
        assert_eq!(
            serde_json::to_value(WsOutgoing::HeartbeatAck).unwrap(),
            json!({"type": "HEARTBEAT_ACK"})
        );
    }

    #[tokio::test]
    async fn heartbeat_and_view_switching() {
        let dashboard = dashboard(|_| {});
        let state = dashboard.app_state();

        assert!(matches!(
            handle_incoming(&state, r#"{"type":"HEARTBEAT"}"#),
            Some(WsOutgoing::HeartbeatAck)
        ));
        assert!(handle_incoming(&state, r#"{"type":"SWITCH_VIEW","view":"cameras"}"#).is_none());
        assert_eq!(state.views.current_view(), "cameras");

        let reply = handle_incoming(&state, r#"{"type":"SWITCH_VIEW","view":"garage"}"#);
        assert!(matches!(reply, Some(WsOutgoing::Error { .. })));
        assert!(handle_incoming(&state, "not json").is_none());
    }

    #[tokio::test]
    async fn camera_and_doorbell_messages_reach_panels() {
        let dashboard = dashboard(|config| config.panels.cameras = vec![camera()]);
        let state = dashboard.app_state();
        state.views.switch_view("cameras").unwrap();

        handle_incoming(
            &state,
            r#"{"type":"CAMERA_STREAM_STATUS","cameraId":"porch","ok":true}"#,
        );
        assert_eq!(
            state.cameras.phase("porch"),
            Some(crate::panels::TilePhase::Streaming)
        );

        let reply = handle_incoming(
            &state,
            r#"{"type":"CAMERA_STREAM_REQUEST","cameraId":"attic","start":true}"#,
        );
        assert!(matches!(reply, Some(WsOutgoing::Error { .. })));

        state.doorbell.show("Ding", None);
        handle_incoming(&state, r#"{"type":"DOORBELL_DISMISS"}"#);
        assert!(!state.doorbell.is_visible());
    }

    #[tokio::test]
    async fn initial_state_includes_panels_and_view() {
        let dashboard = dashboard(|_| {});
        let payload = initial_state_payload(&dashboard.app_state());

        assert_eq!(payload["view"], "home");
        assert_eq!(payload["connection"], "disabled");
        assert!(payload["panels"]["connection_status"].is_object());
        assert_eq!(
            payload["panels"]["cameras"],
            dashboard.cameras.snapshot()
        );
    }
}
