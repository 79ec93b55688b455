//! HTTP route handlers.
//!
//! All handlers are thin - they read shared state or delegate to the owning
//! service.

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, Method},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::get,
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::response::api_success;
use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::error::{HomeboardError, HomeboardResult};
use crate::protocol_constants::{APP_NAME, SERVICE_ID};

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct SwitchViewRequest {
    view: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Builds the CORS layer from the configured origin prefixes.
fn cors_layer(trusted_origins: &[String]) -> CorsLayer {
    let allow_origin = if trusted_origins.is_empty() {
        AllowOrigin::any()
    } else {
        let trusted_origins = trusted_origins.to_vec();
        AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            let origin_str = origin.to_str().unwrap_or("");
            trusted_origins
                .iter()
                .any(|allowed| origin_str.starts_with(allowed.as_str()))
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(false)
}

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.trusted_origins);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/entities", get(list_entities))
        .route("/api/entities/{id}", get(get_entity))
        .route("/api/connection", get(get_connection))
        .route("/api/view", get(get_view).post(switch_view))
        .route("/api/panels", get(list_panels))
        .route("/api/panels/{name}", get(get_panel))
        .route("/api/events", get(event_stream))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe. Always 200 while the server responds.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "name": APP_NAME,
        "port": state.port(),
        "hub": state.client.state(),
        "wsConnections": state.ws_manager.connection_count(),
    }))
}

async fn list_entities(State(state): State<AppState>) -> impl IntoResponse {
    api_success(state.store.to_json())
}

async fn get_entity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> HomeboardResult<impl IntoResponse> {
    let record = state
        .store
        .get(&id)
        .ok_or(HomeboardError::EntityNotFound(id))?;
    Ok(api_success(record))
}

async fn get_connection(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({
        "state": state.client.state(),
        "generation": state.client.generation(),
    }))
}

async fn get_view(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({
        "view": state.views.current_view(),
        "views": state.views.views(),
    }))
}

async fn switch_view(
    State(state): State<AppState>,
    Json(payload): Json<SwitchViewRequest>,
) -> HomeboardResult<impl IntoResponse> {
    let changed = state.views.switch_view(&payload.view)?;
    Ok(api_success(json!({
        "view": payload.view,
        "changed": changed,
    })))
}

async fn list_panels(State(state): State<AppState>) -> impl IntoResponse {
    api_success(state.panels.snapshots())
}

async fn get_panel(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> HomeboardResult<impl IntoResponse> {
    Ok(api_success(state.panels.snapshot(&name)?))
}

/// Server-sent mirror of the WebSocket event feed, for read-only clients.
async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.event_bridge.subscribe()).map(|res| {
        let event = match res {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => Event::default().data(json),
                Err(e) => {
                    log::warn!("[Server] Failed to serialize client event: {}", e);
                    Event::default().comment("serialization failed")
                }
            },
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                log::warn!("[Server] SSE subscriber lagged by {} event(s)", skipped);
                Event::default().event("lagged").data(skipped.to_string())
            }
        };
        Ok(event)
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::test_support::dashboard;
    use crate::bootstrap::Dashboard;
    use reqwest::StatusCode;
    use serde_json::Value;

    async fn spawn_server(dashboard: &Dashboard) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = dashboard.app_state();
        tokio::spawn(async move {
            crate::api::serve(listener, state, std::future::pending()).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn get_json(url: String) -> (StatusCode, Value) {
        let response = reqwest::get(url).await.unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }

    #[tokio::test]
    async fn health_reports_service_and_hub_state() {
        let dashboard = dashboard(|_| {});
        let base = spawn_server(&dashboard).await;

        let (status, body) = get_json(format!("{}/health", base)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], SERVICE_ID);
        assert_eq!(body["hub"], "disabled");
        assert_eq!(body["wsConnections"], 0);
    }

    #[tokio::test]
    async fn entity_lookup_maps_missing_to_404() {
        let dashboard = dashboard(|_| {});
        dashboard
            .store
            .update_from_value(&json!({"entity_id": "sensor.porch", "state": "21.5"}));
        let base = spawn_server(&dashboard).await;

        let (status, body) = get_json(format!("{}/api/entities/sensor.porch", base)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "21.5");

        let (status, body) = get_json(format!("{}/api/entities/sensor.attic", base)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "entity_not_found");
        assert_eq!(body["status"], 404);
    }

    #[tokio::test]
    async fn view_can_be_switched_over_http() {
        let dashboard = dashboard(|_| {});
        let base = spawn_server(&dashboard).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{}/api/view", base))
            .json(&json!({"view": "cameras"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, json!({"view": "cameras", "changed": true}));
        assert_eq!(dashboard.views.current_view(), "cameras");

        let response = client
            .post(format!("{}/api/view", base))
            .json(&json!({"view": "garage"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "unknown_view");
    }

    #[tokio::test]
    async fn panels_are_listed_and_looked_up() {
        let dashboard = dashboard(|_| {});
        let base = spawn_server(&dashboard).await;

        let (status, body) = get_json(format!("{}/api/panels", base)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["connection_status"].is_object());

        let (status, body) = get_json(format!("{}/api/panels/connection_status", base)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "disabled");

        let (status, body) = get_json(format!("{}/api/panels/clock", base)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "panel_not_found");
    }

    #[tokio::test]
    async fn cors_allows_trusted_origin_prefixes() {
        let dashboard = dashboard(|config| {
            config.trusted_origins = vec!["http://wall-panel".to_string()];
        });
        let base = spawn_server(&dashboard).await;
        let client = reqwest::Client::new();

        let trusted = client
            .get(format!("{}/health", base))
            .header("Origin", "http://wall-panel.local:3000")
            .send()
            .await
            .unwrap();
        assert_eq!(
            trusted.headers()["access-control-allow-origin"],
            "http://wall-panel.local:3000"
        );

        let untrusted = client
            .get(format!("{}/health", base))
            .header("Origin", "http://evil.example")
            .send()
            .await
            .unwrap();
        assert!(untrusted
            .headers()
            .get("access-control-allow-origin")
            .is_none());
    }
}
