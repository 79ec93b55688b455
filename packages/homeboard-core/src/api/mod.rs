//! Browser-facing HTTP/WebSocket API.
//!
//! Handlers are thin: they read from the store, the view manager and the panel
//! registry, and forward browser actions to the owning component.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::events::ClientEventBridge;
use crate::hub::RealtimeClient;
use crate::panels::{CameraPanel, DoorbellPanel, PanelRegistry};
use crate::protocol_constants::{PORT_RANGE_END, PORT_RANGE_START};
use crate::services::ViewManager;
use crate::state::EntityStore;

pub mod http;
pub mod response;
pub mod ws;
pub mod ws_connection;

pub use ws_connection::WsConnectionManager;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),

    /// No available ports in the specified range.
    #[error("No available ports in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },
}

/// Shared state for the API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<EntityStore>,
    pub client: Arc<RealtimeClient>,
    pub views: Arc<ViewManager>,
    pub panels: Arc<PanelRegistry>,
    pub cameras: Arc<CameraPanel>,
    pub doorbell: Arc<DoorbellPanel>,
    /// Source of the events pushed to browser sessions.
    pub event_bridge: Arc<ClientEventBridge>,
    pub ws_manager: Arc<WsConnectionManager>,
    port: Arc<AtomicU16>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        store: Arc<EntityStore>,
        client: Arc<RealtimeClient>,
        views: Arc<ViewManager>,
        panels: Arc<PanelRegistry>,
        cameras: Arc<CameraPanel>,
        doorbell: Arc<DoorbellPanel>,
        event_bridge: Arc<ClientEventBridge>,
        ws_manager: Arc<WsConnectionManager>,
    ) -> Self {
        Self {
            config,
            store,
            client,
            views,
            panels,
            cameras,
            doorbell,
            event_bridge,
            ws_manager,
            port: Arc::new(AtomicU16::new(0)),
        }
    }

    /// Port the server is listening on, or 0 before binding.
    pub fn port(&self) -> u16 {
        self.port.load(Ordering::SeqCst)
    }
}

async fn find_available_port(start: u16, end: u16) -> Result<(u16, TcpListener), ServerError> {
    for port in start..=end {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        match TcpListener::bind(&addr).await {
            Ok(listener) => return Ok((port, listener)),
            Err(_) => continue,
        }
    }
    Err(ServerError::NoAvailablePort { start, end })
}

/// Binds the preferred port, or the first free port in the default range.
pub async fn bind_listener(preferred_port: u16) -> Result<(u16, TcpListener), ServerError> {
    if preferred_port > 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], preferred_port));
        Ok((preferred_port, TcpListener::bind(&addr).await?))
    } else {
        find_available_port(PORT_RANGE_START, PORT_RANGE_END).await
    }
}

/// Serves the API on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let port = listener.local_addr()?.port();
    state.port.store(port, Ordering::SeqCst);
    log::info!("[Server] Listening on http://0.0.0.0:{}", port);

    let app = http::create_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    log::info!("[Server] Stopped");
    Ok(())
}

/// Binds the configured port and serves until `shutdown` resolves.
pub async fn start_server<F>(state: AppState, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (_, listener) = bind_listener(state.config.preferred_port).await?;
    serve(listener, state, shutdown).await
}
