//! Realtime connection to the home-automation hub.
//!
//! This module is split into a synchronous core and an async shell:
//!
//! - [`messages`]: Wire frames of the hub's WebSocket API
//! - [`pending`]: Outstanding request table keyed by request id
//! - [`backoff`]: Capped exponential retry delays
//! - [`client`]: [`RealtimeClient`], the connection state machine (no I/O)
//! - [`connection`]: [`HubConnection`], the tokio-tungstenite driver and
//!   reconnect loop

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

pub mod backoff;
pub mod client;
pub mod connection;
pub mod messages;
pub mod pending;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use backoff::Backoff;
pub use client::{FrameOutcome, RealtimeClient};
pub use connection::HubConnection;
pub use pending::{PendingRequest, PendingRequests, RequestKind};

/// Connection attempt counter. Frames tagged with an older generation are stale.
pub type Generation = u64;

/// Errors from the hub connection.
#[derive(Debug, Error)]
pub enum HubError {
    /// WebSocket transport failure.
    #[error("WebSocket error: {0}")]
    Transport(Box<tokio_tungstenite::tungstenite::Error>),

    /// The connection was not established in time.
    #[error("Connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The configured hub URL cannot be turned into a WebSocket URL.
    #[error("Invalid hub URL: {0}")]
    InvalidUrl(String),

    /// The hub integration is turned off in configuration.
    #[error("Hub integration disabled")]
    Disabled,
}

impl From<tokio_tungstenite::tungstenite::Error> for HubError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(Box::new(err))
    }
}

/// Lifecycle of the hub connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection attempt yet.
    Idle,
    /// Opening the transport.
    Connecting,
    /// Transport open, auth handshake in progress.
    Authenticating,
    /// Authenticated and subscribed.
    Connected,
    /// Transport closed; a reconnect is scheduled.
    Disconnected,
    /// The hub rejected the token; retrying with a slow backoff.
    AuthRejected,
    /// Hub integration is turned off.
    Disabled,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::AuthRejected => "auth_rejected",
            Self::Disabled => "disabled",
        }
    }

    /// True while a connection attempt is in flight or established.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Authenticating | Self::Connected
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requests list items for an entity over the live connection.
///
/// Implemented by [`RealtimeClient`]; the event router depends on this trait
/// rather than on the client itself.
pub trait ListItemsRequester: Send + Sync {
    /// Queues a list-items request. Returns the request id, or `None` if not
    /// connected.
    fn request_list_items(&self, entity_id: &str) -> Option<u64>;
}
