//! Homeboard Core - shared library for the Homeboard wall dashboard.
//!
//! This crate keeps a live mirror of a home-automation hub's entities, turns
//! them into render models for the dashboard panels, and pushes those models to
//! browser renderers. It is used by the standalone headless server.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`runtime`]: Task spawning abstraction for async runtime independence
//! - [`events`]: In-process event bus and the bridge to browser sessions
//! - [`hub`]: Realtime WebSocket client for the hub (auth, subscriptions, reconnect)
//! - [`state`]: Entity store
//! - [`services`]: Event routing, dashboard commands and the active view
//! - [`panels`]: Headless panel controllers and upstream feed pollers
//! - [`api`]: HTTP/WebSocket surface for browser renderers
//! - [`bootstrap`]: Composition root for one dashboard instance
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks
//! - [`EventEmitter`](events::EventEmitter): Mirroring browser-facing events
//! - [`ListItemsRequester`](hub::ListItemsRequester): Requesting list items
//!   without depending on the client
//! - [`FeedSource`](panels::FeedSource): Fetching upstream feed payloads

// Allow missing docs for now - public fields are self-describing
#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod events;
pub mod hub;
pub mod panels;
pub mod protocol_constants;
pub mod runtime;
pub mod services;
pub mod state;
pub mod utils;

// Re-export commonly used types at the crate root
pub use config::{
    CameraConfig, CameraMode, Config, DoorbellConfig, FeedConfig, HubConfig, MediaPlayerConfig,
    MotionViewConfig, PanelsConfig, TodoPanelConfig, ViewsConfig,
};
pub use error::{ErrorCode, HomeboardError, HomeboardResult};
pub use events::{
    BusEvent, ClientEvent, ClientEventBridge, EventBus, EventEmitter, LoggingEventEmitter,
    Subscription,
};
pub use hub::{ConnectionState, HubConnection, HubError, RealtimeClient};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use state::{EntityRecord, EntityStore};
pub use utils::now_millis;

// Re-export panel types
pub use panels::{Panel, PanelRegistry};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_dashboard, Dashboard};

// Re-export API types
pub use api::{bind_listener, serve, start_server, AppState, ServerError, WsConnectionManager};
