//! Dashboard configuration.
//!
//! Every section deserializes with defaults so a configuration file only needs
//! the hub URL and token. [`Config::validate`] is run once during bootstrap.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{
    CAMERAS_VIEW, DEFAULT_AUTH_RETRY_INITIAL_SECS, DEFAULT_AUTH_RETRY_MAX_SECS,
    DEFAULT_CAMERA_SNAPSHOT_REFRESH_MS, DEFAULT_CAMERA_STREAM_TIMEOUT_MS, DEFAULT_COMMAND_EVENT,
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_DOORBELL_AUTO_CLOSE_MS, DEFAULT_DOORBELL_LABEL,
    DEFAULT_FEED_POLL_SECS, DEFAULT_LIST_ENTITIES, DEFAULT_MOTION_VIEW_DURATION_MS,
    DEFAULT_RECONNECT_INTERVAL_MS, DEFAULT_TRIGGER_STATES, DEFAULT_VIEW, EVENT_CHANNEL_CAPACITY,
    WS_HEARTBEAT_CHECK_INTERVAL_SECS, WS_HEARTBEAT_TIMEOUT_SECS,
};
use crate::utils::websocket_url;

fn default_trigger_states() -> Vec<String> {
    DEFAULT_TRIGGER_STATES.iter().map(|s| s.to_string()).collect()
}

/// Returns true if `state` matches one of `trigger_states`, ignoring case.
pub(crate) fn is_trigger_state(trigger_states: &[String], state: Option<&str>) -> bool {
    match state {
        Some(state) => trigger_states.iter().any(|t| t.eq_ignore_ascii_case(state)),
        None => false,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Hub
// ─────────────────────────────────────────────────────────────────────────────

/// Connection settings for the home-automation hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Whether the realtime hub integration runs at all.
    pub enabled: bool,

    /// Hub base URL, e.g. `http://homeassistant.local:8123`.
    pub url: String,

    /// Long-lived access token sent during the auth handshake.
    #[serde(skip_serializing)]
    pub token: String,

    /// Delay before reconnecting after an ordinary disconnect (milliseconds).
    pub reconnect_interval_ms: u64,

    /// Timeout for establishing the WebSocket connection (seconds).
    pub connect_timeout_secs: u64,

    /// First retry delay after an auth rejection (seconds).
    pub auth_retry_initial_secs: u64,

    /// Cap for the auth-rejection retry delay (seconds).
    pub auth_retry_max_secs: u64,

    /// List entities whose items are fetched after every snapshot.
    pub list_entities: Vec<String>,

    /// Event type carrying dashboard commands.
    pub command_event_type: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: String::new(),
            token: String::new(),
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            auth_retry_initial_secs: DEFAULT_AUTH_RETRY_INITIAL_SECS,
            auth_retry_max_secs: DEFAULT_AUTH_RETRY_MAX_SECS,
            list_entities: DEFAULT_LIST_ENTITIES.iter().map(|s| s.to_string()).collect(),
            command_event_type: DEFAULT_COMMAND_EVENT.to_string(),
        }
    }
}

impl HubConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn auth_retry_initial(&self) -> Duration {
        Duration::from_secs(self.auth_retry_initial_secs)
    }

    pub fn auth_retry_max(&self) -> Duration {
        Duration::from_secs(self.auth_retry_max_secs)
    }

    /// Returns true if the entity's items are fetched via list requests.
    pub fn is_list_entity(&self, entity_id: &str) -> bool {
        self.list_entities.iter().any(|e| e == entity_id)
    }

    fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }
        if websocket_url(&self.url).is_none() {
            return Err(format!(
                "hub.url must be an http(s) or ws(s) URL, got '{}'",
                self.url
            ));
        }
        if self.token.trim().is_empty() {
            return Err("hub.token is required when the hub is enabled".to_string());
        }
        if self.reconnect_interval_ms == 0 {
            return Err("hub.reconnect_interval_ms must be greater than 0".to_string());
        }
        if self.auth_retry_initial_secs == 0
            || self.auth_retry_initial_secs > self.auth_retry_max_secs
        {
            return Err(format!(
                "hub.auth_retry_initial_secs ({}) must be in 1..={}",
                self.auth_retry_initial_secs, self.auth_retry_max_secs
            ));
        }
        if self.command_event_type.is_empty() {
            return Err("hub.command_event_type must not be empty".to_string());
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Views
// ─────────────────────────────────────────────────────────────────────────────

/// The set of views the dashboard can show.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewsConfig {
    /// Names of all views.
    pub available: Vec<String>,
    /// View shown at startup.
    pub default_view: String,
    /// View hosting the camera tiles.
    pub camera_view: String,
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self {
            available: vec![DEFAULT_VIEW.to_string(), CAMERAS_VIEW.to_string()],
            default_view: DEFAULT_VIEW.to_string(),
            camera_view: CAMERAS_VIEW.to_string(),
        }
    }
}

impl ViewsConfig {
    pub fn contains(&self, view: &str) -> bool {
        self.available.iter().any(|v| v == view)
    }

    fn validate(&self) -> Result<(), String> {
        if self.available.is_empty() {
            return Err("views.available must list at least one view".to_string());
        }
        if !self.contains(&self.default_view) {
            return Err(format!(
                "views.default_view '{}' is not in views.available",
                self.default_view
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Panels
// ─────────────────────────────────────────────────────────────────────────────

/// A media player shown in the now-playing strip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaPlayerConfig {
    pub entity_id: String,
    /// Source label; falls back to the entity's friendly name.
    #[serde(default)]
    pub label: Option<String>,
}

/// The todo and shopping list panels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TodoPanelConfig {
    pub todo_entity: String,
    pub shopping_entity: String,
}

impl Default for TodoPanelConfig {
    fn default() -> Self {
        Self {
            todo_entity: DEFAULT_LIST_ENTITIES[0].to_string(),
            shopping_entity: DEFAULT_LIST_ENTITIES[1].to_string(),
        }
    }
}

/// Doorbell overlay behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DoorbellConfig {
    pub enabled: bool,
    /// Sensor that opens the overlay when it enters a trigger state.
    pub trigger_entity: String,
    pub trigger_states: Vec<String>,
    /// Camera shown in the overlay.
    pub camera_entity: String,
    /// Explicit stream URL (highest priority).
    pub stream_url: Option<String>,
    /// Hub-relative stream path.
    pub stream_path: Option<String>,
    /// Auto-close delay (milliseconds); 0 disables auto-close.
    pub auto_close_ms: u64,
    /// Status label shown when the doorbell fires.
    pub active_label: String,
}

impl Default for DoorbellConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trigger_entity: "binary_sensor.front_doorbell_motion".to_string(),
            trigger_states: vec!["on".to_string(), "ringing".to_string()],
            camera_entity: "camera.doorbell".to_string(),
            stream_url: None,
            stream_path: Some("/api/camera_proxy_stream/camera.doorbell".to_string()),
            auto_close_ms: DEFAULT_DOORBELL_AUTO_CLOSE_MS,
            active_label: DEFAULT_DOORBELL_LABEL.to_string(),
        }
    }
}

/// Automatic switch to the camera view on motion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionViewConfig {
    pub enabled: bool,
    pub trigger_entities: Vec<String>,
    pub trigger_states: Vec<String>,
    pub view: String,
    pub return_view: String,
    pub duration_ms: u64,
}

impl Default for MotionViewConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            trigger_entities: Vec::new(),
            trigger_states: default_trigger_states(),
            view: CAMERAS_VIEW.to_string(),
            return_view: DEFAULT_VIEW.to_string(),
            duration_ms: DEFAULT_MOTION_VIEW_DURATION_MS,
        }
    }
}

/// How a camera tile behaves when idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraMode {
    /// Streams continuously and reconnects on failure.
    Live,
    /// Shows snapshots; streams on demand until a timeout.
    Snapshot,
}

/// A camera tile on the camera view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub id: String,
    pub name: String,
    pub stream_url: String,
    pub snapshot_url: String,
    #[serde(default = "CameraConfig::default_mode")]
    pub mode: CameraMode,
    #[serde(default)]
    pub stream_type: Option<String>,
    #[serde(default)]
    pub stream_fallbacks: Vec<String>,
    #[serde(default = "CameraConfig::default_snapshot_refresh_ms")]
    pub snapshot_refresh_ms: u64,
    #[serde(default = "CameraConfig::default_stream_timeout_ms")]
    pub stream_timeout_ms: u64,
}

impl CameraConfig {
    fn default_mode() -> CameraMode {
        CameraMode::Snapshot
    }

    fn default_snapshot_refresh_ms() -> u64 {
        DEFAULT_CAMERA_SNAPSHOT_REFRESH_MS
    }

    fn default_stream_timeout_ms() -> u64 {
        DEFAULT_CAMERA_STREAM_TIMEOUT_MS
    }

    /// Stream types tried in order: the primary type followed by fallbacks.
    pub fn stream_types(&self) -> Vec<String> {
        self.stream_type
            .iter()
            .chain(self.stream_fallbacks.iter())
            .filter(|t| !t.is_empty())
            .cloned()
            .collect()
    }
}

/// Configuration for all panels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelsConfig {
    pub media_players: Vec<MediaPlayerConfig>,
    pub todo: TodoPanelConfig,
    pub doorbell: DoorbellConfig,
    pub motion_view: MotionViewConfig,
    pub cameras: Vec<CameraConfig>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Feeds
// ─────────────────────────────────────────────────────────────────────────────

/// An upstream JSON feed (calendar, commute, media sessions, weather).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Panel name the feed is published under.
    pub name: String,
    pub url: String,
    #[serde(default = "FeedConfig::default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl FeedConfig {
    fn default_poll_interval_secs() -> u64 {
        DEFAULT_FEED_POLL_SECS
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Root
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for a dashboard instance.
///
/// All fields have sensible defaults except the hub URL and token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Server
    /// Preferred port for the HTTP/WS server (0 = auto-allocate).
    pub preferred_port: u16,

    /// Origin prefixes allowed by CORS. Empty allows any origin.
    pub trusted_origins: Vec<String>,

    pub hub: HubConfig,
    pub views: ViewsConfig,
    pub panels: PanelsConfig,
    pub feeds: Vec<FeedConfig>,

    // WebSocket
    /// Browser WebSocket heartbeat timeout (seconds).
    pub ws_heartbeat_timeout_secs: u64,

    /// Interval between WebSocket heartbeat checks (seconds).
    pub ws_heartbeat_check_interval_secs: u64,

    /// Capacity of the browser event broadcast channel.
    pub event_channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_port: 0,
            trusted_origins: vec![
                "http://localhost".to_string(),
                "http://127.0.0.1".to_string(),
            ],
            hub: HubConfig::default(),
            views: ViewsConfig::default(),
            panels: PanelsConfig::default(),
            feeds: Vec::new(),
            ws_heartbeat_timeout_secs: WS_HEARTBEAT_TIMEOUT_SECS,
            ws_heartbeat_check_interval_secs: WS_HEARTBEAT_CHECK_INTERVAL_SECS,
            event_channel_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl Config {
    /// Validates the configuration.
    ///
    /// Returns an error message naming the first offending field.
    pub fn validate(&self) -> Result<(), String> {
        self.hub.validate()?;
        self.views.validate()?;

        if self.panels.motion_view.enabled {
            let motion = &self.panels.motion_view;
            for view in [&motion.view, &motion.return_view] {
                if !self.views.contains(view) {
                    return Err(format!(
                        "panels.motion_view references unknown view '{}'",
                        view
                    ));
                }
            }
        }

        for feed in &self.feeds {
            if feed.poll_interval_secs == 0 {
                return Err(format!(
                    "feeds.{}.poll_interval_secs must be greater than 0",
                    feed.name
                ));
            }
        }

        if self.event_channel_capacity == 0 {
            return Err("event_channel_capacity must be greater than 0".to_string());
        }
        Ok(())
    }
}
