//! Fixed protocol constants and defaults.
//!
//! Wire names in this module are defined by the hub's WebSocket API and
//! changing them would break compatibility with the hub.

// ─────────────────────────────────────────────────────────────────────────────
// Application
// ─────────────────────────────────────────────────────────────────────────────

/// Human-readable application name.
pub const APP_NAME: &str = "Homeboard";

/// Service identifier reported by the health endpoint.
pub const SERVICE_ID: &str = "homeboard";

// ─────────────────────────────────────────────────────────────────────────────
// Hub WebSocket API
// ─────────────────────────────────────────────────────────────────────────────

/// Path of the hub's WebSocket endpoint, appended to the configured hub URL.
pub const HUB_WEBSOCKET_PATH: &str = "/api/websocket";

/// Event type carrying entity state changes.
pub const STATE_CHANGED_EVENT: &str = "state_changed";

/// Default event type carrying dashboard commands.
pub const DEFAULT_COMMAND_EVENT: &str = "dashboard_command";

/// Attribute key under which list items are stored on list entities.
pub const LIST_ITEMS_ATTRIBUTE: &str = "items";

/// Mirror of [`LIST_ITEMS_ATTRIBUTE`] kept for renderers that read the full list.
pub const ALL_LIST_ITEMS_ATTRIBUTE: &str = "all_items";

/// Hub path serving a camera's MJPEG stream; the entity id is appended.
pub const CAMERA_PROXY_STREAM_PATH: &str = "/api/camera_proxy_stream/";

/// List entities requested after every snapshot unless configured otherwise.
pub const DEFAULT_LIST_ENTITIES: [&str; 2] = ["todo.jobs_to_be_done", "todo.shopping_list"];

// ─────────────────────────────────────────────────────────────────────────────
// Hub Connection Timing
// ─────────────────────────────────────────────────────────────────────────────

/// Delay before reconnecting after an ordinary disconnect (milliseconds).
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 5_000;

/// Timeout for establishing the hub WebSocket connection (seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// First retry delay after the hub rejects the access token (seconds).
pub const DEFAULT_AUTH_RETRY_INITIAL_SECS: u64 = 30;

/// Upper bound for the auth-rejection retry delay (seconds).
pub const DEFAULT_AUTH_RETRY_MAX_SECS: u64 = 600;

// ─────────────────────────────────────────────────────────────────────────────
// Views
// ─────────────────────────────────────────────────────────────────────────────

/// View shown at startup.
pub const DEFAULT_VIEW: &str = "home";

/// View hosting the camera tiles.
pub const CAMERAS_VIEW: &str = "cameras";

// ─────────────────────────────────────────────────────────────────────────────
// Panels
// ─────────────────────────────────────────────────────────────────────────────

/// Entity states that count as "triggered" for motion and doorbell sensors.
pub const DEFAULT_TRIGGER_STATES: [&str; 4] = ["on", "ringing", "detected", "motion"];

/// How long the motion view stays on the camera view (milliseconds).
pub const DEFAULT_MOTION_VIEW_DURATION_MS: u64 = 30_000;

/// Doorbell overlay auto-close delay (milliseconds).
pub const DEFAULT_DOORBELL_AUTO_CLOSE_MS: u64 = 45_000;

/// Status label shown on the doorbell overlay when none is supplied.
pub const DEFAULT_DOORBELL_LABEL: &str = "Doorbell activated";

/// Base delay for camera stream retries (milliseconds).
pub const CAMERA_RETRY_BASE_MS: u64 = 1_000;

/// Maximum delay for camera stream retries (milliseconds).
pub const CAMERA_RETRY_MAX_MS: u64 = 10_000;

/// On-demand camera streams stop after this long (milliseconds).
pub const DEFAULT_CAMERA_STREAM_TIMEOUT_MS: u64 = 90_000;

/// Snapshot refresh cadence advertised to renderers (milliseconds).
pub const DEFAULT_CAMERA_SNAPSHOT_REFRESH_MS: u64 = 20_000;

// ─────────────────────────────────────────────────────────────────────────────
// Upstream Feeds
// ─────────────────────────────────────────────────────────────────────────────

/// Default polling interval for upstream feeds (seconds).
pub const DEFAULT_FEED_POLL_SECS: u64 = 300;

/// Timeout for upstream feed HTTP requests (seconds).
pub const FEED_HTTP_TIMEOUT_SECS: u64 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Browser API
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of the broadcast channel feeding browser sessions.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Browser WebSocket sessions without traffic for this long are closed (seconds).
pub const WS_HEARTBEAT_TIMEOUT_SECS: u64 = 30;

/// Interval between heartbeat timeout checks (seconds).
pub const WS_HEARTBEAT_CHECK_INTERVAL_SECS: u64 = 1;

/// Port range scanned when no preferred port is configured.
pub const PORT_RANGE_START: u16 = 49500;

/// Inclusive end of the scanned port range.
pub const PORT_RANGE_END: u16 = 49510;
