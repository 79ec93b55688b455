//! General utilities shared across the application.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::protocol_constants::HUB_WEBSOCKET_PATH;

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Hub URLs
// ─────────────────────────────────────────────────────────────────────────────

/// Derives the hub WebSocket endpoint from its HTTP base URL.
///
/// `http://` becomes `ws://` and `https://` becomes `wss://`; the API path is
/// appended unless already present. Returns `None` for any other scheme.
#[must_use]
pub fn websocket_url(base_url: &str) -> Option<String> {
    let base = base_url.trim().trim_end_matches('/');

    let converted = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        return None;
    };

    // Reject a bare scheme with no host
    if converted.ends_with("://") {
        return None;
    }

    if converted.ends_with(HUB_WEBSOCKET_PATH) {
        Some(converted)
    } else {
        Some(format!("{}{}", converted, HUB_WEBSOCKET_PATH))
    }
}

/// Resolves a hub-relative path (such as an `entity_picture`) against the hub URL.
///
/// Absolute `http(s)` URLs are returned untouched, root-relative paths are joined
/// to the hub base, and anything else is passed through as-is.
#[must_use]
pub fn resolve_hub_url(hub_url: &str, path: &str) -> String {
    if path.is_empty() || path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    if path.starts_with('/') {
        return format!("{}{}", hub_url.trim_end_matches('/'), path);
    }
    path.to_string()
}
