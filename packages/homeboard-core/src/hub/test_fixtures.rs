//! Shared hub frames for unit tests.

use serde_json::{json, Value};

pub const AUTH_REQUIRED: &str = r#"{"type": "auth_required", "ha_version": "2024.6.0"}"#;

pub const AUTH_OK: &str = r#"{"type": "auth_ok", "ha_version": "2024.6.0"}"#;

pub const AUTH_INVALID: &str =
    r#"{"type": "auth_invalid", "message": "Invalid access token or password"}"#;

pub const TEST_TOKEN: &str = "test-token";

pub const TEST_HUB_URL: &str = "http://hub.local:8123";

/// A `state_changed` event frame for `entity_id` carrying `new_state`.
///
/// `new_state` is merged with the entity id.
pub fn state_changed_frame(id: u64, entity_id: &str, new_state: Value) -> String {
    let mut state = json!({ "entity_id": entity_id });
    if let (Some(target), Some(extra)) = (state.as_object_mut(), new_state.as_object()) {
        for (k, v) in extra {
            target.insert(k.clone(), v.clone());
        }
    }
    event_frame(
        id,
        "state_changed",
        json!({
            "entity_id": entity_id,
            "old_state": null,
            "new_state": state,
        }),
    )
}

/// A generic `event` frame.
pub fn event_frame(id: u64, event_type: &str, data: Value) -> String {
    json!({
        "id": id,
        "type": "event",
        "event": {
            "event_type": event_type,
            "data": data,
            "origin": "LOCAL",
            "time_fired": "2024-06-01T12:00:00.000000+00:00"
        }
    })
    .to_string()
}

/// A successful `result` frame.
pub fn result_frame(id: u64, result: Value) -> String {
    json!({ "id": id, "type": "result", "success": true, "result": result }).to_string()
}
