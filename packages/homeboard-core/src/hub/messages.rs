//! Hub WebSocket frames.
//!
//! Every frame is a JSON object discriminated by `type`. Only the subset the
//! dashboard uses is modelled; unknown server frames parse as
//! [`ServerMessage::Unknown`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frames sent to the hub.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Auth {
        access_token: String,
    },
    SubscribeEvents {
        id: u64,
        event_type: String,
    },
    GetStates {
        id: u64,
    },
    #[serde(rename = "todo/item/list")]
    ListItems {
        id: u64,
        entity_id: String,
    },
}

impl ClientMessage {
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Frames received from the hub.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    AuthRequired {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthOk {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthInvalid {
        #[serde(default)]
        message: Option<String>,
    },
    Result {
        id: u64,
        #[serde(default)]
        success: bool,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<ResultError>,
    },
    Event {
        #[serde(default)]
        id: Option<u64>,
        event: EventPayload,
    },
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Error detail of a failed `result`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultError {
    #[serde(default)]
    pub code: Value,
    #[serde(default)]
    pub message: String,
}

impl std::fmt::Display for ResultError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Value::Null => write!(f, "{}", self.message),
            Value::String(code) => write!(f, "{}: {}", code, self.message),
            code => write!(f, "{}: {}", code, self.message),
        }
    }
}

/// Body of an `event` frame. `data` is opaque to the client.
#[derive(Debug, Clone, Deserialize)]
pub struct EventPayload {
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub time_fired: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::test_fixtures::*;
    use serde_json::json;

    #[test]
    fn client_frames_use_hub_type_names() {
        let auth = ClientMessage::Auth {
            access_token: "abc".into(),
        };
        assert_eq!(
            serde_json::to_value(&auth).unwrap(),
            json!({"type": "auth", "access_token": "abc"})
        );

        let list = ClientMessage::ListItems {
            id: 4,
            entity_id: "todo.shopping_list".into(),
        };
        assert_eq!(
            serde_json::to_value(&list).unwrap(),
            json!({"type": "todo/item/list", "id": 4, "entity_id": "todo.shopping_list"})
        );
    }

    #[test]
    fn parses_handshake_frames() {
        assert!(matches!(
            ServerMessage::parse(AUTH_REQUIRED).unwrap(),
            ServerMessage::AuthRequired { .. }
        ));
        assert!(matches!(
            ServerMessage::parse(AUTH_OK).unwrap(),
            ServerMessage::AuthOk { .. }
        ));
        match ServerMessage::parse(AUTH_INVALID).unwrap() {
            ServerMessage::AuthInvalid { message } => {
                assert_eq!(message.as_deref(), Some("Invalid access token or password"))
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn parses_event_frames() {
        let frame = state_changed_frame(2, "sensor.x", json!({"state": "on"}));
        match ServerMessage::parse(&frame).unwrap() {
            ServerMessage::Event { id, event } => {
                assert_eq!(id, Some(2));
                assert_eq!(event.event_type, "state_changed");
                assert_eq!(event.data["entity_id"], "sensor.x");
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn parses_failed_results() {
        let frame = r#"{"id": 7, "type": "result", "success": false, "error": {"code": "not_found", "message": "Entity not found"}}"#;
        match ServerMessage::parse(frame).unwrap() {
            ServerMessage::Result {
                id, success, error, ..
            } => {
                assert_eq!(id, 7);
                assert!(!success);
                assert_eq!(error.unwrap().to_string(), "not_found: Entity not found");
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn unknown_types_parse_as_unknown() {
        let frame = r#"{"type": "pong", "id": 9}"#;
        assert!(matches!(
            ServerMessage::parse(frame).unwrap(),
            ServerMessage::Unknown
        ));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(ServerMessage::parse("{not json").is_err());
        assert!(ServerMessage::parse(r#"{"no_type": true}"#).is_err());
    }
}
