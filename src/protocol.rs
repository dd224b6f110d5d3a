use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fixed Secomat cloud endpoint, used for both state reads and commands
pub const API_URL: &str = "https://seco.krueger.ch:8080/app1/v1/plc";

/// User agent sent with every request
pub const USER_AGENT: &str = "Secomat/1.0.3 HA-Integration";

/// Header carrying the claim token
pub const CLAIM_TOKEN_HEADER: &str = "claim-token";

/// API version marker header and its value
pub const API_VERSION_HEADER: &str = "api";
pub const API_VERSION: &str = "1";

/// Envelope type tag of a state response
const STATE_TYPE: &str = "STATE";

/// Status value of an accepted command
const STATUS_OK: &str = "OK";

/// Command names accepted by the Secomat cloud API
pub mod command {
    /// Turn the dryer off
    pub const OFF: &str = "OFF";
    /// Automatic laundry drying program
    pub const WASH_AUTO: &str = "PRG_WASH_AUTO";
    /// Timed laundry drying program (arguments undocumented)
    pub const WASH_TIMER: &str = "PRG_WASH_TIMER";
    /// Enable room drying
    pub const ROOM_ON: &str = "PRG_ROOM_ON";
    /// Disable room drying
    pub const ROOM_OFF: &str = "PRG_ROOM_OFF";
    /// Set the target humidity level, argument `level`
    pub const SET_TARGET_HUMIDITY: &str = "SET_TARGET_HUMIDITY";
}

/// Command request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl CommandRequest {
    /// Create a command without arguments
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Map::new(),
        }
    }

    /// Set the command arguments
    pub fn with_args(mut self, args: Map<String, Value>) -> Self {
        self.args = args;
        self
    }
}

/// Command response body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandResponse {
    #[serde(default)]
    pub status: Option<String>,
}

impl CommandResponse {
    /// Decode a command response; bodies without a string `status` are not accepted
    pub fn from_value(value: &Value) -> Self {
        Self {
            status: value
                .get("status")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        }
    }

    /// Whether the API accepted the command
    pub fn is_ok(&self) -> bool {
        self.status.as_deref() == Some(STATUS_OK)
    }
}

/// Unwrap a state response body
///
/// Bodies shaped `{"type": "STATE", "payload": {...}}` yield the payload;
/// anything else is returned unchanged.
pub fn unwrap_state(body: Value) -> Value {
    let is_envelope = body.get("type").and_then(|v| v.as_str()) == Some(STATE_TYPE);
    if !is_envelope {
        return body;
    }

    match body {
        Value::Object(mut obj) => obj
            .remove("payload")
            .unwrap_or_else(|| Value::Object(Map::new())),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_state_envelope() {
        let body = json!({"type": "STATE", "payload": {"serial_number": "SN1", "humidity": 55}});
        assert_eq!(
            unwrap_state(body),
            json!({"serial_number": "SN1", "humidity": 55})
        );
    }

    #[test]
    fn test_unwrap_state_bare_body() {
        let body = json!({"serial_number": "SN1", "type": "OTHER"});
        assert_eq!(unwrap_state(body.clone()), body);
    }

    #[test]
    fn test_unwrap_state_envelope_without_payload() {
        assert_eq!(unwrap_state(json!({"type": "STATE"})), json!({}));
    }

    #[test]
    fn test_command_request_serialization() {
        let mut args = Map::new();
        args.insert("level".into(), json!(2));
        let request = CommandRequest::new(command::SET_TARGET_HUMIDITY).with_args(args);

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"command": "SET_TARGET_HUMIDITY", "args": {"level": 2}})
        );
        assert_eq!(
            serde_json::to_value(CommandRequest::new(command::OFF)).unwrap(),
            json!({"command": "OFF", "args": {}})
        );
    }

    #[test]
    fn test_command_response_status() {
        assert!(CommandResponse::from_value(&json!({"status": "OK"})).is_ok());
        assert!(!CommandResponse::from_value(&json!({"status": "REJECTED"})).is_ok());
        assert!(!CommandResponse::from_value(&json!({"result": "OK"})).is_ok());
        assert!(!CommandResponse::from_value(&json!([1, 2])).is_ok());
    }
}
