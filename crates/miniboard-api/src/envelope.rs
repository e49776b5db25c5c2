//! The tagged message unit exchanged over the shared connection.
//!
//! Every frame in either direction is a JSON object carrying a
//! `handlerKey` string plus whatever fields that handler defines:
//!
//! ```json
//! { "handlerKey": "manage", "action": "load", "_id": "*" }
//! ```
//!
//! The key is hoisted into [`Envelope::handler_key`]; everything else is kept
//! verbatim in [`Envelope::payload`] so nothing the host sends is dropped.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

/// Wire name of the routing field.
pub const HANDLER_KEY_FIELD: &str = "handlerKey";

/// A parsed frame: routing key plus handler-defined payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "handlerKey")]
    pub handler_key: String,

    /// All remaining fields of the frame.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Envelope {
    /// Build an outbound envelope for `handler_key` from any serializable
    /// payload. The payload must serialize to a JSON object; a
    /// `handlerKey` field already present in it is overwritten.
    pub fn tagged<T: Serialize + ?Sized>(handler_key: &str, payload: &T) -> Result<Self, Error> {
        let value = serde_json::to_value(payload).map_err(|e| Error::InvalidPayload(e.to_string()))?;
        let Value::Object(mut payload) = value else {
            return Err(Error::InvalidPayload(format!(
                "expected a JSON object, got {value}"
            )));
        };
        payload.remove(HANDLER_KEY_FIELD);

        Ok(Self {
            handler_key: handler_key.to_owned(),
            payload,
        })
    }

    /// Parse a text frame. A missing or non-string `handlerKey` is a parse
    /// failure like any other malformed JSON.
    pub fn parse(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: text.to_owned(),
        })
    }

    /// Serialize to the wire form (`handlerKey` included).
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|e| Error::InvalidPayload(e.to_string()))
    }

    /// Shortcut for the `action` field most handlers switch on.
    pub fn action(&self) -> Option<&str> {
        self.payload.get("action").and_then(Value::as_str)
    }

    /// Look up a payload field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.payload.get(field)
    }

    /// Decode the payload (without the key) into a handler's message type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_value(Value::Object(self.payload.clone())).map_err(|e| {
            Error::Deserialization {
                message: e.to_string(),
                body: Value::Object(self.payload.clone()).to_string(),
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parse_hoists_handler_key() {
        let env =
            Envelope::parse(r#"{"handlerKey":"manage","action":"delete","_id":"x"}"#).unwrap();
        assert_eq!(env.handler_key, "manage");
        assert_eq!(env.action(), Some("delete"));
        assert_eq!(env.get("_id"), Some(&json!("x")));
        assert!(env.get("handlerKey").is_none());
    }

    #[test]
    fn parse_rejects_missing_key() {
        let err = Envelope::parse(r#"{"action":"load"}"#).unwrap_err();
        assert!(err.is_frame_error());
    }

    #[test]
    fn parse_rejects_non_string_key() {
        assert!(Envelope::parse(r#"{"handlerKey": 3}"#).is_err());
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = Envelope::parse("not json at all").unwrap_err();
        match err {
            Error::Deserialization { body, .. } => assert_eq!(body, "not json at all"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn tagged_injects_key_and_overrides_manual_one() {
        let env = Envelope::tagged(
            "system-usage",
            &json!({"detailed": false, "handlerKey": "spoofed"}),
        )
        .unwrap();
        assert_eq!(env.handler_key, "system-usage");

        let wire: Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();
        assert_eq!(wire, json!({"handlerKey": "system-usage", "detailed": false}));
    }

    #[test]
    fn tagged_rejects_non_objects() {
        assert!(matches!(
            Envelope::tagged("echo", &json!(["a", "b"])),
            Err(Error::InvalidPayload(_))
        ));
        assert!(Envelope::tagged("echo", &"plain string").is_err());
    }

    #[test]
    fn decode_into_typed_payload() {
        #[derive(Deserialize)]
        struct Usage {
            #[serde(rename = "CPU")]
            cpu: f64,
            #[serde(rename = "MEM")]
            mem: f64,
        }

        let env = Envelope::parse(r#"{"handlerKey":"system-usage","CPU":12.5,"MEM":40.0}"#)
            .unwrap();
        let usage: Usage = env.decode().unwrap();
        assert!((usage.cpu - 12.5).abs() < f64::EPSILON);
        assert!((usage.mem - 40.0).abs() < f64::EPSILON);
    }
}
