//! Envelope codec: the generic `{type, data, version}` wire shape.
//!
//! The codec is a pure transform. It never validates the shape of `data`;
//! that belongs to the factory on decode and to the caller's validation
//! before encode.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::value::{JsonObject, deep_eq_objects};

/// Format version stamped on every envelope.
pub const ENVELOPE_VERSION: &str = "1.0";

pub const TYPE_KEY: &str = "type";
pub const DATA_KEY: &str = "data";
pub const VERSION_KEY: &str = "version";

/// Wire unit carrying one typed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: JsonObject,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    ENVELOPE_VERSION.to_owned()
}

impl Envelope {
    /// Wrap `data` under `event_type`, stamping the current format version.
    pub fn encode(event_type: impl Into<String>, data: JsonObject) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            version: default_version(),
        }
    }

    /// True when `payload` has a string `type` and a `data` key.
    pub fn is_envelope(payload: &JsonObject) -> bool {
        Self::parts(payload).is_some()
    }

    /// The `type` of a recognized envelope, without touching `data`.
    pub fn peek_type(payload: &JsonObject) -> Option<&str> {
        Self::parts(payload).map(|(event_type, _)| event_type)
    }

    /// Borrowed `(type, data)` of a recognized envelope. `data` may hold any
    /// JSON value; judging its shape is left to the decoder.
    pub fn parts(payload: &JsonObject) -> Option<(&str, &Value)> {
        let event_type = payload.get(TYPE_KEY)?.as_str()?;
        let data = payload.get(DATA_KEY)?;
        Some((event_type, data))
    }

    /// As [`parts`](Self::parts), additionally requiring an object `data`.
    pub fn view(payload: &JsonObject) -> Option<(&str, &JsonObject)> {
        let (event_type, data) = Self::parts(payload)?;
        Some((event_type, data.as_object()?))
    }

    /// Decode a raw payload. Returns `None` when it is not an envelope or
    /// its `data` is not an object.
    ///
    /// A missing or non-string `version` defaults to [`ENVELOPE_VERSION`].
    pub fn decode(payload: &JsonObject) -> Option<Self> {
        let (event_type, data) = Self::view(payload)?;
        let version = payload
            .get(VERSION_KEY)
            .and_then(Value::as_str)
            .map_or_else(default_version, str::to_owned);
        Some(Self {
            event_type: event_type.to_owned(),
            data: data.clone(),
            version,
        })
    }

    /// Raw payload form, ready to hand to a node.
    pub fn into_payload(self) -> JsonObject {
        let mut payload = JsonObject::new();
        payload.insert(TYPE_KEY.to_owned(), Value::String(self.event_type));
        payload.insert(DATA_KEY.to_owned(), Value::Object(self.data));
        payload.insert(VERSION_KEY.to_owned(), Value::String(self.version));
        payload
    }
}

impl PartialEq for Envelope {
    fn eq(&self, other: &Self) -> bool {
        self.event_type == other.event_type
            && self.version == other.version
            && deep_eq_objects(&self.data, &other.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn encode_stamps_version() {
        let envelope = Envelope::encode("order_created", object(json!({"orderId": "o1"})));
        assert_eq!(envelope.version, "1.0");
        let payload = envelope.into_payload();
        assert_eq!(
            Value::Object(payload),
            json!({"type": "order_created", "data": {"orderId": "o1"}, "version": "1.0"})
        );
    }

    #[test]
    fn decode_preserves_type_and_data() {
        let data = object(json!({"nested": {"list": [1, "two", null]}, "flag": true}));
        let payload = Envelope::encode("user_event", data.clone()).into_payload();
        let decoded = Envelope::decode(&payload).unwrap();
        assert_eq!(decoded.event_type, "user_event");
        assert_eq!(decoded.data, data);
    }

    #[test]
    fn decode_defaults_missing_version() {
        let payload = object(json!({"type": "legacy", "data": {}}));
        let decoded = Envelope::decode(&payload).unwrap();
        assert_eq!(decoded.version, ENVELOPE_VERSION);
    }

    #[test]
    fn decode_keeps_producer_version() {
        let payload = object(json!({"type": "t", "data": {}, "version": "2.0"}));
        assert_eq!(Envelope::decode(&payload).unwrap().version, "2.0");
    }

    #[test]
    fn non_envelopes_are_not_recognized() {
        assert!(!Envelope::is_envelope(&object(json!({"data": {}}))));
        assert!(!Envelope::is_envelope(&object(json!({"type": "t"}))));
        assert!(!Envelope::is_envelope(&object(json!({"type": 7, "data": {}}))));
        assert!(Envelope::decode(&object(json!({"hello": "world"}))).is_none());
    }

    #[test]
    fn non_object_data_is_still_an_envelope() {
        let payload = object(json!({"type": "t", "data": [1]}));
        assert!(Envelope::is_envelope(&payload));
        assert_eq!(Envelope::peek_type(&payload), Some("t"));
        assert_eq!(Envelope::parts(&payload).map(|(_, data)| data), Some(&json!([1])));
        assert!(Envelope::view(&payload).is_none());
        assert!(Envelope::decode(&payload).is_none());
    }

    #[test]
    fn serde_form_matches_wire_shape() {
        let envelope: Envelope =
            serde_json::from_value(json!({"type": "t", "data": {"a": 1}})).unwrap();
        assert_eq!(envelope.version, "1.0");
        let back = serde_json::to_value(&envelope).unwrap();
        assert_eq!(back, json!({"type": "t", "data": {"a": 1}, "version": "1.0"}));
    }
}
