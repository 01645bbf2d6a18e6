//! The `{event, message, data}` envelope exchanged over the socket.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

/// An inbound structured message.
///
/// `message` falls back to the event name when the peer omits it (or sends `null`),
/// and `data` falls back to [`Value::Null`].
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub event: String,
    pub message: String,
    pub data: Value,
}

#[derive(Deserialize)]
struct RawEnvelope {
    event: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Value,
}

impl Envelope {
    /// Try to read `text` as an envelope.
    ///
    /// `None` means the frame is plain text: not JSON, not an object, or an object
    /// without a string `event` field.
    #[must_use]
    pub fn decode(text: &str) -> Option<Self> {
        let raw: RawEnvelope = serde_json::from_str(text).ok()?;
        let message = raw.message.unwrap_or_else(|| raw.event.clone());

        Some(Self {
            event: raw.event,
            message,
            data: raw.data,
        })
    }
}

/// Outbound counterpart of [`Envelope`], borrowing its parts.
#[derive(Serialize)]
pub(crate) struct OutboundEnvelope<'a, D: ?Sized> {
    pub(crate) event: &'a str,
    pub(crate) message: &'a str,
    pub(crate) data: &'a D,
}

/// Anything [`send`](super::ConnectionManager::send) accepts.
///
/// Text goes out verbatim, JSON values are encoded first.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Json(Value),
}

impl Payload {
    pub(crate) fn into_text(self) -> Result<String> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Json(value) => Ok(serde_json::to_string(&value)?),
        }
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decode_full_envelope() {
        let envelope = Envelope::decode(r#"{"event":"ping","data":1,"message":"hi"}"#).unwrap();

        assert_eq!(envelope.event, "ping");
        assert_eq!(envelope.message, "hi");
        assert_eq!(envelope.data, json!(1));
    }

    #[test]
    fn message_defaults_to_event_name() {
        let envelope = Envelope::decode(r#"{"event":"joined","message":null}"#).unwrap();

        assert_eq!(envelope.message, "joined");
        assert_eq!(envelope.data, Value::Null);
    }

    #[test]
    fn extra_keys_are_ignored() {
        let envelope = Envelope::decode(r#"{"event":"a","data":[1,2],"id":7}"#).unwrap();

        assert_eq!(envelope.data, json!([1, 2]));
    }

    #[test]
    fn non_envelopes_are_plain_text() {
        for text in [
            "not json",
            "",
            "42",
            r#""event""#,
            r#"[{"event":"a"}]"#,
            r#"{"data":1}"#,
            r#"{"event":5}"#,
            r#"{"event":"a","message":3}"#,
        ] {
            assert!(Envelope::decode(text).is_none(), "{text} should not decode");
        }
    }

    #[test]
    fn outbound_envelope_key_order() {
        let envelope = OutboundEnvelope {
            event: "ping",
            message: "hi",
            data: &json!({"n": 1}),
        };

        assert_eq!(
            serde_json::to_string(&envelope).unwrap(),
            r#"{"event":"ping","message":"hi","data":{"n":1}}"#
        );
    }

    #[test]
    fn payload_text_is_verbatim() {
        let payload = Payload::from(r#"{"already":"encoded"}"#);

        assert_eq!(
            payload.into_text().unwrap(),
            r#"{"already":"encoded"}"#
        );
    }
}
