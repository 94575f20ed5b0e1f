//! Wire model for the local socket protocol and the upstream API.
//!
//! Clients write a stream of JSON objects on the local socket; each object
//! decodes into a [`Message`]. The same shape is forwarded verbatim to the
//! upstream API, so one struct serves both directions. Unknown fields are
//! ignored on decode.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Hard cap on `context.tags`; anything longer is rejected with an error
/// envelope before dispatch.
pub const MAX_TAGS: usize = 10;

/// A single protocol message, local-socket and upstream wire shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Opaque payload. Absent for `msg_check` requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "MessageContext::is_empty")]
    pub context: MessageContext,
    /// Absent or unrecognized types are answered with an error envelope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_type: Option<MsgType>,
    #[serde(rename = "dest", default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// Client-supplied timestamp, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Per-message options supplied by the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageContext {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// When true, a publish is sent inline and the upstream reply is written
    /// back on the connection instead of being queued.
    #[serde(rename = "wait", default, skip_serializing_if = "std::ops::Not::not")]
    pub wait_response: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    /// Poll fetch limit. Only meaningful for `msg_check`.
    #[serde(default, skip_serializing_if = "Limit::is_absent")]
    pub limit: Limit,
}

impl MessageContext {
    pub(crate) fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Rejects contexts that exceed the tag cap.
    pub fn validate(&self) -> Result<(), ContextError> {
        if self.tags.len() > MAX_TAGS {
            return Err(ContextError::TooManyTags);
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("too many tags provided; maximum is 10")]
    TooManyTags,
}

/// The three request kinds, plus a catch-all so unrecognized strings reach
/// the handler (which answers with an error envelope) instead of failing the
/// whole decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MsgType {
    Publish,
    MsgCheck,
    DestPublish,
    #[serde(other)]
    Unknown,
}

/// The poll limit as it appears on the wire.
///
/// Clients send `limit` as arbitrary JSON, so the field is modelled as a sum:
/// missing, a usable integer, or present-but-not-an-integer. `Invalid` is
/// surfaced to the client as an error envelope rather than failing the decode
/// of the surrounding message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Limit {
    #[default]
    Absent,
    Int(i64),
    Invalid,
}

impl Limit {
    pub(crate) fn is_absent(&self) -> bool {
        matches!(self, Limit::Absent)
    }
}

impl<'de> Deserialize<'de> for Limit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match value {
            serde_json::Value::Null => Limit::Absent,
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Limit::Int(i),
                None => Limit::Invalid,
            },
            _ => Limit::Invalid,
        })
    }
}

impl Serialize for Limit {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Limit::Int(i) => serializer.serialize_i64(*i),
            Limit::Absent | Limit::Invalid => serializer.serialize_none(),
        }
    }
}

/// Reply envelope written back on the local socket for failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ResponseEnvelope {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(message.into()),
        }
    }

    /// The envelope as raw reply bytes for the socket.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(json: &str) -> Message {
        serde_json::from_str(json).expect("valid message")
    }

    #[test]
    fn decodes_a_full_publish() {
        let msg = decode(
            r#"{"data":"hello","context":{"tags":["a","b"],"wait":true,"entity":"e1"},
                "msg_type":"publish","dest":"other","timestamp":"2024-01-01T00:00:00Z"}"#,
        );
        assert_eq!(msg.data.as_deref(), Some("hello"));
        assert_eq!(msg.context.tags, vec!["a", "b"]);
        assert!(msg.context.wait_response);
        assert_eq!(msg.context.entity.as_deref(), Some("e1"));
        assert_eq!(msg.msg_type, Some(MsgType::Publish));
        assert_eq!(msg.destination.as_deref(), Some("other"));
        assert_eq!(msg.timestamp.as_deref(), Some("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn decodes_a_bare_msg_check() {
        let msg = decode(r#"{"msg_type":"msg_check"}"#);
        assert_eq!(msg.msg_type, Some(MsgType::MsgCheck));
        assert_eq!(msg.data, None);
        assert_eq!(msg.context, MessageContext::default());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let msg = decode(r#"{"msg_type":"publish","data":"x","flavor":"grape","v":2}"#);
        assert_eq!(msg.msg_type, Some(MsgType::Publish));
        assert_eq!(msg.data.as_deref(), Some("x"));
    }

    #[test]
    fn unrecognized_msg_type_decodes_as_unknown() {
        let msg = decode(r#"{"msg_type":"subscribe"}"#);
        assert_eq!(msg.msg_type, Some(MsgType::Unknown));
    }

    #[test]
    fn absent_msg_type_decodes_as_none() {
        let msg = decode(r#"{"data":"x"}"#);
        assert_eq!(msg.msg_type, None);
    }

    #[test]
    fn limit_variants_decode_from_arbitrary_json() {
        assert_eq!(decode(r#"{"context":{"limit":5}}"#).context.limit, Limit::Int(5));
        assert_eq!(decode(r#"{"context":{}}"#).context.limit, Limit::Absent);
        assert_eq!(decode(r#"{"context":{"limit":null}}"#).context.limit, Limit::Absent);
        assert_eq!(
            decode(r#"{"context":{"limit":"ten"}}"#).context.limit,
            Limit::Invalid
        );
        assert_eq!(
            decode(r#"{"context":{"limit":2.5}}"#).context.limit,
            Limit::Invalid
        );
        assert_eq!(
            decode(r#"{"context":{"limit":[1]}}"#).context.limit,
            Limit::Invalid
        );
    }

    #[test]
    fn encode_decode_round_trip_preserves_all_fields() {
        let original = Message {
            data: Some("payload".to_string()),
            context: MessageContext {
                tags: vec!["t1".to_string(), "t2".to_string()],
                wait_response: true,
                entity: Some("sensor-1".to_string()),
                limit: Limit::Int(3),
            },
            msg_type: Some(MsgType::DestPublish),
            destination: Some("elsewhere".to_string()),
            timestamp: Some("2024-06-01T12:00:00Z".to_string()),
        };

        let encoded = serde_json::to_string(&original).expect("encode");
        let decoded: Message = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, original);
    }

    #[test]
    fn round_trip_of_a_minimal_message() {
        let original = Message {
            msg_type: Some(MsgType::Publish),
            ..Default::default()
        };
        let encoded = serde_json::to_string(&original).expect("encode");
        assert_eq!(encoded, r#"{"msg_type":"publish"}"#);
        let decoded: Message = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, original);
    }

    #[test]
    fn validate_accepts_up_to_ten_tags() {
        let ctx = MessageContext {
            tags: (0..10).map(|i| format!("t{i}")).collect(),
            ..Default::default()
        };
        assert!(ctx.validate().is_ok());
    }

    #[test]
    fn validate_rejects_eleven_tags() {
        let ctx = MessageContext {
            tags: (0..11).map(|i| format!("t{i}")).collect(),
            ..Default::default()
        };
        assert_eq!(ctx.validate(), Err(ContextError::TooManyTags));
        assert_eq!(
            ContextError::TooManyTags.to_string(),
            "too many tags provided; maximum is 10"
        );
    }

    #[test]
    fn error_envelope_shape_on_the_wire() {
        let bytes = ResponseEnvelope::error("boom").to_bytes();
        assert_eq!(
            String::from_utf8(bytes).expect("utf8"),
            r#"{"status":"error","message":"boom"}"#
        );
    }
}
