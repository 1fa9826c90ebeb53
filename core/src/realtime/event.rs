//! Realtime wire frames
//!
//! Every frame is a JSON object with a mandatory `type` field.

use serde::{Deserialize, Serialize};

use crate::models::Message;

/// Inbound types this client understands
const KNOWN_TYPES: &[&str] = &[
    "new_message",
    "typing",
    "pong",
    "call_signal",
    "call_accepted",
    "call_rejected",
];

/// Events pushed by the server
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    NewMessage {
        message: Message,
    },

    Typing {
        user_id: String,
        conversation_id: String,
    },

    Pong,

    CallSignal {
        call_id: String,
        signal_type: String,
        #[serde(default)]
        signal_data: serde_json::Value,
        from_user_id: String,
    },

    CallAccepted {
        call_id: String,
        accepted_by: String,
    },

    CallRejected {
        call_id: String,
    },

    /// A well-formed frame of a type this client does not know
    #[serde(skip)]
    Unknown { kind: String, raw: String },
}

impl InboundEvent {
    /// Parse one text frame
    ///
    /// Frames of unknown type are passed through as [`InboundEvent::Unknown`].
    /// Non-JSON frames, frames without a string `type`, and known types with
    /// bad fields are errors.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct Header {
            #[serde(rename = "type")]
            kind: String,
        }

        let header: Header = serde_json::from_str(text)?;
        if !KNOWN_TYPES.contains(&header.kind.as_str()) {
            return Ok(Self::Unknown {
                kind: header.kind,
                raw: text.to_string(),
            });
        }
        serde_json::from_str(text)
    }

    /// The frame's `type` value
    pub fn kind(&self) -> &str {
        match self {
            Self::NewMessage { .. } => "new_message",
            Self::Typing { .. } => "typing",
            Self::Pong => "pong",
            Self::CallSignal { .. } => "call_signal",
            Self::CallAccepted { .. } => "call_accepted",
            Self::CallRejected { .. } => "call_rejected",
            Self::Unknown { kind, .. } => kind,
        }
    }
}

/// Frames sent by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Ping,
    Typing { conversation_id: String },
}

impl OutboundFrame {
    pub fn to_json(&self) -> String {
        // Unit and string-only variants always serialize
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_new_message() {
        let frame = r#"{"type":"new_message","message":{"id":"m1","conversation_id":"c1","sender_id":"u1","content":"ct"}}"#;
        match InboundEvent::parse(frame).unwrap() {
            InboundEvent::NewMessage { message } => {
                assert_eq!(message.id, "m1");
                assert_eq!(message.content, "ct");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_typing_and_pong() {
        let typing = InboundEvent::parse(
            r#"{"type":"typing","user_id":"u2","conversation_id":"c1"}"#,
        )
        .unwrap();
        assert_eq!(
            typing,
            InboundEvent::Typing {
                user_id: "u2".to_string(),
                conversation_id: "c1".to_string()
            }
        );
        assert_eq!(InboundEvent::parse(r#"{"type":"pong"}"#).unwrap(), InboundEvent::Pong);
    }

    #[test]
    fn test_parse_call_signal() {
        let event = InboundEvent::parse(
            r#"{"type":"call_signal","call_id":"k1","signal_type":"offer","signal_data":{"sdp":"x"},"from_user_id":"u3"}"#,
        )
        .unwrap();
        assert_eq!(event.kind(), "call_signal");
    }

    #[test]
    fn test_unknown_type_passes_through() {
        let frame = r#"{"type":"presence","user_id":"u9"}"#;
        let event = InboundEvent::parse(frame).unwrap();
        assert_eq!(
            event,
            InboundEvent::Unknown {
                kind: "presence".to_string(),
                raw: frame.to_string()
            }
        );
    }

    #[test]
    fn test_malformed_frames_are_errors() {
        assert!(InboundEvent::parse("not json").is_err());
        assert!(InboundEvent::parse("[1,2]").is_err());
        assert!(InboundEvent::parse(r#"{"user_id":"u1"}"#).is_err());
        assert!(InboundEvent::parse(r#"{"type":7}"#).is_err());
        assert!(InboundEvent::parse(r#"{"type":"typing","user_id":"u1"}"#).is_err());
    }

    #[test]
    fn test_outbound_frames() {
        assert_eq!(OutboundFrame::Ping.to_json(), r#"{"type":"ping"}"#);
        assert_eq!(
            OutboundFrame::Typing {
                conversation_id: "c1".to_string()
            }
            .to_json(),
            r#"{"type":"typing","conversation_id":"c1"}"#
        );
    }
}
