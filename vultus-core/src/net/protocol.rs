//! Wire messages exchanged with the voice-character service.
//!
//! Text frames are JSON tagged by `messageType` with a `content` payload;
//! binary frames are raw PCM16 and never appear here.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, VultusError};

/// Inbound control message.
///
/// Unrecognised `messageType` values deserialise as [`Unknown`] so a
/// server rollout with new message kinds never breaks the client.
///
/// [`Unknown`]: ServerMessage::Unknown
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "messageType", content = "content")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// Handshake complete; uplink may start.
    ServerReady,
    /// Chunk of the avatar's reply text.
    Subtitle { text: String },
    /// Streaming recognition of the user's speech.
    UserSubtitleChunk { text: String },
    /// Final recognition of the user's utterance.
    UserSubtitleComplete { text: String },
    /// The avatar finished responding.
    TurnComplete,
    /// Emotion the avatar should express, by name.
    Emotion { emotion: String },
    /// The user barged in; stop current playback.
    Interrupted,
    /// Server-side failure report.
    Error { message: String },
    /// Any message type this client does not know.
    Unknown,
}

impl ServerMessage {
    /// Parse one inbound text frame.
    ///
    /// # Errors
    /// Returns `VultusError::MalformedMessage` when the frame is not a
    /// valid message envelope.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| VultusError::MalformedMessage(e.to_string()))
    }
}

/// Envelope for incoming frames before the type tag is resolved.
///
/// Deserialisation is hand-rolled because an adjacently tagged
/// `#[serde(other)]` variant rejects unknown tags that still carry a
/// `content` payload.
#[derive(Deserialize)]
struct RawMessage {
    #[serde(rename = "messageType")]
    message_type: String,
    #[serde(default)]
    content: Value,
}

impl<'de> Deserialize<'de> for ServerMessage {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawMessage::deserialize(deserializer)?;
        let text_field = |key: &'static str| -> std::result::Result<String, D::Error> {
            raw.content
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_owned)
                .ok_or_else(|| de::Error::missing_field(key))
        };
        Ok(match raw.message_type.as_str() {
            "SERVER_READY" => ServerMessage::ServerReady,
            "SUBTITLE" => ServerMessage::Subtitle {
                text: text_field("text")?,
            },
            "USER_SUBTITLE_CHUNK" => ServerMessage::UserSubtitleChunk {
                text: text_field("text")?,
            },
            "USER_SUBTITLE_COMPLETE" => ServerMessage::UserSubtitleComplete {
                text: text_field("text")?,
            },
            "TURN_COMPLETE" => ServerMessage::TurnComplete,
            "EMOTION" => ServerMessage::Emotion {
                emotion: text_field("emotion")?,
            },
            "INTERRUPTED" => ServerMessage::Interrupted,
            "ERROR" => ServerMessage::Error {
                message: text_field("message")?,
            },
            _ => ServerMessage::Unknown,
        })
    }
}

/// Outbound control message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "messageType", content = "content")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Typed chat input.
    TextMessage { text: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_message_serialises_to_wire_shape() {
        let msg = ClientMessage::TextMessage {
            text: "hello there".into(),
        };
        let json = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "messageType": "TEXT_MESSAGE",
                "content": { "text": "hello there" }
            })
        );
    }

    #[test]
    fn emotion_message_parses() {
        let msg: ServerMessage = serde_json::from_str(
            r#"{"messageType":"EMOTION","content":{"emotion":"happy"}}"#,
        )
        .expect("parse");
        assert_eq!(
            msg,
            ServerMessage::Emotion {
                emotion: "happy".into()
            }
        );
    }

    #[test]
    fn unit_messages_parse_without_content() {
        let ready: ServerMessage =
            serde_json::from_str(r#"{"messageType":"SERVER_READY"}"#).expect("parse");
        assert_eq!(ready, ServerMessage::ServerReady);

        let done: ServerMessage =
            serde_json::from_str(r#"{"messageType":"TURN_COMPLETE"}"#).expect("parse");
        assert_eq!(done, ServerMessage::TurnComplete);

        let stop: ServerMessage =
            serde_json::from_str(r#"{"messageType":"INTERRUPTED"}"#).expect("parse");
        assert_eq!(stop, ServerMessage::Interrupted);
    }

    #[test]
    fn subtitle_messages_carry_text() {
        let chunk: ServerMessage = serde_json::from_str(
            r#"{"messageType":"USER_SUBTITLE_CHUNK","content":{"text":"hel"}}"#,
        )
        .expect("parse");
        assert_eq!(
            chunk,
            ServerMessage::UserSubtitleChunk { text: "hel".into() }
        );

        let complete: ServerMessage = serde_json::from_str(
            r#"{"messageType":"USER_SUBTITLE_COMPLETE","content":{"text":"hello"}}"#,
        )
        .expect("parse");
        assert_eq!(
            complete,
            ServerMessage::UserSubtitleComplete {
                text: "hello".into()
            }
        );
    }

    #[test]
    fn unknown_message_type_is_tolerated() {
        let msg: ServerMessage = serde_json::from_str(
            r#"{"messageType":"FUTURE_FEATURE","content":{"x":1}}"#,
        )
        .expect("parse");
        assert_eq!(msg, ServerMessage::Unknown);

        let bare: ServerMessage =
            serde_json::from_str(r#"{"messageType":"FUTURE_FEATURE"}"#).expect("parse");
        assert_eq!(bare, ServerMessage::Unknown);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            ServerMessage::parse("{not json"),
            Err(VultusError::MalformedMessage(_))
        ));
        assert!(serde_json::from_str::<ServerMessage>(r#"{"foo":"bar"}"#).is_err());
        // Known type with the payload missing is malformed, not Unknown.
        assert!(
            serde_json::from_str::<ServerMessage>(r#"{"messageType":"EMOTION","content":{}}"#)
                .is_err()
        );
    }
}
