use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Stable identifier of a scripted message
pub type MessageId = u64;

/// Default pacing for freshly authored messages, in milliseconds
pub const DEFAULT_DELAY_MS: u64 = 2000;

/// Which side of the conversation produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Author {
    /// The simulated "self" (participant 1, right-hand bubbles)
    #[default]
    Local,
    /// The simulated contact (participant 2, left-hand bubbles)
    Remote,
}

impl Author {
    /// Wire number used by script files
    pub fn number(self) -> u8 {
        match self {
            Author::Local => 1,
            Author::Remote => 2,
        }
    }

    /// Coerce a loosely typed value into an author.
    ///
    /// Anything that isn't recognisably participant 2 is treated as Local.
    pub fn coerce(value: &Value) -> Self {
        match value {
            Value::Number(n) if n.as_f64() == Some(2.0) => Author::Remote,
            Value::String(s) => Self::parse(s),
            _ => Author::Local,
        }
    }

    /// Parse a textual author ("2", "remote", "contact", ...)
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "2" | "remote" | "contact" => Author::Remote,
            _ => Author::Local,
        }
    }
}

impl Serialize for Author {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.number())
    }
}

impl<'de> Deserialize<'de> for Author {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Author::coerce(&value))
    }
}

/// Message payload type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageKind {
    #[default]
    Text,
    Voice,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Voice => "voice",
        }
    }

    /// Unknown kinds fall back to text
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("voice") {
            MessageKind::Voice
        } else {
            MessageKind::Text
        }
    }
}

impl Serialize for MessageKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(value.as_str().map(MessageKind::parse).unwrap_or_default())
    }
}

/// A single scripted chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,

    #[serde(default)]
    pub author: Author,

    #[serde(rename = "type", default)]
    pub kind: MessageKind,

    #[serde(default)]
    pub text: String,

    /// Requested pacing in milliseconds
    #[serde(default = "default_delay", deserialize_with = "deserialize_delay")]
    pub delay: u64,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_reply"
    )]
    pub reply_to_id: Option<MessageId>,

    /// Voice payload as a Data URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_data: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_file_name: Option<String>,

    /// Voice length in whole seconds, 0 when unknown
    #[serde(rename = "duration", default, deserialize_with = "deserialize_seconds")]
    pub duration_seconds: u32,
}

impl Message {
    /// Create a message with type-appropriate defaults
    pub fn new(id: MessageId, kind: MessageKind) -> Self {
        Self {
            id,
            author: Author::Local,
            kind,
            text: String::new(),
            delay: DEFAULT_DELAY_MS,
            reply_to_id: None,
            audio_data: None,
            audio_file_name: None,
            duration_seconds: 0,
        }
    }

    pub fn text(id: MessageId, author: Author, text: &str, delay: u64) -> Self {
        Self {
            author,
            text: text.to_string(),
            delay,
            ..Self::new(id, MessageKind::Text)
        }
    }

    pub fn voice(id: MessageId, author: Author, delay: u64) -> Self {
        Self {
            author,
            delay,
            ..Self::new(id, MessageKind::Voice)
        }
    }

    pub fn is_voice(&self) -> bool {
        self.kind == MessageKind::Voice
    }

    pub fn has_audio(&self) -> bool {
        self.audio_data.is_some()
    }

    /// Whether playback should wait for the recording to finish
    pub fn has_playable_audio(&self) -> bool {
        self.is_voice() && self.has_audio() && self.duration_seconds > 0
    }
}

fn default_delay() -> u64 {
    DEFAULT_DELAY_MS
}

/// Accept integers, floats, numeric strings; clamp negatives to zero
pub(crate) fn coerce_non_negative(value: &Value) -> Option<u64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if n.is_finite() {
        Some(n.max(0.0) as u64)
    } else {
        None
    }
}

fn deserialize_delay<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_non_negative(&value).unwrap_or(DEFAULT_DELAY_MS))
}

fn deserialize_reply<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<MessageId>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_non_negative(&value).filter(|id| *id > 0))
}

fn deserialize_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_non_negative(&value)
        .map(|secs| secs.min(u32::MAX as u64) as u32)
        .unwrap_or(0))
}
