use std::collections::HashSet;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Local, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::{
    Author, Message, MessageId, MessageStore, Participant, Participants, DEFAULT_AVATAR,
};

/// Format version written into exported scripts
pub const SCRIPT_VERSION: &str = "1.0";

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid script: not a JSON object")]
    NotAnObject,
    #[error("invalid script: missing participants or messages")]
    MissingSection,
    #[error("invalid script: participant {0} is missing")]
    MissingParticipant(u8),
    #[error("invalid script: messages must be an array")]
    MessagesNotArray,
    #[error("invalid script: message id {0} is used more than once")]
    DuplicateId(MessageId),
    #[error("invalid script: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to access script file: {0}")]
    Io(#[from] std::io::Error),
}

/// A complete, shareable conversation script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptConfig {
    #[serde(default = "default_version")]
    pub version: String,
    /// RFC 3339 export time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub participants: Participants,
    pub messages: Vec<Message>,
}

fn default_version() -> String {
    SCRIPT_VERSION.to_string()
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl ScriptConfig {
    /// Snapshot the current participants and messages
    pub fn export(participants: &Participants, store: &MessageStore) -> Self {
        Self {
            version: SCRIPT_VERSION.to_string(),
            timestamp: Some(now_rfc3339()),
            participants: participants.clone(),
            messages: store.list().to_vec(),
        }
    }

    pub fn to_json_pretty(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a script, checking its overall shape before decoding.
    ///
    /// Nothing is returned unless the whole document is usable.
    pub fn import(json: &str) -> ConfigResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        let object = value.as_object().ok_or(ConfigError::NotAnObject)?;

        let (Some(participants), Some(messages)) =
            (object.get("participants"), object.get("messages"))
        else {
            return Err(ConfigError::MissingSection);
        };
        for key in [1u8, 2] {
            if participants.get(key.to_string()).is_none() {
                return Err(ConfigError::MissingParticipant(key));
            }
        }
        if !messages.is_array() {
            return Err(ConfigError::MessagesNotArray);
        }

        let config: ScriptConfig = serde_json::from_value(value)?;
        let mut seen = HashSet::new();
        if let Some(dup) = config.messages.iter().find(|m| !seen.insert(m.id)) {
            return Err(ConfigError::DuplicateId(dup.id));
        }
        debug!(
            "Imported script v{} with {} messages",
            config.version,
            config.messages.len()
        );
        Ok(config)
    }

    /// Import, also returning the problems [`validate`] finds in the raw
    /// document before lenient decoding coerces them away
    pub fn import_checked(json: &str) -> ConfigResult<(Self, Vec<String>)> {
        let problems = validate(&serde_json::from_str(json)?);
        Ok((Self::import(json)?, problems))
    }

    pub fn load(path: &Path) -> ConfigResult<Self> {
        let contents = fs::read_to_string(path)?;
        Self::import(&contents)
    }

    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json_pretty()?)?;
        info!("Saved script with {} messages to {}", self.messages.len(), path.display());
        Ok(())
    }

    pub fn store(&self) -> MessageStore {
        MessageStore::from_messages(self.messages.clone())
    }

    /// A small two-message example script
    pub fn sample() -> Self {
        let participants = Participants {
            local: Participant {
                name: "Local (right)".to_string(),
                avatar: DEFAULT_AVATAR.to_string(),
            },
            remote: Participant {
                name: "Example Contact".to_string(),
                avatar: DEFAULT_AVATAR.to_string(),
            },
        };
        Self {
            version: SCRIPT_VERSION.to_string(),
            timestamp: Some(now_rfc3339()),
            participants,
            messages: vec![
                Message::text(1, Author::Remote, "Hi, how are you?", 1000),
                Message::text(2, Author::Local, "Hi! Very well, thanks. And you?", 2000),
            ],
        }
    }
}

/// Suggested file name for saving a script exported at `at`
pub fn default_file_name(at: DateTime<Local>) -> String {
    format!("chat-script-{}.json", at.format("%Y-%m-%dT%H-%M"))
}

/// Collect human-readable problems with a raw script document.
///
/// Unlike [`ScriptConfig::import`] this never stops at the first problem.
pub fn validate(config: &Value) -> Vec<String> {
    let mut errors = Vec::new();

    if !config.get("version").is_some_and(is_truthy) {
        errors.push("missing configuration version".to_string());
    }

    let participant_count = config
        .get("participants")
        .and_then(Value::as_object)
        .map_or(0, |p| p.len());
    if participant_count < 2 {
        errors.push("participant configuration incomplete".to_string());
    }

    let messages = config.get("messages");
    if !messages.is_some_and(Value::is_array) {
        errors.push("messages must be an array".to_string());
    }

    let mut seen_ids = HashSet::new();
    for (index, msg) in messages
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .enumerate()
    {
        let n = index + 1;
        if let Some(id) = msg.get("id").and_then(Value::as_u64).filter(|id| *id > 0) {
            if !seen_ids.insert(id) {
                errors.push(format!("message {} has a duplicate id", n));
            }
        }
        let is_voice = msg.get("type").and_then(Value::as_str) == Some("voice");
        let has = |field: &str| msg.get(field).is_some_and(is_truthy);

        if !has("id") || !has("author") || (!is_voice && !has("text")) {
            errors.push(format!("message {} has incomplete data", n));
        }
        let author = msg.get("author").and_then(Value::as_u64);
        if !matches!(author, Some(1) | Some(2)) {
            errors.push(format!("message {} has an invalid author", n));
        }
    }

    errors
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
