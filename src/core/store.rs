use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::warn;

use crate::core::message::coerce_non_negative;
use crate::core::{Author, Message, MessageId, MessageKind};

/// Store shared between the editing side and the playback engine
pub type SharedStore = Arc<RwLock<MessageStore>>;

/// A single field change applied to a stored message
#[derive(Debug, Clone, PartialEq)]
pub enum MessageUpdate {
    Author(Author),
    Kind(MessageKind),
    Text(String),
    Delay(u64),
    ReplyTo(Option<MessageId>),
    Duration(u32),
    Audio {
        data: Option<String>,
        file_name: Option<String>,
    },
}

impl MessageUpdate {
    /// Build an update from a form-style field name and loosely typed value.
    ///
    /// Returns `None` for unknown fields.
    pub fn from_field(field: &str, value: &Value) -> Option<Self> {
        let update = match field {
            "author" => MessageUpdate::Author(Author::coerce(value)),
            "type" | "kind" => {
                MessageUpdate::Kind(value.as_str().map(MessageKind::parse).unwrap_or_default())
            }
            "text" => MessageUpdate::Text(match value {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            }),
            "delay" => MessageUpdate::Delay(coerce_non_negative(value)?),
            "replyToId" | "reply_to_id" => {
                MessageUpdate::ReplyTo(coerce_non_negative(value).filter(|id| *id > 0))
            }
            "duration" => MessageUpdate::Duration(
                coerce_non_negative(value)
                    .map(|secs| secs.min(u32::MAX as u64) as u32)
                    .unwrap_or(0),
            ),
            _ => return None,
        };
        Some(update)
    }

    fn apply(self, message: &mut Message) {
        match self {
            MessageUpdate::Author(author) => message.author = author,
            MessageUpdate::Kind(kind) => message.kind = kind,
            MessageUpdate::Text(text) => message.text = text,
            MessageUpdate::Delay(delay) => message.delay = delay,
            MessageUpdate::ReplyTo(reply) => message.reply_to_id = reply,
            MessageUpdate::Duration(secs) => message.duration_seconds = secs,
            MessageUpdate::Audio { data, file_name } => {
                message.audio_data = data;
                message.audio_file_name = file_name;
            }
        }
    }
}

/// Ordered list of scripted messages
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store; repeated ids are renumbered so every id is unique
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            messages: with_unique_ids(messages),
        }
    }

    /// Wrap into the shared handle used by the engine
    pub fn shared(self) -> SharedStore {
        Arc::new(RwLock::new(self))
    }

    /// The built-in demo conversation
    pub fn with_default_messages() -> Self {
        Self::from_messages(vec![
            Message::text(1, Author::Remote, "Good morning", 1000),
            Message::text(
                2,
                Author::Local,
                "Hi! Thanks for reaching out 👋\nWe're open Monday to Friday, 9:00 to 17:00.\nLeave your question and we'll get back to you shortly.",
                2000,
            ),
            Message::text(3, Author::Remote, "Can I ask you something?", 3000),
            Message::text(
                4,
                Author::Local,
                "Of course! Here's our website: https://www.rust-lang.org/",
                2000,
            ),
        ])
    }

    fn next_id(&self) -> MessageId {
        free_id(&self.messages.iter().map(|m| m.id).collect())
    }

    /// Append a new message with defaults for its kind
    pub fn add(&mut self, kind: MessageKind) -> Message {
        let message = Message::new(self.next_id(), kind);
        self.messages.push(message.clone());
        message
    }

    /// Apply a change to the message with `id`; unknown ids are ignored
    pub fn update(&mut self, id: MessageId, update: MessageUpdate) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                update.apply(message);
                true
            }
            None => false,
        }
    }

    pub fn delete(&mut self, id: MessageId) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != id);
        self.messages.len() != before
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn list(&self) -> &[Message] {
        &self.messages
    }

    /// Ordered ids, as snapshotted by the engine at the start of a run
    pub fn ids(&self) -> Vec<MessageId> {
        self.messages.iter().map(|m| m.id).collect()
    }

    pub fn replace_all(&mut self, messages: Vec<Message>) {
        self.messages = with_unique_ids(messages);
    }
}

/// `max + 1`, or the lowest unused id once the id space is exhausted
fn free_id(used: &HashSet<MessageId>) -> MessageId {
    let max = used.iter().copied().max().unwrap_or(0);
    match max.checked_add(1) {
        Some(id) => id,
        None => (1..).find(|id| !used.contains(id)).unwrap_or(0),
    }
}

fn with_unique_ids(mut messages: Vec<Message>) -> Vec<Message> {
    let mut used: HashSet<MessageId> = messages.iter().map(|m| m.id).collect();
    if used.len() == messages.len() {
        return messages;
    }

    let mut seen = HashSet::new();
    for message in &mut messages {
        if !seen.insert(message.id) {
            let id = free_id(&used);
            warn!("Duplicate message id {} renumbered to {}", message.id, id);
            message.id = id;
            used.insert(id);
            seen.insert(id);
        }
    }
    messages
}
