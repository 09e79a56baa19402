//! Editing and playback behind one handle.

use serde_json::Value;
use tracing::info;

use crate::audio::{self, AudioResult};
use crate::config::ScriptConfig;
use crate::core::{
    Author, Message, MessageId, MessageKind, MessageUpdate, Participants, SharedStore,
};
use crate::playback::{PlaybackState, TimelineEngine};
use crate::presentation::GatewayResult;

/// Owns the participants and drives the engine over a shared store
pub struct Simulator {
    participants: Participants,
    engine: TimelineEngine,
}

impl Simulator {
    pub fn new(participants: Participants, engine: TimelineEngine) -> Self {
        Self {
            participants,
            engine,
        }
    }

    pub fn participants(&self) -> &Participants {
        &self.participants
    }

    pub fn set_participant_name(&mut self, author: Author, name: &str) {
        self.participants.get_mut(author).name = name.to_string();
        self.engine.gateway().participants_changed(&self.participants);
    }

    pub fn engine(&self) -> &TimelineEngine {
        &self.engine
    }

    fn store(&self) -> &SharedStore {
        self.engine.store()
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.store().read().await.list().to_vec()
    }

    pub async fn add_message(&self, kind: MessageKind) -> Message {
        self.store().write().await.add(kind)
    }

    pub async fn update_message(&self, id: MessageId, update: MessageUpdate) -> bool {
        self.store().write().await.update(id, update)
    }

    /// Form-style edit; unknown fields are ignored
    pub async fn update_field(&self, id: MessageId, field: &str, value: &Value) -> bool {
        match MessageUpdate::from_field(field, value) {
            Some(update) => self.update_message(id, update).await,
            None => false,
        }
    }

    /// Delete a message, halting any run in progress
    pub async fn delete_message(&self, id: MessageId) -> bool {
        let deleted = self.store().write().await.delete(id);
        if deleted && self.engine.is_running().await {
            self.engine.stop().await;
        }
        deleted
    }

    pub async fn attach_audio(
        &self,
        id: MessageId,
        bytes: &[u8],
        file_name: &str,
    ) -> AudioResult<u32> {
        let mut store = self.store().write().await;
        audio::attach_audio(&mut store, id, bytes, file_name)
    }

    pub async fn remove_audio(&self, id: MessageId) -> bool {
        let mut store = self.store().write().await;
        audio::remove_audio(&mut store, id)
    }

    pub async fn start(&self) -> GatewayResult<()> {
        self.engine.start().await
    }

    pub async fn stop(&self) {
        self.engine.stop().await
    }

    pub async fn reset(&self) -> GatewayResult<()> {
        self.engine.reset().await
    }

    pub async fn state(&self) -> PlaybackState {
        self.engine.state().await
    }

    pub async fn export_config(&self) -> ScriptConfig {
        let store = self.store().read().await;
        ScriptConfig::export(&self.participants, &store)
    }

    /// Replace participants and messages, leaving the engine reset
    pub async fn import_config(&mut self, config: ScriptConfig) -> GatewayResult<()> {
        self.engine.stop().await;

        let count = config.messages.len();
        self.participants = config.participants;
        self.store().write().await.replace_all(config.messages);
        self.engine.gateway().participants_changed(&self.participants);

        info!("Imported script with {} messages", count);
        self.engine.reset().await
    }
}
