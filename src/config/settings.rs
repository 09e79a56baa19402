use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::{Author, Participants, DEFAULT_AVATAR};

/// Largest accepted avatar image
pub const MAX_AVATAR_BYTES: usize = 1024 * 1024;

pub const DEFAULT_FONT_SIZE: u16 = 14;

pub type SettingsResult<T> = Result<T, SettingsError>;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("avatar image is {0} bytes, limit is 1 MiB")]
    AvatarTooLarge(usize),
    #[error("not an image type: {0}")]
    NotAnImage(String),
    #[error("no configuration directory on this platform")]
    NoConfigDir,
    #[error("failed to encode settings: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write settings: {0}")]
    Io(#[from] std::io::Error),
}

/// Local display preferences, kept apart from scripts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatSettings {
    pub font_size: u16,
    pub local_avatar: Option<String>,
    pub contact_avatar: Option<String>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            font_size: DEFAULT_FONT_SIZE,
            local_avatar: None,
            contact_avatar: None,
        }
    }
}

impl ChatSettings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("chatsim").join("settings.json"))
    }

    /// Load from the platform config directory, falling back to defaults
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Stored values override defaults; unreadable files are ignored
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    warn!("Ignoring malformed settings in {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Could not read settings from {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self) -> SettingsResult<()> {
        let path = Self::config_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> SettingsResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        debug!("Saved settings to {}", path.display());
        Ok(())
    }

    pub fn avatar(&self, author: Author) -> &str {
        let custom = match author {
            Author::Local => &self.local_avatar,
            Author::Remote => &self.contact_avatar,
        };
        custom.as_deref().unwrap_or(DEFAULT_AVATAR)
    }

    /// Set or clear (`None`) the avatar for one side
    pub fn set_avatar(&mut self, author: Author, avatar: Option<String>) {
        match author {
            Author::Local => self.local_avatar = avatar,
            Author::Remote => self.contact_avatar = avatar,
        }
    }

    /// Apply the configured avatars onto script participants
    pub fn apply_to(&self, participants: &mut Participants) {
        for author in [Author::Local, Author::Remote] {
            participants.get_mut(author).avatar = self.avatar(author).to_string();
        }
    }
}

/// Encode an uploaded avatar image as a Data URL
pub fn avatar_data_url(bytes: &[u8], mime: &str) -> SettingsResult<String> {
    if !mime.starts_with("image/") {
        return Err(SettingsError::NotAnImage(mime.to_string()));
    }
    if bytes.len() > MAX_AVATAR_BYTES {
        return Err(SettingsError::AvatarTooLarge(bytes.len()));
    }
    Ok(format!("data:{};base64,{}", mime, STANDARD.encode(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ChatSettings::load_from(&dir.path().join("settings.json"));
        assert_eq!(settings, ChatSettings::default());
        assert_eq!(settings.font_size, 14);
        assert_eq!(settings.avatar(Author::Local), DEFAULT_AVATAR);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chatsim").join("settings.json");

        let mut settings = ChatSettings::default();
        settings.font_size = 18;
        settings.set_avatar(Author::Remote, Some("data:image/png;base64,AA==".to_string()));
        settings.save_to(&path).unwrap();

        let loaded = ChatSettings::load_from(&path);
        assert_eq!(loaded, settings);
        assert_eq!(loaded.avatar(Author::Remote), "data:image/png;base64,AA==");
    }

    #[test]
    fn test_partial_file_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"localAvatar": "me.png"}"#).unwrap();

        let loaded = ChatSettings::load_from(&path);
        assert_eq!(loaded.font_size, DEFAULT_FONT_SIZE);
        assert_eq!(loaded.local_avatar.as_deref(), Some("me.png"));
    }

    #[test]
    fn test_malformed_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(ChatSettings::load_from(&path), ChatSettings::default());
    }

    #[test]
    fn test_avatar_data_url() {
        assert_eq!(
            avatar_data_url(b"abc", "image/png").unwrap(),
            "data:image/png;base64,YWJj"
        );
        assert!(matches!(
            avatar_data_url(b"abc", "text/plain"),
            Err(SettingsError::NotAnImage(_))
        ));
        let big = vec![0u8; MAX_AVATAR_BYTES + 1];
        assert!(matches!(
            avatar_data_url(&big, "image/jpeg"),
            Err(SettingsError::AvatarTooLarge(_))
        ));
    }

    #[test]
    fn test_apply_to_participants() {
        let mut participants = Participants::default();
        let mut settings = ChatSettings::default();
        settings.set_avatar(Author::Local, Some("me.png".to_string()));
        settings.apply_to(&mut participants);

        assert_eq!(participants.local.avatar, "me.png");
        assert_eq!(participants.remote.avatar, DEFAULT_AVATAR);
    }
}
