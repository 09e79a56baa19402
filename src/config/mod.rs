//! Persisted documents: chat scripts and local display settings.

pub mod script;
pub mod settings;

pub use script::{
    default_file_name, validate, ConfigError, ConfigResult, ScriptConfig, SCRIPT_VERSION,
};
pub use settings::{
    avatar_data_url, ChatSettings, SettingsError, SettingsResult, MAX_AVATAR_BYTES,
};
