// src/config/mod.rs
pub mod settings;

pub use settings::{
    load_settings_default, load_settings_from, KeywordSet, MessageSettings, Settings,
    SourceDescriptor, SourceKind, DEFAULT_CONFIG_PATH, ENV_CONFIG_PATH, MAX_WINDOW_DAYS,
};
