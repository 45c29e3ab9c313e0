// src/config/settings.rs
//! Profile settings: one TOML file per digest variant, credentials overlaid from env.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::types::Language;
use crate::notify::FormatMode;
use crate::translate::TranslationPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "config/digest.toml";
pub const ENV_CONFIG_PATH: &str = "DIGEST_CONFIG_PATH";

/// Ten years; anything longer is a typo.
pub const MAX_WINDOW_DAYS: u32 = 3650;

pub const ENV_TOKEN: &str = "TOKEN";
pub const ENV_ADMIN_ID: &str = "ADMIN_ID";
pub const ENV_CHAT_ID: &str = "CHAT_ID";
pub const ENV_NEWSAPI_KEY: &str = "NEWSAPI_KEY";

fn default_name() -> String {
    "digest".to_string()
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}
fn default_window_days() -> u32 {
    3
}
fn default_batch_size() -> usize {
    20
}
fn default_chunk_size() -> usize {
    5
}
fn default_target_language() -> String {
    "ru".to_string()
}
fn default_include_undated() -> bool {
    true
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_messaging_api_base() -> String {
    "https://api.telegram.org".to_string()
}
fn default_translate_api_base() -> String {
    "https://translate.googleapis.com".to_string()
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Feed,
    NewsApi,
}

/// Static description of one source. Never mutated after load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    #[serde(default)]
    pub kind: SourceKind,
    /// Feed URL, or the search endpoint for `news_api`.
    pub endpoint: String,
    pub name: String,
    #[serde(default)]
    pub language: Option<Language>,
    /// `news_api` only: explicit `q`; defaults to the keyword disjunction.
    #[serde(default)]
    pub query: Option<String>,
    /// `news_api` only: ISO 639-1 code sent as `language`.
    #[serde(default)]
    pub api_language: Option<String>,
    /// `news_api` only: `pageSize` cap.
    #[serde(default)]
    pub page_size: Option<u32>,
}

impl SourceDescriptor {
    pub fn feed(endpoint: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Feed,
            endpoint: endpoint.into(),
            name: name.into(),
            language: None,
            query: None,
            api_language: None,
            page_size: None,
        }
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }
}

/// Keyword fragments grouped by language. Matching uses all of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordSet {
    #[serde(default)]
    pub primary: Vec<String>,
    #[serde(default)]
    pub secondary: Vec<String>,
}

impl KeywordSet {
    pub fn new(primary: Vec<String>, secondary: Vec<String>) -> Self {
        Self { primary, secondary }
    }

    /// All keywords, primary first, declaration order kept.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.primary
            .iter()
            .chain(self.secondary.iter())
            .map(String::as_str)
            .filter(|k| !k.trim().is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSettings {
    /// Printed once, at the top of the first chunk.
    #[serde(default)]
    pub header: String,
    /// Sent instead of a digest when nothing new was selected.
    #[serde(default = "MessageSettings::default_empty_notice")]
    pub empty_notice: String,
    /// Optional notice describing the search, sent before the digest.
    #[serde(default)]
    pub about: Option<String>,
    #[serde(default)]
    pub format_mode: FormatMode,
    #[serde(default = "default_true")]
    pub suppress_link_preview: bool,
}

impl MessageSettings {
    fn default_empty_notice() -> String {
        "No new items.".to_string()
    }
}

impl Default for MessageSettings {
    fn default() -> Self {
        Self {
            header: String::new(),
            empty_notice: Self::default_empty_notice(),
            about: None,
            format_mode: FormatMode::default(),
            suppress_link_preview: true,
        }
    }
}

/// Everything one run needs. Built once and handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    // Credentials: env only.
    #[serde(skip)]
    pub messaging_token: Option<String>,
    #[serde(skip)]
    pub operator_chat_id: Option<i64>,
    #[serde(skip)]
    pub digest_chat_id: Option<i64>,
    #[serde(skip)]
    pub search_api_key: Option<String>,

    #[serde(default)]
    pub sources: Vec<SourceDescriptor>,
    #[serde(default)]
    pub keywords: KeywordSet,
    #[serde(default = "default_window_days")]
    pub window_days: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub translation_policy: TranslationPolicy,
    #[serde(default = "default_target_language")]
    pub target_language: String,
    #[serde(default = "default_include_undated")]
    pub include_undated: bool,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_messaging_api_base")]
    pub messaging_api_base: String,
    #[serde(default = "default_translate_api_base")]
    pub translate_api_base: String,
    #[serde(default)]
    pub messages: MessageSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            name: default_name(),
            cache_dir: default_cache_dir(),
            messaging_token: None,
            operator_chat_id: None,
            digest_chat_id: None,
            search_api_key: None,
            sources: Vec::new(),
            keywords: KeywordSet::default(),
            window_days: default_window_days(),
            batch_size: default_batch_size(),
            chunk_size: default_chunk_size(),
            translation_policy: TranslationPolicy::default(),
            target_language: default_target_language(),
            include_undated: default_include_undated(),
            request_timeout_secs: default_timeout_secs(),
            messaging_api_base: default_messaging_api_base(),
            translate_api_base: default_translate_api_base(),
            messages: MessageSettings::default(),
        }
    }
}

impl Settings {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: Settings = toml::from_str(s).context("parsing settings toml")?;
        cfg.sanitize()?;
        Ok(cfg)
    }

    /// Settings with defaults only, credentials from the process env.
    /// Used to report a failure when the profile itself could not be loaded.
    pub fn from_env_only() -> Self {
        let mut cfg = Settings::default();
        cfg.apply_env();
        cfg
    }

    pub fn apply_env(&mut self) {
        self.apply_env_with(|k| std::env::var(k).ok());
    }

    /// Overlay credentials using `lookup`; blank values count as absent.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| {
            lookup(k)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(token) = get(ENV_TOKEN) {
            self.messaging_token = Some(token);
        }
        if let Some(raw) = get(ENV_ADMIN_ID) {
            self.operator_chat_id = parse_chat_id(ENV_ADMIN_ID, &raw);
        }
        if let Some(raw) = get(ENV_CHAT_ID) {
            self.digest_chat_id = parse_chat_id(ENV_CHAT_ID, &raw);
        }
        if let Some(key) = get(ENV_NEWSAPI_KEY) {
            self.search_api_key = Some(key);
        }
    }

    /// Chat that receives the digest; the operator chat unless `CHAT_ID` is set.
    pub fn digest_chat(&self) -> Option<i64> {
        self.digest_chat_id.or(self.operator_chat_id)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache_dir.join(format!("{}_cache.json", self.name))
    }

    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.window_days))
    }

    fn sanitize(&mut self) -> Result<()> {
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            bail!("settings: `name` must not be empty");
        }
        if self
            .name
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '.')
        {
            bail!("settings: `name` must be a plain file stem, got {:?}", self.name);
        }
        if self.chunk_size == 0 {
            self.chunk_size = 1;
        }
        if self.window_days > MAX_WINDOW_DAYS {
            tracing::warn!(target: "pipeline", window_days = self.window_days, max = MAX_WINDOW_DAYS, "window_days clamped");
            self.window_days = MAX_WINDOW_DAYS;
        }
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = default_timeout_secs();
        }
        for src in &self.sources {
            if src.endpoint.trim().is_empty() {
                bail!("settings: source {:?} has an empty endpoint", src.name);
            }
        }
        Ok(())
    }
}

fn parse_chat_id(var: &str, raw: &str) -> Option<i64> {
    match raw.parse::<i64>() {
        Ok(id) => Some(id),
        Err(_) => {
            tracing::warn!(target: "pipeline", var, value = raw, "chat id is not a number; ignoring");
            None
        }
    }
}

/// Load a profile from an explicit path and overlay env credentials.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading settings from {}", path.display()))?;
    let mut cfg = Settings::from_toml_str(&content)
        .with_context(|| format!("loading settings from {}", path.display()))?;
    cfg.apply_env();
    Ok(cfg)
}

/// Load settings using env var + fallback:
/// 1) $DIGEST_CONFIG_PATH
/// 2) config/digest.toml
pub fn load_settings_default() -> Result<Settings> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_settings_from(&pb);
        }
        return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
    }
    let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
    if default_p.exists() {
        return load_settings_from(&default_p);
    }
    Err(anyhow!(
        "no settings found: set {ENV_CONFIG_PATH} or create {DEFAULT_CONFIG_PATH}"
    ))
}
