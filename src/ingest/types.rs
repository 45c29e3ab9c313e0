// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};

/// Language tag relative to the digest's target language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Already in the target language.
    Primary,
    Secondary,
}

/// One fetched candidate. Identity is `url`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct Item {
    pub title: String,
    pub url: String,
    pub summary: String, // normalized, used for keyword matching only
    pub source: String,  // display name, e.g. "Habr: Психология"
    pub language: Option<Language>,
    pub published_at: Option<DateTime<Utc>>,
}

#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    /// Items published at or after `since`, in feed-native order.
    async fn fetch_window(&self, since: DateTime<Utc>) -> Result<Vec<Item>>;
    fn name(&self) -> &str;
}

/// Inclusion rule shared by every provider: dated items must fall inside the
/// window, undated ones follow `include_undated`.
pub fn within_window(
    published_at: Option<DateTime<Utc>>,
    since: DateTime<Utc>,
    include_undated: bool,
) -> bool {
    match published_at {
        Some(ts) => ts >= since,
        None => include_undated,
    }
}
