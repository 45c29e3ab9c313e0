// src/ingest/providers/mod.rs
pub mod feed;
pub mod news_api;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::config::{KeywordSet, Settings, SourceKind};
use crate::ingest::types::SourceProvider;

/// Parse a feed/API timestamp: RFC 2822 (RSS), RFC 3339 (Atom, JSON APIs),
/// then a bare `YYYY-MM-DDTHH:MM:SS` taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(s)
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|n| n.and_utc())
        })
}

/// Build one provider per configured source, in declaration order.
pub fn build_providers(settings: &Settings, client: &reqwest::Client) -> Vec<Box<dyn SourceProvider>> {
    settings
        .sources
        .iter()
        .map(|desc| -> Box<dyn SourceProvider> {
            match desc.kind {
                SourceKind::Feed => Box::new(feed::FeedProvider::from_url(
                    desc.clone(),
                    settings.include_undated,
                    client.clone(),
                )),
                SourceKind::NewsApi => Box::new(news_api::NewsApiProvider::new(
                    desc.clone(),
                    settings.search_api_key.clone(),
                    keyword_list(&settings.keywords),
                    settings.include_undated,
                    client.clone(),
                )),
            }
        })
        .collect()
}

fn keyword_list(k: &KeywordSet) -> Vec<String> {
    k.iter().map(str::to_string).collect()
}
