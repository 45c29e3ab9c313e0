// src/ingest/mod.rs
pub mod providers;
pub mod types;

use crate::config::KeywordSet;
use crate::ingest::types::{Item, SourceProvider};
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use std::collections::HashSet;

/// One-time metrics registration.
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "digest_items_fetched_total",
            "Items returned by providers inside the window."
        );
        describe_counter!(
            "digest_items_filtered_total",
            "Items dropped for not matching any keyword."
        );
        describe_counter!(
            "digest_items_duplicate_total",
            "Items dropped because their url was already delivered."
        );
        describe_counter!(
            "digest_items_selected_total",
            "Items selected for delivery."
        );
        describe_counter!(
            "digest_source_errors_total",
            "Source fetch/parse errors."
        );
        describe_counter!(
            "digest_translation_failures_total",
            "Translations that fell back to the original text."
        );
        describe_counter!("digest_chunks_sent_total", "Digest chunks delivered.");
        describe_counter!(
            "digest_chunks_failed_total",
            "Digest chunks dropped after a delivery error."
        );
        describe_counter!(
            "digest_delivery_errors_total",
            "Messages the messaging endpoint rejected or never received."
        );
        describe_histogram!("digest_feed_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!("digest_last_run_ts", "Unix ts when the pipeline last ran.");
    });
}

/// Summary cap.
const SUMMARY_MAX_CHARS: usize = 1500;
/// Title cap: five rendered items must fit one 4096-char message.
pub const TITLE_MAX_CHARS: usize = 300;

fn strip_tags(s: &str) -> String {
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    re_tags.replace_all(s, " ").into_owned()
}

/// Collapse whitespace (incl. NBSP) and trim.
fn fold_whitespace(s: &str) -> String {
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    re_ws.replace_all(s, " ").trim().to_string()
}

/// Keep at most `max` chars; a cut string ends in `…` (counted in `max`).
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Summary text: decode entities, strip tags, fold whitespace, cap length.
/// Summary markup usually arrives entity-escaped, hence decode first.
pub fn normalize_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    let out = fold_whitespace(&strip_tags(&decoded));
    if out.chars().count() > SUMMARY_MAX_CHARS {
        out.chars().take(SUMMARY_MAX_CHARS).collect()
    } else {
        out
    }
}

/// Title text: strip literal tags first, then decode, so `x &lt; y` stays `x < y`.
pub fn normalize_title(s: &str) -> String {
    let stripped = strip_tags(s);
    let decoded = html_escape::decode_html_entities(&stripped);
    truncate_chars(&fold_whitespace(&decoded), TITLE_MAX_CHARS)
}

/// Lowercased keyword list, computed once per selection.
fn lowered_keywords(keywords: &KeywordSet) -> Vec<String> {
    keywords.iter().map(str::to_lowercase).collect()
}

fn matches_lowered(item: &Item, lowered: &[String]) -> bool {
    let title = item.title.to_lowercase();
    let summary = item.summary.to_lowercase();
    lowered
        .iter()
        .any(|kw| title.contains(kw.as_str()) || summary.contains(kw.as_str()))
}

/// Case-insensitive substring match of any keyword in title or summary.
pub fn matches_keywords(item: &Item, keywords: &KeywordSet) -> bool {
    matches_lowered(item, &lowered_keywords(keywords))
}

pub fn filter_by_keywords(items: Vec<Item>, keywords: &KeywordSet) -> Vec<Item> {
    let lowered = lowered_keywords(keywords);
    items
        .into_iter()
        .filter(|it| matches_lowered(it, &lowered))
        .collect()
}

/// Drop items already in `cache`; repeated urls within one fetch keep the first.
pub fn dedup_against_cache(items: Vec<Item>, cache: &HashSet<String>) -> Vec<Item> {
    let mut seen_now: HashSet<String> = HashSet::new();
    items
        .into_iter()
        .filter(|it| !cache.contains(&it.url) && seen_now.insert(it.url.clone()))
        .collect()
}

/// Head truncation in input order.
pub fn truncate_to_limit(mut items: Vec<Item>, limit: usize) -> Vec<Item> {
    items.truncate(limit);
    items
}

/// Outcome of filter → dedup → truncate, with per-stage drop counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub items: Vec<Item>,
    pub fetched: usize,
    pub filtered_out: usize,
    pub duplicates: usize,
    pub truncated: usize,
}

/// Order is fixed: keyword filter, then cache dedup, then head truncation.
pub fn select(
    fetched: Vec<Item>,
    keywords: &KeywordSet,
    cache: &HashSet<String>,
    limit: usize,
) -> Selection {
    let total = fetched.len();

    let matched = filter_by_keywords(fetched, keywords);
    let filtered_out = total - matched.len();

    let matched_len = matched.len();
    let fresh = dedup_against_cache(matched, cache);
    let duplicates = matched_len - fresh.len();

    let fresh_len = fresh.len();
    let items = truncate_to_limit(fresh, limit);
    let truncated = fresh_len - items.len();

    counter!("digest_items_filtered_total").increment(filtered_out as u64);
    counter!("digest_items_duplicate_total").increment(duplicates as u64);
    counter!("digest_items_selected_total").increment(items.len() as u64);

    Selection {
        items,
        fetched: total,
        filtered_out,
        duplicates,
        truncated,
    }
}

/// Fetch every provider in declaration order. A failing provider is logged
/// and contributes nothing; the others still run.
pub async fn fetch_window(
    providers: &[Box<dyn SourceProvider>],
    since: DateTime<Utc>,
) -> Vec<Item> {
    ensure_metrics_described();

    let mut raw = Vec::new();
    for p in providers {
        match p.fetch_window(since).await {
            Ok(mut v) => {
                tracing::info!(target: "ingest", source = p.name(), count = v.len(), "source fetched");
                counter!("digest_items_fetched_total").increment(v.len() as u64);
                raw.append(&mut v);
            }
            Err(e) => {
                tracing::warn!(target: "ingest", error = ?e, source = p.name(), "source error");
                counter!("digest_source_errors_total").increment(1);
            }
        }
    }
    raw
}
