// tests/pipeline_scenarios.rs
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use topic_digest_bot::config::{KeywordSet, Settings};
use topic_digest_bot::ingest::types::{Item, SourceProvider};
use topic_digest_bot::notify::{FormatMode, Messenger, OutgoingMessage};
use topic_digest_bot::translate::{NoopTranslator, TranslationPolicy, Translator};
use topic_digest_bot::{CacheStore, Pipeline};

const DIGEST_CHAT: i64 = 1;
const OPERATOR_CHAT: i64 = 99;

struct StaticProvider {
    name: &'static str,
    items: Vec<Item>,
}

#[async_trait]
impl SourceProvider for StaticProvider {
    async fn fetch_window(&self, _since: DateTime<Utc>) -> Result<Vec<Item>> {
        Ok(self.items.clone())
    }
    fn name(&self) -> &str {
        self.name
    }
}

struct DownProvider;

#[async_trait]
impl SourceProvider for DownProvider {
    async fn fetch_window(&self, _since: DateTime<Utc>) -> Result<Vec<Item>> {
        Err(anyhow!("connection refused"))
    }
    fn name(&self) -> &str {
        "down"
    }
}

#[derive(Clone, Default)]
struct Recorder {
    sent: Arc<Mutex<Vec<(i64, OutgoingMessage)>>>,
    fail: bool,
}

impl Recorder {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
    fn texts_to(&self, chat: i64) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|(c, _)| *c == chat)
            .map(|(_, m)| m.text.clone())
            .collect()
    }
}

#[async_trait]
impl Messenger for Recorder {
    async fn post(&self, chat_id: i64, msg: &OutgoingMessage) -> Result<()> {
        self.sent.lock().push((chat_id, msg.clone()));
        if self.fail {
            Err(anyhow!("HTTP 500"))
        } else {
            Ok(())
        }
    }
    fn name(&self) -> &'static str {
        "recorder"
    }
}

struct BrokenTranslator;

#[async_trait]
impl Translator for BrokenTranslator {
    async fn translate(&self, _text: &str, _target: &str) -> Result<String> {
        Err(anyhow!("translator quota exceeded"))
    }
    fn name(&self) -> &'static str {
        "broken"
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 6, 18, 0, 0).unwrap()
}

fn item(url: &str, title: &str) -> Item {
    Item {
        title: title.into(),
        url: url.into(),
        summary: String::new(),
        source: "Test Source".into(),
        language: None,
        published_at: Some(now()),
    }
}

fn settings(dir: &Path) -> Settings {
    let mut s = Settings::default();
    s.name = "test".into();
    s.cache_dir = dir.to_path_buf();
    s.keywords = KeywordSet::new(vec!["психология".into()], vec!["therapy".into()]);
    s.translation_policy = TranslationPolicy::Never;
    s.operator_chat_id = Some(OPERATOR_CHAT);
    s.digest_chat_id = Some(DIGEST_CHAT);
    s.messages.format_mode = FormatMode::Plain;
    s.messages.header = "HEAD".into();
    s.messages.empty_notice = "nothing new".into();
    s
}

fn pipeline_with(
    s: Settings,
    items: Vec<Item>,
    translator: Box<dyn Translator>,
    messenger: &Recorder,
) -> Pipeline {
    let providers: Vec<Box<dyn SourceProvider>> =
        vec![Box::new(StaticProvider { name: "static", items })];
    Pipeline::new(s, providers, translator, Box::new(messenger.clone()))
}

fn cached(dir: &Path) -> HashSet<String> {
    CacheStore::for_profile(dir, "test").load()
}

#[tokio::test]
async fn cached_and_unmatched_items_are_not_delivered() {
    let dir = tempfile::tempdir().unwrap();
    CacheStore::for_profile(dir.path(), "test")
        .save(&["https://a/1".to_string()].into())
        .unwrap();

    let rec = Recorder::default();
    let p = pipeline_with(
        settings(dir.path()),
        vec![
            item("https://a/1", "Therapy one"),
            item("https://a/2", "Новости: психология сна"),
            item("https://a/3", "Football results"),
        ],
        Box::new(NoopTranslator),
        &rec,
    );

    let report = p.run(now()).await.unwrap();
    assert_eq!(report.selected, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.filtered_out, 1);
    assert_eq!(report.chunks_sent, 1);

    let texts = rec.texts_to(DIGEST_CHAT);
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("https://a/2"));
    assert!(!texts[0].contains("https://a/1"));
    assert!(!texts[0].contains("https://a/3"));

    let want: HashSet<String> = ["https://a/1".to_string(), "https://a/2".to_string()].into();
    assert_eq!(cached(dir.path()), want);
}

#[tokio::test]
async fn empty_selection_sends_exactly_one_notice() {
    let dir = tempfile::tempdir().unwrap();
    let rec = Recorder::default();
    let p = pipeline_with(
        settings(dir.path()),
        vec![item("https://a/3", "Football results")],
        Box::new(NoopTranslator),
        &rec,
    );

    let report = p.run(now()).await.unwrap();
    assert_eq!(report.selected, 0);
    assert_eq!(report.chunks_sent, 0);
    assert_eq!(rec.texts_to(DIGEST_CHAT), vec!["nothing new".to_string()]);
    // nothing selected, nothing persisted
    assert!(!CacheStore::for_profile(dir.path(), "test").path().exists());
}

#[tokio::test]
async fn second_run_without_new_data_delivers_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let items = vec![
        item("https://a/1", "therapy 1"),
        item("https://a/2", "therapy 2"),
    ];

    let first = Recorder::default();
    pipeline_with(settings(dir.path()), items.clone(), Box::new(NoopTranslator), &first)
        .run(now())
        .await
        .unwrap();
    assert_eq!(first.texts_to(DIGEST_CHAT).len(), 1);

    let second = Recorder::default();
    let report = pipeline_with(settings(dir.path()), items, Box::new(NoopTranslator), &second)
        .run(now())
        .await
        .unwrap();
    assert_eq!(report.selected, 0);
    assert_eq!(second.texts_to(DIGEST_CHAT), vec!["nothing new".to_string()]);
}

#[tokio::test]
async fn selection_is_capped_and_chunked() {
    let dir = tempfile::tempdir().unwrap();
    let items: Vec<Item> = (1..=25)
        .map(|i| item(&format!("https://a/{i}"), &format!("therapy {i}")))
        .collect();

    let rec = Recorder::default();
    let p = pipeline_with(settings(dir.path()), items, Box::new(NoopTranslator), &rec);
    let report = p.run(now()).await.unwrap();

    assert_eq!(report.selected, 20);
    assert_eq!(report.chunks_sent, 4);
    let texts = rec.texts_to(DIGEST_CHAT);
    assert_eq!(texts.len(), 4);
    assert!(texts[0].starts_with("HEAD"));
    assert!(texts[1..].iter().all(|t| !t.contains("HEAD")));
    assert_eq!(texts.iter().map(|t| t.matches("🔗").count()).sum::<usize>(), 20);

    // the earliest 20 in fetch order are kept
    let cache = cached(dir.path());
    assert!(cache.contains("https://a/20"));
    assert!(!cache.contains("https://a/21"));
}

#[tokio::test]
async fn failing_translator_keeps_original_titles() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = settings(dir.path());
    s.translation_policy = TranslationPolicy::Always;

    let rec = Recorder::default();
    let p = pipeline_with(
        s,
        vec![item("https://a/1", "Therapy for the anxious mind")],
        Box::new(BrokenTranslator),
        &rec,
    );
    p.run(now()).await.unwrap();

    let texts = rec.texts_to(DIGEST_CHAT);
    assert!(texts[0].contains("📌 Therapy for the anxious mind\n"));
}

#[tokio::test]
async fn failed_delivery_still_marks_items_seen() {
    let dir = tempfile::tempdir().unwrap();
    let rec = Recorder::failing();
    let p = pipeline_with(
        settings(dir.path()),
        vec![item("https://a/1", "therapy")],
        Box::new(NoopTranslator),
        &rec,
    );

    let report = p.run(now()).await.unwrap();
    assert_eq!(report.chunks_failed, 1);
    assert_eq!(report.chunks_sent, 0);
    assert!(cached(dir.path()).contains("https://a/1"));
}

#[tokio::test]
async fn missing_chat_is_a_noop_but_cache_advances() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = settings(dir.path());
    s.operator_chat_id = None;
    s.digest_chat_id = None;

    let rec = Recorder::default();
    let p = pipeline_with(s, vec![item("https://a/1", "therapy")], Box::new(NoopTranslator), &rec);
    let report = p.run(now()).await.unwrap();

    assert_eq!(report.chunks_skipped, 1);
    assert!(rec.sent.lock().is_empty());
    assert!(cached(dir.path()).contains("https://a/1"));
}

#[tokio::test]
async fn one_failing_source_does_not_abort_the_others() {
    let dir = tempfile::tempdir().unwrap();
    let rec = Recorder::default();
    let providers: Vec<Box<dyn SourceProvider>> = vec![
        Box::new(DownProvider),
        Box::new(StaticProvider {
            name: "ok",
            items: vec![item("https://a/1", "therapy")],
        }),
    ];
    let p = Pipeline::new(
        settings(dir.path()),
        providers,
        Box::new(NoopTranslator),
        Box::new(rec.clone()),
    );

    let report = p.run(now()).await.unwrap();
    assert_eq!(report.fetched, 1);
    assert_eq!(report.chunks_sent, 1);
}

#[tokio::test]
async fn corrupt_cache_is_treated_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = CacheStore::for_profile(dir.path(), "test");
    std::fs::write(store.path(), "[\"https://a/1\", ").unwrap();

    let rec = Recorder::default();
    let p = pipeline_with(
        settings(dir.path()),
        vec![item("https://a/1", "therapy")],
        Box::new(NoopTranslator),
        &rec,
    );
    let report = p.run(now()).await.unwrap();
    assert_eq!(report.selected, 1);
    let want: HashSet<String> = ["https://a/1".to_string()].into();
    assert_eq!(store.load(), want);
}

#[tokio::test]
async fn top_level_failure_is_reported_to_operator_once() {
    let dir = tempfile::tempdir().unwrap();
    // cache dir below a regular file: persisting must fail
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "").unwrap();
    let mut s = settings(dir.path());
    s.cache_dir = blocker.join("cache");

    let rec = Recorder::default();
    let p = pipeline_with(s, vec![item("https://a/1", "therapy")], Box::new(NoopTranslator), &rec);

    let err = p.run(now()).await.unwrap_err();
    assert!(format!("{err:#}").contains("persisting cache"));

    let reports = rec.texts_to(OPERATOR_CHAT);
    assert_eq!(reports.len(), 1);
    assert!(reports[0].starts_with("❌ Run failed: persisting cache"));
    // digest went out before the failure
    assert_eq!(rec.texts_to(DIGEST_CHAT).len(), 1);
}

#[tokio::test]
async fn about_notice_precedes_digest() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = settings(dir.path());
    s.messages.about = Some("how this bot searches".into());

    let rec = Recorder::default();
    let p = pipeline_with(s, vec![item("https://a/1", "therapy")], Box::new(NoopTranslator), &rec);
    p.run(now()).await.unwrap();

    let sent = rec.sent.lock();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].1.text, "how this bot searches");
    assert!(sent[0].1.suppress_link_preview);
    assert!(sent[1].1.text.starts_with("HEAD"));
}

#[tokio::test]
async fn preview_touches_neither_messenger_nor_cache() {
    let dir = tempfile::tempdir().unwrap();
    let rec = Recorder::default();
    let p = pipeline_with(
        settings(dir.path()),
        vec![item("https://a/1", "therapy")],
        Box::new(NoopTranslator),
        &rec,
    );

    let chunks = p.preview(now()).await.unwrap();
    assert_eq!(chunks.len(), 1);
    assert!(rec.sent.lock().is_empty());
    assert!(!p.cache().path().exists());
}

#[tokio::test]
async fn oversized_window_does_not_overflow() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = settings(dir.path());
    // set directly, bypassing the clamp applied when loading a profile
    s.window_days = u32::MAX;

    let rec = Recorder::default();
    let p = pipeline_with(s, vec![item("https://a/1", "therapy")], Box::new(NoopTranslator), &rec);
    let report = p.run(now()).await.unwrap();
    assert_eq!(report.selected, 1);
}
