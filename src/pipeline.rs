// src/pipeline.rs
//! Orchestrator: one sequential pass of
//! load cache → fetch → filter → dedup → truncate → deliver → persist cache.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use std::time::Duration;

use crate::cache::CacheStore;
use crate::config::Settings;
use crate::digest::{DigestChunk, DigestComposer};
use crate::ingest::providers::build_providers;
use crate::ingest::types::SourceProvider;
use crate::ingest::{ensure_metrics_described, fetch_window, select, Selection};
use crate::notify::telegram::TelegramMessenger;
use crate::notify::{deliver, DeliveryResult, FormatMode, Messenger, OutgoingMessage};
use crate::translate::{GoogleTranslator, NoopTranslator, TranslationPolicy, Translator};

const USER_AGENT: &str = concat!("topic-digest-bot/", env!("CARGO_PKG_VERSION"));
const DIAGNOSTIC_MAX_CHARS: usize = 500;

/// What one run did. Returned to the caller and logged at the end of the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub fetched: usize,
    pub filtered_out: usize,
    pub duplicates: usize,
    pub selected: usize,
    pub chunks_sent: usize,
    pub chunks_failed: usize,
    pub chunks_skipped: usize,
    pub empty_notice: Option<DeliveryResult>,
}

pub struct Pipeline {
    settings: Settings,
    providers: Vec<Box<dyn SourceProvider>>,
    translator: Box<dyn Translator>,
    messenger: Box<dyn Messenger>,
    cache: CacheStore,
    composer: DigestComposer,
}

impl Pipeline {
    pub fn new(
        settings: Settings,
        providers: Vec<Box<dyn SourceProvider>>,
        translator: Box<dyn Translator>,
        messenger: Box<dyn Messenger>,
    ) -> Self {
        let cache = CacheStore::for_profile(&settings.cache_dir, &settings.name);
        let composer = DigestComposer::from_settings(&settings);
        Self {
            settings,
            providers,
            translator,
            messenger,
            cache,
            composer,
        }
    }

    /// Wire the real collaborators: one HTTP client with a fixed per-request
    /// timeout, shared by feeds, the search API, translation and Telegram.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let client = http_client(settings.request_timeout_secs)?;
        let providers = build_providers(&settings, &client);
        let translator: Box<dyn Translator> = match settings.translation_policy {
            TranslationPolicy::Never => Box::new(NoopTranslator),
            _ => Box::new(GoogleTranslator::new(
                client.clone(),
                settings.translate_api_base.clone(),
            )),
        };
        let messenger = Box::new(TelegramMessenger::new(
            settings.messaging_token.clone(),
            settings.messaging_api_base.clone(),
            client,
        ));
        Ok(Self::new(settings, providers, translator, messenger))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    async fn fetch_and_select(
        &self,
        now: DateTime<Utc>,
        seen: &std::collections::HashSet<String>,
    ) -> Selection {
        let since = now
            .checked_sub_signed(self.settings.window())
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let fetched = fetch_window(&self.providers, since).await;
        let selection = select(
            fetched,
            &self.settings.keywords,
            seen,
            self.settings.batch_size,
        );
        tracing::info!(
            target: "pipeline",
            fetched = selection.fetched,
            filtered_out = selection.filtered_out,
            duplicates = selection.duplicates,
            truncated = selection.truncated,
            selected = selection.items.len(),
            "selection done"
        );
        selection
    }

    fn message(&self, text: &str, suppress_link_preview: bool) -> OutgoingMessage {
        OutgoingMessage::new(
            text,
            self.settings.messages.format_mode,
            suppress_link_preview,
        )
    }

    /// One pass. Soft failures (sources, translations, deliveries) are absorbed;
    /// the returned error is what is left (in practice: persisting the cache).
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<RunReport> {
        ensure_metrics_described();
        tracing::info!(target: "pipeline", profile = %self.settings.name, sources = self.providers.len(), "run started");

        let mut seen = self.cache.load();
        let selection = self.fetch_and_select(now, &seen).await;
        let chat = self.settings.digest_chat();
        let msgs = &self.settings.messages;

        let mut report = RunReport {
            fetched: selection.fetched,
            filtered_out: selection.filtered_out,
            duplicates: selection.duplicates,
            selected: selection.items.len(),
            ..RunReport::default()
        };

        if let Some(about) = msgs.about.as_deref().filter(|a| !a.trim().is_empty()) {
            deliver(self.messenger.as_ref(), chat, &self.message(about, true)).await;
        }

        if selection.items.is_empty() {
            let notice = self.message(&msgs.empty_notice, msgs.suppress_link_preview);
            report.empty_notice = Some(deliver(self.messenger.as_ref(), chat, &notice).await);
            gauge!("digest_last_run_ts").set(now.timestamp() as f64);
            tracing::info!(target: "pipeline", ?report, "run finished: nothing new");
            return Ok(report);
        }

        let chunks = self
            .composer
            .compose(&selection.items, self.translator.as_ref())
            .await;

        for chunk in &chunks {
            let msg = self.message(&chunk.text, msgs.suppress_link_preview);
            match deliver(self.messenger.as_ref(), chat, &msg).await {
                DeliveryResult::Sent => {
                    report.chunks_sent += 1;
                    counter!("digest_chunks_sent_total").increment(1);
                }
                DeliveryResult::Failed(_) => {
                    report.chunks_failed += 1;
                    counter!("digest_chunks_failed_total").increment(1);
                }
                DeliveryResult::Skipped => report.chunks_skipped += 1,
            }
        }

        // Composed items count as seen whether or not their chunk got through:
        // a transient failure must not cause a duplicate digest next run.
        seen.extend(selection.items.iter().map(|it| it.url.clone()));
        self.cache.save(&seen).context("persisting cache")?;

        gauge!("digest_last_run_ts").set(now.timestamp() as f64);
        tracing::info!(target: "pipeline", ?report, "run finished");
        Ok(report)
    }

    /// `run_once`, plus one best-effort report of a top-level failure to the
    /// operator chat. The error is still returned; no retry happens here.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunReport> {
        match self.run_once(now).await {
            Ok(report) => Ok(report),
            Err(e) => {
                tracing::error!(target: "pipeline", error = ?e, "run failed");
                report_failure(self.messenger.as_ref(), self.settings.operator_chat_id, &e).await;
                Err(e)
            }
        }
    }

    /// Fetch, select and compose without delivering or touching the cache file.
    pub async fn preview(&self, now: DateTime<Utc>) -> Result<Vec<DigestChunk>> {
        ensure_metrics_described();
        let seen = self.cache.load();
        let selection = self.fetch_and_select(now, &seen).await;
        Ok(self
            .composer
            .compose(&selection.items, self.translator.as_ref())
            .await)
    }
}

pub fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    let timeout = Duration::from_secs(timeout_secs.max(1));
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(5)))
        .build()
        .context("building http client")
}

/// `"<outer context>: <root cause>"`, capped at 500 chars.
pub fn format_failure(err: &anyhow::Error) -> String {
    let outer = err.to_string();
    let root = err.root_cause().to_string();
    let full = if outer == root {
        outer
    } else {
        format!("{outer}: {root}")
    };
    if full.chars().count() > DIAGNOSTIC_MAX_CHARS {
        full.chars().take(DIAGNOSTIC_MAX_CHARS).collect()
    } else {
        full
    }
}

/// Send the diagnostic once, as plain text, to the operator chat.
pub async fn report_failure(
    messenger: &dyn Messenger,
    operator_chat: Option<i64>,
    err: &anyhow::Error,
) -> DeliveryResult {
    let text = format!("❌ Run failed: {}", format_failure(err));
    deliver(
        messenger,
        operator_chat,
        &OutgoingMessage::new(text, FormatMode::Plain, true),
    )
    .await
}
