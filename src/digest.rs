// src/digest.rs
//! Digest composer: splits the selection into fixed-size chunks and renders
//! each chunk into one outgoing message.

use crate::config::Settings;
use crate::ingest::types::Item;
use crate::ingest::{truncate_chars, TITLE_MAX_CHARS};
use crate::notify::FormatMode;
use crate::translate::{translate_or_original, TranslationPolicy, Translator};

/// A bounded group of items rendered into a single message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChunk {
    pub items: Vec<Item>,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct DigestComposer {
    header: String,
    chunk_size: usize,
    format_mode: FormatMode,
    policy: TranslationPolicy,
    target_language: String,
}

impl DigestComposer {
    pub fn new(chunk_size: usize, format_mode: FormatMode) -> Self {
        Self {
            header: String::new(),
            chunk_size: chunk_size.max(1),
            format_mode,
            policy: TranslationPolicy::Never,
            target_language: String::new(),
        }
    }

    pub fn from_settings(s: &Settings) -> Self {
        Self::new(s.chunk_size, s.messages.format_mode)
            .with_header(s.messages.header.clone())
            .with_translation(s.translation_policy, s.target_language.clone())
    }

    /// Header is profile-authored and inserted verbatim (already formatted).
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    pub fn with_translation(mut self, policy: TranslationPolicy, target: impl Into<String>) -> Self {
        self.policy = policy;
        self.target_language = target.into();
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of messages `n` items turn into.
    pub fn chunk_count(&self, n: usize) -> usize {
        n.div_ceil(self.chunk_size)
    }

    fn render_item(&self, title: &str, item: &Item) -> String {
        let m = self.format_mode;
        format!(
            "📌 {}\n🌐 {}\n🔗 {}\n\n",
            m.bold_text(&truncate_chars(title, TITLE_MAX_CHARS)),
            m.escape(&item.source),
            m.escape(&item.url)
        )
    }

    /// Translate titles per policy, one at a time, then render chunk by chunk.
    /// The header goes into the first chunk only.
    pub async fn compose(&self, items: &[Item], translator: &dyn Translator) -> Vec<DigestChunk> {
        let mut chunks = Vec::with_capacity(self.chunk_count(items.len()));

        for (idx, group) in items.chunks(self.chunk_size).enumerate() {
            let mut text = String::new();
            if idx == 0 && !self.header.trim().is_empty() {
                text.push_str(self.header.trim_end());
                text.push_str("\n\n");
            }
            for item in group {
                let title = if self.policy.should_translate(item) {
                    translate_or_original(translator, &item.title, &self.target_language).await
                } else {
                    item.title.clone()
                };
                text.push_str(&self.render_item(&title, item));
            }
            chunks.push(DigestChunk {
                items: group.to_vec(),
                text: text.trim_end().to_string(),
            });
        }

        tracing::debug!(target: "digest", items = items.len(), chunks = chunks.len(), "digest composed");
        chunks
    }
}
