// src/notify/mod.rs
pub mod telegram;

use anyhow::Result;
use metrics::counter;
use serde::{Deserialize, Serialize};

/// Text formatting understood by the messaging endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatMode {
    #[default]
    Markdown,
    MarkdownV2,
    Html,
    Plain,
}

impl FormatMode {
    /// Value for the `parse_mode` field; `None` means plain text.
    pub fn parse_mode(self) -> Option<&'static str> {
        match self {
            FormatMode::Markdown => Some("Markdown"),
            FormatMode::MarkdownV2 => Some("MarkdownV2"),
            FormatMode::Html => Some("HTML"),
            FormatMode::Plain => None,
        }
    }

    /// Escape dynamic text (titles, source names, diagnostics) for this mode.
    pub fn escape(self, text: &str) -> String {
        match self {
            FormatMode::Plain => text.to_string(),
            FormatMode::Html => html_escape::encode_text(text).to_string(),
            FormatMode::Markdown => escape_chars(text, &MARKDOWN_RESERVED),
            FormatMode::MarkdownV2 => escape_chars(
                text,
                &[
                    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{',
                    '}', '.', '!', '\\',
                ],
            ),
        }
    }

    /// Wrap already-escaped text in bold.
    pub fn bold(self, escaped: &str) -> String {
        match self {
            FormatMode::Plain => escaped.to_string(),
            FormatMode::Html => format!("<b>{escaped}</b>"),
            FormatMode::Markdown | FormatMode::MarkdownV2 => format!("*{escaped}*"),
        }
    }

    /// Escape and embolden raw text. Legacy Markdown has no escapes inside an
    /// entity: reserved characters are emitted escaped between bold runs.
    pub fn bold_text(self, raw: &str) -> String {
        if self != FormatMode::Markdown {
            return self.bold(&self.escape(raw));
        }
        let mut out = String::with_capacity(raw.len() + 8);
        let mut run = String::new();
        for c in raw.chars() {
            if MARKDOWN_RESERVED.contains(&c) {
                push_bold_run(&mut out, &mut run);
                out.push('\\');
                out.push(c);
            } else {
                run.push(c);
            }
        }
        push_bold_run(&mut out, &mut run);
        out
    }
}

const MARKDOWN_RESERVED: [char; 4] = ['_', '*', '`', '['];

/// `*run*`; whitespace-only runs stay plain.
fn push_bold_run(out: &mut String, run: &mut String) {
    if run.trim().is_empty() {
        out.push_str(run);
    } else {
        out.push('*');
        out.push_str(run);
        out.push('*');
    }
    run.clear();
}

fn escape_chars(text: &str, reserved: &[char]) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if reserved.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub format_mode: FormatMode,
    pub suppress_link_preview: bool,
}

impl OutgoingMessage {
    pub fn new(text: impl Into<String>, format_mode: FormatMode, suppress_link_preview: bool) -> Self {
        Self {
            text: text.into(),
            format_mode,
            suppress_link_preview,
        }
    }
}

/// Outcome of one delivery attempt. There are no retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    Sent,
    /// No chat id or no credentials: nothing was attempted.
    Skipped,
    Failed(String),
}

#[async_trait::async_trait]
pub trait Messenger: Send + Sync {
    async fn post(&self, chat_id: i64, msg: &OutgoingMessage) -> Result<()>;

    /// `false` when credentials are missing; delivery then degrades to a logged no-op.
    fn is_enabled(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str;
}

/// Deliver one message, turning every failure into a logged `DeliveryResult`.
pub async fn deliver(
    messenger: &dyn Messenger,
    chat_id: Option<i64>,
    msg: &OutgoingMessage,
) -> DeliveryResult {
    let Some(chat_id) = chat_id else {
        tracing::warn!(target: "notify", messenger = messenger.name(), "no chat id configured; message not sent");
        return DeliveryResult::Skipped;
    };
    if !messenger.is_enabled() {
        tracing::warn!(target: "notify", messenger = messenger.name(), "messenger disabled (no token); message not sent");
        return DeliveryResult::Skipped;
    }

    match messenger.post(chat_id, msg).await {
        Ok(()) => {
            tracing::info!(target: "notify", chat_id, chars = msg.text.chars().count(), "message sent");
            DeliveryResult::Sent
        }
        Err(e) => {
            tracing::warn!(target: "notify", chat_id, error = ?e, "message delivery failed");
            counter!("digest_delivery_errors_total").increment(1);
            DeliveryResult::Failed(format!("{e:#}"))
        }
    }
}
