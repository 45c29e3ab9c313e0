// src/translate.rs
//! Best-effort title translation. Failures never reach the caller: the original
//! text is returned instead.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::ingest::types::{Item, Language};

/// When titles get translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationPolicy {
    #[default]
    Always,
    /// Only items not tagged `primary` (untagged items included).
    ByLanguageTag,
    Never,
}

impl TranslationPolicy {
    pub fn should_translate(self, item: &Item) -> bool {
        match self {
            TranslationPolicy::Always => true,
            TranslationPolicy::ByLanguageTag => item.language != Some(Language::Primary),
            TranslationPolicy::Never => false,
        }
    }
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target: &str) -> Result<String>;
    fn name(&self) -> &'static str;
}

/// Pass-through translator.
pub struct NoopTranslator;

#[async_trait]
impl Translator for NoopTranslator {
    async fn translate(&self, text: &str, _target: &str) -> Result<String> {
        Ok(text.to_string())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Public Google Translate endpoint (`client=gtx`), source language auto-detected.
pub struct GoogleTranslator {
    http: reqwest::Client,
    api_base: String,
}

impl GoogleTranslator {
    pub fn new(http: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }
}

/// Join the translated segments of a `translate_a/single` response.
pub fn parse_gtx_response(body: &str) -> Result<String> {
    let v: serde_json::Value =
        serde_json::from_str(body).context("parsing translate response json")?;
    let segments = v
        .get(0)
        .and_then(|s| s.as_array())
        .ok_or_else(|| anyhow!("unexpected translate response shape"))?;

    let mut out = String::new();
    for seg in segments {
        if let Some(part) = seg.get(0).and_then(|p| p.as_str()) {
            out.push_str(part);
        }
    }
    if out.trim().is_empty() {
        bail!("translate response had no text");
    }
    Ok(out)
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(&self, text: &str, target: &str) -> Result<String> {
        let url = format!("{}/translate_a/single", self.api_base);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("client", "gtx"),
                ("sl", "auto"),
                ("tl", target),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await
            .context("translate http get")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("translate returned status: {status}");
        }
        let body = resp.text().await.context("translate http .text()")?;
        parse_gtx_response(&body)
    }

    fn name(&self) -> &'static str {
        "google"
    }
}

/// Translate `text`, or hand it back unchanged on any failure.
pub async fn translate_or_original(translator: &dyn Translator, text: &str, target: &str) -> String {
    if text.trim().is_empty() {
        return text.to_string();
    }
    match translator.translate(text, target).await {
        Ok(t) if !t.trim().is_empty() => t.trim().to_string(),
        Ok(_) => text.to_string(),
        Err(e) => {
            tracing::warn!(target: "digest", error = ?e, translator = translator.name(), "translation failed; using original");
            counter!("digest_translation_failures_total").increment(1);
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    #[async_trait]
    impl Translator for Broken {
        async fn translate(&self, _text: &str, _target: &str) -> Result<String> {
            Err(anyhow!("quota exceeded"))
        }
        fn name(&self) -> &'static str {
            "broken"
        }
    }

    fn item(language: Option<Language>) -> Item {
        Item {
            title: "t".into(),
            url: "u".into(),
            summary: String::new(),
            source: "s".into(),
            language,
            published_at: None,
        }
    }

    #[test]
    fn policy_by_language_tag_skips_primary_only() {
        let p = TranslationPolicy::ByLanguageTag;
        assert!(!p.should_translate(&item(Some(Language::Primary))));
        assert!(p.should_translate(&item(Some(Language::Secondary))));
        assert!(p.should_translate(&item(None)));
        assert!(TranslationPolicy::Always.should_translate(&item(Some(Language::Primary))));
        assert!(!TranslationPolicy::Never.should_translate(&item(None)));
    }

    #[test]
    fn gtx_segments_are_joined() {
        let body = r#"[[["Привет, ","Hello, ",null,null,10],["мир","world",null,null,10]],null,"en"]"#;
        assert_eq!(parse_gtx_response(body).unwrap(), "Привет, мир");
        assert!(parse_gtx_response("{}").is_err());
        assert!(parse_gtx_response(r#"[[]]"#).is_err());
    }

    #[tokio::test]
    async fn failure_returns_original_text() {
        let out = translate_or_original(&Broken, "Mindfulness at work", "ru").await;
        assert_eq!(out, "Mindfulness at work");
    }

    #[tokio::test]
    async fn noop_passes_through() {
        let out = translate_or_original(&NoopTranslator, "Same", "ru").await;
        assert_eq!(out, "Same");
    }
}
