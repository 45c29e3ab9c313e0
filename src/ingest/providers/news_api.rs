// src/ingest/providers/news_api.rs
//! News search API provider (`/v2/everything` shaped endpoint).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::parse_timestamp;
use crate::config::SourceDescriptor;
use crate::ingest::{normalize_text, normalize_title};
use crate::ingest::types::{within_window, Item, SourceProvider};

const DEFAULT_PAGE_SIZE: u32 = 20;
const DEFAULT_API_LANGUAGE: &str = "en";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    title: Option<String>,
    url: Option<String>,
    description: Option<String>,
    source: Option<ArticleSource>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArticleSource {
    name: Option<String>,
}

pub struct NewsApiProvider {
    descriptor: SourceDescriptor,
    api_key: Option<String>,
    keywords: Vec<String>,
    include_undated: bool,
    client: reqwest::Client,
}

impl NewsApiProvider {
    pub fn new(
        descriptor: SourceDescriptor,
        api_key: Option<String>,
        keywords: Vec<String>,
        include_undated: bool,
        client: reqwest::Client,
    ) -> Self {
        Self {
            descriptor,
            api_key,
            keywords,
            include_undated,
            client,
        }
    }

    /// `q`: the configured query, else the keyword disjunction `"a" OR "b"`.
    pub fn query(&self) -> String {
        if let Some(q) = self.descriptor.query.as_deref().filter(|q| !q.trim().is_empty()) {
            return q.trim().to_string();
        }
        self.keywords
            .iter()
            .map(|k| format!("\"{}\"", k.replace('"', "")))
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    /// Query string for one call. `apiKey` is appended by the caller.
    pub fn query_params(&self, since: DateTime<Utc>) -> Vec<(&'static str, String)> {
        vec![
            ("q", self.query()),
            ("from", since.format("%Y-%m-%d").to_string()),
            (
                "language",
                self.descriptor
                    .api_language
                    .clone()
                    .unwrap_or_else(|| DEFAULT_API_LANGUAGE.to_string()),
            ),
            ("sortBy", "publishedAt".to_string()),
            (
                "pageSize",
                self.descriptor
                    .page_size
                    .unwrap_or(DEFAULT_PAGE_SIZE)
                    .to_string(),
            ),
        ]
    }

    /// Decode a search response body into window-filtered items.
    pub fn parse_response(&self, body: &str, since: DateTime<Utc>) -> Result<Vec<Item>> {
        let resp: SearchResponse =
            serde_json::from_str(body).context("parsing news api response json")?;

        let items = resp
            .articles
            .into_iter()
            .filter_map(|a| {
                let url = a.url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty())?;
                let title = normalize_title(a.title.as_deref().unwrap_or_default());
                let source = a
                    .source
                    .and_then(|s| s.name)
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| self.descriptor.name.clone());
                Some(Item {
                    title,
                    url,
                    summary: normalize_text(a.description.as_deref().unwrap_or_default()),
                    source,
                    language: self.descriptor.language,
                    published_at: a.published_at.as_deref().and_then(parse_timestamp),
                })
            })
            .filter(|it| !it.title.is_empty())
            .filter(|it| within_window(it.published_at, since, self.include_undated))
            .collect();
        Ok(items)
    }
}

#[async_trait]
impl SourceProvider for NewsApiProvider {
    async fn fetch_window(&self, since: DateTime<Utc>) -> Result<Vec<Item>> {
        let Some(key) = self.api_key.as_deref() else {
            tracing::info!(target: "ingest", source = %self.descriptor.name, "no NEWSAPI_KEY; skipping search source");
            return Ok(Vec::new());
        };
        if self.query().is_empty() {
            tracing::info!(target: "ingest", source = %self.descriptor.name, "empty search query; skipping");
            return Ok(Vec::new());
        }

        let mut params = self.query_params(since);
        params.push(("apiKey", key.to_string()));

        let resp = self
            .client
            .get(&self.descriptor.endpoint)
            .query(&params)
            .send()
            .await
            .context("news api http get")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("news api returned status: {status}");
        }
        let body = resp.text().await.context("news api http .text()")?;
        self.parse_response(&body, since)
    }

    fn name(&self) -> &str {
        &self.descriptor.name
    }
}
