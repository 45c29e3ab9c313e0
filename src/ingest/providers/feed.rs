// src/ingest/providers/feed.rs
//! RSS 2.0 / RSS 1.0 / Atom provider built on the streaming `quick_xml::Reader`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::parse_timestamp;
use crate::config::SourceDescriptor;
use crate::ingest::{normalize_text, normalize_title};
use crate::ingest::types::{within_window, Item, SourceProvider};

const UNTITLED: &str = "(untitled)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Guid,
    Summary,
    Content,
    Published,
    Updated,
}

fn field_for(name: &[u8]) -> Option<Field> {
    match name {
        b"title" => Some(Field::Title),
        b"link" => Some(Field::Link),
        b"guid" | b"id" => Some(Field::Guid),
        b"description" | b"summary" => Some(Field::Summary),
        b"content" | b"content:encoded" => Some(Field::Content),
        b"pubDate" | b"published" => Some(Field::Published),
        b"updated" | b"dc:date" => Some(Field::Updated),
        _ => None,
    }
}

#[derive(Debug, Default)]
struct RawEntry {
    title: String,
    link: Option<String>,
    link_is_alternate: bool,
    guid: Option<String>,
    summary: String,
    content: String,
    published: Option<String>,
    updated: Option<String>,
}

impl RawEntry {
    fn set(&mut self, field: Field, text: String) {
        match field {
            Field::Title => self.title = text,
            Field::Link => {
                if self.link.is_none() && !text.trim().is_empty() {
                    self.link = Some(text.trim().to_string());
                }
            }
            Field::Guid => self.guid = Some(text),
            Field::Summary => self.summary = text,
            Field::Content => self.content = text,
            Field::Published => self.published = Some(text),
            Field::Updated => self.updated = Some(text),
        }
    }

    /// Atom `<link href=".." rel=".."/>`: the alternate link wins, else the first one.
    fn offer_href(&mut self, href: String, rel: Option<String>) {
        let alternate = rel.as_deref().map_or(true, |r| r == "alternate");
        if alternate && !self.link_is_alternate {
            self.link = Some(href);
            self.link_is_alternate = true;
        } else if self.link.is_none() {
            self.link = Some(href);
        }
    }

    fn into_item(self, descriptor: &SourceDescriptor) -> Option<Item> {
        let guid_url = self
            .guid
            .map(|g| g.trim().to_string())
            .filter(|g| g.starts_with("http://") || g.starts_with("https://"));
        // Element text arrives still escaped (`&amp;` in query strings).
        let url = html_escape::decode_html_entities(&self.link.or(guid_url)?).into_owned();

        let title = normalize_title(&self.title);
        let summary_raw = if self.summary.trim().is_empty() {
            &self.content
        } else {
            &self.summary
        };

        // Prefer the explicit publish date, fall back to the update date.
        let published_at = self
            .published
            .as_deref()
            .and_then(parse_timestamp)
            .or_else(|| self.updated.as_deref().and_then(parse_timestamp));

        Some(Item {
            title: if title.is_empty() {
                UNTITLED.to_string()
            } else {
                title
            },
            url,
            summary: normalize_text(summary_raw),
            source: descriptor.name.clone(),
            language: descriptor.language,
            published_at,
        })
    }
}

fn attr(e: &BytesStart<'_>, key: &str) -> Option<String> {
    e.try_get_attribute(key)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.trim().to_string()))
        .filter(|v| !v.is_empty())
}

fn check_root(e: &BytesStart<'_>) -> Result<()> {
    match e.local_name().as_ref() {
        b"rss" | b"feed" | b"RDF" => Ok(()),
        other => bail!(
            "not an RSS/Atom document (root <{}>)",
            String::from_utf8_lossy(other)
        ),
    }
}

/// Parse every entry of an RSS/Atom document, in document order.
/// Entries without a usable link are dropped: the link is the item identity.
/// A document that is not a feed, or is not well-formed, is an error.
pub fn parse_feed(xml: &str, descriptor: &SourceDescriptor) -> Result<Vec<Item>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut seen_root = false;
    // (depth of the <item>/<entry> element, accumulated fields)
    let mut entry: Option<(usize, RawEntry)> = None;
    let mut field: Option<(Field, String)> = None;

    loop {
        let event = reader
            .read_event()
            .with_context(|| format!("malformed feed xml from {}", descriptor.name))?;
        match event {
            Event::Start(e) => {
                depth += 1;
                if !seen_root {
                    check_root(&e)?;
                    seen_root = true;
                    continue;
                }
                let name = e.name();
                if entry.is_none() {
                    if matches!(name.as_ref(), b"item" | b"entry") {
                        entry = Some((depth, RawEntry::default()));
                    }
                } else if let Some((entry_depth, raw)) = entry.as_mut() {
                    if depth == *entry_depth + 1 {
                        if let Some(f) = field_for(name.as_ref()) {
                            if f == Field::Link {
                                if let Some(href) = attr(&e, "href") {
                                    raw.offer_href(href, attr(&e, "rel"));
                                }
                            }
                            field = Some((f, String::new()));
                        }
                    }
                }
            }
            Event::Empty(e) => {
                if !seen_root {
                    check_root(&e)?;
                    seen_root = true;
                    continue;
                }
                if let Some((entry_depth, raw)) = entry.as_mut() {
                    if depth == *entry_depth && e.name().as_ref() == b"link" {
                        if let Some(href) = attr(&e, "href") {
                            raw.offer_href(href, attr(&e, "rel"));
                        }
                    }
                }
            }
            Event::Text(t) => {
                if let Some((_, buf)) = field.as_mut() {
                    buf.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Event::CData(t) => {
                if let Some((_, buf)) = field.as_mut() {
                    buf.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Event::End(e) => {
                let closing = depth;
                depth = depth.saturating_sub(1);
                let Some(entry_depth) = entry.as_ref().map(|(d, _)| *d) else {
                    continue;
                };
                if closing == entry_depth + 1 {
                    if let (Some((f, text)), Some((_, raw))) = (field.take(), entry.as_mut()) {
                        raw.set(f, text);
                    }
                } else if closing == entry_depth && matches!(e.name().as_ref(), b"item" | b"entry")
                {
                    if let Some(item) = entry.take().and_then(|(_, raw)| raw.into_item(descriptor)) {
                        out.push(item);
                    }
                }
            }
            Event::Eof => {
                if !seen_root {
                    bail!("empty feed document from {}", descriptor.name);
                }
                if depth != 0 {
                    bail!("truncated feed document from {}", descriptor.name);
                }
                break;
            }
            _ => {}
        }
    }

    Ok(out)
}

pub struct FeedProvider {
    descriptor: SourceDescriptor,
    include_undated: bool,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { client: reqwest::Client },
}

impl FeedProvider {
    pub fn from_url(
        descriptor: SourceDescriptor,
        include_undated: bool,
        client: reqwest::Client,
    ) -> Self {
        Self {
            descriptor,
            include_undated,
            mode: Mode::Http { client },
        }
    }

    /// Parse an in-memory document instead of fetching `descriptor.endpoint`.
    pub fn from_fixture(descriptor: SourceDescriptor, include_undated: bool, xml: &str) -> Self {
        Self {
            descriptor,
            include_undated,
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    fn items_in_window(&self, xml: &str, since: DateTime<Utc>) -> Result<Vec<Item>> {
        let t0 = std::time::Instant::now();
        let items = parse_feed(xml, &self.descriptor)?;
        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("digest_feed_parse_ms").record(ms);

        Ok(items
            .into_iter()
            .filter(|it| within_window(it.published_at, since, self.include_undated))
            .collect())
    }
}

#[async_trait]
impl SourceProvider for FeedProvider {
    async fn fetch_window(&self, since: DateTime<Utc>) -> Result<Vec<Item>> {
        match &self.mode {
            Mode::Fixture(xml) => self.items_in_window(xml, since),
            Mode::Http { client } => {
                let url = self.descriptor.endpoint.as_str();
                let resp = client
                    .get(url)
                    .send()
                    .await
                    .with_context(|| format!("feed http get {url}"))?;
                let status = resp.status();
                if !status.is_success() {
                    bail!("feed fetch failed with status: {status}");
                }
                let body = resp.text().await.context("feed http .text()")?;
                self.items_in_window(&body, since)
            }
        }
    }

    fn name(&self) -> &str {
        &self.descriptor.name
    }
}
