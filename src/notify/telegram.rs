// src/notify/telegram.rs
use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::Serialize;

use super::{Messenger, OutgoingMessage};

/// `sendMessage` request body.
#[derive(Debug, Serialize, PartialEq)]
pub struct SendMessage<'a> {
    pub chat_id: i64,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<&'static str>,
    pub disable_web_page_preview: bool,
}

impl<'a> SendMessage<'a> {
    pub fn new(chat_id: i64, msg: &'a OutgoingMessage) -> Self {
        Self {
            chat_id,
            text: &msg.text,
            parse_mode: msg.format_mode.parse_mode(),
            disable_web_page_preview: msg.suppress_link_preview,
        }
    }
}

pub struct TelegramMessenger {
    token: Option<String>,
    api_base: String,
    client: Client,
}

impl TelegramMessenger {
    pub fn new(token: Option<String>, api_base: impl Into<String>, client: Client) -> Self {
        Self {
            token: token.filter(|t| !t.trim().is_empty()),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn endpoint(&self, token: &str) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, token)
    }
}

#[async_trait::async_trait]
impl Messenger for TelegramMessenger {
    async fn post(&self, chat_id: i64, msg: &OutgoingMessage) -> Result<()> {
        let Some(token) = self.token.as_deref() else {
            bail!("telegram token missing");
        };
        let body = SendMessage::new(chat_id, msg);

        // The token is part of the URL: never let it into error messages.
        let resp = self
            .client
            .post(self.endpoint(token))
            .json(&body)
            .send()
            .await
            .map_err(|e| e.without_url())
            .context("telegram sendMessage")?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let detail = resp.text().await.unwrap_or_default();
            let detail: String = detail.chars().take(300).collect();
            bail!("telegram sendMessage returned {status}: {detail}");
        }
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}
