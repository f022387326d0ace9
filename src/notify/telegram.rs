//! Telegram Bot API delivery.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::Notifier;
use crate::config::{AlertsConfig, AppConfig};

const API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct SendResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramNotifier {
    http: Client,
    base_url: String,
    token: SecretString,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(token: SecretString, chat_id: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client for Telegram")?;

        Ok(Self {
            http,
            base_url: API_BASE.to_string(),
            token,
            chat_id,
        })
    }

    /// Build from the env-var names in `[alerts]`.
    pub fn from_config(cfg: &AlertsConfig) -> Result<Self> {
        let token = AppConfig::resolve_env(&cfg.telegram_bot_token_env)?;
        let chat_id = AppConfig::resolve_env(&cfg.telegram_chat_id_env)?;
        Self::new(SecretString::new(token), chat_id)
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.base_url, self.token.expose_secret())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        let resp = self
            .http
            .post(self.endpoint())
            .form(&[("chat_id", self.chat_id.as_str()), ("text", text)])
            .send()
            .await
            // reqwest errors carry the URL, which contains the token.
            .map_err(|e| anyhow::anyhow!("Telegram request failed: {}", e.without_url()))?;

        let status = resp.status();
        let body: SendResponse = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse Telegram response ({status})"))?;
        if !body.ok {
            bail!(
                "Telegram rejected message ({status}): {}",
                body.description.unwrap_or_default()
            );
        }

        debug!(chat_id = %self.chat_id, "Alert delivered");
        Ok(())
    }
}
