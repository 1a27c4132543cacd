//! Message delivery to Telegram chats.
//!
//! [`MessageSender`] is the seam between the dispatcher and the transport.
//! [`TelegramSender`] posts to the Bot API `sendMessage` method and retries
//! network errors and 5xx responses; [`LogSender`] is used when no bot token
//! is configured and only writes the rendered text to the log.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use rattle_core::config::NotifierConfig;
use serde_json::json;

/// Delivers one rendered message to one chat.
pub trait MessageSender: Send + Sync + 'static {
    /// Send `text` (MarkdownV2) to `chat_id`.
    ///
    /// # Errors
    ///
    /// Returns an error once the message is considered undeliverable.
    fn send(&self, chat_id: &str, text: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Telegram Bot API sender.
pub struct TelegramSender {
    client: reqwest::Client,
    endpoint: String,
    max_attempts: u32,
    retry_delay: Duration,
}

impl TelegramSender {
    /// Build a sender from the `[notifier]` section.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty or the HTTP client cannot be built.
    pub fn from_config(config: &NotifierConfig) -> Result<Self> {
        if config.telegram_token.is_empty() {
            return Err(anyhow::anyhow!("telegram token is not configured"));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                config.api_base_url.trim_end_matches('/'),
                config.telegram_token
            ),
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        })
    }

    async fn attempt(&self, chat_id: &str, text: &str) -> Result<(), Attempt> {
        let body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "MarkdownV2",
        });
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| Attempt::Retry(format!("request failed: {}", e.without_url())))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let detail = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            Err(Attempt::Retry(format!("telegram responded {status}: {detail}")))
        } else {
            Err(Attempt::Fatal(format!("telegram responded {status}: {detail}")))
        }
    }
}

/// Outcome of a failed delivery attempt.
enum Attempt {
    Retry(String),
    Fatal(String),
}

impl MessageSender for TelegramSender {
    async fn send(&self, chat_id: &str, text: &str) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.attempt(chat_id, text).await {
                Ok(()) => return Ok(()),
                Err(Attempt::Fatal(reason)) => return Err(anyhow::anyhow!(reason)),
                Err(Attempt::Retry(reason)) if attempt >= self.max_attempts => {
                    return Err(anyhow::anyhow!(
                        "giving up after {} attempts: {}",
                        attempt,
                        reason
                    ));
                }
                Err(Attempt::Retry(reason)) => {
                    tracing::debug!(chat_id, attempt, reason = %reason, "telegram delivery failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Sender used when no bot token is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSender;

impl MessageSender for LogSender {
    async fn send(&self, chat_id: &str, text: &str) -> Result<()> {
        tracing::info!(chat_id, message = text, "notification (telegram disabled)");
        Ok(())
    }
}
