use async_trait::async_trait;
use chrono::Local;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use crate::error::NotifyError;
use crate::models::{Status, Transition};

pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, transition: &Transition) -> Result<(), NotifyError>;

    /// Free-form operator message, e.g. on startup.
    async fn announce(&self, _message: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Writes transitions to the log.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, t: &Transition) -> Result<(), NotifyError> {
        let msg = format!("[CHANGE] {} ({}) {} -> {}", t.host, t.ip, t.old, t.new);
        if t.new == Status::Down { error!("{}", msg); } else { warn!("{}", msg); }
        Ok(())
    }
}

pub struct WebhookSink {
    url: String,
    http_client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self { url: url.into(), http_client }
    }

    async fn post(&self, payload: &Value) -> Result<(), NotifyError> {
        let response = self.http_client.post(&self.url).json(payload).send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

pub fn webhook_payload(t: &Transition) -> Value {
    let color = if t.new == Status::Up { 0x2ECC71 } else { 0xE74C3C };
    json!({
        "username": "wakewatch",
        "embeds": [{
            "title": "Host Status Transition",
            "color": color,
            "fields": [
                { "name": "Host", "value": t.host, "inline": true },
                { "name": "IP", "value": t.ip.to_string(), "inline": true },
                { "name": "Transition", "value": format!("{} \u{2192} {}", t.old, t.new), "inline": true }
            ],
            "timestamp": t.at.to_rfc3339(),
        }]
    })
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn notify(&self, transition: &Transition) -> Result<(), NotifyError> {
        self.post(&webhook_payload(transition)).await
    }

    async fn announce(&self, message: &str) -> Result<(), NotifyError> {
        self.post(&json!({ "username": "wakewatch", "content": message })).await
    }
}

const TELEGRAM_API: &str = "https://api.telegram.org";

pub struct TelegramSink {
    bot_token: String,
    chat_id: i64,
    http_client: reqwest::Client,
}

impl TelegramSink {
    pub fn new(bot_token: impl Into<String>, chat_id: i64, http_client: reqwest::Client) -> Self {
        Self { bot_token: bot_token.into(), chat_id, http_client }
    }

    async fn send_message(&self, text: &str) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", TELEGRAM_API, self.bot_token);
        let response = self
            .http_client
            .post(url)
            .json(&json!({ "chat_id": self.chat_id, "text": text, "parse_mode": "Markdown" }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

pub fn telegram_text(t: &Transition) -> String {
    let emoji = if t.new == Status::Up { "🟢" } else { "🔴" };
    format!(
        "{} *{}* is now *{}*\n\n📍 IP: `{}`\n⏰ Time: {}",
        emoji,
        t.host,
        t.new,
        t.ip,
        t.at.with_timezone(&Local).format("%H:%M:%S")
    )
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn notify(&self, transition: &Transition) -> Result<(), NotifyError> {
        self.send_message(&telegram_text(transition)).await
    }

    async fn announce(&self, message: &str) -> Result<(), NotifyError> {
        self.send_message(message).await
    }
}

/// Delivers to every sink in turn. Each delivery is bounded by
/// [`DELIVERY_TIMEOUT`]; failures are logged and never retried.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }
}

async fn bounded<F>(delivery: F) -> Result<(), NotifyError>
where
    F: std::future::Future<Output = Result<(), NotifyError>>,
{
    tokio::time::timeout(DELIVERY_TIMEOUT, delivery)
        .await
        .unwrap_or(Err(NotifyError::Timeout))
}

#[async_trait]
impl NotificationSink for FanoutSink {
    async fn notify(&self, transition: &Transition) -> Result<(), NotifyError> {
        for sink in &self.sinks {
            if let Err(e) = bounded(sink.notify(transition)).await {
                error!(host = %transition.host, error = %e, "Failed to send status notification");
            }
        }
        Ok(())
    }

    async fn announce(&self, message: &str) -> Result<(), NotifyError> {
        for sink in &self.sinks {
            if let Err(e) = bounded(sink.announce(message)).await {
                error!(error = %e, "Failed to send announcement");
            }
        }
        Ok(())
    }
}
