//! Telegram Bot API client and the notification sink

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use crate::shared::errors::AppError;

/// Обёртка ответа Bot API
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

/// Thin client over the Bot API. All messages go out with HTML parse
/// mode, matching the notification templates.
pub struct TelegramApi {
    http_client: Client,
    base_url: String,
}

impl TelegramApi {
    pub fn new(http_client: Client, token: &str) -> Self {
        Self {
            http_client,
            base_url: format!("https://api.telegram.org/bot{}", token),
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        payload: serde_json::Value,
    ) -> Result<T, AppError> {
        self.call_with_timeout(method, payload, None).await
    }

    async fn call_with_timeout<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        payload: serde_json::Value,
        request_timeout: Option<Duration>,
    ) -> Result<T, AppError> {
        let url = format!("{}/{}", self.base_url, method);
        let mut request = self.http_client.post(&url).json(&payload);
        if let Some(timeout) = request_timeout {
            // Overrides the client-wide timeout for this request
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|e| AppError::Telegram(e.to_string()))?;

        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| AppError::Telegram(e.to_string()))?;

        if !body.ok {
            return Err(AppError::Telegram(
                body.description
                    .unwrap_or_else(|| format!("{} failed", method)),
            ));
        }
        body.result
            .ok_or_else(|| AppError::Telegram(format!("{}: empty result", method)))
    }

    /// Startup probe, fails fast on a bad token
    pub async fn get_me(&self) -> Result<User, AppError> {
        self.call("getMe", json!({})).await
    }

    /// Telegram holds the long poll open for up to `timeout_secs`, which
    /// exceeds the client-wide timeout — the request carries its own.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, AppError> {
        self.call_with_timeout(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message"],
            }),
            Some(long_poll_timeout(timeout_secs)),
        )
        .await
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), AppError> {
        let _: Message = self
            .call(
                "sendMessage",
                json!({
                    "chat_id": chat_id,
                    "text": text,
                    "parse_mode": "HTML",
                }),
            )
            .await?;
        Ok(())
    }
}

/// Request timeout for a long poll: the poll window plus margin, so the
/// held connection is never cut short by the client-wide timeout.
fn long_poll_timeout(poll_secs: u64) -> Duration {
    Duration::from_secs(poll_secs + 10)
}

/// One-way notification delivery to a chat destination
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, chat_id: i64, text: &str);
}

/// Fire-and-forget sink over the Bot API. Delivery failures are logged
/// here and never retried or surfaced to the polling loop.
pub struct TelegramSink {
    api: Arc<TelegramApi>,
}

impl TelegramSink {
    pub fn new(api: Arc<TelegramApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn deliver(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.api.send_message(chat_id, text).await {
            error!("Не удалось отправить уведомление в чат {}: {}", chat_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_poll_request_outlives_the_poll_window() {
        assert_eq!(long_poll_timeout(30), Duration::from_secs(40));
        assert!(long_poll_timeout(30) > Duration::from_secs(30));
    }
}
