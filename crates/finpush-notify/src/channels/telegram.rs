use async_trait::async_trait;
use finpush_common::types::{ChannelConfig, ChannelType, NotificationMessage};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::error::{NotifyError, Result};
use crate::render::{MAX_BODY_SNIPPET, render_plain, truncate_chars, truncate_utf8};
use crate::{ChannelAdapter, SendReceipt};

/// The bot API rejects messages over this many characters.
pub const MAX_TEXT_CHARS: usize = 4096;

/// Bot-token messaging channel.
///
/// Delivers one `sendMessage` call per configured chat id. 401/403 mean the
/// token is bad and retrying is pointless; 429 carries the provider's
/// `retry_after` hint; 5xx is transient.
#[derive(Debug)]
pub struct TelegramChannel {
    id: String,
    client: reqwest::Client,
    send_url: Url,
    chat_ids: Vec<String>,
}

impl TelegramChannel {
    pub fn from_config(config: &ChannelConfig) -> Result<Self> {
        let token = config
            .credential("token")
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                NotifyError::InvalidConfig(
                    "telegram channel requires a `token` credential".to_string(),
                )
            })?;

        let base = config.endpoint.trim_end_matches('/');
        let send_url = Url::parse(&format!("{base}/bot{token}/sendMessage"))
            .map_err(|e| NotifyError::InvalidConfig(format!("invalid telegram endpoint: {e}")))?;

        if config.recipients.is_empty() {
            return Err(NotifyError::InvalidConfig(
                "telegram channel requires at least one chat id recipient".to_string(),
            ));
        }

        Ok(Self {
            id: config.id.clone(),
            client: reqwest::Client::new(),
            send_url,
            chat_ids: config.recipients.clone(),
        })
    }

    fn render_text(message: &NotificationMessage) -> String {
        let body = render_plain(message);
        let text = if body.is_empty() {
            message.title.clone()
        } else {
            format!("{}\n\n{}", message.title, body)
        };
        truncate_chars(&text, MAX_TEXT_CHARS)
    }

    async fn send_to_chat(&self, chat_id: &str, text: &str) -> Result<SendReceipt> {
        let payload = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });

        let resp = self
            .client
            .post(self.send_url.clone())
            .json(&payload)
            .send()
            .await?;
        let status = resp.status();

        match status.as_u16() {
            401 | 403 => {
                return Err(NotifyError::Auth {
                    service: "telegram",
                    status: status.as_u16(),
                });
            }
            429 => {
                let body: Value = resp.json().await.unwrap_or_default();
                let retry_after = body
                    .pointer("/parameters/retry_after")
                    .and_then(Value::as_u64)
                    .map(Duration::from_secs);
                return Err(NotifyError::RateLimited {
                    service: "telegram",
                    retry_after,
                });
            }
            s if s >= 500 => {
                let body = resp.text().await.unwrap_or_default();
                return Err(NotifyError::Status {
                    status: s,
                    body: truncate_utf8(&body, MAX_BODY_SNIPPET),
                });
            }
            _ => {}
        }

        let text_body = resp.text().await?;
        let body: Value = serde_json::from_str(&text_body).map_err(|_| NotifyError::Status {
            status: status.as_u16(),
            body: truncate_utf8(&text_body, MAX_BODY_SNIPPET),
        })?;

        if body.get("ok").and_then(Value::as_bool) != Some(true) {
            let code = body.get("error_code").and_then(Value::as_i64).unwrap_or(-1);
            let message = body
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(NotifyError::Api {
                service: "telegram",
                code,
                message,
            });
        }

        Ok(SendReceipt {
            http_status: Some(status.as_u16()),
            response_body: Some(truncate_utf8(&text_body, MAX_BODY_SNIPPET)),
        })
    }
}

#[async_trait]
impl ChannelAdapter for TelegramChannel {
    async fn send(&self, message: &NotificationMessage) -> Result<SendReceipt> {
        let text = Self::render_text(message);

        let mut last = SendReceipt::default();
        for chat_id in &self.chat_ids {
            last = self.send_to_chat(chat_id, &text).await?;
            tracing::debug!(channel = %self.id, chat_id = %chat_id, "telegram message delivered");
        }
        Ok(last)
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Telegram
    }

    fn channel_id(&self) -> &str {
        &self.id
    }
}
