use async_trait::async_trait;
use finpush_common::types::{ChannelConfig, ChannelType, NotificationMessage, Severity};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::channels::{embedded_code, embedded_message};
use crate::error::{NotifyError, Result};
use crate::render::{MAX_BODY_SNIPPET, render_markdown, truncate_utf8};
use crate::{ChannelAdapter, SendReceipt};

/// Plain webhook channel: the same card payload as the signed variant,
/// without `timestamp`/`sign`.
///
/// Classification matches the signed channel, with one relaxation: a 2xx
/// response whose body carries no parseable status code counts as success,
/// since generic receivers often answer with an empty body.
#[derive(Debug)]
pub struct WebhookChannel {
    id: String,
    client: reqwest::Client,
    endpoint: Url,
}

impl WebhookChannel {
    pub fn from_config(config: &ChannelConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| NotifyError::InvalidConfig(format!("invalid webhook endpoint: {e}")))?;

        Ok(Self {
            id: config.id.clone(),
            client: reqwest::Client::new(),
            endpoint,
        })
    }

    fn header_template(severity: Severity) -> &'static str {
        match severity {
            Severity::Info => "blue",
            Severity::Warning => "yellow",
            Severity::Error => "red",
        }
    }

    fn build_payload(&self, message: &NotificationMessage) -> Value {
        let content = truncate_utf8(&render_markdown(message), super::feishu::MAX_CARD_BYTES);
        serde_json::json!({
            "msg_type": "interactive",
            "card": {
                "config": { "wide_screen_mode": true },
                "header": {
                    "title": { "tag": "plain_text", "content": message.title },
                    "template": Self::header_template(message.severity),
                },
                "elements": [
                    { "tag": "div", "text": { "tag": "lark_md", "content": content } }
                ],
            }
        })
    }
}

#[async_trait]
impl ChannelAdapter for WebhookChannel {
    async fn send(&self, message: &NotificationMessage) -> Result<SendReceipt> {
        let payload = self.build_payload(message);

        let resp = self
            .client
            .post(self.endpoint.clone())
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;
        let status = resp.status();

        if status.as_u16() == 429 {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(NotifyError::RateLimited {
                service: "webhook",
                retry_after,
            });
        }

        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body: truncate_utf8(&text, MAX_BODY_SNIPPET),
            });
        }

        if let Ok(body) = serde_json::from_str::<Value>(&text) {
            if let Some(code) = embedded_code(&body) {
                if code != 0 {
                    return Err(NotifyError::Api {
                        service: "webhook",
                        code,
                        message: embedded_message(&body),
                    });
                }
            }
        }

        Ok(SendReceipt {
            http_status: Some(status.as_u16()),
            response_body: (!text.is_empty()).then(|| truncate_utf8(&text, MAX_BODY_SNIPPET)),
        })
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Webhook
    }

    fn channel_id(&self) -> &str {
        &self.id
    }
}
