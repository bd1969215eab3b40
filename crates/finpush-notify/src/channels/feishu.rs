use async_trait::async_trait;
use chrono::Utc;
use finpush_common::types::{ChannelConfig, ChannelType, NotificationMessage, Severity};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::channels::{embedded_code, embedded_message};
use crate::error::{NotifyError, Result};
use crate::render::{MAX_BODY_SNIPPET, render_markdown, truncate_utf8};
use crate::signer;
use crate::{ChannelAdapter, SendReceipt};

/// Rendered card bodies beyond this size are truncated rather than rejected
/// by the remote end.
pub const MAX_CARD_BYTES: usize = 20_000;

/// Signed interactive-card webhook channel.
///
/// When a `secret` credential is configured, every request carries the
/// integer `timestamp` and base64 `sign` fields computed by [`signer::sign`].
/// Without a secret the payload is identical minus those fields, which is
/// how an unsigned bot webhook behaves.
#[derive(Debug)]
pub struct FeishuChannel {
    id: String,
    client: reqwest::Client,
    endpoint: Url,
    secret: Option<String>,
}

impl FeishuChannel {
    pub fn from_config(config: &ChannelConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| NotifyError::InvalidConfig(format!("invalid feishu endpoint: {e}")))?;

        let secret = config.credential("secret").map(str::to_string);
        if matches!(secret.as_deref(), Some("")) {
            return Err(NotifyError::InvalidConfig(
                "feishu `secret` credential must not be empty".to_string(),
            ));
        }

        Ok(Self {
            id: config.id.clone(),
            client: reqwest::Client::new(),
            endpoint,
            secret,
        })
    }

    fn header_template(severity: Severity) -> &'static str {
        match severity {
            Severity::Info => "blue",
            Severity::Warning => "yellow",
            Severity::Error => "red",
        }
    }

    fn build_payload(&self, message: &NotificationMessage) -> Result<Value> {
        let content = truncate_utf8(&render_markdown(message), MAX_CARD_BYTES);
        let mut payload = serde_json::json!({
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
        });

        if let Some(secret) = &self.secret {
            let signature = signer::sign(secret, Utc::now().timestamp())?;
            payload["timestamp"] = serde_json::json!(signature.timestamp);
            payload["sign"] = serde_json::json!(signature.sign);
        }

        Ok(payload)
    }
}

#[async_trait]
impl ChannelAdapter for FeishuChannel {
    async fn send(&self, message: &NotificationMessage) -> Result<SendReceipt> {
        let payload = self.build_payload(message)?;

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
                service: "feishu",
                retry_after,
            });
        }
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "[failed to read response body]".to_string());
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body: truncate_utf8(&body, MAX_BODY_SNIPPET),
            });
        }

        let body: Value = resp.json().await?;
        match embedded_code(&body) {
            Some(0) => Ok(SendReceipt {
                http_status: Some(status.as_u16()),
                response_body: Some(truncate_utf8(&body.to_string(), MAX_BODY_SNIPPET)),
            }),
            Some(code) => Err(NotifyError::Api {
                service: "feishu",
                code,
                message: embedded_message(&body),
            }),
            None => Err(NotifyError::Api {
                service: "feishu",
                code: -1,
                message: "response carried no status code".to_string(),
            }),
        }
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Feishu
    }

    fn channel_id(&self) -> &str {
        &self.id
    }
}
