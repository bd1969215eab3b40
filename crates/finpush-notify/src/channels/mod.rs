//! Channel adapter implementations, one per [`ChannelType`] variant.

pub mod email;
pub mod feishu;
pub mod telegram;
pub mod webhook;

use finpush_common::types::{ChannelConfig, ChannelType};
use serde_json::Value;

use crate::ChannelAdapter;
use crate::error::Result;

/// Build the adapter for a channel configuration.
///
/// Channel types are a closed set; adding one means a new [`ChannelType`]
/// variant and a new arm here, checked at compile time.
///
/// # Errors
///
/// Returns [`crate::error::NotifyError::InvalidConfig`] when the
/// configuration is missing a required credential or the endpoint is
/// malformed. The dispatcher records such a channel as a fatal failure
/// without blocking the others.
pub fn build_adapter(config: &ChannelConfig) -> Result<Box<dyn ChannelAdapter>> {
    match config.channel_type {
        ChannelType::Feishu => Ok(Box::new(feishu::FeishuChannel::from_config(config)?)),
        ChannelType::Webhook => Ok(Box::new(webhook::WebhookChannel::from_config(config)?)),
        ChannelType::Telegram => Ok(Box::new(telegram::TelegramChannel::from_config(config)?)),
        ChannelType::Email => Ok(Box::new(email::EmailChannel::from_config(config)?)),
    }
}

/// Status code embedded in a webhook response body. Newer endpoints answer
/// with `code`, legacy ones with `StatusCode`.
pub(crate) fn embedded_code(body: &Value) -> Option<i64> {
    body.get("code")
        .or_else(|| body.get("StatusCode"))
        .and_then(Value::as_i64)
}

pub(crate) fn embedded_message(body: &Value) -> String {
    body.get("msg")
        .or_else(|| body.get("StatusMessage"))
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string()
}
