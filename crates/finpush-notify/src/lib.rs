//! Notification delivery for analysis reports with a closed channel set.
//!
//! A [`NotificationMessage`] is fanned out by the [`dispatcher::Dispatcher`]
//! to every configured [`ChannelAdapter`]. Built-in channels: Feishu-style
//! signed webhook, plain webhook, Telegram bot API, and SMTP email.

pub mod channels;
pub mod dispatcher;
pub mod error;
pub mod render;
pub mod signer;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use finpush_common::types::{ChannelType, NotificationMessage};

use crate::error::Result;

/// What a successful attempt got back from the remote endpoint.
#[derive(Debug, Clone, Default)]
pub struct SendReceipt {
    pub http_status: Option<u16>,
    /// Truncated response body, kept for the attempt record.
    pub response_body: Option<String>,
}

/// A notification delivery channel.
///
/// `send` performs exactly one delivery attempt; retry, backoff and timeout
/// handling belong to the [`dispatcher::Dispatcher`]. Implementations are
/// built from a channel configuration by [`channels::build_adapter`].
#[async_trait]
pub trait ChannelAdapter: Send + Sync + std::fmt::Debug {
    /// Delivers the message through this channel, once.
    ///
    /// # Errors
    ///
    /// Returns a [`error::NotifyError`] whose classification
    /// (`is_retryable`) drives the dispatcher's retry decision.
    async fn send(&self, message: &NotificationMessage) -> Result<SendReceipt>;

    fn channel_type(&self) -> ChannelType;

    /// The configured channel id, used to key the dispatch result.
    fn channel_id(&self) -> &str;
}
