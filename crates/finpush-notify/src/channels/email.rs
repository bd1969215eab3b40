use async_trait::async_trait;
use finpush_common::types::{ChannelConfig, ChannelType, NotificationMessage};
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use url::Url;

use crate::error::{NotifyError, Result};
use crate::render::render_plain;
use crate::{ChannelAdapter, SendReceipt};

/// SMTP mail submission channel.
///
/// Endpoint format is `smtp://host:port`; `username`/`password` credentials
/// are optional, the `from` option and at least one recipient are required.
/// Permanent SMTP rejections (authentication included) are fatal, transient
/// delivery failures are retried by the dispatcher.
#[derive(Debug)]
pub struct EmailChannel {
    id: String,
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailChannel {
    pub fn from_config(config: &ChannelConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| NotifyError::InvalidConfig(format!("invalid email endpoint: {e}")))?;
        let host = endpoint.host_str().ok_or_else(|| {
            NotifyError::InvalidConfig("email endpoint is missing a host".to_string())
        })?;
        let port = endpoint.port().unwrap_or(587);

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| NotifyError::InvalidConfig(format!("invalid smtp relay: {e}")))?
            .port(port);

        if let (Some(user), Some(pass)) = (
            config.credential("username"),
            config.credential("password"),
        ) {
            builder = builder.credentials(Credentials::new(user.to_string(), pass.to_string()));
        }

        let from: Mailbox = config
            .option("from")
            .ok_or_else(|| {
                NotifyError::InvalidConfig("email channel requires a `from` option".to_string())
            })?
            .parse()
            .map_err(|e| NotifyError::InvalidConfig(format!("invalid from address: {e}")))?;

        if config.recipients.is_empty() {
            return Err(NotifyError::InvalidConfig(
                "email channel requires at least one recipient".to_string(),
            ));
        }
        let to = config
            .recipients
            .iter()
            .map(|addr| {
                addr.parse::<Mailbox>().map_err(|e| {
                    NotifyError::InvalidConfig(format!("invalid recipient {addr}: {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id: config.id.clone(),
            transport: builder.build(),
            from,
            to,
        })
    }

    fn subject(message: &NotificationMessage) -> String {
        format!("[finpush][{}] {}", message.severity, message.title)
    }
}

#[async_trait]
impl ChannelAdapter for EmailChannel {
    async fn send(&self, message: &NotificationMessage) -> Result<SendReceipt> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(Self::subject(message))
            .header(ContentType::TEXT_PLAIN);
        for mailbox in &self.to {
            builder = builder.to(mailbox.clone());
        }
        let email = builder
            .body(render_plain(message))
            .map_err(|e| NotifyError::InvalidConfig(format!("failed to build email: {e}")))?;

        match self.transport.send(email).await {
            Ok(_) => Ok(SendReceipt::default()),
            Err(e) => Err(NotifyError::Smtp {
                message: e.to_string(),
                transient: !e.is_permanent(),
            }),
        }
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Email
    }

    fn channel_id(&self) -> &str {
        &self.id
    }
}
