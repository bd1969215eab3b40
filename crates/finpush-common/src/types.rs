use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Message severity, ordered from lowest to highest.
///
/// Severity affects rendering where the channel supports it (card color,
/// subject tag); it never affects whether a channel is dispatched to.
///
/// # Examples
///
/// ```
/// use finpush_common::types::Severity;
///
/// let sev: Severity = "warning".parse().unwrap();
/// assert_eq!(sev, Severity::Warning);
/// assert_eq!(sev.to_string(), "warning");
/// assert!(Severity::Error > Severity::Info);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// A labelled URL inside a [`Section::Links`] block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub label: String,
    pub url: String,
}

/// One block of structured message content. Channel adapters render sections
/// into their native markup (card markdown, plain text, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Section {
    Text { content: String },
    Table { rows: Vec<(String, String)> },
    Links { links: Vec<Link> },
}

/// One logical notification, built once per job-runner cycle.
///
/// Immutable after construction: adapters and the dispatcher only ever read
/// it. `idempotency_key` is stable per logical report (source slug + report
/// date) and lets the job runner recognize repeated sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub title: String,
    pub sections: Vec<Section>,
    pub severity: Severity,
    pub idempotency_key: String,
}

/// The closed set of supported channel types.
///
/// Adding a channel type is a compile-time extension: a new variant here plus
/// an adapter implementation, never a runtime string match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    /// Signed webhook (Feishu-style interactive card with HMAC signature).
    Feishu,
    /// Plain webhook, same card payload without signing.
    Webhook,
    /// Bot-token messaging API.
    Telegram,
    /// SMTP mail submission.
    Email,
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelType::Feishu => write!(f, "feishu"),
            ChannelType::Webhook => write!(f, "webhook"),
            ChannelType::Telegram => write!(f, "telegram"),
            ChannelType::Email => write!(f, "email"),
        }
    }
}

/// One configured notification destination, resolved once per invocation and
/// read-only afterwards.
///
/// `endpoint` stays a plain string here; each adapter validates it when it is
/// built, so a malformed URL is a configuration failure for that channel only.
/// `credentials` holds already-resolved secrets (`secret`, `token`,
/// `username`, `password`); non-secret settings such as the email `from`
/// address live in `options`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: String,
    pub channel_type: ChannelType,
    pub endpoint: String,
    #[serde(default)]
    pub credentials: HashMap<String, String>,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub options: HashMap<String, String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ChannelConfig {
    pub fn credential(&self, name: &str) -> Option<&str> {
        self.credentials.get(name).map(String::as_str)
    }

    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }
}
