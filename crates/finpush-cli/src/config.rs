//! Application configuration.
//!
//! All configuration is resolved here, once, at invocation start: the core
//! components receive immutable values and never perform ambient lookups.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use finpush_common::types::{ChannelConfig, Severity};
use finpush_notify::dispatcher::{DispatchOptions, RetryPolicy};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_secs: default_attempt_timeout_secs(),
            max_attempts: default_max_attempts(),
            initial_backoff_secs: default_initial_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
        }
    }
}

/// Detail level for the rendered report body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    Full,
    Compact,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    /// `compact` always compacts; `full` compacts only when `auto_compact`
    /// is set and the report exceeds the size threshold.
    #[serde(default = "default_detail_level")]
    pub detail_level: DetailLevel,
    #[serde(default = "default_auto_compact")]
    pub auto_compact: bool,
    #[serde(default = "default_report_severity")]
    pub severity: Severity,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            detail_level: default_detail_level(),
            auto_compact: default_auto_compact(),
            severity: default_report_severity(),
        }
    }
}

fn default_attempt_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_secs() -> u64 {
    2
}

fn default_max_backoff_secs() -> u64 {
    30
}

fn default_detail_level() -> DetailLevel {
    DetailLevel::Full
}

fn default_auto_compact() -> bool {
    true
}

fn default_report_severity() -> Severity {
    Severity::Info
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            retry: RetryPolicy {
                max_attempts: self.dispatch.max_attempts,
                initial_backoff: Duration::from_secs(self.dispatch.initial_backoff_secs),
                max_backoff: Duration::from_secs(self.dispatch.max_backoff_secs),
            },
            attempt_timeout: Duration::from_secs(self.dispatch.attempt_timeout_secs),
        }
    }

    pub fn enabled_channel_count(&self) -> usize {
        self.channels.iter().filter(|c| c.enabled).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finpush_common::types::ChannelType;

    #[test]
    fn full_config_parses() {
        let config: AppConfig = toml::from_str(
            r#"
            [dispatch]
            attempt_timeout_secs = 5
            max_attempts = 2
            initial_backoff_secs = 1
            max_backoff_secs = 8

            [report]
            detail_level = "compact"
            auto_compact = false
            severity = "warning"

            [[channels]]
            id = "feishu-main"
            channel_type = "feishu"
            endpoint = "https://open.feishu.cn/open-apis/bot/v2/hook/abc"
            [channels.credentials]
            secret = "SEC_x"

            [[channels]]
            id = "ops-mail"
            channel_type = "email"
            endpoint = "smtp://smtp.example.com:587"
            recipients = ["ops@example.com"]
            enabled = false
            [channels.credentials]
            username = "bot"
            password = "hunter2"
            [channels.options]
            from = "noreply@example.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.dispatch.max_attempts, 2);
        assert_eq!(config.report.detail_level, DetailLevel::Compact);
        assert!(!config.report.auto_compact);
        assert_eq!(config.report.severity, Severity::Warning);

        assert_eq!(config.channels.len(), 2);
        assert_eq!(config.channels[0].channel_type, ChannelType::Feishu);
        assert_eq!(config.channels[0].credential("secret"), Some("SEC_x"));
        assert!(config.channels[0].enabled);
        assert!(!config.channels[1].enabled);
        assert_eq!(config.enabled_channel_count(), 1);

        let options = config.dispatch_options();
        assert_eq!(options.attempt_timeout, Duration::from_secs(5));
        assert_eq!(options.retry.initial_backoff, Duration::from_secs(1));
    }

    #[test]
    fn defaults_cover_an_empty_config() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.dispatch.attempt_timeout_secs, 10);
        assert_eq!(config.dispatch.max_attempts, 3);
        assert_eq!(config.dispatch.initial_backoff_secs, 2);
        assert_eq!(config.dispatch.max_backoff_secs, 30);
        assert_eq!(config.report.detail_level, DetailLevel::Full);
        assert!(config.report.auto_compact);
        assert!(config.channels.is_empty());
    }
}
