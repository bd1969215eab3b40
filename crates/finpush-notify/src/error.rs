use std::time::Duration;

/// Errors raised by channel adapters and the dispatcher.
///
/// The retry policy keys off [`NotifyError::is_retryable`]: configuration and
/// provider rejections (a bad secret will not become good on retry) are
/// fatal, while network-level failures, 5xx responses, rate limits and
/// timeouts are retried until the attempt budget runs out.
///
/// # Examples
///
/// ```rust
/// use finpush_notify::error::NotifyError;
///
/// let err = NotifyError::InvalidConfig("missing `token` credential".to_string());
/// assert!(!err.is_retryable());
/// assert!(err.to_string().contains("token"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Channel configuration is missing a required field or holds an invalid
    /// value. Fatal for that channel only.
    #[error("invalid channel configuration: {0}")]
    InvalidConfig(String),

    /// The HTTP request could not be performed (connect failure, reset,
    /// malformed response stream).
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The endpoint answered with a non-success HTTP status.
    #[error("endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The provider accepted the request but rejected the message, e.g. a
    /// signature mismatch code embedded in a 200 response.
    #[error("{service} rejected the message: code={code}, {message}")]
    Api {
        service: &'static str,
        code: i64,
        message: String,
    },

    /// The provider rejected the credentials outright.
    #[error("{service} rejected the credentials: HTTP {status}")]
    Auth { service: &'static str, status: u16 },

    /// HTTP 429, optionally carrying the provider's backoff hint.
    #[error("rate limited by {service}")]
    RateLimited {
        service: &'static str,
        retry_after: Option<Duration>,
    },

    /// SMTP submission failed. Permanent rejections (authentication included)
    /// are fatal; transient ones are retried.
    #[error("SMTP error: {message}")]
    Smtp { message: String, transient: bool },

    /// The attempt exceeded the per-attempt timeout.
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The invocation deadline expired before the attempt could run.
    #[error("invocation deadline exceeded")]
    DeadlineExceeded,
}

impl NotifyError {
    pub fn is_retryable(&self) -> bool {
        match self {
            NotifyError::InvalidConfig(_) | NotifyError::Api { .. } | NotifyError::Auth { .. } => {
                false
            }
            NotifyError::Status { status, .. } => *status >= 500,
            NotifyError::Smtp { transient, .. } => *transient,
            NotifyError::Request(_)
            | NotifyError::RateLimited { .. }
            | NotifyError::Timeout(_)
            | NotifyError::DeadlineExceeded => true,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            NotifyError::Status { status, .. } | NotifyError::Auth { status, .. } => Some(*status),
            NotifyError::RateLimited { .. } => Some(429),
            NotifyError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Provider-supplied backoff hint, when one was given.
    pub fn backoff_hint(&self) -> Option<Duration> {
        match self {
            NotifyError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Convenience `Result` alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
