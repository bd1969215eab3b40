//! Webhook request signing.
//!
//! The signed-webhook scheme keys the HMAC with the timestamp itself: the
//! key is the byte string `"{timestamp}\n{secret}"` and the HMAC message is
//! empty. The base64 digest and the timestamp both go into the outgoing
//! payload; skew tolerance is enforced by the remote service, not here.

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{NotifyError, Result};

type HmacSha256 = Hmac<Sha256>;

/// A computed signature and the timestamp it was computed for. Both values
/// must be transmitted in the request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub timestamp: i64,
    pub sign: String,
}

/// Compute the webhook signature for `secret` at `timestamp` (seconds since
/// epoch). Deterministic for fixed inputs.
///
/// # Errors
///
/// Returns [`NotifyError::InvalidConfig`] when `secret` is empty.
pub fn sign(secret: &str, timestamp: i64) -> Result<Signature> {
    if secret.is_empty() {
        return Err(NotifyError::InvalidConfig(
            "signing secret must not be empty".to_string(),
        ));
    }

    let key = format!("{timestamp}\n{secret}");
    let mac = HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC can take key of any size");
    let digest = mac.finalize().into_bytes();

    Ok(Signature {
        timestamp,
        sign: base64::engine::general_purpose::STANDARD.encode(digest),
    })
}
