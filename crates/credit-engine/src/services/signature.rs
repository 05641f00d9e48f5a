//! Payment provider webhook signature verification
//!
//! Signature: `v1=` + hex(HMAC-SHA256(secret, "v1.{timestamp}.{raw body}")).
//! The signature header may list several comma-separated candidates during
//! key rotation; any match is accepted. Timestamps are milliseconds since
//! the epoch and must fall within five minutes of the server clock.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::{Choice, ConstantTimeEq};
use tracing::warn;

use crate::error::{CreditError, CreditResult};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_VERSION: &str = "v1";
/// Maximum accepted clock skew in milliseconds
pub const TIMESTAMP_TOLERANCE_MS: i64 = 5 * 60 * 1000;
/// Timestamps below this are taken to be in seconds
const SECONDS_THRESHOLD: i64 = 100_000_000_000;

/// Compute the `v1=` signature for a body and timestamp
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> CreditResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| CreditError::configuration(format!("Invalid webhook secret: {}", e)))?;
    mac.update(SIGNATURE_VERSION.as_bytes());
    mac.update(b".");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);

    Ok(format!(
        "{}={}",
        SIGNATURE_VERSION,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Parse a provider timestamp into milliseconds since the epoch
pub fn parse_timestamp_ms(raw: &str) -> Option<i64> {
    let value: i64 = raw.trim().parse().ok()?;
    if value <= 0 {
        return None;
    }
    if value < SECONDS_THRESHOLD {
        value.checked_mul(1000)
    } else {
        Some(value)
    }
}

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Option<String>,
}

impl WebhookVerifier {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Verify against the current clock
    pub fn verify(
        &self,
        body: &[u8],
        signature_header: Option<&str>,
        timestamp_header: Option<&str>,
    ) -> CreditResult<bool> {
        self.verify_at(
            body,
            signature_header,
            timestamp_header,
            Utc::now().timestamp_millis(),
        )
    }

    /// Verify against an explicit `now` (milliseconds since the epoch)
    ///
    /// A missing secret is an error, never a pass. Missing headers, a stale
    /// timestamp or no matching candidate return Ok(false).
    pub fn verify_at(
        &self,
        body: &[u8],
        signature_header: Option<&str>,
        timestamp_header: Option<&str>,
        now_ms: i64,
    ) -> CreditResult<bool> {
        let secret = self
            .secret
            .as_deref()
            .ok_or_else(|| CreditError::configuration("Webhook signing secret is not configured"))?;

        let (signature_header, timestamp_header) = match (signature_header, timestamp_header) {
            (Some(sig), Some(ts)) if !sig.trim().is_empty() && !ts.trim().is_empty() => (sig, ts),
            _ => {
                warn!("Webhook rejected: missing signature or timestamp header");
                return Ok(false);
            }
        };

        let timestamp_ms = match parse_timestamp_ms(timestamp_header) {
            Some(ts) => ts,
            None => {
                warn!(timestamp = %timestamp_header, "Webhook rejected: unparseable timestamp");
                return Ok(false);
            }
        };
        if (now_ms - timestamp_ms).abs() > TIMESTAMP_TOLERANCE_MS {
            warn!(
                timestamp_ms,
                now_ms, "Webhook rejected: timestamp outside tolerance window"
            );
            return Ok(false);
        }

        let expected = sign(secret, timestamp_header.trim(), body)?;
        let expected = expected.as_bytes();

        // Compare every candidate so timing does not reveal which one matched
        let matched = signature_header
            .split(',')
            .map(str::trim)
            .filter(|candidate| candidate.len() == expected.len())
            .fold(Choice::from(0), |acc, candidate| {
                acc | candidate.as_bytes().ct_eq(expected)
            });

        let valid: bool = matched.into();
        if !valid {
            warn!("Webhook rejected: no signature candidate matched");
        }
        Ok(valid)
    }
}
