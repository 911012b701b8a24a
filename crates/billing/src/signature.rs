//! Stripe webhook signature verification
//!
//! The `Stripe-Signature` header has the form `t=<unix>,v1=<hex>[,v1=<hex>...]`.
//! Each `v1` value is `HMAC-SHA256(secret, "<t>.<raw body>")`. Other schemes
//! (`v0`) are ignored.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{BillingError, BillingResult};

type HmacSha256 = Hmac<Sha256>;

/// Maximum allowed distance between the signed timestamp and now
pub const DEFAULT_TOLERANCE_SECS: u64 = 300;

/// Parsed `Stripe-Signature` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub v1_signatures: Vec<String>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> BillingResult<Self> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => timestamp = value.parse().ok(),
                "v1" => v1_signatures.push(value.to_string()),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| {
            tracing::warn!("Missing timestamp in signature header");
            BillingError::WebhookSignatureInvalid
        })?;

        if v1_signatures.is_empty() {
            tracing::warn!("Missing v1 signature in signature header");
            return Err(BillingError::WebhookSignatureInvalid);
        }

        Ok(Self {
            timestamp,
            v1_signatures,
        })
    }
}

fn compute_signature(payload: &str, secret: &str, timestamp: i64) -> BillingResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| {
        tracing::error!("Invalid webhook secret key");
        BillingError::WebhookSignatureInvalid
    })?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Build a header value for `payload`, as the provider would send it
pub fn sign_payload(payload: &str, secret: &str, timestamp: i64) -> BillingResult<String> {
    let signature = compute_signature(payload, secret, timestamp)?;
    Ok(format!("t={},v1={}", timestamp, hex::encode(signature)))
}

/// Verify `header` against the raw `payload` at time `now` (unix seconds)
pub fn verify_signature(
    payload: &str,
    header: &str,
    secret: &str,
    tolerance_secs: u64,
    now: i64,
) -> BillingResult<()> {
    if secret.is_empty() {
        tracing::error!("Webhook secret is empty; refusing to verify");
        return Err(BillingError::WebhookSignatureInvalid);
    }

    let parsed = SignatureHeader::parse(header)?;

    let drift = now.abs_diff(parsed.timestamp);
    if drift > tolerance_secs {
        tracing::warn!(
            timestamp = parsed.timestamp,
            now = now,
            drift = drift,
            "Webhook timestamp outside tolerance"
        );
        return Err(BillingError::WebhookSignatureInvalid);
    }

    let expected = compute_signature(payload, secret, parsed.timestamp)?;

    let matched = parsed
        .v1_signatures
        .iter()
        .filter_map(|candidate| hex::decode(candidate).ok())
        .any(|candidate| bool::from(candidate.as_slice().ct_eq(expected.as_slice())));

    if !matched {
        tracing::warn!(
            candidates = parsed.v1_signatures.len(),
            "Webhook signature mismatch"
        );
        return Err(BillingError::WebhookSignatureInvalid);
    }

    Ok(())
}
