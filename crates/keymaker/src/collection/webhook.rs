//! Signatures on inbound collection webhooks.
//!
//! Header format: `t={unix millis},v1={hex HMAC-SHA256}` where the MAC covers
//! `"{t}.{raw request body}"` keyed with the customer's webhook secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("signature header must look like 't=<timestamp>,v1=<hex digest>'")]
    Malformed,
    #[error("signature digest is not valid hex")]
    BadDigest,
    #[error("signature does not match payload")]
    Mismatch,
    #[error("webhook secret cannot key the MAC")]
    InvalidKey,
}

/// Parsed `t=..,v1=..` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookSignature {
    pub timestamp: String,
    pub digest: Vec<u8>,
}

impl WebhookSignature {
    pub fn parse(header: &str) -> Result<Self, SignatureError> {
        let mut timestamp = None;
        let mut digest = None;
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) if !value.is_empty() => timestamp = Some(value),
                Some(("v1", value)) if !value.is_empty() => digest = Some(value),
                _ => {}
            }
        }
        let (Some(timestamp), Some(digest)) = (timestamp, digest) else {
            return Err(SignatureError::Malformed);
        };
        Ok(Self {
            timestamp: timestamp.to_string(),
            digest: hex::decode(digest).map_err(|_| SignatureError::BadDigest)?,
        })
    }

    /// Constant-time check of the digest against `body` under `secret`.
    pub fn verify(&self, secret: &str, body: &[u8]) -> Result<(), SignatureError> {
        mac(secret, &self.timestamp, body)?
            .verify_slice(&self.digest)
            .map_err(|_| SignatureError::Mismatch)
    }
}

/// Header value for `body` signed at `timestamp`.
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> Result<String, SignatureError> {
    let digest = mac(secret, timestamp, body)?.finalize().into_bytes();
    Ok(format!("t={timestamp},v1={}", hex::encode(digest)))
}

pub fn verify(secret: &str, header: &str, body: &[u8]) -> Result<(), SignatureError> {
    WebhookSignature::parse(header)?.verify(secret, body)
}

fn mac(secret: &str, timestamp: &str, body: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::InvalidKey)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
}
