//! Seam to the upstream signature verifier.
//!
//! The core only ever handles [`VerifiedClaim`]s. Whatever checks signatures
//! sits behind [`EnvelopeVerifier`]; this crate ships the pass-through used
//! for envelopes already verified elsewhere.

use crate::error::{ServiceError, ServiceResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use endorser_types::VerifiedClaim;
use serde::Deserialize;
use serde_json::Value;

/// Envelope text as received from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEnvelope {
    raw: String,
}

impl SignedEnvelope {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

#[async_trait]
pub trait EnvelopeVerifier: Send + Sync {
    /// Check the envelope and return its issuer and payload.
    async fn verify(&self, envelope: &SignedEnvelope) -> ServiceResult<VerifiedClaim>;
}

/// Accepts envelopes decoded to JSON `{iss, sub, iat, claim}` by a verifier
/// upstream of this process.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreVerifiedEnvelopes;

#[derive(Debug, Deserialize)]
struct DecodedEnvelope {
    iss: String,
    #[serde(default)]
    sub: Option<String>,
    /// Seconds since the epoch.
    #[serde(default)]
    iat: Option<i64>,
    claim: Value,
}

#[async_trait]
impl EnvelopeVerifier for PreVerifiedEnvelopes {
    async fn verify(&self, envelope: &SignedEnvelope) -> ServiceResult<VerifiedClaim> {
        let decoded: DecodedEnvelope = serde_json::from_str(envelope.as_str())
            .map_err(|e| ServiceError::SignatureInvalid(format!("malformed envelope: {e}")))?;
        if decoded.iss.trim().is_empty() {
            return Err(ServiceError::SignatureInvalid(
                "envelope has no issuer".to_string(),
            ));
        }

        let issued_at = match decoded.iat {
            Some(secs) => DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| {
                ServiceError::SignatureInvalid(format!("iat {secs} is out of range"))
            })?,
            None => Utc::now(),
        };

        let mut claim = VerifiedClaim::new(decoded.iss, decoded.claim);
        claim.issued_at = issued_at;
        if let Some(subject) = decoded.sub {
            claim = claim.with_subject(subject);
        }
        Ok(claim)
    }
}
