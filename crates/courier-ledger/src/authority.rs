use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, SecondsFormat, Utc};
use courier_core::{
    Address, CourierError, MAX_CREDENTIAL_TTL_MINUTES, Result, ttl_minutes_to_secs,
};
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair};
use tracing::debug;

/// What the agent asks the issuing authority for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeRequest {
    pub address: Address,
    /// Application scope identifier.
    pub scope: String,
    pub ttl_minutes: u64,
    pub requested_at: DateTime<Utc>,
}

/// An unsigned challenge. Usable only after the owner signs `message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub message: String,
    pub session_public_key: String,
    pub issued_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

/// Issues credential challenges.
#[async_trait]
pub trait CredentialAuthority: Send + Sync {
    async fn request_challenge(&self, request: &ChallengeRequest) -> Result<Challenge>;
}

/// Local authority: mints an ephemeral Ed25519 session key per challenge.
/// The encryption service accepts the session key once the owner's
/// signature over the challenge checks out.
pub struct SessionKeyAuthority {
    rng: SystemRandom,
}

impl SessionKeyAuthority {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }
}

impl Default for SessionKeyAuthority {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialAuthority for SessionKeyAuthority {
    async fn request_challenge(&self, request: &ChallengeRequest) -> Result<Challenge> {
        let ttl_secs = checked_ttl_secs(request)?;
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&self.rng)
            .map_err(|_| CourierError::Credential("session key generation failed".into()))?;
        let session = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref())
            .map_err(|e| CourierError::Credential(e.to_string()))?;
        let session_public_key = BASE64.encode(session.public_key().as_ref());

        debug!(address = %request.address, scope = %request.scope, "issuing session challenge");

        Ok(Challenge {
            message: challenge_message(request, &session_public_key),
            session_public_key,
            issued_at: request.requested_at,
            ttl_secs,
        })
    }
}

/// The requested lifetime in seconds. Zero or over-long lifetimes are refused.
pub fn checked_ttl_secs(request: &ChallengeRequest) -> Result<u64> {
    match ttl_minutes_to_secs(request.ttl_minutes) {
        Some(secs) if secs > 0 && request.ttl_minutes <= MAX_CREDENTIAL_TTL_MINUTES => Ok(secs),
        _ => Err(CourierError::Credential(format!(
            "credential TTL of {} minutes is outside 1..={MAX_CREDENTIAL_TTL_MINUTES}",
            request.ttl_minutes
        ))),
    }
}

/// Human-readable text the owner signs.
pub fn challenge_message(request: &ChallengeRequest, session_public_key: &str) -> String {
    format!(
        "Accessing keys of package {} for {} mins from {}, session key {}",
        request.scope,
        request.ttl_minutes,
        request.requested_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        session_public_key
    )
}
