use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use courier_config::CourierConfig;
use courier_core::{Clock, Credential, CourierError, Result};
use courier_ledger::{ChallengeRequest, CredentialAuthority, Signer};
use parking_lot::RwLock;
use tracing::{debug, info};

/// Read handle on the active credential, shared with the decoder and the
/// dispatcher. Only [`CredentialManager`] replaces what it holds.
#[derive(Clone)]
pub struct CredentialStore {
    active: Arc<RwLock<Option<Arc<Credential>>>>,
    clock: Arc<dyn Clock>,
}

impl CredentialStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            active: Arc::new(RwLock::new(None)),
            clock,
        }
    }

    /// The active credential. Refuses to hand out one that has expired.
    pub fn current(&self) -> Result<Arc<Credential>> {
        let active = self
            .peek()
            .ok_or_else(|| CourierError::Credential("no credential issued yet".into()))?;
        if !active.is_valid_at(self.clock.now()) {
            return Err(CourierError::CredentialExpired(active.expires_at()));
        }
        Ok(active)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.peek().map(|c| c.expires_at())
    }

    fn peek(&self) -> Option<Arc<Credential>> {
        self.active.read().clone()
    }

    fn replace(&self, credential: Credential) -> Arc<Credential> {
        let credential = Arc::new(credential);
        *self.active.write() = Some(Arc::clone(&credential));
        credential
    }
}

/// Lifetime and scope of issued credentials.
#[derive(Debug, Clone)]
pub struct CredentialSettings {
    pub scope: String,
    pub ttl_minutes: u64,
    pub safety_margin: Duration,
}

impl CredentialSettings {
    pub fn from_config(config: &CourierConfig) -> Self {
        Self {
            scope: config.network.package_id.clone(),
            ttl_minutes: config.credential.ttl_minutes,
            safety_margin: i64::try_from(config.credential.safety_margin_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX),
        }
    }
}

/// Issues and renews the session credential.
///
/// Renewal takes `&mut self`: the owner (the poll loop) is the single call
/// site, and a renewed credential is visible to every [`CredentialStore`]
/// clone before `get_or_create` returns.
pub struct CredentialManager {
    authority: Arc<dyn CredentialAuthority>,
    signer: Arc<dyn Signer>,
    store: CredentialStore,
    clock: Arc<dyn Clock>,
    settings: CredentialSettings,
}

impl CredentialManager {
    pub fn new(
        authority: Arc<dyn CredentialAuthority>,
        signer: Arc<dyn Signer>,
        clock: Arc<dyn Clock>,
        settings: CredentialSettings,
    ) -> Self {
        Self {
            authority,
            signer,
            store: CredentialStore::new(Arc::clone(&clock)),
            clock,
            settings,
        }
    }

    /// A clone of the read handle for dependent components.
    pub fn store(&self) -> CredentialStore {
        self.store.clone()
    }

    /// Return the cached credential while it is outside the renewal margin,
    /// otherwise issue, sign and install a new one.
    pub async fn get_or_create(&mut self) -> Result<Arc<Credential>> {
        let now = self.clock.now();
        if let Some(active) = self.store.peek() {
            if !active.needs_renewal_at(now, self.settings.safety_margin) {
                return Ok(active);
            }
            debug!(expires_at = %active.expires_at(), "credential inside renewal margin");
        }

        let request = ChallengeRequest {
            address: self.signer.address().clone(),
            scope: self.settings.scope.clone(),
            ttl_minutes: self.settings.ttl_minutes,
            requested_at: now,
        };
        let challenge = self.authority.request_challenge(&request).await?;
        let signature = self
            .signer
            .sign_personal_message(challenge.message.as_bytes())?;

        let credential = self.store.replace(Credential {
            owner: request.address,
            scope: request.scope,
            issued_at: challenge.issued_at,
            ttl_secs: challenge.ttl_secs,
            session_public_key: challenge.session_public_key,
            challenge: challenge.message,
            signature,
        });
        info!(expires_at = %credential.expires_at(), "session credential renewed");
        Ok(credential)
    }
}
