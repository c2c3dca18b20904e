use std::sync::Arc;

use courier_core::{ChannelId, CourierError, Result, SendConfirmation};
use courier_ledger::schema::parse_encryption_key;
use courier_ledger::{EnvelopeCipher, LedgerClient, Signer, send_message_call};
use tracing::{debug, info, warn};

use crate::credential::CredentialStore;
use crate::membership::MembershipCache;

/// Publishes replies as signed ledger transactions. No retries: any failed
/// step fails the send.
pub struct ReplyDispatcher {
    ledger: Arc<dyn LedgerClient>,
    cipher: Arc<dyn EnvelopeCipher>,
    signer: Arc<dyn Signer>,
    credentials: CredentialStore,
    membership: MembershipCache,
    package_id: String,
    gas_budget: u64,
}

impl ReplyDispatcher {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        cipher: Arc<dyn EnvelopeCipher>,
        signer: Arc<dyn Signer>,
        credentials: CredentialStore,
        membership: MembershipCache,
        package_id: impl Into<String>,
        gas_budget: u64,
    ) -> Self {
        Self {
            ledger,
            cipher,
            signer,
            credentials,
            membership,
            package_id: package_id.into(),
            gas_budget,
        }
    }

    pub async fn send(&self, channel_id: &ChannelId, text: &str) -> Result<SendConfirmation> {
        // 1. Membership capability.
        let cap = self
            .membership
            .capability(channel_id)
            .ok_or_else(|| CourierError::NotMember(channel_id.clone()))?;

        // 2. Latest channel key, read fresh on every send.
        let key = self
            .ledger
            .get_object(channel_id)
            .await
            .and_then(|obj| parse_encryption_key(channel_id, &obj))
            .map_err(|e| {
                warn!(channel = %channel_id, error = %e, "cannot resolve channel key");
                CourierError::NoEncryptionKey(channel_id.clone())
            })?;

        // 3. Encrypt and build the transaction.
        let credential = self.credentials.current()?;
        let envelope = self.cipher.encrypt(&credential, &key, text).await?;
        let call = send_message_call(&self.package_id, &cap, &envelope);
        let tx_bytes = self
            .ledger
            .build_move_call(self.signer.address(), &call, self.gas_budget)
            .await?;

        // 4. Sign and submit.
        let signature = self.signer.sign_transaction(&tx_bytes)?;
        let digest = self.ledger.execute(&tx_bytes, &signature).await?;
        debug!(channel = %channel_id, %digest, "reply submitted");

        // 5. Finality.
        let effects = self.ledger.wait_for_transaction(&digest).await?;
        if !effects.success {
            return Err(CourierError::SendFailed {
                digest,
                status: effects.error.unwrap_or(effects.status),
            });
        }

        info!(channel = %channel_id, %digest, key_version = %envelope.key_version, "reply delivered");
        Ok(SendConfirmation {
            channel_id: channel_id.clone(),
            digest,
            key_version: envelope.key_version,
        })
    }
}
