use std::sync::Arc;

use courier_core::{ChannelEvent, ChannelId, DecryptedMessage, WideInt};
use courier_ledger::EnvelopeCipher;
use tracing::warn;

use crate::credential::CredentialStore;

/// Turns message events into plaintext using the active credential.
///
/// Failures are per message: they are logged and reported as `None`, never
/// propagated.
pub struct MessageDecoder {
    cipher: Arc<dyn EnvelopeCipher>,
    credentials: CredentialStore,
}

impl MessageDecoder {
    pub fn new(cipher: Arc<dyn EnvelopeCipher>, credentials: CredentialStore) -> Self {
        Self {
            cipher,
            credentials,
        }
    }

    pub async fn decrypt(&self, channel_id: &ChannelId, message_index: WideInt) -> Option<String> {
        let credential = match self.credentials.current() {
            Ok(c) => c,
            Err(e) => {
                warn!(channel = %channel_id, index = %message_index, error = %e, "cannot decrypt without a valid credential");
                return None;
            }
        };
        match self
            .cipher
            .decrypt(&credential, channel_id, message_index)
            .await
        {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(channel = %channel_id, index = %message_index, error = %e, "failed to decrypt message");
                None
            }
        }
    }

    pub async fn decode(&self, event: &ChannelEvent) -> Option<DecryptedMessage> {
        let text = self.decrypt(&event.channel_id, event.message_index).await?;
        Some(DecryptedMessage {
            channel_id: event.channel_id.clone(),
            sender: event.sender.clone(),
            text,
            timestamp: event.timestamp,
            message_index: event.message_index,
            key_version: event.key_version,
        })
    }
}
