use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use courier_core::{ChannelId, Credential, CourierError, EncryptionKeyRef, Result, WideInt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Ciphertext ready to be appended to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub key_version: WideInt,
}

/// The trusted encryption service.
#[async_trait]
pub trait EnvelopeCipher: Send + Sync {
    /// Fetch and decrypt one channel message.
    async fn decrypt(
        &self,
        credential: &Credential,
        channel_id: &ChannelId,
        message_index: WideInt,
    ) -> Result<String>;

    /// Encrypt a plaintext under the given channel key.
    async fn encrypt(
        &self,
        credential: &Credential,
        key: &EncryptionKeyRef,
        plaintext: &str,
    ) -> Result<EncryptedEnvelope>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CredentialBody<'a> {
    owner: &'a str,
    scope: &'a str,
    session_public_key: &'a str,
    challenge: &'a str,
    signature: &'a str,
}

impl<'a> From<&'a Credential> for CredentialBody<'a> {
    fn from(c: &'a Credential) -> Self {
        Self {
            owner: &c.owner,
            scope: &c.scope,
            session_public_key: &c.session_public_key,
            challenge: &c.challenge,
            signature: &c.signature,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DecryptRequest<'a> {
    credential: CredentialBody<'a>,
    channel_id: &'a str,
    message_index: WideInt,
}

#[derive(Deserialize)]
struct DecryptResponse {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EncryptRequest<'a> {
    credential: CredentialBody<'a>,
    channel_id: &'a str,
    encrypted_key: String,
    key_version: WideInt,
    plaintext: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncryptResponse {
    ciphertext: String,
    nonce: String,
    key_version: WideInt,
}

/// Client for the messaging sidecar's `/v1/messages/*` endpoints.
pub struct HttpEnvelopeCipher {
    client: Client,
    base_url: String,
}

impl HttpEnvelopeCipher {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CourierError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post<B: Serialize + Sync, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R> {
        let resp = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .map_err(|e| CourierError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CourierError::Cipher(format!("HTTP {status}: {text}")));
        }

        resp.json()
            .await
            .map_err(|e| CourierError::Decode(e.to_string()))
    }
}

#[async_trait]
impl EnvelopeCipher for HttpEnvelopeCipher {
    async fn decrypt(
        &self,
        credential: &Credential,
        channel_id: &ChannelId,
        message_index: WideInt,
    ) -> Result<String> {
        debug!(channel = %channel_id, index = %message_index, "decrypting message");
        let body = DecryptRequest {
            credential: credential.into(),
            channel_id,
            message_index,
        };
        let resp: DecryptResponse = self.post("/v1/messages/decrypt", &body).await?;
        Ok(resp.text)
    }

    async fn encrypt(
        &self,
        credential: &Credential,
        key: &EncryptionKeyRef,
        plaintext: &str,
    ) -> Result<EncryptedEnvelope> {
        debug!(channel = %key.channel_id, key_version = %key.key_version, "encrypting reply");
        let body = EncryptRequest {
            credential: credential.into(),
            channel_id: &key.channel_id,
            encrypted_key: BASE64.encode(&key.encrypted_key),
            key_version: key.key_version,
            plaintext,
        };
        let resp: EncryptResponse = self.post("/v1/messages/encrypt", &body).await?;
        let decode = |field: &str, v: &str| {
            BASE64
                .decode(v)
                .map_err(|e| CourierError::Decode(format!("{field}: {e}")))
        };
        Ok(EncryptedEnvelope {
            ciphertext: decode("ciphertext", &resp.ciphertext)?,
            nonce: decode("nonce", &resp.nonce)?,
            key_version: resp.key_version,
        })
    }
}
