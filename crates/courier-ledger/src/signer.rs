use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use courier_core::{Address, CourierError, Result};
use ring::signature::{Ed25519KeyPair, KeyPair};

/// Signature-scheme flag for Ed25519.
pub const ED25519_FLAG: u8 = 0x00;

/// Intent prefix for transaction data.
const TRANSACTION_INTENT: [u8; 3] = [0, 0, 0];
/// Intent prefix for free-form personal messages.
const PERSONAL_MESSAGE_INTENT: [u8; 3] = [3, 0, 0];

/// Signs on behalf of the agent's ledger account.
pub trait Signer: Send + Sync {
    /// Account address derived from the public key.
    fn address(&self) -> &Address;

    /// Raw public key bytes.
    fn public_key(&self) -> Vec<u8>;

    /// Sign transaction bytes. Returns the serialized signature, base64.
    fn sign_transaction(&self, tx_bytes: &[u8]) -> Result<String>;

    /// Sign a personal message. Returns the serialized signature, base64.
    fn sign_personal_message(&self, message: &[u8]) -> Result<String>;
}

/// Ed25519 signer over a 32-byte seed.
pub struct Ed25519Signer {
    keypair: Ed25519KeyPair,
    address: Address,
}

impl std::fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl Ed25519Signer {
    /// Parse a base64 private key: either the bare 32-byte seed or the
    /// 33-byte form with a leading scheme flag.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| CourierError::InvalidKey(format!("not base64: {e}")))?;
        let seed = match bytes.len() {
            32 => &bytes[..],
            33 if bytes[0] == ED25519_FLAG => &bytes[1..],
            33 => {
                return Err(CourierError::InvalidKey(format!(
                    "unsupported key scheme flag 0x{:02x}",
                    bytes[0]
                )));
            }
            n => {
                return Err(CourierError::InvalidKey(format!(
                    "expected 32 or 33 bytes, got {n}"
                )));
            }
        };
        Self::from_seed(seed)
    }

    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        let keypair = Ed25519KeyPair::from_seed_unchecked(seed)
            .map_err(|e| CourierError::InvalidKey(e.to_string()))?;
        let address = derive_address(keypair.public_key().as_ref());
        Ok(Self { keypair, address })
    }

    fn sign_with_intent(&self, intent: [u8; 3], payload: &[u8]) -> String {
        let digest = intent_digest(intent, payload);
        let sig = self.keypair.sign(&digest);
        serialize_signature(sig.as_ref(), self.keypair.public_key().as_ref())
    }
}

impl Signer for Ed25519Signer {
    fn address(&self) -> &Address {
        &self.address
    }

    fn public_key(&self) -> Vec<u8> {
        self.keypair.public_key().as_ref().to_vec()
    }

    fn sign_transaction(&self, tx_bytes: &[u8]) -> Result<String> {
        Ok(self.sign_with_intent(TRANSACTION_INTENT, tx_bytes))
    }

    fn sign_personal_message(&self, message: &[u8]) -> Result<String> {
        Ok(self.sign_with_intent(PERSONAL_MESSAGE_INTENT, message))
    }
}

/// `0x` + hex(blake3(flag || public_key)).
pub fn derive_address(public_key: &[u8]) -> Address {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[ED25519_FLAG]);
    hasher.update(public_key);
    format!("0x{}", hasher.finalize().to_hex())
}

/// blake3(intent || payload), the bytes actually signed.
pub fn intent_digest(intent: [u8; 3], payload: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&intent);
    hasher.update(payload);
    *hasher.finalize().as_bytes()
}

/// base64(flag || signature || public_key)
pub fn serialize_signature(signature: &[u8], public_key: &[u8]) -> String {
    let mut out = Vec::with_capacity(1 + signature.len() + public_key.len());
    out.push(ED25519_FLAG);
    out.extend_from_slice(signature);
    out.extend_from_slice(public_key);
    BASE64.encode(out)
}
