use thiserror::Error;

/// Unified error type for the entire Courier agent.
#[derive(Error, Debug)]
pub enum CourierError {
    // ── Ledger / transport errors ──────────────────────────────
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("decode error: {0}")]
    Decode(String),

    // ── Channel errors ─────────────────────────────────────────
    #[error("not a member of channel {0}")]
    NotMember(String),

    #[error("no encryption key for channel {0}")]
    NoEncryptionKey(String),

    #[error("send failed: {digest}: {status}")]
    SendFailed { digest: String, status: String },

    // ── Credential errors ──────────────────────────────────────
    #[error("credential error: {0}")]
    Credential(String),

    #[error("credential expired at {0}")]
    CredentialExpired(chrono::DateTime<chrono::Utc>),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("cipher error: {0}")]
    Cipher(String),

    // ── Reply oracle errors ────────────────────────────────────
    #[error("reply oracle error: {0}")]
    Oracle(String),

    #[error("reply oracle rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    #[error("invalid private key: {0}")]
    InvalidKey(String),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CourierError {
    /// Errors caused by the network or a remote service being unavailable.
    /// The poll loop retries these on the next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CourierError::Transport(_)
                | CourierError::Rpc { .. }
                | CourierError::RateLimited { .. }
                | CourierError::Oracle(_)
                | CourierError::Cipher(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CourierError>;
