use chrono::{DateTime, Duration, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Identifier of a messaging channel object.
pub type ChannelId = String;

/// Ledger account address, `0x`-prefixed hex.
pub type Address = String;

/// Identifier of any ledger object.
pub type ObjectId = String;

/// Normalize an address for comparison: lowercase, `0x` prefix.
pub fn normalize_address(address: &str) -> Address {
    let trimmed = address.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    format!("0x{}", hex.to_ascii_lowercase())
}

// ── Wide integer ───────────────────────────────────────────────

/// Unsigned integer wide enough for every ledger counter (versions, indices,
/// sequence numbers). The ledger encodes these either as JSON numbers or as
/// decimal strings; both are accepted here and nowhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct WideInt(pub u128);

impl WideInt {
    pub const ZERO: WideInt = WideInt(0);

    pub fn get(self) -> u128 {
        self.0
    }

    pub fn to_u64(self) -> Option<u64> {
        u64::try_from(self.0).ok()
    }
}

impl From<u64> for WideInt {
    fn from(v: u64) -> Self {
        WideInt(v as u128)
    }
}

impl fmt::Display for WideInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for WideInt {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for WideInt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct WideIntVisitor;

        impl Visitor<'_> for WideIntVisitor {
            type Value = WideInt;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an unsigned integer or a decimal string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<WideInt, E> {
                Ok(WideInt(v as u128))
            }

            fn visit_u128<E: de::Error>(self, v: u128) -> std::result::Result<WideInt, E> {
                Ok(WideInt(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<WideInt, E> {
                u128::try_from(v)
                    .map(WideInt)
                    .map_err(|_| E::custom(format!("negative integer {v}")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<WideInt, E> {
                v.trim()
                    .parse::<u128>()
                    .map(WideInt)
                    .map_err(|e| E::custom(format!("invalid integer {v:?}: {e}")))
            }
        }

        deserializer.deserialize_any(WideIntVisitor)
    }
}

// ── Stream positions ───────────────────────────────────────────

/// Identifier of a single event in the ledger's event stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventId {
    pub tx_digest: String,
    pub event_seq: WideInt,
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_digest, self.event_seq)
    }
}

/// Opaque read position in the event stream. The ledger defines the order;
/// queries return events strictly after the cursor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "event", rename_all = "snake_case")]
pub enum Cursor {
    /// Before the first event of the stream.
    #[default]
    Start,
    /// Just after the given event.
    After(EventId),
}

impl Cursor {
    pub fn event_id(&self) -> Option<&EventId> {
        match self {
            Cursor::Start => None,
            Cursor::After(id) => Some(id),
        }
    }
}

impl From<EventId> for Cursor {
    fn from(id: EventId) -> Self {
        Cursor::After(id)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cursor::Start => f.write_str("start"),
            Cursor::After(id) => write!(f, "{id}"),
        }
    }
}

// ── Channel data ───────────────────────────────────────────────

/// A "message added" event, already validated at the deserialization boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEvent {
    /// Position of this event; also a valid cursor.
    pub id: EventId,
    pub channel_id: ChannelId,
    pub sender: Address,
    pub message_index: WideInt,
    pub key_version: WideInt,
    pub timestamp: DateTime<Utc>,
    /// Fully qualified event type, e.g. `0x2::message::MessageAddedEvent`.
    pub event_type: String,
}

/// Reference to the capability object proving membership of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRef {
    pub object_id: ObjectId,
    pub channel_id: ChannelId,
    pub version: WideInt,
    pub digest: String,
}

/// The latest channel encryption key. Fetched on every send, never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionKeyRef {
    pub channel_id: ChannelId,
    pub encrypted_key: Vec<u8>,
    pub key_version: WideInt,
}

/// Proof that a reply transaction reached finality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendConfirmation {
    pub channel_id: ChannelId,
    pub digest: String,
    pub key_version: WideInt,
}

// ── Credentials ────────────────────────────────────────────────

/// Longest credential lifetime the agent will request: one day.
pub const MAX_CREDENTIAL_TTL_MINUTES: u64 = 24 * 60;

/// Credential lifetime in seconds, or `None` when it cannot be represented.
pub fn ttl_minutes_to_secs(ttl_minutes: u64) -> Option<u64> {
    ttl_minutes.checked_mul(60)
}

/// Time-limited session credential authorizing decryption on behalf of the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub owner: Address,
    /// Application scope identifier (the messaging package id).
    pub scope: String,
    pub issued_at: DateTime<Utc>,
    pub ttl_secs: u64,
    /// Base64 public key of the ephemeral session key.
    pub session_public_key: String,
    /// The challenge message that was signed.
    pub challenge: String,
    /// Base64 signature by the owner over `challenge`.
    pub signature: String,
}

impl Credential {
    /// Saturates at the latest representable instant.
    pub fn expires_at(&self) -> DateTime<Utc> {
        i64::try_from(self.ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| self.issued_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Valid iff `now < issued_at + ttl`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at()
    }

    /// True once `now` is inside the renewal margin before expiry.
    pub fn needs_renewal_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        match self.expires_at().checked_sub_signed(margin) {
            Some(renew_at) => now >= renew_at,
            None => true,
        }
    }
}
