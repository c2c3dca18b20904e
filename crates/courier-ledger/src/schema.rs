//! Typed views of ledger payloads.
//!
//! Raw JSON from the ledger is untrusted. It is validated here into the
//! value types of `courier_core`; nothing downstream touches raw payloads.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, TimeZone, Utc};
use courier_core::{
    CapabilityRef, ChannelEvent, ChannelId, CourierError, EncryptionKeyRef, Result, WideInt,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::client::{ObjectData, RawEvent};

/// Event type suffix of a newly added channel message.
pub const MESSAGE_ADDED_EVENT: &str = "MessageAddedEvent";

#[derive(Debug, Deserialize)]
struct MessageAddedFields {
    channel_id: String,
    #[serde(default)]
    sender: Option<String>,
    message_index: WideInt,
    key_version: WideInt,
    #[serde(default)]
    created_at_ms: Option<WideInt>,
}

#[derive(Debug, Deserialize)]
struct MemberCapFields {
    channel_id: String,
}

#[derive(Debug, Deserialize)]
struct MoveStruct<T> {
    fields: T,
}

#[derive(Debug, Deserialize)]
struct ChannelFields {
    encryption_key_history: MoveStruct<KeyHistoryFields>,
}

#[derive(Debug, Deserialize)]
struct KeyHistoryFields {
    latest: ByteBlob,
    latest_version: WideInt,
}

/// `vector<u8>` as the ledger renders it: a number array or base64.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ByteBlob {
    Bytes(Vec<u8>),
    Base64(String),
}

impl ByteBlob {
    fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            ByteBlob::Bytes(b) => Ok(b),
            ByteBlob::Base64(s) => BASE64
                .decode(s.as_bytes())
                .map_err(|e| CourierError::Decode(format!("invalid base64 blob: {e}"))),
        }
    }
}

/// True if the event type names a message-added event.
pub fn is_message_added(event_type: &str) -> bool {
    event_type
        .rsplit("::")
        .next()
        .is_some_and(|name| name == MESSAGE_ADDED_EVENT || name.starts_with("MessageAddedEvent<"))
}

/// Validate a raw event into a `ChannelEvent`.
pub fn parse_message_event(raw: &RawEvent) -> Result<ChannelEvent> {
    if !is_message_added(&raw.event_type) {
        return Err(CourierError::Decode(format!(
            "unexpected event type {}",
            raw.event_type
        )));
    }
    let fields: MessageAddedFields = from_value(&raw.parsed_json, "message event")?;
    let sender = fields
        .sender
        .or_else(|| raw.sender.clone())
        .ok_or_else(|| CourierError::Decode(format!("event {} has no sender", raw.id)))?;
    let millis = raw
        .timestamp_ms
        .or(fields.created_at_ms)
        .ok_or_else(|| CourierError::Decode(format!("event {} has no timestamp", raw.id)))?;

    Ok(ChannelEvent {
        id: raw.id.clone(),
        channel_id: fields.channel_id,
        sender,
        message_index: fields.message_index,
        key_version: fields.key_version,
        timestamp: millis_to_datetime(millis)?,
        event_type: raw.event_type.clone(),
    })
}

/// Validate an owned member-capability object into a `CapabilityRef`.
pub fn parse_member_cap(object: &ObjectData) -> Result<CapabilityRef> {
    let fields: MemberCapFields = move_fields(object)?;
    Ok(CapabilityRef {
        object_id: object.object_id.clone(),
        channel_id: fields.channel_id,
        version: object.version,
        digest: object.digest.clone(),
    })
}

/// Read the latest encryption key out of a channel object.
pub fn parse_encryption_key(channel_id: &ChannelId, object: &ObjectData) -> Result<EncryptionKeyRef> {
    let fields: ChannelFields = move_fields(object)?;
    let history = fields.encryption_key_history.fields;
    let encrypted_key = history.latest.into_bytes()?;
    if encrypted_key.is_empty() {
        return Err(CourierError::NoEncryptionKey(channel_id.clone()));
    }
    Ok(EncryptionKeyRef {
        channel_id: channel_id.clone(),
        encrypted_key,
        key_version: history.latest_version,
    })
}

fn move_fields<T: DeserializeOwned>(object: &ObjectData) -> Result<T> {
    let fields = object.content.get("fields").ok_or_else(|| {
        CourierError::Decode(format!("object {} has no move fields", object.object_id))
    })?;
    from_value(fields, &object.object_id)
}

fn from_value<T: DeserializeOwned>(value: &Value, what: &str) -> Result<T> {
    T::deserialize(value).map_err(|e| CourierError::Decode(format!("{what}: {e}")))
}

fn millis_to_datetime(millis: WideInt) -> Result<DateTime<Utc>> {
    i64::try_from(millis.get())
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .ok_or_else(|| CourierError::Decode(format!("timestamp out of range: {millis}")))
}
