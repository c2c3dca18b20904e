//! In-memory ledger, cipher and authority for tests.
//!
//! All three are cheap to clone; clones share state so a test can keep a
//! handle for assertions after moving one into the runtime.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_core::{
    Address, ChannelId, Credential, CourierError, EncryptionKeyRef, EventId, ObjectId, Result,
    WideInt,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::authority::{
    Challenge, ChallengeRequest, CredentialAuthority, challenge_message, checked_ttl_secs,
};
use crate::cipher::{EncryptedEnvelope, EnvelopeCipher};
use crate::client::{
    EventPage, EventQuery, LedgerClient, ObjectData, ObjectPage, RawEvent, TransactionEffects,
};
use crate::transaction::MoveCall;

/// Owned objects returned per page, small so pagination is exercised.
const OWNED_PAGE_SIZE: usize = 2;

/// Prefix the mock cipher puts in front of every plaintext.
const SEALED_PREFIX: &str = "sealed:";

// ── Ledger ─────────────────────────────────────────────────────

/// A transaction the mock ledger accepted for execution.
#[derive(Debug, Clone)]
pub struct SentTransaction {
    pub sender: Address,
    pub call: MoveCall,
    pub signature: String,
    pub digest: String,
    pub success: bool,
}

impl SentTransaction {
    pub fn channel_id(&self) -> Option<&str> {
        self.call.arguments.first().and_then(Value::as_str)
    }

    pub fn ciphertext(&self) -> Option<Vec<u8>> {
        self.call
            .arguments
            .get(2)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Plaintext of a reply sealed by [`MockCipher`].
    pub fn plaintext(&self) -> Option<String> {
        self.ciphertext().and_then(|c| MockCipher::open(&c))
    }
}

#[derive(Serialize, Deserialize)]
struct MockTxBytes {
    sender: Address,
    call: MoveCall,
    gas_budget: u64,
}

#[derive(Default)]
struct LedgerState {
    events: Vec<RawEvent>,
    caps: Vec<ObjectData>,
    objects: HashMap<ObjectId, ObjectData>,
    event_failures: u32,
    membership_failures: u32,
    failing_send_attempts: HashSet<usize>,
    send_attempts: usize,
    sent: Vec<SentTransaction>,
    event_query_cursors: Vec<Option<EventId>>,
    next_event: u64,
}

/// Scriptable in-memory ledger.
#[derive(Clone, Default)]
pub struct MockLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message-added event and return its id.
    pub fn push_message(
        &self,
        channel_id: &str,
        sender: &str,
        message_index: u64,
        timestamp: DateTime<Utc>,
    ) -> EventId {
        let mut state = self.state.lock();
        state.next_event += 1;
        let id = EventId {
            tx_digest: format!("ev{}", state.next_event),
            event_seq: WideInt::ZERO,
        };
        state.events.push(RawEvent {
            id: id.clone(),
            event_type: "0xpkg::message::MessageAddedEvent".into(),
            sender: Some(sender.to_string()),
            timestamp_ms: Some(WideInt(timestamp.timestamp_millis().max(0) as u128)),
            parsed_json: json!({
                "channel_id": channel_id,
                "sender": sender,
                "message_index": message_index.to_string(),
                "key_version": "1",
            }),
        });
        id
    }

    /// Append an arbitrary raw event.
    pub fn push_raw_event(&self, event: RawEvent) {
        self.state.lock().events.push(event);
    }

    /// Give the agent a member capability for `channel_id`.
    pub fn grant_membership(&self, channel_id: &str) {
        let mut state = self.state.lock();
        let object_id = format!("0xcap{}", state.caps.len() + 1);
        state.caps.push(ObjectData {
            object_id,
            version: WideInt(1),
            digest: "capdigest".into(),
            object_type: Some("0xpkg::channel::MemberCap".into()),
            content: json!({
                "dataType": "moveObject",
                "fields": { "channel_id": channel_id },
            }),
        });
    }

    pub fn revoke_membership(&self, channel_id: &str) {
        self.state
            .lock()
            .caps
            .retain(|c| c.content["fields"]["channel_id"] != channel_id);
    }

    /// Add a capability whose payload has no channel id.
    pub fn push_malformed_capability(&self) {
        self.state.lock().caps.push(ObjectData {
            object_id: "0xbadcap".into(),
            version: WideInt(1),
            digest: "capdigest".into(),
            object_type: None,
            content: json!({ "dataType": "moveObject", "fields": {} }),
        });
    }

    /// Publish a channel object carrying the latest encryption key.
    pub fn set_channel_key(&self, channel_id: &str, key: &[u8], key_version: u64) {
        self.state.lock().objects.insert(
            channel_id.to_string(),
            ObjectData {
                object_id: channel_id.to_string(),
                version: WideInt(key_version.into()),
                digest: "chdigest".into(),
                object_type: Some("0xpkg::channel::Channel".into()),
                content: json!({
                    "dataType": "moveObject",
                    "fields": {
                        "encryption_key_history": {
                            "fields": {
                                "latest": key,
                                "latest_version": key_version.to_string(),
                            }
                        }
                    }
                }),
            },
        );
    }

    /// The next `n` event queries fail with a transport error.
    pub fn fail_event_queries(&self, n: u32) {
        self.state.lock().event_failures = n;
    }

    /// The next `n` membership listings fail with a transport error.
    pub fn fail_membership_queries(&self, n: u32) {
        self.state.lock().membership_failures = n;
    }

    /// Execution attempt number `attempt` (zero-based, counted across the
    /// ledger's lifetime) finalizes with a failure status.
    pub fn fail_send_attempt(&self, attempt: usize) {
        self.state.lock().failing_send_attempts.insert(attempt);
    }

    /// Every executed transaction, including failed ones.
    pub fn sent(&self) -> Vec<SentTransaction> {
        self.state.lock().sent.clone()
    }

    /// Plaintexts of successfully finalized replies, in order.
    pub fn delivered_replies(&self) -> Vec<(String, String)> {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|t| t.success)
            .filter_map(|t| Some((t.channel_id()?.to_string(), t.plaintext()?)))
            .collect()
    }

    /// Cursors passed to ascending event queries, in call order.
    pub fn event_query_cursors(&self) -> Vec<Option<EventId>> {
        self.state.lock().event_query_cursors.clone()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn query_events(
        &self,
        query: &EventQuery,
        cursor: Option<&EventId>,
        limit: u32,
    ) -> Result<EventPage> {
        let mut state = self.state.lock();
        if state.event_failures > 0 {
            state.event_failures -= 1;
            return Err(CourierError::Transport("mock: event query failed".into()));
        }

        let ordered: Vec<RawEvent> = if query.descending {
            state.events.iter().rev().cloned().collect()
        } else {
            state.event_query_cursors.push(cursor.cloned());
            state.events.clone()
        };

        let start = match cursor {
            None => 0,
            Some(c) => match ordered.iter().position(|e| &e.id == c) {
                Some(i) => i + 1,
                None => {
                    return Err(CourierError::Rpc {
                        code: -32602,
                        message: format!("unknown cursor {c}"),
                    });
                }
            },
        };
        let end = (start + limit as usize).min(ordered.len());
        let data = ordered[start..end].to_vec();
        let next_cursor = data.last().map(|e| e.id.clone()).or_else(|| cursor.cloned());

        Ok(EventPage {
            data,
            next_cursor,
            has_next_page: end < ordered.len(),
        })
    }

    async fn owned_objects(
        &self,
        _owner: &Address,
        struct_type: &str,
        cursor: Option<&str>,
    ) -> Result<ObjectPage> {
        let mut state = self.state.lock();
        if state.membership_failures > 0 {
            state.membership_failures -= 1;
            return Err(CourierError::Transport("mock: owned objects failed".into()));
        }
        let matching: Vec<ObjectData> = state
            .caps
            .iter()
            .filter(|o| o.object_type.as_deref().is_none_or(|t| t == struct_type))
            .cloned()
            .collect();
        let start = cursor.and_then(|c| c.parse::<usize>().ok()).unwrap_or(0);
        let end = (start + OWNED_PAGE_SIZE).min(matching.len());
        let has_next_page = end < matching.len();
        Ok(ObjectPage {
            data: matching[start.min(end)..end].to_vec(),
            next_cursor: has_next_page.then(|| end.to_string()),
            has_next_page,
        })
    }

    async fn get_object(&self, id: &ObjectId) -> Result<ObjectData> {
        self.state
            .lock()
            .objects
            .get(id)
            .cloned()
            .ok_or_else(|| CourierError::Decode(format!("object {id} unavailable")))
    }

    async fn build_move_call(
        &self,
        sender: &Address,
        call: &MoveCall,
        gas_budget: u64,
    ) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&MockTxBytes {
            sender: sender.clone(),
            call: call.clone(),
            gas_budget,
        })?)
    }

    async fn execute(&self, tx_bytes: &[u8], signature: &str) -> Result<String> {
        let tx: MockTxBytes = serde_json::from_slice(tx_bytes)?;
        let mut state = self.state.lock();
        let attempt = state.send_attempts;
        state.send_attempts += 1;
        let digest = format!("tx{attempt}");
        let success = !state.failing_send_attempts.contains(&attempt);
        state.sent.push(SentTransaction {
            sender: tx.sender,
            call: tx.call,
            signature: signature.to_string(),
            digest: digest.clone(),
            success,
        });
        Ok(digest)
    }

    async fn wait_for_transaction(&self, digest: &str) -> Result<TransactionEffects> {
        let state = self.state.lock();
        let tx = state
            .sent
            .iter()
            .find(|t| t.digest == digest)
            .ok_or_else(|| CourierError::Rpc {
                code: -32602,
                message: format!("unknown digest {digest}"),
            })?;
        let status = if tx.success { "success" } else { "failure" };
        Ok(TransactionEffects {
            digest: tx.digest.clone(),
            success: tx.success,
            status: status.to_string(),
            error: (!tx.success).then(|| "MoveAbort".to_string()),
        })
    }
}

// ── Cipher ─────────────────────────────────────────────────────

#[derive(Default)]
struct CipherState {
    messages: HashMap<(ChannelId, WideInt), String>,
    fail_encrypt: bool,
    session_keys_seen: Vec<String>,
}

/// Cipher with a plaintext table for decrypts and a reversible encrypt.
#[derive(Clone, Default)]
pub struct MockCipher {
    state: Arc<Mutex<CipherState>>,
}

impl MockCipher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `text` the decryption of `(channel_id, message_index)`.
    pub fn put_message(&self, channel_id: &str, message_index: u64, text: &str) {
        self.state
            .lock()
            .messages
            .insert((channel_id.to_string(), message_index.into()), text.to_string());
    }

    pub fn fail_encrypt(&self, fail: bool) {
        self.state.lock().fail_encrypt = fail;
    }

    /// Session public keys of the credentials presented, in call order.
    pub fn session_keys_seen(&self) -> Vec<String> {
        self.state.lock().session_keys_seen.clone()
    }

    /// Reverse this cipher's encryption.
    pub fn open(ciphertext: &[u8]) -> Option<String> {
        std::str::from_utf8(ciphertext)
            .ok()?
            .strip_prefix(SEALED_PREFIX)
            .map(str::to_string)
    }
}

#[async_trait]
impl EnvelopeCipher for MockCipher {
    async fn decrypt(
        &self,
        credential: &Credential,
        channel_id: &ChannelId,
        message_index: WideInt,
    ) -> Result<String> {
        let mut state = self.state.lock();
        state
            .session_keys_seen
            .push(credential.session_public_key.clone());
        state
            .messages
            .get(&(channel_id.clone(), message_index))
            .cloned()
            .ok_or_else(|| {
                CourierError::Cipher(format!("no message {channel_id}/{message_index}"))
            })
    }

    async fn encrypt(
        &self,
        credential: &Credential,
        key: &EncryptionKeyRef,
        plaintext: &str,
    ) -> Result<EncryptedEnvelope> {
        let mut state = self.state.lock();
        state
            .session_keys_seen
            .push(credential.session_public_key.clone());
        if state.fail_encrypt {
            return Err(CourierError::Cipher("mock: encrypt failed".into()));
        }
        Ok(EncryptedEnvelope {
            ciphertext: format!("{SEALED_PREFIX}{plaintext}").into_bytes(),
            nonce: vec![0; 12],
            key_version: key.key_version,
        })
    }
}

// ── Authority ──────────────────────────────────────────────────

#[derive(Default)]
struct AuthorityState {
    issued: usize,
    failures: u32,
}

/// Authority with deterministic session keys and failure injection.
#[derive(Clone, Default)]
pub struct MockAuthority {
    state: Arc<Mutex<AuthorityState>>,
}

impl MockAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of challenges issued so far.
    pub fn issued(&self) -> usize {
        self.state.lock().issued
    }

    /// The next `n` challenge requests fail.
    pub fn fail_next(&self, n: u32) {
        self.state.lock().failures = n;
    }
}

#[async_trait]
impl CredentialAuthority for MockAuthority {
    async fn request_challenge(&self, request: &ChallengeRequest) -> Result<Challenge> {
        let mut state = self.state.lock();
        if state.failures > 0 {
            state.failures -= 1;
            return Err(CourierError::Transport("mock: authority unavailable".into()));
        }
        let ttl_secs = checked_ttl_secs(request)?;
        state.issued += 1;
        let session_public_key = format!("session-{}", state.issued);
        Ok(Challenge {
            message: challenge_message(request, &session_public_key),
            session_public_key,
            issued_at: request.requested_at,
            ttl_secs,
        })
    }
}
