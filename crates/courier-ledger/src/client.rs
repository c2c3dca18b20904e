use async_trait::async_trait;
use courier_core::{Address, EventId, ObjectId, Result, WideInt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::transaction::MoveCall;

/// Selects the events of one module, oldest first unless `descending`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    pub package: String,
    pub module: String,
    pub descending: bool,
}

/// An event as the ledger returns it, before payload validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub id: EventId,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub sender: Option<Address>,
    #[serde(default)]
    pub timestamp_ms: Option<WideInt>,
    #[serde(default)]
    pub parsed_json: Value,
}

/// One page of an event query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPage {
    pub data: Vec<RawEvent>,
    #[serde(default)]
    pub next_cursor: Option<EventId>,
    #[serde(default)]
    pub has_next_page: bool,
}

/// A ledger object with its Move content left untyped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectData {
    pub object_id: ObjectId,
    pub version: WideInt,
    pub digest: String,
    #[serde(default, rename = "type")]
    pub object_type: Option<String>,
    /// `{ "dataType": "moveObject", "fields": { ... } }`
    #[serde(default)]
    pub content: Value,
}

/// One page of an owned-object listing.
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub data: Vec<ObjectData>,
    pub next_cursor: Option<String>,
    pub has_next_page: bool,
}

/// Execution outcome of a finalized transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionEffects {
    pub digest: String,
    pub success: bool,
    /// Execution status string, e.g. "success" or "failure".
    pub status: String,
    pub error: Option<String>,
}

/// Read and write access to the ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Query one page of events after `cursor` (exclusive).
    async fn query_events(
        &self,
        query: &EventQuery,
        cursor: Option<&EventId>,
        limit: u32,
    ) -> Result<EventPage>;

    /// List objects of `struct_type` owned by `owner`, one page at a time.
    async fn owned_objects(
        &self,
        owner: &Address,
        struct_type: &str,
        cursor: Option<&str>,
    ) -> Result<ObjectPage>;

    /// Read a single object with its content.
    async fn get_object(&self, id: &ObjectId) -> Result<ObjectData>;

    /// Build unsigned transaction bytes for a single move call.
    async fn build_move_call(&self, sender: &Address, call: &MoveCall, gas_budget: u64)
    -> Result<Vec<u8>>;

    /// Submit signed transaction bytes; returns the transaction digest.
    async fn execute(&self, tx_bytes: &[u8], signature: &str) -> Result<String>;

    /// Block until the transaction is final and return its effects.
    async fn wait_for_transaction(&self, digest: &str) -> Result<TransactionEffects>;
}
