use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use courier_core::{Address, CourierError, EventId, ObjectId, Result};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::client::{EventPage, EventQuery, LedgerClient, ObjectData, ObjectPage, TransactionEffects};
use crate::transaction::MoveCall;

/// Delay between finality checks in `wait_for_transaction`.
const FINALITY_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnedObjectsResult {
    data: Vec<ObjectResponse>,
    #[serde(default)]
    next_cursor: Option<String>,
    #[serde(default)]
    has_next_page: bool,
}

#[derive(Deserialize)]
struct ObjectResponse {
    #[serde(default)]
    data: Option<ObjectData>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionBytesResult {
    tx_bytes: String,
}

#[derive(Deserialize)]
struct ExecuteResult {
    digest: String,
}

#[derive(Deserialize)]
struct TransactionBlockResult {
    digest: String,
    effects: EffectsBody,
}

#[derive(Deserialize)]
struct EffectsBody {
    status: StatusBody,
}

#[derive(Deserialize)]
struct StatusBody {
    status: String,
    #[serde(default)]
    error: Option<String>,
}

/// JSON-RPC 2.0 ledger client over HTTP.
pub struct RpcLedgerClient {
    client: Client,
    url: String,
    timeout: Duration,
    next_id: AtomicU64,
}

impl RpcLedgerClient {
    /// Every request is bounded by `timeout`; a hung node becomes a transport error.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CourierError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            timeout,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(method, id, "rpc request");

        let resp = self
            .client
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await
            .map_err(|e| CourierError::Transport(format!("{method}: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CourierError::Transport(format!(
                "{method}: HTTP {status}: {text}"
            )));
        }

        let body: RpcResponse<T> = resp
            .json()
            .await
            .map_err(|e| CourierError::Decode(format!("{method}: {e}")))?;

        if let Some(err) = body.error {
            return Err(CourierError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        body.result
            .ok_or_else(|| CourierError::Decode(format!("{method}: empty result")))
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn query_events(
        &self,
        query: &EventQuery,
        cursor: Option<&EventId>,
        limit: u32,
    ) -> Result<EventPage> {
        let filter = json!({
            "MoveModule": { "package": query.package, "module": query.module }
        });
        self.call(
            "suix_queryEvents",
            json!([filter, cursor, limit, query.descending]),
        )
        .await
    }

    async fn owned_objects(
        &self,
        owner: &Address,
        struct_type: &str,
        cursor: Option<&str>,
    ) -> Result<ObjectPage> {
        let query = json!({
            "filter": { "StructType": struct_type },
            "options": { "showType": true, "showContent": true },
        });
        let page: OwnedObjectsResult = self
            .call("suix_getOwnedObjects", json!([owner, query, cursor, Value::Null]))
            .await?;

        let mut data = Vec::with_capacity(page.data.len());
        for entry in page.data {
            match (entry.data, entry.error) {
                (Some(obj), _) => data.push(obj),
                (None, err) => warn!(?err, "owned object entry without data"),
            }
        }
        Ok(ObjectPage {
            data,
            next_cursor: page.next_cursor,
            has_next_page: page.has_next_page,
        })
    }

    async fn get_object(&self, id: &ObjectId) -> Result<ObjectData> {
        let resp: ObjectResponse = self
            .call(
                "sui_getObject",
                json!([id, { "showType": true, "showContent": true }]),
            )
            .await?;
        match (resp.data, resp.error) {
            (Some(obj), _) => Ok(obj),
            (None, err) => Err(CourierError::Decode(format!(
                "object {id} unavailable: {}",
                err.unwrap_or(Value::Null)
            ))),
        }
    }

    async fn build_move_call(
        &self,
        sender: &Address,
        call: &MoveCall,
        gas_budget: u64,
    ) -> Result<Vec<u8>> {
        let result: TransactionBytesResult = self
            .call(
                "unsafe_moveCall",
                json!([
                    sender,
                    call.package,
                    call.module,
                    call.function,
                    call.type_arguments,
                    call.arguments,
                    Value::Null,
                    gas_budget.to_string(),
                ]),
            )
            .await?;
        BASE64
            .decode(result.tx_bytes)
            .map_err(|e| CourierError::Decode(format!("txBytes: {e}")))
    }

    async fn execute(&self, tx_bytes: &[u8], signature: &str) -> Result<String> {
        let result: ExecuteResult = self
            .call(
                "sui_executeTransactionBlock",
                json!([
                    BASE64.encode(tx_bytes),
                    [signature],
                    { "showEffects": true },
                    "WaitForLocalExecution",
                ]),
            )
            .await?;
        Ok(result.digest)
    }

    async fn wait_for_transaction(&self, digest: &str) -> Result<TransactionEffects> {
        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            let attempt: Result<TransactionBlockResult> = self
                .call(
                    "sui_getTransactionBlock",
                    json!([digest, { "showEffects": true }]),
                )
                .await;
            match attempt {
                Ok(block) => {
                    let status = block.effects.status;
                    return Ok(TransactionEffects {
                        digest: block.digest,
                        success: status.status == "success",
                        status: status.status,
                        error: status.error,
                    });
                }
                // Not yet indexed: the node answers with an RPC error until it is.
                Err(CourierError::Rpc { .. }) if tokio::time::Instant::now() < deadline => {
                    tokio::time::sleep(FINALITY_POLL_INTERVAL).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
