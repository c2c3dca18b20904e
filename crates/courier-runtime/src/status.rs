use std::sync::Arc;

use chrono::{DateTime, Utc};
use courier_core::Address;
use parking_lot::RwLock;
use serde::Serialize;

/// Where the poll loop currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    #[default]
    Idle,
    RenewCredential,
    RefreshMembership,
    FetchEvents,
    ProcessBatch,
    AdvanceCursor,
    Sleep,
    Stopped,
}

/// Progress snapshot served on `/api/v1/status`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentStatus {
    pub address: Address,
    pub state: CycleState,
    pub started_at: Option<DateTime<Utc>>,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub messages_decoded: u64,
    pub replies_sent: u64,
    pub cursor: Option<String>,
    pub member_channels: usize,
    pub active_conversations: usize,
    pub credential_expires_at: Option<DateTime<Utc>>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Shared, cloneable handle on the status. The orchestrator writes, the
/// HTTP surface reads.
#[derive(Clone, Default)]
pub struct StatusHandle {
    inner: Arc<RwLock<AgentStatus>>,
}

impl StatusHandle {
    pub fn new(address: Address, started_at: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(AgentStatus {
                address,
                started_at: Some(started_at),
                ..Default::default()
            })),
        }
    }

    pub fn snapshot(&self) -> AgentStatus {
        self.inner.read().clone()
    }

    pub fn set_state(&self, state: CycleState) {
        self.inner.write().state = state;
    }

    pub fn update(&self, f: impl FnOnce(&mut AgentStatus)) {
        f(&mut self.inner.write());
    }
}
