//! # courier-runtime
//!
//! The agent runtime: one poll loop that keeps a session credential fresh,
//! rebuilds channel membership, pulls new message events after a cursor,
//! decrypts them, asks the reply oracle for an answer and publishes it back
//! to the channel.
//!
//! ```text
//!   ┌──────────────────────── PollOrchestrator ────────────────────────┐
//!   │ RenewCredential → RefreshMembership → FetchEvents → ProcessBatch │
//!   │        │                 │                 │            │        │
//!   │ CredentialManager  MembershipCache  EventCursorTracker   │        │
//!   │        │ (store)                                         ▼        │
//!   │        └──────────────► MessageDecoder ─► oracle ─► ReplyDispatcher
//!   │                                                                  │
//!   │ AdvanceCursor → Sleep → (loop until cancelled)                   │
//!   └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod credential;
pub mod cursor;
pub mod decoder;
pub mod dispatcher;
pub mod membership;
pub mod orchestrator;
pub mod status;

pub use credential::{CredentialManager, CredentialSettings, CredentialStore};
pub use cursor::{DropCounts, EventBatch, EventCursorTracker};
pub use decoder::MessageDecoder;
pub use dispatcher::ReplyDispatcher;
pub use membership::{MembershipCache, MembershipSnapshot};
pub use orchestrator::{CycleReport, OrchestratorSettings, PollOrchestrator, RuntimeDeps};
pub use status::{AgentStatus, CycleState, StatusHandle};
