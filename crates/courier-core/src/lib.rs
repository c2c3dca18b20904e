//! # courier-core
//!
//! Core types and primitives for the Courier agent. This crate defines the
//! shared vocabulary used by every other crate in the workspace: identifiers,
//! stream cursors, the wide integer used for ledger counters, credentials,
//! conversation records, and the unified error type.

pub mod clock;
pub mod error;
pub mod message;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CourierError, Result};
pub use message::{ConversationRecord, DecryptedMessage, Role};
pub use types::*;
