//! # courier-ledger
//!
//! The agent's view of the ledger and of the trusted encryption service.
//! Everything here is an interface boundary: the `LedgerClient` and
//! `EnvelopeCipher` traits, their HTTP implementations, the Ed25519 signer,
//! the session-key credential authority, and deterministic mocks for tests.
//!
//! Raw ledger payloads are validated into typed values in [`schema`] and
//! nowhere else.

pub mod authority;
pub mod cipher;
pub mod client;
pub mod mock;
pub mod rpc;
pub mod schema;
pub mod signer;
pub mod transaction;

pub use authority::{Challenge, ChallengeRequest, CredentialAuthority, SessionKeyAuthority};
pub use cipher::{EncryptedEnvelope, EnvelopeCipher, HttpEnvelopeCipher};
pub use client::{EventPage, EventQuery, LedgerClient, ObjectData, ObjectPage, RawEvent, TransactionEffects};
pub use rpc::RpcLedgerClient;
pub use signer::{Ed25519Signer, Signer};
pub use transaction::{MoveCall, send_message_call};
