//! # courier-memory
//!
//! Short-term conversation memory for the Courier agent: the last few turns
//! of each channel, held in RAM and used only as reply-oracle context.

pub mod conversation;

pub use conversation::{ConversationStore, DEFAULT_CAPACITY};
