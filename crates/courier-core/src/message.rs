use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Address, ChannelId, WideInt};

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

/// A single turn in a channel's short-term history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub role: Role,
    pub text: String,
}

impl ConversationRecord {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            role: Role::Agent,
            text: text.into(),
        }
    }
}

/// A channel message after decryption. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedMessage {
    pub channel_id: ChannelId,
    pub sender: Address,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub message_index: WideInt,
    pub key_version: WideInt,
}
