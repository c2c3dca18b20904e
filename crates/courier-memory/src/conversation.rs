use std::collections::{HashMap, VecDeque};

use courier_core::{ChannelId, ConversationRecord};
use tracing::trace;

/// Records kept per channel unless configured otherwise.
pub const DEFAULT_CAPACITY: usize = 10;

/// Conversation history per channel, bounded with strict FIFO eviction.
///
/// Purely in-memory: nothing is persisted or shared across processes.
#[derive(Debug)]
pub struct ConversationStore {
    channels: HashMap<ChannelId, VecDeque<ConversationRecord>>,
    capacity: usize,
}

impl ConversationStore {
    /// A store keeping at most `capacity` records per channel (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a record, evicting the oldest once over capacity.
    pub fn append(&mut self, channel_id: &ChannelId, record: ConversationRecord) {
        let history = self.channels.entry(channel_id.clone()).or_default();
        history.push_back(record);
        while history.len() > self.capacity {
            history.pop_front();
            trace!(channel = %channel_id, "evicted oldest conversation record");
        }
    }

    /// The channel's records, most recent last.
    pub fn recent(&self, channel_id: &ChannelId) -> Vec<ConversationRecord> {
        self.channels
            .get(channel_id)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of channels with any history.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Forget a channel's history.
    pub fn clear(&mut self, channel_id: &ChannelId) {
        self.channels.remove(channel_id);
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
