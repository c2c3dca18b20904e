//! Mock reply oracle for deterministic testing.
//!
//! Returns queued replies without making any HTTP calls.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use courier_core::{ConversationRecord, CourierError, Result};
use parking_lot::Mutex;

use crate::oracle::ReplyOracle;

/// One call the oracle received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleCall {
    pub user_text: String,
    pub history: Vec<ConversationRecord>,
}

#[derive(Debug, Clone)]
enum Queued {
    Reply(String),
    Error(String),
}

/// A mock oracle. Queued replies are returned in order; once the queue is
/// empty it answers `re: <user text>`.
///
/// # Example
/// ```
/// use courier_llm::mock::MockOracle;
/// let oracle = MockOracle::new().with_reply("Hello!");
/// ```
#[derive(Clone, Default)]
pub struct MockOracle {
    queue: Arc<Mutex<VecDeque<Queued>>>,
    calls: Arc<Mutex<Vec<OracleCall>>>,
}

impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply.
    pub fn with_reply(self, text: &str) -> Self {
        self.queue.lock().push_back(Queued::Reply(text.to_string()));
        self
    }

    /// Queue a failure.
    pub fn with_error(self, error: &str) -> Self {
        self.queue.lock().push_back(Queued::Error(error.to_string()));
        self
    }

    /// All calls received so far.
    pub fn calls(&self) -> Vec<OracleCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ReplyOracle for MockOracle {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, user_text: &str, history: &[ConversationRecord]) -> Result<String> {
        self.calls.lock().push(OracleCall {
            user_text: user_text.to_string(),
            history: history.to_vec(),
        });
        match self.queue.lock().pop_front() {
            Some(Queued::Reply(text)) => Ok(text),
            Some(Queued::Error(e)) => Err(CourierError::Oracle(e)),
            None => Ok(format!("re: {user_text}")),
        }
    }
}
