use std::sync::Arc;
use std::time::Duration;

use courier_config::{CourierConfig, DeliveryMode};
use courier_core::{ChannelEvent, Clock, ConversationRecord, Cursor, EventId, Result};
use courier_ledger::{CredentialAuthority, EnvelopeCipher, LedgerClient, Signer};
use courier_llm::{ReplyOracle, truncate_reply};
use courier_memory::ConversationStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::credential::{CredentialManager, CredentialSettings};
use crate::cursor::EventCursorTracker;
use crate::decoder::MessageDecoder;
use crate::dispatcher::ReplyDispatcher;
use crate::membership::MembershipCache;
use crate::status::{CycleState, StatusHandle};

/// External collaborators the runtime is built from.
#[derive(Clone)]
pub struct RuntimeDeps {
    pub ledger: Arc<dyn LedgerClient>,
    pub cipher: Arc<dyn EnvelopeCipher>,
    pub authority: Arc<dyn CredentialAuthority>,
    pub signer: Arc<dyn Signer>,
    pub oracle: Arc<dyn ReplyOracle>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub interval: Duration,
    pub delivery: DeliveryMode,
    pub max_reply_chars: usize,
}

impl OrchestratorSettings {
    pub fn from_config(config: &CourierConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.polling.interval_secs),
            delivery: config.polling.delivery,
            max_reply_chars: config.oracle.max_reply_chars,
        }
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Events left after filtering.
    pub fetched: usize,
    pub decoded: usize,
    pub replied: usize,
    /// Undecryptable messages and empty replies.
    pub skipped: usize,
    pub cursor_before: Option<Cursor>,
    pub cursor_after: Option<Cursor>,
    /// Set when the cycle aborted or a message failed unrecoverably.
    pub error: Option<String>,
}

impl CycleReport {
    pub fn advanced(&self) -> bool {
        self.cursor_after != self.cursor_before
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

enum Outcome {
    Replied,
    EmptyReply,
    Undecryptable,
}

/// The poll loop. Owns every mutable piece of runtime state; one cycle runs
/// to completion before the next starts.
pub struct PollOrchestrator {
    credentials: CredentialManager,
    membership: MembershipCache,
    tracker: EventCursorTracker,
    decoder: MessageDecoder,
    dispatcher: ReplyDispatcher,
    oracle: Arc<dyn ReplyOracle>,
    history: ConversationStore,
    status: StatusHandle,
    clock: Arc<dyn Clock>,
    settings: OrchestratorSettings,
    cursor: Option<Cursor>,
}

impl PollOrchestrator {
    /// Wire the runtime. Events stamped before this call are never answered.
    pub fn from_config(config: &CourierConfig, deps: RuntimeDeps) -> Self {
        let started_at = deps.clock.now();
        let address = deps.signer.address().clone();

        let credentials = CredentialManager::new(
            deps.authority,
            Arc::clone(&deps.signer),
            Arc::clone(&deps.clock),
            CredentialSettings::from_config(config),
        );
        let membership = MembershipCache::new(
            Arc::clone(&deps.ledger),
            address.clone(),
            config.network.member_cap_type(),
            Arc::clone(&deps.clock),
        );
        let tracker = EventCursorTracker::new(
            Arc::clone(&deps.ledger),
            config.network.package_id.clone(),
            config.network.event_module.clone(),
            config.polling.page_limit,
            &address,
            started_at,
        );
        let decoder = MessageDecoder::new(Arc::clone(&deps.cipher), credentials.store());
        let dispatcher = ReplyDispatcher::new(
            deps.ledger,
            deps.cipher,
            deps.signer,
            credentials.store(),
            membership.clone(),
            config.network.package_id.clone(),
            config.network.gas_budget,
        );

        Self {
            credentials,
            membership,
            tracker,
            decoder,
            dispatcher,
            oracle: deps.oracle,
            history: ConversationStore::new(config.history.max_records),
            status: StatusHandle::new(address, started_at),
            clock: deps.clock,
            settings: OrchestratorSettings::from_config(config),
            cursor: None,
        }
    }

    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    pub fn history(&self) -> &ConversationStore {
        &self.history
    }

    pub fn membership(&self) -> &MembershipCache {
        &self.membership
    }

    /// Run cycles until `cancel` fires. Cancellation is observed between
    /// cycles and during the sleep, never inside a cycle.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        info!(
            interval_secs = self.settings.interval.as_secs(),
            delivery = ?self.settings.delivery,
            "poll loop started"
        );

        while !cancel.is_cancelled() {
            let report = self.run_cycle().await;
            if !report.failed() && report.fetched > 0 {
                info!(
                    fetched = report.fetched,
                    replied = report.replied,
                    skipped = report.skipped,
                    "cycle complete"
                );
            }

            self.status.set_state(CycleState::Sleep);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }

        self.status.set_state(CycleState::Stopped);
        info!("poll loop stopped");
        Ok(())
    }

    /// Execute exactly one cycle.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport {
            cursor_before: self.cursor.clone(),
            ..Default::default()
        };

        if let Err(e) = self.cycle(&mut report).await {
            warn!(error = %e, transient = e.is_transient(), "cycle ended early, retrying next cycle");
            report.error = Some(e.to_string());
        }
        report.cursor_after = self.cursor.clone();

        let history_channels = self.history.channel_count();
        let members = self.membership.snapshot().len();
        let expires = self.credentials.store().expires_at();
        let now = self.clock.now();
        self.status.update(|s| {
            s.state = CycleState::Idle;
            if report.failed() {
                s.cycles_failed += 1;
                s.last_error = report.error.clone();
            } else {
                s.cycles_completed += 1;
            }
            s.messages_decoded += report.decoded as u64;
            s.replies_sent += report.replied as u64;
            s.cursor = self.cursor.as_ref().map(|c| c.to_string());
            s.member_channels = members;
            s.active_conversations = history_channels;
            s.credential_expires_at = expires;
            s.last_cycle_at = Some(now);
        });
        report
    }

    /// Fix the starting position once, before anything in the first cycle
    /// can fail. If the head cannot be read, start from the beginning and
    /// rely on the start-time filter to drop history.
    async fn ensure_positioned(&mut self, report: &mut CycleReport) -> Cursor {
        if let Some(c) = &self.cursor {
            return c.clone();
        }
        let c = match self.tracker.initial_cursor().await {
            Ok(c) => {
                info!(cursor = %c, "positioned at the head of the event stream");
                c
            }
            Err(e) => {
                warn!(error = %e, "could not read the stream head, reading from the start");
                Cursor::Start
            }
        };
        self.cursor = Some(c.clone());
        report.cursor_before = Some(c.clone());
        c
    }

    async fn cycle(&mut self, report: &mut CycleReport) -> Result<()> {
        let cursor = self.ensure_positioned(report).await;

        self.status.set_state(CycleState::RenewCredential);
        self.credentials.get_or_create().await?;

        self.status.set_state(CycleState::RefreshMembership);
        self.membership.refresh().await?;

        self.status.set_state(CycleState::FetchEvents);
        let snapshot = self.membership.snapshot();
        let batch = self.tracker.fetch(&cursor, &snapshot).await?;
        report.fetched = batch.events.len();

        self.status.set_state(CycleState::ProcessBatch);
        let mut last_done: Option<EventId> = None;
        let mut failure = None;
        for event in &batch.events {
            match self.process(event).await {
                Ok(Outcome::Replied) => {
                    report.decoded += 1;
                    report.replied += 1;
                }
                Ok(Outcome::EmptyReply) => {
                    report.decoded += 1;
                    report.skipped += 1;
                }
                Ok(Outcome::Undecryptable) => report.skipped += 1,
                Err(e) => {
                    warn!(
                        channel = %event.channel_id,
                        index = %event.message_index,
                        event = %event.id,
                        error = %e,
                        "message not delivered, stopping batch"
                    );
                    failure = Some(e);
                    break;
                }
            }
            last_done = Some(event.id.clone());
        }

        self.status.set_state(CycleState::AdvanceCursor);
        match (failure, self.settings.delivery) {
            (None, _) => self.cursor = Some(batch.next_cursor),
            (Some(e), DeliveryMode::Batch) => return Err(e),
            (Some(e), DeliveryMode::PerEvent) => {
                if let Some(id) = last_done {
                    self.cursor = Some(Cursor::After(id));
                }
                return Err(e);
            }
        }
        debug!(cursor = ?self.cursor, "cursor advanced");
        Ok(())
    }

    async fn process(&mut self, event: &ChannelEvent) -> Result<Outcome> {
        let Some(message) = self.decoder.decode(event).await else {
            return Ok(Outcome::Undecryptable);
        };
        let channel = &message.channel_id;

        let history = self.history.recent(channel);
        let raw = self.oracle.generate(&message.text, &history).await?;
        let reply = truncate_reply(raw.trim(), self.settings.max_reply_chars);

        self.history
            .append(channel, ConversationRecord::user(message.text.clone()));
        if reply.is_empty() {
            debug!(channel = %channel, index = %message.message_index, "oracle returned an empty reply");
            return Ok(Outcome::EmptyReply);
        }
        self.history
            .append(channel, ConversationRecord::agent(reply.clone()));

        self.dispatcher.send(channel, &reply).await?;
        Ok(Outcome::Replied)
    }
}
