use std::sync::Arc;

use chrono::{DateTime, Utc};
use courier_core::{Address, ChannelEvent, Cursor, EventId, Result, normalize_address};
use courier_ledger::schema::{is_message_added, parse_message_event};
use courier_ledger::{EventQuery, LedgerClient, RawEvent};
use tracing::{debug, warn};

use crate::membership::MembershipSnapshot;

/// Why raw events were left out of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropCounts {
    pub other_kind: usize,
    pub malformed: usize,
    pub not_member: usize,
    pub own_message: usize,
    pub before_start: usize,
}

impl DropCounts {
    pub fn total(&self) -> usize {
        self.other_kind + self.malformed + self.not_member + self.own_message + self.before_start
    }
}

/// Filtered events in stream order, plus where the next read starts.
#[derive(Debug, Clone, Default)]
pub struct EventBatch {
    pub events: Vec<ChannelEvent>,
    pub next_cursor: Cursor,
    pub dropped: DropCounts,
}

/// Reads message events after a cursor and filters them for the agent.
pub struct EventCursorTracker {
    ledger: Arc<dyn LedgerClient>,
    query: EventQuery,
    page_limit: u32,
    own_address: Address,
    started_at: DateTime<Utc>,
}

impl EventCursorTracker {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        package: impl Into<String>,
        module: impl Into<String>,
        page_limit: u32,
        own_address: &str,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            ledger,
            query: EventQuery {
                package: package.into(),
                module: module.into(),
                descending: false,
            },
            page_limit: page_limit.max(1),
            own_address: normalize_address(own_address),
            started_at,
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Position at the newest existing event so history before start is
    /// never read. An empty stream yields `Cursor::Start`.
    pub async fn initial_cursor(&self) -> Result<Cursor> {
        let newest = EventQuery {
            descending: true,
            ..self.query.clone()
        };
        let page = self.ledger.query_events(&newest, None, 1).await?;
        let cursor = page
            .data
            .first()
            .map(|e| Cursor::After(e.id.clone()))
            .unwrap_or_default();
        debug!(%cursor, "initial cursor");
        Ok(cursor)
    }

    /// Like [`fetch`](Self::fetch), but a failed read returns no events and
    /// echoes `cursor` back unchanged.
    pub async fn events_since(&self, cursor: &Cursor, members: &MembershipSnapshot) -> EventBatch {
        match self.fetch(cursor, members).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(%cursor, error = %e, "event fetch failed, cursor unchanged");
                EventBatch {
                    next_cursor: cursor.clone(),
                    ..Default::default()
                }
            }
        }
    }

    /// Pull every page after `cursor` and filter it. Any page failing fails
    /// the whole read; a partial batch is never returned.
    pub async fn fetch(&self, cursor: &Cursor, members: &MembershipSnapshot) -> Result<EventBatch> {
        let mut batch = EventBatch {
            next_cursor: cursor.clone(),
            ..Default::default()
        };
        let mut position: Option<EventId> = cursor.event_id().cloned();

        loop {
            let page = self
                .ledger
                .query_events(&self.query, position.as_ref(), self.page_limit)
                .await?;
            let page_len = page.data.len();

            for raw in &page.data {
                if let Some(event) = self.admit(raw, members, &mut batch.dropped) {
                    batch.events.push(event);
                }
            }
            let moved = match page.next_cursor {
                Some(next) if position.as_ref() != Some(&next) => {
                    batch.next_cursor = Cursor::After(next.clone());
                    position = Some(next);
                    true
                }
                _ => false,
            };
            if !page.has_next_page || page_len == 0 {
                break;
            }
            if !moved {
                warn!(position = ?position, "ledger reported another page without advancing the cursor");
                break;
            }
        }

        if batch.dropped.total() > 0 {
            debug!(dropped = ?batch.dropped, kept = batch.events.len(), "filtered events");
        }
        Ok(batch)
    }

    fn admit(
        &self,
        raw: &RawEvent,
        members: &MembershipSnapshot,
        dropped: &mut DropCounts,
    ) -> Option<ChannelEvent> {
        if !is_message_added(&raw.event_type) {
            dropped.other_kind += 1;
            return None;
        }
        let event = match parse_message_event(raw) {
            Ok(ev) => ev,
            Err(e) => {
                warn!(event = %raw.id, error = %e, "dropping malformed event");
                dropped.malformed += 1;
                return None;
            }
        };
        if !members.contains(&event.channel_id) {
            dropped.not_member += 1;
            return None;
        }
        if normalize_address(&event.sender) == self.own_address {
            dropped.own_message += 1;
            return None;
        }
        if event.timestamp < self.started_at {
            dropped.before_start += 1;
            return None;
        }
        Some(event)
    }
}
