use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use courier_core::{Address, CapabilityRef, ChannelId, Clock, Result};
use courier_ledger::LedgerClient;
use courier_ledger::schema::parse_member_cap;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

/// Immutable view of the channels the agent belongs to.
#[derive(Debug, Default)]
pub struct MembershipSnapshot {
    caps: HashMap<ChannelId, CapabilityRef>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl MembershipSnapshot {
    pub fn contains(&self, channel_id: &ChannelId) -> bool {
        self.caps.contains_key(channel_id)
    }

    pub fn capability(&self, channel_id: &ChannelId) -> Option<&CapabilityRef> {
        self.caps.get(channel_id)
    }

    pub fn channels(&self) -> BTreeSet<ChannelId> {
        self.caps.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.caps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caps.is_empty()
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }
}

/// The agent's channel memberships, rebuilt from the ledger on every refresh.
///
/// Clones share the same snapshot. `refresh` builds a complete new snapshot
/// before swapping it in, so readers see either the old set or the new one.
#[derive(Clone)]
pub struct MembershipCache {
    ledger: Arc<dyn LedgerClient>,
    owner: Address,
    cap_type: String,
    clock: Arc<dyn Clock>,
    current: Arc<RwLock<Arc<MembershipSnapshot>>>,
}

impl MembershipCache {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        owner: Address,
        cap_type: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            owner,
            cap_type: cap_type.into(),
            clock,
            current: Arc::new(RwLock::new(Arc::new(MembershipSnapshot::default()))),
        }
    }

    /// Enumerate every owned capability and replace the snapshot.
    /// On error the previous snapshot stays in place.
    pub async fn refresh(&self) -> Result<BTreeSet<ChannelId>> {
        let mut caps = HashMap::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self
                .ledger
                .owned_objects(&self.owner, &self.cap_type, cursor.as_deref())
                .await?;
            for object in &page.data {
                match parse_member_cap(object) {
                    Ok(cap) => {
                        caps.insert(cap.channel_id.clone(), cap);
                    }
                    Err(e) => warn!(object = %object.object_id, error = %e, "skipping malformed capability"),
                }
            }
            match (page.has_next_page, page.next_cursor) {
                (true, Some(next)) => cursor = Some(next),
                (true, None) => {
                    warn!("ledger reported another page without a cursor");
                    break;
                }
                (false, _) => break,
            }
        }

        let snapshot = MembershipSnapshot {
            caps,
            refreshed_at: Some(self.clock.now()),
        };
        let channels = snapshot.channels();
        let previous = std::mem::replace(&mut *self.current.write(), Arc::new(snapshot));

        if previous.len() != channels.len() {
            info!(channels = channels.len(), "channel membership changed");
        } else {
            debug!(channels = channels.len(), "membership refreshed");
        }
        Ok(channels)
    }

    pub fn snapshot(&self) -> Arc<MembershipSnapshot> {
        Arc::clone(&self.current.read())
    }

    pub fn capability(&self, channel_id: &ChannelId) -> Option<CapabilityRef> {
        self.current.read().capability(channel_id).cloned()
    }
}
