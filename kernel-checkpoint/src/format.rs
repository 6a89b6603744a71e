//! The checkpoint document itself: a self-describing, versioned snapshot of
//! every piece of state a restart needs to reproduce the run exactly.

use chrono::Utc;
use kernel_core::{ArtifactId, EventSeq, Timestamp};
use kernel_events::EventLog;
use kernel_ledger::{Ledger, LedgerSnapshot};
use kernel_store::{ArtifactStore, StoreSnapshot};
use kernel_supervisor::{AgentLoopState, BackoffState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Bumped whenever the on-disk shape of [`Checkpoint`] changes in a way that
/// isn't simply additive. `read_checkpoint` refuses anything else.
pub const FORMAT_VERSION: u32 = 1;

/// One agent loop's state at the moment of the snapshot: enough to resume
/// sleeping on the same condition and carrying the same crash-loop count,
/// rather than waking spuriously or forgetting it was already backing off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub state: AgentLoopState,
    pub backoff: BackoffState,
}

/// A stop-the-world snapshot: monotonic capture time, the event-log cursor
/// at the moment every loop had reached an action boundary, and the full
/// ledger, store and per-agent state needed to resume without replaying a
/// single event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub format_version: u32,
    pub captured_at: Timestamp,
    pub event_log_cursor: EventSeq,
    pub store: StoreSnapshot,
    pub ledger: LedgerSnapshot,
    pub agents: HashMap<ArtifactId, AgentSnapshot>,
}

impl Checkpoint {
    /// Captures the given components. The caller is responsible for having
    /// already paused every loop at an action boundary — this function only
    /// takes the snapshot, it does not coordinate the pause itself.
    pub fn capture(
        store: &dyn ArtifactStore,
        ledger: &dyn Ledger,
        events: &dyn EventLog,
        agents: HashMap<ArtifactId, AgentSnapshot>,
    ) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            captured_at: Utc::now(),
            event_log_cursor: events.next_seq(),
            store: store.export_state(),
            ledger: ledger.export_state(),
            agents,
        }
    }

    /// Replaces `store` and `ledger` state in place. The event log is
    /// rehydrated separately, from the on-disk log truncated to
    /// `event_log_cursor` — it is never duplicated inside the checkpoint
    /// document itself.
    pub fn restore_into(&self, store: &dyn ArtifactStore, ledger: &dyn Ledger) {
        store.import_state(self.store.clone());
        ledger.import_state(self.ledger.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_core::KernelConfig;
    use kernel_events::InMemoryEventLog;
    use kernel_ledger::InMemoryLedger;
    use kernel_store::InMemoryArtifactStore;
    use std::sync::Arc;

    fn fresh_triple() -> (Arc<InMemoryArtifactStore>, Arc<InMemoryLedger>, Arc<InMemoryEventLog>) {
        let events = Arc::new(InMemoryEventLog::new());
        let ledger = Arc::new(InMemoryLedger::new(events.clone(), KernelConfig::for_tests()));
        let store = Arc::new(InMemoryArtifactStore::new(
            Arc::new(kernel_core::AlwaysAllow),
            ledger.clone(),
            events.clone(),
            KernelConfig::for_tests(),
        ));
        (store, ledger, events)
    }

    #[test]
    fn capture_then_restore_into_a_fresh_pair_round_trips_scrip() {
        let (store, ledger, events) = fresh_triple();
        let principal = ArtifactId::now_v7();
        ledger.register_principal(principal);
        ledger.mint(principal, 500, "seed").unwrap();

        let checkpoint = Checkpoint::capture(store.as_ref(), ledger.as_ref(), events.as_ref(), HashMap::new());
        assert_eq!(checkpoint.format_version, FORMAT_VERSION);

        let (fresh_store, fresh_ledger, _) = fresh_triple();
        checkpoint.restore_into(fresh_store.as_ref(), fresh_ledger.as_ref());
        assert_eq!(fresh_ledger.scrip_balance(principal), 500);
    }

    #[test]
    fn capture_records_the_next_sequence_as_the_cursor() {
        let (store, ledger, events) = fresh_triple();
        let principal = ArtifactId::now_v7();
        events.append(kernel_core::EventKind::ArtifactCreated, principal, serde_json::json!({}));
        events.append(kernel_core::EventKind::ArtifactCreated, principal, serde_json::json!({}));

        let checkpoint = Checkpoint::capture(store.as_ref(), ledger.as_ref(), events.as_ref(), HashMap::new());
        assert_eq!(checkpoint.event_log_cursor, EventSeq(3));
    }
}
