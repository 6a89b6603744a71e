//! The append-only event log trait and its in-memory implementation.

use chrono::Utc;
use kernel_core::{ArtifactId, Event, EventKind, EventSeq};
use std::sync::RwLock;

/// Append-only, strictly monotonic observability log.
///
/// `append` is the only mutation; every other method reads a snapshot that
/// may be slightly stale relative to a concurrent append, per the shared
/// resource policy — readers never block writers.
pub trait EventLog: Send + Sync {
    fn append(&self, kind: EventKind, principal_id: ArtifactId, payload: serde_json::Value) -> Event;

    /// The sequence number that will be assigned to the *next* appended
    /// event. Used by checkpoints to record the log cursor.
    fn next_seq(&self) -> EventSeq;

    fn read(&self, seq: EventSeq) -> Option<Event>;

    /// Read events in `[from, to)` by sequence, bounded by `limit`.
    fn read_range(&self, from: EventSeq, to: EventSeq, limit: usize) -> Vec<Event>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Convenience filters built on top of the base [`EventLog`] trait.
pub trait EventLogExt: EventLog {
    fn find_by_kind(&self, kind: EventKind, limit: usize) -> Vec<Event> {
        let mut out = Vec::new();
        let mut seq = EventSeq::first();
        while out.len() < limit && seq.0 <= self.next_seq().0 {
            if let Some(event) = self.read(seq) {
                if event.kind == kind {
                    out.push(event);
                }
            }
            seq = seq.next();
        }
        out
    }

    fn find_by_principal(&self, principal_id: ArtifactId, limit: usize) -> Vec<Event> {
        let mut out = Vec::new();
        let mut seq = EventSeq::first();
        while out.len() < limit && seq.0 <= self.next_seq().0 {
            if let Some(event) = self.read(seq) {
                if event.principal_id == principal_id {
                    out.push(event);
                }
            }
            seq = seq.next();
        }
        out
    }
}

impl<T: EventLog + ?Sized> EventLogExt for T {}

/// In-memory event log. All mutation goes through a single `RwLock` held
/// only for the duration of the synchronous push — no suspension point is
/// ever reached while the lock is held.
#[derive(Default)]
pub struct InMemoryEventLog {
    events: RwLock<Vec<Event>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
        }
    }

    /// Rehydrate a log from a checkpointed tail, preserving sequence
    /// numbers exactly as they were (used by checkpoint restore).
    pub fn from_events(events: Vec<Event>) -> Self {
        Self {
            events: RwLock::new(events),
        }
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.events.read().expect("event log lock poisoned").clone()
    }
}

impl EventLog for InMemoryEventLog {
    fn append(&self, kind: EventKind, principal_id: ArtifactId, payload: serde_json::Value) -> Event {
        let mut guard = self.events.write().expect("event log lock poisoned");
        let seq = guard.last().map(|e| e.seq.next()).unwrap_or_else(EventSeq::first);
        let event = Event {
            seq,
            timestamp: Utc::now(),
            kind,
            principal_id,
            payload,
        };
        guard.push(event.clone());
        event
    }

    fn next_seq(&self) -> EventSeq {
        let guard = self.events.read().expect("event log lock poisoned");
        EventSeq((guard.len() + 1) as u64)
    }

    fn read(&self, seq: EventSeq) -> Option<Event> {
        let guard = self.events.read().expect("event log lock poisoned");
        guard.get((seq.0.checked_sub(1)?) as usize).cloned()
    }

    fn read_range(&self, from: EventSeq, to: EventSeq, limit: usize) -> Vec<Event> {
        let guard = self.events.read().expect("event log lock poisoned");
        let start = from.0.saturating_sub(1) as usize;
        let end = (to.0.saturating_sub(1) as usize).min(guard.len());
        if start >= end {
            return Vec::new();
        }
        guard[start..end].iter().take(limit).cloned().collect()
    }

    fn len(&self) -> usize {
        self.events.read().expect("event log lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_are_strictly_monotonic_from_one() {
        let log = InMemoryEventLog::new();
        let principal = ArtifactId::now_v7();
        for i in 1..=5u64 {
            let event = log.append(EventKind::ArtifactCreated, principal, serde_json::json!({}));
            assert_eq!(event.seq.0, i);
        }
    }

    #[test]
    fn read_returns_none_past_the_end() {
        let log = InMemoryEventLog::new();
        assert!(log.read(EventSeq::first()).is_none());
    }

    #[test]
    fn read_range_respects_limit_and_bounds() {
        let log = InMemoryEventLog::new();
        let principal = ArtifactId::now_v7();
        for _ in 0..10 {
            log.append(EventKind::Transfer, principal, serde_json::json!({}));
        }
        let page = log.read_range(EventSeq(2), EventSeq(9), 3);
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].seq, EventSeq(2));
    }

    #[test]
    fn find_by_kind_filters_correctly() {
        let log = InMemoryEventLog::new();
        let principal = ArtifactId::now_v7();
        log.append(EventKind::Transfer, principal, serde_json::json!({}));
        log.append(EventKind::ArtifactCreated, principal, serde_json::json!({}));
        log.append(EventKind::Transfer, principal, serde_json::json!({}));
        let transfers = log.find_by_kind(EventKind::Transfer, 10);
        assert_eq!(transfers.len(), 2);
    }

    #[test]
    fn from_events_preserves_existing_sequence_numbers() {
        let principal = ArtifactId::now_v7();
        let seeded = vec![Event {
            seq: EventSeq(42),
            timestamp: Utc::now(),
            kind: EventKind::Checkpoint,
            principal_id: principal,
            payload: serde_json::json!({}),
        }];
        let log = InMemoryEventLog::from_events(seeded);
        assert_eq!(log.next_seq(), EventSeq(43));
    }
}
