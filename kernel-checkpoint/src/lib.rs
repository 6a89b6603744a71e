//! Checkpoint snapshot format and stop-the-world persistence.
//!
//! A checkpoint is a self-describing, versioned document capturing the full
//! store, the full ledger, the event-log cursor, and per-agent loop state at
//! a moment when every agent loop had reached an action boundary. The event
//! log itself lives in a separate append-only file; a checkpoint only
//! records how far into it the snapshot reaches.

mod format;
mod io;

pub use format::{AgentSnapshot, Checkpoint, FORMAT_VERSION};
pub use io::{
    append_event, checkpoints_dir, events_log_path, latest_checkpoint_path, read_checkpoint,
    read_events_before, read_events_log, write_checkpoint,
};

use kernel_core::{ArtifactId, CheckpointError, ComputeBucketRestartPolicy, KernelConfig, ResourceKind};
use kernel_events::{EventLog, InMemoryEventLog};
use kernel_ledger::Ledger;
use kernel_store::ArtifactStore;
use std::path::Path;

/// What a run resumes with: the restored event log plus the checkpoint
/// document it came from (callers typically only need the former, but the
/// latter's `agents` map is how the supervisor reconstructs per-agent
/// state).
pub struct ResumedRun {
    pub events: InMemoryEventLog,
    pub checkpoint: Checkpoint,
}

/// Loads the latest checkpoint under `run_dir`, if any, restores `store` and
/// `ledger` in place, and rebuilds the event log from the on-disk log
/// truncated to the checkpoint's cursor. Returns `Ok(None)` for a fresh run
/// with no prior checkpoint — the caller proceeds with empty state.
pub fn resume(
    run_dir: &Path,
    store: &dyn ArtifactStore,
    ledger: &dyn Ledger,
    config: &KernelConfig,
) -> Result<Option<ResumedRun>, CheckpointError> {
    let Some(path) = latest_checkpoint_path(run_dir)? else {
        return Ok(None);
    };
    let mut checkpoint = read_checkpoint(&path)?;

    if config.compute_bucket_restart_policy == ComputeBucketRestartPolicy::ResetToZero {
        for entry in checkpoint.ledger.entries.values_mut() {
            if let Some(bucket) = entry.buckets.get_mut(&ResourceKind::Compute) {
                bucket.balance = 0.0;
            }
        }
    }

    checkpoint.restore_into(store, ledger);
    let events = read_events_before(run_dir, checkpoint.event_log_cursor)?;
    let events = InMemoryEventLog::from_events(events);
    Ok(Some(ResumedRun { events, checkpoint }))
}

/// Captures and writes a checkpoint in one step. `agents` is the
/// supervisor's current per-agent state, keyed by agent artifact id.
pub fn checkpoint_now(
    run_dir: &Path,
    store: &dyn ArtifactStore,
    ledger: &dyn Ledger,
    events: &dyn EventLog,
    agents: std::collections::HashMap<ArtifactId, AgentSnapshot>,
) -> Result<std::path::PathBuf, CheckpointError> {
    let checkpoint = Checkpoint::capture(store, ledger, events, agents);
    write_checkpoint(run_dir, &checkpoint)
}

/// Human-readable summary of a checkpoint file, for the CLI's `inspect`
/// subcommand.
#[derive(Debug, Clone)]
pub struct CheckpointSummary {
    pub format_version: u32,
    pub captured_at: kernel_core::Timestamp,
    pub event_log_cursor: u64,
    pub artifact_count: usize,
    pub tombstone_count: usize,
    pub agent_count: usize,
    pub quarantined_count: usize,
    pub total_scrip: u64,
}

pub fn inspect(path: &Path) -> Result<CheckpointSummary, CheckpointError> {
    let checkpoint = read_checkpoint(path)?;
    let quarantined_count = checkpoint
        .agents
        .values()
        .filter(|a| matches!(a.state, kernel_supervisor::AgentLoopState::Quarantined { .. }))
        .count();
    Ok(CheckpointSummary {
        format_version: checkpoint.format_version,
        captured_at: checkpoint.captured_at,
        event_log_cursor: checkpoint.event_log_cursor.0,
        artifact_count: checkpoint.store.artifacts.len(),
        tombstone_count: checkpoint.store.tombstones.len(),
        agent_count: checkpoint.agents.len(),
        quarantined_count,
        total_scrip: checkpoint.ledger.entries.values().map(|e| e.scrip).sum(),
    })
}

impl std::fmt::Display for CheckpointSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "checkpoint format version {}", self.format_version)?;
        writeln!(f, "captured at {}", self.captured_at)?;
        writeln!(f, "event log cursor: {}", self.event_log_cursor)?;
        writeln!(f, "artifacts: {} ({} tombstoned)", self.artifact_count, self.tombstone_count)?;
        writeln!(f, "agents: {} ({} quarantined)", self.agent_count, self.quarantined_count)?;
        write!(f, "total scrip in circulation: {}", self.total_scrip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_core::{ArtifactId, EventKind};
    use kernel_events::InMemoryEventLog as Log;
    use kernel_ledger::InMemoryLedger;
    use kernel_store::InMemoryArtifactStore;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn harness() -> (Arc<InMemoryArtifactStore>, Arc<InMemoryLedger>, Arc<Log>) {
        let events = Arc::new(Log::new());
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
    fn resume_with_no_prior_checkpoint_returns_none() {
        let dir = tempdir().unwrap();
        let (store, ledger, _) = harness();
        let result = resume(dir.path(), store.as_ref(), ledger.as_ref(), &KernelConfig::for_tests()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn checkpoint_then_resume_restores_scrip_and_cursor() {
        let dir = tempdir().unwrap();
        let (store, ledger, events) = harness();
        let principal = ArtifactId::now_v7();
        ledger.register_principal(principal);
        ledger.mint(principal, 250, "seed").unwrap();
        events.append(EventKind::ArtifactCreated, principal, serde_json::json!({}));

        checkpoint_now(dir.path(), store.as_ref(), ledger.as_ref(), events.as_ref(), Default::default()).unwrap();

        let (fresh_store, fresh_ledger, _) = harness();
        let resumed = resume(dir.path(), fresh_store.as_ref(), fresh_ledger.as_ref(), &KernelConfig::for_tests())
            .unwrap()
            .expect("a checkpoint exists");

        assert_eq!(fresh_ledger.scrip_balance(principal), 250);
        assert_eq!(resumed.events.next_seq().0, 2);
    }

    #[test]
    fn reset_to_zero_policy_zeroes_compute_balance_on_resume() {
        let dir = tempdir().unwrap();
        let (store, ledger, events) = harness();
        let principal = ArtifactId::now_v7();
        ledger.register_principal(principal);
        ledger.spend(principal, ResourceKind::Compute, 5.0).unwrap();

        checkpoint_now(dir.path(), store.as_ref(), ledger.as_ref(), events.as_ref(), Default::default()).unwrap();

        let (fresh_store, fresh_ledger, _) = harness();
        let mut config = KernelConfig::for_tests();
        config.compute_bucket_restart_policy = ComputeBucketRestartPolicy::ResetToZero;
        resume(dir.path(), fresh_store.as_ref(), fresh_ledger.as_ref(), &config).unwrap();

        assert!(fresh_ledger.resource_balance(principal, ResourceKind::Compute) < 1.0);
    }

    #[test]
    fn inspect_summarizes_a_written_checkpoint() {
        let dir = tempdir().unwrap();
        let (store, ledger, events) = harness();
        let principal = ArtifactId::now_v7();
        ledger.register_principal(principal);
        ledger.mint(principal, 100, "seed").unwrap();

        let path = checkpoint_now(dir.path(), store.as_ref(), ledger.as_ref(), events.as_ref(), Default::default()).unwrap();
        let summary = inspect(&path).unwrap();
        assert_eq!(summary.total_scrip, 100);
        assert_eq!(summary.format_version, FORMAT_VERSION);
    }
}
