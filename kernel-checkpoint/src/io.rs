//! On-disk layout: `<run_dir>/events.log` (append-only, one JSON event per
//! line) and `<run_dir>/checkpoints/NNNNNN/checkpoint.json` (numbered
//! snapshots, written atomically via write-to-temp-then-rename).

use crate::format::{Checkpoint, FORMAT_VERSION};
use kernel_core::{CheckpointError, Event, EventSeq};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

fn io_err(operation: &str, reason: std::io::Error) -> CheckpointError {
    CheckpointError::Io {
        operation: operation.to_string(),
        reason: reason.to_string(),
    }
}

pub fn events_log_path(run_dir: &Path) -> PathBuf {
    run_dir.join("events.log")
}

pub fn checkpoints_dir(run_dir: &Path) -> PathBuf {
    run_dir.join("checkpoints")
}

/// Appends one event as a single JSON line. Opens and closes the file on
/// every call rather than holding a handle open, since checkpoints are rare
/// relative to the process lifetime and this keeps the writer stateless.
pub fn append_event(run_dir: &Path, event: &Event) -> Result<(), CheckpointError> {
    let path = events_log_path(run_dir);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err("create run directory", e))?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| io_err("open events.log", e))?;
    let line = serde_json::to_string(event).map_err(|e| CheckpointError::Corrupt {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    writeln!(file, "{line}").map_err(|e| io_err("append to events.log", e))?;
    Ok(())
}

/// Reads every event ever appended, in order. Restoring state from a
/// checkpoint reads this and discards anything at or past the checkpoint's
/// cursor.
pub fn read_events_log(run_dir: &Path) -> Result<Vec<Event>, CheckpointError> {
    let path = events_log_path(run_dir);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = fs::File::open(&path).map_err(|e| io_err("open events.log", e))?;
    let reader = BufReader::new(file);
    let mut events = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| io_err("read events.log", e))?;
        if line.trim().is_empty() {
            continue;
        }
        let event: Event = serde_json::from_str(&line).map_err(|e| CheckpointError::Corrupt {
            path: path.display().to_string(),
            reason: format!("line {}: {e}", line_no + 1),
        })?;
        events.push(event);
    }
    Ok(events)
}

/// The events already committed as of `cursor` — everything with
/// `seq < cursor`. `cursor` is the sequence that will be assigned *next*,
/// matching [`kernel_events::EventLog::next_seq`].
pub fn read_events_before(run_dir: &Path, cursor: EventSeq) -> Result<Vec<Event>, CheckpointError> {
    Ok(read_events_log(run_dir)?.into_iter().filter(|e| e.seq.0 < cursor.0).collect())
}

fn checkpoint_number_from_name(name: &str) -> Option<u64> {
    name.parse().ok()
}

/// Every numbered checkpoint directory under `run_dir/checkpoints`, sorted
/// ascending.
fn list_checkpoint_numbers(run_dir: &Path) -> Result<Vec<u64>, CheckpointError> {
    let dir = checkpoints_dir(run_dir);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut numbers = Vec::new();
    for entry in fs::read_dir(&dir).map_err(|e| io_err("list checkpoints directory", e))? {
        let entry = entry.map_err(|e| io_err("list checkpoints directory", e))?;
        if let Some(name) = entry.file_name().to_str().and_then(checkpoint_number_from_name) {
            numbers.push(name);
        }
    }
    numbers.sort_unstable();
    Ok(numbers)
}

/// Writes `checkpoint` into the next numbered directory, atomically:
/// serialize to a temp file in the same directory, then rename over the
/// final name so a crash mid-write never leaves a half-written checkpoint
/// visible to a restart.
pub fn write_checkpoint(run_dir: &Path, checkpoint: &Checkpoint) -> Result<PathBuf, CheckpointError> {
    let next = list_checkpoint_numbers(run_dir)?.last().map(|n| n + 1).unwrap_or(0);
    let dir = checkpoints_dir(run_dir).join(format!("{next:06}"));
    fs::create_dir_all(&dir).map_err(|e| io_err("create checkpoint directory", e))?;

    let final_path = dir.join("checkpoint.json");
    let tmp_path = dir.join("checkpoint.json.tmp");

    let serialized = serde_json::to_vec_pretty(checkpoint).map_err(|e| CheckpointError::Corrupt {
        path: final_path.display().to_string(),
        reason: e.to_string(),
    })?;
    {
        let mut tmp = fs::File::create(&tmp_path).map_err(|e| io_err("create checkpoint temp file", e))?;
        tmp.write_all(&serialized).map_err(|e| io_err("write checkpoint temp file", e))?;
        tmp.sync_all().map_err(|e| io_err("fsync checkpoint temp file", e))?;
    }
    fs::rename(&tmp_path, &final_path).map_err(|e| io_err("rename checkpoint into place", e))?;
    Ok(final_path)
}

/// The most recently written checkpoint's `checkpoint.json`, if any.
pub fn latest_checkpoint_path(run_dir: &Path) -> Result<Option<PathBuf>, CheckpointError> {
    let numbers = list_checkpoint_numbers(run_dir)?;
    Ok(numbers
        .last()
        .map(|n| checkpoints_dir(run_dir).join(format!("{n:06}")).join("checkpoint.json")))
}

pub fn read_checkpoint(path: &Path) -> Result<Checkpoint, CheckpointError> {
    let bytes = fs::read(path).map_err(|e| io_err("read checkpoint file", e))?;
    let checkpoint: Checkpoint = serde_json::from_slice(&bytes).map_err(|e| CheckpointError::Corrupt {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    if checkpoint.format_version != FORMAT_VERSION {
        return Err(CheckpointError::UnsupportedVersion {
            found: checkpoint.format_version,
            expected: FORMAT_VERSION,
        });
    }
    Ok(checkpoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_core::{ArtifactId, EventKind, KernelConfig};
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn sample_checkpoint() -> Checkpoint {
        Checkpoint {
            format_version: FORMAT_VERSION,
            captured_at: chrono::Utc::now(),
            event_log_cursor: EventSeq(7),
            store: kernel_store::StoreSnapshot::default(),
            ledger: kernel_ledger::LedgerSnapshot {
                entries: HashMap::new(),
                external_api_system: kernel_core::TokenBucketState::new(
                    KernelConfig::for_tests().external_api_bucket.rate,
                    KernelConfig::for_tests().external_api_bucket.capacity,
                    chrono::Utc::now(),
                ),
            },
            agents: HashMap::new(),
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let checkpoint = sample_checkpoint();
        let path = write_checkpoint(dir.path(), &checkpoint).unwrap();
        assert!(path.ends_with("checkpoint.json"));
        let loaded = read_checkpoint(&path).unwrap();
        assert_eq!(loaded.event_log_cursor, checkpoint.event_log_cursor);
    }

    #[test]
    fn successive_writes_get_increasing_numbers() {
        let dir = tempdir().unwrap();
        let first = write_checkpoint(dir.path(), &sample_checkpoint()).unwrap();
        let second = write_checkpoint(dir.path(), &sample_checkpoint()).unwrap();
        assert_ne!(first, second);
        assert_eq!(latest_checkpoint_path(dir.path()).unwrap().unwrap(), second);
    }

    #[test]
    fn reading_a_corrupt_file_fails_closed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        fs::write(&path, b"not json").unwrap();
        let err = read_checkpoint(&path).unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupt { .. }));
    }

    #[test]
    fn event_log_appends_and_reads_back_in_order() {
        let dir = tempdir().unwrap();
        let principal = ArtifactId::now_v7();
        for _ in 0..3 {
            let event = Event {
                seq: EventSeq(1),
                timestamp: chrono::Utc::now(),
                kind: EventKind::Transfer,
                principal_id: principal,
                payload: serde_json::json!({}),
            };
            append_event(dir.path(), &event).unwrap();
        }
        let events = read_events_log(dir.path()).unwrap();
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn read_events_before_excludes_the_cursor_and_later() {
        let dir = tempdir().unwrap();
        let principal = ArtifactId::now_v7();
        for seq in 1..=5u64 {
            let event = Event {
                seq: EventSeq(seq),
                timestamp: chrono::Utc::now(),
                kind: EventKind::Transfer,
                principal_id: principal,
                payload: serde_json::json!({}),
            };
            append_event(dir.path(), &event).unwrap();
        }
        let before = read_events_before(dir.path(), EventSeq(3)).unwrap();
        assert_eq!(before.iter().map(|e| e.seq.0).collect::<Vec<_>>(), vec![1, 2]);
    }
}
