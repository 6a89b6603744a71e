//! Per-agent loop state: what a loop is doing right now, and the
//! crash-loop bookkeeping that decides when it gets backed off or
//! quarantined.

use kernel_core::{EventKind, Timestamp};
use serde::{Deserialize, Serialize};

/// Why a sleeping loop is sleeping. Checkpointed verbatim so a restored
/// loop resumes waiting on the same condition rather than waking
/// spuriously.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SleepCondition {
    /// Wake at or after this wall-clock time.
    Deadline(Timestamp),
    /// Wake when the supervisor's event dispatcher observes an appended
    /// event of this kind.
    Event(EventKind),
    /// Wake when the policy's predicate next evaluates true. The
    /// supervisor polls it at a bounded frequency rather than letting the
    /// agent burn its own compute budget on the check.
    Predicate,
}

/// What a loop is doing right now. Part of the checkpoint's per-agent
/// state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AgentLoopState {
    Running,
    Sleeping(SleepCondition),
    /// Compute balance is negative; waiting for the bucket to refill above
    /// zero before the next action.
    AwaitingComputeRefill,
    /// Crash-loop threshold exceeded. The loop is paused; an
    /// `agent_quarantined` event has been appended. Resuming requires an
    /// explicit [`crate::Supervisor::resume`] call.
    Quarantined { consecutive_failures: u32, reason: String },
    ShuttingDown,
}

/// Tracks consecutive action failures for one agent and decides the next
/// backoff delay or whether to quarantine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffState {
    pub consecutive_failures: u32,
}

impl BackoffState {
    pub fn new() -> Self {
        Self { consecutive_failures: 0 }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
    }
}

impl Default for BackoffState {
    fn default() -> Self {
        Self::new()
    }
}

/// Exponential backoff delay for the `n`th consecutive failure past
/// `threshold`, capped at `cap`. Failures at or below `threshold` incur no
/// delay — the loop only starts backing off once it's genuinely looping on
/// errors.
pub fn backoff_delay(consecutive_failures: u32, threshold: u32, base: std::time::Duration, cap: std::time::Duration) -> std::time::Duration {
    if consecutive_failures <= threshold {
        return std::time::Duration::ZERO;
    }
    let exponent = consecutive_failures - threshold;
    let scaled = base.saturating_mul(1u32.checked_shl(exponent.min(20)).unwrap_or(u32::MAX));
    scaled.min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn no_delay_at_or_below_threshold() {
        assert_eq!(backoff_delay(3, 3, Duration::from_secs(1), Duration::from_secs(60)), Duration::ZERO);
    }

    #[test]
    fn delay_doubles_past_threshold_and_is_capped() {
        let base = Duration::from_secs(1);
        let cap = Duration::from_secs(10);
        assert_eq!(backoff_delay(4, 3, base, cap), Duration::from_secs(2));
        assert_eq!(backoff_delay(5, 3, base, cap), Duration::from_secs(4));
        assert_eq!(backoff_delay(20, 3, base, cap), cap);
    }

    #[test]
    fn record_failure_and_success_reset_the_counter() {
        let mut state = BackoffState::new();
        state.record_failure();
        state.record_failure();
        assert_eq!(state.consecutive_failures, 2);
        state.record_success();
        assert_eq!(state.consecutive_failures, 0);
    }
}
