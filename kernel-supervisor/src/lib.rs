//! Agent loop supervisor - spawns and shepherds one cooperative task per
//! agent-artifact (an artifact with both `has_standing` and
//! `has_executable` set). Owns sleep, crash-loop backoff, quarantine, and
//! graceful shutdown; what an agent actually does each iteration is a
//! pluggable [`AgentPolicy`].

mod policy;
mod state;
mod supervisor;

pub use policy::{AgentPolicy, ProposedAction};
pub use state::{backoff_delay, AgentLoopState, BackoffState, SleepCondition};
pub use supervisor::{Supervisor, SupervisorConfig};
