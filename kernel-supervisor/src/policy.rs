//! The pluggable "think" step: turns an observation into a proposed
//! action. The supervisor owns the loop's mechanics (sleep, backoff,
//! shutdown); a policy owns what the agent actually wants to do, which is
//! model-driven and out of this crate's scope to implement — tests use a
//! scripted policy, a real deployment wires one backed by
//! [`kernel_engine::ExecutionEngine::llm_complete_as`].

use crate::state::SleepCondition;
use async_trait::async_trait;
use kernel_core::{ArtifactId, KernelResult};
use kernel_engine::ExecutionEngine;
use serde_json::Value;
use std::sync::Arc;

/// One iteration's proposal, submitted to the execution engine by the
/// supervisor on the agent's behalf.
#[derive(Debug, Clone)]
pub enum ProposedAction {
    Read { target: ArtifactId },
    Write { target: ArtifactId, content: Value },
    Edit { target: ArtifactId, patch: Value },
    Delete { target: ArtifactId, reason: String },
    Invoke { target: ArtifactId, method: String, args: Value },
    /// No world-mutating action this iteration; go back to sleep.
    Sleep(SleepCondition),
}

#[async_trait]
pub trait AgentPolicy: Send + Sync {
    /// Bounded reads gathering whatever context `think` needs. Errors here
    /// count as an ordinary failed iteration, same as a rejected action.
    async fn observe(&self, engine: &Arc<ExecutionEngine>, agent_id: ArtifactId) -> KernelResult<Value>;

    /// The one external LLM call per iteration, cost attributed to
    /// `agent_id`, producing the next action to submit.
    async fn think(&self, engine: &Arc<ExecutionEngine>, agent_id: ArtifactId, observation: Value) -> KernelResult<ProposedAction>;

    /// Called after the proposed action has been submitted, with whatever
    /// the engine returned (or the rejection). Used for memory updates;
    /// errors are logged, not propagated — a failure here does not count
    /// against the crash-loop counter, since the action itself already
    /// succeeded or failed on its own terms.
    async fn on_result(&self, engine: &Arc<ExecutionEngine>, agent_id: ArtifactId, action: &ProposedAction, result: &KernelResult<Value>);

    /// Polled by the supervisor, not the agent, while the loop sleeps on
    /// [`SleepCondition::Predicate`]. Only policies that propose that sleep
    /// condition need to override this.
    async fn predicate_satisfied(&self, _engine: &Arc<ExecutionEngine>, _agent_id: ArtifactId) -> bool {
        true
    }
}
