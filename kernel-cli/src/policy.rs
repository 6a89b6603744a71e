//! The default agent policy a kernel run spawns when no richer
//! deployment-specific policy is wired in: read the genesis handbook, ask
//! the configured LLM provider what to do next, log it, then sleep. Real
//! task-specific policies are expected to replace this one; it exists so
//! a bare `kernel run` has something to spawn at all.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use kernel_core::{ArtifactId, KernelResult};
use kernel_engine::{ExecutionEngine, LlmRequest};
use kernel_supervisor::{AgentPolicy, ProposedAction, SleepCondition};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub struct HeartbeatPolicy {
    pub handbook_id: ArtifactId,
    pub sleep_for: Duration,
}

#[async_trait]
impl AgentPolicy for HeartbeatPolicy {
    async fn observe(&self, engine: &Arc<ExecutionEngine>, agent_id: ArtifactId) -> KernelResult<Value> {
        let handbook = engine.read(agent_id, self.handbook_id)?;
        let compute = engine.resource_balance(agent_id, kernel_core::ResourceKind::Compute);
        Ok(serde_json::json!({ "handbook": handbook, "compute_balance": compute }))
    }

    async fn think(&self, engine: &Arc<ExecutionEngine>, agent_id: ArtifactId, observation: Value) -> KernelResult<ProposedAction> {
        let request = LlmRequest {
            prompt: format!("observation: {observation}"),
            model: "heartbeat".into(),
            max_tokens: 64,
        };
        let response = engine.llm_complete_as(agent_id, request).await?;
        tracing::debug!(agent = %agent_id, reply = %response.text, "heartbeat policy think step");
        let wake_at = Utc::now() + ChronoDuration::from_std(self.sleep_for).unwrap_or(ChronoDuration::seconds(1));
        Ok(ProposedAction::Sleep(SleepCondition::Deadline(wake_at)))
    }

    async fn on_result(&self, _engine: &Arc<ExecutionEngine>, agent_id: ArtifactId, action: &ProposedAction, result: &KernelResult<Value>) {
        if let Err(err) = result {
            tracing::warn!(agent = %agent_id, ?action, %err, "heartbeat policy action rejected");
        }
    }
}
