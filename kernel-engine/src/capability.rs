//! The object handed to an artifact's code while it executes. Every method
//! is attributed to the *immediate caller* bound into the capability, not
//! to whoever originally started the top-level action — this is what makes
//! delegation trustless (see the engine's immediate-caller semantics).

use crate::engine::ExecutionEngine;
use crate::llm::{LlmRequest, LlmResponse};
use kernel_core::{ArtifactId, KernelResult, ResourceKind};
use std::sync::Arc;

#[derive(Clone)]
pub struct Capability {
    pub(crate) engine: Arc<ExecutionEngine>,
    /// The identity that pays for, and is the requester of, every action
    /// this capability issues.
    pub(crate) caller_id: ArtifactId,
    pub(crate) depth: u32,
}

impl Capability {
    pub(crate) fn new(engine: Arc<ExecutionEngine>, caller_id: ArtifactId, depth: u32) -> Self {
        Self { engine, caller_id, depth }
    }

    pub fn caller_id(&self) -> ArtifactId {
        self.caller_id
    }

    /// Reads an artifact's content, permission-checked as this capability's
    /// caller.
    pub fn read(&self, target: ArtifactId) -> KernelResult<serde_json::Value> {
        self.engine.store.read(target, self.caller_id, &serde_json::json!({}))
    }

    /// Invokes another artifact. `target` sees this capability's caller as
    /// requester, not whoever invoked the artifact that holds this
    /// capability.
    pub async fn invoke(
        &self,
        target: ArtifactId,
        method: &str,
        args: serde_json::Value,
    ) -> KernelResult<serde_json::Value> {
        self.engine
            .clone()
            .invoke_as(target, method, args, self.caller_id, self.depth + 1)
            .await
    }

    pub fn scrip_balance(&self, principal: ArtifactId) -> u64 {
        self.engine.ledger.scrip_balance(principal)
    }

    pub fn resource_balance(&self, principal: ArtifactId, resource: ResourceKind) -> f64 {
        self.engine.ledger.resource_balance(principal, resource)
    }

    /// Transfers scrip from this capability's caller to `to`. There is no
    /// ambient owner-pays: debiting anyone else requires a separately
    /// signed authorization artifact the kernel does not model here.
    pub fn transfer(&self, to: ArtifactId, amount: u64) -> KernelResult<()> {
        self.engine.ledger.transfer(self.caller_id, to, amount)
    }

    /// Meters a raw external-API call (non-LLM) against both the caller's
    /// bucket and the system-wide bucket.
    pub fn external_api_spend(&self, cost: f64) -> KernelResult<()> {
        self.engine.ledger.spend(self.caller_id, ResourceKind::ExternalApi, cost)?;
        Ok(())
    }

    /// Calls the configured LLM collaborator, then debits the caller's
    /// scrip by `cost` and the external-API bucket by the token count.
    pub async fn llm_complete(&self, request: LlmRequest) -> KernelResult<LlmResponse> {
        let response = self.engine.llm.complete(request).await?;
        let tokens = (response.input_tokens + response.output_tokens) as f64;
        self.engine.ledger.spend(self.caller_id, ResourceKind::ExternalApi, tokens)?;
        if response.cost > 0 {
            self.engine.ledger.burn(self.caller_id, response.cost, "llm_call")?;
        }
        Ok(response)
    }
}
