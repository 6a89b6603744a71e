//! The top-level dispatcher for every mutating action. Every observable
//! state change passes through here.

use crate::capability::Capability;
use crate::handler::InvocationHandler;
use crate::llm::{EchoLlmProvider, LlmProvider, LlmRequest, LlmResponse};
use kernel_core::{
    ActionKind, ArtifactId, ContractError, EngineError, EventKind, Invoker, KernelConfig, KernelResult,
    PermissionChecker, ResourceKind,
};
use kernel_events::{EventBuilder, EventLog};
use kernel_ledger::Ledger;
use kernel_store::ArtifactStore;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Baseline compute cost reserved for an invocation before its actual cost
/// is known. Settled against measured wall-clock cost once the call
/// returns.
const INVOCATION_BASELINE_COMPUTE: f64 = 1.0;

pub struct ExecutionEngine {
    pub(crate) store: Arc<dyn ArtifactStore>,
    pub(crate) ledger: Arc<dyn Ledger>,
    events: Arc<dyn EventLog>,
    permission_checker: Arc<dyn PermissionChecker>,
    handlers: RwLock<HashMap<String, Arc<dyn InvocationHandler>>>,
    pub(crate) llm: Arc<dyn LlmProvider>,
    config: KernelConfig,
}

impl ExecutionEngine {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        ledger: Arc<dyn Ledger>,
        events: Arc<dyn EventLog>,
        permission_checker: Arc<dyn PermissionChecker>,
        config: KernelConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            events,
            permission_checker,
            handlers: RwLock::new(HashMap::new()),
            llm: Arc::new(EchoLlmProvider),
            config,
        }
    }

    pub fn with_llm_provider(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = llm;
        self
    }

    /// Registers the handler a given `code.program` name dispatches to.
    /// Called by `kernel-genesis` at bootstrap for each genesis artifact,
    /// and by deployments registering custom contract predicates.
    pub fn register_handler(&self, program: impl Into<String>, handler: Arc<dyn InvocationHandler>) {
        self.handlers.write().expect("lock poisoned").insert(program.into(), handler);
    }

    pub fn read(&self, caller_id: ArtifactId, target: ArtifactId) -> KernelResult<serde_json::Value> {
        self.store.read(target, caller_id, &serde_json::json!({}))
    }

    pub fn write(
        &self,
        caller_id: ArtifactId,
        target: ArtifactId,
        content: serde_json::Value,
    ) -> KernelResult<()> {
        self.store.write(target, caller_id, content, &serde_json::json!({}))
    }

    /// Applies an RFC-7396-style JSON merge patch to the artifact's current
    /// content under write permission, atomically.
    pub fn edit(&self, caller_id: ArtifactId, target: ArtifactId, patch: serde_json::Value) -> KernelResult<()> {
        let current = self.store.get_raw(target)?.content;
        let merged = merge_patch(current, patch);
        self.store.write(target, caller_id, merged, &serde_json::json!({}))
    }

    pub fn delete(&self, caller_id: ArtifactId, target: ArtifactId, reason: &str) -> KernelResult<()> {
        self.store.delete(target, caller_id, reason, &serde_json::json!({}))
    }

    /// Re-points `target`'s access contract. `None` attaches the store's
    /// default contract. Rejects the change (not the artifact) if the new
    /// contract's chain is dangling or would close a cycle.
    pub fn set_access_contract(
        &self,
        caller_id: ArtifactId,
        target: ArtifactId,
        new_contract_id: Option<ArtifactId>,
    ) -> KernelResult<()> {
        self.store.set_access_contract(target, caller_id, new_contract_id, &serde_json::json!({}))
    }

    /// A principal's current balance for a metered resource. The agent loop
    /// supervisor polls this (`Compute`) to decide whether an agent must
    /// wait for bucket refill before its next action.
    pub fn resource_balance(&self, principal: ArtifactId, resource: ResourceKind) -> f64 {
        self.ledger.resource_balance(principal, resource)
    }

    /// Top-level LLM call on behalf of `caller_id` directly, outside any
    /// invocation — the agent loop supervisor's "think" step. Mirrors
    /// [`Capability::llm_complete`], which does the same thing for code
    /// running inside an invoked artifact.
    pub async fn llm_complete_as(&self, caller_id: ArtifactId, request: LlmRequest) -> KernelResult<LlmResponse> {
        let response = self.llm.complete(request).await?;
        let tokens = (response.input_tokens + response.output_tokens) as f64;
        self.ledger.spend(caller_id, ResourceKind::ExternalApi, tokens)?;
        if response.cost > 0 {
            self.ledger.burn(caller_id, response.cost, "llm_call")?;
        }
        Ok(response)
    }

    /// Invokes `target.method(args)` on behalf of `caller_id`.
    pub async fn invoke(
        self: &Arc<Self>,
        caller_id: ArtifactId,
        target: ArtifactId,
        method: &str,
        args: serde_json::Value,
    ) -> KernelResult<serde_json::Value> {
        self.clone().invoke_as(target, method, args, caller_id, 0).await
    }

    pub(crate) async fn invoke_as(
        self: Arc<Self>,
        target: ArtifactId,
        method: &str,
        args: serde_json::Value,
        caller_id: ArtifactId,
        depth: u32,
    ) -> KernelResult<serde_json::Value> {
        if depth > self.config.max_invocation_depth {
            return Err(EngineError::DepthExceeded { max: self.config.max_invocation_depth }.into());
        }

        // 1. Resolve.
        let artifact = self.store.get_raw(target)?;

        // 2. Permission check. Free: no resource reservation happens before
        // this point.
        let context = serde_json::json!({});
        let decision = self.permission_checker.check(&artifact, ActionKind::Invoke, caller_id, &context)?;
        if !decision.allowed {
            self.log_invocation_rejected(caller_id, target, method, &decision.reason);
            return Err(ContractError::Denied { reason: decision.reason }.into());
        }

        // 3. Resource reservation: baseline compute, debt-allowed so this
        // never itself rejects.
        self.ledger.spend(caller_id, ResourceKind::Compute, INVOCATION_BASELINE_COMPUTE)?;

        self.log_invocation_started(caller_id, target, method);

        let program = match artifact.code.as_ref() {
            Some(code) => code.program.clone(),
            None => {
                let reason = format!("artifact {target} has no executable code");
                self.settle_compute(caller_id, Instant::now());
                self.log_invocation_completed(caller_id, target, method, false, &reason);
                return Err(EngineError::ExecutionFault { artifact: target, reason }.into());
            }
        };
        let handler = self.handlers.read().expect("lock poisoned").get(&program).cloned();
        let Some(handler) = handler else {
            let reason = format!("no handler registered for program {program:?}");
            self.log_invocation_completed(caller_id, target, method, false, &reason);
            return Err(EngineError::ExecutionFault { artifact: target, reason }.into());
        };

        // 4. Execute, under a per-call timeout. Spawned as its own task so
        // a timeout can abort it rather than merely stop awaiting it.
        let cap = Capability::new(self.clone(), target, depth);
        let method_owned = method.to_string();
        let started = Instant::now();
        let mut task = tokio::spawn(async move { handler.call(&cap, caller_id, &method_owned, args).await });

        let outcome = tokio::select! {
            joined = &mut task => match joined {
                Ok(result) => result,
                Err(join_err) if join_err.is_panic() => {
                    Err(EngineError::ExecutionFault {
                        artifact: target,
                        reason: "invocation panicked".into(),
                    }
                    .into())
                }
                Err(_) => Err(EngineError::Cancelled.into()),
            },
            _ = tokio::time::sleep(self.config.per_call_timeout) => {
                task.abort();
                Err(EngineError::Timeout(target).into())
            }
        };

        // 5. Charge actual cost, settling against the baseline reservation.
        self.settle_compute(caller_id, started);

        // 6 & 7. Commit already happened inside the handler (each
        // sub-action it issued through the capability committed on its own
        // atomic boundary); log this invocation's outcome.
        match &outcome {
            Ok(_) => self.log_invocation_completed(caller_id, target, method, true, ""),
            Err(e) => self.log_invocation_completed(caller_id, target, method, false, &e.to_string()),
        }

        outcome
    }

    fn settle_compute(&self, caller_id: ArtifactId, started: Instant) {
        let actual = started.elapsed().as_secs_f64();
        let settle = actual - INVOCATION_BASELINE_COMPUTE;
        if settle > 0.0 {
            let _ = self.ledger.spend(caller_id, ResourceKind::Compute, settle);
        } else if settle < 0.0 {
            let _ = self.ledger.adjust_resource(caller_id, ResourceKind::Compute, settle);
        }
    }

    fn log_invocation_started(&self, caller_id: ArtifactId, target: ArtifactId, method: &str) {
        let (kind, pid, payload) = EventBuilder::new(EventKind::InvocationStarted, caller_id)
            .field("target", target.to_string())
            .field("method", method)
            .build();
        self.events.append(kind, pid, payload);
    }

    fn log_invocation_rejected(&self, caller_id: ArtifactId, target: ArtifactId, method: &str, reason: &str) {
        let (kind, pid, payload) = EventBuilder::new(EventKind::InvocationRejected, caller_id)
            .field("target", target.to_string())
            .field("method", method)
            .field("reason", reason)
            .build();
        self.events.append(kind, pid, payload);
    }

    fn log_invocation_completed(
        &self,
        caller_id: ArtifactId,
        target: ArtifactId,
        method: &str,
        succeeded: bool,
        reason: &str,
    ) {
        let (kind, pid, payload) = EventBuilder::new(EventKind::InvocationCompleted, caller_id)
            .field("target", target.to_string())
            .field("method", method)
            .field("succeeded", succeeded)
            .field("reason", reason)
            .build();
        self.events.append(kind, pid, payload);
    }
}

/// Lets the contract evaluator dispatch a `CustomPredicate` contract's
/// sub-invocation back through this engine without `kernel-contracts`
/// depending on `kernel-engine`. Implemented on this newtype around
/// `Arc<ExecutionEngine>` (rather than bare `ExecutionEngine`) so the
/// capability handed to the predicate can share the engine's real handler
/// registry; the wrapper exists because the orphan rules forbid
/// implementing a foreign trait directly on `Arc<ExecutionEngine>` (`Arc`
/// and `Invoker` are both foreign to this crate). Permission evaluation is
/// synchronous by construction (§4.4: it must not straddle a suspension
/// point), so this bridges into the async pipeline via `block_in_place`; it
/// requires a multi-thread tokio runtime, which the CLI's `#[tokio::main]`
/// provides.
pub struct EngineInvoker(pub Arc<ExecutionEngine>);

impl Invoker for EngineInvoker {
    fn invoke(
        &self,
        artifact_id: ArtifactId,
        method: &str,
        args: serde_json::Value,
        caller_id: ArtifactId,
        permission_depth: u32,
    ) -> KernelResult<serde_json::Value> {
        let engine = &self.0;
        let artifact = engine.store.get_raw(artifact_id)?;
        let program = artifact
            .code
            .as_ref()
            .map(|c| c.program.clone())
            .ok_or_else(|| EngineError::ExecutionFault {
                artifact: artifact_id,
                reason: "predicate artifact has no code".into(),
            })?;
        let handler = engine.handlers.read().expect("lock poisoned").get(&program).cloned();
        let Some(handler) = handler else {
            return Err(EngineError::ExecutionFault {
                artifact: artifact_id,
                reason: format!("no handler registered for program {program:?}"),
            }
            .into());
        };
        let cap = Capability::new(engine.clone(), artifact_id, permission_depth);
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(handler.call(&cap, caller_id, method, args))
        })
    }
}

/// RFC-7396 JSON Merge Patch: objects merge key-by-key, a `null` leaf
/// deletes the key, anything else (scalars, arrays) replaces wholesale.
fn merge_patch(target: serde_json::Value, patch: serde_json::Value) -> serde_json::Value {
    match (target, patch) {
        (serde_json::Value::Object(mut target_map), serde_json::Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                if value.is_null() {
                    target_map.remove(&key);
                } else {
                    let existing = target_map.remove(&key).unwrap_or(serde_json::Value::Null);
                    target_map.insert(key, merge_patch(existing, value));
                }
            }
            serde_json::Value::Object(target_map)
        }
        (_, patch) => patch,
    }
}
