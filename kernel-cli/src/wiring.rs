//! Composition root: builds the store/ledger/engine/contracts stack and
//! installs genesis.
//!
//! The store needs a `PermissionChecker` at construction; the real
//! checker, [`ContractEvaluator`], needs a built store at its own
//! construction. Every individual crate's tests sidestep this with
//! [`kernel_core::AlwaysAllow`]; a real run can't. [`DeferredPermissionChecker`]
//! breaks the cycle: the store is built against it first, empty, then the
//! evaluator is built against the store, then the deferred checker is
//! pointed at the evaluator before any agent loop starts.

use kernel_contracts::ContractEvaluator;
use kernel_core::{
    ActionKind, Artifact, ArtifactId, KernelConfig, KernelResult, PermissionChecker, PermissionDecision,
};
use kernel_engine::ExecutionEngine;
use kernel_events::{EventLog, InMemoryEventLog};
use kernel_genesis::GenesisIds;
use kernel_ledger::{InMemoryLedger, Ledger};
use kernel_store::{ArtifactStore, InMemoryArtifactStore};
use std::sync::{Arc, RwLock};

/// Forwards to whatever checker is set, or denies everything until one is.
/// Denying rather than allowing while unset means a bug in the wiring
/// order fails closed instead of silently running with no access control.
pub struct DeferredPermissionChecker {
    inner: RwLock<Option<Arc<dyn PermissionChecker>>>,
}

impl DeferredPermissionChecker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { inner: RwLock::new(None) })
    }

    pub fn bind(&self, checker: Arc<dyn PermissionChecker>) {
        *self.inner.write().expect("lock poisoned") = Some(checker);
    }
}

impl PermissionChecker for DeferredPermissionChecker {
    fn check(
        &self,
        artifact: &Artifact,
        action: ActionKind,
        requester_id: ArtifactId,
        context: &serde_json::Value,
    ) -> KernelResult<PermissionDecision> {
        match self.inner.read().expect("lock poisoned").as_ref() {
            Some(checker) => checker.check(artifact, action, requester_id, context),
            None => Ok(PermissionDecision::deny("permission checker not yet wired")),
        }
    }

    fn invalidate(&self, artifact_id: ArtifactId) {
        if let Some(checker) = self.inner.read().expect("lock poisoned").as_ref() {
            checker.invalidate(artifact_id);
        }
    }
}

/// Every long-lived handle a running kernel needs, handed back to `main`
/// for supervisor wiring and checkpointing.
pub struct Kernel {
    pub events: Arc<InMemoryEventLog>,
    pub ledger: Arc<InMemoryLedger>,
    pub store: Arc<InMemoryArtifactStore>,
    pub engine: Arc<ExecutionEngine>,
    pub genesis: GenesisIds,
}

/// Builds the full stack and installs genesis against an empty store.
/// Only valid to call once per run — a resumed run restores state into
/// this same freshly-built stack afterwards, it does not rebuild it.
pub fn build(config: &KernelConfig, oracle_principal: ArtifactId) -> KernelResult<Kernel> {
    let events = Arc::new(InMemoryEventLog::new());
    let ledger = Arc::new(InMemoryLedger::new(events.clone(), config.clone()));
    let deferred = DeferredPermissionChecker::new();
    let store = Arc::new(InMemoryArtifactStore::new(
        deferred.clone() as Arc<dyn PermissionChecker>,
        ledger.clone(),
        events.clone(),
        config.clone(),
    ));

    let evaluator = Arc::new(ContractEvaluator::new(store.clone() as Arc<dyn ArtifactStore>, config));
    deferred.bind(evaluator.clone());

    let engine = Arc::new(ExecutionEngine::new(
        store.clone() as Arc<dyn ArtifactStore>,
        ledger.clone() as Arc<dyn Ledger>,
        events.clone() as Arc<dyn EventLog>,
        evaluator.clone() as Arc<dyn PermissionChecker>,
        config.clone(),
    ));
    evaluator.set_invoker(Arc::new(kernel_engine::EngineInvoker(engine.clone())));

    ledger.register_principal(oracle_principal);
    let genesis = kernel_genesis::install(
        &engine,
        store.clone() as Arc<dyn ArtifactStore>,
        ledger.clone() as Arc<dyn Ledger>,
        events.clone() as Arc<dyn EventLog>,
        oracle_principal,
    )?;
    store.set_default_contract(genesis.contract_freeware);

    Ok(Kernel { events, ledger, store, engine, genesis })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_installs_genesis_and_wires_freeware_as_default() {
        let config = KernelConfig::for_tests();
        let oracle = ArtifactId::now_v7();
        let kernel = build(&config, oracle).unwrap();

        let anyone = ArtifactId::now_v7();
        let handbook = kernel.store.read(kernel.genesis.handbook, anyone, &serde_json::json!({})).unwrap();
        assert!(handbook.get("genesis_ledger").is_some());
    }

    #[test]
    fn the_oracle_principal_can_mint_through_the_genesis_ledger() {
        let config = KernelConfig::for_tests();
        let oracle = ArtifactId::now_v7();
        let kernel = build(&config, oracle).unwrap();

        let result = block_on(kernel.engine.invoke(
            oracle,
            kernel.genesis.ledger,
            "mint",
            serde_json::json!({ "to": oracle.to_string(), "amount": 50 }),
        ));
        result.unwrap();
        assert_eq!(kernel.ledger.scrip_balance(oracle), 50);
    }

    /// A tiny single-threaded block_on so this module's tests don't need
    /// `#[tokio::test]` just for one invocation each.
    fn block_on<F: std::future::Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread().enable_all().build().expect("runtime").block_on(fut)
    }
}
