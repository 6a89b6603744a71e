//! Pre-wired stacks for cross-crate integration tests.
//!
//! Every fixture here uses [`kernel_core::AlwaysAllow`] as the store's
//! permission checker, matching the precedent set by every individual
//! crate's own unit tests (`kernel-engine`, `kernel-supervisor`,
//! `kernel-checkpoint`): wiring the real [`kernel_contracts::ContractEvaluator`]
//! in requires a construction order the evaluator and the store can't
//! currently express between themselves (the evaluator needs a built
//! store, the store needs a built checker) and is left to the composition
//! root that owns that problem directly.

use kernel_core::{ArtifactId, ArtifactSpec, KernelConfig};
use kernel_events::InMemoryEventLog;
use kernel_genesis::GenesisIds;
use kernel_ledger::{InMemoryLedger, Ledger};
use kernel_store::{ArtifactStore, InMemoryArtifactStore};
use std::sync::Arc;

/// A fresh, unpopulated store/ledger/event-log triple sharing one
/// `KernelConfig`. The store's default contract is left unset — callers
/// that need attach-default semantics must call `set_default_contract`
/// themselves, typically after installing a root contract.
pub struct BareKernel {
    pub config: KernelConfig,
    pub events: Arc<InMemoryEventLog>,
    pub ledger: Arc<InMemoryLedger>,
    pub store: Arc<InMemoryArtifactStore>,
}

pub fn bare_kernel() -> BareKernel {
    bare_kernel_with_config(KernelConfig::for_tests())
}

pub fn bare_kernel_with_config(config: KernelConfig) -> BareKernel {
    let events = Arc::new(InMemoryEventLog::new());
    let ledger = Arc::new(InMemoryLedger::new(events.clone(), config.clone()));
    let store = Arc::new(InMemoryArtifactStore::new(
        Arc::new(kernel_core::AlwaysAllow),
        ledger.clone(),
        events.clone(),
        config.clone(),
    ));
    BareKernel { config, events, ledger, store }
}

/// A full stack with genesis installed: the three contract templates, the
/// four facades registered on the engine, and the store's default contract
/// set to `contract.freeware` — the shape every agent-loop and checkpoint
/// integration test actually wants, rather than an empty store nobody
/// could act against.
pub struct GenesisKernel {
    pub config: KernelConfig,
    pub events: Arc<InMemoryEventLog>,
    pub ledger: Arc<InMemoryLedger>,
    pub store: Arc<InMemoryArtifactStore>,
    pub engine: Arc<kernel_engine::ExecutionEngine>,
    pub genesis: GenesisIds,
    pub oracle: ArtifactId,
}

pub fn genesis_kernel() -> GenesisKernel {
    let BareKernel { config, events, ledger, store } = bare_kernel();
    let oracle = ArtifactId::now_v7();
    ledger.register_principal(oracle);

    let engine = Arc::new(kernel_engine::ExecutionEngine::new(
        store.clone() as Arc<dyn ArtifactStore>,
        ledger.clone() as Arc<dyn kernel_ledger::Ledger>,
        events.clone() as Arc<dyn kernel_events::EventLog>,
        Arc::new(kernel_core::AlwaysAllow),
        config.clone(),
    ));

    let genesis = kernel_genesis::install(
        &engine,
        store.clone() as Arc<dyn ArtifactStore>,
        ledger.clone() as Arc<dyn kernel_ledger::Ledger>,
        events.clone() as Arc<dyn kernel_events::EventLog>,
        oracle,
    )
    .expect("genesis install must succeed against a fresh store");
    store.set_default_contract(genesis.contract_freeware);

    GenesisKernel { config, events, ledger, store, engine, genesis, oracle }
}

/// Registers `principal` with the ledger and creates a standing artifact
/// (an "account" in `ArtifactKind` terms) for it, attached to the freeware
/// contract. Most fixtures that need a funded actor start here.
pub fn new_account(kernel: &GenesisKernel) -> ArtifactId {
    let principal = ArtifactId::now_v7();
    kernel.ledger.register_principal(principal);
    kernel
        .store
        .create(
            ArtifactId::nil(),
            ArtifactSpec {
                content: serde_json::json!({}),
                code: None,
                interface: None,
                access_contract_id: Some(kernel.genesis.contract_freeware),
                has_standing: true,
                has_executable: false,
                owner_id: principal,
            },
        )
        .expect("creating a standing artifact against a fresh genesis kernel must succeed")
}

/// A data artifact owned by `owner`, attached to the freeware contract.
pub fn data_artifact(kernel: &GenesisKernel, owner: ArtifactId, content: serde_json::Value) -> ArtifactId {
    kernel
        .store
        .create(
            owner,
            ArtifactSpec {
                content,
                code: None,
                interface: None,
                access_contract_id: Some(kernel.genesis.contract_freeware),
                has_standing: false,
                has_executable: false,
                owner_id: owner,
            },
        )
        .expect("creating a data artifact against a fresh genesis kernel must succeed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_kernel_wires_a_usable_freeware_default_contract() {
        let kernel = genesis_kernel();
        let owner = new_account(&kernel);
        let artifact = data_artifact(&kernel, owner, serde_json::json!({"seen": true}));
        let anyone = ArtifactId::now_v7();
        assert_eq!(
            kernel.store.read(artifact, anyone, &serde_json::json!({})).unwrap(),
            serde_json::json!({"seen": true})
        );
    }

    #[test]
    fn new_account_is_registered_with_the_ledger() {
        let kernel = genesis_kernel();
        let owner = new_account(&kernel);
        assert_eq!(kernel.ledger.scrip_balance(owner), 0);
    }
}
