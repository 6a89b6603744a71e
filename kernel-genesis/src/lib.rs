//! Genesis artifacts: bootstrap-installed, kernel-implemented facades over
//! the store, ledger and escrow trade path. Agents could in principle build
//! equivalents; these exist only to seed the economy at T=0. Each is an
//! ordinary artifact — it has an id, content, a contract, and is invoked
//! like anything else — whose `code.program` happens to resolve to Rust
//! here instead of to an agent-authored predicate.

mod escrow;
mod event_log;
mod ledger;
mod store;
mod util;

pub use escrow::GenesisEscrow;
pub use event_log::GenesisEventLog;
pub use ledger::GenesisLedger;
pub use store::GenesisStore;

use kernel_core::{ArtifactCode, ArtifactId, ArtifactSpec, Interface, KernelResult};
use kernel_engine::ExecutionEngine;
use kernel_events::EventLog as EventLogTrait;
use kernel_ledger::Ledger;
use kernel_store::ArtifactStore;
use std::sync::Arc;

pub const PROGRAM_CONTRACT_FREEWARE: &str = "contract.freeware";
pub const PROGRAM_CONTRACT_SELF_OWNED: &str = "contract.self_owned";
pub const PROGRAM_CONTRACT_PRIVATE: &str = "contract.private";
pub const PROGRAM_GENESIS_LEDGER: &str = "genesis.ledger";
pub const PROGRAM_GENESIS_STORE: &str = "genesis.store";
pub const PROGRAM_GENESIS_ESCROW: &str = "genesis.escrow";
pub const PROGRAM_GENESIS_EVENT_LOG: &str = "genesis.event_log";

/// IDs of every artifact [`install`] creates, handed back so the caller (the
/// CLI's composition root) can attach `contract_freeware` as the store's
/// default contract and print a bootstrap summary.
#[derive(Debug, Clone, Copy)]
pub struct GenesisIds {
    pub contract_freeware: ArtifactId,
    pub contract_self_owned: ArtifactId,
    pub contract_private: ArtifactId,
    pub ledger: ArtifactId,
    pub store: ArtifactId,
    pub escrow: ArtifactId,
    pub event_log: ArtifactId,
    pub handbook: ArtifactId,
}

fn data_spec(owner: ArtifactId, access_contract_id: Option<ArtifactId>, content: serde_json::Value) -> ArtifactSpec {
    ArtifactSpec {
        content,
        code: None,
        interface: None,
        access_contract_id,
        has_standing: false,
        has_executable: false,
        owner_id: owner,
    }
}

fn facade_spec(owner: ArtifactId, access_contract_id: Option<ArtifactId>, program: &str) -> ArtifactSpec {
    ArtifactSpec {
        content: serde_json::json!({}),
        code: Some(ArtifactCode { program: program.into(), params: serde_json::json!({}) }),
        interface: Some(Interface::default()),
        access_contract_id,
        has_standing: false,
        has_executable: true,
        owner_id: owner,
    }
}

/// Creates the three contract templates and five facades, registers the
/// facades' handlers on `engine`, and returns their ids. The three contract
/// templates need no handler: [`kernel_contracts::ContractProgram`]
/// evaluates them directly by name without ever dispatching through the
/// engine.
pub fn install(
    engine: &Arc<ExecutionEngine>,
    artifact_store: Arc<dyn ArtifactStore>,
    ledger_state: Arc<dyn Ledger>,
    events: Arc<dyn EventLogTrait>,
    oracle_principal: ArtifactId,
) -> KernelResult<GenesisIds> {
    let nil = ArtifactId::nil();

    // The very first artifacts can't resolve a default contract (none
    // exists yet), so they explicitly attach to the root sentinel.
    let contract_freeware =
        artifact_store.create(nil, data_spec(nil, Some(nil), serde_json::json!({ "doc": "anyone reads/invokes; creator writes/deletes" })))?;
    let contract_self_owned =
        artifact_store.create(nil, data_spec(nil, Some(nil), serde_json::json!({ "doc": "only the gated artifact itself passes" })))?;
    let contract_private =
        artifact_store.create(nil, data_spec(nil, Some(nil), serde_json::json!({ "doc": "creator-only, every action" })))?;

    // Everything after this point attaches to freeware: anyone may read or
    // invoke a facade, only the kernel (as `nil`, this bootstrap's own
    // creator id) could rewrite or delete it outright.
    let gate = Some(contract_freeware);

    let ledger_id = artifact_store.create(nil, facade_spec(nil, gate, PROGRAM_GENESIS_LEDGER))?;
    engine.register_handler(
        PROGRAM_GENESIS_LEDGER,
        Arc::new(GenesisLedger::new(ledger_state.clone(), artifact_store.clone(), oracle_principal)),
    );

    let store_id = artifact_store.create(nil, facade_spec(nil, gate, PROGRAM_GENESIS_STORE))?;
    engine.register_handler(PROGRAM_GENESIS_STORE, Arc::new(GenesisStore::new(artifact_store.clone())));

    let escrow_id = artifact_store.create(nil, facade_spec(nil, gate, PROGRAM_GENESIS_ESCROW))?;
    let escrow_facade = Arc::new(GenesisEscrow::new(artifact_store.clone(), ledger_state.clone(), escrow_id));
    engine.register_handler(PROGRAM_GENESIS_ESCROW, escrow_facade);

    let event_log_id = artifact_store.create(nil, facade_spec(nil, gate, PROGRAM_GENESIS_EVENT_LOG))?;
    engine.register_handler(PROGRAM_GENESIS_EVENT_LOG, Arc::new(GenesisEventLog::new(events.clone())));

    let handbook_id = artifact_store.create(nil, data_spec(nil, gate, handbook_content()))?;

    Ok(GenesisIds {
        contract_freeware,
        contract_self_owned,
        contract_private,
        ledger: ledger_id,
        store: store_id,
        escrow: escrow_id,
        event_log: event_log_id,
        handbook: handbook_id,
    })
}

/// Plain-data documentation of the other genesis artifacts' interfaces, at
/// zero invocation cost (it's `has_executable=false`, so reading it is a
/// `read` against a freeware contract, not an `invoke`).
fn handbook_content() -> serde_json::Value {
    serde_json::json!({
        "genesis_ledger": {
            "program": PROGRAM_GENESIS_LEDGER,
            "methods": ["balance", "transfer", "spawn_principal", "transfer_ownership", "mint", "burn"],
            "note": "mint/burn succeed only for the configured oracle principal",
        },
        "genesis_store": {
            "program": PROGRAM_GENESIS_STORE,
            "methods": ["create", "metadata", "list_by_owner", "search"],
        },
        "genesis_escrow": {
            "program": PROGRAM_GENESIS_ESCROW,
            "methods": ["list_for_sale", "buy", "cancel"],
        },
        "genesis_event_log": {
            "program": PROGRAM_GENESIS_EVENT_LOG,
            "methods": ["read"],
        },
        "contracts": {
            "contract.freeware": "anyone reads/invokes; only the creator writes/deletes",
            "contract.self_owned": "only the gated artifact itself passes",
            "contract.private": "creator-only, every action",
        },
    })
}
