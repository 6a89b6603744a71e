//! `genesis_ledger` - scrip and resource facade.

use crate::util::{invalid_args, required_artifact_id, required_str, required_u64, resource_kind};
use async_trait::async_trait;
use kernel_core::{ArtifactId, ArtifactSpec, ContractError, KernelResult};
use kernel_engine::{Capability, InvocationHandler};
use kernel_ledger::Ledger;
use kernel_store::ArtifactStore;
use serde_json::Value;
use std::sync::Arc;

/// Thin wrapper over [`Ledger`] and the ownership half of [`ArtifactStore`].
/// `mint` and `burn` are gated to `oracle_principal` by this facade's own
/// logic, not by the contract layer (Open Question 3).
pub struct GenesisLedger {
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn ArtifactStore>,
    oracle_principal: ArtifactId,
}

impl GenesisLedger {
    pub fn new(ledger: Arc<dyn Ledger>, store: Arc<dyn ArtifactStore>, oracle_principal: ArtifactId) -> Self {
        Self { ledger, store, oracle_principal }
    }

    fn require_oracle(&self, requester_id: ArtifactId, method: &str) -> KernelResult<()> {
        if requester_id == self.oracle_principal {
            Ok(())
        } else {
            Err(ContractError::Denied { reason: format!("{method} is reserved for the mint oracle") }.into())
        }
    }
}

#[async_trait]
impl InvocationHandler for GenesisLedger {
    async fn call(&self, cap: &Capability, requester_id: ArtifactId, method: &str, args: Value) -> KernelResult<Value> {
        let me = cap.caller_id();
        match method {
            "balance" => {
                let principal = match args.get("principal").and_then(|v| v.as_str()) {
                    Some(raw) => raw.parse().map_err(|_| invalid_args(me, method, "principal is not a valid artifact id"))?,
                    None => requester_id,
                };
                match args.get("resource").and_then(|v| v.as_str()) {
                    None => Ok(serde_json::json!({ "scrip": self.ledger.scrip_balance(principal) })),
                    Some(name) => {
                        let kind = resource_kind(name, me, method)?;
                        Ok(serde_json::json!({ "resource": name, "balance": self.ledger.resource_balance(principal, kind) }))
                    }
                }
            }
            "transfer" => {
                let to = required_artifact_id(&args, "to", me, method)?;
                let amount = required_u64(&args, "amount", me, method)?;
                self.ledger.transfer(requester_id, to, amount)?;
                Ok(serde_json::json!({ "from": requester_id.to_string(), "to": to.to_string(), "amount": amount }))
            }
            "spawn_principal" => {
                let id = self.store.create(
                    requester_id,
                    ArtifactSpec {
                        content: serde_json::json!({}),
                        code: None,
                        interface: None,
                        access_contract_id: None,
                        has_standing: true,
                        has_executable: false,
                        owner_id: requester_id,
                    },
                )?;
                self.ledger.register_principal(id);
                Ok(serde_json::json!({ "principal_id": id.to_string() }))
            }
            "transfer_ownership" => {
                let artifact_id = required_artifact_id(&args, "artifact_id", me, method)?;
                let new_owner = required_artifact_id(&args, "new_owner", me, method)?;
                let metadata = self.store.metadata(artifact_id)?;
                if metadata.owner_id != requester_id {
                    return Err(ContractError::Denied { reason: "only the current owner may transfer ownership".into() }.into());
                }
                self.store.set_owner(artifact_id, new_owner)?;
                Ok(serde_json::json!({ "artifact_id": artifact_id.to_string(), "new_owner": new_owner.to_string() }))
            }
            "mint" => {
                self.require_oracle(requester_id, method)?;
                let to = required_artifact_id(&args, "to", me, method)?;
                let amount = required_u64(&args, "amount", me, method)?;
                let reason = required_str(&args, "reason", me, method).unwrap_or("oracle mint");
                self.ledger.mint(to, amount, reason)?;
                Ok(serde_json::json!({ "to": to.to_string(), "amount": amount }))
            }
            "burn" => {
                self.require_oracle(requester_id, method)?;
                let from = required_artifact_id(&args, "from", me, method)?;
                let amount = required_u64(&args, "amount", me, method)?;
                let reason = required_str(&args, "reason", me, method).unwrap_or("oracle burn");
                self.ledger.burn(from, amount, reason)?;
                Ok(serde_json::json!({ "from": from.to_string(), "amount": amount }))
            }
            other => Err(invalid_args(me, other, "unknown genesis_ledger method")),
        }
    }
}
