//! Bounded evaluation of contract artifacts against the five primitive
//! actions, with a TTL cache and an independent permission-depth guard.

use crate::program::ContractProgram;
use kernel_core::{
    ActionKind, Artifact, ArtifactId, ContractError, Invoker, KernelConfig, KernelResult,
    PermissionChecker, PermissionDecision,
};
use kernel_store::ArtifactStore;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

const PERMISSION_DEPTH_CONTEXT_KEY: &str = "_permission_depth";

#[derive(Clone)]
struct CacheEntry {
    decision: PermissionDecision,
    inserted_at: Instant,
}

/// Computes `(artifact_id, action, requester_id, artifact_content,
/// context) -> {allowed, reason}` for the artifact's current access
/// contract. Caches by `(contract_id, artifact_id, action, requester_id)`
/// for contracts that resolve to a cacheable built-in template; the cache
/// is invalidated on any write to the gated artifact or its contract.
pub struct ContractEvaluator {
    store: Arc<dyn ArtifactStore>,
    invoker: RwLock<Option<Arc<dyn Invoker>>>,
    cache: RwLock<HashMap<(ArtifactId, ArtifactId, ActionKind, ArtifactId), CacheEntry>>,
    ttl: Duration,
    max_permission_depth: u32,
}

impl ContractEvaluator {
    pub fn new(store: Arc<dyn ArtifactStore>, config: &KernelConfig) -> Self {
        Self {
            store,
            invoker: RwLock::new(None),
            cache: RwLock::new(HashMap::new()),
            ttl: config.contract_cache_ttl,
            max_permission_depth: config.max_permission_depth,
        }
    }

    /// Wires in the execution engine's invoke path, used only for
    /// `CustomPredicate` contracts. Set once, after both the evaluator and
    /// the engine exist, breaking the construction cycle between them.
    pub fn set_invoker(&self, invoker: Arc<dyn Invoker>) {
        *self.invoker.write().expect("lock poisoned") = Some(invoker);
    }

    fn cached(&self, key: &(ArtifactId, ArtifactId, ActionKind, ArtifactId)) -> Option<PermissionDecision> {
        let cache = self.cache.read().expect("lock poisoned");
        cache.get(key).and_then(|entry| {
            if entry.inserted_at.elapsed() < self.ttl {
                Some(entry.decision.clone())
            } else {
                None
            }
        })
    }

    fn insert_cache(&self, key: (ArtifactId, ArtifactId, ActionKind, ArtifactId), decision: PermissionDecision) {
        self.cache.write().expect("lock poisoned").insert(
            key,
            CacheEntry {
                decision,
                inserted_at: Instant::now(),
            },
        );
    }

    fn current_depth(context: &serde_json::Value) -> u32 {
        context
            .get(PERMISSION_DEPTH_CONTEXT_KEY)
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32
    }
}

impl PermissionChecker for ContractEvaluator {
    /// Drops every cache entry touching `artifact_id`, as either the gated
    /// artifact or the contract itself.
    fn invalidate(&self, artifact_id: ArtifactId) {
        self.cache
            .write()
            .expect("lock poisoned")
            .retain(|(contract_id, gated_id, _, _), _| *contract_id != artifact_id && *gated_id != artifact_id);
    }

    fn check(
        &self,
        artifact: &Artifact,
        action: ActionKind,
        requester_id: ArtifactId,
        context: &serde_json::Value,
    ) -> KernelResult<PermissionDecision> {
        let depth = Self::current_depth(context);
        if depth > self.max_permission_depth {
            return Err(ContractError::PermissionDepthExceeded(artifact.id).into());
        }

        let contract_id = match artifact.access_contract_id {
            None => return Ok(PermissionDecision::allow("root contract")),
            Some(id) if id == ArtifactId::nil() => return Ok(PermissionDecision::allow("root contract")),
            Some(id) => id,
        };

        let key = (contract_id, artifact.id, action, requester_id);
        if let Some(decision) = self.cached(&key) {
            return Ok(decision);
        }

        let contract = self
            .store
            .get_raw(contract_id)
            .map_err(|_| ContractError::ContractMissing(contract_id))?;

        let program_name = contract
            .code
            .as_ref()
            .map(|c| c.program.as_str())
            .ok_or(ContractError::ContractMissing(contract_id))?;
        let program = ContractProgram::from_program_name(program_name);

        let decision = match program.evaluate_builtin(artifact, action, requester_id) {
            Some(decision) => {
                self.insert_cache(key, decision.clone());
                decision
            }
            None => {
                let ContractProgram::CustomPredicate(name) = &program else {
                    unreachable!("evaluate_builtin returns None only for CustomPredicate")
                };
                let invoker = self.invoker.read().expect("lock poisoned").clone();
                match invoker {
                    None => PermissionDecision::deny(format!("custom predicate {name} has no registered invoker")),
                    Some(invoker) => {
                        let args = serde_json::json!({
                            "artifact_id": artifact.id.to_string(),
                            "action": action.to_string(),
                            "requester_id": requester_id.to_string(),
                            "artifact_content": artifact.content,
                            "context": context,
                        });
                        let result = invoker.invoke(contract_id, "check_permission", args, requester_id, depth + 1)?;
                        let allowed = result.get("allowed").and_then(|v| v.as_bool()).unwrap_or(false);
                        let reason = result
                            .get("reason")
                            .and_then(|v| v.as_str())
                            .unwrap_or("custom predicate result")
                            .to_string();
                        PermissionDecision { allowed, reason }
                        // Not cached: custom predicates may consult context
                        // (sub-invocations, external state) that a
                        // TTL-keyed tuple cannot safely represent.
                    }
                }
            }
        };

        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kernel_core::{ArtifactSpec, KernelError};
    use kernel_events::InMemoryEventLog;
    use kernel_ledger::InMemoryLedger;
    use kernel_store::InMemoryArtifactStore;

    fn artifact(created_by: ArtifactId, access_contract_id: Option<ArtifactId>) -> Artifact {
        Artifact {
            id: ArtifactId::now_v7(),
            content: serde_json::json!(null),
            code: None,
            interface: None,
            access_contract_id,
            has_standing: false,
            has_executable: false,
            created_by,
            created_at: Utc::now(),
            owner_id: created_by,
        }
    }

    fn store_with_freeware_contract() -> (Arc<InMemoryArtifactStore>, ArtifactId) {
        let log: Arc<dyn kernel_events::EventLog> = Arc::new(InMemoryEventLog::new());
        let ledger = Arc::new(InMemoryLedger::new(log.clone(), KernelConfig::for_tests()));
        let store = Arc::new(InMemoryArtifactStore::new(
            Arc::new(kernel_core::AlwaysAllow),
            ledger,
            log,
            KernelConfig::for_tests(),
        ));
        store.set_default_contract(ArtifactId::nil());
        let contract_id = store
            .create(
                ArtifactId::nil(),
                ArtifactSpec {
                    content: serde_json::json!({}),
                    code: Some(kernel_core::ArtifactCode {
                        program: "contract.freeware".into(),
                        params: serde_json::json!({}),
                    }),
                    interface: Some(kernel_core::Interface::default()),
                    access_contract_id: None,
                    has_standing: false,
                    has_executable: true,
                    owner_id: ArtifactId::nil(),
                },
            )
            .unwrap();
        (store, contract_id)
    }

    #[test]
    fn freeware_contract_grants_read_to_anyone() {
        let (store, contract_id) = store_with_freeware_contract();
        let evaluator = ContractEvaluator::new(store, &KernelConfig::for_tests());
        let creator = ArtifactId::now_v7();
        let target = artifact(creator, Some(contract_id));
        let decision = evaluator.check(&target, ActionKind::Read, ArtifactId::now_v7(), &serde_json::json!({})).unwrap();
        assert!(decision.allowed);
    }

    #[test]
    fn dangling_contract_reference_fails_closed() {
        let (store, _contract_id) = store_with_freeware_contract();
        let evaluator = ContractEvaluator::new(store, &KernelConfig::for_tests());
        let creator = ArtifactId::now_v7();
        let target = artifact(creator, Some(ArtifactId::now_v7()));
        let err = evaluator.check(&target, ActionKind::Read, creator, &serde_json::json!({})).unwrap_err();
        assert_eq!(err.kind(), kernel_core::ErrorKind::ContractMissing);
    }

    #[test]
    fn permission_depth_exceeded_is_reported() {
        let (store, contract_id) = store_with_freeware_contract();
        let evaluator = ContractEvaluator::new(store, &KernelConfig::for_tests());
        let creator = ArtifactId::now_v7();
        let target = artifact(creator, Some(contract_id));
        let deep_context = serde_json::json!({ "_permission_depth": KernelConfig::for_tests().max_permission_depth + 1 });
        let err = evaluator.check(&target, ActionKind::Read, creator, &deep_context).unwrap_err();
        assert!(matches!(err, KernelError::Contract(ContractError::PermissionDepthExceeded(_))));
    }

    #[test]
    fn decision_is_cached_across_calls() {
        let (store, contract_id) = store_with_freeware_contract();
        let evaluator = ContractEvaluator::new(store, &KernelConfig::for_tests());
        let creator = ArtifactId::now_v7();
        let requester = ArtifactId::now_v7();
        let target = artifact(creator, Some(contract_id));
        evaluator.check(&target, ActionKind::Read, requester, &serde_json::json!({})).unwrap();
        let key = (contract_id, target.id, ActionKind::Read, requester);
        assert!(evaluator.cached(&key).is_some());
        evaluator.invalidate(target.id);
        assert!(evaluator.cached(&key).is_none());
    }
}
