//! `genesis_store` - artifact creation and discovery facade. Wraps the
//! parts of [`ArtifactStore`] an agent cannot reach directly: creating new
//! artifacts (every `create` needs a `creator_id`, which only the engine's
//! caller binding can supply) and listing/searching metadata.

use crate::util::{invalid_args, required_str};
use async_trait::async_trait;
use kernel_core::{ArtifactCode, ArtifactId, ArtifactSpec, Interface, KernelResult};
use kernel_engine::{Capability, InvocationHandler};
use kernel_store::{ArtifactFilter, ArtifactStore};
use serde_json::Value;
use std::sync::Arc;

pub struct GenesisStore {
    store: Arc<dyn ArtifactStore>,
}

impl GenesisStore {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }
}

fn parse_spec(requester_id: ArtifactId, args: &Value, me: ArtifactId, method: &str) -> KernelResult<ArtifactSpec> {
    let content = args.get("content").cloned().unwrap_or(serde_json::json!({}));
    let program = args.get("program").and_then(|v| v.as_str());
    let code = program.map(|p| ArtifactCode { program: p.to_string(), params: args.get("params").cloned().unwrap_or(serde_json::json!({})) });
    let has_executable = code.is_some();
    let has_standing = args.get("has_standing").and_then(|v| v.as_bool()).unwrap_or(false);
    let access_contract_id = match args.get("access_contract_id") {
        None | Some(Value::Null) => None,
        Some(v) => {
            let raw = v.as_str().ok_or_else(|| invalid_args(me, method, "access_contract_id must be a string"))?;
            Some(raw.parse().map_err(|_| invalid_args(me, method, "access_contract_id is not a valid artifact id"))?)
        }
    };
    let owner_id = match args.get("owner_id") {
        None | Some(Value::Null) => requester_id,
        Some(v) => {
            let raw = v.as_str().ok_or_else(|| invalid_args(me, method, "owner_id must be a string"))?;
            raw.parse().map_err(|_| invalid_args(me, method, "owner_id is not a valid artifact id"))?
        }
    };
    Ok(ArtifactSpec {
        content,
        code,
        interface: if has_executable { Some(Interface::default()) } else { None },
        access_contract_id,
        has_standing,
        has_executable,
        owner_id,
    })
}

#[async_trait]
impl InvocationHandler for GenesisStore {
    async fn call(&self, cap: &Capability, requester_id: ArtifactId, method: &str, args: Value) -> KernelResult<Value> {
        let me = cap.caller_id();
        match method {
            "create" => {
                let spec = parse_spec(requester_id, &args, me, method)?;
                let id = self.store.create(requester_id, spec)?;
                Ok(serde_json::json!({ "artifact_id": id.to_string() }))
            }
            "metadata" => {
                let id: ArtifactId = required_str(&args, "artifact_id", me, method)?
                    .parse()
                    .map_err(|_| invalid_args(me, method, "artifact_id is not a valid artifact id"))?;
                let m = self.store.metadata(id)?;
                Ok(serde_json::json!({
                    "id": m.id.to_string(),
                    "kind": format!("{:?}", m.kind),
                    "has_standing": m.has_standing,
                    "has_executable": m.has_executable,
                    "access_contract_id": m.access_contract_id.map(|c| c.to_string()),
                    "created_by": m.created_by.to_string(),
                    "owner_id": m.owner_id.to_string(),
                }))
            }
            "list_by_owner" => {
                let owner_id = match args.get("owner_id").and_then(|v| v.as_str()) {
                    Some(raw) => raw.parse().map_err(|_| invalid_args(me, method, "owner_id is not a valid artifact id"))?,
                    None => requester_id,
                };
                let results = self.store.list_by(ArtifactFilter { owner_id: Some(owner_id), ..Default::default() });
                Ok(serde_json::json!({ "artifacts": results.iter().map(|m| m.id.to_string()).collect::<Vec<_>>() }))
            }
            "search" => {
                let query = required_str(&args, "query", me, method)?;
                let results = self.store.search(query);
                Ok(serde_json::json!({ "artifacts": results.iter().map(|m| m.id.to_string()).collect::<Vec<_>>() }))
            }
            other => Err(invalid_args(me, other, "unknown genesis_store method")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_core::KernelConfig;
    use kernel_engine::ExecutionEngine;
    use kernel_events::InMemoryEventLog;
    use kernel_ledger::InMemoryLedger;
    use kernel_store::InMemoryArtifactStore;

    fn engine_with_store_facade() -> (Arc<ExecutionEngine>, Arc<InMemoryArtifactStore>, ArtifactId) {
        let log: Arc<dyn kernel_events::EventLog> = Arc::new(InMemoryEventLog::new());
        let ledger: Arc<dyn kernel_ledger::Ledger> = Arc::new(InMemoryLedger::new(log.clone(), KernelConfig::for_tests()));
        let concrete = Arc::new(InMemoryArtifactStore::new(
            Arc::new(kernel_core::AlwaysAllow),
            ledger.clone(),
            log.clone(),
            KernelConfig::for_tests(),
        ));
        let store: Arc<dyn ArtifactStore> = concrete.clone();
        concrete.set_default_contract(ArtifactId::nil());
        let facade_id = store.create(
            ArtifactId::nil(),
            ArtifactSpec {
                content: serde_json::json!({}),
                code: Some(ArtifactCode { program: "genesis.store".into(), params: serde_json::json!({}) }),
                interface: Some(Interface::default()),
                access_contract_id: None,
                has_standing: false,
                has_executable: true,
                owner_id: ArtifactId::nil(),
            },
        ).unwrap();
        let engine = Arc::new(ExecutionEngine::new(
            store.clone(),
            ledger,
            log,
            Arc::new(kernel_core::AlwaysAllow),
            KernelConfig::for_tests(),
        ));
        engine.register_handler("genesis.store", Arc::new(GenesisStore::new(store)));
        (engine, concrete, facade_id)
    }

    /// Creates a principal artifact with standing so it can call `create`.
    fn new_principal(store: &Arc<InMemoryArtifactStore>) -> ArtifactId {
        store
            .create(
                ArtifactId::nil(),
                ArtifactSpec {
                    content: serde_json::json!({}),
                    code: None,
                    interface: None,
                    access_contract_id: None,
                    has_standing: true,
                    has_executable: false,
                    owner_id: ArtifactId::nil(),
                },
            )
            .unwrap()
    }

    #[tokio::test]
    async fn create_sets_the_requester_as_default_owner() {
        let (engine, store, facade_id) = engine_with_store_facade();
        let alice = new_principal(&store);

        let result = engine
            .invoke(alice, facade_id, "create", serde_json::json!({ "content": {"note": "hello"} }))
            .await
            .unwrap();
        let id: ArtifactId = result["artifact_id"].as_str().unwrap().parse().unwrap();

        let meta = engine
            .invoke(alice, facade_id, "metadata", serde_json::json!({ "artifact_id": id.to_string() }))
            .await
            .unwrap();
        assert_eq!(meta["owner_id"], alice.to_string());
    }

    #[tokio::test]
    async fn list_by_owner_defaults_to_the_requester() {
        let (engine, store, facade_id) = engine_with_store_facade();
        let alice = new_principal(&store);
        engine.invoke(alice, facade_id, "create", serde_json::json!({})).await.unwrap();

        let result = engine.invoke(alice, facade_id, "list_by_owner", serde_json::json!({})).await.unwrap();
        assert_eq!(result["artifacts"].as_array().unwrap().len(), 1);
    }
}
