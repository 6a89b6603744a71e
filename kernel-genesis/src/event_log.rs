//! `genesis_event_log` - read-only window onto [`EventLog`]. There is no
//! write method: every mutation to the log happens as a side effect of some
//! other action, never as a direct call through this facade.

use crate::util::invalid_args;
use async_trait::async_trait;
use kernel_core::{ArtifactId, EventKind, EventSeq, KernelResult};
use kernel_engine::{Capability, InvocationHandler};
use kernel_events::{EventLog, EventLogExt};
use serde_json::Value;
use std::sync::Arc;

pub struct GenesisEventLog {
    events: Arc<dyn EventLog>,
}

impl GenesisEventLog {
    pub fn new(events: Arc<dyn EventLog>) -> Self {
        Self { events }
    }
}

fn parse_kind(name: &str, me: ArtifactId, method: &str) -> KernelResult<EventKind> {
    match name {
        "artifact_created" => Ok(EventKind::ArtifactCreated),
        "artifact_modified" => Ok(EventKind::ArtifactModified),
        "artifact_deleted" => Ok(EventKind::ArtifactDeleted),
        "transfer" => Ok(EventKind::Transfer),
        "invocation_started" => Ok(EventKind::InvocationStarted),
        "invocation_completed" => Ok(EventKind::InvocationCompleted),
        "invocation_rejected" => Ok(EventKind::InvocationRejected),
        "checkpoint" => Ok(EventKind::Checkpoint),
        "mint" => Ok(EventKind::Mint),
        "burn" => Ok(EventKind::Burn),
        "agent_quarantined" => Ok(EventKind::AgentQuarantined),
        other => Err(invalid_args(me, method, format!("unknown event kind {other:?}"))),
    }
}

#[async_trait]
impl InvocationHandler for GenesisEventLog {
    async fn call(&self, cap: &Capability, requester_id: ArtifactId, method: &str, args: Value) -> KernelResult<Value> {
        let me = cap.caller_id();
        match method {
            "read" => {
                let limit = args.get("limit").and_then(|v| v.as_u64()).unwrap_or(50).min(500) as usize;
                let from = args
                    .get("from_seq")
                    .and_then(|v| v.as_u64())
                    .map(EventSeq)
                    .unwrap_or_else(EventSeq::first);
                let events = match args.get("kind").and_then(|v| v.as_str()) {
                    Some(name) => {
                        let kind = parse_kind(name, me, method)?;
                        self.events.find_by_kind(kind, limit)
                    }
                    None => match args.get("principal_id").and_then(|v| v.as_str()) {
                        Some(raw) => {
                            let principal: ArtifactId = raw
                                .parse()
                                .map_err(|_| invalid_args(me, method, "principal_id is not a valid artifact id"))?;
                            self.events.find_by_principal(principal, limit)
                        }
                        None => self.events.read_range(from, self.events.next_seq(), limit),
                    },
                };
                let _ = requester_id;
                Ok(serde_json::json!({
                    "events": events.iter().map(|e| serde_json::json!({
                        "seq": e.seq.0,
                        "timestamp": e.timestamp.to_rfc3339(),
                        "kind": e.kind.to_string(),
                        "principal_id": e.principal_id.to_string(),
                        "payload": e.payload,
                    })).collect::<Vec<_>>()
                }))
            }
            other => Err(invalid_args(me, other, "unknown genesis_event_log method")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_core::{ArtifactCode, ArtifactSpec, Interface, KernelConfig};
    use kernel_engine::ExecutionEngine;
    use kernel_events::InMemoryEventLog;
    use kernel_ledger::InMemoryLedger;
    use kernel_store::{ArtifactStore, InMemoryArtifactStore};

    #[tokio::test]
    async fn read_defaults_to_the_full_log_in_order() {
        let log: Arc<dyn EventLog> = Arc::new(InMemoryEventLog::new());
        let ledger: Arc<dyn kernel_ledger::Ledger> = Arc::new(InMemoryLedger::new(log.clone(), KernelConfig::for_tests()));
        let concrete = Arc::new(InMemoryArtifactStore::new(
            Arc::new(kernel_core::AlwaysAllow),
            ledger.clone(),
            log.clone(),
            KernelConfig::for_tests(),
        ));
        let store: Arc<dyn ArtifactStore> = concrete.clone();
        concrete.set_default_contract(ArtifactId::nil());
        let facade_id = store
            .create(
                ArtifactId::nil(),
                ArtifactSpec {
                    content: serde_json::json!({}),
                    code: Some(ArtifactCode { program: "genesis.event_log".into(), params: serde_json::json!({}) }),
                    interface: Some(Interface::default()),
                    access_contract_id: None,
                    has_standing: false,
                    has_executable: true,
                    owner_id: ArtifactId::nil(),
                },
            )
            .unwrap();

        let engine = Arc::new(ExecutionEngine::new(
            store,
            ledger,
            log.clone(),
            Arc::new(kernel_core::AlwaysAllow),
            KernelConfig::for_tests(),
        ));
        engine.register_handler("genesis.event_log", Arc::new(GenesisEventLog::new(log)));

        let alice = ArtifactId::now_v7();
        let result = engine.invoke(alice, facade_id, "read", serde_json::json!({})).await.unwrap();
        // at least the facade artifact's own creation event was logged
        assert!(!result["events"].as_array().unwrap().is_empty());
    }
}
