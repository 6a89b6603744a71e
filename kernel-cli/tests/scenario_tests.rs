//! Integration coverage that needs every crate wired together for real —
//! the real `ContractEvaluator`, not `AlwaysAllow` — rather than any one
//! crate's own unit tests, which is why it lives here instead of in
//! `kernel-contracts` or `kernel-engine`.

use async_trait::async_trait;
use kernel_core::{
    ArtifactCode, ArtifactId, ArtifactSpec, ContractError, EventKind, Interface, KernelConfig, KernelError, KernelResult,
};
use kernel_engine::{Capability, InvocationHandler};
use kernel_events::EventLogExt;
use kernel_ledger::Ledger;
use kernel_store::ArtifactStore;
use serde_json::Value;
use std::sync::Arc;

fn new_account(kernel: &kernel_cli::wiring::Kernel) -> ArtifactId {
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
        .unwrap();
    principal
}

/// Forwards every call straight to a fixed target, attributed to its own
/// identity (the capability it was handed), exercising the nested-invoke
/// caller-identity rule.
struct Forwarder {
    target: ArtifactId,
}

#[async_trait]
impl InvocationHandler for Forwarder {
    async fn call(&self, cap: &Capability, _requester_id: ArtifactId, method: &str, args: Value) -> KernelResult<Value> {
        cap.invoke(self.target, method, args).await
    }
}

/// Returns a fixed payload without reading its own artifact content, so
/// reaching this handler at all is itself the signal that the caller
/// cleared every permission check on the way in.
struct Echo {
    payload: Value,
}

#[async_trait]
impl InvocationHandler for Echo {
    async fn call(&self, _cap: &Capability, _requester_id: ArtifactId, _method: &str, _args: Value) -> KernelResult<Value> {
        Ok(self.payload.clone())
    }
}

/// A custom contract predicate: reads its own content for a `"permitted"`
/// principal and allows only that one. Registered under a program name
/// outside the three genesis templates, so the evaluator dispatches it as
/// `ContractProgram::CustomPredicate` through the engine.
struct PermitOnly;

#[async_trait]
impl InvocationHandler for PermitOnly {
    async fn call(&self, cap: &Capability, requester_id: ArtifactId, method: &str, _args: Value) -> KernelResult<Value> {
        if method != "check_permission" {
            return Ok(serde_json::json!({ "allowed": false, "reason": "unknown method" }));
        }
        let content = cap.read(cap.caller_id())?;
        let permitted = content.get("permitted").and_then(|v| v.as_str()).unwrap_or_default();
        let allowed = permitted == requester_id.to_string();
        Ok(serde_json::json!({
            "allowed": allowed,
            "reason": if allowed { "permitted principal" } else { "not the permitted principal" },
        }))
    }
}

fn executable_spec(owner: ArtifactId, program: &str, content: Value, access_contract_id: Option<ArtifactId>) -> ArtifactSpec {
    ArtifactSpec {
        content,
        code: Some(ArtifactCode { program: program.into(), params: serde_json::json!({}) }),
        interface: Some(Interface::default()),
        access_contract_id,
        has_standing: false,
        has_executable: true,
        owner_id: owner,
    }
}

#[tokio::test]
async fn freeware_read_is_free_and_visible_to_any_principal() {
    let oracle = ArtifactId::now_v7();
    let kernel = kernel_cli::wiring::build(&KernelConfig::for_tests(), oracle).unwrap();
    let a = new_account(&kernel);
    let b = new_account(&kernel);

    let x = kernel
        .store
        .create(
            a,
            ArtifactSpec {
                content: serde_json::json!("hello"),
                code: None,
                interface: None,
                access_contract_id: Some(kernel.genesis.contract_freeware),
                has_standing: false,
                has_executable: false,
                owner_id: a,
            },
        )
        .unwrap();

    let before = kernel.ledger.scrip_balance(b);
    let completed_before = kernel.events.find_by_kind(EventKind::InvocationCompleted, usize::MAX).len();
    let content = kernel.store.read(x, b, &serde_json::json!({})).unwrap();
    assert_eq!(content, serde_json::json!("hello"));
    assert_eq!(kernel.ledger.scrip_balance(b), before);
    let completed_after = kernel.events.find_by_kind(EventKind::InvocationCompleted, usize::MAX).len();
    assert_eq!(completed_after, completed_before + 1, "one invocation_completed event logged");
}

#[tokio::test]
async fn private_write_by_a_non_creator_is_denied_and_leaves_content_untouched() {
    let oracle = ArtifactId::now_v7();
    let kernel = kernel_cli::wiring::build(&KernelConfig::for_tests(), oracle).unwrap();
    let a = new_account(&kernel);
    let b = new_account(&kernel);

    let x = kernel
        .store
        .create(
            a,
            ArtifactSpec {
                content: serde_json::json!("hello"),
                code: None,
                interface: None,
                access_contract_id: Some(kernel.genesis.contract_private),
                has_standing: false,
                has_executable: false,
                owner_id: a,
            },
        )
        .unwrap();

    let rejected_before = kernel.events.find_by_kind(EventKind::InvocationRejected, usize::MAX).len();
    let err = kernel.store.write(x, b, serde_json::json!("bye"), &serde_json::json!({})).unwrap_err();
    assert!(matches!(err, KernelError::Contract(ContractError::Denied { .. })));
    assert_eq!(kernel.store.read(x, a, &serde_json::json!({})).unwrap(), serde_json::json!("hello"));
    let rejected_after = kernel.events.find_by_kind(EventKind::InvocationRejected, usize::MAX).len();
    assert_eq!(rejected_after, rejected_before + 1, "one invocation_rejected event logged");
}

#[tokio::test]
async fn swapping_the_inner_contract_turns_a_nested_invoke_success_into_a_propagated_denial() {
    let oracle = ArtifactId::now_v7();
    let kernel = kernel_cli::wiring::build(&KernelConfig::for_tests(), oracle).unwrap();
    let a = new_account(&kernel);
    let b = new_account(&kernel);

    // t1: forwards to t2, owned by b, open to any invoker.
    let t1 = kernel
        .store
        .create(b, executable_spec(b, "scenario.forwarder", serde_json::json!({}), Some(kernel.genesis.contract_freeware)))
        .unwrap();

    // The custom predicate contract gating t2, created by b so only b can
    // later rewrite its `"permitted"` field.
    let gate = kernel
        .store
        .create(
            b,
            ArtifactSpec {
                content: serde_json::json!({ "permitted": t1.to_string() }),
                code: Some(ArtifactCode { program: "scenario.permit_only".into(), params: serde_json::json!({}) }),
                interface: Some(Interface::default()),
                access_contract_id: Some(kernel.genesis.contract_freeware),
                has_standing: false,
                has_executable: true,
                owner_id: b,
            },
        )
        .unwrap();

    let t2 = kernel
        .store
        .create(b, executable_spec(b, "scenario.echo", serde_json::json!({ "secret": true }), Some(gate)))
        .unwrap();

    kernel.engine.register_handler("scenario.forwarder", Arc::new(Forwarder { target: t2 }));
    kernel.engine.register_handler("scenario.echo", Arc::new(Echo { payload: serde_json::json!({ "secret": true }) }));
    kernel.engine.register_handler("scenario.permit_only", Arc::new(PermitOnly));

    let result = kernel.engine.invoke(a, t1, "get", serde_json::json!({})).await.unwrap();
    assert_eq!(result, serde_json::json!({ "secret": true }));

    // b (the gate's creator) narrows the gate to someone other than t1.
    kernel.store.write(gate, b, serde_json::json!({ "permitted": a.to_string() }), &serde_json::json!({})).unwrap();

    let err = kernel.engine.invoke(a, t1, "get", serde_json::json!({})).await.unwrap_err();
    assert!(matches!(err, KernelError::Contract(ContractError::Denied { .. })));
}
