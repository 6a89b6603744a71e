//! Assertions tailored to the invariants this kernel actually makes —
//! scrip conservation, resource-balance bounds, event-log shape — rather
//! than generic equality checks callers could write inline.

use kernel_core::{ArtifactId, EventKind, KernelError, KernelResult};
use kernel_events::{EventLog, EventLogExt};
use kernel_ledger::Ledger;

/// Fails unless the sum of every registered principal's scrip balance
/// equals `expected_total` — the conservation invariant a mint/burn/
/// transfer sequence must never break.
pub fn assert_scrip_conserved(ledger: &dyn Ledger, principals: &[ArtifactId], expected_total: u64) {
    let actual: u64 = principals.iter().map(|p| ledger.scrip_balance(*p)).sum();
    assert_eq!(
        actual, expected_total,
        "scrip conservation violated: {principals:?} sum to {actual}, expected {expected_total}"
    );
}

/// Fails unless `result` is `Err` carrying exactly `expected` as its
/// [`kernel_core::ErrorKind`] — the shape most call sites actually care
/// about, rather than matching a specific variant's payload.
pub fn assert_err_kind<T: std::fmt::Debug>(result: KernelResult<T>, expected: kernel_core::ErrorKind) {
    match result {
        Ok(value) => panic!("expected an error of kind {expected}, got Ok({value:?})"),
        Err(err) => assert_eq!(err.kind(), expected, "wrong error kind for {err:?}"),
    }
}

/// Fails unless the event log contains at least one event of `kind`
/// attributed to `principal_id`.
pub fn assert_event_logged(events: &dyn EventLog, kind: EventKind, principal_id: ArtifactId) {
    let found = events
        .find_by_kind(kind, usize::MAX)
        .iter()
        .any(|event| event.principal_id == principal_id);
    assert!(found, "expected a {kind} event for principal {principal_id}, found none");
}

/// `true` iff `err` is the specific `KernelError` variant expected for a
/// permission-depth guard tripping — convenience for the handful of tests
/// that need to distinguish it from every other `AccessDenied`-kind error.
pub fn is_depth_exceeded(err: &KernelError) -> bool {
    matches!(
        err,
        KernelError::Contract(kernel_core::ContractError::PermissionDepthExceeded(_))
            | KernelError::Engine(kernel_core::EngineError::DepthExceeded { .. })
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::genesis_kernel;

    #[test]
    fn scrip_conservation_holds_across_a_mint_and_transfer() {
        let kernel = genesis_kernel();
        let a = crate::fixtures::new_account(&kernel);
        let b = crate::fixtures::new_account(&kernel);
        kernel.ledger.mint(a, 100, "seed").unwrap();
        kernel.ledger.transfer(a, b, 40).unwrap();
        assert_scrip_conserved(kernel.ledger.as_ref(), &[a, b], 100);
    }

    #[test]
    fn err_kind_assertion_matches_not_found() {
        let kernel = genesis_kernel();
        let missing = ArtifactId::now_v7();
        let result = kernel.store.read(missing, missing, &serde_json::json!({}));
        assert_err_kind(result, kernel_core::ErrorKind::NotFound);
    }
}
