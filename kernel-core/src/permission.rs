//! Seam between the artifact store and the contract evaluator.
//!
//! The store enforces permission on every `read`/`write`/`delete`, but the
//! evaluator that computes the decision lives in a separate crate that
//! itself needs to read artifacts back out of the store. Routing both
//! through this trait avoids a crate-level dependency cycle: `kernel-store`
//! depends only on this trait, `kernel-contracts` implements it, and
//! `kernel-genesis`/`kernel-engine` wire the two together at bootstrap.

use crate::{ActionKind, Artifact, ArtifactId, KernelResult, PermissionDecision};

/// Computes a permission decision for one action against one artifact.
pub trait PermissionChecker: Send + Sync {
    fn check(
        &self,
        artifact: &Artifact,
        action: ActionKind,
        requester_id: ArtifactId,
        context: &serde_json::Value,
    ) -> KernelResult<PermissionDecision>;

    /// Drops any cached decision touching `artifact_id`, as either the
    /// gated artifact or the contract itself. Checkers with no cache (the
    /// sentinel `AlwaysAllow`, a custom test double) can leave this as a
    /// no-op; `kernel-contracts::ContractEvaluator` overrides it.
    fn invalidate(&self, _artifact_id: ArtifactId) {}
}

/// Always allows. Used only for the sentinel root contract's self-pointer
/// and in tests that don't exercise the permission path.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAllow;

impl PermissionChecker for AlwaysAllow {
    fn check(
        &self,
        _artifact: &Artifact,
        _action: ActionKind,
        _requester_id: ArtifactId,
        _context: &serde_json::Value,
    ) -> KernelResult<PermissionDecision> {
        Ok(PermissionDecision::allow("root contract"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn always_allow_permits_every_action() {
        let artifact = Artifact {
            id: ArtifactId::now_v7(),
            content: serde_json::json!(null),
            code: None,
            interface: None,
            access_contract_id: None,
            has_standing: false,
            has_executable: false,
            created_by: ArtifactId::now_v7(),
            created_at: Utc::now(),
            owner_id: ArtifactId::now_v7(),
        };
        let decision = AlwaysAllow
            .check(&artifact, ActionKind::Delete, ArtifactId::now_v7(), &serde_json::json!({}))
            .unwrap();
        assert!(decision.allowed);
    }
}
