//! Seam the contract evaluator uses to dispatch a `CustomPredicate`
//! contract's sub-invocation back through the execution engine, without
//! `kernel-contracts` depending on `kernel-engine` (which itself depends on
//! the evaluator for every permission check).

use crate::{ArtifactId, KernelResult};

pub trait Invoker: Send + Sync {
    /// Invokes `method` on `artifact_id` on behalf of `caller_id`, at the
    /// given permission-evaluation depth. Charged to `caller_id`, per the
    /// cost-attribution rule — never to an ambient owner.
    fn invoke(
        &self,
        artifact_id: ArtifactId,
        method: &str,
        args: serde_json::Value,
        caller_id: ArtifactId,
        permission_depth: u32,
    ) -> KernelResult<serde_json::Value>;
}
