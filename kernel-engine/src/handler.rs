//! Dispatch table from an artifact's `code.program` name to the Rust
//! function that actually runs it. The kernel does not ship a bytecode
//! interpreter for arbitrary agent code; every executable artifact's
//! program name must resolve to a handler registered here, whether it is a
//! genesis facade (`kernel-genesis`) or a custom contract predicate.

use crate::capability::Capability;
use async_trait::async_trait;
use kernel_core::{ArtifactId, KernelResult};
use serde_json::Value;

#[async_trait]
pub trait InvocationHandler: Send + Sync {
    /// `cap` is bound to the invoked artifact's own identity (for any
    /// further calls the handler itself issues); `requester_id` is who
    /// actually invoked this artifact, distinct from `cap`'s identity and
    /// needed by facades that act on the requester's own ledger entry or
    /// ownership (e.g. "transfer *my* scrip", "list *my* artifact").
    async fn call(&self, cap: &Capability, requester_id: ArtifactId, method: &str, args: Value) -> KernelResult<Value>;
}
