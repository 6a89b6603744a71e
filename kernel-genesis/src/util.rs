//! Small JSON-argument parsing helpers shared by the facade handlers. Every
//! facade method takes a `serde_json::Value` bag of arguments (the engine
//! does not validate method signatures against an artifact's `Interface` —
//! see [`kernel_core::Interface`] and the Open Questions in `DESIGN.md`), so
//! each handler is responsible for its own `INVALID_ARGS` reporting.

use kernel_core::{ArtifactId, EngineError, KernelResult, ResourceKind};
use serde_json::Value;
use std::str::FromStr;

pub fn invalid_args(artifact: ArtifactId, method: &str, reason: impl Into<String>) -> kernel_core::KernelError {
    EngineError::InvalidArgs { artifact, method: method.to_string(), reason: reason.into() }.into()
}

pub fn required_str<'a>(args: &'a Value, field: &str, artifact: ArtifactId, method: &str) -> KernelResult<&'a str> {
    args.get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| invalid_args(artifact, method, format!("missing required field {field:?}")))
}

pub fn required_artifact_id(args: &Value, field: &str, artifact: ArtifactId, method: &str) -> KernelResult<ArtifactId> {
    let raw = required_str(args, field, artifact, method)?;
    ArtifactId::from_str(raw).map_err(|_| invalid_args(artifact, method, format!("{field} is not a valid artifact id")))
}

pub fn required_u64(args: &Value, field: &str, artifact: ArtifactId, method: &str) -> KernelResult<u64> {
    args.get(field)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| invalid_args(artifact, method, format!("missing or non-integer field {field:?}")))
}

pub fn resource_kind(name: &str, artifact: ArtifactId, method: &str) -> KernelResult<ResourceKind> {
    match name {
        "compute" => Ok(ResourceKind::Compute),
        "disk" => Ok(ResourceKind::Disk),
        "external_api" => Ok(ResourceKind::ExternalApi),
        other => Err(invalid_args(artifact, method, format!("unknown resource kind {other:?}"))),
    }
}
