//! Discriminator enums shared across the kernel.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four derived artifact kinds, computed from `(has_standing,
/// has_executable)`. Replaces runtime "kind" introspection with a tagged
/// variant matched exhaustively everywhere a kind-dependent decision is
/// made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum ArtifactKind {
    /// `has_standing=false, has_executable=false`
    Data,
    /// `has_standing=false, has_executable=true`
    Tool,
    /// `has_standing=true, has_executable=false`
    Account,
    /// `has_standing=true, has_executable=true`
    Agent,
}

impl ArtifactKind {
    pub fn from_flags(has_standing: bool, has_executable: bool) -> Self {
        match (has_standing, has_executable) {
            (false, false) => ArtifactKind::Data,
            (false, true) => ArtifactKind::Tool,
            (true, false) => ArtifactKind::Account,
            (true, true) => ArtifactKind::Agent,
        }
    }

    pub fn has_standing(self) -> bool {
        matches!(self, ArtifactKind::Account | ArtifactKind::Agent)
    }

    pub fn has_executable(self) -> bool {
        matches!(self, ArtifactKind::Tool | ArtifactKind::Agent)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArtifactKind::Data => "data",
            ArtifactKind::Tool => "tool",
            ArtifactKind::Account => "account",
            ArtifactKind::Agent => "agent",
        };
        write!(f, "{s}")
    }
}

/// A metered resource kind. Scrip is tracked separately on the ledger entry
/// (it is currency, not a rate-limited resource); these are the things a
/// token bucket governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum ResourceKind {
    /// Renewable compute budget. Debt-allowed: may go negative.
    Compute,
    /// Disk quota consumed by owned artifacts. Debt-forbidden.
    Disk,
    /// System-wide external API call budget (tokens in/out). Debt-forbidden.
    ExternalApi,
}

impl ResourceKind {
    /// Whether balances for this resource may go negative.
    pub fn debt_allowed(self) -> bool {
        matches!(self, ResourceKind::Compute)
    }

    /// Whether this resource is metered per-principal or system-wide.
    pub fn is_system_wide(self) -> bool {
        matches!(self, ResourceKind::ExternalApi)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Compute => "compute",
            ResourceKind::Disk => "disk",
            ResourceKind::ExternalApi => "external_api",
        };
        write!(f, "{s}")
    }
}

/// The five primitive actions dispatched by the execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum ActionKind {
    Read,
    Write,
    Edit,
    Delete,
    Invoke,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionKind::Read => "read",
            ActionKind::Write => "write",
            ActionKind::Edit => "edit",
            ActionKind::Delete => "delete",
            ActionKind::Invoke => "invoke",
        };
        write!(f, "{s}")
    }
}

/// Enumerated event kinds, exactly as named in the event-log wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ArtifactCreated,
    ArtifactModified,
    ArtifactDeleted,
    Transfer,
    InvocationStarted,
    InvocationCompleted,
    InvocationRejected,
    Checkpoint,
    Mint,
    Burn,
    AgentQuarantined,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::ArtifactCreated => "artifact_created",
            EventKind::ArtifactModified => "artifact_modified",
            EventKind::ArtifactDeleted => "artifact_deleted",
            EventKind::Transfer => "transfer",
            EventKind::InvocationStarted => "invocation_started",
            EventKind::InvocationCompleted => "invocation_completed",
            EventKind::InvocationRejected => "invocation_rejected",
            EventKind::Checkpoint => "checkpoint",
            EventKind::Mint => "mint",
            EventKind::Burn => "burn",
            EventKind::AgentQuarantined => "agent_quarantined",
        };
        write!(f, "{s}")
    }
}

/// The fourteen error kinds named in the kernel's error taxonomy.
/// [`crate::KernelError::kind`] maps every structured error onto one of
/// these; callers that only need to branch on category match here instead
/// of on the richer per-component enums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum ErrorKind {
    NotFound,
    Deleted,
    AccessDenied,
    InvalidArgs,
    InsufficientScrip,
    InsufficientDisk,
    RateLimitedAgent,
    RateLimitedSystem,
    Timeout,
    DepthExceeded,
    ExecutionError,
    ContractMissing,
    CircularContract,
    Cancelled,
    Internal,
}

impl ErrorKind {
    /// `INTERNAL` is the only fatal kind: the engine aborts the run on it.
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorKind::Internal)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Deleted => "DELETED",
            ErrorKind::AccessDenied => "ACCESS_DENIED",
            ErrorKind::InvalidArgs => "INVALID_ARGS",
            ErrorKind::InsufficientScrip => "INSUFFICIENT_SCRIP",
            ErrorKind::InsufficientDisk => "INSUFFICIENT_DISK",
            ErrorKind::RateLimitedAgent => "RATE_LIMITED_AGENT",
            ErrorKind::RateLimitedSystem => "RATE_LIMITED_SYSTEM",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::DepthExceeded => "DEPTH_EXCEEDED",
            ErrorKind::ExecutionError => "EXECUTION_ERROR",
            ErrorKind::ContractMissing => "CONTRACT_MISSING",
            ErrorKind::CircularContract => "CIRCULAR_CONTRACT",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::Internal => "INTERNAL",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_kind_round_trips_through_flags() {
        for (standing, executable) in [(false, false), (false, true), (true, false), (true, true)] {
            let kind = ArtifactKind::from_flags(standing, executable);
            assert_eq!(kind.has_standing(), standing);
            assert_eq!(kind.has_executable(), executable);
        }
    }

    #[test]
    fn only_compute_is_debt_allowed() {
        assert!(ResourceKind::Compute.debt_allowed());
        assert!(!ResourceKind::Disk.debt_allowed());
        assert!(!ResourceKind::ExternalApi.debt_allowed());
    }

    #[test]
    fn only_internal_is_fatal() {
        assert!(ErrorKind::Internal.is_fatal());
        assert!(!ErrorKind::AccessDenied.is_fatal());
    }

    #[test]
    fn event_kind_display_matches_wire_format_tag() {
        assert_eq!(EventKind::ArtifactCreated.to_string(), "artifact_created");
        assert_eq!(EventKind::AgentQuarantined.to_string(), "agent_quarantined");
    }
}
