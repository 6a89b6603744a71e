//! Error types for kernel operations.
//!
//! One `thiserror` enum per component, composed into a single
//! [`KernelError`] via `#[from]`. Components return the structured variant;
//! callers that only need the category match on [`ErrorKind`] via
//! [`KernelError::kind`].

use crate::{ArtifactId, ErrorKind};
use thiserror::Error;

/// Artifact store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("artifact not found: {0}")]
    NotFound(ArtifactId),

    #[error("artifact {0} is deleted")]
    Deleted(ArtifactId),

    #[error("content size {size} exceeds limit {limit}")]
    ContentTooLarge { size: usize, limit: usize },

    #[error("code size {size} exceeds limit {limit}")]
    CodeTooLarge { size: usize, limit: usize },

    #[error("has_executable=true requires non-null interface and code")]
    ExecutableMissingInterfaceOrCode,

    #[error("creator {0} lacks standing")]
    CreatorLacksStanding(ArtifactId),

    #[error("access_contract_id {0} does not resolve to an extant artifact")]
    ContractMissing(ArtifactId),

    #[error("contract chain from {0} exceeds max permission depth")]
    CircularContract(ArtifactId),

    #[error("owner {owner} disk quota {quota} exceeded by {requested}")]
    DiskQuotaExceeded {
        owner: ArtifactId,
        quota: u64,
        requested: u64,
    },
}

/// Ledger errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("principal {0} is unknown to the ledger")]
    UnknownPrincipal(ArtifactId),

    #[error("insufficient scrip for {principal}: balance {balance}, requested {requested}")]
    InsufficientScrip {
        principal: ArtifactId,
        balance: u64,
        requested: u64,
    },

    #[error("insufficient {resource} for {principal}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        principal: ArtifactId,
        resource: String,
        balance: i64,
        requested: i64,
    },

    #[error("system-wide bucket {resource} exhausted")]
    SystemBucketExhausted { resource: String },
}

/// Contract-evaluation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContractError {
    #[error("access denied: {reason}")]
    Denied { reason: String },

    #[error("contract {0} is missing or tombstoned")]
    ContractMissing(ArtifactId),

    #[error("permission evaluation depth exceeded at contract {0}")]
    PermissionDepthExceeded(ArtifactId),
}

/// Execution-engine errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("invocation depth exceeded (max {max})")]
    DepthExceeded { max: u32 },

    #[error("invocation of {0} timed out")]
    Timeout(ArtifactId),

    #[error("invocation of {artifact} raised an uncaught fault: {reason}")]
    ExecutionFault { artifact: ArtifactId, reason: String },

    #[error("arguments invalid for {artifact}.{method}: {reason}")]
    InvalidArgs {
        artifact: ArtifactId,
        method: String,
        reason: String,
    },

    #[error("action cancelled before commit")]
    Cancelled,

    #[error("kernel invariant violated: {0}")]
    Internal(String),
}

/// Agent loop supervisor errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SupervisorError {
    #[error("agent {0} is quarantined")]
    Quarantined(ArtifactId),

    #[error("agent {0} is not registered with the supervisor")]
    NotRegistered(ArtifactId),
}

/// Configuration errors. Surfaced at startup as CLI exit code 1.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("failed to read configuration file {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Checkpoint errors. Surfaced at startup as CLI exit code 2.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CheckpointError {
    #[error("checkpoint at {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("checkpoint format version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("io error during checkpoint {operation}: {reason}")]
    Io { operation: String, reason: String },
}

/// Master error type for all kernel operations.
#[derive(Debug, Clone, Error)]
pub enum KernelError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

pub type KernelResult<T> = Result<T, KernelError>;

impl KernelError {
    /// Maps every structured variant onto one of the fourteen error kinds
    /// named in the kernel's error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            KernelError::Store(e) => match e {
                StoreError::NotFound(_) => ErrorKind::NotFound,
                StoreError::Deleted(_) => ErrorKind::Deleted,
                StoreError::ContentTooLarge { .. }
                | StoreError::CodeTooLarge { .. }
                | StoreError::ExecutableMissingInterfaceOrCode
                | StoreError::CreatorLacksStanding(_) => ErrorKind::InvalidArgs,
                StoreError::ContractMissing(_) => ErrorKind::ContractMissing,
                StoreError::CircularContract(_) => ErrorKind::CircularContract,
                StoreError::DiskQuotaExceeded { .. } => ErrorKind::InsufficientDisk,
            },
            KernelError::Ledger(e) => match e {
                LedgerError::UnknownPrincipal(_) => ErrorKind::NotFound,
                LedgerError::InsufficientScrip { .. } => ErrorKind::InsufficientScrip,
                LedgerError::InsufficientFunds { resource, .. } if resource == "disk" => {
                    ErrorKind::InsufficientDisk
                }
                LedgerError::InsufficientFunds { .. } => ErrorKind::RateLimitedAgent,
                LedgerError::SystemBucketExhausted { .. } => ErrorKind::RateLimitedSystem,
            },
            KernelError::Contract(e) => match e {
                ContractError::Denied { .. } => ErrorKind::AccessDenied,
                ContractError::ContractMissing(_) => ErrorKind::ContractMissing,
                ContractError::PermissionDepthExceeded(_) => ErrorKind::DepthExceeded,
            },
            KernelError::Engine(e) => match e {
                EngineError::DepthExceeded { .. } => ErrorKind::DepthExceeded,
                EngineError::Timeout(_) => ErrorKind::Timeout,
                EngineError::ExecutionFault { .. } => ErrorKind::ExecutionError,
                EngineError::InvalidArgs { .. } => ErrorKind::InvalidArgs,
                EngineError::Cancelled => ErrorKind::Cancelled,
                EngineError::Internal(_) => ErrorKind::Internal,
            },
            KernelError::Supervisor(_) => ErrorKind::AccessDenied,
            KernelError::Config(_) => ErrorKind::InvalidArgs,
            KernelError::Checkpoint(_) => ErrorKind::Internal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_not_found_maps_to_not_found_kind() {
        let err: KernelError = StoreError::NotFound(ArtifactId::nil()).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn engine_internal_is_fatal() {
        let err: KernelError = EngineError::Internal("arena corrupted".into()).into();
        assert!(err.is_fatal());
    }

    #[test]
    fn contract_denied_maps_to_access_denied() {
        let err: KernelError = ContractError::Denied {
            reason: "not the owner".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
    }
}
