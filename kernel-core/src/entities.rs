//! Core entity structures: the artifact, its tombstone, the event record,
//! and the ledger's per-principal accounting state.

use crate::{ArtifactId, ArtifactKind, EventKind, EventSeq, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The sole first-class entity. `id` is assigned by the store on creation
/// and never reused, even after a tombstone expires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Artifact {
    pub id: ArtifactId,
    /// Structured content: scalars, ordered sequences, keyed maps.
    pub content: serde_json::Value,
    /// Executable body. Present iff `has_executable`.
    pub code: Option<ArtifactCode>,
    /// Schema describing invocable methods. Present iff `has_executable`.
    pub interface: Option<Interface>,
    /// Gates access to this artifact. `None` only for the sentinel root
    /// contract itself.
    pub access_contract_id: Option<ArtifactId>,
    pub has_standing: bool,
    pub has_executable: bool,
    pub created_by: ArtifactId,
    #[cfg_attr(feature = "openapi", schema(value_type = chrono::DateTime<chrono::Utc>))]
    pub created_at: Timestamp,
    pub owner_id: ArtifactId,
}

impl Artifact {
    pub fn kind(&self) -> ArtifactKind {
        ArtifactKind::from_flags(self.has_standing, self.has_executable)
    }

    pub fn content_size(&self) -> usize {
        self.content.to_string().len()
    }

    pub fn code_size(&self) -> usize {
        self.code.as_ref().map(|c| c.size()).unwrap_or(0)
    }

    pub fn total_size(&self) -> usize {
        self.content_size() + self.code_size()
    }
}

/// An artifact's executable body. The kernel does not ship a general
/// bytecode interpreter for arbitrary agent code (that is the external
/// "container/OS sandbox" collaborator named in the scope section) but it
/// does execute the closed set of contract programs and genesis facades
/// defined in `kernel-contracts` / `kernel-genesis` directly, keyed by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ArtifactCode {
    /// Name of the kernel-registered program this artifact's code resolves
    /// to (e.g. `"contract.freeware"`, `"genesis.ledger.transfer"`).
    pub program: String,
    /// Opaque parameters passed to the program at invocation time.
    pub params: serde_json::Value,
}

impl ArtifactCode {
    pub fn size(&self) -> usize {
        self.program.len() + self.params.to_string().len()
    }
}

/// Schema describing an executable artifact's invocable methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Interface {
    pub methods: HashMap<String, MethodSignature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MethodSignature {
    /// Named input fields and a human-readable shape description.
    pub input_shape: HashMap<String, String>,
}

/// What `store.create` receives to build a new artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ArtifactSpec {
    pub content: serde_json::Value,
    pub code: Option<ArtifactCode>,
    pub interface: Option<Interface>,
    /// `None` means "attach-default" (the store's configured default
    /// contract), not "no contract" — every artifact but the root contract
    /// itself must resolve to an extant contract.
    pub access_contract_id: Option<ArtifactId>,
    pub has_standing: bool,
    pub has_executable: bool,
    pub owner_id: ArtifactId,
}

/// Metadata left behind by `delete` for the configured retention window.
/// Reads against a tombstoned ID fail with `DELETED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Tombstone {
    pub id: ArtifactId,
    #[cfg_attr(feature = "openapi", schema(value_type = chrono::DateTime<chrono::Utc>))]
    pub deleted_at: Timestamp,
    pub deleted_by: ArtifactId,
    pub reason: String,
}

/// An immutable record appended to the event log on every state-changing
/// action and on rejections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Event {
    pub seq: EventSeq,
    #[cfg_attr(feature = "openapi", schema(value_type = chrono::DateTime<chrono::Utc>))]
    pub timestamp: Timestamp,
    pub kind: EventKind,
    pub principal_id: ArtifactId,
    pub payload: serde_json::Value,
}

/// Per-principal token-bucket state for one metered resource.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TokenBucketState {
    /// Units refilled per second.
    pub rate: f64,
    /// Maximum balance.
    pub capacity: f64,
    /// Current balance; may be negative for debt-allowed resources.
    pub balance: f64,
    #[cfg_attr(feature = "openapi", schema(value_type = chrono::DateTime<chrono::Utc>))]
    pub last_update: Timestamp,
}

impl TokenBucketState {
    pub fn new(rate: f64, capacity: f64, now: Timestamp) -> Self {
        Self {
            rate,
            capacity,
            balance: capacity,
            last_update: now,
        }
    }

    /// Applies the rolling-window refill formula up to `now` and returns the
    /// refreshed balance. `elapsed` is clamped to zero so a `now` that is
    /// not monotonic relative to `last_update` (clock skew, replay) never
    /// drains the bucket.
    pub fn refill(&mut self, now: Timestamp) -> f64 {
        let elapsed = (now - self.last_update).num_milliseconds().max(0) as f64 / 1000.0;
        self.balance = (self.balance + elapsed * self.rate).min(self.capacity);
        self.last_update = now;
        self.balance
    }

    /// Refills to `now`, then debits `amount`. Debt-allowed buckets may go
    /// negative; debt-forbidden buckets reject a debit that would do so and
    /// leave the balance untouched.
    pub fn try_spend(&mut self, amount: f64, now: Timestamp, debt_allowed: bool) -> Result<f64, f64> {
        self.refill(now);
        let projected = self.balance - amount;
        if projected < 0.0 && !debt_allowed {
            return Err(self.balance);
        }
        self.balance = projected;
        Ok(self.balance)
    }

    /// Whether the bucket currently holds enough balance to admit a spend
    /// of `amount` without mutating state (used for the external-API
    /// dual-gate check, which must not debit one meter before confirming
    /// the other admits the spend too).
    pub fn peek(&self, now: Timestamp) -> f64 {
        let elapsed = (now - self.last_update).num_milliseconds().max(0) as f64 / 1000.0;
        (self.balance + elapsed * self.rate).min(self.capacity)
    }
}

/// The ledger's authoritative state for one principal: a non-negative scrip
/// balance plus a bucket per metered resource kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LedgerEntry {
    pub principal_id: ArtifactId,
    pub scrip: u64,
    pub buckets: HashMap<crate::ResourceKind, TokenBucketState>,
}

impl LedgerEntry {
    pub fn new(principal_id: ArtifactId) -> Self {
        Self {
            principal_id,
            scrip: 0,
            buckets: HashMap::new(),
        }
    }
}

/// Result of a contract evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PermissionDecision {
    pub allowed: bool,
    pub reason: String,
}

impl PermissionDecision {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}
