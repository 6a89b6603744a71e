//! The artifact store trait and its in-memory implementation.

use chrono::Utc;
use kernel_core::{
    Artifact, ArtifactCode, ArtifactId, ArtifactKind, ArtifactSpec, ActionKind, KernelConfig,
    KernelResult, PermissionChecker, ResourceKind, StoreError, Tombstone,
};
use kernel_events::{EventBuilder, EventLog};
use kernel_ledger::Ledger;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Public fields returned by `metadata`, `list_by` and `search` — never
/// `content` or `code`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactMetadata {
    pub id: ArtifactId,
    pub kind: ArtifactKind,
    pub has_standing: bool,
    pub has_executable: bool,
    pub access_contract_id: Option<ArtifactId>,
    pub created_by: ArtifactId,
    pub owner_id: ArtifactId,
}

impl From<&Artifact> for ArtifactMetadata {
    fn from(a: &Artifact) -> Self {
        Self {
            id: a.id,
            kind: a.kind(),
            has_standing: a.has_standing,
            has_executable: a.has_executable,
            access_contract_id: a.access_contract_id,
            created_by: a.created_by,
            owner_id: a.owner_id,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArtifactFilter {
    pub owner_id: Option<ArtifactId>,
    pub kind: Option<ArtifactKind>,
    pub has_executable: Option<bool>,
}

/// Authoritative registry of all artifacts: uniqueness, size bounds,
/// tombstone semantics, circular-contract-chain rejection.
pub trait ArtifactStore: Send + Sync {
    fn create(&self, creator_id: ArtifactId, spec: ArtifactSpec) -> KernelResult<ArtifactId>;

    fn read(&self, id: ArtifactId, caller_id: ArtifactId, context: &serde_json::Value) -> KernelResult<serde_json::Value>;

    fn write(
        &self,
        id: ArtifactId,
        caller_id: ArtifactId,
        new_content: serde_json::Value,
        context: &serde_json::Value,
    ) -> KernelResult<()>;

    fn delete(&self, id: ArtifactId, caller_id: ArtifactId, reason: &str, context: &serde_json::Value) -> KernelResult<()>;

    /// Re-points `id`'s `access_contract_id` at `new_contract_id` (`None`
    /// attaches the store's default contract, same as at creation). Checked
    /// under `ActionKind::Write` against the artifact's *current* contract,
    /// then re-walks the chain from the new target before committing —
    /// a cycle or dangling reference fails the modification, leaving the
    /// artifact's existing contract untouched.
    fn set_access_contract(
        &self,
        id: ArtifactId,
        caller_id: ArtifactId,
        new_contract_id: Option<ArtifactId>,
        context: &serde_json::Value,
    ) -> KernelResult<()>;

    fn metadata(&self, id: ArtifactId) -> KernelResult<ArtifactMetadata>;

    /// Reads a full artifact without a permission check. Used by the
    /// execution engine and contract evaluator, which enforce permission
    /// themselves around invocation; never exposed to agent code directly.
    fn get_raw(&self, id: ArtifactId) -> KernelResult<Artifact>;

    /// Reassigns `owner_id` without consulting the access contract. Used by
    /// the genesis ledger and escrow facades, which are the kernel's
    /// sanctioned mechanism for an ownership change and enforce their own
    /// authorization (scrip payment, prior listing) before calling this.
    fn set_owner(&self, id: ArtifactId, new_owner: ArtifactId) -> KernelResult<()>;

    fn list_by(&self, filter: ArtifactFilter) -> Vec<ArtifactMetadata>;

    fn search(&self, query: &str) -> Vec<ArtifactMetadata>;

    /// Full state dump for checkpointing. Bypasses every access contract and
    /// retention rule — never exposed to agent code, only to the checkpoint
    /// writer.
    fn export_state(&self) -> StoreSnapshot;

    /// Replaces all state with a checkpointed snapshot. Only valid to call
    /// before any agent loop has started against this store.
    fn import_state(&self, snapshot: StoreSnapshot);
}

/// Everything a checkpoint needs to reconstruct the store exactly:
/// live artifacts plus tombstones still within their retention window.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct StoreSnapshot {
    pub artifacts: HashMap<ArtifactId, Artifact>,
    pub tombstones: HashMap<ArtifactId, Tombstone>,
    pub default_contract_id: Option<ArtifactId>,
}

struct Inner {
    artifacts: HashMap<ArtifactId, Artifact>,
    tombstones: HashMap<ArtifactId, Tombstone>,
}

/// In-memory artifact store. All state lives behind one `RwLock`; every
/// lock scope here is synchronous and released before any `.await` the
/// caller might perform around it.
pub struct InMemoryArtifactStore {
    inner: RwLock<Inner>,
    permission_checker: Arc<dyn PermissionChecker>,
    ledger: Arc<dyn Ledger>,
    events: Arc<dyn EventLog>,
    config: KernelConfig,
    default_contract_id: RwLock<Option<ArtifactId>>,
}

impl InMemoryArtifactStore {
    pub fn new(
        permission_checker: Arc<dyn PermissionChecker>,
        ledger: Arc<dyn Ledger>,
        events: Arc<dyn EventLog>,
        config: KernelConfig,
    ) -> Self {
        Self {
            inner: RwLock::new(Inner {
                artifacts: HashMap::new(),
                tombstones: HashMap::new(),
            }),
            permission_checker,
            ledger,
            events,
            config,
            default_contract_id: RwLock::new(None),
        }
    }

    /// Bootstrap hook: installs the artifact that new artifacts attach to
    /// when `access_contract_id` is left unset ("attach-default").
    pub fn set_default_contract(&self, id: ArtifactId) {
        *self.default_contract_id.write().expect("lock poisoned") = Some(id);
    }

    /// Walks the `access_contract_id` chain from `start`, failing if it
    /// exceeds `max_permission_depth` or loops back on itself. Terminates
    /// successfully at the root sentinel (`ArtifactId::nil()`) or at any
    /// artifact whose own pointer is `None`.
    fn walk_contract_chain(&self, inner: &Inner, start: ArtifactId) -> KernelResult<()> {
        self.walk_contract_chain_seeded(inner, start, std::collections::HashSet::new())
    }

    /// Same walk, but treating `seen` as already-visited. Used when
    /// validating a modification to `id`'s own pointer: seeding `seen` with
    /// `id` catches the chain looping back through the artifact being
    /// modified, which its own (not-yet-updated) stored pointer can't.
    fn walk_contract_chain_seeded(
        &self,
        inner: &Inner,
        start: ArtifactId,
        mut seen: std::collections::HashSet<ArtifactId>,
    ) -> KernelResult<()> {
        let mut current = start;
        for _ in 0..self.config.max_permission_depth {
            if current == ArtifactId::nil() {
                return Ok(());
            }
            if !seen.insert(current) {
                return Err(StoreError::CircularContract(start).into());
            }
            match inner.artifacts.get(&current) {
                None => return Err(StoreError::ContractMissing(current).into()),
                Some(contract) => match contract.access_contract_id {
                    None => return Ok(()),
                    Some(next) => current = next,
                },
            }
        }
        Err(StoreError::CircularContract(start).into())
    }

    fn resolve_contract(&self, spec_contract: Option<ArtifactId>) -> KernelResult<ArtifactId> {
        match spec_contract {
            Some(id) => Ok(id),
            None => self
                .default_contract_id
                .read()
                .expect("lock poisoned")
                .ok_or(StoreError::ContractMissing(ArtifactId::nil()).into()),
        }
    }

    fn check_permission(
        &self,
        artifact: &Artifact,
        action: ActionKind,
        caller_id: ArtifactId,
        context: &serde_json::Value,
    ) -> KernelResult<()> {
        let contract_id = artifact.access_contract_id.unwrap_or(ArtifactId::nil());
        let contract = if contract_id == ArtifactId::nil() {
            None
        } else {
            let inner = self.inner.read().expect("lock poisoned");
            match inner.artifacts.get(&contract_id) {
                Some(c) => Some(c.clone()),
                None => return Err(kernel_core::ContractError::ContractMissing(contract_id).into()),
            }
        };
        let decision = match contract {
            None => kernel_core::PermissionDecision::allow("root contract"),
            Some(_) => self.permission_checker.check(artifact, action, caller_id, context)?,
        };
        if decision.allowed {
            Ok(())
        } else {
            Err(kernel_core::ContractError::Denied { reason: decision.reason }.into())
        }
    }

    /// Logs an `InvocationRejected`-equivalent event for a permission
    /// failure on a direct store action (as opposed to an `invoke`, which
    /// `ExecutionEngine` logs itself).
    fn log_rejected(&self, caller_id: ArtifactId, id: ArtifactId, action: ActionKind, reason: &str) {
        let (kind, pid, payload) = EventBuilder::new(kernel_core::EventKind::InvocationRejected, caller_id)
            .field("artifact_id", id.to_string())
            .field("action", action.to_string())
            .field("reason", reason)
            .build();
        self.events.append(kind, pid, payload);
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn create(&self, creator_id: ArtifactId, spec: ArtifactSpec) -> KernelResult<ArtifactId> {
        if spec.content.to_string().len() > self.config.max_content_size_bytes {
            return Err(StoreError::ContentTooLarge {
                size: spec.content.to_string().len(),
                limit: self.config.max_content_size_bytes,
            }
            .into());
        }
        if let Some(code) = &spec.code {
            if code.size() > self.config.max_code_size_bytes {
                return Err(StoreError::CodeTooLarge {
                    size: code.size(),
                    limit: self.config.max_code_size_bytes,
                }
                .into());
            }
        }
        if spec.has_executable != (spec.code.is_some() && spec.interface.is_some()) {
            return Err(StoreError::ExecutableMissingInterfaceOrCode.into());
        }

        let mut inner = self.inner.write().expect("lock poisoned");

        if creator_id != ArtifactId::nil() {
            let creator = inner
                .artifacts
                .get(&creator_id)
                .ok_or(StoreError::CreatorLacksStanding(creator_id))?;
            if !creator.has_standing {
                return Err(StoreError::CreatorLacksStanding(creator_id).into());
            }
        }

        let contract_id = self.resolve_contract(spec.access_contract_id)?;
        self.walk_contract_chain(&inner, contract_id)?;

        let id = ArtifactId::now_v7();
        let artifact = Artifact {
            id,
            content: spec.content,
            code: spec.code,
            interface: spec.interface,
            access_contract_id: Some(contract_id),
            has_standing: spec.has_standing,
            has_executable: spec.has_executable,
            created_by: creator_id,
            created_at: Utc::now(),
            owner_id: spec.owner_id,
        };
        let size = artifact.total_size() as f64;

        drop(inner);
        self.ledger.adjust_resource(spec.owner_id, ResourceKind::Disk, size)?;
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.artifacts.insert(id, artifact);

        let (kind, pid, payload) = EventBuilder::new(kernel_core::EventKind::ArtifactCreated, creator_id)
            .field("artifact_id", id.to_string())
            .field("owner_id", spec.owner_id.to_string())
            .build();
        self.events.append(kind, pid, payload);
        Ok(id)
    }

    fn read(&self, id: ArtifactId, caller_id: ArtifactId, context: &serde_json::Value) -> KernelResult<serde_json::Value> {
        let content = {
            let inner = self.inner.read().expect("lock poisoned");
            if inner.tombstones.contains_key(&id) {
                return Err(StoreError::Deleted(id).into());
            }
            let artifact = inner.artifacts.get(&id).ok_or(StoreError::NotFound(id))?;
            if let Err(err) = self.check_permission(artifact, ActionKind::Read, caller_id, context) {
                self.log_rejected(caller_id, id, ActionKind::Read, &err.to_string());
                return Err(err);
            }
            artifact.content.clone()
        };

        let (kind, pid, payload) = EventBuilder::new(kernel_core::EventKind::InvocationCompleted, caller_id)
            .field("artifact_id", id.to_string())
            .field("action", ActionKind::Read.to_string())
            .build();
        self.events.append(kind, pid, payload);
        Ok(content)
    }

    fn write(
        &self,
        id: ArtifactId,
        caller_id: ArtifactId,
        new_content: serde_json::Value,
        context: &serde_json::Value,
    ) -> KernelResult<()> {
        let new_size;
        let owner_id;
        let old_size;
        {
            let inner = self.inner.read().expect("lock poisoned");
            if inner.tombstones.contains_key(&id) {
                return Err(StoreError::Deleted(id).into());
            }
            let artifact = inner.artifacts.get(&id).ok_or(StoreError::NotFound(id))?;
            if let Err(err) = self.check_permission(artifact, ActionKind::Write, caller_id, context) {
                self.log_rejected(caller_id, id, ActionKind::Write, &err.to_string());
                return Err(err);
            }
            old_size = artifact.content_size();
            new_size = new_content.to_string().len();
            owner_id = artifact.owner_id;
        }

        let delta = new_size as f64 - old_size as f64;
        if delta != 0.0 {
            self.ledger.adjust_resource(owner_id, ResourceKind::Disk, delta)?;
        }

        let mut inner = self.inner.write().expect("lock poisoned");
        let artifact = inner.artifacts.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        artifact.content = new_content;
        drop(inner);

        self.permission_checker.invalidate(id);

        let (kind, pid, payload) = EventBuilder::new(kernel_core::EventKind::ArtifactModified, caller_id)
            .field("artifact_id", id.to_string())
            .build();
        self.events.append(kind, pid, payload);
        Ok(())
    }

    fn delete(&self, id: ArtifactId, caller_id: ArtifactId, reason: &str, context: &serde_json::Value) -> KernelResult<()> {
        let owner_id;
        let size;
        {
            let inner = self.inner.read().expect("lock poisoned");
            if inner.tombstones.contains_key(&id) {
                return Err(StoreError::Deleted(id).into());
            }
            let artifact = inner.artifacts.get(&id).ok_or(StoreError::NotFound(id))?;
            if let Err(err) = self.check_permission(artifact, ActionKind::Delete, caller_id, context) {
                self.log_rejected(caller_id, id, ActionKind::Delete, &err.to_string());
                return Err(err);
            }
            owner_id = artifact.owner_id;
            size = artifact.total_size() as f64;
        }

        self.ledger.adjust_resource(owner_id, ResourceKind::Disk, -size)?;

        let mut inner = self.inner.write().expect("lock poisoned");
        inner.artifacts.remove(&id);
        inner.tombstones.insert(
            id,
            Tombstone {
                id,
                deleted_at: Utc::now(),
                deleted_by: caller_id,
                reason: reason.to_string(),
            },
        );
        drop(inner);

        self.permission_checker.invalidate(id);

        let (kind, pid, payload) = EventBuilder::new(kernel_core::EventKind::ArtifactDeleted, caller_id)
            .field("artifact_id", id.to_string())
            .field("reason", reason)
            .build();
        self.events.append(kind, pid, payload);
        Ok(())
    }

    fn metadata(&self, id: ArtifactId) -> KernelResult<ArtifactMetadata> {
        let inner = self.inner.read().expect("lock poisoned");
        if inner.tombstones.contains_key(&id) {
            return Err(StoreError::Deleted(id).into());
        }
        inner
            .artifacts
            .get(&id)
            .map(ArtifactMetadata::from)
            .ok_or(StoreError::NotFound(id).into())
    }

    fn get_raw(&self, id: ArtifactId) -> KernelResult<Artifact> {
        let inner = self.inner.read().expect("lock poisoned");
        if inner.tombstones.contains_key(&id) {
            return Err(StoreError::Deleted(id).into());
        }
        inner.artifacts.get(&id).cloned().ok_or(StoreError::NotFound(id).into())
    }

    fn set_owner(&self, id: ArtifactId, new_owner: ArtifactId) -> KernelResult<()> {
        let (old_owner, size) = {
            let inner = self.inner.read().expect("lock poisoned");
            if inner.tombstones.contains_key(&id) {
                return Err(StoreError::Deleted(id).into());
            }
            let artifact = inner.artifacts.get(&id).ok_or(StoreError::NotFound(id))?;
            (artifact.owner_id, artifact.total_size() as f64)
        };
        if old_owner == new_owner {
            return Ok(());
        }
        self.ledger.adjust_resource(new_owner, ResourceKind::Disk, size)?;
        self.ledger.adjust_resource(old_owner, ResourceKind::Disk, -size)?;

        let mut inner = self.inner.write().expect("lock poisoned");
        let artifact = inner.artifacts.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        artifact.owner_id = new_owner;
        drop(inner);

        self.permission_checker.invalidate(id);
        Ok(())
    }

    fn set_access_contract(
        &self,
        id: ArtifactId,
        caller_id: ArtifactId,
        new_contract_id: Option<ArtifactId>,
        context: &serde_json::Value,
    ) -> KernelResult<()> {
        let resolved = {
            let inner = self.inner.read().expect("lock poisoned");
            if inner.tombstones.contains_key(&id) {
                return Err(StoreError::Deleted(id).into());
            }
            let artifact = inner.artifacts.get(&id).ok_or(StoreError::NotFound(id))?;
            if let Err(err) = self.check_permission(artifact, ActionKind::Write, caller_id, context) {
                self.log_rejected(caller_id, id, ActionKind::Write, &err.to_string());
                return Err(err);
            }
            let resolved = self.resolve_contract(new_contract_id)?;
            let seen = std::iter::once(id).collect::<std::collections::HashSet<_>>();
            if let Err(err) = self.walk_contract_chain_seeded(&inner, resolved, seen) {
                self.log_rejected(caller_id, id, ActionKind::Write, &err.to_string());
                return Err(err);
            }
            resolved
        };

        let mut inner = self.inner.write().expect("lock poisoned");
        let artifact = inner.artifacts.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        artifact.access_contract_id = Some(resolved);
        drop(inner);

        self.permission_checker.invalidate(id);

        let (kind, pid, payload) = EventBuilder::new(kernel_core::EventKind::ArtifactModified, caller_id)
            .field("artifact_id", id.to_string())
            .field("access_contract_id", resolved.to_string())
            .build();
        self.events.append(kind, pid, payload);
        Ok(())
    }

    fn list_by(&self, filter: ArtifactFilter) -> Vec<ArtifactMetadata> {
        let inner = self.inner.read().expect("lock poisoned");
        inner
            .artifacts
            .values()
            .filter(|a| filter.owner_id.map_or(true, |o| o == a.owner_id))
            .filter(|a| filter.kind.map_or(true, |k| k == a.kind()))
            .filter(|a| filter.has_executable.map_or(true, |e| e == a.has_executable))
            .map(ArtifactMetadata::from)
            .collect()
    }

    fn export_state(&self) -> StoreSnapshot {
        let inner = self.inner.read().expect("lock poisoned");
        StoreSnapshot {
            artifacts: inner.artifacts.clone(),
            tombstones: inner.tombstones.clone(),
            default_contract_id: *self.default_contract_id.read().expect("lock poisoned"),
        }
    }

    fn import_state(&self, snapshot: StoreSnapshot) {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.artifacts = snapshot.artifacts;
        inner.tombstones = snapshot.tombstones;
        *self.default_contract_id.write().expect("lock poisoned") = snapshot.default_contract_id;
    }

    fn search(&self, query: &str) -> Vec<ArtifactMetadata> {
        let inner = self.inner.read().expect("lock poisoned");
        inner
            .artifacts
            .values()
            .filter(|a| {
                a.id.to_string().contains(query)
                    || a.owner_id.to_string().contains(query)
                    || a.created_by.to_string().contains(query)
                    || a.kind().to_string().contains(query)
            })
            .map(ArtifactMetadata::from)
            .collect()
    }
}
