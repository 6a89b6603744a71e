//! Resource accounting: scrip balances and per-resource token buckets.

use chrono::Utc;
use kernel_core::{
    ArtifactId, BucketCalibration, KernelConfig, KernelResult, LedgerEntry, LedgerError,
    ResourceKind, TokenBucketState,
};
use kernel_events::{EventBuilder, EventLog};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Authoritative resource accounting for scrip and metered resources. All
/// mutations are atomic with respect to other ledger mutations; readers may
/// observe a stale snapshot.
pub trait Ledger: Send + Sync {
    fn scrip_balance(&self, pid: ArtifactId) -> u64;

    fn resource_balance(&self, pid: ArtifactId, resource: ResourceKind) -> f64;

    /// The shared system-wide external-API bucket, independent of any one
    /// principal's per-principal allotment.
    fn external_api_system_balance(&self) -> f64;

    /// Registers a principal with a fresh ledger entry. Idempotent.
    fn register_principal(&self, pid: ArtifactId);

    /// Atomic debit of `from` and credit of `to`. Both are required to
    /// already be registered principals.
    fn transfer(&self, from: ArtifactId, to: ArtifactId, amount: u64) -> KernelResult<()>;

    /// Metered consumption by the engine itself. For `ExternalApi`, gates on
    /// both the per-principal and system-wide buckets before debiting
    /// either (the dual-gate rule).
    fn spend(&self, pid: ArtifactId, resource: ResourceKind, amount: f64) -> KernelResult<f64>;

    /// Rolls a principal's resource balance by a signed delta without the
    /// external-API dual gate. Used by the artifact store to track disk
    /// quota; positive consumes, negative credits back.
    fn adjust_resource(&self, pid: ArtifactId, resource: ResourceKind, delta: f64) -> KernelResult<f64>;

    fn mint(&self, pid: ArtifactId, amount: u64, reason: &str) -> KernelResult<()>;

    fn burn(&self, pid: ArtifactId, amount: u64, reason: &str) -> KernelResult<()>;

    /// Full state dump for checkpointing.
    fn export_state(&self) -> LedgerSnapshot;

    /// Replaces all state with a checkpointed snapshot.
    fn import_state(&self, snapshot: LedgerSnapshot);
}

/// Everything a checkpoint needs to reconstruct the ledger exactly: every
/// principal's scrip and bucket state plus the shared system-wide
/// external-API bucket.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LedgerSnapshot {
    pub entries: HashMap<ArtifactId, LedgerEntry>,
    pub external_api_system: TokenBucketState,
}

pub struct InMemoryLedger {
    entries: RwLock<HashMap<ArtifactId, LedgerEntry>>,
    external_api_system: RwLock<TokenBucketState>,
    events: Arc<dyn EventLog>,
    config: KernelConfig,
}

impl InMemoryLedger {
    pub fn new(events: Arc<dyn EventLog>, config: KernelConfig) -> Self {
        let now = Utc::now();
        let system_bucket = TokenBucketState::new(
            config.external_api_bucket.rate,
            config.external_api_bucket.capacity,
            now,
        );
        Self {
            entries: RwLock::new(HashMap::new()),
            external_api_system: RwLock::new(system_bucket),
            events,
            config,
        }
    }

    fn calibration_for(&self, resource: ResourceKind) -> BucketCalibration {
        match resource {
            ResourceKind::Compute => self.config.compute_bucket,
            ResourceKind::ExternalApi => self.config.external_api_bucket,
            ResourceKind::Disk => BucketCalibration {
                rate: 0.0,
                capacity: self.config.default_disk_quota_bytes as f64,
            },
        }
    }

    fn bucket_for<'a>(
        &self,
        entry: &'a mut LedgerEntry,
        resource: ResourceKind,
        now: chrono::DateTime<Utc>,
    ) -> &'a mut TokenBucketState {
        let calibration = self.calibration_for(resource);
        entry
            .buckets
            .entry(resource)
            .or_insert_with(|| TokenBucketState::new(calibration.rate, calibration.capacity, now))
    }

    fn debit(&self, pid: ArtifactId, resource: ResourceKind, amount: f64) -> KernelResult<f64> {
        let now = Utc::now();
        let mut entries = self.entries.write().expect("ledger lock poisoned");
        let entry = entries.entry(pid).or_insert_with(|| LedgerEntry::new(pid));
        let bucket = self.bucket_for(entry, resource, now);
        bucket.try_spend(amount, now, resource.debt_allowed()).map_err(|balance| {
            LedgerError::InsufficientFunds {
                principal: pid,
                resource: resource.to_string(),
                balance: balance as i64,
                requested: amount as i64,
            }
            .into()
        })
    }
}

impl Ledger for InMemoryLedger {
    fn scrip_balance(&self, pid: ArtifactId) -> u64 {
        self.entries.read().expect("ledger lock poisoned").get(&pid).map(|e| e.scrip).unwrap_or(0)
    }

    fn resource_balance(&self, pid: ArtifactId, resource: ResourceKind) -> f64 {
        let now = Utc::now();
        let mut entries = self.entries.write().expect("ledger lock poisoned");
        let entry = entries.entry(pid).or_insert_with(|| LedgerEntry::new(pid));
        self.bucket_for(entry, resource, now).refill(now)
    }

    fn external_api_system_balance(&self) -> f64 {
        let now = Utc::now();
        self.external_api_system.write().expect("ledger lock poisoned").refill(now)
    }

    fn register_principal(&self, pid: ArtifactId) {
        self.entries
            .write()
            .expect("ledger lock poisoned")
            .entry(pid)
            .or_insert_with(|| LedgerEntry::new(pid));
    }

    fn transfer(&self, from: ArtifactId, to: ArtifactId, amount: u64) -> KernelResult<()> {
        let mut entries = self.entries.write().expect("ledger lock poisoned");
        if !entries.contains_key(&from) {
            return Err(LedgerError::UnknownPrincipal(from).into());
        }
        if !entries.contains_key(&to) {
            return Err(LedgerError::UnknownPrincipal(to).into());
        }
        let from_balance = entries[&from].scrip;
        if from_balance < amount {
            return Err(LedgerError::InsufficientScrip {
                principal: from,
                balance: from_balance,
                requested: amount,
            }
            .into());
        }
        entries.get_mut(&from).unwrap().scrip -= amount;
        entries.get_mut(&to).unwrap().scrip += amount;
        drop(entries);

        let (kind, pid, payload) = EventBuilder::new(kernel_core::EventKind::Transfer, from)
            .field("to", to.to_string())
            .field("amount", amount)
            .build();
        self.events.append(kind, pid, payload);
        Ok(())
    }

    fn spend(&self, pid: ArtifactId, resource: ResourceKind, amount: f64) -> KernelResult<f64> {
        if resource != ResourceKind::ExternalApi {
            return self.debit(pid, resource, amount);
        }

        // Dual-gate: both the per-principal and system-wide buckets must
        // admit the spend before either is debited.
        let now = Utc::now();
        {
            let entries = self.entries.read().expect("ledger lock poisoned");
            let principal_available = entries.get(&pid).and_then(|e| e.buckets.get(&resource)).map(|b| b.peek(now));
            let principal_available = principal_available.unwrap_or_else(|| self.calibration_for(resource).capacity);
            if principal_available - amount < 0.0 {
                return Err(LedgerError::InsufficientFunds {
                    principal: pid,
                    resource: resource.to_string(),
                    balance: principal_available as i64,
                    requested: amount as i64,
                }
                .into());
            }
            let system_available = self.external_api_system.read().expect("ledger lock poisoned").peek(now);
            if system_available - amount < 0.0 {
                return Err(LedgerError::SystemBucketExhausted {
                    resource: resource.to_string(),
                }
                .into());
            }
        }

        let principal_balance = self.debit(pid, resource, amount)?;
        self.external_api_system
            .write()
            .expect("ledger lock poisoned")
            .try_spend(amount, now, false)
            .map_err(|_| LedgerError::SystemBucketExhausted {
                resource: resource.to_string(),
            })?;
        Ok(principal_balance)
    }

    fn adjust_resource(&self, pid: ArtifactId, resource: ResourceKind, delta: f64) -> KernelResult<f64> {
        self.debit(pid, resource, delta)
    }

    fn mint(&self, pid: ArtifactId, amount: u64, reason: &str) -> KernelResult<()> {
        let mut entries = self.entries.write().expect("ledger lock poisoned");
        let entry = entries.entry(pid).or_insert_with(|| LedgerEntry::new(pid));
        entry.scrip += amount;
        drop(entries);

        let (kind, ev_pid, payload) = EventBuilder::new(kernel_core::EventKind::Mint, pid)
            .field("amount", amount)
            .field("reason", reason)
            .build();
        self.events.append(kind, ev_pid, payload);
        Ok(())
    }

    fn burn(&self, pid: ArtifactId, amount: u64, reason: &str) -> KernelResult<()> {
        let mut entries = self.entries.write().expect("ledger lock poisoned");
        let entry = entries.get_mut(&pid).ok_or(LedgerError::UnknownPrincipal(pid))?;
        if entry.scrip < amount {
            return Err(LedgerError::InsufficientScrip {
                principal: pid,
                balance: entry.scrip,
                requested: amount,
            }
            .into());
        }
        entry.scrip -= amount;
        drop(entries);

        let (kind, ev_pid, payload) = EventBuilder::new(kernel_core::EventKind::Burn, pid)
            .field("amount", amount)
            .field("reason", reason)
            .build();
        self.events.append(kind, ev_pid, payload);
        Ok(())
    }

    fn export_state(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            entries: self.entries.read().expect("ledger lock poisoned").clone(),
            external_api_system: *self.external_api_system.read().expect("ledger lock poisoned"),
        }
    }

    fn import_state(&self, snapshot: LedgerSnapshot) {
        *self.entries.write().expect("ledger lock poisoned") = snapshot.entries;
        *self.external_api_system.write().expect("ledger lock poisoned") = snapshot.external_api_system;
    }
}
