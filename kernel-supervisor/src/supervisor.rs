//! Spawns and shepherds one cooperative task per agent-artifact.
//!
//! The supervisor is a single task owning per-agent crash counters and
//! backoff state; each agent loop is a [`tokio::task::JoinHandle`]
//! communicating back over `mpsc`/`watch` channels rather than sharing
//! mutable state directly.

use crate::policy::{AgentPolicy, ProposedAction};
use crate::state::{backoff_delay, AgentLoopState, BackoffState, SleepCondition};
use kernel_core::{ArtifactId, EventKind, KernelResult, ResourceKind, SupervisorError};
use kernel_engine::ExecutionEngine;
use kernel_events::EventLog;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    /// Consecutive failures before backoff delay starts growing.
    pub backoff_threshold: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// Total consecutive failures at which the loop is quarantined.
    pub quarantine_threshold: u32,
    /// How often the supervisor polls predicate-sleeps and compute-refill
    /// waits, so a sleeping agent never burns its own compute checking its
    /// own wake condition.
    pub poll_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            backoff_threshold: 3,
            backoff_base: Duration::from_millis(500),
            backoff_cap: Duration::from_secs(60),
            quarantine_threshold: 10,
            poll_interval: Duration::from_millis(200),
        }
    }
}

/// Signal sent to a running loop task. Shutdown itself travels over the
/// separate `watch` channel; this one only carries wake-ups the loop
/// can't derive from a simple deadline.
enum ControlSignal {
    /// An event matching the loop's current [`SleepCondition::Event`] was
    /// appended; wake early.
    EventWake,
}

struct AgentHandle {
    join: JoinHandle<()>,
    control: mpsc::Sender<ControlSignal>,
    shutdown: watch::Sender<bool>,
    state: Arc<RwLock<AgentLoopState>>,
    backoff: Arc<RwLock<BackoffState>>,
}

/// Coordinates every running agent loop plus the background event
/// dispatcher that wakes event-sleeping loops.
pub struct Supervisor {
    engine: Arc<ExecutionEngine>,
    events: Arc<dyn EventLog>,
    config: SupervisorConfig,
    handles: RwLock<HashMap<ArtifactId, AgentHandle>>,
    /// Set by the first agent loop that hits an `ErrorKind::Internal`
    /// error. `INTERNAL` is the one error kind no amount of per-agent
    /// backoff or quarantine can be a response to — the composition root
    /// polls this and aborts the whole run rather than just the one loop.
    fatal_fault: RwLock<Option<String>>,
}

impl Supervisor {
    pub fn new(engine: Arc<ExecutionEngine>, events: Arc<dyn EventLog>, config: SupervisorConfig) -> Arc<Self> {
        Arc::new(Self {
            engine,
            events,
            config,
            handles: RwLock::new(HashMap::new()),
            fatal_fault: RwLock::new(None),
        })
    }

    /// The reason the run should abort entirely, if any agent loop has hit
    /// an internal error. Once set this never clears — a fatal fault ends
    /// the run, it doesn't get retried.
    pub fn fatal_fault(&self) -> Option<String> {
        self.fatal_fault.read().expect("lock poisoned").clone()
    }

    pub fn state_of(&self, agent_id: ArtifactId) -> Option<AgentLoopState> {
        self.handles.read().expect("lock poisoned").get(&agent_id).map(|h| h.state.read().expect("lock poisoned").clone())
    }

    /// Current crash-loop backoff counter for `agent_id`, for checkpointing.
    pub fn backoff_of(&self, agent_id: ArtifactId) -> Option<BackoffState> {
        self.handles.read().expect("lock poisoned").get(&agent_id).map(|h| h.backoff.read().expect("lock poisoned").clone())
    }

    pub fn registered_agents(&self) -> Vec<ArtifactId> {
        self.handles.read().expect("lock poisoned").keys().copied().collect()
    }

    /// Spawns the loop task for one agent-artifact.
    pub fn spawn_agent(self: &Arc<Self>, agent_id: ArtifactId, policy: Arc<dyn AgentPolicy>) {
        let (control_tx, control_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = Arc::new(RwLock::new(AgentLoopState::Running));
        let backoff = Arc::new(RwLock::new(BackoffState::new()));

        let supervisor = self.clone();
        let loop_state = state.clone();
        let loop_backoff = backoff.clone();
        let join = tokio::spawn(async move {
            supervisor.run_loop(agent_id, policy, loop_state, loop_backoff, control_rx, shutdown_rx).await;
        });

        self.handles.write().expect("lock poisoned").insert(
            agent_id,
            AgentHandle { join, control: control_tx, shutdown: shutdown_tx, state, backoff },
        );
    }

    /// Signals graceful shutdown: the loop finishes its current top-level
    /// action (never mid-action) and exits at the next boundary.
    pub fn shutdown_agent(&self, agent_id: ArtifactId) -> KernelResult<()> {
        let guard = self.handles.read().expect("lock poisoned");
        let handle = guard.get(&agent_id).ok_or(SupervisorError::NotRegistered(agent_id))?;
        let _ = handle.shutdown.send(true);
        Ok(())
    }

    pub async fn shutdown_all(&self) {
        let agents: Vec<ArtifactId> = self.registered_agents();
        for agent_id in agents {
            let _ = self.shutdown_agent(agent_id);
        }
        let joins: Vec<JoinHandle<()>> = {
            let mut guard = self.handles.write().expect("lock poisoned");
            guard.drain().map(|(_, h)| h.join).collect()
        };
        for join in joins {
            let _ = join.await;
        }
    }

    /// Manually un-quarantines an agent and restarts its loop. The caller
    /// is responsible for deciding the agent is actually fixed; the
    /// supervisor never does this on its own.
    pub fn resume(self: &Arc<Self>, agent_id: ArtifactId, policy: Arc<dyn AgentPolicy>) -> KernelResult<()> {
        {
            let guard = self.handles.read().expect("lock poisoned");
            match guard.get(&agent_id) {
                Some(handle) => {
                    let state = handle.state.read().expect("lock poisoned").clone();
                    if !matches!(state, AgentLoopState::Quarantined { .. }) {
                        return Ok(());
                    }
                }
                None => return Err(SupervisorError::NotRegistered(agent_id).into()),
            }
        }
        self.handles.write().expect("lock poisoned").remove(&agent_id);
        self.spawn_agent(agent_id, policy);
        Ok(())
    }

    /// Called whenever an event is appended to the log (by whatever drives
    /// the event loop — the CLI's composition root, in a real deployment).
    /// Wakes any loop sleeping on a matching [`SleepCondition::Event`].
    pub fn notify_event(&self, kind: EventKind) {
        let guard = self.handles.read().expect("lock poisoned");
        for handle in guard.values() {
            let sleeping_on = {
                let state = handle.state.read().expect("lock poisoned");
                match &*state {
                    AgentLoopState::Sleeping(SleepCondition::Event(k)) if *k == kind => true,
                    _ => false,
                }
            };
            if sleeping_on {
                let _ = handle.control.try_send(ControlSignal::EventWake);
            }
        }
    }

    async fn run_loop(
        self: Arc<Self>,
        agent_id: ArtifactId,
        policy: Arc<dyn AgentPolicy>,
        state: Arc<RwLock<AgentLoopState>>,
        backoff_handle: Arc<RwLock<BackoffState>>,
        mut control_rx: mpsc::Receiver<ControlSignal>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut backoff = BackoffState::new();

        loop {
            if *shutdown_rx.borrow() {
                *state.write().expect("lock poisoned") = AgentLoopState::ShuttingDown;
                return;
            }

            if let Err(wait_err) = self.await_runnable(&agent_id, &policy, &state, &mut control_rx, &mut shutdown_rx).await {
                tracing::warn!(agent = %agent_id, error = %wait_err, "agent loop exiting while waiting to run");
                return;
            }
            if *shutdown_rx.borrow() {
                *state.write().expect("lock poisoned") = AgentLoopState::ShuttingDown;
                return;
            }

            if self.engine.resource_balance(agent_id, ResourceKind::Compute) < 0.0 {
                *state.write().expect("lock poisoned") = AgentLoopState::AwaitingComputeRefill;
                if let Err(wait_err) = self.await_runnable(&agent_id, &policy, &state, &mut control_rx, &mut shutdown_rx).await {
                    tracing::warn!(agent = %agent_id, error = %wait_err, "agent loop exiting while waiting for compute refill");
                    return;
                }
                if *shutdown_rx.borrow() {
                    *state.write().expect("lock poisoned") = AgentLoopState::ShuttingDown;
                    return;
                }
            }

            *state.write().expect("lock poisoned") = AgentLoopState::Running;

            let outcome = self.run_iteration(agent_id, policy.as_ref()).await;

            match outcome {
                Ok(Some(sleep)) => {
                    backoff.record_success();
                    *backoff_handle.write().expect("lock poisoned") = backoff.clone();
                    *state.write().expect("lock poisoned") = AgentLoopState::Sleeping(sleep);
                }
                Ok(None) => {
                    backoff.record_success();
                    *backoff_handle.write().expect("lock poisoned") = backoff.clone();
                }
                Err(err) if err.is_fatal() => {
                    let reason = err.to_string();
                    tracing::error!(agent = %agent_id, %reason, "internal error, aborting the run");
                    *self.fatal_fault.write().expect("lock poisoned") = Some(reason.clone());
                    *state.write().expect("lock poisoned") = AgentLoopState::ShuttingDown;
                    return;
                }
                Err(err) => {
                    let reason = err.to_string();
                    backoff.record_failure();
                    *backoff_handle.write().expect("lock poisoned") = backoff.clone();
                    tracing::warn!(agent = %agent_id, %reason, failures = backoff.consecutive_failures, "agent iteration failed");
                    if backoff.consecutive_failures >= self.config.quarantine_threshold {
                        *state.write().expect("lock poisoned") = AgentLoopState::Quarantined {
                            consecutive_failures: backoff.consecutive_failures,
                            reason: reason.clone(),
                        };
                        self.events.append(
                            EventKind::AgentQuarantined,
                            agent_id,
                            serde_json::json!({ "consecutive_failures": backoff.consecutive_failures, "reason": reason }),
                        );
                        return;
                    }
                    let delay = backoff_delay(backoff.consecutive_failures, self.config.backoff_threshold, self.config.backoff_base, self.config.backoff_cap);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    /// Blocks until the loop's current wake condition is satisfied (or
    /// shutdown is requested). Returns `Err` only if the loop should give
    /// up entirely, which never currently happens — kept as a `Result` so
    /// a future wake source that can genuinely fail doesn't need a
    /// signature change.
    async fn await_runnable(
        &self,
        agent_id: &ArtifactId,
        policy: &Arc<dyn AgentPolicy>,
        state: &Arc<RwLock<AgentLoopState>>,
        control_rx: &mut mpsc::Receiver<ControlSignal>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<(), String> {
        let current = state.read().expect("lock poisoned").clone();
        match current {
            AgentLoopState::Sleeping(SleepCondition::Deadline(deadline)) => {
                let now = chrono::Utc::now();
                let remaining = (deadline - now).to_std().unwrap_or(Duration::ZERO);
                tokio::select! {
                    _ = tokio::time::sleep(remaining) => {}
                    _ = shutdown_rx.changed() => {}
                    _ = control_rx.recv() => {}
                }
                Ok(())
            }
            AgentLoopState::Sleeping(SleepCondition::Event(_)) => {
                tokio::select! {
                    _ = control_rx.recv() => {}
                    _ = shutdown_rx.changed() => {}
                }
                Ok(())
            }
            AgentLoopState::Sleeping(SleepCondition::Predicate) => {
                loop {
                    if *shutdown_rx.borrow() {
                        return Ok(());
                    }
                    if policy.predicate_satisfied(&self.engine, *agent_id).await {
                        return Ok(());
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown_rx.changed() => { return Ok(()); }
                    }
                }
            }
            AgentLoopState::AwaitingComputeRefill => {
                loop {
                    if *shutdown_rx.borrow() {
                        return Ok(());
                    }
                    if self.engine.resource_balance(*agent_id, ResourceKind::Compute) >= 0.0 {
                        return Ok(());
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = shutdown_rx.changed() => { return Ok(()); }
                    }
                }
            }
            _ => Ok(()),
        }
    }

    /// `observe -> think -> submit -> handle result`, one pass. Returns
    /// `Ok(Some(sleep))` if the policy proposed going back to sleep
    /// instead of acting, `Ok(None)` for a completed action, `Err` for a
    /// failed iteration. `Err` counts against crash-loop backoff unless
    /// `KernelError::is_fatal`, which aborts the whole run instead.
    async fn run_iteration(&self, agent_id: ArtifactId, policy: &dyn AgentPolicy) -> KernelResult<Option<SleepCondition>> {
        let observation = policy.observe(&self.engine, agent_id).await?;
        let action = policy.think(&self.engine, agent_id, observation).await?;

        if let ProposedAction::Sleep(condition) = action {
            return Ok(Some(condition));
        }

        let result = self.submit(agent_id, &action).await;
        policy.on_result(&self.engine, agent_id, &action, &result).await;
        result.map(|_| None)
    }

    async fn submit(&self, agent_id: ArtifactId, action: &ProposedAction) -> KernelResult<serde_json::Value> {
        match action {
            ProposedAction::Read { target } => self.engine.read(agent_id, *target),
            ProposedAction::Write { target, content } => self.engine.write(agent_id, *target, content.clone()).map(|_| serde_json::json!(null)),
            ProposedAction::Edit { target, patch } => self.engine.edit(agent_id, *target, patch.clone()).map(|_| serde_json::json!(null)),
            ProposedAction::Delete { target, reason } => self.engine.delete(agent_id, *target, reason).map(|_| serde_json::json!(null)),
            ProposedAction::Invoke { target, method, args } => self.engine.invoke(agent_id, *target, method, args.clone()).await,
            ProposedAction::Sleep(_) => unreachable!("handled by run_iteration before submit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kernel_core::{ArtifactSpec, KernelConfig};
    use kernel_events::InMemoryEventLog;
    use kernel_ledger::InMemoryLedger;
    use kernel_store::{ArtifactStore, InMemoryArtifactStore};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::timeout;

    /// Reads its own artifact `iterations` times, then proposes a short
    /// deadline sleep forever after, so the test can assert progress and
    /// then shut the loop down cleanly.
    struct CountingPolicy {
        target: ArtifactId,
        seen: Arc<AtomicU32>,
        fail_until: u32,
    }

    #[async_trait]
    impl AgentPolicy for CountingPolicy {
        async fn observe(&self, _engine: &Arc<ExecutionEngine>, _agent_id: ArtifactId) -> KernelResult<serde_json::Value> {
            Ok(serde_json::json!({}))
        }

        async fn think(&self, _engine: &Arc<ExecutionEngine>, _agent_id: ArtifactId, _observation: serde_json::Value) -> KernelResult<ProposedAction> {
            let n = self.seen.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_until {
                return Ok(ProposedAction::Read { target: ArtifactId::now_v7() });
            }
            Ok(ProposedAction::Read { target: self.target })
        }

        async fn on_result(&self, _engine: &Arc<ExecutionEngine>, _agent_id: ArtifactId, _action: &ProposedAction, _result: &KernelResult<serde_json::Value>) {}
    }

    fn harness() -> (Arc<ExecutionEngine>, Arc<dyn EventLog>, ArtifactId, ArtifactId) {
        let log: Arc<dyn EventLog> = Arc::new(InMemoryEventLog::new());
        let ledger: Arc<dyn kernel_ledger::Ledger> = Arc::new(InMemoryLedger::new(log.clone(), KernelConfig::for_tests()));
        let concrete = Arc::new(InMemoryArtifactStore::new(
            Arc::new(kernel_core::AlwaysAllow),
            ledger.clone(),
            log.clone(),
            KernelConfig::for_tests(),
        ));
        let store: Arc<dyn ArtifactStore> = concrete.clone();
        concrete.set_default_contract(ArtifactId::nil());

        let agent_id = store
            .create(
                ArtifactId::nil(),
                ArtifactSpec {
                    content: serde_json::json!({}),
                    code: None,
                    interface: None,
                    access_contract_id: None,
                    has_standing: true,
                    has_executable: true,
                    owner_id: ArtifactId::nil(),
                },
            )
            .unwrap();
        ledger.register_principal(agent_id);

        let target = store
            .create(
                ArtifactId::nil(),
                ArtifactSpec {
                    content: serde_json::json!({"note": "hello"}),
                    code: None,
                    interface: None,
                    access_contract_id: None,
                    has_standing: false,
                    has_executable: false,
                    owner_id: ArtifactId::nil(),
                },
            )
            .unwrap();

        let engine = Arc::new(ExecutionEngine::new(
            store,
            ledger,
            log.clone(),
            Arc::new(kernel_core::AlwaysAllow),
            KernelConfig::for_tests(),
        ));
        (engine, log, agent_id, target)
    }

    #[tokio::test]
    async fn spawned_loop_runs_iterations_and_shuts_down_gracefully() {
        let (engine, log, agent_id, target) = harness();
        let supervisor = Supervisor::new(engine, log, SupervisorConfig::default());
        let seen = Arc::new(AtomicU32::new(0));
        let policy = Arc::new(CountingPolicy { target, seen: seen.clone(), fail_until: 0 });

        supervisor.spawn_agent(agent_id, policy);

        timeout(Duration::from_secs(2), async {
            while seen.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("loop made progress within the timeout");

        supervisor.shutdown_all().await;
        assert!(supervisor.registered_agents().is_empty());
    }

    #[tokio::test]
    async fn repeated_failures_past_threshold_quarantine_the_agent() {
        let (engine, log, agent_id, _target) = harness();
        let mut config = SupervisorConfig::default();
        config.backoff_base = Duration::from_millis(1);
        config.backoff_cap = Duration::from_millis(5);
        config.quarantine_threshold = 3;
        let supervisor = Supervisor::new(engine, log, config);
        let seen = Arc::new(AtomicU32::new(0));
        // Every proposed read targets a nonexistent artifact, so every
        // iteration fails.
        let policy = Arc::new(CountingPolicy { target: ArtifactId::nil(), seen: seen.clone(), fail_until: u32::MAX });

        supervisor.spawn_agent(agent_id, policy);

        timeout(Duration::from_secs(2), async {
            loop {
                if let Some(AgentLoopState::Quarantined { .. }) = supervisor.state_of(agent_id) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("agent quarantines within the timeout");
    }

    struct FatalPolicy;

    #[async_trait]
    impl AgentPolicy for FatalPolicy {
        async fn observe(&self, _engine: &Arc<ExecutionEngine>, _agent_id: ArtifactId) -> KernelResult<serde_json::Value> {
            Ok(serde_json::json!({}))
        }

        async fn think(&self, _engine: &Arc<ExecutionEngine>, _agent_id: ArtifactId, _observation: serde_json::Value) -> KernelResult<ProposedAction> {
            Err(kernel_core::EngineError::Internal("simulated fault".into()).into())
        }

        async fn on_result(&self, _engine: &Arc<ExecutionEngine>, _agent_id: ArtifactId, _action: &ProposedAction, _result: &KernelResult<serde_json::Value>) {}
    }

    #[tokio::test]
    async fn an_internal_error_aborts_the_loop_without_quarantine_and_records_a_fatal_fault() {
        let (engine, log, agent_id, _target) = harness();
        let supervisor = Supervisor::new(engine, log, SupervisorConfig::default());
        supervisor.spawn_agent(agent_id, Arc::new(FatalPolicy));

        timeout(Duration::from_secs(2), async {
            while supervisor.fatal_fault().is_none() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("fatal fault recorded within the timeout");

        assert!(matches!(supervisor.state_of(agent_id), Some(AgentLoopState::ShuttingDown)));
        assert_eq!(supervisor.backoff_of(agent_id), Some(BackoffState::new()));
    }
}
