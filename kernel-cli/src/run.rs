//! The `run` and `inspect` subcommand bodies, split out from `main.rs` so
//! integration tests can drive a full run without going through a
//! subprocess.

use crate::config::CliConfig;
use crate::policy::HeartbeatPolicy;
use crate::wiring::{self, Kernel};
use kernel_core::{ArtifactKind, CheckpointError, EventKind, EventSeq};
use kernel_events::EventLog;
use kernel_store::{ArtifactFilter, ArtifactStore};
use kernel_supervisor::Supervisor;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const CHECKPOINT_INTERVAL: Duration = Duration::from_secs(30);

pub fn inspect(path: &Path) -> i32 {
    match kernel_checkpoint::inspect(path) {
        Ok(summary) => {
            println!("{summary}");
            0
        }
        Err(err) => {
            eprintln!("failed to inspect checkpoint: {err}");
            exit_code_for_checkpoint_error(&err)
        }
    }
}

/// Boots the kernel, resumes from checkpoint if one exists, spawns one
/// supervised loop per pre-existing agent artifact, and runs until
/// ctrl-c, checkpointing on `CHECKPOINT_INTERVAL` and again at shutdown.
pub async fn run(config_path: &Path) -> i32 {
    let cli_config = match CliConfig::load(config_path) {
        Ok(c) => c,
        Err(err) => {
            eprintln!("config error: {err}");
            return 1;
        }
    };
    let oracle = match cli_config.oracle_principal() {
        Ok(o) => o,
        Err(err) => {
            eprintln!("config error: {err}");
            return 1;
        }
    };
    let kernel_config = match cli_config.kernel_config() {
        Ok(c) => c,
        Err(err) => {
            eprintln!("config error: {err}");
            return 1;
        }
    };

    let mut kernel = match wiring::build(&kernel_config, oracle) {
        Ok(k) => k,
        Err(err) => {
            eprintln!("failed to build the kernel: {err}");
            return 3;
        }
    };

    let resumed = match kernel_checkpoint::resume(&cli_config.run_dir, kernel.store.as_ref(), kernel.ledger.as_ref(), &kernel_config) {
        Ok(r) => r,
        Err(err) => {
            eprintln!("failed to resume from checkpoint: {err}");
            return exit_code_for_checkpoint_error(&err);
        }
    };
    if let Some(resumed) = resumed {
        tracing::info!(cursor = resumed.checkpoint.event_log_cursor.0, "resumed from checkpoint");
        kernel.events = Arc::new(resumed.events);
    }

    let supervisor_config = cli_config.supervisor_config();
    let supervisor = Supervisor::new(kernel.engine.clone(), kernel.events.clone() as Arc<dyn EventLog>, supervisor_config);

    let agents = kernel.store.list_by(ArtifactFilter { kind: Some(ArtifactKind::Agent), ..Default::default() });
    for agent in &agents {
        let policy = Arc::new(HeartbeatPolicy { handbook_id: kernel.genesis.handbook, sleep_for: Duration::from_secs(5) });
        supervisor.spawn_agent(agent.id, policy);
        tracing::info!(agent = %agent.id, "spawned agent loop");
    }

    let dispatcher_events = kernel.events.clone();
    let dispatcher_supervisor = supervisor.clone();
    let poll_interval = supervisor_config.poll_interval;
    let dispatcher = tokio::spawn(async move {
        dispatch_events(dispatcher_events, dispatcher_supervisor, poll_interval).await;
    });

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(CHECKPOINT_INTERVAL);
    ticker.tick().await;
    let mut fault_poll = tokio::time::interval(poll_interval);

    let mut fatal: Option<String> = None;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("shutdown requested, draining agent loops");
                break;
            }
            _ = ticker.tick() => {
                checkpoint(&cli_config, &kernel, &supervisor);
            }
            _ = fault_poll.tick() => {
                if let Some(reason) = supervisor.fatal_fault() {
                    tracing::error!(%reason, "internal error reported by an agent loop, aborting the run");
                    fatal = Some(reason);
                    break;
                }
            }
        }
    }

    supervisor.shutdown_all().await;
    dispatcher.abort();
    checkpoint(&cli_config, &kernel, &supervisor);
    if fatal.is_some() { 3 } else { 0 }
}

/// Wakes any loop sleeping on `SleepCondition::Event` as soon as a matching
/// event lands in the log. The log itself has no push interface, so this
/// polls — cheaply, since `notify_event` is a no-op for loops not waiting
/// on that exact kind.
async fn dispatch_events(events: Arc<dyn EventLog>, supervisor: Arc<Supervisor>, poll_interval: Duration) {
    let mut cursor = EventSeq::first();
    loop {
        let batch = events.read_range(cursor, events.next_seq(), usize::MAX);
        for event in &batch {
            supervisor.notify_event(event.kind);
            cursor = event.seq.next();
        }
        tokio::time::sleep(poll_interval).await;
    }
}

fn checkpoint(cli_config: &CliConfig, kernel: &Kernel, supervisor: &Arc<Supervisor>) {
    let mut agents = HashMap::new();
    for agent_id in supervisor.registered_agents() {
        if let (Some(state), Some(backoff)) = (supervisor.state_of(agent_id), supervisor.backoff_of(agent_id)) {
            agents.insert(agent_id, kernel_checkpoint::AgentSnapshot { state, backoff });
        }
    }
    match kernel_checkpoint::checkpoint_now(&cli_config.run_dir, kernel.store.as_ref(), kernel.ledger.as_ref(), kernel.events.as_ref(), agents) {
        Ok(path) => tracing::info!(path = %path.display(), "checkpoint written"),
        Err(err) => tracing::error!(%err, "checkpoint write failed"),
    }
    kernel.events.append(EventKind::Checkpoint, kernel.genesis.store, serde_json::json!({}));
}

fn exit_code_for_checkpoint_error(_err: &CheckpointError) -> i32 {
    2
}
