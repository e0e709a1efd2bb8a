//! Boot sequencer: fresh checkout to fully running, in strict order.
//!
//! Every step either continues, finishes the command, or fails the whole
//! boot; the decision is returned as a [`BootOutcome`] and interpreted
//! exactly once at the binary's top level. No step calls `exit` itself.
//!
//! Ordering is load-bearing: the configuration must exist before it is
//! loaded, the data store must be reachable before the ledger continues,
//! and the network-maintenance engine must be initialized before any
//! auxiliary worker is spawned (the workers assume the ledger endpoint is
//! already serving).

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::{ConfigOverrides, NodeConfig, SelfHost};
use crate::identity::NodeIdentity;
use crate::pid_registry::PidRegistry;
use crate::roles::Role;
use crate::scaffold;

/// How long the readiness probe waits for the externally-run store.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long after a spawn the early-exit watchdog looks again.
const SPAWN_WATCH_DELAY: Duration = Duration::from_millis(500);

/// What a finished boot step decided.
#[derive(Debug, PartialEq, Eq)]
pub enum BootOutcome {
    /// The node is up; the caller keeps the process alive.
    Running,
    /// A one-shot mode completed successfully; exit zero.
    Done,
    /// Terminate with a nonzero code after printing the reason.
    Fatal(String),
}

/// Which variant of the boot sequence was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootMode {
    /// Normal boot through every step.
    Full,
    /// Stop after filesystem scaffolding.
    SetupOnly,
    /// Bring up only the self-hosted data store.
    DbOnly,
}

/// A started (or sibling) data store.
pub struct StoreHandle {
    /// Endpoint URL the ledger reaches the store at.
    pub endpoint: String,
    /// Pid when the launcher started a separate OS process.
    pub pid: Option<u32>,
}

/// Launches the embedded data store.
pub trait StoreLauncher {
    fn launch(&self, selfhost: &SelfHost) -> std::io::Result<StoreHandle>;
}

/// Peer gossip/maintenance engine. Fire-and-forget from this crate's
/// perspective: once initialized it runs on its own.
pub trait NetworkEngine {
    fn init(&self, host: &str) -> Result<(), String>;
}

/// Deferred/remote configuration extension applied late in the boot.
pub trait ConfigExtender {
    fn extend(&self, config: &mut NodeConfig) -> Result<(), String>;
}

/// Store launcher that forks the store binary as a managed process.
pub struct ProcessStoreLauncher {
    pub program: String,
}

impl Default for ProcessStoreLauncher {
    fn default() -> Self {
        Self {
            program: "meridian-store".to_string(),
        }
    }
}

impl StoreLauncher for ProcessStoreLauncher {
    fn launch(&self, selfhost: &SelfHost) -> std::io::Result<StoreHandle> {
        let child = std::process::Command::new(&self.program)
            .args(["--port", &selfhost.port, "--dir", &selfhost.dir])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        Ok(StoreHandle {
            endpoint: format!("http://{}:{}", selfhost.host, selfhost.port),
            pid: Some(child.id()),
        })
    }
}

/// Stand-in engine for deployments where maintenance runs in-process.
pub struct NoopNetworkEngine;

impl NetworkEngine for NoopNetworkEngine {
    fn init(&self, host: &str) -> Result<(), String> {
        info!(host, "network maintenance engine initialized");
        Ok(())
    }
}

/// Extender used when no remote configuration source is wired up.
pub struct NoopConfigExtender;

impl ConfigExtender for NoopConfigExtender {
    fn extend(&self, _config: &mut NodeConfig) -> Result<(), String> {
        Ok(())
    }
}

/// Auxiliary worker binaries, overridable for tests and packaging.
#[derive(Debug, Clone)]
pub struct WorkerBins {
    pub core: String,
    pub restore: String,
}

impl Default for WorkerBins {
    fn default() -> Self {
        Self {
            core: "meridian-core-worker".to_string(),
            restore: "meridian-restore-worker".to_string(),
        }
    }
}

/// Everything one boot invocation needs, resolved up front.
pub struct BootPlan<'a> {
    pub config_path: &'a Path,
    pub identity_path: &'a Path,
    pub data_dir: &'a Path,
    pub overrides: ConfigOverrides,
    pub mode: BootMode,
    pub worker_bins: WorkerBins,
    pub launcher: &'a dyn StoreLauncher,
    pub engine: &'a dyn NetworkEngine,
    pub extender: &'a dyn ConfigExtender,
}

/// Run the boot sequence. Steps execute strictly in order; the first
/// fatal condition short-circuits with `BootOutcome::Fatal`.
pub async fn run(plan: &BootPlan<'_>, registry: &mut PidRegistry) -> BootOutcome {
    // Step 1: make sure a configuration exists.
    if !plan.config_path.exists() {
        let identity = match NodeIdentity::load(plan.identity_path) {
            Ok(identity) => identity,
            Err(e) => return BootOutcome::Fatal(format!("cannot bootstrap configuration: {e}")),
        };
        let config = match NodeConfig::synthesize(&plan.overrides, &identity, plan.data_dir) {
            Ok(config) => config,
            Err(e) => return BootOutcome::Fatal(e.to_string()),
        };
        if let Err(e) = config.save(plan.config_path) {
            return BootOutcome::Fatal(format!("cannot write synthesized config: {e}"));
        }
        info!(path = %plan.config_path.display(), "synthesized first-run configuration");
    }

    // Step 2: resolve the typed snapshot every later step reads.
    let mut config = match NodeConfig::load(plan.config_path) {
        Ok(config) => config,
        Err(e) => return BootOutcome::Fatal(e.to_string()),
    };

    // Step 3: contract directories, default contracts, shared-lib link.
    if let Err(e) = scaffold::ensure_scaffolding(plan.data_dir) {
        return BootOutcome::Fatal(format!("filesystem scaffolding failed: {e}"));
    }

    // Step 4: setup-only stops here, successfully.
    if plan.mode == BootMode::SetupOnly {
        info!("setup complete, not starting any process");
        return BootOutcome::Done;
    }

    // Step 5: the data store must be reachable before anything else runs.
    match &config.db.selfhost {
        Some(selfhost) => {
            if config.db.autostart {
                match plan.launcher.launch(selfhost) {
                    Ok(handle) => {
                        info!(endpoint = %handle.endpoint, "data store launched");
                        if let Some(pid) = handle.pid
                            && let Err(e) = registry.add_pid(Role::Storage, pid)
                        {
                            warn!("could not record store pid: {e}");
                        }
                    }
                    Err(e) => {
                        return BootOutcome::Fatal(format!("data store launch failed: {e}"));
                    }
                }
            } else {
                let endpoint = format!("http://{}:{}", selfhost.host, selfhost.port);
                if let Err(e) = probe_store(&endpoint).await {
                    return BootOutcome::Fatal(format!(
                        "data store at {endpoint} is unreachable: {e}"
                    ));
                }
                info!(%endpoint, "data store reachable");
            }
        }
        None => {
            if plan.mode == BootMode::DbOnly {
                return BootOutcome::Fatal(
                    "db-only requested but no self-hosted store is configured".to_string(),
                );
            }
        }
    }

    if plan.mode == BootMode::DbOnly {
        info!("db-only boot complete");
        return BootOutcome::Done;
    }

    // Step 6: deferred configuration extension, then persist the result.
    if let Err(e) = plan.extender.extend(&mut config) {
        return BootOutcome::Fatal(format!("configuration extension failed: {e}"));
    }
    if let Err(e) = config.save(plan.config_path) {
        return BootOutcome::Fatal(format!("cannot persist extended config: {e}"));
    }

    // Step 7: maintenance engine first, workers only afterwards.
    if let Err(e) = plan.engine.init(&config.host) {
        return BootOutcome::Fatal(format!("network maintenance init failed: {e}"));
    }

    if config.autostart.core {
        spawn_worker(Role::Core, &plan.worker_bins.core, &config, registry);
    }
    if config.autostart.restore {
        spawn_worker(Role::Restore, &plan.worker_bins.restore, &config, registry);
    }

    BootOutcome::Running
}

/// Probe an externally-running store. Any transport failure, refusal or
/// timeout alike, means unreachable.
async fn probe_store(endpoint: &str) -> Result<(), reqwest::Error> {
    let client = reqwest::Client::builder().timeout(PROBE_TIMEOUT).build()?;
    client.get(endpoint).send().await?;
    Ok(())
}

/// Spawn one auxiliary worker. Workers are best-effort: a failure is
/// logged and the already-running ledger keeps going.
fn spawn_worker(role: Role, program: &str, config: &NodeConfig, registry: &mut PidRegistry) {
    let spawned = std::process::Command::new(program)
        .args(["--port", &config.port])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();

    match spawned {
        Ok(mut child) => {
            let pid = child.id();
            info!(%role, pid, "worker spawned");
            if let Err(e) = registry.add_pid(role, pid) {
                warn!(%role, "could not record worker pid: {e}");
            }
            // Early-exit watchdog: a worker that dies right after spawn
            // would otherwise fail silently.
            tokio::spawn(async move {
                tokio::time::sleep(SPAWN_WATCH_DELAY).await;
                match child.try_wait() {
                    Ok(Some(status)) => {
                        error!(%role, pid, %status, "worker exited immediately after spawn");
                    }
                    Ok(None) => {}
                    Err(e) => warn!(%role, pid, "cannot check worker state: {e}"),
                }
            });
        }
        Err(e) => {
            error!(%role, program, "worker spawn failed: {e}");
        }
    }
}
