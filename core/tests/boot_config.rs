//! Boot sequencing: synthesis, overrides, readiness, one-shot modes.

#![allow(clippy::unwrap_used)]

mod common;

use std::path::{Path, PathBuf};

use meridian_core::boot::{
    BootMode, BootOutcome, BootPlan, NoopConfigExtender, NoopNetworkEngine, StoreHandle,
    StoreLauncher, WorkerBins, run,
};
use meridian_core::config::{ConfigOverrides, NodeConfig, SelfHost};
use meridian_core::pid_registry::PidRegistry;
use meridian_core::roles::Role;
use meridian_core::supervisor::Supervisor;
use meridian_core::uptime::UptimeLedger;
use pretty_assertions::assert_eq;
use serde_json::json;

/// Launcher that pretends the store came up as pid 4242.
struct StubLauncher;

impl StoreLauncher for StubLauncher {
    fn launch(&self, selfhost: &SelfHost) -> std::io::Result<StoreHandle> {
        Ok(StoreHandle {
            endpoint: format!("http://{}:{}", selfhost.host, selfhost.port),
            pid: Some(4242),
        })
    }
}

/// Launcher that always fails.
struct BrokenLauncher;

impl StoreLauncher for BrokenLauncher {
    fn launch(&self, _selfhost: &SelfHost) -> std::io::Result<StoreHandle> {
        Err(std::io::Error::other("store binary missing"))
    }
}

/// Paths for one boot under a temp data directory.
struct Env {
    data_dir: PathBuf,
    config: PathBuf,
    identity: PathBuf,
}

impl Env {
    fn new(dir: &Path) -> Self {
        Self {
            data_dir: dir.to_path_buf(),
            config: dir.join("config.json"),
            identity: dir.join("identity.json"),
        }
    }

    fn plan<'a>(
        &'a self,
        mode: BootMode,
        port: Option<u16>,
        launcher: &'a dyn StoreLauncher,
    ) -> BootPlan<'a> {
        BootPlan {
            config_path: &self.config,
            identity_path: &self.identity,
            data_dir: &self.data_dir,
            overrides: ConfigOverrides { port },
            mode,
            worker_bins: WorkerBins::default(),
            launcher,
            engine: &NoopNetworkEngine,
            extender: &NoopConfigExtender,
        }
    }

    fn registry(&self) -> PidRegistry {
        PidRegistry::init(self.data_dir.join("pids.json")).unwrap()
    }
}

#[tokio::test]
async fn setup_only_synthesizes_config_and_exits() {
    let tmp = tempfile::TempDir::new().unwrap();
    let env = Env::new(tmp.path());
    common::write_identity(tmp.path(), 1);
    let mut registry = env.registry();

    let outcome = run(&env.plan(BootMode::SetupOnly, None, &StubLauncher), &mut registry).await;
    assert_eq!(outcome, BootOutcome::Done);

    let config = NodeConfig::load(&env.config).unwrap();
    assert_eq!(config.host, "127.0.0.1:5260");
    assert_eq!(config.neighbourhood.len(), 1);
    assert!(config.autostart.core);
}

#[tokio::test]
async fn port_override_shifts_store_port_and_disables_workers() {
    let tmp = tempfile::TempDir::new().unwrap();
    let env = Env::new(tmp.path());
    common::write_identity(tmp.path(), 2);
    let mut registry = env.registry();

    let outcome =
        run(&env.plan(BootMode::SetupOnly, Some(6000), &StubLauncher), &mut registry).await;
    assert_eq!(outcome, BootOutcome::Done);

    let config = NodeConfig::load(&env.config).unwrap();
    assert!(config.host.ends_with(":6000"));
    assert_eq!(config.db.selfhost.unwrap().port, "5999");
    assert!(!config.autostart.core);
    assert!(!config.autostart.restore);
}

#[tokio::test]
async fn port_zero_is_fatal_instead_of_wrapping_the_store_port() {
    let tmp = tempfile::TempDir::new().unwrap();
    let env = Env::new(tmp.path());
    common::write_identity(tmp.path(), 11);
    let mut registry = env.registry();

    let outcome =
        run(&env.plan(BootMode::SetupOnly, Some(0), &StubLauncher), &mut registry).await;

    match outcome {
        BootOutcome::Fatal(reason) => assert!(reason.contains("store port")),
        other => panic!("expected fatal, got {other:?}"),
    }
    assert!(!env.config.exists());
}

#[tokio::test]
async fn missing_identity_is_fatal_on_first_run() {
    let tmp = tempfile::TempDir::new().unwrap();
    let env = Env::new(tmp.path());
    let mut registry = env.registry();

    let outcome = run(&env.plan(BootMode::SetupOnly, None, &StubLauncher), &mut registry).await;

    match outcome {
        BootOutcome::Fatal(reason) => assert!(reason.contains("cannot bootstrap")),
        other => panic!("expected fatal, got {other:?}"),
    }
}

#[tokio::test]
async fn scaffolding_twice_is_idempotent() {
    let tmp = tempfile::TempDir::new().unwrap();
    let env = Env::new(tmp.path());
    common::write_identity(tmp.path(), 3);
    let mut registry = env.registry();

    let first = run(&env.plan(BootMode::SetupOnly, None, &StubLauncher), &mut registry).await;
    let second = run(&env.plan(BootMode::SetupOnly, None, &StubLauncher), &mut registry).await;

    assert_eq!(first, BootOutcome::Done);
    assert_eq!(second, BootOutcome::Done);
    assert!(tmp.path().join("contracts/default/setup.json").is_file());
}

#[tokio::test]
async fn db_only_without_selfhost_is_fatal() {
    let tmp = tempfile::TempDir::new().unwrap();
    let env = Env::new(tmp.path());
    common::write_identity(tmp.path(), 4);
    common::write_json(&env.config, &common::node_config("127.0.0.1:5260"));
    let mut registry = env.registry();

    let outcome = run(&env.plan(BootMode::DbOnly, None, &StubLauncher), &mut registry).await;

    match outcome {
        BootOutcome::Fatal(reason) => assert!(reason.contains("db-only")),
        other => panic!("expected fatal, got {other:?}"),
    }
}

#[tokio::test]
async fn db_only_with_selfhost_launches_store_and_records_pid() {
    let tmp = tempfile::TempDir::new().unwrap();
    let env = Env::new(tmp.path());
    common::write_identity(tmp.path(), 5);
    let mut config = common::node_config("127.0.0.1:5260");
    config["db"] = json!({
        "selfhost": { "host": "127.0.0.1", "port": "5259", "dir": "store" },
        "autostart": true,
    });
    common::write_json(&env.config, &config);
    let mut registry = env.registry();

    let outcome = run(&env.plan(BootMode::DbOnly, None, &StubLauncher), &mut registry).await;

    assert_eq!(outcome, BootOutcome::Done);
    assert_eq!(registry.pids().get(Role::Storage), 4242);
}

#[tokio::test]
async fn store_launch_failure_is_fatal() {
    let tmp = tempfile::TempDir::new().unwrap();
    let env = Env::new(tmp.path());
    common::write_identity(tmp.path(), 6);
    let mut config = common::node_config("127.0.0.1:5260");
    config["db"] = json!({
        "selfhost": { "host": "127.0.0.1", "port": "5259", "dir": "store" },
        "autostart": true,
    });
    common::write_json(&env.config, &config);
    let mut registry = env.registry();

    let outcome = run(&env.plan(BootMode::Full, None, &BrokenLauncher), &mut registry).await;

    match outcome {
        BootOutcome::Fatal(reason) => assert!(reason.contains("launch failed")),
        other => panic!("expected fatal, got {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_sibling_store_is_fatal() {
    let tmp = tempfile::TempDir::new().unwrap();
    let env = Env::new(tmp.path());
    common::write_identity(tmp.path(), 7);
    let mut config = common::node_config("127.0.0.1:5260");
    // Expected to already be running, but nothing listens on port 1.
    config["db"] = json!({
        "selfhost": { "host": "127.0.0.1", "port": "1", "dir": "store" },
        "autostart": false,
    });
    common::write_json(&env.config, &config);
    let mut registry = env.registry();

    let outcome = run(&env.plan(BootMode::Full, None, &StubLauncher), &mut registry).await;

    match outcome {
        BootOutcome::Fatal(reason) => assert!(reason.contains("unreachable")),
        other => panic!("expected fatal, got {other:?}"),
    }
}

#[tokio::test]
async fn full_boot_without_selfhost_reaches_running() {
    let tmp = tempfile::TempDir::new().unwrap();
    let env = Env::new(tmp.path());
    common::write_identity(tmp.path(), 8);
    common::write_json(&env.config, &common::node_config("127.0.0.1:5260"));
    let mut registry = env.registry();

    let outcome = run(&env.plan(BootMode::Full, None, &StubLauncher), &mut registry).await;

    assert_eq!(outcome, BootOutcome::Running);
}

#[tokio::test]
async fn restart_increments_exactly_one_counter() {
    let tmp = tempfile::TempDir::new().unwrap();
    let env = Env::new(tmp.path());
    common::write_identity(tmp.path(), 10);

    let uptime = UptimeLedger::init(tmp.path().join("uptime.json"), None).unwrap();
    let mut supervisor = Supervisor::new(env.registry(), uptime);

    let outcome = supervisor
        .restart(true, &env.plan(BootMode::SetupOnly, None, &StubLauncher))
        .await;
    assert_eq!(outcome, BootOutcome::Done);
    assert_eq!(supervisor.uptime.stats().auto_restarts, 1);
    assert_eq!(supervisor.uptime.stats().manual_restarts, 0);

    let outcome = supervisor
        .restart(false, &env.plan(BootMode::SetupOnly, None, &StubLauncher))
        .await;
    assert_eq!(outcome, BootOutcome::Done);
    assert_eq!(supervisor.uptime.stats().auto_restarts, 1);
    assert_eq!(supervisor.uptime.stats().manual_restarts, 1);
}

#[tokio::test]
async fn worker_spawn_failure_does_not_abort_the_ledger() {
    let tmp = tempfile::TempDir::new().unwrap();
    let env = Env::new(tmp.path());
    common::write_identity(tmp.path(), 9);
    let mut config = common::node_config("127.0.0.1:5260");
    config["autostart"] = json!({ "core": true, "restore": true });
    common::write_json(&env.config, &config);
    let mut registry = env.registry();

    let mut boot_plan = env.plan(BootMode::Full, None, &StubLauncher);
    boot_plan.worker_bins = WorkerBins {
        core: "/nonexistent/meridian-core-worker".to_string(),
        restore: "/nonexistent/meridian-restore-worker".to_string(),
    };

    let outcome = run(&boot_plan, &mut registry).await;

    // Workers are best-effort; the ledger keeps running.
    assert_eq!(outcome, BootOutcome::Running);
    assert_eq!(registry.pids().get(Role::Core), 0);
    assert_eq!(registry.pids().get(Role::Restore), 0);
}
