//! `meridian` entry point.
//!
//! One top-level operation per invocation: the node lifecycle commands
//! (`start`, `stop`, `restart`), the one-shot network assertion, and the
//! offline utilities (`merge`, `sign`, `public`). Fatal conditions are
//! carried out of the library as values and turned into a tagged
//! `fatal:` line plus exit code 1 exactly once, here.

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use meridian_core::boot::{
    BootMode, BootOutcome, BootPlan, NoopConfigExtender, NoopNetworkEngine, ProcessStoreLauncher,
    WorkerBins,
};
use meridian_core::config::ConfigOverrides;
use meridian_core::identity::{NodeIdentity, Signer as _};
use meridian_core::pid_registry::PidRegistry;
use meridian_core::supervisor::Supervisor;
use meridian_core::uptime::UptimeLedger;
use meridian_core::{assertion, boot, merge};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "meridian", version, about = "Meridian ledger node supervisor")]
struct Cli {
    /// Node configuration file (default: <data-dir>/config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Identity key-pair file (default: <data-dir>/identity.json).
    #[arg(long, global = true)]
    identity: Option<PathBuf>,

    /// Data directory for registry, counters, store and contracts.
    #[arg(long = "data-dir", global = true)]
    data_dir: Option<PathBuf>,

    /// Advertised port; non-default values disable worker auto-start.
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Verbose logging.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Boot the node and run until interrupted.
    Start,
    /// Terminate every recorded process and clear the pid registry.
    Stop,
    /// Stop, then start, counting the restart.
    Restart {
        /// Mark this restart as watchdog-initiated.
        #[arg(long)]
        auto: bool,
    },
    /// Assert the network: submit the one-shot signed join transaction.
    #[command(alias = "assert-network")]
    Assert {
        /// Optional lock token written into the setup payload.
        lock: Option<String>,
    },
    /// Merge the neighbourhoods of several config files offline.
    Merge {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Sign a file with the node identity and print the signature.
    Sign { file: PathBuf },
    /// Print the node's public identity.
    Public,
    /// Run configuration bootstrap and scaffolding, then exit.
    SetupOnly,
    /// Bring up only the self-hosted data store.
    DbOnly,
}

/// Resolved file locations for one invocation.
struct Paths {
    config: PathBuf,
    identity: PathBuf,
    data_dir: PathBuf,
}

impl Paths {
    fn resolve(cli: &Cli) -> Self {
        let data_dir = cli
            .data_dir
            .clone()
            .unwrap_or_else(meridian_core::default_data_dir);
        Self {
            config: cli.config.clone().unwrap_or_else(|| data_dir.join("config.json")),
            identity: cli
                .identity
                .clone()
                .unwrap_or_else(|| data_dir.join("identity.json")),
            data_dir,
        }
    }
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(e) = run(cli).await {
        eprintln!("fatal: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let paths = Paths::resolve(&cli);
    let overrides = ConfigOverrides { port: cli.port };

    let launcher = ProcessStoreLauncher::default();
    let engine = NoopNetworkEngine;
    let extender = NoopConfigExtender;
    let plan = |mode: BootMode| BootPlan {
        config_path: &paths.config,
        identity_path: &paths.identity,
        data_dir: &paths.data_dir,
        overrides,
        mode,
        worker_bins: WorkerBins::default(),
        launcher: &launcher,
        engine: &engine,
        extender: &extender,
    };

    match cli.command {
        Command::Start => {
            let mut supervisor = supervisor_at(&paths)?;
            let outcome = supervisor.start(&plan(BootMode::Full)).await;
            serve(outcome, supervisor).await
        }
        Command::Stop => {
            let mut supervisor = supervisor_at(&paths)?;
            supervisor.stop(false);
            Ok(())
        }
        Command::Restart { auto } => {
            let mut supervisor = supervisor_at(&paths)?;
            let outcome = supervisor.restart(auto, &plan(BootMode::Full)).await;
            serve(outcome, supervisor).await
        }
        Command::Assert { lock } => {
            let streams =
                assertion::assert_network(&paths.config, &paths.identity, lock.as_deref()).await?;
            for stream in streams {
                println!("{stream}");
            }
            Ok(())
        }
        Command::Merge { files } => {
            merge::merge_neighbourhoods(&files)?;
            Ok(())
        }
        Command::Sign { file } => {
            let payload = std::fs::read(&file)
                .with_context(|| format!("cannot read {}", file.display()))?;
            let identity = NodeIdentity::load(&paths.identity)?;
            println!("{}", identity.sign(&payload));
            Ok(())
        }
        Command::Public => {
            let identity = NodeIdentity::load(&paths.identity)?;
            println!("{}", identity.public());
            Ok(())
        }
        Command::SetupOnly => {
            let mut registry = PidRegistry::init(paths.data_dir.join("pids.json"))?;
            interpret(boot::run(&plan(BootMode::SetupOnly), &mut registry).await)
        }
        Command::DbOnly => {
            let mut registry = PidRegistry::init(paths.data_dir.join("pids.json"))?;
            interpret(boot::run(&plan(BootMode::DbOnly), &mut registry).await)
        }
    }
}

fn supervisor_at(paths: &Paths) -> anyhow::Result<Supervisor> {
    let registry = PidRegistry::init(paths.data_dir.join("pids.json"))?;
    let uptime = UptimeLedger::init(
        paths.data_dir.join("uptime.json"),
        Some(env!("CARGO_PKG_VERSION")),
    )?;
    Ok(Supervisor::new(registry, uptime))
}

/// Turn a one-shot boot outcome into a command result.
fn interpret(outcome: BootOutcome) -> anyhow::Result<()> {
    match outcome {
        BootOutcome::Running | BootOutcome::Done => Ok(()),
        BootOutcome::Fatal(reason) => bail!(reason),
    }
}

/// Keep a booted node alive until interrupted, then shut it down.
async fn serve(outcome: BootOutcome, mut supervisor: Supervisor) -> anyhow::Result<()> {
    match outcome {
        BootOutcome::Running => {
            let stats = supervisor.uptime.stats();
            info!(
                version = %stats.version,
                manual_restarts = stats.manual_restarts,
                auto_restarts = stats.auto_restarts,
                "node running"
            );
            tokio::signal::ctrl_c().await?;
            info!("signal received, shutting down");
            supervisor.stop(false);
            Ok(())
        }
        BootOutcome::Done => Ok(()),
        BootOutcome::Fatal(reason) => bail!(reason),
    }
}
