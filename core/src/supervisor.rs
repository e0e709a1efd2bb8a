//! Process supervisor: start, stop, restart the managed process set.
//!
//! The supervisor owns the pid registry and the uptime ledger as plain
//! constructed fields; there is no ambient global state, so tests build
//! isolated instances. Workers are reached only by recorded pid and
//! SIGTERM. The stop path favors availability: every per-role failure is
//! logged and the sequence always runs to the registry reset.

use tracing::{error, info, warn};

use crate::boot::{self, BootOutcome, BootPlan};
use crate::pid_registry::PidRegistry;
use crate::roles::Role;
use crate::uptime::UptimeLedger;

pub struct Supervisor {
    pub registry: PidRegistry,
    pub uptime: UptimeLedger,
}

impl Supervisor {
    pub fn new(registry: PidRegistry, uptime: UptimeLedger) -> Self {
        Self { registry, uptime }
    }

    /// Bring the node up. The ledger role is this process itself, so it
    /// goes straight to running: its pid is recorded and the boot
    /// sequencer takes over for everything else.
    pub async fn start(&mut self, plan: &BootPlan<'_>) -> BootOutcome {
        if let Err(e) = self.registry.add_pid(Role::Ledger, std::process::id()) {
            return BootOutcome::Fatal(format!("cannot record ledger pid: {e}"));
        }
        if let Err(e) = self.uptime.reset_uptime() {
            warn!("could not reset uptime record: {e}");
        }
        boot::run(plan, &mut self.registry).await
    }

    /// Terminate every recorded process, then clear the registry.
    ///
    /// A zero pid is a warning, not an error: the role may legitimately
    /// not be running. The registry is reset even when kills fail,
    /// because a stale registry is worse than a cleared one.
    pub fn stop(&mut self, is_restart: bool) {
        let pids = self.registry.pids().clone();
        for role in Role::ALL {
            let pid = pids.get(role);
            if pid == 0 {
                warn!(%role, "no recorded pid, nothing to stop");
                continue;
            }
            if pid == std::process::id() {
                // The ledger role during an in-process restart is us.
                info!(%role, pid, "skipping own process");
                continue;
            }
            match terminate(pid) {
                Ok(()) => info!(%role, pid, "sent SIGTERM"),
                Err(e) => error!(%role, pid, "could not signal process: {e}"),
            }
        }

        if let Err(e) = self.registry.reset() {
            error!("could not reset pid registry: {e}");
        }

        if !is_restart {
            // A deliberate stop must not look like a crash to the
            // external restart watchdog.
            if let Err(e) = self.uptime.reset_auto_restarts() {
                warn!("could not reset auto-restart counter: {e}");
            }
        }
    }

    /// Stop then start. Stop-path failures never prevent the start
    /// attempt; the restart is counted afterwards, tagged manual or
    /// automatic.
    pub async fn restart(&mut self, auto: bool, plan: &BootPlan<'_>) -> BootOutcome {
        self.stop(true);
        let outcome = self.start(plan).await;
        if let Err(e) = self.uptime.record_restart(auto) {
            warn!("could not record restart: {e}");
        }
        outcome
    }
}

fn terminate(pid: u32) -> std::io::Result<()> {
    // SAFETY: plain kill(2) on a pid we recorded ourselves.
    let rc = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}
