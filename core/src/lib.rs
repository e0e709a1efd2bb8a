//! Node-lifecycle supervisor and network-join protocol for a meridian
//! ledger node.
//!
//! Three concerns live here: supervising the small fleet of cooperating
//! local processes (ledger, store, API and restore workers) with durable
//! pid tracking; the ordered boot sequence that waits for the embedded
//! data store before continuing; and the one-shot network assertion that
//! writes the finalized peer list into the ledger itself. The signing
//! algorithm, the gossip engine, and the store engine are collaborators
//! behind narrow seams.

use std::path::{Path, PathBuf};

pub mod assertion;
pub mod boot;
pub mod config;
pub mod identity;
pub mod merge;
pub mod pid_registry;
pub mod roles;
pub mod scaffold;
pub mod supervisor;
pub mod uptime;

pub use boot::{BootMode, BootOutcome, BootPlan};
pub use roles::Role;
pub use supervisor::Supervisor;

/// Default data directory: `$XDG_DATA_HOME/meridian` with a relative
/// fallback for stripped-down environments.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("meridian"))
        .unwrap_or_else(|| PathBuf::from(".meridian"))
}

/// Atomically write `data` to `path` via a `.tmp` sibling.
pub(crate) fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
