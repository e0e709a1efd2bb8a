//! Filesystem scaffolding for contract execution.
//!
//! Creates the working directories for user-defined and default smart
//! contracts, installs the default contracts from a fixed whitelist, and
//! makes sure the shared-library symlink resolves. Everything here is
//! idempotent: reruns on an already-scaffolded data directory must change
//! nothing and raise nothing.

use std::path::{Path, PathBuf};

use tracing::debug;

/// Default contracts installed at boot. An explicit whitelist, never a
/// wildcard copy: stray files must not end up treated as trusted default
/// contracts.
const DEFAULT_CONTRACTS: &[(&str, &str)] = &[
    (
        "setup.json",
        include_str!("../contracts/setup.json"),
    ),
    (
        "transfer.json",
        include_str!("../contracts/transfer.json"),
    ),
    (
        "bootstrap.json",
        include_str!("../contracts/bootstrap.json"),
    ),
];

/// Resolved scaffold locations under one data directory.
#[derive(Debug, Clone)]
pub struct ScaffoldPaths {
    pub user_contracts: PathBuf,
    pub default_contracts: PathBuf,
    pub lib_dir: PathBuf,
    pub lib_link: PathBuf,
}

impl ScaffoldPaths {
    pub fn new(data_dir: &Path) -> Self {
        let contracts = data_dir.join("contracts");
        Self {
            user_contracts: contracts.join("user"),
            default_contracts: contracts.join("default"),
            lib_dir: data_dir.join("lib"),
            lib_link: contracts.join("lib"),
        }
    }
}

/// Ensure directories, default contracts, and the shared-library symlink
/// all exist under `data_dir`.
pub fn ensure_scaffolding(data_dir: &Path) -> std::io::Result<ScaffoldPaths> {
    let paths = ScaffoldPaths::new(data_dir);

    std::fs::create_dir_all(&paths.user_contracts)?;
    std::fs::create_dir_all(&paths.default_contracts)?;
    std::fs::create_dir_all(&paths.lib_dir)?;

    for (name, body) in DEFAULT_CONTRACTS {
        let target = paths.default_contracts.join(name);
        // Reinstall unconditionally so a patched default contract wins
        // over whatever an earlier version left behind.
        std::fs::write(&target, body)?;
        debug!(contract = name, "installed default contract");
    }

    ensure_symlink(&paths.lib_dir, &paths.lib_link)?;

    Ok(paths)
}

/// Create `link` pointing at `target` if it does not already exist.
#[cfg(unix)]
fn ensure_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    match std::os::unix::fs::symlink(target, link) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn ensure_symlink(_target: &Path, _link: &Path) -> std::io::Result<()> {
    Ok(())
}
