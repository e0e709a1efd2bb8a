//! Durable role → pid registry.
//!
//! The registry file is the single source of truth across supervisor
//! restarts: `stop` reads it to find what to signal, `start` records into
//! it as workers come up. A pid of 0 means "not running". The file is
//! owned by exactly one supervisor instance; writes are atomic whole-file
//! rewrites (tmp + rename), no cross-process locking.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::roles::Role;

/// Errors from the pid registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file exists but does not parse. This is never repaired
    /// silently: resetting a corrupt registry would orphan whatever
    /// processes it was tracking.
    #[error("pid registry at {} is corrupt: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// The persisted mapping, one fixed key per role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PidTable {
    #[serde(default)]
    pub ledger: u32,
    #[serde(default)]
    pub storage: u32,
    #[serde(default)]
    pub core: u32,
    #[serde(default)]
    pub restore: u32,
}

impl PidTable {
    pub fn get(&self, role: Role) -> u32 {
        match role {
            Role::Ledger => self.ledger,
            Role::Storage => self.storage,
            Role::Core => self.core,
            Role::Restore => self.restore,
        }
    }

    fn set(&mut self, role: Role, pid: u32) {
        match role {
            Role::Ledger => self.ledger = pid,
            Role::Storage => self.storage = pid,
            Role::Core => self.core = pid,
            Role::Restore => self.restore = pid,
        }
    }
}

/// File-backed pid registry.
#[derive(Debug)]
pub struct PidRegistry {
    path: PathBuf,
    table: PidTable,
}

impl PidRegistry {
    /// Open the registry at `path`, creating it zeroed if absent.
    pub fn init(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            let table = serde_json::from_str(&data).map_err(|source| RegistryError::Corrupt {
                path: path.clone(),
                source,
            })?;
            Ok(Self { path, table })
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let registry = Self {
                path,
                table: PidTable::default(),
            };
            registry.persist()?;
            Ok(registry)
        }
    }

    /// Record `pid` under `role`, durably before returning.
    ///
    /// Setting the value already recorded is a no-op.
    pub fn add_pid(&mut self, role: Role, pid: u32) -> Result<(), RegistryError> {
        if self.table.get(role) == pid {
            return Ok(());
        }
        self.table.set(role, pid);
        self.persist()
    }

    /// Current mapping. Never blocks.
    pub fn pids(&self) -> &PidTable {
        &self.table
    }

    /// Zero every entry and persist.
    pub fn reset(&mut self) -> Result<(), RegistryError> {
        self.table = PidTable::default();
        self.persist()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), RegistryError> {
        let json = serde_json::to_string_pretty(&self.table).map_err(std::io::Error::other)?;
        crate::atomic_write(&self.path, json.as_bytes())?;
        Ok(())
    }
}
