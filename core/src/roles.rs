//! Logical child-process roles tracked by the supervisor.

use serde::{Deserialize, Serialize};

/// One of the fixed logical processes a node is made of.
///
/// `Ledger` is the supervisor process itself; the other three are
/// independent OS processes reached only by pid and signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Ledger,
    Storage,
    Core,
    Restore,
}

impl Role {
    /// Every role, in the order they are stopped.
    pub const ALL: [Role; 4] = [Role::Ledger, Role::Storage, Role::Core, Role::Restore];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Ledger => "ledger",
            Role::Storage => "storage",
            Role::Core => "core",
            Role::Restore => "restore",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
