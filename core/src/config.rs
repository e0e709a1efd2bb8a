//! Node configuration: typed snapshot, first-run synthesis, persistence.
//!
//! The configuration is resolved into a [`NodeConfig`] exactly once at the
//! start of a command; no step re-derives flags from the raw file. Fields
//! this crate does not interpret (`security`, `consensus`, anything a newer
//! node may have added) are carried as opaque JSON so a rewrite never drops
//! them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::NodeIdentity;

/// Default advertised port. A non-default port shifts the embedded store
/// port with it and disables auxiliary worker auto-start, since the
/// workers assume the default ports.
pub const DEFAULT_PORT: u16 = 5260;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config at {} is not valid JSON: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("no config file at {}", .0.display())]
    Missing(PathBuf),

    /// The store listens on the advertised port minus one, so ports 0
    /// and 1 cannot be synthesized into a working node.
    #[error("port {0} leaves no usable store port")]
    Port(u16),
}

/// A peer's signing identity as carried in the neighbourhood list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerIdentity {
    #[serde(rename = "type")]
    pub kind: String,
    pub public: String,
}

/// One known peer: identity plus network address. Ports travel as strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighbourhoodEntry {
    pub identity: PeerIdentity,
    pub host: String,
    pub port: String,
}

/// Embedded data-store endpoint and data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfHost {
    pub host: String,
    pub port: String,
    pub dir: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbConfig {
    #[serde(default)]
    pub selfhost: Option<SelfHost>,
    /// Whether this process launches the store itself. When false and a
    /// selfhost is configured, the store is expected to already be running
    /// and is only probed.
    #[serde(default)]
    pub autostart: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Autostart {
    #[serde(default)]
    pub core: bool,
    #[serde(default)]
    pub restore: bool,
}

/// The full node configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub host: String,
    pub port: String,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub autostart: Autostart,
    #[serde(default)]
    pub neighbourhood: Vec<NeighbourhoodEntry>,
    #[serde(default)]
    pub security: Value,
    #[serde(default)]
    pub consensus: Value,
    /// Asserted network identifier. Absent until the one-shot network
    /// assertion has been written into the ledger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// Fields this crate does not interpret, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Operator overrides applied during first-run synthesis.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
}

impl NodeConfig {
    /// Load the config at `path`. Missing file and unparseable file are
    /// distinct errors; callers that can synthesize handle `Missing`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Synthesize a first-run configuration from the packaged defaults,
    /// the operator overrides, and this node's own identity.
    ///
    /// The synthesized neighbourhood contains exactly one entry: this node.
    pub fn synthesize(
        overrides: &ConfigOverrides,
        identity: &NodeIdentity,
        data_dir: &Path,
    ) -> Result<Self, ConfigError> {
        let port = overrides.port.unwrap_or(DEFAULT_PORT);
        if port <= 1 {
            return Err(ConfigError::Port(port));
        }
        let host = format!("127.0.0.1:{port}");
        let store_port = port - 1;
        let default_port = port == DEFAULT_PORT;

        let mut config = Self {
            host: host.clone(),
            port: port.to_string(),
            db: DbConfig {
                selfhost: Some(SelfHost {
                    host: "127.0.0.1".to_string(),
                    port: store_port.to_string(),
                    dir: data_dir.join("store").to_string_lossy().into_owned(),
                }),
                autostart: true,
            },
            autostart: Autostart {
                core: default_port,
                restore: default_port,
            },
            neighbourhood: Vec::new(),
            security: serde_json::json!({ "signPolicy": "strict" }),
            consensus: serde_json::json!({ "algorithm": "roundRobin", "interval": 5000 }),
            network: None,
            extra: serde_json::Map::new(),
        };
        config.neighbourhood.push(NeighbourhoodEntry {
            identity: identity.peer_identity(),
            host,
            port: port.to_string(),
        });
        Ok(config)
    }

    /// Persist to `path` atomically.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        crate::atomic_write(path, json.as_bytes())?;
        Ok(())
    }
}
