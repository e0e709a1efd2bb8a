//! Shared fixtures for the integration suites.

#![allow(clippy::unwrap_used, dead_code)]

use std::path::{Path, PathBuf};

use meridian_core::identity::test_keys;
use serde_json::{Value, json};

/// Write an identity file for a deterministic throwaway key and return
/// its path.
pub fn write_identity(dir: &Path, seed: u8) -> PathBuf {
    let path = dir.join("identity.json");
    std::fs::write(&path, test_keys::identity_file_json(seed)).unwrap();
    path
}

/// One well-formed neighbourhood entry for `host`.
pub fn peer_entry(host: &str) -> Value {
    json!({
        "identity": { "type": "ed25519", "public": format!("pem-of-{host}") },
        "host": host,
        "port": host.rsplit(':').next().unwrap(),
    })
}

/// A minimal but complete node config value for `host`.
pub fn node_config(host: &str) -> Value {
    json!({
        "host": host,
        "port": host.rsplit(':').next().unwrap(),
        "db": { "selfhost": null, "autostart": false },
        "autostart": { "core": false, "restore": false },
        "neighbourhood": [peer_entry(host)],
        "security": { "signPolicy": "strict" },
        "consensus": { "algorithm": "roundRobin", "interval": 5000 },
    })
}

pub fn write_json(path: &Path, value: &Value) {
    std::fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}
