//! Network assertion: the one-shot join transaction.
//!
//! Runs at most once per network's lifetime. It refuses to do anything if
//! the configuration already names an asserted network, requires every
//! known peer to report itself reachable, and only then builds, signs and
//! submits the self-signed setup transaction to the local ledger
//! endpoint. Nothing here retries: a transport failure is surfaced and
//! the operator re-invokes after fixing reachability.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::config::{ConfigError, NodeConfig};
use crate::identity::{IdentityError, NodeIdentity, Signer as _};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Contract entry the join transaction invokes.
const SETUP_CONTRACT: &str = "setup";

#[derive(Debug, thiserror::Error)]
pub enum AssertError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Re-asserting an asserted network would split the peers' view of
    /// it; this is never retryable.
    #[error("network already asserted as {0:?}")]
    AlreadyAsserted(String),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("peer {0} does not report itself reachable")]
    PeerNotHome(String),

    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The ledger's own validation rejected the transaction.
    #[error("assertion rejected by ledger: {0}")]
    Rejected(String),
}

#[derive(Debug, Deserialize)]
struct PeerStatus {
    #[serde(rename = "isHome")]
    is_home: bool,
}

#[derive(Debug, Default, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    errors: Vec<String>,
    #[serde(default)]
    streams: Vec<String>,
}

/// Run the assertion protocol. Returns the stream identifiers the ledger
/// produced for the accepted transaction.
pub async fn assert_network(
    config_path: &Path,
    identity_path: &Path,
    lock: Option<&str>,
) -> Result<Vec<String>, AssertError> {
    let config = NodeConfig::load(config_path)?;
    if let Some(network) = &config.network {
        return Err(AssertError::AlreadyAsserted(network.clone()));
    }

    let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

    // Every known peer must be home; a partial quorum is never asserted.
    let status_url = format!("http://{}/neighbourhood", config.host);
    let peers: HashMap<String, PeerStatus> =
        client.get(&status_url).send().await?.json().await?;
    for (peer, status) in &peers {
        if !status.is_home {
            return Err(AssertError::PeerNotHome(peer.clone()));
        }
    }
    info!(peers = peers.len(), "all peers reachable");

    let identity = NodeIdentity::load(identity_path)?;
    let tx = json!({
        "contract": SETUP_CONTRACT,
        "params": {
            "public": identity.public(),
            "lock": lock,
            "security": config.security,
            "consensus": config.consensus,
            "neighbourhood": config.neighbourhood,
        },
    });

    // Signed over the canonical serialization of `$tx`; attached exactly
    // once, keyed by this node's own host.
    let payload = serde_json::to_vec(&tx)?;
    let signature = identity.sign(&payload);
    let mut sigs = serde_json::Map::new();
    sigs.insert(config.host.clone(), serde_json::Value::String(signature));
    let envelope = json!({
        "$tx": tx,
        "$selfsign": true,
        "$sigs": sigs,
    });

    let submit_url = format!("http://{}/", config.host);
    let response: SubmitResponse = client
        .post(&submit_url)
        .json(&envelope)
        .send()
        .await?
        .json()
        .await?;

    if !response.errors.is_empty() {
        return Err(AssertError::Rejected(response.errors.join("; ")));
    }
    for stream in &response.streams {
        info!(%stream, "assertion accepted");
    }
    Ok(response.streams)
}
