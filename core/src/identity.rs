//! Node identity: the signing key pair loaded from the identity file.
//!
//! The identity file is created by external tooling and holds both halves
//! as PKCS#8 PEM: `{"pub": {"pkcs8pem": ...}, "prv": {"pkcs8pem": ...}}`.
//! A node cannot bootstrap without it. The signature algorithm stays
//! behind the [`Signer`] seam; everything else in this crate only sees
//! "payload in, base64 signature out".

use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::pkcs8::DecodePrivateKey;
use ed25519_dalek::{Signer as _, SigningKey};
use serde::{Deserialize, Serialize};

use crate::config::PeerIdentity;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// Missing identity file. Fatal at bootstrap: identity creation is
    /// external tooling's job, never this supervisor's.
    #[error("no identity file at {}", .0.display())]
    Missing(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("identity file at {} is not valid JSON: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("identity key is unusable: {0}")]
    Key(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KeyMaterial {
    pkcs8pem: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IdentityFile {
    #[serde(rename = "pub")]
    public: KeyMaterial,
    prv: KeyMaterial,
}

/// Anything that can produce a detached signature over a payload.
pub trait Signer {
    fn sign(&self, payload: &[u8]) -> String;
}

/// The local node's key pair.
pub struct NodeIdentity {
    public_pem: String,
    key: SigningKey,
}

impl NodeIdentity {
    /// Load the identity file at `path`.
    pub fn load(path: &Path) -> Result<Self, IdentityError> {
        if !path.exists() {
            return Err(IdentityError::Missing(path.to_path_buf()));
        }
        let data = std::fs::read_to_string(path)?;
        let file: IdentityFile =
            serde_json::from_str(&data).map_err(|source| IdentityError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let key = SigningKey::from_pkcs8_pem(&file.prv.pkcs8pem)
            .map_err(|e| IdentityError::Key(e.to_string()))?;
        Ok(Self {
            public_pem: file.public.pkcs8pem,
            key,
        })
    }

    /// The public half, as stored in the identity file.
    pub fn public(&self) -> &str {
        &self.public_pem
    }

    /// This node's identity as a neighbourhood entry carries it.
    pub fn peer_identity(&self) -> PeerIdentity {
        PeerIdentity {
            kind: "ed25519".to_string(),
            public: self.public_pem.clone(),
        }
    }
}

// The private half must never end up in logs or error dumps.
impl std::fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("public_pem", &self.public_pem)
            .finish_non_exhaustive()
    }
}

impl Signer for NodeIdentity {
    fn sign(&self, payload: &[u8]) -> String {
        BASE64.encode(self.key.sign(payload).to_bytes())
    }
}

/// Deterministic throwaway keys for tests. Never part of the public API.
#[cfg(any(test, feature = "test-fixtures"))]
#[doc(hidden)]
pub mod test_keys {
    use ed25519_dalek::SigningKey;
    use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
    use ed25519_dalek::pkcs8::{EncodePrivateKey, EncodePublicKey};

    /// Identity-file JSON for a deterministic throwaway key.
    #[allow(clippy::unwrap_used)]
    pub fn identity_file_json(seed: u8) -> String {
        let key = SigningKey::from_bytes(&[seed; 32]);
        let prv = key.to_pkcs8_pem(LineEnding::LF).unwrap();
        let public = key.verifying_key().to_public_key_pem(LineEnding::LF).unwrap();
        serde_json::json!({
            "pub": { "pkcs8pem": public },
            "prv": { "pkcs8pem": prv.to_string() },
        })
        .to_string()
    }
}
