//! Offline neighbourhood merge.
//!
//! Unifies N single-entry configuration files into one canonical peer
//! list. Two passes on purpose: every file is validated and its entry
//! gathered before anything is written, so a bad input can never leave a
//! half-merged set behind. Fields other than `neighbourhood` pass through
//! untouched, which is why this works on raw JSON values rather than the
//! typed config.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("no config file at {}", .0.display())]
    Missing(PathBuf),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("config at {} is not valid JSON: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// A file being merged must hold exactly its own entry. Anything else
    /// is almost certainly an already-merged file; flattening it would
    /// corrupt the combined list, so the whole merge is rejected.
    #[error("{} has {count} neighbourhood entries, expected exactly 1", .path.display())]
    EntryCount { path: PathBuf, count: usize },
}

/// Merge the neighbourhoods of `paths` and rewrite every file with the
/// combined list, in input order.
pub fn merge_neighbourhoods(paths: &[PathBuf]) -> Result<(), MergeError> {
    // Pass 1: validate everything, gather the single entries.
    let mut files: Vec<(&PathBuf, Value)> = Vec::with_capacity(paths.len());
    let mut combined: Vec<Value> = Vec::with_capacity(paths.len());

    for path in paths {
        if !path.exists() {
            return Err(MergeError::Missing(path.clone()));
        }
        let data = read(path)?;
        let value: Value = serde_json::from_str(&data).map_err(|source| MergeError::Parse {
            path: path.clone(),
            source,
        })?;

        let entries = value
            .get("neighbourhood")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if entries.len() != 1 {
            return Err(MergeError::EntryCount {
                path: path.clone(),
                count: entries.len(),
            });
        }
        combined.push(entries[0].clone());
        files.push((path, value));
    }

    // Pass 2: all inputs are valid, rewrite each with the full list.
    for (path, mut value) in files {
        value["neighbourhood"] = Value::Array(combined.clone());
        let json =
            serde_json::to_string_pretty(&value).map_err(|source| MergeError::Parse {
                path: path.clone(),
                source,
            })?;
        crate::atomic_write(path, json.as_bytes()).map_err(|source| MergeError::Io {
            path: path.clone(),
            source,
        })?;
    }

    info!(files = paths.len(), "neighbourhoods merged");
    Ok(())
}

fn read(path: &Path) -> Result<String, MergeError> {
    std::fs::read_to_string(path).map_err(|source| MergeError::Io {
        path: path.to_path_buf(),
        source,
    })
}
