//! Restart/uptime counters for operational visibility.
//!
//! A small durable record next to the pid registry:
//! `{version, lastStart, manualRestarts, autoRestarts}`. The automatic
//! counter is what the external restart watchdog looks at; zeroing it
//! after a deliberate stop is how an operator-initiated shutdown is kept
//! from looking like a crash loop.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum UptimeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("uptime record at {} is corrupt: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Read-only snapshot handed out by [`UptimeLedger::stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UptimeStats {
    pub version: String,
    pub last_start: DateTime<Utc>,
    pub manual_restarts: u32,
    pub auto_restarts: u32,
}

/// File-backed restart/uptime ledger.
pub struct UptimeLedger {
    path: PathBuf,
    stats: UptimeStats,
}

impl UptimeLedger {
    /// Load or create the counters file. `version_tag` is attached purely
    /// for reporting and overrides whatever version the file carried.
    pub fn init(path: impl Into<PathBuf>, version_tag: Option<&str>) -> Result<Self, UptimeError> {
        let path = path.into();
        let mut stats = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            serde_json::from_str(&data).map_err(|source| UptimeError::Corrupt {
                path: path.clone(),
                source,
            })?
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            UptimeStats {
                version: String::new(),
                last_start: Utc::now(),
                manual_restarts: 0,
                auto_restarts: 0,
            }
        };
        if let Some(tag) = version_tag {
            stats.version = tag.to_string();
        }
        let ledger = Self { path, stats };
        ledger.persist()?;
        Ok(ledger)
    }

    /// Mark the node as freshly started.
    pub fn reset_uptime(&mut self) -> Result<(), UptimeError> {
        self.stats.last_start = Utc::now();
        self.persist()
    }

    /// Count one restart, manual or automatic.
    pub fn record_restart(&mut self, auto: bool) -> Result<(), UptimeError> {
        if auto {
            self.stats.auto_restarts += 1;
        } else {
            self.stats.manual_restarts += 1;
        }
        self.persist()
    }

    /// Zero only the automatic counter. Called after a manual stop so the
    /// restart watchdog does not treat the deliberate stop as a crash.
    pub fn reset_auto_restarts(&mut self) -> Result<(), UptimeError> {
        self.stats.auto_restarts = 0;
        self.persist()
    }

    pub fn stats(&self) -> &UptimeStats {
        &self.stats
    }

    fn persist(&self) -> Result<(), UptimeError> {
        let json = serde_json::to_string_pretty(&self.stats).map_err(std::io::Error::other)?;
        crate::atomic_write(&self.path, json.as_bytes())?;
        Ok(())
    }
}
