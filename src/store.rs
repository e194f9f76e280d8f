//! Label stores: where ledger snapshots come from and go to

use std::path::PathBuf;
use std::sync::Mutex;

use serde_json::Value;

use crate::error::{AppError, Result};
use crate::export;
use crate::models::{ExportRecord, SnapshotEntry};

/// When a session hands its ledger snapshot to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPolicy {
    /// After every label mutation
    EveryMutation,
    /// Only when an export is requested
    OnExport,
}

/// Backing store for ledger snapshots
pub trait LabelStore: Send + Sync {
    /// Entries to pre-populate the ledger with at startup
    fn load_snapshot(&self) -> Result<Vec<SnapshotEntry>>;

    /// Replace the persisted snapshot
    fn persist(&self, records: &[ExportRecord]) -> Result<()>;

    fn policy(&self) -> FlushPolicy;
}

/// Turn a persisted document into snapshot entries.
///
/// Accepts the export format (an array of records) and a plain
/// `{"index": "label"}` object. Unusable rows are skipped.
pub fn parse_snapshot(value: &Value) -> Result<Vec<SnapshotEntry>> {
    match value {
        Value::Array(rows) => {
            let entries: Vec<SnapshotEntry> =
                rows.iter().filter_map(SnapshotEntry::from_value).collect();
            let skipped = rows.len() - entries.len();
            if skipped > 0 {
                tracing::warn!("Skipped {} snapshot rows without index or label", skipped);
            }
            Ok(entries)
        }
        Value::Object(map) => {
            let entries: Vec<SnapshotEntry> = map
                .iter()
                .filter_map(|(k, v)| {
                    Some(SnapshotEntry {
                        index: k.trim().parse().ok()?,
                        label: v.as_str()?.to_string(),
                    })
                })
                .collect();
            let skipped = map.len() - entries.len();
            if skipped > 0 {
                tracing::warn!("Skipped {} snapshot rows without index or label", skipped);
            }
            Ok(entries)
        }
        _ => Err(AppError::DataUnavailable(
            "label snapshot must be an array or object".into(),
        )),
    }
}

/// Snapshot kept as a JSON file on disk
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    policy: FlushPolicy,
}

impl JsonFileStore {
    /// File rewritten on every mutation
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            policy: FlushPolicy::EveryMutation,
        }
    }

    /// File rewritten only when the session exports
    pub fn on_export(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            policy: FlushPolicy::OnExport,
        }
    }
}

impl LabelStore for JsonFileStore {
    fn load_snapshot(&self) -> Result<Vec<SnapshotEntry>> {
        if !self.path.exists() {
            tracing::info!("No label snapshot at {}, starting empty", self.path.display());
            return Ok(Vec::new());
        }

        let raw = std::fs::read_to_string(&self.path)?;
        let value: Value = serde_json::from_str(&raw).map_err(|e| {
            AppError::DataUnavailable(format!("corrupt label snapshot {}: {}", self.path.display(), e))
        })?;
        let entries = parse_snapshot(&value)?;
        tracing::info!(
            "Restored {} labels from {}",
            entries.len(),
            self.path.display()
        );
        Ok(entries)
    }

    fn persist(&self, records: &[ExportRecord]) -> Result<()> {
        let json = export::to_json(records)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        tracing::debug!("Persisted {} records to {}", records.len(), self.path.display());
        Ok(())
    }

    fn policy(&self) -> FlushPolicy {
        self.policy
    }
}

/// In-process store; nothing leaves memory until the caller exports
#[derive(Debug, Default)]
pub struct MemoryStore {
    seed: Vec<SnapshotEntry>,
    last: Mutex<Option<Vec<ExportRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with labels carried over from elsewhere
    pub fn with_seed(seed: Vec<SnapshotEntry>) -> Self {
        Self {
            seed,
            last: Mutex::new(None),
        }
    }

    /// Most recently persisted snapshot
    pub fn last_snapshot(&self) -> Option<Vec<ExportRecord>> {
        self.last.lock().ok().and_then(|guard| guard.clone())
    }
}

impl LabelStore for MemoryStore {
    fn load_snapshot(&self) -> Result<Vec<SnapshotEntry>> {
        Ok(self.seed.clone())
    }

    fn persist(&self, records: &[ExportRecord]) -> Result<()> {
        let mut last = self
            .last
            .lock()
            .map_err(|_| AppError::Internal("memory store lock poisoned".into()))?;
        *last = Some(records.to_vec());
        Ok(())
    }

    fn policy(&self) -> FlushPolicy {
        FlushPolicy::OnExport
    }
}
