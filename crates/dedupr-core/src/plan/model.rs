use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::Error;
use crate::storage::models::ContentIdentity;

pub const PLAN_COLUMNS: [&str; 8] = [
    "status",
    "operation",
    "source_path",
    "destination_path",
    "content_id",
    "reason",
    "rollback_key",
    "timestamp",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Planned,
    Applied,
    Skipped,
    Failed,
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlanStatus::Planned => "planned",
            PlanStatus::Applied => "applied",
            PlanStatus::Skipped => "skipped",
            PlanStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Move,
}

/// One proposed relocation of a non-keeper duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub status: PlanStatus,
    pub operation: Operation,
    pub source_path: String,
    pub destination_path: String,
    pub content_id: ContentIdentity,
    pub reason: String,
    pub rollback_key: String,
    pub timestamp: String,
}

const KEEPER_PREFIX: &str = "duplicate of ";

/// Reason recorded for a planned move, naming the group's keeper.
pub fn duplicate_reason(keeper: &str) -> String {
    format!("{}{}", KEEPER_PREFIX, keeper)
}

impl PlanEntry {
    /// The keeper named in `reason`, when the entry was planned as a duplicate.
    pub fn keeper(&self) -> Option<&str> {
        self.reason.strip_prefix(KEEPER_PREFIX)
    }
}

pub fn rollback_key(index: usize) -> String {
    format!("rbk:{:06}", index)
}

/// Write a plan as CSV. The header row is written even for an empty plan.
pub fn write_plan(path: &Path, entries: &[PlanEntry]) -> Result<(), Error> {
    let failed = |reason: String| Error::PlanWrite {
        path: path.to_path_buf(),
        reason,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| failed(e.to_string()))?;
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| failed(e.to_string()))?;
    writer
        .write_record(PLAN_COLUMNS)
        .map_err(|e| failed(e.to_string()))?;
    for entry in entries {
        writer.serialize(entry).map_err(|e| failed(e.to_string()))?;
    }
    writer.flush().map_err(|e| failed(e.to_string()))?;

    debug!("Wrote {} plan entries to {}", entries.len(), path.display());
    Ok(())
}

pub fn read_plan(path: &Path) -> Result<Vec<PlanEntry>, Error> {
    let failed = |reason: String| Error::PlanRead {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = csv::Reader::from_path(path).map_err(|e| failed(e.to_string()))?;
    let entries = reader
        .deserialize::<PlanEntry>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| failed(e.to_string()))?;

    debug!("Read {} plan entries from {}", entries.len(), path.display());
    Ok(entries)
}
