use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Error;

/// How a run ended, as a process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Success,
    Partial,
    Fatal,
}

impl RunOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            RunOutcome::Success => 0,
            RunOutcome::Partial => 5,
            RunOutcome::Fatal => 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Applied,
    WouldApply,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryOutcome {
    pub rollback_key: String,
    pub source: String,
    pub destination: String,
    pub outcome: OutcomeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub bytes: u64,
}

impl EntryOutcome {
    pub fn new(
        rollback_key: &str,
        source: &str,
        destination: &str,
        outcome: OutcomeKind,
    ) -> Self {
        Self {
            rollback_key: rollback_key.to_string(),
            source: source.to_string(),
            destination: destination.to_string(),
            outcome,
            detail: None,
            bytes: 0,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_bytes(mut self, bytes: u64) -> Self {
        self.bytes = bytes;
        self
    }
}

/// Per-run summary of an apply or rollback.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyStatus {
    pub attempted: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub errors: usize,
    pub bytes_moved: u64,
    pub dry_run: bool,
    pub entries: Vec<EntryOutcome>,
}

impl ApplyStatus {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: EntryOutcome) {
        match outcome.outcome {
            OutcomeKind::Applied | OutcomeKind::WouldApply => {
                self.succeeded += 1;
                self.bytes_moved += outcome.bytes;
            }
            OutcomeKind::Skipped => self.skipped += 1,
            OutcomeKind::Failed => self.errors += 1,
        }
        self.entries.push(outcome);
    }

    pub fn outcome(&self) -> RunOutcome {
        if self.errors > 0 || self.skipped > 0 {
            RunOutcome::Partial
        } else {
            RunOutcome::Success
        }
    }

    pub fn write_to(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Other(format!("Failed to encode run status: {}", e)))?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// `<checkpoint>.<kind>.json`, next to the checkpoint.
pub fn status_path(checkpoint: &Path, kind: &str) -> PathBuf {
    let mut name = checkpoint.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.json", kind));
    checkpoint.with_file_name(name)
}
