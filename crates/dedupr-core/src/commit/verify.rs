use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

use super::checkpoint::CheckpointManifest;
use super::fsops;
use super::status::RunOutcome;
use crate::error::Error;
use crate::events::{Event, EventSink};

#[derive(Debug, Default, Clone, Serialize)]
pub struct VerifyReport {
    pub checked: usize,
    pub missing: Vec<String>,
    pub mismatched: Vec<String>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.mismatched.is_empty()
    }

    pub fn outcome(&self) -> RunOutcome {
        if self.is_clean() {
            RunOutcome::Success
        } else {
            RunOutcome::Partial
        }
    }
}

/// Check that every destination recorded in a checkpoint still exists.
/// With `deep`, also re-hash each one against its recorded digest.
pub fn verify(
    checkpoint_path: &Path,
    deep: bool,
    sink: &dyn EventSink,
) -> Result<VerifyReport, Error> {
    let manifest = CheckpointManifest::load(checkpoint_path)?;
    let mut report = VerifyReport::default();

    for entry in &manifest.moves {
        report.checked += 1;
        let destination = Path::new(&entry.destination);

        let ok = if !destination.is_file() {
            warn!("Missing: {}", entry.destination);
            report.missing.push(entry.destination.clone());
            false
        } else if deep && !fsops::holds_content(destination, &entry.content_hash) {
            warn!("Content changed: {}", entry.destination);
            report.mismatched.push(entry.destination.clone());
            false
        } else {
            true
        };

        sink.emit(&Event::VerifyEntry {
            destination: entry.destination.clone(),
            ok,
        });
    }

    info!(
        "Verified {} destinations: {} missing, {} mismatched",
        report.checked,
        report.missing.len(),
        report.mismatched.len()
    );
    Ok(report)
}
