use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use super::checkpoint::{CheckpointManifest, CheckpointMove};
use super::fsops;
use super::status::{status_path, ApplyStatus, EntryOutcome, OutcomeKind};
use crate::error::Error;
use crate::events::{Event, EventSink};

/// Undo every move in a checkpoint, newest first.
///
/// Restores go through the same stage-verify-publish path as apply, so an
/// interrupted rollback can simply be run again. The checkpoint itself is
/// never modified.
pub fn rollback(checkpoint_path: &Path, sink: &dyn EventSink) -> Result<ApplyStatus, Error> {
    let manifest = CheckpointManifest::load(checkpoint_path)?;
    let mut status = ApplyStatus::new(false);
    info!(
        "Rolling back {} moves from {}",
        manifest.moves.len(),
        checkpoint_path.display()
    );

    for entry in manifest.moves.iter().rev() {
        status.attempted += 1;
        let outcome = match restore(entry) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("{}: {}", entry.rollback_key, e);
                EntryOutcome::new(
                    &entry.rollback_key,
                    &entry.source,
                    &entry.destination,
                    OutcomeKind::Failed,
                )
                .with_detail(e.to_string())
            }
        };
        sink.emit(&Event::RollbackStep {
            source: entry.source.clone(),
            destination: entry.destination.clone(),
            outcome: outcome
                .detail
                .clone()
                .unwrap_or_else(|| "restored".to_string()),
        });
        status.record(outcome);
    }

    let path = status_path(checkpoint_path, "rollback");
    if let Err(e) = status.write_to(&path) {
        warn!("Could not write rollback status {}: {}", path.display(), e);
    }

    info!(
        "Rollback finished: {} restored, {} skipped, {} errors",
        status.succeeded, status.skipped, status.errors
    );
    Ok(status)
}

fn restore(entry: &CheckpointMove) -> Result<EntryOutcome, Error> {
    let source = Path::new(&entry.source);
    let destination = Path::new(&entry.destination);
    let outcome = |kind| {
        EntryOutcome::new(&entry.rollback_key, &entry.source, &entry.destination, kind)
    };

    if !destination.exists() {
        debug!("{}: already rolled back", entry.rollback_key);
        return Ok(outcome(OutcomeKind::Skipped).with_detail("already rolled back"));
    }

    if source.exists() {
        // Interrupted after the restore was published.
        if fsops::holds_content(source, &entry.content_hash) {
            fsops::remove_file(destination)?;
            remove_empty_parent(destination);
            return Ok(outcome(OutcomeKind::Applied)
                .with_detail("completed interrupted restore")
                .with_bytes(entry.size));
        }
        return Err(Error::RestoreConflict(source.to_path_buf()));
    }

    let staging = fsops::partial_path(source);
    fsops::stage_copy(destination, &staging)?;
    fsops::verify_staged(&staging, &entry.content_hash)?;
    fsops::publish(&staging, source)?;
    fsops::remove_file(destination)?;
    remove_empty_parent(destination);

    debug!("{}: restored {}", entry.rollback_key, source.display());
    Ok(outcome(OutcomeKind::Applied).with_bytes(entry.size))
}

/// Drop the holding directory once its last file is gone.
fn remove_empty_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        // Fails harmlessly while the directory still has entries.
        let _ = fs::remove_dir(parent);
    }
}
