use std::cell::RefCell;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use super::checkpoint::{CheckpointMove, CheckpointWriter};
use super::fsops;
use super::status::{status_path, ApplyStatus, EntryOutcome, OutcomeKind};
use crate::config::CollisionPolicy;
use crate::error::Error;
use crate::events::{ApplyPhase, Event, EventSink};
use crate::hasher;
use crate::plan::naming::resolve_collision;
use crate::plan::{read_plan, Operation, PlanEntry, PlanStatus};

/// Executes a plan one entry at a time.
///
/// Each move is staged next to its destination, verified by hash, renamed
/// into place and recorded in the checkpoint before its source is deleted.
/// A crash at any point leaves the source intact or a checkpoint entry
/// pointing at a verified copy; re-running the same plan finishes the job.
pub struct Applier<'a> {
    collision_policy: CollisionPolicy,
    sink: &'a dyn EventSink,
    /// Keepers already confirmed to hold their group's content this run.
    confirmed_keepers: RefCell<HashSet<String>>,
}

impl<'a> Applier<'a> {
    pub fn new(sink: &'a dyn EventSink) -> Self {
        Self {
            collision_policy: CollisionPolicy::default(),
            sink,
            confirmed_keepers: RefCell::new(HashSet::new()),
        }
    }

    pub fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = policy;
        self
    }

    pub fn apply_file(
        &self,
        plan_path: &Path,
        checkpoint_path: &Path,
        force: bool,
    ) -> Result<ApplyStatus, Error> {
        let plan = read_plan(plan_path)?;
        self.apply(&plan, checkpoint_path, force)
    }

    /// Without `force` nothing is written: sources are hashed against the
    /// plan and the would-be result is reported.
    pub fn apply(
        &self,
        plan: &[PlanEntry],
        checkpoint_path: &Path,
        force: bool,
    ) -> Result<ApplyStatus, Error> {
        let mut status = ApplyStatus::new(!force);
        self.confirmed_keepers.borrow_mut().clear();
        let mut checkpoint = if force {
            Some(CheckpointWriter::open(checkpoint_path)?)
        } else {
            info!("Dry run: no files will be moved");
            None
        };

        for entry in plan {
            if entry.status != PlanStatus::Planned || entry.operation != Operation::Move {
                debug!(
                    "{}: status {} is not actionable",
                    entry.rollback_key, entry.status
                );
                status.record(
                    EntryOutcome::new(
                        &entry.rollback_key,
                        &entry.source_path,
                        &entry.destination_path,
                        OutcomeKind::Skipped,
                    )
                    .with_detail(format!("plan status {}", entry.status)),
                );
                continue;
            }

            status.attempted += 1;
            let result = match checkpoint.as_mut() {
                Some(writer) => self.commit_entry(entry, writer),
                None => self.simulate_entry(entry),
            };

            match result {
                Ok(outcome) => status.record(outcome),
                Err(e) if e.is_fatal() => {
                    error!("Aborting apply at {}: {}", entry.rollback_key, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("{}: {}", entry.rollback_key, e);
                    self.sink.emit(&Event::ApplyEntryFailed {
                        rollback_key: entry.rollback_key.clone(),
                        source: entry.source_path.clone(),
                        error: e.to_string(),
                    });
                    status.record(
                        EntryOutcome::new(
                            &entry.rollback_key,
                            &entry.source_path,
                            &entry.destination_path,
                            OutcomeKind::Failed,
                        )
                        .with_detail(e.to_string()),
                    );
                }
            }
        }

        if force {
            let path = status_path(checkpoint_path, "status");
            if let Err(e) = status.write_to(&path) {
                warn!("Could not write run status {}: {}", path.display(), e);
            }
        }

        info!(
            "Apply finished: {} attempted, {} succeeded, {} skipped, {} errors, {} bytes",
            status.attempted, status.succeeded, status.skipped, status.errors, status.bytes_moved
        );
        Ok(status)
    }

    /// Read-only checks for an entry whose source is gone.
    fn missing_source_outcome(&self, entry: &PlanEntry) -> EntryOutcome {
        let source = Path::new(&entry.source_path);
        let destination = Path::new(&entry.destination_path);
        let outcome = EntryOutcome::new(
            &entry.rollback_key,
            &entry.source_path,
            &entry.destination_path,
            OutcomeKind::Skipped,
        );
        if fsops::holds_content(destination, &entry.content_id.content_hash) {
            debug!("{}: already applied", entry.rollback_key);
            outcome.with_detail("already applied")
        } else {
            warn!("{}: source {} is gone", entry.rollback_key, source.display());
            outcome.with_detail(Error::SourceMissing(source.to_path_buf()).to_string())
        }
    }

    /// A source is only relocated while the keeper named in its plan entry
    /// still holds the content; otherwise the entry is skipped untouched.
    fn keeper_lost(&self, entry: &PlanEntry) -> Option<EntryOutcome> {
        let keeper = entry.keeper()?;
        if self.confirmed_keepers.borrow().contains(keeper) {
            return None;
        }
        if fsops::holds_content(Path::new(keeper), &entry.content_id.content_hash) {
            self.confirmed_keepers.borrow_mut().insert(keeper.to_string());
            return None;
        }
        warn!(
            "{}: keeper {} no longer holds the content",
            entry.rollback_key, keeper
        );
        Some(
            EntryOutcome::new(
                &entry.rollback_key,
                &entry.source_path,
                &entry.destination_path,
                OutcomeKind::Skipped,
            )
            .with_detail(format!("keeper {} no longer holds the content", keeper)),
        )
    }

    fn source_size(source: &Path, destination: &Path) -> Result<u64, Error> {
        fs::metadata(source)
            .map(|m| m.len())
            .map_err(|e| Error::StageFailed {
                from: source.to_path_buf(),
                to: destination.to_path_buf(),
                source: e,
            })
    }

    /// The source must still hold the planned content before it is deleted.
    fn confirm_source(entry: &PlanEntry, source: &Path) -> Result<(), Error> {
        let expected = &entry.content_id.content_hash;
        let actual = hasher::hash_file(source).map_err(|e| Error::StageFailed {
            from: source.to_path_buf(),
            to: PathBuf::from(&entry.destination_path),
            source: e,
        })?;
        if &actual != expected {
            return Err(Error::VerifyMismatch {
                path: source.to_path_buf(),
                expected: expected.clone(),
                actual,
            });
        }
        Ok(())
    }

    fn simulate_entry(&self, entry: &PlanEntry) -> Result<EntryOutcome, Error> {
        let source = Path::new(&entry.source_path);
        if !source.exists() {
            return Ok(self.missing_source_outcome(entry));
        }
        if let Some(outcome) = self.keeper_lost(entry) {
            return Ok(outcome);
        }

        let natural = PathBuf::from(&entry.destination_path);
        let size = Self::source_size(source, &natural)?;
        Self::confirm_source(entry, source)?;

        let destination = if natural.exists()
            && !fsops::holds_content(&natural, &entry.content_id.content_hash)
        {
            match resolve_collision(natural.clone(), self.collision_policy, |p| p.exists()) {
                Some(destination) => destination,
                None => {
                    return Ok(self.collision_skip(entry));
                }
            }
        } else {
            natural
        };

        Ok(EntryOutcome::new(
            &entry.rollback_key,
            &entry.source_path,
            &destination.to_string_lossy(),
            OutcomeKind::WouldApply,
        )
        .with_bytes(size))
    }

    fn collision_skip(&self, entry: &PlanEntry) -> EntryOutcome {
        warn!(
            "{}: destination {} holds different content",
            entry.rollback_key, entry.destination_path
        );
        EntryOutcome::new(
            &entry.rollback_key,
            &entry.source_path,
            &entry.destination_path,
            OutcomeKind::Skipped,
        )
        .with_detail("destination occupied by different content")
    }

    fn commit_entry(
        &self,
        entry: &PlanEntry,
        checkpoint: &mut CheckpointWriter,
    ) -> Result<EntryOutcome, Error> {
        let source = Path::new(&entry.source_path);
        let expected = &entry.content_id.content_hash;

        if !source.exists() {
            return Ok(self.missing_source_outcome(entry));
        }
        if let Some(outcome) = self.keeper_lost(entry) {
            return Ok(outcome);
        }

        // Interrupted after the checkpoint append: only the delete is left.
        let recorded = checkpoint
            .manifest()
            .find_source(&entry.source_path)
            .filter(|m| fsops::holds_content(Path::new(&m.destination), expected))
            .cloned();
        if let Some(recorded) = recorded {
            Self::confirm_source(entry, source)?;
            let destination = PathBuf::from(&recorded.destination);
            self.remove_source(entry, source, &destination)?;
            return Ok(self
                .applied(entry, &destination, recorded.size)
                .with_detail("completed interrupted move"));
        }

        let mut destination = PathBuf::from(&entry.destination_path);
        let size = Self::source_size(source, &destination)?;

        if destination.exists() {
            if fsops::holds_content(&destination, expected) {
                // Interrupted after publish: adopt the verified copy.
                Self::confirm_source(entry, source)?;
                debug!("{}: adopting {}", entry.rollback_key, destination.display());
                self.record_and_remove(entry, checkpoint, source, &destination, size)?;
                return Ok(self
                    .applied(entry, &destination, size)
                    .with_detail("adopted existing copy"));
            }
            match resolve_collision(destination.clone(), self.collision_policy, |p| p.exists()) {
                Some(alternate) => destination = alternate,
                None => return Ok(self.collision_skip(entry)),
            }
        }

        let staging = fsops::partial_path(&destination);
        fsops::stage_copy(source, &staging)?;
        self.phase(entry, ApplyPhase::Staged, source, &destination);

        fsops::verify_staged(&staging, expected).map_err(|e| match e {
            Error::VerifyMismatch {
                expected, actual, ..
            } => Error::VerifyMismatch {
                path: source.to_path_buf(),
                expected,
                actual,
            },
            other => other,
        })?;
        self.phase(entry, ApplyPhase::Verified, source, &destination);

        fsops::publish(&staging, &destination)?;
        self.phase(entry, ApplyPhase::Published, source, &destination);

        self.record_and_remove(entry, checkpoint, source, &destination, size)?;
        Ok(self.applied(entry, &destination, size))
    }

    fn record_and_remove(
        &self,
        entry: &PlanEntry,
        checkpoint: &mut CheckpointWriter,
        source: &Path,
        destination: &Path,
        size: u64,
    ) -> Result<(), Error> {
        checkpoint.append(CheckpointMove {
            source: entry.source_path.clone(),
            destination: destination.to_string_lossy().into_owned(),
            content_hash: entry.content_id.content_hash.clone(),
            size,
            rollback_key: entry.rollback_key.clone(),
        })?;
        self.phase(entry, ApplyPhase::Checkpointed, source, destination);
        self.remove_source(entry, source, destination)
    }

    fn remove_source(&self, entry: &PlanEntry, source: &Path, destination: &Path) -> Result<(), Error> {
        fsops::remove_file(source)?;
        self.phase(entry, ApplyPhase::SourceRemoved, source, destination);
        Ok(())
    }

    fn applied(&self, entry: &PlanEntry, destination: &Path, size: u64) -> EntryOutcome {
        EntryOutcome::new(
            &entry.rollback_key,
            &entry.source_path,
            &destination.to_string_lossy(),
            OutcomeKind::Applied,
        )
        .with_bytes(size)
    }

    fn phase(&self, entry: &PlanEntry, phase: ApplyPhase, source: &Path, destination: &Path) {
        self.sink
            .emit(&Event::phase(&entry.rollback_key, phase, source, destination));
    }
}
