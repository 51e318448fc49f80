use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

/// Steps of a single three-phase commit, in the order they happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyPhase {
    Staged,
    Verified,
    Published,
    Checkpointed,
    SourceRemoved,
}

/// One significant action taken by the pipeline.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    ScanStarted {
        roots: Vec<String>,
        workers: usize,
    },
    FileScanned {
        path: String,
        size: u64,
        rehashed: bool,
    },
    FileSkipped {
        path: String,
        error: String,
    },
    FileRemoved {
        path: String,
    },
    ScanCompleted {
        files: usize,
        bytes: u64,
        errors: usize,
    },
    PlanGroup {
        content_id: String,
        keeper: String,
        relocated: usize,
    },
    ApplyPhase {
        rollback_key: String,
        phase: ApplyPhase,
        source: String,
        destination: String,
    },
    ApplyEntryFailed {
        rollback_key: String,
        source: String,
        error: String,
    },
    RollbackStep {
        source: String,
        destination: String,
        outcome: String,
    },
    VerifyEntry {
        destination: String,
        ok: bool,
    },
}

impl Event {
    pub(crate) fn phase(rollback_key: &str, phase: ApplyPhase, source: &Path, destination: &Path) -> Self {
        Event::ApplyPhase {
            rollback_key: rollback_key.to_string(),
            phase,
            source: source.to_string_lossy().into_owned(),
            destination: destination.to_string_lossy().into_owned(),
        }
    }
}

/// Receives structured events from the core.
///
/// The core only emits; storage, formatting and rotation belong to the implementor.
/// The CLI wires a JSON Lines log and an indicatif display behind this trait.
pub trait EventSink: Send + Sync {
    fn emit(&self, _event: &Event) {}
}

/// No-op sink for silent operation.
pub struct SilentSink;

impl EventSink for SilentSink {}

/// Forwards every event to `tracing`.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &Event) {
        match event {
            Event::FileSkipped { path, error } => warn!("Skipped {}: {}", path, error),
            Event::ApplyEntryFailed {
                rollback_key,
                source,
                error,
            } => warn!("[{}] {} failed: {}", rollback_key, source, error),
            Event::ScanStarted { .. } | Event::ScanCompleted { .. } => info!("{:?}", event),
            _ => debug!("{:?}", event),
        }
    }
}
