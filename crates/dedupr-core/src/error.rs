use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Index at '{path}' is corrupt or unreadable: {reason}")]
    IndexCorrupt { path: String, reason: String },

    #[error("Index migration to schema version {version} failed: {source}")]
    MigrationFailed {
        version: i64,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Index is empty: no scan has been completed yet")]
    EmptyIndex,

    #[error("Staging copy {} -> {} failed: {source}", .from.display(), .to.display())]
    StageFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Hash mismatch for {}: expected {expected}, got {actual}", .path.display())]
    VerifyMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Publishing {} failed: {reason}", .path.display())]
    PublishFailed { path: PathBuf, reason: String },

    #[error("Checkpoint {} could not be written durably: {source}", .path.display())]
    CheckpointWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Checkpoint {} could not be read: {reason}", .path.display())]
    CheckpointRead { path: PathBuf, reason: String },

    #[error("Source {} is missing", .0.display())]
    SourceMissing(PathBuf),

    #[error("Cannot restore {}: a different file already exists there", .0.display())]
    RestoreConflict(PathBuf),

    #[error("Removing {} failed: {source}", .path.display())]
    RemoveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Plan {} could not be read: {reason}", .path.display())]
    PlanRead { path: PathBuf, reason: String },

    #[error("Plan {} could not be written: {reason}", .path.display())]
    PlanWrite { path: PathBuf, reason: String },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Errors that make the whole run unusable rather than a single entry.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::StageFailed { .. }
                | Error::VerifyMismatch { .. }
                | Error::PublishFailed { .. }
                | Error::SourceMissing(_)
                | Error::RestoreConflict(_)
                | Error::RemoveFailed { .. }
        )
    }
}
