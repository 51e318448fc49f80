pub mod applier;
pub mod checkpoint;
pub mod fsops;
pub mod rollback;
pub mod status;
pub mod verify;

pub use applier::Applier;
pub use checkpoint::{CheckpointManifest, CheckpointMove, CheckpointWriter};
pub use rollback::rollback;
pub use status::{status_path, ApplyStatus, EntryOutcome, OutcomeKind, RunOutcome};
pub use verify::{verify, VerifyReport};
