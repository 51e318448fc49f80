pub mod context;
pub mod pool;
pub mod walk;

pub use context::{ArchiveHeuristic, ContextClassifier, FixedContext};
pub use walk::{discover_files, IgnoreSet};
