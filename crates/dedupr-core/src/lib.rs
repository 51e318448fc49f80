pub mod commit;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod hasher;
pub mod plan;
pub mod platform;
pub mod scanner;
pub mod storage;

pub use commit::{rollback, verify, Applier, ApplyStatus, RunOutcome, VerifyReport};
pub use config::AppConfig;
pub use engine::{ScanEngine, ScanResult};
pub use error::Error;
pub use events::{Event, EventSink, SilentSink, TracingSink};
pub use plan::{PlanEntry, Planner};
pub use storage::Database;
