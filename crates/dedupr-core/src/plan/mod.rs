pub mod model;
pub mod naming;
pub mod planner;

pub use model::{read_plan, write_plan, Operation, PlanEntry, PlanStatus};
pub use naming::HoldingArea;
pub use planner::Planner;
