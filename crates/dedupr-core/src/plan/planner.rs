use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::model::{duplicate_reason, rollback_key, Operation, PlanEntry, PlanStatus};
use super::naming::{resolve_collision, HoldingArea};
use crate::config::{AppConfig, CollisionPolicy};
use crate::error::Error;
use crate::events::{Event, EventSink};
use crate::storage::models::DuplicateGroup;
use crate::storage::Database;

/// Reason given to a member left in place under the skip collision policy.
pub const SLOT_TAKEN_REASON: &str = "holding slot taken";

/// Builds a relocation plan from the index. Reads the index and checks
/// destinations for existence; never writes anything.
pub struct Planner {
    holding: HoldingArea,
    collision_policy: CollisionPolicy,
}

impl Planner {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            holding: HoldingArea::from_config(&config.holding_dir),
            collision_policy: config.collision_policy,
        }
    }

    pub fn plan(&self, db: &Database, sink: &dyn EventSink) -> Result<Vec<PlanEntry>, Error> {
        if db.completed_scan_runs()? == 0 {
            return Err(Error::EmptyIndex);
        }

        let groups = db.get_duplicate_groups()?;
        let timestamp = chrono::Utc::now().to_rfc3339();
        let mut reserved: HashSet<PathBuf> = HashSet::new();
        let mut entries: Vec<PlanEntry> = Vec::new();

        for group in &groups {
            let keeper = select_keeper(group);
            let before = entries.len();

            for source in group.paths.iter().filter(|p| *p != keeper) {
                let natural = self.holding.destination_for(Path::new(source));
                let resolved = resolve_collision(natural.clone(), self.collision_policy, |p| {
                    reserved.contains(p) || p.exists()
                });
                let (status, destination, reason) = match resolved {
                    Some(destination) => {
                        reserved.insert(destination.clone());
                        (PlanStatus::Planned, destination, duplicate_reason(keeper))
                    }
                    None => {
                        warn!("Holding slot for {} is taken, leaving it in place", source);
                        (PlanStatus::Skipped, natural, SLOT_TAKEN_REASON.to_string())
                    }
                };

                entries.push(PlanEntry {
                    status,
                    operation: Operation::Move,
                    source_path: source.clone(),
                    destination_path: destination.to_string_lossy().into_owned(),
                    content_id: group.identity.clone(),
                    reason,
                    rollback_key: rollback_key(entries.len()),
                    timestamp: timestamp.clone(),
                });
            }

            let relocated = entries[before..]
                .iter()
                .filter(|e| e.status == PlanStatus::Planned)
                .count();
            debug!(
                "Group {}: keeping {}, relocating {}",
                group.identity, keeper, relocated
            );
            sink.emit(&Event::PlanGroup {
                content_id: group.identity.to_string(),
                keeper: keeper.clone(),
                relocated,
            });
        }

        info!(
            "Planned {} moves across {} duplicate groups",
            entries
                .iter()
                .filter(|e| e.status == PlanStatus::Planned)
                .count(),
            groups.len()
        );
        Ok(entries)
    }
}

/// Shortest path wins; ties go to the lexically smallest.
pub fn select_keeper(group: &DuplicateGroup) -> &String {
    group
        .paths
        .iter()
        .min_by(|a, b| {
            a.chars()
                .count()
                .cmp(&b.chars().count())
                .then_with(|| a.cmp(b))
        })
        .unwrap_or(&group.paths[0])
}
