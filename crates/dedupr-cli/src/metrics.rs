use anyhow::Context;
use dedupr_core::commit::ApplyStatus;
use dedupr_core::ScanResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyCounters {
    pub attempted: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub errors: usize,
    pub bytes_moved: u64,
    pub dry_run: bool,
}

impl From<&ApplyStatus> for ApplyCounters {
    fn from(status: &ApplyStatus) -> Self {
        Self {
            attempted: status.attempted,
            succeeded: status.succeeded,
            skipped: status.skipped,
            errors: status.errors,
            bytes_moved: status.bytes_moved,
            dry_run: status.dry_run,
        }
    }
}

/// Rolling summary of the most recent scan, plan and apply, kept in one
/// JSON file that each command updates in place.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunMetrics {
    pub timestamp: String,
    pub last_command: String,
    pub files_scanned: usize,
    pub bytes_scanned: u64,
    pub files_hashed: usize,
    pub files_reused: usize,
    pub scan_errors: usize,
    pub duplicate_groups: usize,
    pub wasted_bytes: u64,
    pub planned_operations: usize,
    pub last_apply: Option<ApplyCounters>,
    /// Seconds per phase.
    pub durations: BTreeMap<String, f64>,
}

impl RunMetrics {
    /// Previous metrics, or empty ones when the file is absent or unreadable.
    pub fn load(path: &Path) -> Self {
        fs::read_to_string(path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }

    pub fn record_scan(&mut self, result: &ScanResult) {
        self.files_scanned = result.files_scanned;
        self.bytes_scanned = result.bytes_scanned;
        self.files_hashed = result.files_hashed;
        self.files_reused = result.files_reused;
        self.scan_errors = result.errors;
        self.duplicate_groups = result.duplicate_groups;
        self.wasted_bytes = result.wasted_bytes;
        self.duration("scan", result.scan_duration);
        self.duration("hash", result.hash_duration);
        self.duration("db_write", result.db_write_duration);
    }

    pub fn record_plan(&mut self, planned: usize, elapsed: Duration) {
        self.planned_operations = planned;
        self.duration("plan", elapsed);
    }

    pub fn record_apply(&mut self, status: &ApplyStatus, elapsed: Duration) {
        self.last_apply = Some(ApplyCounters::from(status));
        self.duration("apply", elapsed);
    }

    pub fn duration(&mut self, phase: &str, elapsed: Duration) {
        self.durations
            .insert(phase.to_string(), elapsed.as_secs_f64());
    }

    pub fn save(&mut self, path: &Path, command: &str) -> anyhow::Result<()> {
        self.timestamp = chrono::Utc::now().to_rfc3339();
        self.last_command = command.to_string();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("writing metrics to {}", path.display()))?;
        Ok(())
    }
}

/// Contents of the metrics file for display, `{}` when there is none yet.
pub fn render(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_renders_empty_object() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(render(&dir.path().join("none.json")), "{}");
        assert_eq!(RunMetrics::load(&dir.path().join("none.json")).planned_operations, 0);
    }

    #[test]
    fn test_updates_accumulate_across_commands() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");

        let mut metrics = RunMetrics::load(&path);
        metrics.record_scan(&ScanResult {
            files_scanned: 6,
            duplicate_groups: 2,
            ..ScanResult::default()
        });
        metrics.save(&path, "scan").unwrap();

        let mut metrics = RunMetrics::load(&path);
        metrics.record_plan(3, Duration::from_millis(250));
        metrics.save(&path, "plan").unwrap();

        let loaded = RunMetrics::load(&path);
        assert_eq!(loaded.files_scanned, 6);
        assert_eq!(loaded.duplicate_groups, 2);
        assert_eq!(loaded.planned_operations, 3);
        assert_eq!(loaded.last_command, "plan");
        assert_eq!(loaded.durations.get("plan"), Some(&0.25));
        assert!(loaded.durations.contains_key("scan"));
    }
}
