use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

use dedupr_core::config::CollisionPolicy;
use dedupr_core::plan::{read_plan, write_plan, PlanStatus};
use dedupr_core::storage::Database;
use dedupr_core::{AppConfig, Error, Planner, ScanEngine, SilentSink};

fn config_for(root: &Path) -> AppConfig {
    AppConfig {
        root_paths: vec![root.to_string_lossy().into_owned()],
        worker_count: 2,
        ..AppConfig::default()
    }
}

fn scanned(config: &AppConfig) -> Database {
    let db = Database::open_in_memory().unwrap();
    ScanEngine::new(config.clone())
        .scan_into(&db, &SilentSink)
        .unwrap();
    db
}

fn canonical_root(tmp: &Path) -> PathBuf {
    let root = tmp.join("data");
    fs::create_dir_all(&root).unwrap();
    fs::canonicalize(root).unwrap()
}

#[test]
fn test_plan_before_any_scan_is_empty_index() {
    let db = Database::open_in_memory().unwrap();
    let planner = Planner::new(&AppConfig::default());
    assert!(matches!(
        planner.plan(&db, &SilentSink),
        Err(Error::EmptyIndex)
    ));
}

#[test]
fn test_scanned_tree_without_duplicates_plans_nothing() {
    let tmp = tempdir().unwrap();
    let root = canonical_root(tmp.path());
    fs::write(root.join("a.txt"), "one").unwrap();
    fs::write(root.join("b.txt"), "two").unwrap();

    let config = config_for(&root);
    let db = scanned(&config);
    let plan = Planner::new(&config).plan(&db, &SilentSink).unwrap();
    assert!(plan.is_empty());
}

#[test]
fn test_plan_moves_every_non_keeper() {
    let tmp = tempdir().unwrap();
    let root = canonical_root(tmp.path());
    fs::create_dir_all(root.join("deep/er")).unwrap();
    fs::write(root.join("a.txt"), "same").unwrap();
    fs::write(root.join("deep/a.txt"), "same").unwrap();
    fs::write(root.join("deep/er/a.txt"), "same").unwrap();

    let config = config_for(&root);
    let db = scanned(&config);
    let plan = Planner::new(&config).plan(&db, &SilentSink).unwrap();

    assert_eq!(plan.len(), 2);
    let keeper = root.join("a.txt").to_string_lossy().into_owned();
    for (i, entry) in plan.iter().enumerate() {
        assert_eq!(entry.status, PlanStatus::Planned);
        assert_ne!(entry.source_path, keeper);
        assert!(entry.reason.contains(&keeper));
        assert_eq!(entry.rollback_key, format!("rbk:{:06}", i));
        assert!(entry
            .destination_path
            .contains(dedupr_core::config::DEFAULT_HOLDING_DIR));
        assert!(!Path::new(&entry.destination_path).exists());
    }
}

#[test]
fn test_existing_destination_gets_suffix() {
    let tmp = tempdir().unwrap();
    let root = canonical_root(tmp.path());
    fs::create_dir_all(root.join("sub/.dedupr_duplicates")).unwrap();
    fs::write(root.join("a.txt"), "same").unwrap();
    fs::write(root.join("sub/a.txt"), "same").unwrap();
    fs::write(root.join("sub/.dedupr_duplicates/a.txt"), "occupied").unwrap();

    let config = config_for(&root);
    let db = scanned(&config);
    let plan = Planner::new(&config).plan(&db, &SilentSink).unwrap();

    assert_eq!(plan.len(), 1);
    assert_eq!(
        PathBuf::from(&plan[0].destination_path),
        root.join("sub/.dedupr_duplicates/a (1).txt")
    );
}

#[test]
fn test_skip_policy_records_collisions_as_skipped() {
    let tmp = tempdir().unwrap();
    let root = canonical_root(tmp.path());
    fs::create_dir_all(root.join("sub/.dedupr_duplicates")).unwrap();
    fs::write(root.join("a.txt"), "same").unwrap();
    fs::write(root.join("sub/a.txt"), "same").unwrap();
    fs::write(root.join("sub/.dedupr_duplicates/a.txt"), "occupied").unwrap();

    let config = AppConfig {
        collision_policy: CollisionPolicy::Skip,
        ..config_for(&root)
    };
    let db = scanned(&config);
    let plan = Planner::new(&config).plan(&db, &SilentSink).unwrap();

    assert_eq!(plan.len(), 1);
    let entry = &plan[0];
    assert_eq!(entry.status, PlanStatus::Skipped);
    assert_eq!(entry.reason, "holding slot taken");
    assert_eq!(entry.source_path, root.join("sub/a.txt").to_string_lossy());
    assert_eq!(
        entry.destination_path,
        root.join("sub/.dedupr_duplicates/a.txt").to_string_lossy()
    );
    assert_eq!(
        fs::read_to_string(root.join("sub/.dedupr_duplicates/a.txt")).unwrap(),
        "occupied"
    );
}

#[test]
fn test_absolute_holding_dir_mirrors_sources() {
    let tmp = tempdir().unwrap();
    let root = canonical_root(tmp.path());
    let holding = tmp.path().join("holding");
    fs::create_dir_all(root.join("x")).unwrap();
    fs::write(root.join("k1.txt"), "first").unwrap();
    fs::write(root.join("x/k1.txt"), "first").unwrap();
    fs::write(root.join("k2.txt"), "second").unwrap();
    fs::write(root.join("x/k2.txt"), "second").unwrap();

    let config = AppConfig {
        holding_dir: holding.to_string_lossy().into_owned(),
        ..config_for(&root)
    };
    let db = scanned(&config);
    let plan = Planner::new(&config).plan(&db, &SilentSink).unwrap();

    assert_eq!(plan.len(), 2);
    assert_ne!(plan[0].destination_path, plan[1].destination_path);
    for entry in &plan {
        let relative = Path::new(&entry.source_path).strip_prefix("/").unwrap();
        assert_eq!(PathBuf::from(&entry.destination_path), holding.join(relative));
    }
}

#[test]
fn test_archived_copies_are_not_grouped_with_plain_ones() {
    let tmp = tempdir().unwrap();
    let root = canonical_root(tmp.path());
    fs::create_dir_all(root.join("backup_extracted")).unwrap();
    fs::write(root.join("a.txt"), "same").unwrap();
    fs::write(root.join("backup_extracted/a.txt"), "same").unwrap();

    let config = config_for(&root);
    let db = scanned(&config);
    let plan = Planner::new(&config).plan(&db, &SilentSink).unwrap();

    assert_eq!(plan.len(), 1);
    let entry = &plan[0];
    assert_eq!(entry.status, PlanStatus::Skipped);
    assert_eq!(entry.reason, "holding slot taken");
    assert_eq!(entry.source_path, root.join("sub/a.txt").to_string_lossy());
    assert_eq!(
        entry.destination_path,
        root.join("sub/.dedupr_duplicates/a.txt").to_string_lossy()
    );
    assert_eq!(
        fs::read_to_string(root.join("sub/.dedupr_duplicates/a.txt")).unwrap(),
        "occupied"
    );
}

#[test]
fn test_plan_survives_csv() {
    let tmp = tempdir().unwrap();
    let root = canonical_root(tmp.path());
    fs::write(root.join("a, with comma.txt"), "same").unwrap();
    fs::write(root.join("b \"quoted\".txt"), "same").unwrap();

    let config = config_for(&root);
    let db = scanned(&config);
    let plan = Planner::new(&config).plan(&db, &SilentSink).unwrap();
    assert_eq!(plan.len(), 1);

    let plan_path = tmp.path().join("plan.csv");
    write_plan(&plan_path, &plan).unwrap();
    assert_eq!(read_plan(&plan_path).unwrap(), plan);
}
