use rusqlite::Connection;
use tempfile::tempdir;

use dedupr_core::storage::models::*;
use dedupr_core::storage::{Database, SCHEMA_VERSION};
use dedupr_core::Error;

const HASH_A: &str = "1111111111111111111111111111111111111111111111111111111111111111";
const HASH_B: &str = "2222222222222222222222222222222222222222222222222222222222222222";

fn record(path: &str, size: i64, hash: &str, tag: ContextTag) -> FileRecord {
    FileRecord {
        path: path.to_string(),
        size,
        last_modified: 1700000000,
        content_hash: hash.to_string(),
        context_tag: tag,
    }
}

fn create_legacy_store(path: &str, extra_column: bool) {
    let conn = Connection::open(path).unwrap();
    let context_column = if extra_column {
        ", context_tag TEXT NOT NULL DEFAULT 'unarchived'"
    } else {
        ""
    };
    conn.execute_batch(&format!(
        "CREATE TABLE files (
            path TEXT PRIMARY KEY,
            size INTEGER NOT NULL,
            mtime INTEGER NOT NULL,
            content_hash TEXT NOT NULL{}
         );",
        context_column
    ))
    .unwrap();
    conn.execute(
        "INSERT INTO files (path, size, mtime, content_hash) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params!["/legacy/a.txt", 9, 1600000000, HASH_A],
    )
    .unwrap();
}

#[test]
fn test_fresh_store_is_current() {
    let db = Database::open_in_memory().unwrap();
    assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION);
    assert_eq!(db.count_files().unwrap(), 0);
    assert_eq!(db.completed_scan_runs().unwrap(), 0);
}

#[test]
fn test_legacy_rows_are_backfilled_unarchived() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("legacy.db");
    let path = path.to_str().unwrap();
    create_legacy_store(path, false);

    let db = Database::open(path).unwrap();
    assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION);
    let row = db.get_file("/legacy/a.txt").unwrap().unwrap();
    assert_eq!(row.context_tag, ContextTag::Unarchived);
    assert_eq!(row.content_hash, HASH_A);
    drop(db);

    // Opening again is a no-op.
    let db = Database::open(path).unwrap();
    assert_eq!(db.count_files().unwrap(), 1);
}

#[test]
fn test_failed_migration_leaves_store_untouched() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("half.db");
    let path = path.to_str().unwrap();
    // Claims version 0 but already has the column step 1 adds.
    create_legacy_store(path, true);

    match Database::open(path) {
        Err(Error::MigrationFailed { version, .. }) => assert_eq!(version, 1),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("migration should have failed"),
    }

    let conn = Connection::open(path).unwrap();
    let version: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap();
    assert_eq!(version, 0);
    let tables: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE name = 'scan_run'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(tables, 0);
}

#[test]
fn test_garbage_file_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("garbage.db");
    std::fs::write(&path, vec![0x42u8; 4096]).unwrap();
    assert!(matches!(
        Database::open(path.to_str().unwrap()),
        Err(Error::IndexCorrupt { .. })
    ));
}

#[test]
fn test_newer_schema_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("future.db");
    let path = path.to_str().unwrap();
    Connection::open(path)
        .unwrap()
        .execute_batch("PRAGMA user_version = 99")
        .unwrap();
    assert!(matches!(
        Database::open(path),
        Err(Error::IndexCorrupt { .. })
    ));
}

#[test]
fn test_groups_split_by_context_tag() {
    let db = Database::open_in_memory().unwrap();
    db.upsert_files(&[
        record("/r/a.txt", 9, HASH_A, ContextTag::Unarchived),
        record("/r/b.txt", 9, HASH_A, ContextTag::Unarchived),
        record("/r/x_extracted/a.txt", 9, HASH_A, ContextTag::Archived),
        record("/r/unique.txt", 4, HASH_B, ContextTag::Unarchived),
    ])
    .unwrap();

    let groups = db.get_duplicate_groups().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].identity.context_tag, ContextTag::Unarchived);
    assert_eq!(groups[0].paths, vec!["/r/a.txt", "/r/b.txt"]);
    assert_eq!(groups[0].wasted_bytes(), 9);
}

#[test]
fn test_upsert_replaces_by_path() {
    let db = Database::open_in_memory().unwrap();
    db.upsert(&record("/r/a.txt", 9, HASH_A, ContextTag::Unarchived))
        .unwrap();
    db.upsert(&record("/r/a.txt", 4, HASH_B, ContextTag::Unarchived))
        .unwrap();
    assert_eq!(db.count_files().unwrap(), 1);
    assert_eq!(db.get_file("/r/a.txt").unwrap().unwrap().content_hash, HASH_B);

    assert!(db.record_removed("/r/a.txt").unwrap());
    assert!(!db.record_removed("/r/a.txt").unwrap());
    assert_eq!(db.count_files().unwrap(), 0);
}

#[test]
fn test_paths_under_respects_component_boundary() {
    let db = Database::open_in_memory().unwrap();
    db.upsert_files(&[
        record("/data/a.txt", 1, HASH_A, ContextTag::Unarchived),
        record("/data2/b.txt", 1, HASH_B, ContextTag::Unarchived),
    ])
    .unwrap();
    assert_eq!(db.paths_under("/data").unwrap(), vec!["/data/a.txt"]);
}

#[test]
fn test_scan_run_lifecycle() {
    let db = Database::open_in_memory().unwrap();
    let id = db
        .begin_scan_run(&["/b".to_string(), "/a".to_string()])
        .unwrap();
    assert_eq!(db.completed_scan_runs().unwrap(), 0);

    db.complete_scan_run(id, 42, 100_000, 1).unwrap();
    assert_eq!(db.completed_scan_runs().unwrap(), 1);

    let run = db.latest_scan_run().unwrap().unwrap();
    assert_eq!(run.status, "completed");
    assert_eq!(run.files_scanned, 42);
    assert_eq!(run.errors, 1);
    assert_eq!(run.root_paths, r#"["/a","/b"]"#);
}
