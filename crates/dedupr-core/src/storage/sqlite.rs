use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::Error;

/// Schema version this build reads and writes, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 3;

/// Version 0: the original file table, before context tagging existed.
const BASE_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS files (
        path TEXT PRIMARY KEY,
        size INTEGER NOT NULL,
        mtime INTEGER NOT NULL,
        content_hash TEXT NOT NULL
     );
     CREATE INDEX IF NOT EXISTS idx_files_hash ON files (content_hash);";

/// Forward-only steps, applied in order to bring a store up to `SCHEMA_VERSION`.
const MIGRATIONS: &[(i64, &str, &str)] = &[
    (
        1,
        "context_tag column (existing rows become unarchived)",
        "ALTER TABLE files ADD COLUMN context_tag TEXT NOT NULL DEFAULT 'unarchived';",
    ),
    (
        2,
        "identity index",
        "CREATE INDEX IF NOT EXISTS idx_files_identity ON files (content_hash, context_tag);",
    ),
    (
        3,
        "scan_run table",
        "CREATE TABLE IF NOT EXISTS scan_run (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            status TEXT NOT NULL DEFAULT 'running',
            root_paths TEXT NOT NULL,
            files_scanned INTEGER NOT NULL DEFAULT 0,
            bytes_scanned INTEGER NOT NULL DEFAULT 0,
            errors INTEGER NOT NULL DEFAULT 0
         );",
    ),
];

pub struct Database {
    conn: Connection,
    path: String,
}

fn corrupt(path: &str, e: rusqlite::Error) -> Error {
    Error::IndexCorrupt {
        path: path.to_string(),
        reason: e.to_string(),
    }
}

impl Database {
    pub fn open(path: &str) -> Result<Self, Error> {
        let conn = Connection::open(path).map_err(|e| corrupt(path, e))?;
        Self::init(conn, path)
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory().map_err(|e| corrupt(":memory:", e))?;
        Self::init(conn, ":memory:")
    }

    fn init(conn: Connection, path: &str) -> Result<Self, Error> {
        let db = Database {
            conn,
            path: path.to_string(),
        };
        db.configure_pragmas().map_err(|e| corrupt(path, e))?;
        db.migrate_schema()?;
        Ok(db)
    }

    fn configure_pragmas(&self) -> rusqlite::Result<()> {
        // journal_mode returns a row, so it cannot go through execute_batch
        let mode: String = self
            .conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        self.conn.execute_batch(
            "PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA busy_timeout = 5000;",
        )?;
        debug!("SQLite pragmas configured (journal_mode={}, 64MB cache)", mode);
        Ok(())
    }

    pub fn schema_version(&self) -> rusqlite::Result<i64> {
        self.conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
    }

    /// Bring the store forward to `SCHEMA_VERSION`.
    ///
    /// All pending steps and the version bump share one transaction: either the
    /// store ends up fully current or it is left exactly as it was found.
    fn migrate_schema(&self) -> Result<(), Error> {
        let version = self.schema_version().map_err(|e| corrupt(&self.path, e))?;

        if version > SCHEMA_VERSION {
            return Err(Error::IndexCorrupt {
                path: self.path.clone(),
                reason: format!(
                    "schema version {} is newer than supported version {}",
                    version, SCHEMA_VERSION
                ),
            });
        }
        if version == SCHEMA_VERSION {
            debug!("Index schema is current (version {})", version);
            return Ok(());
        }

        let failed = |v: i64| move |source: rusqlite::Error| Error::MigrationFailed { version: v, source };

        let tx = self.conn.unchecked_transaction().map_err(failed(version + 1))?;
        if version == 0 {
            tx.execute_batch(BASE_SCHEMA).map_err(failed(0))?;
        }
        for (step, description, sql) in MIGRATIONS.iter().filter(|(v, _, _)| *v > version) {
            debug!("Applying index migration v{}: {}", step, description);
            tx.execute_batch(sql).map_err(failed(*step))?;
        }
        tx.execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
            .map_err(failed(SCHEMA_VERSION))?;
        tx.commit().map_err(failed(SCHEMA_VERSION))?;

        info!(
            "Index schema migrated from version {} to {}",
            version, SCHEMA_VERSION
        );
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}
