use super::models::*;
use super::sqlite::Database;
use rusqlite::{params, OptionalExtension, Result, Row};
use std::collections::HashMap;
use std::path::MAIN_SEPARATOR;
use tracing::debug;

fn file_record_from_row(row: &Row<'_>) -> Result<FileRecord> {
    Ok(FileRecord {
        path: row.get(0)?,
        size: row.get(1)?,
        last_modified: row.get(2)?,
        content_hash: row.get(3)?,
        context_tag: row.get(4)?,
    })
}

impl Database {
    // ── Files ────────────────────────────────────────────────────

    /// Insert or update by path. Identity collisions between rows are expected.
    pub fn upsert_files(&self, files: &[FileRecord]) -> Result<usize> {
        let tx = self.connection().unchecked_transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO files (path, size, mtime, content_hash, context_tag) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(path) DO UPDATE SET \
                     size = excluded.size, \
                     mtime = excluded.mtime, \
                     content_hash = excluded.content_hash, \
                     context_tag = excluded.context_tag",
            )?;
            for file in files {
                count += stmt.execute(params![
                    file.path,
                    file.size,
                    file.last_modified,
                    file.content_hash,
                    file.context_tag,
                ])?;
            }
        }
        tx.commit()?;
        debug!("Upserted {} file records", count);
        Ok(count)
    }

    pub fn upsert(&self, file: &FileRecord) -> Result<()> {
        self.upsert_files(std::slice::from_ref(file)).map(|_| ())
    }

    pub fn get_file(&self, path: &str) -> Result<Option<FileRecord>> {
        self.connection()
            .query_row(
                "SELECT path, size, mtime, content_hash, context_tag FROM files WHERE path = ?1",
                params![path],
                file_record_from_row,
            )
            .optional()
    }

    /// Drop a path that no longer exists on disk. Returns whether a row was removed.
    pub fn record_removed(&self, path: &str) -> Result<bool> {
        let removed = self
            .connection()
            .execute("DELETE FROM files WHERE path = ?1", params![path])?;
        Ok(removed > 0)
    }

    pub fn count_files(&self) -> Result<i64> {
        self.connection()
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))
    }

    pub fn file_fingerprints(&self) -> Result<HashMap<String, Fingerprint>> {
        let mut stmt = self
            .connection()
            .prepare("SELECT path, size, mtime, content_hash FROM files")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                Fingerprint {
                    size: row.get(1)?,
                    last_modified: row.get(2)?,
                    content_hash: row.get(3)?,
                },
            ))
        })?;
        let fingerprints = rows.collect::<Result<HashMap<_, _>>>()?;
        Ok(fingerprints)
    }

    /// Every indexed path equal to `root` or nested below it.
    pub fn paths_under(&self, root: &str) -> Result<Vec<String>> {
        let prefix = if root.ends_with(MAIN_SEPARATOR) {
            root.to_string()
        } else {
            format!("{}{}", root, MAIN_SEPARATOR)
        };
        let mut stmt = self.connection().prepare(
            "SELECT path FROM files \
             WHERE path = ?1 OR substr(path, 1, length(?2)) = ?2 \
             ORDER BY path",
        )?;
        let paths = stmt
            .query_map(params![root, prefix], |row| row.get(0))?
            .collect::<Result<Vec<String>>>()?;
        Ok(paths)
    }

    // ── Duplicate Groups ─────────────────────────────────────────

    /// Groups of two or more files sharing `(content_hash, context_tag)`.
    ///
    /// Groups come back ordered by identity and members by path, so keeper
    /// selection downstream is reproducible.
    pub fn get_duplicate_groups(&self) -> Result<Vec<DuplicateGroup>> {
        let mut stmt = self.connection().prepare(
            "SELECT f.content_hash, f.context_tag, f.path, f.size \
             FROM files f \
             JOIN (SELECT content_hash, context_tag FROM files \
                   GROUP BY content_hash, context_tag HAVING COUNT(*) > 1) d \
               ON f.content_hash = d.content_hash AND f.context_tag = d.context_tag \
             ORDER BY f.content_hash, f.context_tag, f.path",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                ContentIdentity {
                    content_hash: row.get(0)?,
                    context_tag: row.get(1)?,
                },
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut groups: Vec<DuplicateGroup> = Vec::new();
        for row in rows {
            let (identity, path, size) = row?;
            match groups.last_mut() {
                Some(group) if group.identity == identity => group.paths.push(path),
                _ => groups.push(DuplicateGroup {
                    identity,
                    file_size: size,
                    paths: vec![path],
                }),
            }
        }
        debug!("Found {} duplicate groups", groups.len());
        Ok(groups)
    }

    // ── Scan Runs ────────────────────────────────────────────────

    pub fn begin_scan_run(&self, root_paths: &[String]) -> Result<i64> {
        let mut sorted = root_paths.to_vec();
        sorted.sort();
        let paths_json = serde_json::to_string(&sorted).unwrap_or_default();
        let now = chrono::Utc::now().to_rfc3339();
        self.connection().execute(
            "INSERT INTO scan_run (started_at, status, root_paths) VALUES (?1, 'running', ?2)",
            params![now, paths_json],
        )?;
        Ok(self.connection().last_insert_rowid())
    }

    pub fn complete_scan_run(
        &self,
        run_id: i64,
        files_scanned: i64,
        bytes_scanned: i64,
        errors: i64,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.connection().execute(
            "UPDATE scan_run SET completed_at = ?1, status = 'completed', \
             files_scanned = ?2, bytes_scanned = ?3, errors = ?4 WHERE id = ?5",
            params![now, files_scanned, bytes_scanned, errors, run_id],
        )?;
        Ok(())
    }

    pub fn completed_scan_runs(&self) -> Result<i64> {
        self.connection().query_row(
            "SELECT COUNT(*) FROM scan_run WHERE status = 'completed'",
            [],
            |row| row.get(0),
        )
    }

    pub fn latest_scan_run(&self) -> Result<Option<ScanRun>> {
        self.connection()
            .query_row(
                "SELECT id, started_at, completed_at, status, root_paths, \
                        files_scanned, bytes_scanned, errors \
                 FROM scan_run ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok(ScanRun {
                        id: row.get(0)?,
                        started_at: row.get(1)?,
                        completed_at: row.get(2)?,
                        status: row.get(3)?,
                        root_paths: row.get(4)?,
                        files_scanned: row.get(5)?,
                        bytes_scanned: row.get(6)?,
                        errors: row.get(7)?,
                    })
                },
            )
            .optional()
    }
}
