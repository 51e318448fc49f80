use crate::config::{self, AppConfig};
use crate::error::Error;
use crate::events::{Event, EventSink};
use crate::scanner::pool::{self, HashedBatch};
use crate::scanner::{self, ArchiveHeuristic, ContextClassifier, IgnoreSet};
use crate::storage::models::FileRecord;
use crate::storage::Database;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

pub struct ScanEngine {
    config: AppConfig,
    db_path: String,
    classifier: Box<dyn ContextClassifier>,
}

#[derive(Debug, Default)]
pub struct ScanResult {
    pub scan_duration: Duration,
    pub hash_duration: Duration,
    pub db_write_duration: Duration,
    pub files_scanned: usize,
    pub bytes_scanned: u64,
    pub files_hashed: usize,
    pub files_reused: usize,
    pub files_removed: usize,
    pub errors: usize,
    pub duplicate_groups: usize,
    pub wasted_bytes: u64,
}

impl ScanEngine {
    pub fn new(config: AppConfig) -> Self {
        let db_path = config.db_path.clone();
        Self {
            config,
            db_path,
            classifier: Box::new(ArchiveHeuristic),
        }
    }

    pub fn with_db_path(mut self, path: &str) -> Self {
        self.db_path = path.to_string();
        self
    }

    /// Replace the archive-context heuristic.
    pub fn with_classifier(mut self, classifier: impl ContextClassifier + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    pub fn scan(&self, sink: &dyn EventSink) -> Result<ScanResult, Error> {
        let db = Database::open(&self.db_path)?;
        self.scan_into(&db, sink)
    }

    /// Run one scan pass into an already-open index:
    /// 1. Walk each root (ignore rules applied per path component)
    /// 2. Hash on a fixed-size worker pool, reusing hashes for unchanged files
    /// 3. Upsert records, drop rows for paths this pass did not index, close the scan run
    pub fn scan_into(&self, db: &Database, sink: &dyn EventSink) -> Result<ScanResult, Error> {
        let mut result = ScanResult::default();

        let mut canonical_roots: Vec<String> = Vec::new();
        for root in &self.config.root_paths {
            match fs::canonicalize(root) {
                Ok(p) if p.is_dir() => canonical_roots.push(p.to_string_lossy().into_owned()),
                Ok(p) => {
                    error!("Scan root {} is not a directory", p.display());
                    result.errors += 1;
                }
                Err(e) => {
                    error!("Scan root {} is unavailable: {}", root, e);
                    sink.emit(&Event::FileSkipped {
                        path: root.clone(),
                        error: e.to_string(),
                    });
                    result.errors += 1;
                }
            }
        }
        let roots = config::non_overlapping_directories(canonical_roots);
        info!("Processing directories: {:?}", roots);
        sink.emit(&Event::ScanStarted {
            roots: roots.clone(),
            workers: self.config.worker_count,
        });

        let run_id = db.begin_scan_run(&roots)?;
        let known = db.file_fingerprints()?;
        let ignore = IgnoreSet::new(&self.config.ignore_patterns);
        let hash_pool = pool::build_pool(self.config.worker_count)?;

        let mut records: Vec<FileRecord> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for root in &roots {
            let root_path = Path::new(root);

            info!("Scanning {}...", root);
            let scan_start = Instant::now();
            let discovery =
                scanner::discover_files(root_path, &ignore, self.config.include_empty_files);
            result.scan_duration += scan_start.elapsed();

            for (path, err) in &discovery.failures {
                sink.emit(&Event::FileSkipped {
                    path: path.to_string_lossy().into_owned(),
                    error: err.clone(),
                });
                seen.insert(path.to_string_lossy().into_owned());
            }
            result.errors += discovery.failures.len();
            seen.extend(
                discovery
                    .files
                    .iter()
                    .map(|f| f.path.to_string_lossy().into_owned()),
            );

            let hash_start = Instant::now();
            let HashedBatch {
                records: batch,
                failures,
                rehashed,
                reused,
            } = pool::hash_files(
                &hash_pool,
                root_path,
                &discovery.files,
                &known,
                self.classifier.as_ref(),
                sink,
            );
            result.hash_duration += hash_start.elapsed();
            debug!(
                "{}: {} files hashed, {} reused, {} failed",
                root,
                rehashed,
                reused,
                failures.len()
            );

            result.files_hashed += rehashed;
            result.files_reused += reused;
            result.errors += failures.len();
            records.extend(batch.into_iter().map(|(_, record)| record));
        }

        info!("Writing to index...");
        let db_start = Instant::now();
        db.upsert_files(&records)?;
        result.files_scanned = records.len();
        result.bytes_scanned = records.iter().map(|r| r.size as u64).sum();

        for root in &roots {
            for path in db.paths_under(root)? {
                // Unseen rows are stale whether the path vanished, became
                // ignored or shrank to zero bytes.
                if seen.contains(&path) {
                    continue;
                }
                if db.record_removed(&path)? {
                    debug!("Removed unseen path {} from index", path);
                    sink.emit(&Event::FileRemoved { path });
                    result.files_removed += 1;
                }
            }
        }

        db.complete_scan_run(
            run_id,
            result.files_scanned as i64,
            result.bytes_scanned as i64,
            result.errors as i64,
        )?;
        result.db_write_duration = db_start.elapsed();

        let groups = db.get_duplicate_groups()?;
        result.duplicate_groups = groups.len();
        result.wasted_bytes = groups.iter().map(|g| g.wasted_bytes() as u64).sum();

        sink.emit(&Event::ScanCompleted {
            files: result.files_scanned,
            bytes: result.bytes_scanned,
            errors: result.errors,
        });
        info!(
            "Scan complete: {} files, {} bytes, {} errors, {} duplicate groups",
            result.files_scanned, result.bytes_scanned, result.errors, result.duplicate_groups
        );

        Ok(result)
    }
}
