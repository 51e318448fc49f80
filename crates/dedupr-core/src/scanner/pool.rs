use dashmap::DashMap;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{error, trace};

use super::context::ContextClassifier;
use super::walk::DiscoveredFile;
use crate::error::Error;
use crate::events::{Event, EventSink};
use crate::hasher;
use crate::storage::models::{FileRecord, Fingerprint};

/// Fixed-size pool dedicated to hashing; never the global rayon pool.
pub fn build_pool(worker_count: usize) -> Result<ThreadPool, Error> {
    ThreadPoolBuilder::new()
        .num_threads(worker_count.max(1))
        .thread_name(|i| format!("dedupr-hash-{}", i))
        .build()
        .map_err(|e| Error::Other(format!("Failed to build hashing pool: {}", e)))
}

#[derive(Debug, Default)]
pub struct HashedBatch {
    /// Keyed by path; each key is written by exactly one worker.
    pub records: DashMap<String, FileRecord>,
    pub failures: DashMap<String, String>,
    pub rehashed: usize,
    pub reused: usize,
}

/// Hash every discovered file under `root` on `pool`.
///
/// A file whose size and mtime match `known` keeps its indexed hash. A file
/// that cannot be read is recorded in `failures` and does not stop the batch.
pub fn hash_files(
    pool: &ThreadPool,
    root: &Path,
    files: &[DiscoveredFile],
    known: &HashMap<String, Fingerprint>,
    classifier: &dyn ContextClassifier,
    sink: &dyn EventSink,
) -> HashedBatch {
    let records: DashMap<String, FileRecord> = DashMap::new();
    let failures: DashMap<String, String> = DashMap::new();
    let rehashed = AtomicUsize::new(0);
    let reused = AtomicUsize::new(0);

    pool.install(|| {
        files.par_iter().for_each(|file| {
            let path = file.path.to_string_lossy().into_owned();
            let size = file.size as i64;

            let cached = known
                .get(&path)
                .filter(|fp| fp.size == size && fp.last_modified == file.last_modified)
                .map(|fp| fp.content_hash.clone());

            let (content_hash, fresh) = match cached {
                Some(hash) => {
                    trace!("Reusing indexed hash for {}", path);
                    (hash, false)
                }
                None => match hasher::hash_file(&file.path) {
                    Ok(hash) => (hash, true),
                    Err(e) => {
                        error!("Error hashing '{}': {}", path, e);
                        sink.emit(&Event::FileSkipped {
                            path: path.clone(),
                            error: e.to_string(),
                        });
                        failures.insert(path, e.to_string());
                        return;
                    }
                },
            };

            if fresh {
                rehashed.fetch_add(1, Ordering::Relaxed);
            } else {
                reused.fetch_add(1, Ordering::Relaxed);
            }

            sink.emit(&Event::FileScanned {
                path: path.clone(),
                size: file.size,
                rehashed: fresh,
            });

            let record = FileRecord {
                path: path.clone(),
                size,
                last_modified: file.last_modified,
                content_hash,
                context_tag: classifier.classify(&file.path, root),
            };
            records.insert(path, record);
        });
    });

    HashedBatch {
        records,
        failures,
        rehashed: rehashed.into_inner(),
        reused: reused.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SilentSink;
    use crate::scanner::context::FixedContext;
    use crate::storage::models::ContextTag;
    use std::fs;

    fn discovered(path: &Path) -> DiscoveredFile {
        let metadata = fs::metadata(path).unwrap();
        DiscoveredFile {
            path: path.to_path_buf(),
            size: metadata.len(),
            last_modified: crate::scanner::walk::modified_nanos(&metadata),
        }
    }

    #[test]
    fn test_hashes_each_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let files: Vec<DiscoveredFile> = (0..20)
            .map(|i| {
                let p = dir.path().join(format!("f{}.txt", i));
                fs::write(&p, format!("content {}", i % 4)).unwrap();
                discovered(&p)
            })
            .collect();

        let pool = build_pool(3).unwrap();
        let batch = hash_files(
            &pool,
            dir.path(),
            &files,
            &HashMap::new(),
            &FixedContext(ContextTag::Unarchived),
            &SilentSink,
        );
        assert_eq!(batch.records.len(), 20);
        assert_eq!(batch.rehashed, 20);
        assert_eq!(batch.reused, 0);
        assert!(batch.failures.is_empty());
    }

    #[test]
    fn test_unchanged_fingerprint_reuses_hash() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("a.txt");
        fs::write(&p, "hello").unwrap();
        let file = discovered(&p);

        let mut known = HashMap::new();
        known.insert(
            p.to_string_lossy().into_owned(),
            Fingerprint {
                size: file.size as i64,
                last_modified: file.last_modified,
                content_hash: "cached".to_string(),
            },
        );

        let pool = build_pool(1).unwrap();
        let batch = hash_files(
            &pool,
            dir.path(),
            &[file],
            &known,
            &FixedContext(ContextTag::Unarchived),
            &SilentSink,
        );
        assert_eq!(batch.reused, 1);
        let record = batch.records.get(&*p.to_string_lossy()).unwrap();
        assert_eq!(record.content_hash, "cached");
    }

    #[test]
    fn test_vanished_file_is_a_failure_not_an_abort() {
        let dir = tempfile::tempdir().unwrap();
        let keep = dir.path().join("keep.txt");
        let gone = dir.path().join("gone.txt");
        fs::write(&keep, "keep").unwrap();
        fs::write(&gone, "gone").unwrap();
        let files = vec![discovered(&keep), discovered(&gone)];
        fs::remove_file(&gone).unwrap();

        let pool = build_pool(2).unwrap();
        let batch = hash_files(
            &pool,
            dir.path(),
            &files,
            &HashMap::new(),
            &FixedContext(ContextTag::Unarchived),
            &SilentSink,
        );
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.failures.len(), 1);
        assert!(batch.failures.contains_key(&*gone.to_string_lossy()));
    }
}
