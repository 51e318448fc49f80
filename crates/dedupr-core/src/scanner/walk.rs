use glob::Pattern;
use std::fs::Metadata;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::error;
use walkdir::WalkDir;

/// Glob ignore rules.
///
/// A pattern without a `/` is tested against every component of the path
/// relative to the scan root (`node_modules` prunes it at any depth); a
/// pattern with a `/` is tested against the full path.
#[derive(Debug, Clone, Default)]
pub struct IgnoreSet {
    component_patterns: Vec<Pattern>,
    path_patterns: Vec<Pattern>,
}

impl IgnoreSet {
    pub fn new(globs: &[String]) -> Self {
        let mut set = IgnoreSet::default();
        for glob in globs {
            match Pattern::new(glob) {
                Ok(p) if glob.contains('/') => set.path_patterns.push(p),
                Ok(p) => set.component_patterns.push(p),
                Err(e) => error!("Invalid glob pattern '{}': {}", glob, e),
            }
        }
        set
    }

    pub fn is_ignored(&self, relative: &Path, full: &Path) -> bool {
        if self.path_patterns.iter().any(|p| p.matches_path(full)) {
            return true;
        }
        relative.components().any(|component| match component {
            Component::Normal(name) => {
                let name = name.to_string_lossy();
                self.component_patterns.iter().any(|p| p.matches(&name))
            }
            _ => false,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub size: u64,
    pub last_modified: i64,
}

#[derive(Debug, Default)]
pub struct Discovery {
    pub files: Vec<DiscoveredFile>,
    /// Entries that could not be read; they still exist and must not be
    /// treated as removed.
    pub failures: Vec<(PathBuf, String)>,
}

/// Last-modified time in nanoseconds since the epoch, kept at whatever
/// resolution the filesystem records.
pub fn modified_nanos(metadata: &Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .and_then(|d| i64::try_from(d.as_nanos()).ok())
        .unwrap_or(0)
}

/// Enumerate regular files under `root`, pruning ignored directories.
/// Symlinks are never followed and 0-byte files are skipped unless asked for.
pub fn discover_files(root: &Path, ignore: &IgnoreSet, include_empty: bool) -> Discovery {
    let mut discovery = Discovery::default();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || {
                let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
                !ignore.is_ignored(relative, entry.path())
            }
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().unwrap_or(root).to_path_buf();
                error!("Error reading {}: {}", path.display(), err);
                discovery.failures.push((path, err.to_string()));
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                error!("Error getting metadata for {}: {}", entry.path().display(), err);
                discovery
                    .failures
                    .push((entry.path().to_path_buf(), err.to_string()));
                continue;
            }
        };

        if metadata.len() == 0 && !include_empty {
            continue;
        }

        discovery.files.push(DiscoveredFile {
            size: metadata.len(),
            last_modified: modified_nanos(&metadata),
            path: entry.into_path(),
        });
    }

    discovery
}
