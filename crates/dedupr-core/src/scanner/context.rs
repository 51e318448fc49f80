use std::path::Path;

use crate::storage::models::ContextTag;

/// Decides whether a file sits inside something extracted from an archive.
///
/// Only affects duplicate grouping; it never authorizes a deletion.
pub trait ContextClassifier: Send + Sync {
    fn classify(&self, path: &Path, root: &Path) -> ContextTag;
}

/// Tags every file the same way.
pub struct FixedContext(pub ContextTag);

impl ContextClassifier for FixedContext {
    fn classify(&self, _path: &Path, _root: &Path) -> ContextTag {
        self.0
    }
}

const ARCHIVE_EXTENSIONS: &[&str] = &[
    "zip", "7z", "rar", "tar", "gz", "bz2", "xz", "tgz", "tbz2", "tar.gz", "tar.bz2", "tar.xz",
];

const EXTRACTION_MARKERS: &[&str] = &[
    "extracted",
    "unzipped",
    "unpacked",
    "decompressed",
    "untar",
    "unrar",
];

/// Name and sibling-file signals, checked on every ancestor directory from
/// the file up to (and including) the scan root:
/// - the directory name contains an extraction marker (`backup_extracted`)
/// - it ends in `_<ext>` for an archive extension (`photos_zip`, `logs_tar_gz`)
/// - an archive named `<dir>.<ext>` sits next to it
pub struct ArchiveHeuristic;

impl ArchiveHeuristic {
    fn dir_looks_extracted(dir: &Path) -> bool {
        let name = match dir.file_name() {
            Some(name) => name.to_string_lossy().to_lowercase(),
            None => return false,
        };

        if EXTRACTION_MARKERS.iter().any(|m| name.contains(m)) {
            return true;
        }

        if ARCHIVE_EXTENSIONS
            .iter()
            .any(|ext| name.ends_with(&format!("_{}", ext.replace('.', "_"))))
        {
            return true;
        }

        let original = dir.file_name().unwrap_or_default().to_string_lossy();
        ARCHIVE_EXTENSIONS
            .iter()
            .any(|ext| dir.with_file_name(format!("{}.{}", original, ext)).is_file())
    }
}

impl ContextClassifier for ArchiveHeuristic {
    fn classify(&self, path: &Path, root: &Path) -> ContextTag {
        let inside = path
            .ancestors()
            .skip(1)
            .take_while(|dir| dir.starts_with(root))
            .any(Self::dir_looks_extracted);

        if inside {
            ContextTag::Archived
        } else {
            ContextTag::Unarchived
        }
    }
}
