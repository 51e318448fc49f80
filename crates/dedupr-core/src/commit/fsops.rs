use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::trace;

use crate::error::Error;
use crate::hasher;
use crate::platform;

pub const PARTIAL_SUFFIX: &str = ".dedupr-partial";

/// Staging name for `target`, in the same directory so the publish rename
/// never crosses a filesystem.
pub fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(PARTIAL_SUFFIX);
    target.with_file_name(name)
}

fn parent_dir(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}

fn copy_and_sync(from: &Path, to: &Path) -> io::Result<u64> {
    let mut reader = File::open(from)?;
    let mut writer = File::create(to)?;
    let copied = io::copy(&mut reader, &mut writer)?;
    writer.sync_all()?;
    Ok(copied)
}

/// Copy `from` into `staging` and flush it to stable storage. A failed copy
/// leaves no staging file behind.
pub fn stage_copy(from: &Path, staging: &Path) -> Result<u64, Error> {
    let failed = |source: io::Error| Error::StageFailed {
        from: from.to_path_buf(),
        to: staging.to_path_buf(),
        source,
    };

    if let Some(parent) = parent_dir(staging) {
        fs::create_dir_all(parent).map_err(failed)?;
    }

    match copy_and_sync(from, staging) {
        Ok(copied) => {
            trace!("Staged {} bytes at {}", copied, staging.display());
            Ok(copied)
        }
        Err(e) => {
            discard(staging);
            Err(failed(e))
        }
    }
}

/// Re-hash a staged copy and compare it with `expected`. A mismatching or
/// unreadable copy is discarded.
pub fn verify_staged(staging: &Path, expected: &str) -> Result<(), Error> {
    let actual = match hasher::hash_file(staging) {
        Ok(actual) => actual,
        Err(e) => {
            discard(staging);
            return Err(Error::StageFailed {
                from: staging.to_path_buf(),
                to: staging.to_path_buf(),
                source: e,
            });
        }
    };

    if actual != expected {
        discard(staging);
        return Err(Error::VerifyMismatch {
            path: staging.to_path_buf(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

/// Rename a verified staging file onto `target` and flush the directory.
/// Refuses to replace anything already at `target`.
pub fn publish(staging: &Path, target: &Path) -> Result<(), Error> {
    let failed = |reason: String| Error::PublishFailed {
        path: target.to_path_buf(),
        reason,
    };

    if target.exists() {
        discard(staging);
        return Err(failed("destination appeared before publish".to_string()));
    }

    if let Err(e) = fs::rename(staging, target) {
        discard(staging);
        return Err(failed(e.to_string()));
    }

    if let Some(parent) = parent_dir(target) {
        platform::sync_dir(parent).map_err(|e| failed(e.to_string()))?;
    }
    Ok(())
}

/// True when `path` is a readable file whose digest is `expected`.
pub fn holds_content(path: &Path, expected: &str) -> bool {
    path.is_file()
        && hasher::hash_file(path)
            .map(|actual| actual == expected)
            .unwrap_or(false)
}

pub fn remove_file(path: &Path) -> Result<(), Error> {
    fs::remove_file(path).map_err(|source| Error::RemoveFailed {
        path: path.to_path_buf(),
        source,
    })
}

fn discard(staging: &Path) {
    if let Err(e) = fs::remove_file(staging) {
        if e.kind() != io::ErrorKind::NotFound {
            trace!("Could not discard {}: {}", staging.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_path_is_sibling() {
        assert_eq!(
            partial_path(Path::new("/d/hold/a.txt")),
            PathBuf::from("/d/hold/a.txt.dedupr-partial")
        );
    }

    #[test]
    fn test_stage_verify_publish() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.txt");
        fs::write(&source, "content A").unwrap();
        let target = dir.path().join("hold/nested/a.txt");
        let staging = partial_path(&target);

        assert_eq!(stage_copy(&source, &staging).unwrap(), 9);
        let expected = hasher::hash_file(&source).unwrap();
        verify_staged(&staging, &expected).unwrap();
        publish(&staging, &target).unwrap();

        assert!(!staging.exists());
        assert_eq!(fs::read_to_string(&target).unwrap(), "content A");
        assert!(holds_content(&target, &expected));
    }

    #[test]
    fn test_verify_mismatch_discards_staging() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.txt");
        fs::write(&source, "content A").unwrap();
        let staging = dir.path().join("a.txt.dedupr-partial");
        stage_copy(&source, &staging).unwrap();

        let err = verify_staged(&staging, &"0".repeat(64)).unwrap_err();
        assert!(matches!(err, Error::VerifyMismatch { .. }));
        assert!(!staging.exists());
    }

    #[test]
    fn test_publish_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("x.dedupr-partial");
        let target = dir.path().join("x");
        fs::write(&staging, "new").unwrap();
        fs::write(&target, "old").unwrap();

        assert!(matches!(
            publish(&staging, &target),
            Err(Error::PublishFailed { .. })
        ));
        assert_eq!(fs::read_to_string(&target).unwrap(), "old");
        assert!(!staging.exists());
    }

    #[test]
    fn test_stage_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("out.dedupr-partial");
        let err = stage_copy(&dir.path().join("missing"), &staging).unwrap_err();
        assert!(matches!(err, Error::StageFailed { .. }));
        assert!(!staging.exists());
    }
}
