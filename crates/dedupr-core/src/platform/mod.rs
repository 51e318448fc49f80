#[cfg(target_os = "windows")]
pub mod windows;

use std::io;
use std::path::Path;

/// Drive letter of an absolute Windows path (`C:\data` -> `C`).
#[cfg(target_os = "windows")]
pub fn drive_letter(path: &Path) -> Option<String> {
    windows::drive_letter(path)
}

#[cfg(not(target_os = "windows"))]
pub fn drive_letter(_path: &Path) -> Option<String> {
    None
}

/// Flush a directory's entries so a completed rename survives power loss.
#[cfg(unix)]
pub fn sync_dir(dir: &Path) -> io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}

#[cfg(target_os = "windows")]
pub fn sync_dir(dir: &Path) -> io::Result<()> {
    windows::sync_dir(dir)
}

#[cfg(not(any(unix, target_os = "windows")))]
pub fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
