use std::io;
use std::path::{Component, Path, Prefix};

pub fn drive_letter(path: &Path) -> Option<String> {
    path.components().find_map(|component| match component {
        Component::Prefix(prefix) => match prefix.kind() {
            Prefix::Disk(letter) | Prefix::VerbatimDisk(letter) => {
                Some((letter as char).to_string())
            }
            _ => None,
        },
        _ => None,
    })
}

/// Directory handles cannot be opened for flushing without backup
/// semantics; NTFS journals the rename itself.
pub fn sync_dir(dir: &Path) -> io::Result<()> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a directory", dir.display()),
        ))
    }
}
