use std::path::{Component, Path, PathBuf};

use crate::config::CollisionPolicy;
use crate::platform;

/// Where relocated duplicates go.
///
/// A relative holding directory is created next to each duplicate
/// (`/data/photos/.dedupr_duplicates/img.jpg`); an absolute one mirrors the
/// source's full path beneath it (`/holding/data/photos/img.jpg`, or
/// `D:\holding\C\data\img.jpg` on Windows).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoldingArea {
    Sibling(PathBuf),
    Mirror(PathBuf),
}

impl HoldingArea {
    pub fn from_config(holding_dir: &str) -> Self {
        let dir = PathBuf::from(holding_dir);
        if dir.is_absolute() {
            HoldingArea::Mirror(dir)
        } else {
            HoldingArea::Sibling(dir)
        }
    }

    pub fn destination_for(&self, source: &Path) -> PathBuf {
        match self {
            HoldingArea::Sibling(name) => {
                let parent = source.parent().unwrap_or_else(|| Path::new(""));
                match source.file_name() {
                    Some(file_name) => parent.join(name).join(file_name),
                    None => parent.join(name),
                }
            }
            HoldingArea::Mirror(base) => {
                let mut mirrored = base.clone();
                if let Some(letter) = platform::drive_letter(source) {
                    mirrored.push(letter);
                }
                let relative: PathBuf = source
                    .components()
                    .filter_map(|c| match c {
                        Component::Normal(part) => Some(part),
                        _ => None,
                    })
                    .collect();
                mirrored.join(relative)
            }
        }
    }
}

/// `report.pdf` -> `report (2).pdf`, `README` -> `README (2)`.
pub fn with_numeric_suffix(path: &Path, n: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{} ({}).{}", stem, n, ext.to_string_lossy()),
        None => format!("{} ({})", stem, n),
    };
    path.with_file_name(name)
}

/// Resolve a destination against `is_taken`.
///
/// Returns `None` when the natural name is taken and the policy is `Skip`.
pub fn resolve_collision(
    natural: PathBuf,
    policy: CollisionPolicy,
    is_taken: impl Fn(&Path) -> bool,
) -> Option<PathBuf> {
    if !is_taken(&natural) {
        return Some(natural);
    }
    match policy {
        CollisionPolicy::Skip => None,
        CollisionPolicy::Suffix => {
            let mut n = 1;
            loop {
                let candidate = with_numeric_suffix(&natural, n);
                if !is_taken(&candidate) {
                    return Some(candidate);
                }
                n += 1;
            }
        }
    }
}
