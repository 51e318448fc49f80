use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::Error;
use crate::platform;

/// One completed, durable relocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointMove {
    pub source: String,
    pub destination: String,
    pub content_hash: String,
    pub size: u64,
    pub rollback_key: String,
}

/// First line of a checkpoint file.
#[derive(Debug, Serialize, Deserialize)]
struct CheckpointHeader {
    created_at: i64,
}

/// Moves committed by an apply run, in commit order. Written only by
/// [`CheckpointWriter`] and read by rollback and verify.
///
/// On disk this is JSON Lines: a header line carrying `created_at`, then one
/// line per move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointManifest {
    pub created_at: i64,
    pub moves: Vec<CheckpointMove>,
}

fn read_failed(path: &Path, reason: String) -> Error {
    Error::CheckpointRead {
        path: path.to_path_buf(),
        reason,
    }
}

impl CheckpointManifest {
    pub fn new() -> Self {
        Self {
            created_at: chrono::Utc::now().timestamp(),
            moves: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let bytes = fs::read(path).map_err(|e| read_failed(path, e.to_string()))?;
        Self::parse(&bytes)
            .map(|(manifest, _)| manifest)
            .map_err(|reason| read_failed(path, reason))
    }

    /// Parse the file and return the manifest with the byte length of its
    /// complete lines. An unterminated last line is a torn append and is
    /// ignored; any other unparseable line is an error.
    fn parse(bytes: &[u8]) -> Result<(Self, u64), String> {
        let complete = bytes
            .iter()
            .rposition(|b| *b == b'\n')
            .map_or(0, |i| i + 1);
        if complete < bytes.len() {
            warn!(
                "Ignoring torn checkpoint line of {} bytes",
                bytes.len() - complete
            );
        }

        let mut lines = bytes[..complete]
            .split(|b| *b == b'\n')
            .filter(|line| !line.iter().all(u8::is_ascii_whitespace));

        let header: CheckpointHeader = match lines.next() {
            Some(line) => {
                serde_json::from_slice(line).map_err(|e| format!("header: {}", e))?
            }
            None => return Ok((Self::new(), 0)),
        };
        let moves = lines
            .enumerate()
            .map(|(i, line)| {
                serde_json::from_slice(line).map_err(|e| format!("move {}: {}", i + 1, e))
            })
            .collect::<Result<Vec<CheckpointMove>, String>>()?;

        Ok((
            Self {
                created_at: header.created_at,
                moves,
            },
            complete as u64,
        ))
    }

    /// Latest recorded move of `source`, if any.
    pub fn find_source(&self, source: &str) -> Option<&CheckpointMove> {
        self.moves.iter().rev().find(|m| m.source == source)
    }
}

impl Default for CheckpointManifest {
    fn default() -> Self {
        Self::new()
    }
}

/// Append-only checkpoint file. Each append writes one line and fsyncs it
/// before returning, so the cost of a move does not grow with the manifest.
pub struct CheckpointWriter {
    path: PathBuf,
    file: File,
    /// Length of the durable, complete prefix of the file.
    len: u64,
    manifest: CheckpointManifest,
}

impl CheckpointWriter {
    /// Resume an existing checkpoint or create an empty one. Fails before any
    /// file is touched if the checkpoint location is unwritable.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let (manifest, len) = if path.exists() {
            let bytes = fs::read(path).map_err(|e| read_failed(path, e.to_string()))?;
            let (manifest, len) =
                CheckpointManifest::parse(&bytes).map_err(|reason| read_failed(path, reason))?;
            debug!(
                "Resuming checkpoint {} with {} moves",
                path.display(),
                manifest.moves.len()
            );
            (manifest, len)
        } else {
            (CheckpointManifest::new(), 0)
        };

        Self::open_at(path, manifest, len).map_err(|source| Error::CheckpointWriteFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    fn open_at(path: &Path, manifest: CheckpointManifest, len: u64) -> io::Result<Self> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        // Drops a torn tail left by an interrupted append.
        file.set_len(len)?;

        let mut writer = Self {
            path: path.to_path_buf(),
            file,
            len,
            manifest,
        };
        if len == 0 {
            let header = CheckpointHeader {
                created_at: writer.manifest.created_at,
            };
            writer.write_line(&header)?;
        } else {
            writer.file.sync_all()?;
        }
        platform::sync_dir(parent)?;
        Ok(writer)
    }

    pub fn manifest(&self) -> &CheckpointManifest {
        &self.manifest
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The move is in memory only once it is durable on disk.
    pub fn append(&mut self, entry: CheckpointMove) -> Result<(), Error> {
        self.write_line(&entry)
            .map_err(|source| Error::CheckpointWriteFailed {
                path: self.path.clone(),
                source,
            })?;
        self.manifest.moves.push(entry);
        Ok(())
    }

    fn write_line<T: Serialize>(&mut self, value: &T) -> io::Result<()> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');

        self.file.seek(SeekFrom::Start(self.len))?;
        if let Err(e) = self
            .file
            .write_all(&line)
            .and_then(|_| self.file.sync_all())
        {
            let _ = self.file.set_len(self.len);
            return Err(e);
        }
        self.len += line.len() as u64;
        Ok(())
    }
}
