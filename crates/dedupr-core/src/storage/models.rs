use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::HashAlgorithm;

/// Whether a file instance is a plain on-disk file or was recovered from an archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextTag {
    #[default]
    Unarchived,
    Archived,
}

impl ContextTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextTag::Unarchived => "unarchived",
            ContextTag::Archived => "archived",
        }
    }
}

impl fmt::Display for ContextTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unarchived" => Ok(ContextTag::Unarchived),
            "archived" => Ok(ContextTag::Archived),
            other => Err(format!("unknown context tag '{}'", other)),
        }
    }
}

impl ToSql for ContextTag {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ContextTag {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// The content identity key: two files are duplicates exactly when these match.
///
/// Rendered as `sha256:<hex>:<tag>` in plans.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentIdentity {
    pub content_hash: String,
    pub context_tag: ContextTag,
}

impl fmt::Display for ContentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            HashAlgorithm::Sha256.id(),
            self.content_hash,
            self.context_tag
        )
    }
}

impl FromStr for ContentIdentity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let (algo, hash, tag) = match (parts.next(), parts.next(), parts.next()) {
            (Some(a), Some(h), Some(t)) => (a, h, t),
            _ => return Err(format!("malformed content id '{}'", s)),
        };
        if algo != HashAlgorithm::Sha256.id() {
            return Err(format!("unsupported hash algorithm '{}'", algo));
        }
        if hash.len() != 64 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(format!("invalid digest in content id '{}'", s));
        }
        Ok(ContentIdentity {
            content_hash: hash.to_ascii_lowercase(),
            context_tag: tag.parse()?,
        })
    }
}

impl Serialize for ContentIdentity {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentIdentity {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One indexed file, keyed by canonical path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: String,
    pub size: i64,
    pub last_modified: i64,
    pub content_hash: String,
    pub context_tag: ContextTag,
}

impl FileRecord {
    pub fn identity(&self) -> ContentIdentity {
        ContentIdentity {
            content_hash: self.content_hash.clone(),
            context_tag: self.context_tag,
        }
    }
}

/// What a re-scan compares against to decide whether a file must be re-hashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub size: i64,
    pub last_modified: i64,
    pub content_hash: String,
}

/// Files sharing one identity key, members ordered by path.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub identity: ContentIdentity,
    pub file_size: i64,
    pub paths: Vec<String>,
}

impl DuplicateGroup {
    pub fn wasted_bytes(&self) -> i64 {
        self.file_size * (self.paths.len() as i64 - 1)
    }
}

/// One invocation of the scanner.
#[derive(Debug, Clone)]
pub struct ScanRun {
    pub id: i64,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub status: String,
    pub root_paths: String,
    pub files_scanned: i64,
    pub bytes_scanned: i64,
    pub errors: i64,
}
