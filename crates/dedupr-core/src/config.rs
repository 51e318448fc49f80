use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_NAME: &str = "Dedupr";
pub const DEFAULT_HOLDING_DIR: &str = ".dedupr_duplicates";

/// What the planner and applier do when a computed destination is taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Append ` (N)` before the extension until the name is free.
    #[default]
    Suffix,
    /// Leave the file where it is.
    Skip,
}

/// The one digest the index is keyed on. Kept as an enum so configuration
/// naming anything else fails to deserialize instead of silently mixing hashes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
}

impl HashAlgorithm {
    pub fn id(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub root_paths: Vec<String>,
    pub ignore_patterns: Vec<String>,
    pub worker_count: usize,
    pub dry_run: bool,
    pub collision_policy: CollisionPolicy,
    pub hash_algorithm: HashAlgorithm,
    pub holding_dir: String,
    pub include_empty_files: bool,
    pub db_path: String,
    pub event_log_path: String,
    pub metrics_path: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            root_paths: Vec::new(),
            ignore_patterns: vec![
                ".git".to_string(),
                "node_modules".to_string(),
                "__pycache__".to_string(),
                DEFAULT_HOLDING_DIR.to_string(),
            ],
            worker_count: 4,
            dry_run: true,
            collision_policy: CollisionPolicy::Suffix,
            hash_algorithm: HashAlgorithm::Sha256,
            holding_dir: DEFAULT_HOLDING_DIR.to_string(),
            include_empty_files: false,
            db_path: "dedupr.db".to_string(),
            event_log_path: "logs/dedupr-events.jsonl".to_string(),
            metrics_path: "dedupr-metrics.json".to_string(),
        }
    }
}

/// Load `<name>.toml` (if present) layered under `DEDUPR_*` environment variables.
pub fn load_configuration(name: &str) -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name(name).required(false))
        .add_source(Environment::with_prefix("DEDUPR").try_parsing(true))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

/// Remove directories that are subdirectories of other directories in the list.
pub fn non_overlapping_directories(dirs: Vec<String>) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();

    for dir in dirs {
        let dir_path = Path::new(&dir);
        if result.iter().any(|kept| dir_path.starts_with(kept)) {
            continue;
        }
        result.retain(|kept| !Path::new(kept).starts_with(dir_path));
        result.push(dir);
    }

    result
}
