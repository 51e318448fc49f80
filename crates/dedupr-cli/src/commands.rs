use clap::{Parser, Subcommand};
use dedupr_core::config::DEFAULT_CONFIG_NAME;
use std::path::PathBuf;

pub const DEFAULT_PLAN_PATH: &str = "dedupr-plan.csv";
pub const DEFAULT_CHECKPOINT_PATH: &str = "dedupr-checkpoint.json";

#[derive(Debug, Parser)]
#[command(name = "dedupr", version)]
#[command(about = "Find duplicate files and move them aside without losing data", long_about = None)]
pub struct Cli {
    /// Configuration file name, without the .toml extension
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_NAME)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Walk the roots and bring the index up to date
    Scan {
        /// Root directory to scan; repeatable, replaces configured roots
        #[arg(long = "root")]
        roots: Vec<String>,
        /// Number of hashing threads
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Write a relocation plan for every duplicate group in the index
    Plan {
        #[arg(long, default_value = DEFAULT_PLAN_PATH)]
        out: PathBuf,
    },
    /// Execute a plan; a dry run unless --force is given
    Apply {
        #[arg(long, default_value = DEFAULT_PLAN_PATH)]
        plan: PathBuf,
        #[arg(long, default_value = DEFAULT_CHECKPOINT_PATH)]
        checkpoint: PathBuf,
        /// Actually move files
        #[arg(long)]
        force: bool,
    },
    /// Undo every move recorded in a checkpoint
    Rollback {
        #[arg(long, default_value = DEFAULT_CHECKPOINT_PATH)]
        checkpoint: PathBuf,
    },
    /// Check that checkpointed destinations are still in place
    Verify {
        #[arg(long, default_value = DEFAULT_CHECKPOINT_PATH)]
        checkpoint: PathBuf,
        /// Re-hash every destination
        #[arg(long)]
        deep: bool,
    },
    /// Print metrics from previous runs
    Metrics,
    /// Print configuration values
    PrintConfig,
}
