mod commands;
mod event_log;
mod logging;
mod metrics;
mod progress;

use std::path::Path;
use std::process;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dedupr_core::commit::{self, ApplyStatus, OutcomeKind, RunOutcome};
use dedupr_core::plan::{write_plan, PlanStatus};
use dedupr_core::{AppConfig, Applier, Database, EventSink, Planner, ScanEngine, TracingSink};
use dotenv::dotenv;
use event_log::Tee;
use logging::LogSettings;
use metrics::RunMetrics;
use progress::CliReporter;
use tracing::{error, info, warn};

fn main() {
    dotenv().ok();

    let guard = logging::init_logger(&LogSettings::from_env());
    let args = Cli::parse();

    let outcome = match dedupr_core::config::load_configuration(&args.config) {
        Ok(config) => match args.command {
            Some(command) => dispatch(command, config),
            None => {
                let _ = Cli::command().print_long_help();
                RunOutcome::Success
            }
        },
        Err(err) => {
            error!("Error loading configuration: {}", err);
            RunOutcome::Fatal
        }
    };

    drop(guard);
    process::exit(outcome.exit_code());
}

fn dispatch(command: Commands, config: AppConfig) -> RunOutcome {
    let reporter = CliReporter::new();
    let event_log = logging::open_event_log(&config.event_log_path);
    let mut sinks: Vec<&dyn EventSink> = vec![&reporter, &TracingSink];
    if let Some(log) = &event_log {
        sinks.push(log);
    }
    let sink = Tee(sinks);

    let result = match command {
        Commands::Scan { roots, workers } => run_scan(config, roots, workers, &sink),
        Commands::Plan { out } => run_plan(&config, &out, &sink),
        Commands::Apply {
            plan,
            checkpoint,
            force,
        } => run_apply(&config, &plan, &checkpoint, force, &sink),
        Commands::Rollback { checkpoint } => run_rollback(&checkpoint, &sink),
        Commands::Verify { checkpoint, deep } => run_verify(&checkpoint, deep, &sink),
        Commands::Metrics => {
            println!("{}", metrics::render(Path::new(&config.metrics_path)));
            Ok(RunOutcome::Success)
        }
        Commands::PrintConfig => serde_json::to_string_pretty(&config)
            .map(|json| {
                println!("{}", json);
                RunOutcome::Success
            })
            .map_err(anyhow::Error::from),
    };
    reporter.finish();

    match result {
        Ok(outcome) => outcome,
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            error!("{:#}", err);
            RunOutcome::Fatal
        }
    }
}

fn save_metrics(config: &AppConfig, command: &str, update: impl FnOnce(&mut RunMetrics)) {
    let path = Path::new(&config.metrics_path);
    let mut metrics = RunMetrics::load(path);
    update(&mut metrics);
    if let Err(e) = metrics.save(path, command) {
        warn!("Could not save metrics: {:#}", e);
    }
}

fn run_scan(
    mut config: AppConfig,
    roots: Vec<String>,
    workers: Option<usize>,
    sink: &dyn EventSink,
) -> anyhow::Result<RunOutcome> {
    if !roots.is_empty() {
        config.root_paths = roots;
    }
    if let Some(workers) = workers {
        config.worker_count = workers;
    }
    if config.root_paths.is_empty() {
        bail!("no root paths configured; pass --root or set root_paths");
    }

    let result = ScanEngine::new(config.clone())
        .scan(sink)
        .context("scan failed")?;

    println!();
    info!(
        "Scan: {}, Hash: {}, DB: {}",
        format!("{:.2}s", result.scan_duration.as_secs_f64()).green(),
        format!("{:.2}s", result.hash_duration.as_secs_f64()).green(),
        format!("{:.2}s", result.db_write_duration.as_secs_f64()).green(),
    );
    info!(
        "{} files indexed ({} hashed, {} unchanged, {} removed)",
        format!("{}", result.files_scanned).cyan(),
        result.files_hashed,
        result.files_reused,
        result.files_removed,
    );
    info!(
        "{} duplicate groups, {} bytes wasted",
        format!("{}", result.duplicate_groups).red(),
        format!("{}", result.wasted_bytes).red(),
    );
    if result.errors > 0 {
        warn!("{} files could not be read", result.errors);
    }

    save_metrics(&config, "scan", |m| m.record_scan(&result));

    Ok(if result.errors > 0 {
        RunOutcome::Partial
    } else {
        RunOutcome::Success
    })
}

fn run_plan(config: &AppConfig, out: &Path, sink: &dyn EventSink) -> anyhow::Result<RunOutcome> {
    let started = Instant::now();
    let db = Database::open(&config.db_path)?;
    let plan = Planner::new(config).plan(&db, sink)?;
    write_plan(out, &plan)?;

    let planned = plan
        .iter()
        .filter(|e| e.status == PlanStatus::Planned)
        .count();
    info!(
        "{} moves planned, {} left in place, written to {}",
        format!("{}", planned).cyan(),
        format!("{}", plan.len() - planned).yellow(),
        out.display()
    );
    save_metrics(config, "plan", |m| m.record_plan(planned, started.elapsed()));
    Ok(RunOutcome::Success)
}

fn run_apply(
    config: &AppConfig,
    plan: &Path,
    checkpoint: &Path,
    force: bool,
    sink: &dyn EventSink,
) -> anyhow::Result<RunOutcome> {
    let started = Instant::now();
    let force = force || !config.dry_run;
    let status = Applier::new(sink)
        .with_collision_policy(config.collision_policy)
        .apply_file(plan, checkpoint, force)?;

    print_status(&status);
    if status.dry_run {
        info!("{}", "Dry run: re-run with --force to move files".yellow());
    } else {
        info!(
            "Checkpoint: {}",
            format!("{}", checkpoint.display()).cyan()
        );
    }
    save_metrics(config, "apply", |m| m.record_apply(&status, started.elapsed()));
    Ok(status.outcome())
}

fn run_rollback(checkpoint: &Path, sink: &dyn EventSink) -> anyhow::Result<RunOutcome> {
    let status = commit::rollback(checkpoint, sink)?;
    print_status(&status);
    // Entries already rolled back are skipped, which is the expected steady state.
    Ok(if status.errors > 0 {
        RunOutcome::Partial
    } else {
        RunOutcome::Success
    })
}

fn run_verify(checkpoint: &Path, deep: bool, sink: &dyn EventSink) -> anyhow::Result<RunOutcome> {
    let report = commit::verify(checkpoint, deep, sink)?;
    info!(
        "{} destinations checked, {} missing, {} mismatched",
        report.checked,
        format!("{}", report.missing.len()).red(),
        format!("{}", report.mismatched.len()).red(),
    );
    for path in &report.missing {
        println!("  {} {}", "missing".red(), path);
    }
    for path in &report.mismatched {
        println!("  {} {}", "changed".yellow(), path);
    }
    Ok(report.outcome())
}

fn print_status(status: &ApplyStatus) {
    println!();
    info!(
        "{} attempted, {} succeeded, {} skipped, {} errors, {} bytes moved",
        status.attempted,
        format!("{}", status.succeeded).green(),
        format!("{}", status.skipped).yellow(),
        format!("{}", status.errors).red(),
        status.bytes_moved,
    );
    for entry in &status.entries {
        let label = match entry.outcome {
            OutcomeKind::Skipped => "skipped".yellow(),
            OutcomeKind::Failed => "failed".red(),
            OutcomeKind::Applied | OutcomeKind::WouldApply => continue,
        };
        println!(
            "  {} {} {}: {}",
            label,
            entry.rollback_key,
            entry.source,
            entry.detail.as_deref().unwrap_or("")
        );
    }
}
