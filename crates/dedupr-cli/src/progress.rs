use colored::*;
use dedupr_core::events::{ApplyPhase, Event, EventSink};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Spinner-based progress display driven by core events.
///
/// - Scan: running count of files hashed
/// - Apply: the move currently being committed, failures printed above the bar
/// - Rollback and verify: one line per entry
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
    scanned: AtomicUsize,
    moved: AtomicUsize,
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
            scanned: AtomicUsize::new(0),
            moved: AtomicUsize::new(0),
        }
    }

    fn set_bar(&self, pb: ProgressBar) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(old) = guard.replace(pb) {
                old.finish_and_clear();
            }
        }
    }

    /// Run `f` on the current bar, starting one with `message` if needed.
    fn with_bar(&self, message: impl FnOnce() -> String, f: impl FnOnce(&ProgressBar)) {
        if let Ok(mut guard) = self.bar.lock() {
            let pb = guard.get_or_insert_with(|| spinner(message()));
            f(pb);
        }
    }

    pub fn finish(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }

    fn print_line(&self, line: String) {
        match self.bar.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(pb) => pb.println(line),
                None => eprintln!("{}", line),
            },
            Err(_) => eprintln!("{}", line),
        }
    }
}

impl EventSink for CliReporter {
    fn emit(&self, event: &Event) {
        match event {
            Event::ScanStarted { roots, workers } => {
                self.scanned.store(0, Ordering::Relaxed);
                self.set_bar(spinner(format!(
                    "Scanning {} root(s) with {} workers...",
                    roots.len(),
                    workers
                )));
            }
            Event::FileScanned { .. } => {
                let n = self.scanned.fetch_add(1, Ordering::Relaxed) + 1;
                self.with_bar(
                    || "Scanning...".to_string(),
                    |pb| pb.set_message(format!("Scanning... {} files hashed", n)),
                );
            }
            Event::FileSkipped { path, error } => {
                self.print_line(format!("  {} {}: {}", "!".yellow(), path, error));
            }
            Event::ScanCompleted {
                files,
                bytes,
                errors,
            } => {
                self.finish();
                eprintln!(
                    "  {} Scan complete: {} files, {} bytes, {} errors",
                    "✓".green(),
                    files,
                    bytes,
                    errors
                );
            }
            Event::ApplyPhase {
                phase, destination, ..
            } => {
                let n = if *phase == ApplyPhase::SourceRemoved {
                    self.moved.fetch_add(1, Ordering::Relaxed) + 1
                } else {
                    self.moved.load(Ordering::Relaxed)
                };
                self.with_bar(
                    || "Applying plan...".to_string(),
                    |pb| pb.set_message(format!("{} moved, {:?} {}", n, phase, destination)),
                );
            }
            Event::ApplyEntryFailed {
                rollback_key,
                source,
                error,
            } => {
                self.print_line(format!(
                    "  {} {} {}: {}",
                    "✗".red(),
                    rollback_key,
                    source,
                    error
                ));
            }
            Event::RollbackStep {
                source, outcome, ..
            } => {
                self.print_line(format!("  {} {} ({})", "↩".cyan(), source, outcome));
            }
            Event::VerifyEntry { destination, ok } if !ok => {
                self.print_line(format!("  {} {}", "✗".red(), destination));
            }
            _ => {}
        }
    }
}
