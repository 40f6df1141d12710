//! Output formatting and progress reporting

use crate::error::CliResult;
use crate::runner::RunSummary;
use console::{style, Style, Term};
use demoscope::ScenarioResult;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Output format for run results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON output
    Json,
}

#[derive(Debug, Clone, Copy)]
enum Status {
    Pass,
    Fail,
    Info,
}

/// Progress reporter for suite execution
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            progress_bar: None,
            use_color,
            quiet,
        }
    }

    /// Start a progress bar over `total` scenarios
    pub fn start_progress(&mut self, total: u64, message: &str) {
        if self.quiet {
            return;
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message(message.to_string());
        self.progress_bar = Some(pb);
    }

    /// Update progress message
    pub fn set_message(&self, message: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.set_message(message.to_string());
        }
    }

    /// Finish progress bar
    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_and_clear();
        }
    }

    /// Callback for `SuiteRunner::on_scenario_finished`
    ///
    /// Prints one line per scenario above the bar and advances it.
    #[must_use]
    pub fn scenario_callback(&self) -> impl Fn(&ScenarioResult) + Send + Sync + 'static {
        let progress_bar = self.progress_bar.clone();
        let term = self.term.clone();
        let use_color = self.use_color;
        let quiet = self.quiet;
        move |result: &ScenarioResult| {
            if quiet && result.passed {
                return;
            }
            let line = scenario_line(result, use_color);
            match progress_bar {
                Some(ref pb) => {
                    pb.println(line);
                    pb.inc(1);
                }
                None => {
                    let _ = term.write_line(&line);
                }
            }
        }
    }

    fn write_prefixed(&self, status: Status, message: &str) {
        let prefix = match (status, self.use_color) {
            (Status::Pass, true) => style("✓").green().bold().to_string(),
            (Status::Fail, true) => style("✗").red().bold().to_string(),
            (Status::Info, true) => style("ℹ").blue().bold().to_string(),
            (Status::Pass, false) => "PASS".to_string(),
            (Status::Fail, false) => "FAIL".to_string(),
            (Status::Info, false) => "INFO".to_string(),
        };
        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if !self.quiet {
            self.write_prefixed(Status::Pass, message);
        }
    }

    /// Print a failure message, even in quiet mode
    pub fn failure(&self, message: &str) {
        self.write_prefixed(Status::Fail, message);
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if !self.quiet {
            self.write_prefixed(Status::Info, message);
        }
    }

    /// Print error and diagnostics for every failed scenario
    pub fn failure_details(&self, summary: &RunSummary) {
        for suite in &summary.suites {
            for result in suite.failures() {
                let _ = self.term.write_line("");
                self.failure(&format!("{} :: {}", suite.name, result.name));
                if let Some(ref error) = result.error {
                    let _ = self.term.write_line(&format!("    {error}"));
                }
                if !result.diagnostics.is_empty() {
                    for line in result.diagnostics.lines() {
                        let _ = self.term.write_line(&format!("    | {line}"));
                    }
                }
            }
        }
    }

    /// Print run summary
    pub fn summary(&self, passed: usize, failed: usize, duration: Duration) {
        if self.quiet && failed == 0 {
            return;
        }

        let _ = self.term.write_line("");

        let total = passed + failed;
        let duration_secs = duration.as_secs_f64();

        if self.use_color {
            let passed_style = Style::new().green().bold();
            let failed_style = Style::new().red().bold();

            let status = if failed > 0 {
                failed_style.apply_to("FAILED")
            } else {
                passed_style.apply_to("PASSED")
            };

            let _ = self.term.write_line(&format!(
                "{} {} scenarios in {:.2}s ({} passed, {} failed)",
                status,
                total,
                duration_secs,
                passed_style.apply_to(passed),
                if failed > 0 {
                    failed_style.apply_to(failed).to_string()
                } else {
                    failed.to_string()
                },
            ));
        } else {
            let status = if failed > 0 { "FAILED" } else { "PASSED" };
            let _ = self.term.write_line(&format!(
                "{status} {total} scenarios in {duration_secs:.2}s ({passed} passed, {failed} failed)"
            ));
        }
    }
}

/// One-line status for a finished scenario
#[must_use]
pub fn scenario_line(result: &ScenarioResult, use_color: bool) -> String {
    let millis = result.duration.as_millis();
    match (result.passed, use_color) {
        (true, true) => format!("{} {} ({millis}ms)", style("✓").green().bold(), result.name),
        (true, false) => format!("PASS {} ({millis}ms)", result.name),
        (false, true) => format!("{} {} ({millis}ms)", style("✗").red().bold(), result.name),
        (false, false) => format!("FAIL {} ({millis}ms)", result.name),
    }
}

/// Render a run summary as pretty JSON
///
/// # Errors
///
/// Returns error if serialization fails
pub fn render_json(summary: &RunSummary) -> CliResult<String> {
    serde_json::to_string_pretty(summary)
        .map_err(|e| crate::error::CliError::config(format!("cannot render results: {e}")))
}
