//! Suite file runner

use crate::commands::RunArgs;
use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;
use demoscope::{HarnessConfig, Suite, SuiteResult};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Results of a `run` invocation
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// One entry per suite file, in argument order
    pub suites: Vec<SuiteResult>,
    /// Total wall time including browser launch
    pub duration: Duration,
}

impl RunSummary {
    /// Passed scenarios across suites
    #[must_use]
    pub fn passed(&self) -> usize {
        self.suites.iter().map(SuiteResult::passed_count).sum()
    }

    /// Failed scenarios across suites
    #[must_use]
    pub fn failed(&self) -> usize {
        self.suites.iter().map(SuiteResult::failed_count).sum()
    }

    /// Scenarios run
    #[must_use]
    pub fn total(&self) -> usize {
        self.suites.iter().map(SuiteResult::total).sum()
    }

    /// Check if every scenario passed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.suites.iter().all(SuiteResult::all_passed)
    }

    /// Turn failures into the process error
    ///
    /// # Errors
    ///
    /// Returns `ScenariosFailed` if any scenario failed
    pub fn into_result(self) -> CliResult<Self> {
        if self.all_passed() {
            Ok(self)
        } else {
            Err(CliError::ScenariosFailed {
                failed: self.failed(),
                total: self.total(),
            })
        }
    }
}

/// Layer the config file, `DEMOSCOPE_*` variables, then flags
///
/// # Errors
///
/// Returns error if the config file or an override is invalid
pub fn effective_config(config_path: Option<&Path>, args: Option<&RunArgs>) -> CliResult<HarnessConfig> {
    let config = HarnessConfig::load(config_path)?.with_env()?;
    match args {
        Some(args) => apply_run_flags(config, args),
        None => Ok(config),
    }
}

/// Apply `run` flags on top of a loaded config
///
/// # Errors
///
/// Returns error if the result fails validation
pub fn apply_run_flags(mut config: HarnessConfig, args: &RunArgs) -> CliResult<HarnessConfig> {
    if args.headed {
        config.browser.headless = false;
    } else if args.headless {
        config.browser.headless = true;
    }
    if let Some(ref path) = args.chromium_path {
        config.browser.chromium_path = Some(path.clone());
    }
    if args.no_sandbox {
        config.browser.sandbox = false;
    }
    if let Some(timeout) = args.timeout {
        config = config.with_timeout_override(timeout);
    }
    if let Some(parallel) = args.parallel {
        if parallel == 0 {
            return Err(CliError::invalid_argument("--parallel must be at least 1"));
        }
        config.parallel = parallel;
    }
    config.validate()?;
    Ok(config)
}

/// Load every suite file, failing on the first invalid one
///
/// With a filter, scenarios whose name lacks it are dropped and suites
/// left empty are skipped.
///
/// # Errors
///
/// Returns error if a file is unreadable or invalid, or nothing matches
pub fn load_suites(paths: &[PathBuf], filter: Option<&str>) -> CliResult<Vec<Suite>> {
    let mut suites = Vec::with_capacity(paths.len());
    for path in paths {
        let mut suite = Suite::from_path(path).map_err(|e| {
            CliError::config(format!("{}: {e}", path.display()))
        })?;
        if let Some(filter) = filter {
            suite.scenarios.retain(|s| s.name.contains(filter));
            if suite.scenarios.is_empty() {
                tracing::info!(suite = %suite.name, filter, "no matching scenarios");
                continue;
            }
        }
        suites.push(suite);
    }
    if suites.is_empty() {
        return Err(CliError::invalid_argument(format!(
            "no scenario matches filter '{}'",
            filter.unwrap_or_default()
        )));
    }
    Ok(suites)
}

/// Check suite files without a browser, reporting each one
///
/// # Errors
///
/// Returns `InvalidSuites` if any file fails to load
pub fn validate_suites(paths: &[PathBuf], reporter: &ProgressReporter) -> CliResult<()> {
    let mut invalid = 0;
    for path in paths {
        match Suite::from_path(path) {
            Ok(suite) => reporter.success(&format!(
                "{}: {} ({} scenarios, {} steps)",
                path.display(),
                suite.name,
                suite.scenarios.len(),
                suite.step_count()
            )),
            Err(e) => {
                invalid += 1;
                reporter.failure(&format!("{}: {e}", path.display()));
            }
        }
    }
    if invalid > 0 {
        return Err(CliError::InvalidSuites { invalid });
    }
    Ok(())
}

/// Run suite files against a freshly launched Chromium
///
/// Suites are validated before the browser starts. Each scenario gets an
/// isolated browser context.
///
/// # Errors
///
/// Returns error if loading or launching fails; scenario failures are
/// reported in the summary
#[cfg(feature = "browser")]
pub async fn run_suites(
    args: &RunArgs,
    reporter: &mut ProgressReporter,
) -> CliResult<RunSummary> {
    use demoscope::{Browser, DriverFactory, SuiteRunner};
    use std::sync::Arc;
    use std::time::Instant;

    let start = Instant::now();
    let config = effective_config(args.config.as_deref(), Some(args))?;
    let suites = load_suites(&args.suites, args.filter.as_deref())?;
    let total: usize = suites.iter().map(|s| s.scenarios.len()).sum();

    reporter.info(&format!(
        "launching chromium ({})",
        if config.browser.headless { "headless" } else { "headed" }
    ));
    let browser = Arc::new(Browser::launch(config.browser.clone()).await?);

    let mut summary = RunSummary::default();
    reporter.start_progress(total as u64, "scenarios");
    for suite in &suites {
        reporter.set_message(&suite.name);
        let factory: Arc<dyn DriverFactory> = browser.clone();
        let runner = SuiteRunner::new(factory)
            .with_options(config.execution_options())
            .with_parallelism(config.parallel)
            .on_scenario_finished(reporter.scenario_callback());
        summary.suites.push(runner.run(suite).await);
    }
    reporter.finish();

    match Arc::try_unwrap(browser) {
        Ok(browser) => {
            if let Err(e) = browser.close().await {
                tracing::warn!(error = %e, "browser did not close cleanly");
            }
        }
        Err(_) => tracing::warn!("browser still referenced after run; leaving it to drop"),
    }

    summary.duration = start.elapsed();
    Ok(summary)
}

/// Without the `browser` feature there is nothing to drive
///
/// # Errors
///
/// Always returns a configuration error after validating the inputs
#[cfg(not(feature = "browser"))]
#[allow(clippy::unused_async)]
pub async fn run_suites(
    args: &RunArgs,
    _reporter: &mut ProgressReporter,
) -> CliResult<RunSummary> {
    effective_config(args.config.as_deref(), Some(args))?;
    load_suites(&args.suites, args.filter.as_deref())?;
    Err(CliError::config(
        "demoscope was built without the `browser` feature",
    ))
}
