//! Suite runner: one fresh driver per scenario, optional parallelism.

use super::executor::{ExecutionOptions, ScenarioExecutor};
use super::schema::{Scenario, Suite};
use crate::driver::HarnessDriver;
use crate::harness::Session;
use crate::page_object::PageObject;
use crate::result::HarnessResult;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Creates an isolated page for each scenario
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Open a fresh page
    async fn create(&self) -> HarnessResult<Arc<dyn HarnessDriver>>;
}

/// Result of a single scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario name
    pub name: String,
    /// Whether the scenario passed
    pub passed: bool,
    /// Wall time
    pub duration: Duration,
    /// Steps completed
    pub steps_run: usize,
    /// Failure message
    pub error: Option<String>,
    /// Rendered diagnostic record
    pub diagnostics: String,
}

impl ScenarioResult {
    /// Create a passing result
    #[must_use]
    pub fn pass(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            passed: true,
            duration,
            steps_run: 0,
            error: None,
            diagnostics: String::new(),
        }
    }

    /// Create a failing result
    #[must_use]
    pub fn fail(name: impl Into<String>, duration: Duration, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            duration,
            steps_run: 0,
            error: Some(error.into()),
            diagnostics: String::new(),
        }
    }
}

/// Results of running a suite.
#[derive(Debug, Clone, Serialize)]
pub struct SuiteResult {
    /// Suite name
    pub name: String,
    /// Per-scenario results in declaration order
    pub results: Vec<ScenarioResult>,
    /// Total wall time
    pub duration: Duration,
}

impl SuiteResult {
    /// Check if all scenarios passed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    /// Get passed count
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    /// Get failed count
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.passed).count()
    }

    /// Get total count
    #[must_use]
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Get failed scenarios
    #[must_use]
    pub fn failures(&self) -> Vec<&ScenarioResult> {
        self.results.iter().filter(|r| !r.passed).collect()
    }
}

/// Callback invoked as each scenario finishes
pub type ScenarioCallback = Arc<dyn Fn(&ScenarioResult) + Send + Sync>;

/// Runs suites through a driver factory
pub struct SuiteRunner {
    factory: Arc<dyn DriverFactory>,
    options: ExecutionOptions,
    parallelism: usize,
    on_finished: Option<ScenarioCallback>,
}

impl std::fmt::Debug for SuiteRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuiteRunner")
            .field("options", &self.options)
            .field("parallelism", &self.parallelism)
            .finish_non_exhaustive()
    }
}

impl SuiteRunner {
    /// Create a sequential runner
    #[must_use]
    pub fn new(factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            factory,
            options: ExecutionOptions::default(),
            parallelism: 1,
            on_finished: None,
        }
    }

    /// Execution options
    #[must_use]
    pub const fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    /// Maximum scenarios in flight
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Observe each scenario as it finishes
    #[must_use]
    pub fn on_scenario_finished<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ScenarioResult) + Send + Sync + 'static,
    {
        self.on_finished = Some(Arc::new(callback));
        self
    }

    /// Run every scenario of a suite
    pub async fn run(&self, suite: &Suite) -> SuiteResult {
        let start = Instant::now();
        let options = suite
            .wait
            .map_or(self.options, |wait| self.options.with_suite_wait(wait));
        info!(
            suite = %suite.name,
            scenarios = suite.scenarios.len(),
            parallelism = self.parallelism,
            "running suite"
        );

        let results = stream::iter(
            suite
                .scenarios
                .iter()
                .map(|scenario| self.run_scenario(&suite.page, scenario, options)),
        )
        .buffered(self.parallelism)
        .collect::<Vec<_>>()
        .await;

        let result = SuiteResult {
            name: suite.name.clone(),
            results,
            duration: start.elapsed(),
        };
        info!(
            suite = %suite.name,
            passed = result.passed_count(),
            failed = result.failed_count(),
            "suite finished"
        );
        result
    }

    async fn run_scenario(
        &self,
        page: &PageObject,
        scenario: &Scenario,
        options: ExecutionOptions,
    ) -> ScenarioResult {
        let start = Instant::now();
        let result = match self.factory.create().await {
            Ok(driver) => execute(driver, page, scenario, options, start).await,
            Err(e) => ScenarioResult::fail(&scenario.name, start.elapsed(), e.to_string()),
        };

        if result.passed {
            info!(scenario = %result.name, duration_ms = result.duration.as_millis() as u64, "passed");
        } else {
            warn!(
                scenario = %result.name,
                error = result.error.as_deref().unwrap_or_default(),
                "failed"
            );
        }
        if let Some(callback) = &self.on_finished {
            callback(&result);
        }
        result
    }
}

async fn execute(
    driver: Arc<dyn HarnessDriver>,
    page: &PageObject,
    scenario: &Scenario,
    options: ExecutionOptions,
    start: Instant,
) -> ScenarioResult {
    let mut session = match Session::start(Arc::clone(&driver), page.clone()).await {
        Ok(session) => session
            .with_wait(options.wait)
            .with_drag_steps(options.drag_steps),
        Err(e) => {
            if let Err(close) = driver.close().await {
                warn!(error = %close, "failed to close page after start failure");
            }
            return ScenarioResult::fail(&scenario.name, start.elapsed(), e.to_string());
        }
    };
    for defect in &scenario.expect_defects {
        session.expect_defect(defect.clone());
    }

    let mut executor = ScenarioExecutor::new(&session, options);
    let outcome = executor.execute(scenario).await;
    let steps_run = executor.steps_run();
    let record = session.diagnostics().clone();
    let finished = session.finish().await;
    let diagnostics = record.render();

    let error = match (outcome, finished) {
        (Err(e), _) | (Ok(()), Err(e)) => Some(e.to_string()),
        (Ok(()), Ok(_)) => None,
    };
    ScenarioResult {
        name: scenario.name.clone(),
        passed: error.is_none(),
        duration: start.elapsed(),
        steps_run,
        error,
        diagnostics,
    }
}
