//! Scenario execution engine.
//!
//! Runs one scenario's steps against a [`Session`]. An `expect_dialog` step
//! arms its response before the next step runs; after that step the armed
//! dialog must have fired and match the declared type and message.

use super::schema::{Scenario, Step};
use crate::dialog::{DialogExpectation, DialogType};
use crate::harness::Session;
use crate::observer::{is_non_decreasing, is_truthy};
use crate::result::{HarnessError, HarnessResult};
use crate::wait::WaitOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Knobs for scenario execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOptions {
    /// Polling defaults for wait steps
    pub wait: WaitOptions,
    /// How long an armed dialog may take to appear
    pub dialog_timeout_ms: u64,
    /// Pointer moves per drag
    pub drag_steps: u32,
    /// Wait timeout that suite `wait:` blocks must not replace
    pub timeout_override: Option<u64>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            wait: WaitOptions::default(),
            dialog_timeout_ms: 5_000,
            drag_steps: crate::action::DEFAULT_DRAG_STEPS,
            timeout_override: None,
        }
    }
}

impl ExecutionOptions {
    /// Set polling defaults
    #[must_use]
    pub const fn with_wait(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }

    /// Apply a suite's `wait:` block, keeping any pinned timeout
    #[must_use]
    pub const fn with_suite_wait(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        if let Some(timeout_ms) = self.timeout_override {
            self.wait.timeout_ms = timeout_ms;
        }
        self
    }

    /// Set dialog timeout
    #[must_use]
    pub const fn with_dialog_timeout(mut self, timeout_ms: u64) -> Self {
        self.dialog_timeout_ms = timeout_ms;
        self
    }
}

struct ArmedDialog {
    expectation: DialogExpectation,
    dialog_type: Option<DialogType>,
    message_contains: Option<String>,
}

/// Executes scenarios step by step.
#[derive(Debug)]
pub struct ScenarioExecutor<'a> {
    session: &'a Session,
    options: ExecutionOptions,
    steps_run: usize,
}

impl<'a> ScenarioExecutor<'a> {
    /// Create an executor over a started session.
    #[must_use]
    pub const fn new(session: &'a Session, options: ExecutionOptions) -> Self {
        Self {
            session,
            options,
            steps_run: 0,
        }
    }

    /// Steps completed so far
    #[must_use]
    pub const fn steps_run(&self) -> usize {
        self.steps_run
    }

    /// Navigate and run every step, stopping at the first failure.
    ///
    /// # Errors
    /// Returns the first harness error or assertion failure, prefixed with the
    /// failing step.
    pub async fn execute(&mut self, scenario: &Scenario) -> HarnessResult<()> {
        self.session.goto().await?;

        let mut armed: Vec<ArmedDialog> = Vec::new();
        for (index, step) in scenario.steps.iter().enumerate() {
            debug!(scenario = %scenario.name, step = index + 1, %step, "step");
            if let Step::ExpectDialog {
                response,
                dialog_type,
                message_contains,
            } = step
            {
                armed.push(ArmedDialog {
                    expectation: self.session.expect_dialog(response.clone()),
                    dialog_type: *dialog_type,
                    message_contains: message_contains.clone(),
                });
                self.steps_run += 1;
                continue;
            }

            self.run_step(step)
                .await
                .map_err(|e| at_step(index, step, e))?;
            for dialog in armed.drain(..) {
                self.check_dialog(dialog)
                    .await
                    .map_err(|e| at_step(index, step, e))?;
            }
            self.steps_run += 1;
        }
        Ok(())
    }

    async fn check_dialog(&self, mut armed: ArmedDialog) -> HarnessResult<()> {
        let timeout = Duration::from_millis(self.options.dialog_timeout_ms);
        let dialog = armed.expectation.fired(timeout).await?;
        if let Some(expected) = armed.dialog_type {
            if dialog.dialog_type() != expected {
                return Err(HarnessError::assertion(format!(
                    "expected a {expected} dialog, got {} {:?}",
                    dialog.dialog_type(),
                    dialog.message()
                )));
            }
        }
        if let Some(text) = &armed.message_contains {
            if !dialog.message().contains(text.as_str()) {
                return Err(HarnessError::assertion(format!(
                    "dialog message {:?} does not contain {text:?}",
                    dialog.message()
                )));
            }
        }
        Ok(())
    }

    fn timeout(&self, override_ms: Option<u64>) -> WaitOptions {
        override_ms.map_or(self.options.wait, |ms| self.options.wait.with_timeout(ms))
    }

    async fn run_step(&self, step: &Step) -> HarnessResult<()> {
        let actions = self.session.actions();
        let observe = self.session.observe();
        match step {
            Step::Navigate => self.session.goto().await,
            Step::Click { role } => actions.click(role).await,
            Step::DoubleClick { role } => actions.double_click(role).await,
            Step::Fill { role, value } => actions.fill(role, value).await,
            Step::Select { role, value } => actions.select_option(role, value).await,
            Step::Press { role, key } => actions.press(role, key).await,
            Step::SetRange { role, value } => actions.set_range(role, value).await,
            Step::Check { role, checked } => actions.check(role, *checked).await,
            Step::Drag { role, to } => actions.drag(role, to).await,
            Step::ExpectDialog { .. } => Ok(()),
            Step::WaitFor {
                role,
                condition,
                timeout_ms,
            } => {
                let waited_for = format!("'{role}' {condition}");
                observe
                    .wait_for(role, &waited_for, &self.timeout(*timeout_ms), |s| {
                        condition.holds(s)
                    })
                    .await
                    .map(|_| ())
            }
            Step::Assert { role, condition } => {
                let snapshot = observe.snapshot(role).await?;
                if condition.holds(&snapshot) {
                    Ok(())
                } else {
                    Err(HarnessError::assertion(format!(
                        "'{role}' {condition} does not hold; observed {:?}",
                        snapshot.elements
                    )))
                }
            }
            Step::AssertSorted { role, class } => {
                let snapshot = observe.snapshot(role).await?;
                let marked = snapshot.all_have_class(class);
                let labels = snapshot.numeric_labels()?;
                let ordered = !labels.is_empty() && is_non_decreasing(&labels);
                match (marked, ordered) {
                    (true, true) => Ok(()),
                    (false, false) => Err(HarnessError::assertion(format!(
                        "'{role}' is not sorted: labels {labels:?}"
                    ))),
                    _ => Err(HarnessError::assertion(format!(
                        "'{role}' sort markers disagree with labels: all marked '{class}' = {marked}, labels {labels:?}"
                    ))),
                }
            }
            Step::Evaluate {
                script,
                wait,
                timeout_ms,
            } => {
                if *wait {
                    observe
                        .wait_for_function(script, &self.timeout(*timeout_ms))
                        .await
                        .map(|_| ())
                } else {
                    let value = observe.evaluate(script).await?;
                    if is_truthy(&value) {
                        Ok(())
                    } else {
                        Err(HarnessError::assertion(format!(
                            "`{script}` evaluated to {value}"
                        )))
                    }
                }
            }
        }
    }
}

fn at_step(index: usize, step: &Step, error: HarnessError) -> HarnessError {
    match error {
        HarnessError::AssertionFailed { message } => {
            HarnessError::assertion(format!("step {} ({step}): {message}", index + 1))
        }
        other => other,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::dialog::Dialog;
    use crate::driver::{MockDriver, MockEffect, MockElement};
    use crate::page_object::PageObject;
    use crate::suite::Suite;
    use std::sync::Arc;

    const STACK: &str = r##"
version: "1.0"
name: stack
page:
  url: file:///demo/stack.html
  roles:
    value: "#valueInput"
    push: "#pushBtn"
    pop: "#popBtn"
    top: "#top"
scenarios:
  - name: pop empty alerts
    steps:
      - type: expect_dialog
        response: accept
        dialog_type: alert
        message_contains: empty
      - type: click
        role: pop
      - type: assert
        role: top
        condition:
          text_equals: "-"
"##;

    fn stack_driver() -> MockDriver {
        let driver = MockDriver::new().with_dialog_wait(Duration::from_secs(2));
        driver.add_element(MockElement::new("input").matching("#valueInput"));
        driver.add_element(MockElement::new("button").matching("#pushBtn"));
        driver.add_element(MockElement::new("button").matching("#popBtn"));
        driver.add_element(MockElement::new("div").matching("#top").text("-"));
        driver
    }

    async fn run(driver: MockDriver, yaml: &str) -> (HarnessResult<()>, usize) {
        let suite = Suite::from_yaml(yaml).unwrap();
        let page: PageObject = suite.page.clone();
        let session = Session::start(Arc::new(driver), page).await.unwrap();
        let options = ExecutionOptions::default()
            .with_dialog_timeout(200)
            .with_wait(WaitOptions::new().with_timeout(200).with_poll_interval(5));
        let mut executor = ScenarioExecutor::new(&session, options);
        let result = executor.execute(&suite.scenarios[0]).await;
        let steps = executor.steps_run();
        drop(session);
        (result, steps)
    }

    #[tokio::test]
    async fn test_dialog_step_passes() {
        let driver = stack_driver();
        driver.on_click("#popBtn", vec![MockEffect::dialog(Dialog::alert("Stack is empty"))]);
        let (result, steps) = run(driver, STACK).await;
        result.unwrap();
        assert_eq!(steps, 3);
    }

    #[tokio::test]
    async fn test_dialog_never_fires() {
        let (result, steps) = run(stack_driver(), STACK).await;
        assert!(matches!(result, Err(HarnessError::DialogTimeout { .. })));
        assert_eq!(steps, 1);
    }

    #[tokio::test]
    async fn test_dialog_message_mismatch() {
        let driver = stack_driver();
        driver.on_click("#popBtn", vec![MockEffect::dialog(Dialog::alert("Popped 3"))]);
        let (result, _) = run(driver, STACK).await;
        let err = result.unwrap_err().to_string();
        assert!(err.contains("step 2 (click pop)"));
        assert!(err.contains("does not contain \"empty\""));
    }

    #[tokio::test]
    async fn test_assert_failure_reports_observed() {
        let driver = stack_driver();
        driver.on_click(
            "#popBtn",
            vec![
                MockEffect::dialog(Dialog::alert("empty")),
                MockEffect::set_text("#top", "7"),
            ],
        );
        let (result, steps) = run(driver, STACK).await;
        let err = result.unwrap_err().to_string();
        assert!(err.contains("step 3"));
        assert!(err.contains("text == \"-\""));
        assert_eq!(steps, 2);
    }

    #[tokio::test]
    async fn test_prompt_accept_with_value() {
        let yaml = r##"
version: "1.0"
name: heap
page:
  url: about:blank
  roles:
    insert: "#insert"
    root: "#root"
scenarios:
  - name: insert via prompt
    steps:
      - type: expect_dialog
        response:
          accept_with: "17"
        dialog_type: prompt
      - type: click
        role: insert
      - type: wait_for
        role: root
        condition:
          text_equals: 17
"##;
        let driver = MockDriver::new();
        driver.add_element(MockElement::new("button").matching("#insert"));
        driver.add_element(MockElement::new("div").matching("#root"));
        driver.on_click("#insert", vec![MockEffect::prompt_into("Value?", "#root")]);
        let (result, steps) = run(driver, yaml).await;
        result.unwrap();
        assert_eq!(steps, 3);
    }

    #[tokio::test]
    async fn test_assert_sorted_disagreement() {
        let yaml = r##"
version: "1.0"
name: sort
page:
  url: about:blank
  roles:
    bars: ".bar"
scenarios:
  - name: markers lie
    steps:
      - type: assert_sorted
        role: bars
"##;
        let driver = MockDriver::new();
        for label in ["2", "1"] {
            driver.add_element(
                MockElement::new("div")
                    .matching(".bar")
                    .class("bar")
                    .class("sorted")
                    .text(label),
            );
        }
        let (result, _) = run(driver, yaml).await;
        assert!(result.unwrap_err().to_string().contains("disagree"));
    }

    #[tokio::test]
    async fn test_evaluate_step() {
        let yaml = r##"
version: "1.0"
name: graph
page:
  url: about:blank
scenarios:
  - name: bfs completes
    steps:
      - type: evaluate
        script: "window.visited.length === 6"
        wait: true
      - type: evaluate
        script: "window.queue.length"
"##;
        let driver = MockDriver::new();
        driver.set_eval_results(
            "window.visited.length === 6",
            [serde_json::json!(false), serde_json::json!(true)],
        );
        driver.set_eval_results("window.queue.length", [serde_json::json!(0)]);
        let (result, steps) = run(driver, yaml).await;
        let err = result.unwrap_err().to_string();
        assert!(err.contains("evaluated to 0"));
        assert_eq!(steps, 1);
    }
}
