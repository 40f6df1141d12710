//! State Observer
//!
//! Immediate reads return the DOM as it is at call time and never wait.
//! Polling reads re-run a probe until a predicate holds, failing with
//! `ConditionTimeout` (carrying the last observed state) on expiry.

use crate::driver::{ElementState, HarnessDriver};
use crate::page_object::PageObject;
use crate::result::{HarnessError, HarnessResult};
use crate::wait::{poll_until, WaitOptions};
use serde_json::Value;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// One element of a role at a point in time
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSnapshot {
    /// Role that was read
    pub role: String,
    /// Element state
    pub state: ElementState,
}

/// Every element matching a role at a point in time
#[derive(Debug, Clone, PartialEq)]
pub struct UiSnapshot {
    /// Role that was read
    pub role: String,
    /// Matches in document order
    pub elements: Vec<ElementState>,
}

impl UiSnapshot {
    /// Number of matches
    #[must_use]
    pub fn count(&self) -> usize {
        self.elements.len()
    }

    /// First match
    #[must_use]
    pub fn first(&self) -> Option<&ElementState> {
        self.elements.first()
    }

    /// Trimmed texts of all matches
    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        self.elements
            .iter()
            .map(|e| e.trimmed_text().to_string())
            .collect()
    }

    /// Whether there is at least one match and every match has `class`
    #[must_use]
    pub fn all_have_class(&self, class: &str) -> bool {
        !self.elements.is_empty() && self.elements.iter().all(|e| e.has_class(class))
    }

    /// Texts parsed as numbers
    ///
    /// # Errors
    ///
    /// Returns `AssertionFailed` naming the first label that is not a number
    pub fn numeric_labels(&self) -> HarnessResult<Vec<f64>> {
        self.elements
            .iter()
            .map(|e| {
                let text = e.trimmed_text();
                text.parse::<f64>().map_err(|_| {
                    HarnessError::assertion(format!(
                        "label {text:?} of role '{}' is not a number",
                        self.role
                    ))
                })
            })
            .collect()
    }
}

/// Whether each value is `>=` the one before it
#[must_use]
pub fn is_non_decreasing(values: &[f64]) -> bool {
    values.windows(2).all(|pair| pair[0] <= pair[1])
}

/// JavaScript truthiness of a serialized value
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Reads page state for one session
#[derive(Clone)]
pub struct StateObserver {
    driver: Arc<dyn HarnessDriver>,
    page: Arc<PageObject>,
    default_wait: WaitOptions,
}

impl std::fmt::Debug for StateObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateObserver")
            .field("page", &self.page.display_name())
            .field("default_wait", &self.default_wait)
            .finish_non_exhaustive()
    }
}

impl StateObserver {
    /// Create an observer over a driver and page
    #[must_use]
    pub fn new(driver: Arc<dyn HarnessDriver>, page: Arc<PageObject>) -> Self {
        Self {
            driver,
            page,
            default_wait: WaitOptions::default(),
        }
    }

    /// Options used by the `*_default` polling helpers
    #[must_use]
    pub const fn with_default_wait(mut self, options: WaitOptions) -> Self {
        self.default_wait = options;
        self
    }

    /// Default wait options
    #[must_use]
    pub const fn default_wait(&self) -> &WaitOptions {
        &self.default_wait
    }

    // ------------------------------------------------------------------
    // Immediate reads
    // ------------------------------------------------------------------

    /// All elements of a role (possibly none)
    pub async fn snapshot(&self, role: &str) -> HarnessResult<UiSnapshot> {
        let locator = self.page.locate(role)?;
        let elements = self.driver.query_selector_all(locator.selector()).await?;
        debug!(role, count = elements.len(), "snapshot");
        Ok(UiSnapshot {
            role: role.to_string(),
            elements,
        })
    }

    /// First element of a role
    ///
    /// # Errors
    ///
    /// Returns `ElementNotFound` if nothing matches
    pub async fn element(&self, role: &str) -> HarnessResult<ElementSnapshot> {
        let locator = self.page.locate(role)?;
        let state = self
            .driver
            .query_selector(locator.selector())
            .await?
            .ok_or_else(|| locator.not_found())?;
        Ok(ElementSnapshot {
            role: role.to_string(),
            state,
        })
    }

    /// Trimmed text of the first element
    pub async fn text(&self, role: &str) -> HarnessResult<String> {
        Ok(self.element(role).await?.state.trimmed_text().to_string())
    }

    /// Trimmed texts of all elements
    pub async fn texts(&self, role: &str) -> HarnessResult<Vec<String>> {
        Ok(self.snapshot(role).await?.texts())
    }

    /// Form control value
    pub async fn value(&self, role: &str) -> HarnessResult<Option<String>> {
        Ok(self.element(role).await?.state.value)
    }

    /// Class list of the first element
    pub async fn classes(&self, role: &str) -> HarnessResult<Vec<String>> {
        Ok(self.element(role).await?.state.classes)
    }

    /// Whether the first element has a class
    pub async fn has_class(&self, role: &str, class: &str) -> HarnessResult<bool> {
        Ok(self.element(role).await?.state.has_class(class))
    }

    /// Attribute of the first element
    pub async fn attribute(&self, role: &str, name: &str) -> HarnessResult<Option<String>> {
        Ok(self.element(role).await?.state.attributes.get(name).cloned())
    }

    /// `disabled` property of the first element
    pub async fn is_disabled(&self, role: &str) -> HarnessResult<bool> {
        Ok(self.element(role).await?.state.disabled)
    }

    /// Whether the first element exists and is rendered
    pub async fn is_visible(&self, role: &str) -> HarnessResult<bool> {
        let locator = self.page.locate(role)?;
        Ok(self
            .driver
            .query_selector(locator.selector())
            .await?
            .is_some_and(|e| e.visible))
    }

    /// Number of matching elements
    pub async fn count(&self, role: &str) -> HarnessResult<usize> {
        Ok(self.snapshot(role).await?.count())
    }

    /// Computed style of the first element
    pub async fn computed_style(&self, role: &str, property: &str) -> HarnessResult<String> {
        let locator = self.page.locate(role)?;
        self.driver
            .computed_style(locator.selector(), property)
            .await?
            .ok_or_else(|| locator.not_found())
    }

    /// Run a script in the page
    pub async fn evaluate(&self, script: &str) -> HarnessResult<Value> {
        debug!(script, "evaluate");
        self.driver.evaluate(script).await
    }

    /// Texts of a role parsed as numbers
    pub async fn numeric_labels(&self, role: &str) -> HarnessResult<Vec<f64>> {
        self.snapshot(role).await?.numeric_labels()
    }

    // ------------------------------------------------------------------
    // Polling reads
    // ------------------------------------------------------------------

    /// Re-run `probe` until `predicate` holds and return the satisfying value
    ///
    /// # Errors
    ///
    /// Returns `ConditionTimeout` with the last observed value, or the first
    /// probe error.
    pub async fn wait_for_condition<T, F, Fut, P>(
        &self,
        waited_for: &str,
        options: &WaitOptions,
        probe: F,
        predicate: P,
    ) -> HarnessResult<T>
    where
        T: Debug,
        F: FnMut() -> Fut,
        Fut: Future<Output = HarnessResult<T>>,
        P: Fn(&T) -> bool,
    {
        poll_until(waited_for, options, probe, predicate)
            .await
            .map(|(value, _)| value)
    }

    /// Poll a role's snapshot until `predicate` holds
    pub async fn wait_for<P>(
        &self,
        role: &str,
        waited_for: &str,
        options: &WaitOptions,
        predicate: P,
    ) -> HarnessResult<UiSnapshot>
    where
        P: Fn(&UiSnapshot) -> bool,
    {
        self.wait_for_condition(waited_for, options, || self.snapshot(role), predicate)
            .await
    }

    /// Poll until the first element's trimmed text equals `expected`
    pub async fn wait_for_text(
        &self,
        role: &str,
        expected: &str,
        options: &WaitOptions,
    ) -> HarnessResult<UiSnapshot> {
        let waited_for = format!("'{role}' text to equal {expected:?}");
        self.wait_for(role, &waited_for, options, |s| {
            s.first().is_some_and(|e| e.trimmed_text() == expected)
        })
        .await
    }

    /// Poll until every element of a role has `class`
    pub async fn wait_for_all_class(
        &self,
        role: &str,
        class: &str,
        options: &WaitOptions,
    ) -> HarnessResult<UiSnapshot> {
        let waited_for = format!("every '{role}' to have class '{class}'");
        self.wait_for(role, &waited_for, options, |s| s.all_have_class(class))
            .await
    }

    /// Poll a page-side predicate script until it is truthy
    pub async fn wait_for_function(
        &self,
        script: &str,
        options: &WaitOptions,
    ) -> HarnessResult<Value> {
        let waited_for = format!("`{script}` to be truthy");
        self.wait_for_condition(&waited_for, options, || self.evaluate(script), is_truthy)
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::driver::{MockDriver, MockEffect, MockElement};
    use std::time::{Duration, Instant};

    fn setup() -> (MockDriver, StateObserver) {
        let driver = MockDriver::new();
        let page = PageObject::builder("about:blank")
            .css("status", "#status")
            .css("bars", ".bar")
            .css("speed", "#speedControl")
            .css("missing", "#nope")
            .build();
        driver.add_element(
            MockElement::new("div")
                .matching("#status")
                .text("  Ready  ")
                .attribute("aria-live", "polite")
                .style("color", "rgb(0, 128, 0)"),
        );
        for label in ["3", "1", "2"] {
            driver.add_element(MockElement::new("div").matching(".bar").class("bar").text(label));
        }
        driver.add_element(
            MockElement::new("select")
                .matching("#speedControl")
                .options(["50", "200", "500"]),
        );
        let observer = StateObserver::new(Arc::new(driver.clone()), Arc::new(page));
        (driver, observer)
    }

    mod snapshot_tests {
        use super::*;

        #[test]
        fn test_numeric_labels() {
            let snapshot = UiSnapshot {
                role: "bars".into(),
                elements: vec![
                    MockElement::new("div").text(" 4 ").state,
                    MockElement::new("div").text("10.5").state,
                ],
            };
            assert_eq!(snapshot.numeric_labels().unwrap(), vec![4.0, 10.5]);
        }

        #[test]
        fn test_numeric_labels_rejects_text() {
            let snapshot = UiSnapshot {
                role: "bars".into(),
                elements: vec![MockElement::new("div").text("n/a").state],
            };
            assert!(snapshot.numeric_labels().is_err());
        }

        #[test]
        fn test_all_have_class_requires_matches() {
            let empty = UiSnapshot {
                role: "bars".into(),
                elements: Vec::new(),
            };
            assert!(!empty.all_have_class("sorted"));
        }

        #[test]
        fn test_is_non_decreasing() {
            assert!(is_non_decreasing(&[]));
            assert!(is_non_decreasing(&[1.0]));
            assert!(is_non_decreasing(&[1.0, 1.0, 2.0]));
            assert!(!is_non_decreasing(&[2.0, 1.0]));
        }

        #[test]
        fn test_is_truthy() {
            assert!(!is_truthy(&Value::Null));
            assert!(!is_truthy(&serde_json::json!(0)));
            assert!(!is_truthy(&serde_json::json!("")));
            assert!(is_truthy(&serde_json::json!("x")));
            assert!(is_truthy(&serde_json::json!([])));
            assert!(is_truthy(&serde_json::json!(true)));
        }
    }

    mod immediate_read_tests {
        use super::*;

        #[tokio::test]
        async fn test_reads() {
            let (_, observer) = setup();
            assert_eq!(observer.text("status").await.unwrap(), "Ready");
            assert_eq!(observer.texts("bars").await.unwrap(), vec!["3", "1", "2"]);
            assert_eq!(observer.count("bars").await.unwrap(), 3);
            assert!(observer.has_class("bars", "bar").await.unwrap());
            assert_eq!(
                observer.attribute("status", "aria-live").await.unwrap(),
                Some("polite".to_string())
            );
            assert_eq!(
                observer.computed_style("status", "color").await.unwrap(),
                "rgb(0, 128, 0)"
            );
            assert_eq!(
                observer.value("speed").await.unwrap(),
                Some("50".to_string())
            );
            assert!(!observer.is_disabled("speed").await.unwrap());
            assert!(observer.is_visible("status").await.unwrap());
        }

        #[tokio::test]
        async fn test_missing_element() {
            let (_, observer) = setup();
            assert!(matches!(
                observer.text("missing").await,
                Err(HarnessError::ElementNotFound { .. })
            ));
            assert!(!observer.is_visible("missing").await.unwrap());
            assert_eq!(observer.count("missing").await.unwrap(), 0);
        }

        #[tokio::test]
        async fn test_reads_reflect_live_dom() {
            let (driver, observer) = setup();
            assert_eq!(observer.text("status").await.unwrap(), "Ready");
            driver
                .run_effects(vec![MockEffect::set_text("#status", "Sorting...")])
                .await
                .unwrap();
            assert_eq!(observer.text("status").await.unwrap(), "Sorting...");
        }
    }

    mod polling_tests {
        use super::*;

        #[tokio::test]
        async fn test_wait_for_text_after_timer() {
            let (driver, observer) = setup();
            driver
                .run_effects(vec![MockEffect::after(
                    Duration::from_millis(30),
                    vec![MockEffect::set_text("#status", "Sorted!")],
                )])
                .await
                .unwrap();

            let start = Instant::now();
            let opts = WaitOptions::new().with_timeout(2_000).with_poll_interval(5);
            let snapshot = observer
                .wait_for_text("status", "Sorted!", &opts)
                .await
                .unwrap();
            assert!(start.elapsed() >= Duration::from_millis(25));
            assert_eq!(snapshot.texts(), vec!["Sorted!"]);
        }

        #[tokio::test]
        async fn test_wait_for_all_class_times_out_with_state() {
            let (_, observer) = setup();
            let opts = WaitOptions::new().with_timeout(30).with_poll_interval(5);
            let err = observer
                .wait_for_all_class("bars", "sorted", &opts)
                .await
                .unwrap_err();
            match err {
                HarnessError::ConditionTimeout { last_observed, .. } => {
                    assert!(last_observed.contains("\"bar\""));
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        #[tokio::test]
        async fn test_wait_for_function() {
            let (driver, observer) = setup();
            driver.set_eval_results(
                "window.sortDone",
                [
                    serde_json::json!(null),
                    serde_json::json!(false),
                    serde_json::json!(true),
                ],
            );
            let opts = WaitOptions::new().with_timeout(1_000).with_poll_interval(1);
            let value = observer
                .wait_for_function("window.sortDone", &opts)
                .await
                .unwrap();
            assert_eq!(value, serde_json::json!(true));
        }

        #[tokio::test]
        async fn test_wait_for_condition_custom_probe() {
            let (_, observer) = setup();
            let opts = WaitOptions::new().with_timeout(100);
            let labels = observer
                .wait_for_condition(
                    "three numeric labels",
                    &opts,
                    || observer.numeric_labels("bars"),
                    |labels| labels.len() == 3,
                )
                .await
                .unwrap();
            assert!(!is_non_decreasing(&labels));
        }
    }
}
