//! Suite YAML schema.

use crate::action::DragTarget;
use crate::diagnostics::ExpectedDefect;
use crate::dialog::{DialogResponse, DialogType};
use crate::observer::UiSnapshot;
use crate::page_object::PageObject;
use crate::result::{HarnessError, HarnessResult};
use crate::wait::WaitOptions;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// Supported schema version
pub const SUITE_VERSION: &str = "1.0";

/// Root suite document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suite {
    /// Schema version (must be "1.0")
    pub version: String,
    /// Suite name
    pub name: String,
    /// Suite description
    #[serde(default)]
    pub description: String,
    /// Page under test
    pub page: PageObject,
    /// Polling defaults for this suite
    #[serde(default)]
    pub wait: Option<WaitOptions>,
    /// Scenarios, each run on a fresh page
    pub scenarios: Vec<Scenario>,
}

/// One test: steps on a fresh page plus the defects it is allowed to see.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name (unique within the suite)
    pub name: String,
    /// Scenario description
    #[serde(default)]
    pub description: String,
    /// Steps in order
    pub steps: Vec<Step>,
    /// Known page defects that must appear
    #[serde(default)]
    pub expect_defects: Vec<ExpectedDefect>,
}

/// A single scenario step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    /// Reload the page URL
    Navigate,
    /// Click a role
    Click {
        /// Target role
        role: String,
    },
    /// Double-click a role
    DoubleClick {
        /// Target role
        role: String,
    },
    /// Fill a text control
    Fill {
        /// Target role
        role: String,
        /// Text, passed through unmodified
        #[serde(deserialize_with = "scalar_string")]
        value: String,
    },
    /// Select an option by value
    Select {
        /// Target role
        role: String,
        /// Option value
        #[serde(deserialize_with = "scalar_string")]
        value: String,
    },
    /// Press a key on a role
    Press {
        /// Target role
        role: String,
        /// Key name (e.g. "Enter")
        key: String,
    },
    /// Set a range slider
    SetRange {
        /// Target role
        role: String,
        /// New value
        #[serde(deserialize_with = "scalar_string")]
        value: String,
    },
    /// Check or uncheck
    Check {
        /// Target role
        role: String,
        /// Desired state
        #[serde(default = "default_true")]
        checked: bool,
    },
    /// Drag a role to another role or a point
    Drag {
        /// Source role
        role: String,
        /// Destination
        to: DragTarget,
    },
    /// Arm a dialog response for the next step
    ExpectDialog {
        /// Response to give
        response: DialogResponse,
        /// Required dialog type
        #[serde(default)]
        dialog_type: Option<DialogType>,
        /// Substring the dialog message must contain
        #[serde(default)]
        message_contains: Option<String>,
    },
    /// Poll until a condition holds
    WaitFor {
        /// Role to observe
        role: String,
        /// Condition
        condition: Condition,
        /// Override the suite timeout
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    /// Check a condition immediately
    Assert {
        /// Role to observe
        role: String,
        /// Condition
        condition: Condition,
    },
    /// All elements marked with `class` iff their labels are non-decreasing,
    /// and both hold
    AssertSorted {
        /// Role of the bars
        role: String,
        /// Class marking a sorted element
        #[serde(default = "default_sorted_class")]
        class: String,
    },
    /// Evaluate a script; its result must be truthy
    Evaluate {
        /// Script
        script: String,
        /// Poll until truthy instead of checking once
        #[serde(default)]
        wait: bool,
        /// Override the suite timeout when waiting
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
}

fn default_true() -> bool {
    true
}

fn default_sorted_class() -> String {
    "sorted".to_string()
}

/// Accept `500`, `1.0`, `true` or `"500"` where a string is expected
///
/// Floats keep a decimal point or exponent (`1.0` stays `"1.0"`); quote the
/// value to keep any other spelling such as trailing zeros.
fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Str(String),
        Int(i64),
        Float(f64),
        Bool(bool),
    }

    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::Str(s) => s,
        Scalar::Int(i) => i.to_string(),
        Scalar::Float(f) => format!("{f:?}"),
        Scalar::Bool(b) => b.to_string(),
    })
}

impl Step {
    /// Roles the step refers to
    #[must_use]
    pub fn roles(&self) -> Vec<&str> {
        match self {
            Self::Click { role }
            | Self::DoubleClick { role }
            | Self::Fill { role, .. }
            | Self::Select { role, .. }
            | Self::Press { role, .. }
            | Self::SetRange { role, .. }
            | Self::Check { role, .. }
            | Self::WaitFor { role, .. }
            | Self::Assert { role, .. }
            | Self::AssertSorted { role, .. } => vec![role.as_str()],
            Self::Drag { role, to } => match to {
                DragTarget::Role(other) => vec![role.as_str(), other.as_str()],
                DragTarget::Point { .. } => vec![role.as_str()],
            },
            Self::Navigate | Self::ExpectDialog { .. } | Self::Evaluate { .. } => Vec::new(),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Navigate => write!(f, "navigate"),
            Self::Click { role } => write!(f, "click {role}"),
            Self::DoubleClick { role } => write!(f, "double_click {role}"),
            Self::Fill { role, value } => write!(f, "fill {role} {value:?}"),
            Self::Select { role, value } => write!(f, "select {role} {value:?}"),
            Self::Press { role, key } => write!(f, "press {role} {key}"),
            Self::SetRange { role, value } => write!(f, "set_range {role} {value:?}"),
            Self::Check { role, checked } => write!(f, "check {role} {checked}"),
            Self::Drag { role, to } => match to {
                DragTarget::Role(other) => write!(f, "drag {role} to {other}"),
                DragTarget::Point { x, y } => write!(f, "drag {role} to ({x}, {y})"),
            },
            Self::ExpectDialog { response, .. } => write!(f, "expect_dialog {response}"),
            Self::WaitFor { role, condition, .. } => write!(f, "wait_for {role} {condition}"),
            Self::Assert { role, condition } => write!(f, "assert {role} {condition}"),
            Self::AssertSorted { role, class } => write!(f, "assert_sorted {role} .{class}"),
            Self::Evaluate { script, .. } => write!(f, "evaluate `{script}`"),
        }
    }
}

/// Condition on a role's elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// First element's trimmed text equals
    TextEquals(#[serde(deserialize_with = "scalar_string")] String),
    /// First element's text contains
    TextContains(#[serde(deserialize_with = "scalar_string")] String),
    /// First element has class
    HasClass(String),
    /// At least one element and all have class
    AllHaveClass(String),
    /// Element count is at least
    CountAtLeast(usize),
    /// Element count equals
    CountEquals(usize),
    /// First element's value equals
    ValueEquals(#[serde(deserialize_with = "scalar_string")] String),
    /// First element exists and is enabled
    Enabled,
    /// First element exists and is disabled
    Disabled,
    /// First element exists and is visible
    Visible,
    /// First element is absent or hidden
    Hidden,
}

impl Condition {
    /// Evaluate against a snapshot
    #[must_use]
    pub fn holds(&self, snapshot: &UiSnapshot) -> bool {
        let first = snapshot.first();
        match self {
            Self::TextEquals(t) => first.is_some_and(|e| e.trimmed_text() == t),
            Self::TextContains(t) => first.is_some_and(|e| e.text.contains(t.as_str())),
            Self::HasClass(c) => first.is_some_and(|e| e.has_class(c)),
            Self::AllHaveClass(c) => snapshot.all_have_class(c),
            Self::CountAtLeast(n) => snapshot.count() >= *n,
            Self::CountEquals(n) => snapshot.count() == *n,
            Self::ValueEquals(v) => first.is_some_and(|e| e.value.as_deref() == Some(v.as_str())),
            Self::Enabled => first.is_some_and(|e| !e.disabled),
            Self::Disabled => first.is_some_and(|e| e.disabled),
            Self::Visible => first.is_some_and(|e| e.visible),
            Self::Hidden => first.map_or(true, |e| !e.visible),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TextEquals(t) => write!(f, "text == {t:?}"),
            Self::TextContains(t) => write!(f, "text contains {t:?}"),
            Self::HasClass(c) => write!(f, "has class '{c}'"),
            Self::AllHaveClass(c) => write!(f, "all have class '{c}'"),
            Self::CountAtLeast(n) => write!(f, "count >= {n}"),
            Self::CountEquals(n) => write!(f, "count == {n}"),
            Self::ValueEquals(v) => write!(f, "value == {v:?}"),
            Self::Enabled => write!(f, "enabled"),
            Self::Disabled => write!(f, "disabled"),
            Self::Visible => write!(f, "visible"),
            Self::Hidden => write!(f, "hidden"),
        }
    }
}

impl Suite {
    /// Parse and validate a suite from YAML.
    ///
    /// # Errors
    /// Returns error if YAML is invalid or schema validation fails.
    pub fn from_yaml(yaml: &str) -> HarnessResult<Self> {
        let suite: Self = serde_yaml_ng::from_str(yaml)?;
        suite.validate()?;
        Ok(suite)
    }

    /// Load a suite file; relative page paths resolve against its directory.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is not a valid suite.
    pub fn from_path(path: &Path) -> HarnessResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        let mut suite = Self::from_yaml(&yaml)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let base = std::fs::canonicalize(base).unwrap_or_else(|_| base.to_path_buf());
        suite.page = suite.page.resolved_against(&base);
        Ok(suite)
    }

    /// Validate the suite structure.
    ///
    /// # Errors
    /// Returns `InvalidSuite` describing the first problem found.
    pub fn validate(&self) -> HarnessResult<()> {
        if self.version != SUITE_VERSION {
            return Err(HarnessError::invalid_suite(format!(
                "unsupported version '{}' (expected {SUITE_VERSION})",
                self.version
            )));
        }
        if self.name.trim().is_empty() {
            return Err(HarnessError::invalid_suite("suite name is empty"));
        }
        if self.page.url.trim().is_empty() {
            return Err(HarnessError::invalid_suite("page url is empty"));
        }
        if self.scenarios.is_empty() {
            return Err(HarnessError::invalid_suite("suite has no scenarios"));
        }

        let mut names = HashSet::new();
        for scenario in &self.scenarios {
            if scenario.name.trim().is_empty() {
                return Err(HarnessError::invalid_suite("scenario name is empty"));
            }
            if !names.insert(scenario.name.as_str()) {
                return Err(HarnessError::invalid_suite(format!(
                    "duplicate scenario name '{}'",
                    scenario.name
                )));
            }
            scenario.validate(&self.page)?;
        }
        Ok(())
    }

    /// Total number of steps across scenarios
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.scenarios.iter().map(|s| s.steps.len()).sum()
    }
}

impl Scenario {
    fn validate(&self, page: &PageObject) -> HarnessResult<()> {
        for (index, step) in self.steps.iter().enumerate() {
            for role in step.roles() {
                if !page.roles.contains(role) {
                    return Err(HarnessError::invalid_suite(format!(
                        "scenario '{}' step {} ({step}) uses unknown role '{role}' (registered: {})",
                        self.name,
                        index + 1,
                        page.roles.role_names().join(", ")
                    )));
                }
            }
        }
        if matches!(self.steps.last(), Some(Step::ExpectDialog { .. })) {
            return Err(HarnessError::invalid_suite(format!(
                "scenario '{}' ends with expect_dialog; nothing can trigger it",
                self.name
            )));
        }
        for defect in &self.expect_defects {
            if defect.contains.is_empty() {
                return Err(HarnessError::invalid_suite(format!(
                    "scenario '{}' declares an expected defect with empty text",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::driver::MockElement;

    const SUITE: &str = r##"
version: "1.0"
name: sort visualizer
page:
  url: sort-visualizer/index.html
  roles:
    start: "#startBtn"
    speed: "#speedControl"
    bars: ".bar"
    status: "testid=status"
wait:
  timeout_ms: 5000
scenarios:
  - name: speed select reads back
    steps:
      - type: select
        role: speed
        value: 500
      - type: assert
        role: speed
        condition:
          value_equals: "500"
  - name: sorts
    steps:
      - type: click
        role: start
      - type: wait_for
        role: bars
        condition:
          all_have_class: sorted
        timeout_ms: 10000
      - type: assert_sorted
        role: bars
      - type: assert
        role: status
        condition: visible
    expect_defects:
      - kind: console_message
        contains: deprecated
"##;

    mod parse_tests {
        use super::*;

        #[test]
        fn test_parse_suite() {
            let suite = Suite::from_yaml(SUITE).unwrap();
            assert_eq!(suite.name, "sort visualizer");
            assert_eq!(suite.scenarios.len(), 2);
            assert_eq!(suite.step_count(), 6);
            assert_eq!(suite.wait.unwrap().timeout_ms, 5000);
            assert_eq!(
                suite.scenarios[0].steps[0],
                Step::Select {
                    role: "speed".into(),
                    value: "500".into()
                }
            );
            assert_eq!(
                suite.scenarios[1].steps[2],
                Step::AssertSorted {
                    role: "bars".into(),
                    class: "sorted".into()
                }
            );
            assert_eq!(suite.scenarios[1].expect_defects.len(), 1);
        }

        #[test]
        fn test_dialog_step() {
            let step: Step = serde_yaml_ng::from_str(
                "type: expect_dialog\nresponse:\n  accept_with: '42'\ndialog_type: prompt\nmessage_contains: Enter\n",
            )
            .unwrap();
            assert_eq!(
                step,
                Step::ExpectDialog {
                    response: DialogResponse::AcceptWith("42".into()),
                    dialog_type: Some(DialogType::Prompt),
                    message_contains: Some("Enter".into()),
                }
            );
        }

        #[test]
        fn test_check_defaults_true() {
            let step: Step = serde_yaml_ng::from_str("type: check\nrole: wrap\n").unwrap();
            assert_eq!(
                step,
                Step::Check {
                    role: "wrap".into(),
                    checked: true
                }
            );
        }

        #[test]
        fn test_step_display() {
            let step = Step::Drag {
                role: "node".into(),
                to: DragTarget::role("bin"),
            };
            assert_eq!(step.to_string(), "drag node to bin");
            assert_eq!(step.roles(), vec!["node", "bin"]);
        }
    }

    mod validate_tests {
        use super::*;

        #[test]
        fn test_bad_version() {
            let yaml = SUITE.replace("version: \"1.0\"", "version: \"2.0\"");
            let err = Suite::from_yaml(&yaml).unwrap_err();
            assert!(err.to_string().contains("unsupported version"));
        }

        #[test]
        fn test_unknown_role() {
            let yaml = SUITE.replace("role: start", "role: stop");
            let err = Suite::from_yaml(&yaml).unwrap_err();
            let text = err.to_string();
            assert!(text.contains("unknown role 'stop'"));
            assert!(text.contains("bars, speed, start, status"));
        }

        #[test]
        fn test_duplicate_scenarios() {
            let yaml = SUITE.replace("name: sorts", "name: speed select reads back");
            assert!(Suite::from_yaml(&yaml)
                .unwrap_err()
                .to_string()
                .contains("duplicate"));
        }

        #[test]
        fn test_trailing_expect_dialog() {
            let mut suite = Suite::from_yaml(SUITE).unwrap();
            suite.scenarios[0].steps.push(Step::ExpectDialog {
                response: DialogResponse::Accept,
                dialog_type: None,
                message_contains: None,
            });
            assert!(suite.validate().is_err());
        }

        #[test]
        fn test_no_scenarios() {
            let mut suite = Suite::from_yaml(SUITE).unwrap();
            suite.scenarios.clear();
            assert!(suite.validate().is_err());
        }
    }

    mod condition_tests {
        use super::*;

        fn snapshot(elements: Vec<MockElement>) -> UiSnapshot {
            UiSnapshot {
                role: "r".into(),
                elements: elements.into_iter().map(|e| e.state).collect(),
            }
        }

        #[test]
        fn test_text_and_value() {
            let s = snapshot(vec![MockElement::new("div").text(" Sorted! ").value("5")]);
            assert!(Condition::TextEquals("Sorted!".into()).holds(&s));
            assert!(Condition::TextContains("Sort".into()).holds(&s));
            assert!(Condition::ValueEquals("5".into()).holds(&s));
            assert!(!Condition::ValueEquals("6".into()).holds(&s));
        }

        #[test]
        fn test_counts_and_classes() {
            let s = snapshot(vec![
                MockElement::new("div").class("bar").class("sorted"),
                MockElement::new("div").class("bar"),
            ]);
            assert!(Condition::CountAtLeast(2).holds(&s));
            assert!(Condition::CountEquals(2).holds(&s));
            assert!(Condition::HasClass("sorted".into()).holds(&s));
            assert!(!Condition::AllHaveClass("sorted".into()).holds(&s));
        }

        #[test]
        fn test_absent_element() {
            let s = snapshot(Vec::new());
            assert!(Condition::Hidden.holds(&s));
            assert!(!Condition::Visible.holds(&s));
            assert!(!Condition::Enabled.holds(&s));
            assert!(!Condition::Disabled.holds(&s));
        }

        fn condition_of(yaml: &str) -> Condition {
            let step: Step =
                serde_yaml_ng::from_str(&format!("type: assert\nrole: count\n{yaml}")).unwrap();
            match step {
                Step::Assert { condition, .. } => condition,
                other => panic!("expected assert, got {other}"),
            }
        }

        #[test]
        fn test_unit_condition_yaml() {
            assert_eq!(condition_of("condition: disabled\n"), Condition::Disabled);
            assert_eq!(
                condition_of("condition:\n  text_equals: 42\n"),
                Condition::TextEquals("42".into())
            );
        }

        #[test]
        fn test_float_scalars_keep_decimal_point() {
            assert_eq!(
                condition_of("condition:\n  text_equals: 1.0\n"),
                Condition::TextEquals("1.0".into())
            );
            assert_eq!(
                condition_of("condition:\n  value_equals: 0.25\n"),
                Condition::ValueEquals("0.25".into())
            );
            let step: Step =
                serde_yaml_ng::from_str("type: set_range\nrole: zoom\nvalue: 2.0\n").unwrap();
            assert!(matches!(step, Step::SetRange { ref value, .. } if value == "2.0"));
        }
    }
}
