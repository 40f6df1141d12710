//! Result and error types for Demoscope.

use thiserror::Error;

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors surfaced to scenario authors.
///
/// Harness-level errors (locator, timeout, navigation) always propagate and
/// fail the current test. Page-level runtime errors are never raised here;
/// they are collected in the diagnostic record instead.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Role was never registered in the locator registry
    #[error("Unknown role '{role}' (registered: {registered})")]
    UnknownRole {
        /// Role that was requested
        role: String,
        /// Comma-separated list of registered roles
        registered: String,
    },

    /// Selector matched nothing when queried
    #[error("Element not found for role '{role}' ({selector})")]
    ElementNotFound {
        /// Role being resolved
        role: String,
        /// Selector that was queried
        selector: String,
    },

    /// Element exists but the driver refused the interaction
    #[error("Element for role '{role}' is not interactable: {reason}")]
    ElementNotInteractable {
        /// Role being acted on
        role: String,
        /// Why the driver refused (hidden, disabled, ...)
        reason: String,
    },

    /// Polling wait did not observe the expected state in time
    #[error("Timed out after {timeout_ms}ms waiting for {waited_for}; last observed: {last_observed}")]
    ConditionTimeout {
        /// Description of the awaited condition
        waited_for: String,
        /// Timeout in milliseconds
        timeout_ms: u64,
        /// Last observed state, rendered for diagnosis
        last_observed: String,
    },

    /// Page navigation failed
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// An armed dialog expectation was never fired
    #[error("Expected {expected} dialog did not appear within {timeout_ms}ms")]
    DialogTimeout {
        /// Rendered response the expectation was armed with
        expected: String,
        /// Timeout in milliseconds
        timeout_ms: u64,
    },

    /// Teardown verification of the diagnostic record failed
    #[error("Diagnostics not clean: {summary}\n{record}")]
    DiagnosticsNotClean {
        /// Short summary of what failed verification
        summary: String,
        /// Rendered diagnostic record
        record: String,
    },

    /// Scenario assertion failed
    #[error("Assertion failed: {message}")]
    AssertionFailed {
        /// Error message
        message: String,
    },

    /// Page-side script evaluation failed
    #[error("Script evaluation failed: {message}")]
    Script {
        /// Error message
        message: String,
    },

    /// Browser launch error
    #[error("Failed to launch browser: {message}")]
    BrowserLaunch {
        /// Error message
        message: String,
    },

    /// Driver-level failure not covered by a more specific variant
    #[error("Driver error: {message}")]
    Driver {
        /// Error message
        message: String,
    },

    /// Declarative suite failed validation
    #[error("Invalid suite: {message}")]
    InvalidSuite {
        /// Error message
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl HarnessError {
    /// Create an assertion failure
    #[must_use]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::AssertionFailed {
            message: message.into(),
        }
    }

    /// Create a driver error
    #[must_use]
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    /// Create a script error
    #[must_use]
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script {
            message: message.into(),
        }
    }

    /// Create an invalid suite error
    #[must_use]
    pub fn invalid_suite(message: impl Into<String>) -> Self {
        Self::InvalidSuite {
            message: message.into(),
        }
    }

    /// Attach the role name to element errors raised by the driver
    #[must_use]
    pub fn with_role(self, role: &str) -> Self {
        match self {
            Self::ElementNotFound { selector, .. } => Self::ElementNotFound {
                role: role.to_string(),
                selector,
            },
            Self::ElementNotInteractable { reason, .. } => Self::ElementNotInteractable {
                role: role.to_string(),
                reason,
            },
            other => other,
        }
    }

    /// Whether the error is a polling or dialog timeout
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConditionTimeout { .. } | Self::DialogTimeout { .. }
        )
    }
}
