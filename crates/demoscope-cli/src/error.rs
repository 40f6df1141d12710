//! Error types for the CLI

use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// One or more scenarios failed
    #[error("{failed} of {total} scenario(s) failed")]
    ScenariosFailed {
        /// Failed scenario count
        failed: usize,
        /// Scenarios run
        total: usize,
    },

    /// One or more suite files did not validate
    #[error("{invalid} suite file(s) invalid")]
    InvalidSuites {
        /// Invalid file count
        invalid: usize,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Harness library error
    #[error("{0}")]
    Harness(#[from] demoscope::HarnessError),

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },
}

impl CliError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod error_tests {
        use super::*;

        #[test]
        fn test_config_error() {
            let err = CliError::config("bad headless value");
            assert!(err.to_string().contains("Configuration error"));
            assert!(err.to_string().contains("bad headless value"));
        }

        #[test]
        fn test_invalid_argument_error() {
            let err = CliError::invalid_argument("--parallel must be at least 1");
            assert!(err.to_string().contains("Invalid argument"));
        }

        #[test]
        fn test_scenarios_failed_error() {
            let err = CliError::ScenariosFailed {
                failed: 2,
                total: 7,
            };
            assert_eq!(err.to_string(), "2 of 7 scenario(s) failed");
        }

        #[test]
        fn test_io_error_conversion() {
            let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.yaml");
            let err: CliError = io_err.into();
            assert!(matches!(err, CliError::Io(_)));
        }

        #[test]
        fn test_harness_error_passes_through() {
            let err: CliError = demoscope::HarnessError::invalid_suite("suite has no scenarios").into();
            assert!(matches!(err, CliError::Harness(_)));
            assert!(err.to_string().contains("suite has no scenarios"));
        }
    }
}
