//! Harness configuration.
//!
//! Layered: defaults, then an optional `demoscope.yaml`, then environment
//! variables. The CLI applies its flags on top.

use crate::result::{HarnessError, HarnessResult};
use crate::suite::ExecutionOptions;
use crate::wait::WaitOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "demoscope.yaml";

/// Overrides the Chromium executable
pub const ENV_CHROMIUM_PATH: &str = "DEMOSCOPE_CHROMIUM_PATH";
/// `true`/`false`/`1`/`0`
pub const ENV_HEADLESS: &str = "DEMOSCOPE_HEADLESS";
/// Default polling timeout in milliseconds
pub const ENV_TIMEOUT_MS: &str = "DEMOSCOPE_TIMEOUT_MS";

/// Browser configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run in headless mode
    pub headless: bool,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Path to chromium binary (None = auto-detect)
    pub chromium_path: Option<String>,
    /// Sandbox mode (disable for containers)
    pub sandbox: bool,
    /// Extra command-line arguments
    pub args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            chromium_path: None,
            sandbox: true,
            args: Vec::new(),
        }
    }
}

impl BrowserConfig {
    /// Set viewport dimensions
    #[must_use]
    pub const fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set chromium path
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<String>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Disable sandbox (for containers/CI)
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }
}

/// Complete harness configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Browser launch settings
    pub browser: BrowserConfig,
    /// Polling defaults
    pub wait: WaitOptions,
    /// How long an armed dialog may take to appear
    pub dialog_timeout_ms: u64,
    /// Pointer moves per drag
    pub drag_steps: u32,
    /// Scenarios run concurrently
    pub parallel: usize,
    /// Wait timeout pinned by the environment or a command-line flag
    #[serde(skip)]
    pub timeout_override: Option<u64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        let execution = ExecutionOptions::default();
        Self {
            browser: BrowserConfig::default(),
            wait: execution.wait,
            dialog_timeout_ms: execution.dialog_timeout_ms,
            drag_steps: execution.drag_steps,
            parallel: 1,
            timeout_override: None,
        }
    }
}

impl HarnessConfig {
    /// Parse configuration YAML
    ///
    /// # Errors
    ///
    /// Returns error if the YAML is malformed or the values are invalid
    pub fn from_yaml(yaml: &str) -> HarnessResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration
    ///
    /// An explicit path must exist. Without one, `demoscope.yaml` in the
    /// working directory is used if present, otherwise defaults.
    ///
    /// # Errors
    ///
    /// Returns error if an explicit file is missing or any file is invalid
    pub fn load(path: Option<&Path>) -> HarnessResult<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(CONFIG_FILE_NAME), false),
        };
        if !path.exists() {
            if required {
                return Err(HarnessError::Config {
                    message: format!("config file {} not found", path.display()),
                });
            }
            tracing::debug!("no {CONFIG_FILE_NAME}, using defaults");
            return Ok(Self::default());
        }
        tracing::debug!(path = %path.display(), "loading config");
        let yaml = std::fs::read_to_string(&path)?;
        Self::from_yaml(&yaml)
    }

    /// Apply `DEMOSCOPE_*` environment overrides
    ///
    /// # Errors
    ///
    /// Returns error if an override cannot be parsed
    pub fn with_env(self) -> HarnessResult<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable source
    ///
    /// # Errors
    ///
    /// Returns error if an override cannot be parsed
    pub fn with_overrides<F>(mut self, lookup: F) -> HarnessResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_CHROMIUM_PATH).filter(|p| !p.is_empty()) {
            self.browser.chromium_path = Some(path);
        }
        if let Some(raw) = lookup(ENV_HEADLESS) {
            self.browser.headless = parse_bool(ENV_HEADLESS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            let timeout_ms = raw.trim().parse().map_err(|_| HarnessError::Config {
                message: format!("{ENV_TIMEOUT_MS}={raw:?} is not a number of milliseconds"),
            })?;
            self = self.with_timeout_override(timeout_ms);
        }
        self.validate()?;
        Ok(self)
    }

    /// Pin the wait timeout so suite-level `wait:` blocks cannot change it
    #[must_use]
    pub const fn with_timeout_override(mut self, timeout_ms: u64) -> Self {
        self.wait.timeout_ms = timeout_ms;
        self.timeout_override = Some(timeout_ms);
        self
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns `Config` naming the offending field
    pub fn validate(&self) -> HarnessResult<()> {
        let invalid = |message: &str| {
            Err(HarnessError::Config {
                message: message.to_string(),
            })
        };
        if self.parallel == 0 {
            return invalid("parallel must be at least 1");
        }
        if self.wait.poll_interval_ms == 0 {
            return invalid("wait.poll_interval_ms must be at least 1");
        }
        if self.drag_steps == 0 {
            return invalid("drag_steps must be at least 1");
        }
        if self.browser.viewport_width == 0 || self.browser.viewport_height == 0 {
            return invalid("browser viewport must be non-empty");
        }
        Ok(())
    }

    /// Options for the suite executor
    #[must_use]
    pub const fn execution_options(&self) -> ExecutionOptions {
        ExecutionOptions {
            wait: self.wait,
            dialog_timeout_ms: self.dialog_timeout_ms,
            drag_steps: self.drag_steps,
            timeout_override: self.timeout_override,
        }
    }

    /// Render as YAML
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_yaml(&self) -> HarnessResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }
}

fn parse_bool(name: &str, raw: &str) -> HarnessResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(HarnessError::Config {
            message: format!("{name}={raw:?} is not a boolean"),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    mod file_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let config = HarnessConfig::default();
            assert!(config.browser.headless);
            assert_eq!(config.parallel, 1);
            assert_eq!(config.wait.timeout_ms, 30_000);
            assert!(config.validate().is_ok());
        }

        #[test]
        fn test_partial_yaml() {
            let config = HarnessConfig::from_yaml(
                "browser:\n  headless: false\n  sandbox: false\nwait:\n  timeout_ms: 2000\nparallel: 4\n",
            )
            .unwrap();
            assert!(!config.browser.headless);
            assert!(!config.browser.sandbox);
            assert_eq!(config.browser.viewport_width, 1280);
            assert_eq!(config.wait.timeout_ms, 2000);
            assert_eq!(config.wait.poll_interval_ms, 50);
            assert_eq!(config.parallel, 4);
        }

        #[test]
        fn test_invalid_values() {
            assert!(HarnessConfig::from_yaml("parallel: 0").is_err());
            assert!(HarnessConfig::from_yaml("drag_steps: 0").is_err());
            assert!(HarnessConfig::from_yaml("wait: [1, 2]").is_err());
        }

        #[test]
        fn test_load_explicit_file() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("custom.yaml");
            std::fs::write(&path, "dialog_timeout_ms: 750\n").unwrap();
            let config = HarnessConfig::load(Some(&path)).unwrap();
            assert_eq!(config.dialog_timeout_ms, 750);
        }

        #[test]
        fn test_load_missing_explicit_file() {
            let dir = TempDir::new().unwrap();
            let err = HarnessConfig::load(Some(&dir.path().join("nope.yaml"))).unwrap_err();
            assert!(matches!(err, HarnessError::Config { .. }));
        }

        #[test]
        fn test_yaml_round_trip() {
            let config = HarnessConfig::default();
            let yaml = config.to_yaml().unwrap();
            assert_eq!(HarnessConfig::from_yaml(&yaml).unwrap(), config);
        }
    }

    mod env_tests {
        use super::*;

        #[test]
        fn test_overrides() {
            let config = HarnessConfig::default()
                .with_overrides(env(&[
                    (ENV_CHROMIUM_PATH, "/usr/bin/chromium"),
                    (ENV_HEADLESS, "0"),
                    (ENV_TIMEOUT_MS, "1500"),
                ]))
                .unwrap();
            assert_eq!(
                config.browser.chromium_path.as_deref(),
                Some("/usr/bin/chromium")
            );
            assert!(!config.browser.headless);
            assert_eq!(config.wait.timeout_ms, 1500);
            assert_eq!(config.timeout_override, Some(1500));
        }

        #[test]
        fn test_file_timeout_is_not_pinned() {
            let config = HarnessConfig::from_yaml("wait:\n  timeout_ms: 2000\n").unwrap();
            assert_eq!(config.timeout_override, None);
            assert_eq!(config.execution_options().timeout_override, None);
        }

        #[test]
        fn test_bad_bool() {
            let err = HarnessConfig::default()
                .with_overrides(env(&[(ENV_HEADLESS, "maybe")]))
                .unwrap_err();
            assert!(err.to_string().contains("DEMOSCOPE_HEADLESS"));
        }

        #[test]
        fn test_bad_timeout() {
            assert!(HarnessConfig::default()
                .with_overrides(env(&[(ENV_TIMEOUT_MS, "soon")]))
                .is_err());
        }

        #[test]
        fn test_empty_path_ignored() {
            let config = HarnessConfig::default()
                .with_overrides(env(&[(ENV_CHROMIUM_PATH, "")]))
                .unwrap();
            assert!(config.browser.chromium_path.is_none());
        }

        #[test]
        fn test_execution_options() {
            let mut config = HarnessConfig::default();
            config.dialog_timeout_ms = 10;
            config.drag_steps = 3;
            let opts = config.execution_options();
            assert_eq!(opts.dialog_timeout_ms, 10);
            assert_eq!(opts.drag_steps, 3);
        }
    }
}
