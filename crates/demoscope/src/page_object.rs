//! Declarative Page Objects
//!
//! One generic page object parameterized by a role → selector map replaces a
//! hand-written class per demo page.
//!
//! ```yaml
//! url: sort-visualizer/index.html
//! roles:
//!   start: "#startBtn"
//!   speed: "#speedControl"
//!   bars: ".bar"
//!   status: "testid=status"
//! ```

use crate::locator::{Locator, LocatorRegistry, Selector};
use crate::result::HarnessResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

const DEFAULT_LOAD_TIMEOUT_MS: u64 = 30_000;

fn default_load_timeout() -> u64 {
    DEFAULT_LOAD_TIMEOUT_MS
}

/// A demo page: where it lives and how its controls are found
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageObject {
    /// Display name for logs and reports
    #[serde(default)]
    pub name: String,
    /// Page URL, or a file path relative to the suite file
    pub url: String,
    /// Role → selector map
    #[serde(default)]
    pub roles: LocatorRegistry,
    /// Navigation timeout in milliseconds
    #[serde(default = "default_load_timeout")]
    pub load_timeout_ms: u64,
}

impl PageObject {
    /// Start building a page object
    #[must_use]
    pub fn builder(url: impl Into<String>) -> PageObjectBuilder {
        PageObjectBuilder::new(url)
    }

    /// Resolve a role
    ///
    /// # Errors
    ///
    /// Returns `UnknownRole` if the role is not registered
    pub fn locate(&self, role: &str) -> HarnessResult<Locator> {
        self.roles.locate(role)
    }

    /// Page name, falling back to the URL
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.url
        } else {
            &self.name
        }
    }

    /// Make a relative file URL absolute against `base_dir`
    ///
    /// URLs with a scheme are left untouched; anything else is treated as a
    /// path and turned into a percent-encoded `file://` URL. A relative
    /// `base_dir` is taken from the working directory.
    #[must_use]
    pub fn resolved_against(mut self, base_dir: &Path) -> Self {
        if has_scheme(&self.url) {
            return self;
        }
        let mut absolute = base_dir.join(&self.url);
        if absolute.is_relative() {
            if let Ok(cwd) = std::env::current_dir() {
                absolute = cwd.join(absolute);
            }
        }
        match Url::from_file_path(&absolute) {
            Ok(url) => self.url = url.into(),
            Err(()) => tracing::warn!(
                path = %absolute.display(),
                "page path cannot be expressed as a file URL"
            ),
        }
        self
    }
}

fn has_scheme(url: &str) -> bool {
    url.split_once("://").is_some_and(|(scheme, _)| {
        !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    }) || url.starts_with("about:")
        || url.starts_with("data:")
}

/// Builder for [`PageObject`]
#[derive(Debug, Clone)]
pub struct PageObjectBuilder {
    name: String,
    url: String,
    roles: crate::locator::LocatorRegistryBuilder,
    load_timeout_ms: u64,
}

impl PageObjectBuilder {
    /// Create a new builder
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            url: url.into(),
            roles: LocatorRegistry::builder(),
            load_timeout_ms: DEFAULT_LOAD_TIMEOUT_MS,
        }
    }

    /// Set display name
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Register a role
    #[must_use]
    pub fn role(mut self, name: impl Into<String>, selector: Selector) -> Self {
        self.roles = self.roles.role(name, selector);
        self
    }

    /// Register a role with a CSS selector
    #[must_use]
    pub fn css(mut self, name: impl Into<String>, css: impl Into<String>) -> Self {
        self.roles = self.roles.css(name, css);
        self
    }

    /// Set navigation timeout
    #[must_use]
    pub const fn load_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.load_timeout_ms = timeout_ms;
        self
    }

    /// Build the page object
    #[must_use]
    pub fn build(self) -> PageObject {
        PageObject {
            name: self.name,
            url: self.url,
            roles: self.roles.build(),
            load_timeout_ms: self.load_timeout_ms,
        }
    }
}
