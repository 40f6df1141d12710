//! Target Locator Registry: semantic roles mapped to selectors.
//!
//! Scenarios never hardcode selector strings. A page object registers each
//! UI role once; scenarios address elements by role and the registry hands
//! back a [`Locator`] whose resolution is deferred to the driver.
//!
//! # Design Philosophy
//!
//! - **Deferred resolution**: `locate` performs no I/O; every read or action
//!   re-queries the live DOM, so there is no stale element caching
//! - **Immutable map**: the registry is frozen once built
//! - **Selector prefixes**: `css=`, `testid=`, `text=`, `xpath=` (bare strings are CSS)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::result::{HarnessError, HarnessResult};

/// A point in page coordinates (CSS pixels)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
}

impl Point {
    /// Create a new point
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Linear interpolation towards `other` (`t` in `0.0..=1.0`)
    #[must_use]
    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }
}

/// Separator between the CSS part and the text filter of a combined selector
const TEXT_FILTER: &str = " >> text=";

/// Selector type for locating elements
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Selector {
    /// CSS selector (e.g., "button.primary")
    Css(String),
    /// XPath selector
    XPath(String),
    /// Text content selector
    Text(String),
    /// Test ID selector (data-testid attribute)
    TestId(String),
    /// Combined selector with text filter
    CssWithText {
        /// Base CSS selector
        css: String,
        /// Text content to match
        text: String,
    },
}

impl Selector {
    /// Create a CSS selector
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// Create a test ID selector
    #[must_use]
    pub fn test_id(id: impl Into<String>) -> Self {
        Self::TestId(id.into())
    }

    /// Create a text selector
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Create an XPath selector
    #[must_use]
    pub fn xpath(path: impl Into<String>) -> Self {
        Self::XPath(path.into())
    }

    /// Narrow a CSS selector to elements containing `text`
    ///
    /// Non-CSS selectors cannot be combined and are returned unchanged.
    #[must_use]
    pub fn with_text(self, text: impl Into<String>) -> Self {
        match self {
            Self::Css(css) => Self::CssWithText {
                css,
                text: text.into(),
            },
            other => other,
        }
    }

    /// Parse a prefixed selector string (`css=`, `testid=`, `text=`, `xpath=`)
    ///
    /// `css=button >> text=Start` is a CSS selector narrowed by text.
    ///
    /// # Errors
    ///
    /// Returns error for an empty selector body
    pub fn parse(raw: &str) -> HarnessResult<Self> {
        let raw = raw.trim();
        let selector = if let Some(rest) = raw.strip_prefix("css=") {
            match rest.split_once(TEXT_FILTER) {
                Some((css, text)) => Self::CssWithText {
                    css: css.to_string(),
                    text: text.to_string(),
                },
                None => Self::Css(rest.to_string()),
            }
        } else if let Some(rest) = raw.strip_prefix("testid=") {
            Self::TestId(rest.to_string())
        } else if let Some(rest) = raw.strip_prefix("text=") {
            Self::Text(rest.to_string())
        } else if let Some(rest) = raw.strip_prefix("xpath=") {
            Self::XPath(rest.to_string())
        } else {
            Self::Css(raw.to_string())
        };

        let body = match &selector {
            Self::Css(s) | Self::XPath(s) | Self::Text(s) | Self::TestId(s) => s.as_str(),
            Self::CssWithText { css, .. } => css.as_str(),
        };
        if body.trim().is_empty() {
            return Err(HarnessError::invalid_suite(format!(
                "empty selector '{raw}'"
            )));
        }
        Ok(selector)
    }

    /// Page-side expression evaluating to an array of all matching elements
    #[must_use]
    pub fn to_all_query(&self) -> String {
        match self {
            Self::Css(s) => format!("Array.from(document.querySelectorAll({}))", js_string(s)),
            Self::XPath(s) => format!(
                "(() => {{ const r = document.evaluate({}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null); \
                 const out = []; for (let i = 0; i < r.snapshotLength; i++) out.push(r.snapshotItem(i)); return out; }})()",
                js_string(s)
            ),
            Self::Text(t) => format!(
                "Array.from(document.body.querySelectorAll('*')).filter(el => el.children.length === 0 && el.textContent.includes({}))",
                js_string(t)
            ),
            Self::TestId(id) => format!(
                "Array.from(document.querySelectorAll('[data-testid=' + JSON.stringify({}) + ']'))",
                js_string(id)
            ),
            Self::CssWithText { css, text } => format!(
                "Array.from(document.querySelectorAll({})).filter(el => el.textContent.includes({}))",
                js_string(css),
                js_string(text)
            ),
        }
    }

    /// Page-side expression evaluating to the first matching element (or null)
    #[must_use]
    pub fn to_query(&self) -> String {
        match self {
            Self::Css(s) => format!("document.querySelector({})", js_string(s)),
            other => format!("({}[0] || null)", other.to_all_query()),
        }
    }

    /// Page-side expression counting matches
    #[must_use]
    pub fn to_count_query(&self) -> String {
        match self {
            Self::Css(s) => format!("document.querySelectorAll({}).length", js_string(s)),
            other => format!("{}.length", other.to_all_query()),
        }
    }
}

/// JavaScript string literal for `value`
pub(crate) fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(s) => write!(f, "css={s}"),
            Self::XPath(s) => write!(f, "xpath={s}"),
            Self::Text(s) => write!(f, "text={s}"),
            Self::TestId(s) => write!(f, "testid={s}"),
            Self::CssWithText { css, text } => write!(f, "css={css}{TEXT_FILTER}{text}"),
        }
    }
}

impl TryFrom<String> for Selector {
    type Error = HarnessError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Selector> for String {
    fn from(selector: Selector) -> Self {
        match selector {
            Selector::Css(s) => s,
            other => other.to_string(),
        }
    }
}

/// A role bound to its selector. Resolution happens at use time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    role: String,
    selector: Selector,
}

impl Locator {
    /// Create a locator for a role
    #[must_use]
    pub fn new(role: impl Into<String>, selector: Selector) -> Self {
        Self {
            role: role.into(),
            selector,
        }
    }

    /// Role name
    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Selector
    #[must_use]
    pub const fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Error for a selector that matched nothing
    #[must_use]
    pub fn not_found(&self) -> HarnessError {
        HarnessError::ElementNotFound {
            role: self.role.clone(),
            selector: self.selector.to_string(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.role, self.selector)
    }
}

/// Immutable role → selector map owned by one page object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocatorRegistry {
    roles: BTreeMap<String, Selector>,
}

impl LocatorRegistry {
    /// Start building a registry
    #[must_use]
    pub fn builder() -> LocatorRegistryBuilder {
        LocatorRegistryBuilder::default()
    }

    /// Resolve a role to a locator
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::UnknownRole`] if the role was never registered
    pub fn locate(&self, role: &str) -> HarnessResult<Locator> {
        self.roles
            .get(role)
            .map(|selector| Locator::new(role, selector.clone()))
            .ok_or_else(|| HarnessError::UnknownRole {
                role: role.to_string(),
                registered: self.role_names().join(", "),
            })
    }

    /// Whether a role is registered
    #[must_use]
    pub fn contains(&self, role: &str) -> bool {
        self.roles.contains_key(role)
    }

    /// All registered role names, sorted
    #[must_use]
    pub fn role_names(&self) -> Vec<&str> {
        self.roles.keys().map(String::as_str).collect()
    }

    /// Number of registered roles
    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Whether no roles are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Builder for [`LocatorRegistry`]
#[derive(Debug, Clone, Default)]
pub struct LocatorRegistryBuilder {
    roles: BTreeMap<String, Selector>,
}

impl LocatorRegistryBuilder {
    /// Register a role. Re-registering a role replaces its selector.
    #[must_use]
    pub fn role(mut self, name: impl Into<String>, selector: Selector) -> Self {
        let _ = self.roles.insert(name.into(), selector);
        self
    }

    /// Register a role with a CSS selector
    #[must_use]
    pub fn css(self, name: impl Into<String>, css: impl Into<String>) -> Self {
        self.role(name, Selector::css(css))
    }

    /// Freeze the registry
    #[must_use]
    pub fn build(self) -> LocatorRegistry {
        LocatorRegistry { roles: self.roles }
    }
}
