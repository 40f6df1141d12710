//! Diagnostic Collector
//!
//! Captures every console message and uncaught exception a page emits into a
//! per-session, append-only record. Nothing is filtered at collection time;
//! the record is queried and verified at teardown.
//!
//! A scenario may declare [`ExpectedDefect`]s for demos that ship with known
//! bugs. Verification then requires every declared defect to be observed at
//! least once and forbids any other error-level entry.

use crate::result::{HarnessError, HarnessResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Console message severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleSeverity {
    /// console.debug
    Debug,
    /// console.log
    Log,
    /// console.info
    Info,
    /// console.warn
    Warn,
    /// console.error, console.assert, uncaught exceptions
    Error,
}

impl fmt::Display for ConsoleSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Log => write!(f, "log"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl ConsoleSeverity {
    /// Map a console API call type (`log`, `warning`, `assert`, ...) to a severity
    #[must_use]
    pub fn from_api_type(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "error" | "assert" => Self::Error,
            "warn" | "warning" => Self::Warn,
            "info" => Self::Info,
            "debug" | "trace" => Self::Debug,
            _ => Self::Log,
        }
    }
}

/// What produced a diagnostic entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Page called the console API
    ConsoleMessage,
    /// Script threw and nothing caught it
    UncaughtException,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConsoleMessage => write!(f, "console"),
            Self::UncaughtException => write!(f, "exception"),
        }
    }
}

/// Script location of a diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Script URL
    pub url: String,
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.url, self.line, self.column)
    }
}

/// One captured console message or exception
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticEntry {
    /// Source of the entry
    pub kind: DiagnosticKind,
    /// Severity (exceptions are always `Error`)
    pub severity: ConsoleSeverity,
    /// Message text
    pub text: String,
    /// Script location, when the driver reports one
    pub location: Option<SourceLocation>,
}

impl DiagnosticEntry {
    /// Console message
    #[must_use]
    pub fn console(severity: ConsoleSeverity, text: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::ConsoleMessage,
            severity,
            text: text.into(),
            location: None,
        }
    }

    /// Uncaught exception
    #[must_use]
    pub fn exception(text: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::UncaughtException,
            severity: ConsoleSeverity::Error,
            text: text.into(),
            location: None,
        }
    }

    /// Set source location
    #[must_use]
    pub fn at(mut self, url: impl Into<String>, line: u32, column: u32) -> Self {
        self.location = Some(SourceLocation {
            url: url.into(),
            line,
            column,
        });
        self
    }

    /// Error-level entry
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == ConsoleSeverity::Error
    }
}

impl fmt::Display for DiagnosticEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {}] {}", self.kind, self.severity, self.text)?;
        if let Some(location) = &self.location {
            write!(f, " ({location})")?;
        }
        Ok(())
    }
}

/// A known defect the page is expected to report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedDefect {
    /// Restrict to one kind; `None` matches either
    #[serde(default)]
    pub kind: Option<DiagnosticKind>,
    /// Substring the entry text must contain
    pub contains: String,
}

impl ExpectedDefect {
    /// Expected uncaught exception containing `text`
    #[must_use]
    pub fn exception(text: impl Into<String>) -> Self {
        Self {
            kind: Some(DiagnosticKind::UncaughtException),
            contains: text.into(),
        }
    }

    /// Expected `console.error` containing `text`
    #[must_use]
    pub fn console_error(text: impl Into<String>) -> Self {
        Self {
            kind: Some(DiagnosticKind::ConsoleMessage),
            contains: text.into(),
        }
    }

    /// Expected error of any kind containing `text`
    #[must_use]
    pub fn any(text: impl Into<String>) -> Self {
        Self {
            kind: None,
            contains: text.into(),
        }
    }

    /// Whether `entry` is an occurrence of this defect
    #[must_use]
    pub fn matches(&self, entry: &DiagnosticEntry) -> bool {
        entry.is_error()
            && self.kind.map_or(true, |k| k == entry.kind)
            && entry.text.contains(&self.contains)
    }
}

impl fmt::Display for ExpectedDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "{kind} containing '{}'", self.contains),
            None => write!(f, "error containing '{}'", self.contains),
        }
    }
}

/// Append-only diagnostic record for one session
///
/// Cloning shares the record: the session's event pump appends while the
/// scenario reads.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticRecord {
    entries: Arc<Mutex<Vec<DiagnosticEntry>>>,
}

impl DiagnosticRecord {
    /// Create an empty record
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DiagnosticEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an entry
    pub fn push(&self, entry: DiagnosticEntry) {
        self.lock().push(entry);
    }

    /// Snapshot of all entries in arrival order
    #[must_use]
    pub fn entries(&self) -> Vec<DiagnosticEntry> {
        self.lock().clone()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing was captured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn filtered(&self, keep: impl Fn(&DiagnosticEntry) -> bool) -> Vec<DiagnosticEntry> {
        self.lock().iter().filter(|e| keep(e)).cloned().collect()
    }

    /// Error-level entries (console errors and exceptions)
    #[must_use]
    pub fn errors(&self) -> Vec<DiagnosticEntry> {
        self.filtered(DiagnosticEntry::is_error)
    }

    /// Uncaught exceptions
    #[must_use]
    pub fn exceptions(&self) -> Vec<DiagnosticEntry> {
        self.filtered(|e| e.kind == DiagnosticKind::UncaughtException)
    }

    /// Console messages at exactly `severity`
    #[must_use]
    pub fn console_at(&self, severity: ConsoleSeverity) -> Vec<DiagnosticEntry> {
        self.filtered(|e| e.kind == DiagnosticKind::ConsoleMessage && e.severity == severity)
    }

    /// Entries whose text matches `pattern`
    #[must_use]
    pub fn matching(&self, pattern: &Regex) -> Vec<DiagnosticEntry> {
        self.filtered(|e| pattern.is_match(&e.text))
    }

    /// Whether any error entry contains `substring`
    #[must_use]
    pub fn has_error_containing(&self, substring: &str) -> bool {
        self.lock()
            .iter()
            .any(|e| e.is_error() && e.text.contains(substring))
    }

    /// One entry per line
    #[must_use]
    pub fn render(&self) -> String {
        let entries = self.lock();
        if entries.is_empty() {
            return "(no diagnostics)".to_string();
        }
        entries
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Fail if any error-level entry was captured
    ///
    /// # Errors
    ///
    /// Returns `DiagnosticsNotClean` with the rendered record
    pub fn assert_clean(&self) -> HarnessResult<()> {
        self.verify(&[])
    }

    /// Verify against declared defects
    ///
    /// Passes when every expected defect matched at least one entry and no
    /// other error-level entry exists.
    ///
    /// # Errors
    ///
    /// Returns `DiagnosticsNotClean` with the rendered record
    pub fn verify(&self, expected: &[ExpectedDefect]) -> HarnessResult<()> {
        let errors = self.errors();
        let unexpected = errors
            .iter()
            .filter(|e| !expected.iter().any(|d| d.matches(e)))
            .count();
        let missing: Vec<&ExpectedDefect> = expected
            .iter()
            .filter(|d| !errors.iter().any(|e| d.matches(e)))
            .collect();

        let mut problems = Vec::new();
        if unexpected > 0 {
            problems.push(format!("{unexpected} unexpected error(s)"));
        }
        for defect in missing {
            problems.push(format!("expected {defect} was not observed"));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(HarnessError::DiagnosticsNotClean {
                summary: problems.join("; "),
                record: self.render(),
            })
        }
    }
}
