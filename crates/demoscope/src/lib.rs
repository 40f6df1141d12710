//! Demoscope: Browser Interaction Harness for Interactive Demo Pages
//!
//! Drives self-contained demo pages (sort visualizers, graph editors, form
//! wizards) through a real browser and checks what the user would see.
//! Tests address UI elements by semantic role, wait on observable state
//! instead of sleeping, answer native dialogs deterministically, and fail
//! whenever the page logs an error nobody declared.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    DEMOSCOPE Architecture                        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Suite YAML │    │ Session    │    │ Harness    │            │
//! │   │ or Rust    │───►│ actions    │───►│ Driver     │            │
//! │   │ test       │    │ observer   │    │ (chromium) │            │
//! │   └────────────┘    └─────┬──────┘    └─────┬──────┘            │
//! │                           │   events        │                   │
//! │                     ┌─────▼──────┐          │                   │
//! │                     │ diagnostics│◄─────────┘                   │
//! │                     │ dialogs    │                              │
//! │                     └────────────┘                              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use demoscope::{MockDriver, MockEffect, MockElement, PageObject, Session, WaitOptions};
//! use std::sync::Arc;
//!
//! # async fn demo() -> demoscope::HarnessResult<()> {
//! let driver = MockDriver::new();
//! driver.add_element(MockElement::new("button").matching("#go"));
//! driver.add_element(MockElement::new("span").matching("#status").text("idle"));
//! driver.on_click("#go", vec![MockEffect::set_text("#status", "done")]);
//!
//! let page = PageObject::builder("about:blank")
//!     .css("start", "#go")
//!     .css("status", "#status")
//!     .build();
//! let session = Session::start(Arc::new(driver), page).await?;
//! session.goto().await?;
//! session.actions().click("start").await?;
//! session
//!     .observe()
//!     .wait_for_text("status", "done", &WaitOptions::new())
//!     .await?;
//! session.finish().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

/// Input actions resolved through the locator registry
#[allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::missing_const_for_fn
)]
mod action;

/// Chromium backend (feature `browser`) and its page-side scripts
#[allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::doc_markdown
)]
pub mod browser;

mod config;
mod diagnostics;
mod dialog;
#[allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::missing_const_for_fn,
    clippy::doc_markdown
)]
mod driver;
mod harness;
#[allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::missing_const_for_fn,
    clippy::unnecessary_wraps,
    clippy::doc_markdown
)]
mod locator;
#[allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::cast_precision_loss
)]
mod observer;
mod page_object;
mod result;
mod wait;

/// Declarative YAML suites and their runner
#[allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::missing_const_for_fn,
    clippy::doc_markdown
)]
pub mod suite;

pub use action::{ActionDispatcher, DragTarget, DEFAULT_DRAG_STEPS};
#[cfg(feature = "browser")]
pub use browser::{Browser, CdpDriver};
pub use config::{
    BrowserConfig, HarnessConfig, CONFIG_FILE_NAME, ENV_CHROMIUM_PATH, ENV_HEADLESS,
    ENV_TIMEOUT_MS,
};
pub use diagnostics::{
    ConsoleSeverity, DiagnosticEntry, DiagnosticKind, DiagnosticRecord, ExpectedDefect,
    SourceLocation,
};
pub use dialog::{
    Dialog, DialogExpectation, DialogMediator, DialogResponse, DialogType, ExpectationState,
    HandledDialog,
};
pub use driver::{
    BoundingBox, DriverEvent, ElementState, EventSink, HarnessDriver, MockDriver, MockEffect,
    MockElement,
};
pub use harness::{Session, SessionReport};
pub use locator::{Locator, LocatorRegistry, LocatorRegistryBuilder, Point, Selector};
pub use observer::{is_non_decreasing, is_truthy, ElementSnapshot, StateObserver, UiSnapshot};
pub use page_object::{PageObject, PageObjectBuilder};
pub use result::{HarnessError, HarnessResult};
pub use suite::{
    DriverFactory, ExecutionOptions, ScenarioExecutor, ScenarioResult, Suite, SuiteResult,
    SuiteRunner,
};
pub use wait::{
    poll_until, WaitOptions, WaitResult, DEFAULT_POLL_INTERVAL_MS, DEFAULT_WAIT_TIMEOUT_MS,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::diagnostics::*;
    pub use super::dialog::*;
    pub use super::driver::*;
    pub use super::harness::*;
    pub use super::locator::*;
    pub use super::observer::*;
    pub use super::page_object::*;
    pub use super::result::*;
    pub use super::wait::*;
    pub use super::{ActionDispatcher, DragTarget, HarnessConfig};
}
