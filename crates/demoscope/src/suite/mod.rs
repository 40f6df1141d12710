//! Declarative Suites
//!
//! YAML-driven scenarios for demo pages: a page object, then scenarios made
//! of steps. Each scenario runs on its own fresh page and is verified against
//! its diagnostic record at teardown.
//!
//! # Example
//!
//! ```yaml
//! version: "1.0"
//! name: "sort visualizer"
//! page:
//!   url: "sort-visualizer/index.html"
//!   roles:
//!     start: "#startBtn"
//!     speed: "#speedControl"
//!     bars: ".bar"
//! scenarios:
//!   - name: "sorts and marks every bar"
//!     steps:
//!       - type: select
//!         role: speed
//!         value: "50"
//!       - type: click
//!         role: start
//!       - type: wait_for
//!         role: bars
//!         condition:
//!           all_have_class: sorted
//!       - type: assert_sorted
//!         role: bars
//! ```

mod executor;
mod runner;
mod schema;

pub use executor::{ExecutionOptions, ScenarioExecutor};
pub use runner::{DriverFactory, ScenarioCallback, ScenarioResult, SuiteResult, SuiteRunner};
pub use schema::{Condition, Scenario, Step, Suite, SUITE_VERSION};
