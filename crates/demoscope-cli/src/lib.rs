//! Demoscope CLI Library
//!
//! Command-line front end for running declarative demo-page suites.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)] // Error types are self-documenting

mod commands;
mod config;
mod error;
pub mod logging;
mod output;
mod runner;

pub use commands::{
    Cli, ColorArg, Commands, ConfigArgs, FormatArg, LogFormatArg, RunArgs, ValidateArgs,
};
pub use config::{CliConfig, ColorChoice, LogFormat, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{render_json, scenario_line, OutputFormat, ProgressReporter};
pub use runner::{
    apply_run_flags, effective_config, load_suites, run_suites, validate_suites, RunSummary,
};
