//! CLI command definitions using clap

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Demoscope: run declarative browser suites against interactive demo pages
#[derive(Parser, Debug)]
#[command(name = "demoscope")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (only failures are printed)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Log line format on stderr
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormatArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run suite files in a browser
    Run(RunArgs),

    /// Check suite files without launching a browser
    Validate(ValidateArgs),

    /// Print the effective configuration
    Config(ConfigArgs),
}

/// Arguments for `run`
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Suite files to run
    #[arg(required = true)]
    pub suites: Vec<PathBuf>,

    /// Configuration file (default: ./demoscope.yaml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Only run scenarios whose name contains this text
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Run the browser headless
    #[arg(long, conflicts_with = "headed")]
    pub headless: bool,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Chromium executable
    #[arg(long)]
    pub chromium_path: Option<String>,

    /// Disable the Chromium sandbox (containers and CI)
    #[arg(long)]
    pub no_sandbox: bool,

    /// Default wait timeout in milliseconds
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Scenarios run concurrently
    #[arg(short = 'j', long)]
    pub parallel: Option<usize>,

    /// Result format on stdout
    #[arg(long, default_value = "text")]
    pub format: FormatArg,
}

/// Arguments for `validate`
#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// Suite files to check
    #[arg(required = true)]
    pub suites: Vec<PathBuf>,
}

/// Arguments for `config`
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Configuration file (default: ./demoscope.yaml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Color argument
#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

/// Log format argument
#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum LogFormatArg {
    /// Human-readable lines
    #[default]
    Text,
    /// JSON lines
    Json,
}

impl From<LogFormatArg> for crate::config::LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => Self::Text,
            LogFormatArg::Json => Self::Json,
        }
    }
}

/// Result format argument
#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum FormatArg {
    /// Progress and a summary
    #[default]
    Text,
    /// One JSON document with every result
    Json,
}

impl From<FormatArg> for crate::output::OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => Self::Text,
            FormatArg::Json => Self::Json,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    mod cli_tests {
        use super::*;

        #[test]
        fn test_parse_run_command() {
            let cli = Cli::parse_from(["demoscope", "run", "sort.yaml"]);
            if let Commands::Run(args) = cli.command {
                assert_eq!(args.suites, vec![PathBuf::from("sort.yaml")]);
                assert!(!args.headless);
                assert!(args.parallel.is_none());
            } else {
                panic!("expected Run command");
            }
        }

        #[test]
        fn test_parse_run_options() {
            let cli = Cli::parse_from([
                "demoscope",
                "run",
                "a.yaml",
                "b.yaml",
                "--headed",
                "--no-sandbox",
                "-j",
                "4",
                "--timeout",
                "2500",
                "--filter",
                "dialog",
                "--format",
                "json",
            ]);
            if let Commands::Run(args) = cli.command {
                assert_eq!(args.suites.len(), 2);
                assert!(args.headed);
                assert!(args.no_sandbox);
                assert_eq!(args.parallel, Some(4));
                assert_eq!(args.timeout, Some(2500));
                assert_eq!(args.filter.as_deref(), Some("dialog"));
                assert!(matches!(args.format, FormatArg::Json));
            } else {
                panic!("expected Run command");
            }
        }

        #[test]
        fn test_headless_conflicts_with_headed() {
            let result =
                Cli::try_parse_from(["demoscope", "run", "a.yaml", "--headless", "--headed"]);
            assert!(result.is_err());
        }

        #[test]
        fn test_run_requires_suite() {
            assert!(Cli::try_parse_from(["demoscope", "run"]).is_err());
        }

        #[test]
        fn test_parse_validate_command() {
            let cli = Cli::parse_from(["demoscope", "validate", "x.yaml"]);
            assert!(matches!(cli.command, Commands::Validate(_)));
        }

        #[test]
        fn test_global_flags() {
            let cli = Cli::parse_from(["demoscope", "-vv", "--color", "never", "config"]);
            assert_eq!(cli.verbose, 2);
            assert!(matches!(cli.color, ColorArg::Never));
            assert!(matches!(cli.command, Commands::Config(_)));
        }

        #[test]
        fn test_log_format_flag() {
            let cli = Cli::parse_from(["demoscope", "--log-format", "json", "config"]);
            assert!(matches!(cli.log_format, LogFormatArg::Json));
        }
    }
}
