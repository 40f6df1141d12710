//! Demoscope CLI: run declarative suites against interactive demo pages
//!
//! ## Usage
//!
//! ```bash
//! demoscope run demos/sort-visualizer.yaml          # Run a suite headless
//! demoscope run suites/*.yaml -j 4 --format json    # Parallel, JSON results
//! demoscope validate suites/*.yaml                  # Check without a browser
//! demoscope config                                  # Show effective settings
//! ```

use clap::Parser;
use demoscope_cli::{
    logging, render_json, run_suites, validate_suites, Cli, CliConfig, CliResult, Commands,
    ConfigArgs, OutputFormat, ProgressReporter, RunArgs, Verbosity,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let config = build_config(&cli);
    logging::init_tracing(&config);

    match cli.command {
        Commands::Run(args) => run_command(&config, &args),
        Commands::Validate(args) => {
            let reporter = reporter_for(&config);
            validate_suites(&args.suites, &reporter)
        }
        Commands::Config(args) => config_command(&args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(cli.color.into())
        .with_log_format(cli.log_format.into())
}

fn reporter_for(config: &CliConfig) -> ProgressReporter {
    ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet())
}

fn run_command(config: &CliConfig, args: &RunArgs) -> CliResult<()> {
    let format: OutputFormat = args.format.into();
    // JSON goes to stdout whole; keep stderr to failures only
    let mut reporter = match format {
        OutputFormat::Text => reporter_for(config),
        OutputFormat::Json => ProgressReporter::new(false, true),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let summary = runtime.block_on(run_suites(args, &mut reporter))?;

    match format {
        OutputFormat::Text => {
            reporter.failure_details(&summary);
            reporter.summary(summary.passed(), summary.failed(), summary.duration);
        }
        OutputFormat::Json => println!("{}", render_json(&summary)?),
    }
    summary.into_result().map(|_| ())
}

fn config_command(args: &ConfigArgs) -> CliResult<()> {
    let config = demoscope_cli::effective_config(args.config.as_deref(), None)?;
    print!("{}", config.to_yaml()?);
    Ok(())
}
