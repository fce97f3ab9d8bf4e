//! apkrelay CLI entrypoint.
//!
//! Loads configuration, drives one release run through the pipeline, and
//! reports one line per publisher plus a final summary on stderr.

use apkrelay::RelayConfig;
use apkrelay_publisher::artefact::checksum::ChecksumManifestBuilder;
use apkrelay_publisher::artefact::download::HttpStore;
use apkrelay_publisher::artefact::resolver::{VariantResolver, list_candidates};
use apkrelay_publisher::cancel::{CancellationToken, install_interrupt_handler};
use apkrelay_publisher::cli::{Cli, Command, ManifestArgs, RunArgs};
use apkrelay_publisher::error::{RelayError, Result};
use apkrelay_publisher::output::{outcome_lines, summary_line, write_stderr_line};
use apkrelay_publisher::pipeline::{PipelineError, PipelineOrchestrator, configured_publishers};
use apkrelay_publisher::process::SystemCommandExecutor;
use clap::Parser;
use log::{LevelFilter, warn};
use std::io::Write;

fn main() {
    let cli = Cli::parse();
    init_logging(log_level(cli.verbosity, cli.quiet));
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run(cli: &Cli, stderr: &mut dyn Write) -> Result<()> {
    match &cli.command {
        Command::Run(args) => run_release(args, cli.quiet, stderr),
        Command::Manifest(args) => print_manifest(args, &mut std::io::stdout().lock()),
    }
}

/// Runs one release and reports its outcomes.
fn run_release(args: &RunArgs, quiet: bool, stderr: &mut dyn Write) -> Result<()> {
    let config = load_config(args)?;
    if config.dry_run && !quiet {
        write_stderr_line(stderr, "Dry run - nothing will be deleted or published");
    }

    let cancel = CancellationToken::new();
    if let Err(err) = install_interrupt_handler(&cancel) {
        warn!("interrupts will end the process without a clean stop: {err}");
    }

    let store = HttpStore::new(&config.store);
    let publishers = configured_publishers(&config, Box::new(SystemCommandExecutor))?;
    let report = PipelineOrchestrator::new(&config, &store, publishers, cancel)
        .quiet(quiet)
        .run(stderr)?;

    for omitted in &report.omitted {
        write_stderr_line(stderr, format!("Optional variant {omitted} omitted"));
    }
    write_stderr_line(stderr, "");
    for line in outcome_lines(&report.outcomes) {
        write_stderr_line(stderr, line);
    }
    write_stderr_line(stderr, summary_line(report.set.len(), &report.outcomes));

    let failed = report.outcomes.iter().filter(|o| !o.is_success()).count();
    if failed > 0 {
        return Err(RelayError::PublishFailed { failed });
    }
    Ok(())
}

/// Builds the effective configuration: file (or defaults), then
/// environment, then command-line overrides.
fn load_config(args: &RunArgs) -> Result<RelayConfig> {
    let base = match &args.config {
        Some(path) => RelayConfig::load(path)?,
        None => RelayConfig::default(),
    };
    let config = apply_overrides(base.with_process_env(), args);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(mut config: RelayConfig, args: &RunArgs) -> RelayConfig {
    if let Some(dir) = &args.working_dir {
        config.paths.working_dir.clone_from(dir);
    }
    if let Some(descriptor) = &args.descriptor {
        config.paths.descriptor = Some(descriptor.clone());
    }
    config.dry_run |= args.dry_run;
    config
}

/// Resolves an existing directory and prints its manifest to `stdout`.
fn print_manifest(args: &ManifestArgs, stdout: &mut dyn Write) -> Result<()> {
    let listing = list_candidates(&args.dir).map_err(PipelineError::from)?;
    let resolution = VariantResolver::new(args.extension.clone())
        .resolve(&listing)
        .map_err(PipelineError::from)?;
    let manifest = ChecksumManifestBuilder.build(&resolution.set)?;
    stdout
        .write_all(manifest.render().as_bytes())
        .map_err(|source| RelayError::WriteFailed { source })
}

fn log_level(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Warn;
    }
    match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// `RUST_LOG` still wins over the command-line level.
fn init_logging(level: LevelFilter) {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(level.as_str().to_ascii_lowercase()),
    )
    .format_timestamp(None)
    .init();
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            if let RelayError::Pipeline(PipelineError::Cancelled { stage }) = &err {
                write_stderr_line(
                    stderr,
                    format!("interrupted: stopped before {stage}; re-run to resume"),
                );
            } else {
                write_stderr_line(stderr, format!("error: {err}"));
            }
            err.exit_code()
        }
    }
}
