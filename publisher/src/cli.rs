//! CLI argument definitions for apkrelay.
//!
//! Kept apart from the entrypoint so the binary stays focused on
//! orchestration and the parser can be exercised directly in tests.

use camino::Utf8PathBuf;
use clap::{ArgAction, Parser, Subcommand};

/// Fetch, verify and publish nightly APK builds.
#[derive(Parser, Debug)]
#[command(name = "apkrelay")]
#[command(version, about)]
#[command(long_about = concat!(
    "Fetch, verify and publish nightly APK builds.\n\n",
    "apkrelay polls the build store until every required variant is available, ",
    "picks one authoritative artefact per variant (signed over unsigned), writes ",
    "a SHA256SUMS manifest, and hands the release to the configured publishers: ",
    "a git archive and a Telegram channel.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Publish the current nightly:\n",
    "    $ apkrelay run --config apkrelay.toml --descriptor commit.json\n\n",
    "  Rehearse without deleting or publishing anything:\n",
    "    $ apkrelay run --config apkrelay.toml --dry-run\n\n",
    "  Print checksums for a directory of APKs:\n",
    "    $ apkrelay manifest ./out\n\n",
    "Secrets are read from APKRELAY_TELEGRAM_TOKEN and APKRELAY_TELEGRAM_CHAT_ID.",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Increase log verbosity (repeatable).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Suppress progress output.
    #[arg(short, long, global = true, conflicts_with = "verbosity")]
    pub quiet: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch, resolve and publish one release.
    Run(RunArgs),

    /// Print the checksum manifest of a directory of artefacts.
    Manifest(ManifestArgs),
}

/// Arguments for the run command.
#[derive(Parser, Debug, Clone, Default, PartialEq, Eq)]
pub struct RunArgs {
    /// Configuration file [default: built-in defaults].
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,

    /// Directory artefacts are downloaded into.
    #[arg(short, long, value_name = "DIR")]
    pub working_dir: Option<Utf8PathBuf>,

    /// Commit descriptor used for release metadata.
    #[arg(short, long, value_name = "FILE")]
    pub descriptor: Option<Utf8PathBuf>,

    /// Fetch, resolve and checksum only; delete nothing and skip publishers.
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the manifest command.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
pub struct ManifestArgs {
    /// Directory holding the artefacts.
    #[arg(value_name = "DIR")]
    pub dir: Utf8PathBuf,

    /// Artefact file extension.
    #[arg(long, default_value = "apk")]
    pub extension: String,
}
