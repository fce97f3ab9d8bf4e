//! Release pipeline orchestration.
//!
//! A run fetches every expected variant in parallel, resolves the
//! authoritative set, writes the checksum manifest, reads release metadata,
//! and fans the result out to every configured publisher:
//!
//! ```text
//! fetch (scoped threads) → resolve → prune superseded → manifest
//!     → metadata (best effort) → publish (scoped threads) → RunReport
//! ```
//!
//! A required variant that cannot be fetched aborts the run before any
//! publisher runs. Publisher failures and panics are isolated: every
//! publisher contributes exactly one outcome.

use crate::artefact::checksum::{ChecksumError, ChecksumManifestBuilder, Manifest};
use crate::artefact::download::ArtefactStore;
use crate::artefact::fetcher::{ArtifactFetcher, FetchError};
use crate::artefact::probe::BodyProbe;
use crate::artefact::reference::ArtifactRef;
use crate::artefact::resolver::{ArtifactSet, ResolveError, VariantResolver, list_candidates};
use crate::artefact::retry::RetryPolicy;
use crate::cancel::CancellationToken;
use crate::error::RelayError;
use crate::output::write_stderr_line;
use crate::process::CommandExecutor;
use crate::publish::chat::ChatPublisher;
use crate::publish::git::GitArchivePublisher;
use crate::publish::ledger::{LedgeredPublisher, PublishLedger};
use crate::publish::telegram::TelegramChannel;
use crate::publish::{PublishOutcome, PublishRequest, Publisher};
use crate::release::changelog::latest_changelog;
use crate::release::{ReleaseMetadataReader, ReleaseRecord};
use crate::workdir::{WorkdirError, WorkdirLock};
use apkrelay::{LogicalVariant, RelayConfig};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::thread;
use thiserror::Error;

/// Fatal pipeline errors. Publisher failures are not among them; they are
/// reported as outcomes.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The working directory could not be claimed.
    #[error(transparent)]
    Workdir(#[from] WorkdirError),

    /// A required variant could not be fetched.
    #[error("required variant {variant} unavailable: {source}")]
    Fetch {
        /// The variant that failed.
        variant: LogicalVariant,
        /// Why the fetch failed.
        #[source]
        source: FetchError,
    },

    /// A fetch worker panicked.
    #[error("fetch of {variant} panicked")]
    FetchPanicked {
        /// The variant whose worker panicked.
        variant: LogicalVariant,
    },

    /// The working directory held an ambiguous artefact set.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// A required variant was absent after resolution.
    #[error("required variant {variant} is missing from the working directory")]
    MissingVariant {
        /// The missing variant.
        variant: LogicalVariant,
    },

    /// A superseded artefact could not be removed.
    #[error("cannot remove superseded artefact {path}: {source}")]
    Prune {
        /// The file that could not be removed.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Checksums could not be computed or written.
    #[error(transparent)]
    Checksum(#[from] ChecksumError),

    /// Cancellation was requested.
    #[error("run cancelled before {stage}")]
    Cancelled {
        /// The stage that did not start.
        stage: &'static str,
    },
}

/// The result of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// One outcome per publisher, in publisher order.
    pub outcomes: Vec<PublishOutcome>,
    /// Checksums of the published set.
    pub manifest: Manifest,
    /// Where the manifest was written.
    pub manifest_path: Utf8PathBuf,
    /// The authoritative set.
    pub set: ArtifactSet,
    /// Release metadata, when it could be read.
    pub release: Option<ReleaseRecord>,
    /// Optional variants left out of this release.
    pub omitted: Vec<LogicalVariant>,
}

impl RunReport {
    /// Whether every outcome was published or skipped.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.outcomes.iter().all(PublishOutcome::is_success)
    }
}

/// Drives one release run.
pub struct PipelineOrchestrator<'a> {
    config: &'a RelayConfig,
    store: &'a dyn ArtefactStore,
    publishers: Vec<Box<dyn Publisher>>,
    cancel: CancellationToken,
    quiet: bool,
}

impl<'a> PipelineOrchestrator<'a> {
    /// Create an orchestrator. `config` is expected to be validated.
    #[must_use]
    pub fn new(
        config: &'a RelayConfig,
        store: &'a dyn ArtefactStore,
        publishers: Vec<Box<dyn Publisher>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            store,
            publishers,
            cancel,
            quiet: false,
        }
    }

    /// Suppress progress lines.
    #[must_use]
    pub const fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Execute the run, writing progress lines to `stderr`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] when a fatal stage fails or the run is
    /// cancelled. Publisher failures are reported in the [`RunReport`].
    pub fn run(&self, stderr: &mut dyn Write) -> Result<RunReport, PipelineError> {
        let lock = WorkdirLock::acquire(&self.config.paths.working_dir)?;
        let dir = lock.root();

        self.checkpoint("fetch")?;
        let expected = self.config.expected_variants();
        self.progress(
            stderr,
            format!("Fetching {} variant(s) into {dir}...", expected.len()),
        );
        let (fetched, omitted) = self.fetch_all(dir, &expected)?;

        self.checkpoint("resolve")?;
        let mut set = self.resolve(dir, &fetched, &omitted)?;
        for (variant, artifact) in &mut set {
            if let Some(url) = fetched.get(variant).and_then(|f| remote_url_for(f, artifact)) {
                *artifact = artifact.clone().with_remote_url(url);
            }
        }

        self.checkpoint("checksum")?;
        let manifest = ChecksumManifestBuilder.build(&set)?;
        let manifest_path = manifest.write_to(dir, &self.config.paths.manifest_name)?;
        self.progress(
            stderr,
            format!("Wrote {} checksum(s) to {manifest_path}", manifest.len()),
        );

        let release = self.read_release();
        let changelog = self.read_changelog();

        self.checkpoint("publish")?;
        let request = PublishRequest {
            set: &set,
            manifest: &manifest,
            manifest_path: &manifest_path,
            release: release.as_ref(),
            changelog: changelog.as_deref(),
        };
        let outcomes = if self.config.dry_run {
            self.progress(stderr, "Dry run: publishing skipped");
            self.publishers
                .iter()
                .map(|publisher| PublishOutcome::skipped(publisher.target(), "dry run"))
                .collect()
        } else {
            self.progress(
                stderr,
                format!("Publishing to {} target(s)...", self.publishers.len()),
            );
            publish_all(&self.publishers, &request)
        };

        Ok(RunReport {
            outcomes,
            manifest,
            manifest_path,
            set,
            release,
            omitted,
        })
    }

    fn checkpoint(&self, stage: &'static str) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled { stage });
        }
        Ok(())
    }

    fn progress(&self, stderr: &mut dyn Write, message: impl std::fmt::Display) {
        if !self.quiet {
            write_stderr_line(stderr, message);
        }
    }

    /// Fetch every expected variant in parallel.
    ///
    /// A required variant that fails for good raises a run-local token so
    /// that its siblings stop polling instead of holding the scope open.
    fn fetch_all(
        &self,
        dir: &Utf8Path,
        expected: &[LogicalVariant],
    ) -> Result<(BTreeMap<LogicalVariant, ArtifactRef>, Vec<LogicalVariant>), PipelineError> {
        let artifacts = &self.config.artifacts;
        let abort = self.cancel.child();
        let fetcher = ArtifactFetcher::new(
            self.store,
            BodyProbe::from_config(&self.config.store),
            artifacts.extension.clone(),
            abort.clone(),
        );
        let required_policy = RetryPolicy::required(&self.config.retry);
        let optional_policy = RetryPolicy::optional(&self.config.retry);

        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = expected
                .iter()
                .map(|&variant| {
                    let required = artifacts.required.contains(&variant);
                    let policy = if required {
                        required_policy
                    } else {
                        optional_policy
                    };
                    let name = artifacts.file_name(variant);
                    let fetcher = &fetcher;
                    let abort = &abort;
                    let handle = scope.spawn(move || {
                        let _guard = required.then_some(AbortOnPanic(abort));
                        let result = fetcher.fetch(&name, dir, &policy);
                        if required && is_fatal(&result) {
                            abort.cancel();
                        }
                        result
                    });
                    (variant, required, handle)
                })
                .collect();
            handles
                .into_iter()
                .map(|(variant, required, handle)| (variant, required, handle.join()))
                .collect()
        });

        let mut fetched = BTreeMap::new();
        let mut omitted = Vec::new();
        let mut fatal = None;
        let mut cancelled = false;
        for (variant, required, joined) in results {
            match joined {
                Ok(Ok(artifact)) => {
                    fetched.insert(variant, artifact);
                }
                Ok(Err(FetchError::Cancelled { .. })) => cancelled = true,
                Ok(Err(source)) if required => {
                    fatal.get_or_insert(PipelineError::Fetch { variant, source });
                }
                Ok(Err(source)) => {
                    warn!("optional variant {variant} left out: {source}");
                    omitted.push(variant);
                }
                Err(_) if required => {
                    fatal.get_or_insert(PipelineError::FetchPanicked { variant });
                }
                Err(_) => {
                    warn!("optional variant {variant} left out: fetch panicked");
                    omitted.push(variant);
                }
            }
        }
        if let Some(err) = fatal {
            return Err(err);
        }
        if cancelled {
            return Err(PipelineError::Cancelled { stage: "fetch" });
        }
        Ok((fetched, omitted))
    }

    fn resolve(
        &self,
        dir: &Utf8Path,
        fetched: &BTreeMap<LogicalVariant, ArtifactRef>,
        omitted: &[LogicalVariant],
    ) -> Result<ArtifactSet, PipelineError> {
        let listing = list_candidates(dir)?;
        let resolution = VariantResolver::new(self.config.artifacts.extension.clone())
            .resolve(&listing)?;

        for path in &resolution.superseded {
            if self.config.dry_run {
                info!("dry run: would remove superseded {path}");
                continue;
            }
            std::fs::remove_file(path).map_err(|source| PipelineError::Prune {
                path: path.clone(),
                source,
            })?;
            debug!("removed superseded {path}");
        }

        let expected = self.config.expected_variants();
        let mut set = resolution.set;
        set.retain(|variant, artifact| {
            let keep = expected.contains(variant) && !omitted.contains(variant);
            if !keep {
                debug!("ignoring {} from an earlier run", artifact.local_path());
            }
            keep
        });
        for variant in &self.config.artifacts.required {
            if !set.contains_key(variant) {
                return Err(PipelineError::MissingVariant { variant: *variant });
            }
        }
        info!(
            "resolved {} artefact(s) from {} fetched",
            set.len(),
            fetched.len()
        );
        Ok(set)
    }

    fn read_release(&self) -> Option<ReleaseRecord> {
        let Some(path) = &self.config.paths.descriptor else {
            warn!("no release descriptor configured; publishing without metadata");
            return None;
        };
        match ReleaseMetadataReader.read(path) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!("release metadata unavailable: {err}");
                None
            }
        }
    }

    fn read_changelog(&self) -> Option<String> {
        let dir = self.config.paths.changelog_dir.as_ref()?;
        match latest_changelog(dir) {
            Ok(changelog) => changelog,
            Err(err) => {
                warn!("changelog unavailable: {err}");
                None
            }
        }
    }
}

/// Raises the token when a required fetch thread unwinds.
struct AbortOnPanic<'a>(&'a CancellationToken);

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.cancel();
        }
    }
}

fn is_fatal(result: &Result<ArtifactRef, FetchError>) -> bool {
    matches!(result, Err(err) if !matches!(err, FetchError::Cancelled { .. }))
}

fn remote_url_for(fetched: &ArtifactRef, resolved: &ArtifactRef) -> Option<String> {
    (fetched.local_path() == resolved.local_path())
        .then(|| fetched.remote_url().map(str::to_owned))
        .flatten()
}

/// Run every publisher on its own scoped thread and collect one outcome per
/// publisher, in order.
#[must_use]
pub fn publish_all(
    publishers: &[Box<dyn Publisher>],
    request: &PublishRequest<'_>,
) -> Vec<PublishOutcome> {
    thread::scope(|scope| {
        let handles: Vec<_> = publishers
            .iter()
            .map(|publisher| {
                let target = publisher.target();
                (target, scope.spawn(move || publisher.publish(request)))
            })
            .collect();
        handles
            .into_iter()
            .map(|(target, handle)| match handle.join() {
                Ok(result) => PublishOutcome::from_result(target, result),
                Err(_) => PublishOutcome::failed(target, "publisher panicked"),
            })
            .collect()
    })
}

/// Build the publishers enabled by `config`.
///
/// The git archive publisher is added when an `[archive]` section exists,
/// the chat publisher when a `[chat]` section exists. With a ledger path
/// configured, both are wrapped in a [`LedgeredPublisher`].
///
/// # Errors
///
/// Returns [`RelayError::PublisherSetup`] when the chat channel lacks
/// credentials and [`RelayError::Ledger`] when the ledger cannot be read.
pub fn configured_publishers(
    config: &RelayConfig,
    executor: Box<dyn CommandExecutor>,
) -> Result<Vec<Box<dyn Publisher>>, RelayError> {
    let ledger = load_ledger(config.paths.ledger.as_deref())?;

    let mut publishers: Vec<Box<dyn Publisher>> = Vec::new();
    if let Some(archive) = &config.archive {
        let git = GitArchivePublisher::new(
            executor,
            archive.clone(),
            config.identity.clone(),
            config.artifacts.extension.clone(),
        );
        publishers.push(with_ledger(git, ledger.as_ref()));
    }
    if let Some(chat) = &config.chat {
        let channel = TelegramChannel::new(chat)?;
        let publisher = ChatPublisher::new(Box::new(channel), chat);
        publishers.push(with_ledger(publisher, ledger.as_ref()));
    }
    Ok(publishers)
}

fn load_ledger(path: Option<&Utf8Path>) -> Result<Option<Arc<PublishLedger>>, RelayError> {
    let Some(path) = path else {
        return Ok(None);
    };
    let ledger = PublishLedger::load(path)?;
    if ledger.recovered_from_corrupt_file() {
        warn!("publish ledger {path} was unreadable and has been reset");
    }
    Ok(Some(Arc::new(ledger)))
}

fn with_ledger<P: Publisher + 'static>(
    publisher: P,
    ledger: Option<&Arc<PublishLedger>>,
) -> Box<dyn Publisher> {
    if let Some(ledger) = ledger {
        return Box::new(LedgeredPublisher::new(publisher, Arc::clone(ledger)));
    }
    Box::new(publisher)
}
