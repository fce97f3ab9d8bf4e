//! Git archive publisher.
//!
//! Mirrors the release into a subdirectory of an existing working tree and
//! pushes it. Only the canonical repository publishes; forks running the
//! same pipeline skip the channel.
//!
//! The push runs even when there is nothing new to commit, so a commit left
//! behind by an earlier run whose push failed still reaches the remote. The
//! archive is reported as already up to date only when git says so.

use super::{Delivery, PublishError, PublishRequest, PublishTarget, Publisher};
use crate::artefact::reference::ArtifactRef;
use crate::process::{CommandError, CommandExecutor};
use apkrelay::{ArchiveConfig, IdentityConfig};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info};
use std::collections::BTreeSet;
use std::process::Output;

/// Fragments of `git push` error output that indicate rejected credentials.
const AUTH_MARKERS: [&str; 5] = [
    "authentication failed",
    "permission denied",
    "could not read username",
    "invalid username or password",
    "the requested url returned error: 403",
];

/// Fragments of `git push` error output that indicate the remote could not
/// be reached.
const NETWORK_MARKERS: [&str; 8] = [
    "could not read from remote repository",
    "could not resolve host",
    "connection timed out",
    "connection refused",
    "operation timed out",
    "network is unreachable",
    "the remote end hung up unexpectedly",
    "unable to access",
];

/// What `git push` prints when the remote already has every commit.
const UP_TO_DATE: &str = "everything up-to-date";

/// Publishes artefacts by committing them to a git working tree.
pub struct GitArchivePublisher {
    executor: Box<dyn CommandExecutor>,
    archive: ArchiveConfig,
    identity: IdentityConfig,
    extension: String,
}

impl GitArchivePublisher {
    /// Create a publisher.
    ///
    /// Files in the archive directory with the artefact `extension` that are
    /// not part of a release are treated as stale and removed.
    #[must_use]
    pub fn new(
        executor: Box<dyn CommandExecutor>,
        archive: ArchiveConfig,
        identity: IdentityConfig,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            archive,
            identity,
            extension: extension.into(),
        }
    }

    fn archive_dir(&self) -> Utf8PathBuf {
        self.archive.worktree.join(&self.archive.subdirectory)
    }

    fn mirror(&self, request: &PublishRequest<'_>) -> Result<usize, PublishError> {
        let dir = self.archive_dir();
        std::fs::create_dir_all(&dir).map_err(io_error(&dir))?;

        let keep: BTreeSet<&str> = request.set.values().map(ArtifactRef::file_name).collect();
        let mut removed = 0;
        for entry in dir.read_dir_utf8().map_err(io_error(&dir))? {
            let entry = entry.map_err(io_error(&dir))?;
            let name = entry.file_name();
            if self.is_artefact(name) && !keep.contains(name) {
                std::fs::remove_file(entry.path()).map_err(io_error(entry.path()))?;
                debug!("git: removed stale {name}");
                removed += 1;
            }
        }

        for artifact in request.set.values() {
            let target = dir.join(artifact.file_name());
            std::fs::copy(artifact.local_path(), &target).map_err(io_error(&target))?;
        }
        if let Some(manifest_name) = request.manifest_path.file_name() {
            let target = dir.join(manifest_name);
            std::fs::copy(request.manifest_path, &target).map_err(io_error(&target))?;
        }
        Ok(removed)
    }

    fn is_artefact(&self, name: &str) -> bool {
        Utf8Path::new(name)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension))
    }

    fn git(&self, operation: &'static str, args: &[&str]) -> Result<Output, PublishError> {
        let args: Vec<String> = args.iter().map(|arg| (*arg).to_owned()).collect();
        let output = self
            .executor
            .run(
                "git",
                &args,
                &self.archive.worktree,
                self.archive.git_timeout(),
            )
            .map_err(|err| match err {
                CommandError::TimedOut { .. } if operation == "push" => {
                    PublishError::NetworkFailure {
                        reason: err.to_string(),
                    }
                }
                _ => PublishError::Git {
                    operation,
                    message: err.to_string(),
                },
            })?;
        if output.status.success() {
            return Ok(output);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        if operation == "push" {
            return Err(classify_push_failure(stderr));
        }
        Err(PublishError::Git {
            operation,
            message: stderr,
        })
    }

    fn push(&self) -> Result<Output, PublishError> {
        let mut push = vec!["push", self.archive.remote.as_str()];
        if let Some(branch) = &self.archive.branch {
            push.push(branch.as_str());
        }
        self.git("push", &push)
    }
}

impl Publisher for GitArchivePublisher {
    fn target(&self) -> PublishTarget {
        PublishTarget::Git
    }

    fn publish(&self, request: &PublishRequest<'_>) -> Result<Delivery, PublishError> {
        if !self.identity.is_canonical() {
            let current = self.identity.current.as_deref().unwrap_or("unknown");
            return Ok(Delivery::skipped(format!(
                "repository {current} is not {}",
                self.identity.canonical
            )));
        }

        let removed = self.mirror(request)?;
        let scope = self.archive.subdirectory.as_str();
        self.git("add", &["add", "--all", "--", scope])?;

        let status = self.git("status", &["status", "--porcelain", "--", scope])?;
        if String::from_utf8_lossy(&status.stdout).trim().is_empty() {
            let pushed = self.push()?;
            if is_up_to_date(&pushed) {
                return Ok(Delivery::skipped("already archived"));
            }
            info!("git: pushed a commit left by an earlier run");
            return Ok(Delivery::published(format!(
                "pushed pending commit to {}",
                self.archive.remote
            )));
        }

        let message = match request.release {
            Some(release) => format!("{} {}", self.archive.commit_label, release.short_id),
            None => self.archive.commit_label.clone(),
        };
        self.git("commit", &["commit", "--message", message.as_str(), "--", scope])?;
        self.push()?;
        info!("git: pushed \"{message}\" ({removed} stale artefact(s) removed)");

        Ok(Delivery::published(format!(
            "pushed \"{message}\" to {}",
            self.archive.remote
        )))
    }
}

fn classify_push_failure(stderr: String) -> PublishError {
    let lowered = stderr.to_ascii_lowercase();
    if AUTH_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return PublishError::AuthFailure { reason: stderr };
    }
    if NETWORK_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return PublishError::NetworkFailure { reason: stderr };
    }
    PublishError::Git {
        operation: "push",
        message: stderr,
    }
}

fn is_up_to_date(push: &Output) -> bool {
    [push.stderr.as_slice(), push.stdout.as_slice()]
        .iter()
        .any(|stream| {
            String::from_utf8_lossy(stream)
                .to_ascii_lowercase()
                .contains(UP_TO_DATE)
        })
}

fn io_error(path: &Utf8Path) -> impl FnOnce(std::io::Error) -> PublishError + use<> {
    let path = path.to_owned();
    move |source| PublishError::Io { path, source }
}
