//! Shared test utilities for the publisher crate.
//!
//! Gated behind `cfg(test)` and the `test-support` feature so integration
//! suites can script the store, git, and publishers without touching the
//! network.

use crate::artefact::download::{ArtefactStore, DownloadError};
use crate::process::{CommandError, CommandExecutor};
use crate::publish::{Delivery, PublishError, PublishRequest, PublishTarget, Publisher};
use apkrelay::{LogicalVariant, RelayConfig};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::{HashMap, VecDeque};
use std::process::{ExitStatus, Output};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code.unsigned_abs())
}

/// Creates a successful command `Output` with empty stdout and stderr.
#[must_use]
pub fn success_output() -> Output {
    stdout_output("")
}

/// Creates a successful command `Output` with the given stdout.
#[must_use]
pub fn stdout_output(stdout: &str) -> Output {
    Output {
        status: exit_status(0),
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
    }
}

/// Creates a successful command `Output` that only wrote to stderr, as
/// `git push` does.
#[must_use]
pub fn stderr_output(stderr: &str) -> Output {
    Output {
        status: exit_status(0),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
#[must_use]
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Represents an expected command invocation for testing.
#[derive(Debug)]
pub struct ExpectedCall {
    /// The program to execute (e.g., "git").
    pub program: &'static str,
    /// The arguments to pass to the program.
    pub args: Vec<String>,
    /// The result to return when this command is invoked.
    pub result: Result<Output, CommandError>,
}

impl ExpectedCall {
    /// A successful `git` invocation with the given arguments and stdout.
    #[must_use]
    pub fn git(args: &[&str], stdout: &str) -> Self {
        Self {
            program: "git",
            args: args.iter().map(|arg| (*arg).to_owned()).collect(),
            result: Ok(stdout_output(stdout)),
        }
    }
}

/// A stub implementation of `CommandExecutor` for testing.
///
/// Records expected command invocations and returns predefined results,
/// allowing tests to verify command execution without side effects.
#[derive(Debug)]
pub struct StubExecutor {
    expected: Mutex<VecDeque<ExpectedCall>>,
    calls: AtomicUsize,
}

impl StubExecutor {
    /// Creates a new `StubExecutor` with the given expected calls.
    #[must_use]
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: Mutex::new(expected.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of commands run so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        assert!(
            self.expected
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_empty(),
            "expected no further command invocations"
        );
    }
}

impl CommandExecutor for StubExecutor {
    fn run(
        &self,
        program: &str,
        args: &[String],
        _cwd: &Utf8Path,
        _timeout: Duration,
    ) -> Result<Output, CommandError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let call = self
            .expected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let Some(call) = call else {
            panic!("unexpected command invocation: {program} {args:?}");
        };

        assert_eq!(call.program, program);
        assert_eq!(call.args.as_slice(), args);

        call.result
    }
}

/// One scripted store reply.
#[derive(Debug, Clone)]
pub enum StoreReply {
    /// Serve this body.
    Body(Vec<u8>),
    /// Answer with HTTP 404.
    NotFound,
    /// Fail at the transport level.
    Transport(String),
}

/// An `ArtefactStore` that replays a queue of replies per object name.
///
/// Once a queue is exhausted its last reply repeats; names without a script
/// are answered with [`StoreReply::NotFound`].
#[derive(Debug, Default)]
pub struct ScriptedStore {
    scripts: Mutex<HashMap<String, VecDeque<StoreReply>>>,
    requests: Mutex<HashMap<String, usize>>,
}

impl ScriptedStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the replies for `name`, replacing any earlier script.
    pub fn script(&self, name: &str, replies: Vec<StoreReply>) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_owned(), replies.into());
    }

    /// How many times `name` was requested.
    #[must_use]
    pub fn requests(&self, name: &str) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    /// Total requests across all names.
    #[must_use]
    pub fn total_requests(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }
}

impl ArtefactStore for ScriptedStore {
    fn object_url(&self, name: &str) -> String {
        format!("https://store.test/nightly/{name}")
    }

    fn retrieve(&self, name: &str) -> Result<Vec<u8>, DownloadError> {
        *self
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_owned())
            .or_default() += 1;

        let reply = {
            let mut scripts = self.scripts.lock().unwrap_or_else(PoisonError::into_inner);
            match scripts.get_mut(name) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        match reply.unwrap_or(StoreReply::NotFound) {
            StoreReply::Body(body) => Ok(body),
            StoreReply::NotFound => Err(DownloadError::NotFound {
                url: self.object_url(name),
            }),
            StoreReply::Transport(reason) => Err(DownloadError::HttpError {
                url: self.object_url(name),
                reason,
            }),
        }
    }
}

/// A body that passes the default probe: ZIP magic followed by padding.
#[must_use]
pub fn apk_body(len: usize) -> Vec<u8> {
    let mut body = b"PK\x03\x04".to_vec();
    body.resize(len.max(body.len()), 0x5a);
    body
}

/// A configuration suited to tests: working directory under `root`, no
/// backoff delay, and no publishers.
#[must_use]
pub fn test_config(root: &Utf8Path) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.store.base_url = "https://store.test".to_owned();
    config.retry.base_delay_ms = 0;
    config.retry.max_delay_ms = 0;
    config.retry.max_attempts = Some(5);
    config.paths.working_dir = root.join("work");
    config.artifacts.required = vec![LogicalVariant::X86, LogicalVariant::Arm64V8a];
    config.artifacts.optional = Vec::new();
    config
}

/// Writes a commit descriptor to `path`.
///
/// # Panics
///
/// Panics if the file cannot be written.
pub fn write_descriptor(path: &Utf8Path, full_id: &str, message: &str) {
    let json = serde_json::json!({
        "sha": full_id,
        "html_url": format!("https://example.test/commit/{full_id}"),
        "commit": {
            "message": message,
            "author": { "name": "Release Bot", "email": "bot@example.test" }
        }
    });
    if let Err(err) = std::fs::write(path, json.to_string()) {
        panic!("failed to write descriptor {path}: {err}");
    }
}

/// What a [`FakePublisher`] does when called.
#[derive(Debug, Clone)]
pub enum FakeBehaviour {
    /// Return this delivery.
    Deliver(Delivery),
    /// Fail with [`PublishError::NetworkFailure`].
    Fail(String),
    /// Fail with [`PublishError::MissingMetadata`] when no release is given.
    NeedMetadata,
    /// Panic.
    Panic,
}

/// A publisher that records its calls and behaves as scripted.
#[derive(Debug)]
pub struct FakePublisher {
    target: PublishTarget,
    behaviour: FakeBehaviour,
    calls: AtomicUsize,
    seen: Mutex<Vec<Utf8PathBuf>>,
}

impl FakePublisher {
    /// Creates a publisher for `target`.
    #[must_use]
    pub const fn new(target: PublishTarget, behaviour: FakeBehaviour) -> Self {
        Self {
            target,
            behaviour,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Number of publish calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Local paths of the artefacts passed to the last call.
    #[must_use]
    pub fn seen(&self) -> Vec<Utf8PathBuf> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Publisher for FakePublisher {
    fn target(&self) -> PublishTarget {
        self.target
    }

    fn publish(&self, request: &PublishRequest<'_>) -> Result<Delivery, PublishError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.seen.lock().unwrap_or_else(PoisonError::into_inner) = request
            .set
            .values()
            .map(|artifact| artifact.local_path().to_owned())
            .collect();
        match &self.behaviour {
            FakeBehaviour::Deliver(delivery) => Ok(delivery.clone()),
            FakeBehaviour::Fail(reason) => Err(PublishError::NetworkFailure {
                reason: reason.clone(),
            }),
            FakeBehaviour::NeedMetadata => request
                .release
                .map(|release| Delivery::published(format!("announced {}", release.short_id)))
                .ok_or(PublishError::MissingMetadata),
            FakeBehaviour::Panic => panic!("{} publisher exploded", self.target),
        }
    }
}
