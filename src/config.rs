//! Pipeline configuration loaded from `apkrelay.toml` and the environment.
//!
//! The release pipeline keeps its settings in a TOML file grouped into
//! sections (`[store]`, `[artifacts]`, `[retry]`, `[identity]`, `[archive]`,
//! `[chat]`, `[paths]`). Secrets and CI context never live in the file: they
//! are layered on afterwards by [`RelayConfig::with_env`], which takes an
//! injectable lookup so that tests never touch the process environment.
//! Once built, a [`RelayConfig`] is treated as immutable and handed to the
//! orchestrator; no component reads the environment on its own.

use crate::variant::LogicalVariant;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the chat bot token.
pub const ENV_TELEGRAM_TOKEN: &str = "APKRELAY_TELEGRAM_TOKEN";
/// Environment variable holding the chat id to broadcast to.
pub const ENV_TELEGRAM_CHAT_ID: &str = "APKRELAY_TELEGRAM_CHAT_ID";
/// Environment variable holding the `owner/name` identity of the running repository.
pub const ENV_REPOSITORY: &str = "GITHUB_REPOSITORY";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        /// Path of the configuration file.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value failed semantic validation.
    #[error("invalid configuration value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Description of the constraint that was violated.
        reason: String,
    },
}

/// Complete configuration for one pipeline run.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    /// Remote build store settings.
    pub store: StoreConfig,
    /// Which artifacts make up a release.
    pub artifacts: ArtifactsConfig,
    /// Polling behaviour while the store catches up.
    pub retry: RetryConfig,
    /// Repository identity gate for the archive target.
    pub identity: IdentityConfig,
    /// Git archive target; absent disables the target.
    pub archive: Option<ArchiveConfig>,
    /// Chat broadcast target; absent disables the target.
    pub chat: Option<ChatConfig>,
    /// Local file locations.
    pub paths: PathsConfig,
    /// Fetch, resolve and checksum only; never delete or publish.
    pub dry_run: bool,
}

impl RelayConfig {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys.
    ///
    /// # Examples
    ///
    /// ```
    /// use apkrelay::RelayConfig;
    ///
    /// let config = RelayConfig::from_toml_str("[store]\nbase_url = \"https://builds.test\"\n")
    ///     .expect("valid configuration");
    /// assert_eq!(config.store.release_channel, "nightly");
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read and
    /// [`ConfigError::Parse`] when it is malformed.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Layers secrets and CI context from `lookup` over the file values.
    ///
    /// Blank values are ignored so that an exported-but-empty variable does
    /// not erase a value from the file.
    #[must_use]
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(repository) = read(ENV_REPOSITORY) {
            self.identity.current = Some(repository);
        }
        if let Some(chat) = self.chat.as_mut() {
            if let Some(token) = read(ENV_TELEGRAM_TOKEN) {
                chat.token = Some(token);
            }
            if let Some(chat_id) = read(ENV_TELEGRAM_CHAT_ID) {
                chat.chat_id = Some(chat_id);
            }
        }
        self
    }

    /// Layers values from the process environment.
    #[must_use]
    pub fn with_process_env(self) -> Self {
        self.with_env(|key| std::env::var(key).ok())
    }

    /// Checks cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.base_url.trim().is_empty() {
            return Err(invalid("store.base_url", "must not be empty"));
        }
        if self.store.not_found_marker.trim().is_empty() {
            return Err(invalid(
                "store.not_found_marker",
                "must not be blank; placeholder bodies could not be recognised",
            ));
        }
        if self.artifacts.required.is_empty() {
            return Err(invalid(
                "artifacts.required",
                "at least one variant must be required",
            ));
        }
        if let Some(variant) = self
            .artifacts
            .optional
            .iter()
            .find(|variant| self.artifacts.required.contains(variant))
        {
            return Err(invalid(
                "artifacts.optional",
                format!("{variant} is listed as both required and optional"),
            ));
        }
        if self.artifacts.extension.trim().is_empty() {
            return Err(invalid("artifacts.extension", "must not be empty"));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(invalid(
                "retry.max_delay_ms",
                "must be greater than or equal to retry.base_delay_ms",
            ));
        }
        if self.retry.max_attempts == Some(0) || self.retry.optional_max_attempts == 0 {
            return Err(invalid("retry", "attempt caps must be at least 1"));
        }
        if let Some(chat) = &self.chat {
            if chat.token.is_none() {
                return Err(invalid(
                    "chat.token",
                    format!("missing; export {ENV_TELEGRAM_TOKEN}"),
                ));
            }
            if chat.chat_id.is_none() {
                return Err(invalid(
                    "chat.chat_id",
                    format!("missing; export {ENV_TELEGRAM_CHAT_ID}"),
                ));
            }
        }
        Ok(())
    }

    /// Every variant the run will try to fetch, required first.
    #[must_use]
    pub fn expected_variants(&self) -> Vec<LogicalVariant> {
        self.artifacts
            .required
            .iter()
            .chain(self.artifacts.optional.iter())
            .copied()
            .collect()
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Remote build store settings.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Base URL; artifacts live at `<base_url>/<release_channel>/<file>`.
    pub base_url: String,
    /// Channel path segment, for example `nightly`.
    pub release_channel: String,
    /// Literal text the store serves in place of a missing object.
    pub not_found_marker: String,
    /// Smallest body accepted as a real artifact.
    pub min_artifact_bytes: u64,
    /// Require the ZIP local-file header that every APK starts with.
    pub require_archive_magic: bool,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl StoreConfig {
    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            release_channel: "nightly".to_owned(),
            not_found_marker: "Not Found".to_owned(),
            min_artifact_bytes: 1,
            require_archive_magic: true,
            timeout_secs: 60,
        }
    }
}

/// Naming and membership of the artifacts that form a release.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ArtifactsConfig {
    /// Leading part of every artifact file name.
    pub file_prefix: String,
    /// Artifact file extension without the dot.
    pub extension: String,
    /// Whether the remote store publishes `-signed` file names.
    pub signed: bool,
    /// Variants that must be present for a release to go out.
    pub required: Vec<LogicalVariant>,
    /// Variants published when available and skipped otherwise.
    pub optional: Vec<LogicalVariant>,
}

impl ArtifactsConfig {
    /// The remote file name expected for `variant`.
    ///
    /// # Examples
    ///
    /// ```
    /// use apkrelay::{ArtifactsConfig, LogicalVariant};
    ///
    /// let artifacts = ArtifactsConfig::default();
    /// assert_eq!(
    ///     artifacts.file_name(LogicalVariant::Arm64V8a),
    ///     "app-arm64-v8a-signed.apk"
    /// );
    /// ```
    #[must_use]
    pub fn file_name(&self, variant: LogicalVariant) -> String {
        let signed = if self.signed { "-signed" } else { "" };
        format!(
            "{}-{}{signed}.{}",
            self.file_prefix,
            variant.file_token(),
            self.extension
        )
    }
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            file_prefix: "app".to_owned(),
            extension: "apk".to_owned(),
            signed: true,
            required: vec![
                LogicalVariant::X86,
                LogicalVariant::X86_64,
                LogicalVariant::ArmeabiV7a,
                LogicalVariant::Arm64V8a,
            ],
            optional: vec![LogicalVariant::Universal],
        }
    }
}

/// Polling behaviour for the eventually consistent store.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Attempt cap for required variants; absent means poll until cancelled.
    pub max_attempts: Option<u32>,
    /// Attempt cap for optional variants.
    pub optional_max_attempts: u32,
    /// First backoff delay in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on any single backoff delay in milliseconds.
    pub max_delay_ms: u64,
}

impl RetryConfig {
    /// First backoff delay.
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Backoff ceiling.
    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            optional_max_attempts: 3,
            base_delay_ms: 2_000,
            max_delay_ms: 60_000,
        }
    }
}

/// Repository identity gate.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct IdentityConfig {
    /// The `owner/name` allowed to publish to the archive.
    pub canonical: String,
    /// The `owner/name` of the repository running the pipeline.
    pub current: Option<String>,
}

impl IdentityConfig {
    /// Returns true when the running repository is the canonical one.
    ///
    /// The comparison is an exact, case-insensitive match; a missing current
    /// identity never matches.
    ///
    /// # Examples
    ///
    /// ```
    /// use apkrelay::IdentityConfig;
    ///
    /// let identity = IdentityConfig {
    ///     canonical: "libre-tube/LibreTube".to_owned(),
    ///     current: Some("Libre-Tube/libretube".to_owned()),
    /// };
    /// assert!(identity.is_canonical());
    /// ```
    #[must_use]
    pub fn is_canonical(&self) -> bool {
        self.current.as_deref().is_some_and(|current| {
            current.trim().to_lowercase() == self.canonical.trim().to_lowercase()
        })
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            canonical: "libre-tube/LibreTube".to_owned(),
            current: None,
        }
    }
}

/// Git archive target settings.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveConfig {
    /// Existing working tree of the archive repository.
    pub worktree: Utf8PathBuf,
    /// Directory inside the worktree that holds the current release.
    pub subdirectory: Utf8PathBuf,
    /// Remote to push to.
    pub remote: String,
    /// Branch to push; absent pushes the current branch.
    pub branch: Option<String>,
    /// Commit message prefix, used alone when metadata is missing.
    pub commit_label: String,
    /// Timeout for each git invocation in seconds.
    pub git_timeout_secs: u64,
}

impl ArchiveConfig {
    /// Timeout for each git invocation.
    #[must_use]
    pub const fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            worktree: Utf8PathBuf::from("nightly-builds"),
            subdirectory: Utf8PathBuf::from("."),
            remote: "origin".to_owned(),
            branch: None,
            commit_label: "Nightly build".to_owned(),
            git_timeout_secs: 300,
        }
    }
}

/// An inline link button attached to the announcement.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LinkButton {
    /// Button label.
    pub text: String,
    /// Target URL.
    pub url: String,
}

/// Chat broadcast target settings.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ChatConfig {
    /// Bot API base URL.
    pub api_base: String,
    /// Bot token; normally supplied through the environment.
    pub token: Option<String>,
    /// Destination chat id or `@channel` handle.
    pub chat_id: Option<String>,
    /// Title shown on the first caption line.
    pub title: String,
    /// Image URL sent with the announcement.
    pub photo_url: String,
    /// Extra link buttons shown under the announcement.
    pub buttons: Vec<LinkButton>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl ChatConfig {
    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".to_owned(),
            token: None,
            chat_id: None,
            title: "LibreTube nightly".to_owned(),
            photo_url: "https://i.ibb.co/LJ9r4hP/LT.jpg".to_owned(),
            buttons: Vec::new(),
            timeout_secs: 120,
        }
    }
}

impl fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatConfig")
            .field("api_base", &self.api_base)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("chat_id", &self.chat_id)
            .field("title", &self.title)
            .field("photo_url", &self.photo_url)
            .field("buttons", &self.buttons)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Local file locations.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Directory owned by the run; artifacts are downloaded here.
    pub working_dir: Utf8PathBuf,
    /// Commit descriptor JSON consumed for release metadata.
    pub descriptor: Option<Utf8PathBuf>,
    /// Directory of numbered changelog files (`<n>.txt`).
    pub changelog_dir: Option<Utf8PathBuf>,
    /// Ledger of releases already published per target.
    pub ledger: Option<Utf8PathBuf>,
    /// File name of the checksum manifest written into the working directory.
    pub manifest_name: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            working_dir: Utf8PathBuf::from("artifacts"),
            descriptor: None,
            changelog_dir: None,
            ledger: None,
            manifest_name: "SHA256SUMS".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use std::collections::HashMap;

    #[fixture]
    fn minimal() -> RelayConfig {
        RelayConfig::from_toml_str("[store]\nbase_url = \"https://builds.test\"\n")
            .expect("minimal configuration should parse")
    }

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[rstest]
    fn defaults_describe_the_nightly_release(minimal: RelayConfig) {
        assert_eq!(minimal.store.release_channel, "nightly");
        assert_eq!(minimal.artifacts.required.len(), 4);
        assert_eq!(minimal.artifacts.optional, vec![LogicalVariant::Universal]);
        assert_eq!(minimal.retry.max_attempts, None);
        assert!(minimal.archive.is_none());
        assert!(minimal.chat.is_none());
        assert!(minimal.validate().is_ok());
    }

    #[rstest]
    fn rejects_unknown_fields() {
        let outcome = RelayConfig::from_toml_str("[store]\nbase_uri = \"typo\"\n");
        assert!(matches!(outcome, Err(ConfigError::Parse(_))));
    }

    #[rstest]
    fn rejects_unknown_variants() {
        let outcome = RelayConfig::from_toml_str("[artifacts]\nrequired = [\"mips\"]\n");
        assert!(outcome.is_err());
    }

    #[rstest]
    fn environment_fills_identity_and_chat_credentials() {
        let config = RelayConfig::from_toml_str(concat!(
            "[store]\nbase_url = \"https://builds.test\"\n",
            "[chat]\ntitle = \"Test\"\n",
        ))
        .expect("valid configuration")
        .with_env(lookup(&[
            (ENV_REPOSITORY, "libre-tube/LibreTube"),
            (ENV_TELEGRAM_TOKEN, "123:abc"),
            (ENV_TELEGRAM_CHAT_ID, "-1001"),
        ]));

        let chat = config.chat.as_ref().expect("chat section present");
        assert_eq!(chat.token.as_deref(), Some("123:abc"));
        assert_eq!(chat.chat_id.as_deref(), Some("-1001"));
        assert!(config.identity.is_canonical());
        assert!(config.validate().is_ok());
    }

    #[rstest]
    fn blank_environment_values_are_ignored(minimal: RelayConfig) {
        let config = minimal.with_env(lookup(&[(ENV_REPOSITORY, "  ")]));
        assert!(config.identity.current.is_none());
    }

    #[rstest]
    fn chat_without_token_fails_validation() {
        let config = RelayConfig::from_toml_str(concat!(
            "[store]\nbase_url = \"https://builds.test\"\n",
            "[chat]\nchat_id = \"-1001\"\n",
        ))
        .expect("valid configuration");

        let err = config.validate().expect_err("token is missing");
        assert!(err.to_string().contains(ENV_TELEGRAM_TOKEN));
    }

    #[rstest]
    fn variant_listed_twice_fails_validation(mut minimal: RelayConfig) {
        minimal.artifacts.optional = vec![LogicalVariant::X86];
        let err = minimal.validate().expect_err("x86 is also required");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "artifacts.optional",
                ..
            }
        ));
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    fn blank_not_found_marker_fails_validation(mut minimal: RelayConfig, #[case] marker: &str) {
        minimal.store.not_found_marker = marker.to_owned();
        let err = minimal.validate().expect_err("marker is blank");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "store.not_found_marker",
                ..
            }
        ));
    }

    #[rstest]
    fn inverted_delays_fail_validation(mut minimal: RelayConfig) {
        minimal.retry.base_delay_ms = 10;
        minimal.retry.max_delay_ms = 5;
        assert!(minimal.validate().is_err());
    }

    #[rstest]
    #[case(Some("libre-tube/LibreTube"), true)]
    #[case(Some("LIBRE-TUBE/LIBRETUBE"), true)]
    #[case(Some("someone/LibreTube"), false)]
    #[case(Some("libre-tube/LibreTube-fork"), false)]
    #[case(None, false)]
    fn identity_match_is_exact_and_case_insensitive(
        #[case] current: Option<&str>,
        #[case] expected: bool,
    ) {
        let identity = IdentityConfig {
            current: current.map(str::to_owned),
            ..IdentityConfig::default()
        };
        assert_eq!(identity.is_canonical(), expected);
    }

    #[rstest]
    fn unsigned_file_names_drop_the_suffix() {
        let artifacts = ArtifactsConfig {
            signed: false,
            ..ArtifactsConfig::default()
        };
        assert_eq!(artifacts.file_name(LogicalVariant::X86), "app-x86.apk");
    }

    #[rstest]
    fn debug_output_redacts_the_token() {
        let chat = ChatConfig {
            token: Some("secret-token".to_owned()),
            ..ChatConfig::default()
        };
        let rendered = format!("{chat:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
    }
}
