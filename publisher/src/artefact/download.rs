//! Remote build store access.
//!
//! Provides a trait-based abstraction for retrieving artefacts from the
//! build store, enabling dependency injection for testing. Objects live at
//! `<base_url>/<release_channel>/<file name>`.

use apkrelay::StoreConfig;
use std::time::Duration;

/// Largest body accepted from the store.
const MAX_BODY_BYTES: u64 = 512 * 1024 * 1024;

/// Trait for retrieving artefact bodies from the build store.
///
/// Implementations return the raw body; deciding whether the body is a real
/// artefact or a placeholder is left to
/// [`BodyProbe`](super::probe::BodyProbe).
#[cfg_attr(test, mockall::automock)]
pub trait ArtefactStore: Send + Sync {
    /// The URL an object is retrieved from.
    fn object_url(&self, name: &str) -> String;

    /// Retrieve the full body of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::NotFound`] for an HTTP 404 and
    /// [`DownloadError::HttpError`] for any other transport failure.
    fn retrieve(&self, name: &str) -> Result<Vec<u8>, DownloadError>;
}

/// Errors arising from store requests.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// HTTP request failed.
    #[error("download failed for {url}: {reason}")]
    HttpError {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The requested object was not found (HTTP 404).
    #[error("artefact not found: {url}")]
    NotFound {
        /// The URL that returned 404.
        url: String,
    },
}

/// HTTP-based store using `ureq`.
pub struct HttpStore {
    base_url: String,
    release_channel: String,
    agent: ureq::Agent,
}

impl HttpStore {
    /// Create a store client from the store section of the configuration.
    #[must_use]
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            release_channel: config.release_channel.trim_matches('/').to_owned(),
            agent: http_agent(config.timeout()),
        }
    }

    /// Construct the object URL for a given file name.
    ///
    /// # Examples
    ///
    /// ```
    /// use apkrelay_publisher::artefact::download::HttpStore;
    ///
    /// let url = HttpStore::asset_url("https://builds.test/", "nightly", "app-x86.apk");
    /// assert_eq!(url, "https://builds.test/nightly/app-x86.apk");
    /// ```
    #[must_use]
    pub fn asset_url(base_url: &str, release_channel: &str, file_name: &str) -> String {
        format!(
            "{}/{}/{file_name}",
            base_url.trim_end_matches('/'),
            release_channel.trim_matches('/')
        )
    }
}

impl ArtefactStore for HttpStore {
    fn object_url(&self, name: &str) -> String {
        Self::asset_url(&self.base_url, &self.release_channel, name)
    }

    fn retrieve(&self, name: &str) -> Result<Vec<u8>, DownloadError> {
        let url = self.object_url(name);
        let response = self
            .agent
            .get(&url)
            .call()
            .map_err(|e| map_ureq_error(&url, &e))?;
        let mut body = response.into_body();
        body.with_config()
            .limit(MAX_BODY_BYTES)
            .read_to_vec()
            .map_err(|e| DownloadError::HttpError {
                url,
                reason: e.to_string(),
            })
    }
}

/// Build a `ureq` agent with a global request timeout.
pub(crate) fn http_agent(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();
    ureq::Agent::new_with_config(config)
}

/// Map a ureq error to a [`DownloadError`].
fn map_ureq_error(url: &str, err: &ureq::Error) -> DownloadError {
    match err {
        ureq::Error::StatusCode(404) => DownloadError::NotFound {
            url: url.to_owned(),
        },
        other => DownloadError::HttpError {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}
