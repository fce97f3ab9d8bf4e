//! Chat broadcast publisher.
//!
//! Sends one photo message carrying the caption and link buttons, then the
//! artefacts as document groups. A failure after the photo was sent leaves
//! the announcement without its files; the run reports the channel as
//! failed and nothing is retracted.

use super::caption::{build_caption, button_rows};
use super::{Delivery, PublishError, PublishRequest, PublishTarget, Publisher};
use apkrelay::{ChatConfig, LinkButton};
use camino::Utf8PathBuf;
use log::{debug, info};

/// Most documents the Bot API accepts in one media group.
pub const MAX_GROUP_SIZE: usize = 10;

/// A chat transport.
#[cfg_attr(test, mockall::automock)]
pub trait ChatChannel: Send + Sync {
    /// Send the announcement photo with its caption and button rows.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] when the message is not accepted.
    fn send_photo(
        &self,
        photo_url: &str,
        caption: &str,
        buttons: &[Vec<LinkButton>],
    ) -> Result<(), PublishError>;

    /// Upload up to [`MAX_GROUP_SIZE`] files as one group.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] when a file cannot be read or the upload is
    /// rejected.
    fn send_documents(&self, documents: &[Utf8PathBuf]) -> Result<(), PublishError>;
}

/// Publishes a release announcement to a chat channel.
pub struct ChatPublisher {
    channel: Box<dyn ChatChannel>,
    title: String,
    photo_url: String,
    buttons: Vec<LinkButton>,
}

impl ChatPublisher {
    /// Create a publisher over `channel` using the presentation settings in
    /// `config`.
    #[must_use]
    pub fn new(channel: Box<dyn ChatChannel>, config: &ChatConfig) -> Self {
        Self {
            channel,
            title: config.title.clone(),
            photo_url: config.photo_url.clone(),
            buttons: config.buttons.clone(),
        }
    }
}

impl Publisher for ChatPublisher {
    fn target(&self) -> PublishTarget {
        PublishTarget::Chat
    }

    fn publish(&self, request: &PublishRequest<'_>) -> Result<Delivery, PublishError> {
        let release = request.release.ok_or(PublishError::MissingMetadata)?;
        let caption = build_caption(&self.title, release, request.changelog);
        let buttons = button_rows(&self.buttons, release);

        self.channel
            .send_photo(&self.photo_url, &caption, &buttons)?;
        debug!("chat: announcement for {} sent", release.short_id);

        let mut documents: Vec<Utf8PathBuf> = request
            .set
            .values()
            .map(|artifact| artifact.local_path().to_owned())
            .collect();
        documents.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let mut groups = 0;
        for group in documents.chunks(MAX_GROUP_SIZE) {
            self.channel.send_documents(group)?;
            groups += 1;
        }
        info!(
            "chat: sent {} artefact(s) in {groups} group(s)",
            documents.len()
        );

        Ok(Delivery::published(format!(
            "announced {} with {} artefact(s)",
            release.short_id,
            documents.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artefact::checksum::Manifest;
    use crate::artefact::naming::ArtefactName;
    use crate::artefact::reference::ArtifactRef;
    use crate::artefact::resolver::ArtifactSet;
    use crate::release::ReleaseRecord;
    use camino::Utf8Path;
    use mockall::Sequence;
    use rstest::{fixture, rstest};

    fn set_of(names: &[&str]) -> ArtifactSet {
        names
            .iter()
            .map(|name| {
                let parsed = ArtefactName::parse(name, "apk").expect("valid name");
                (
                    parsed.variant(),
                    ArtifactRef::new(&parsed, Utf8PathBuf::from(format!("work/{name}"))),
                )
            })
            .collect()
    }

    #[fixture]
    fn release() -> ReleaseRecord {
        ReleaseRecord {
            short_id: "abcdef1".to_owned(),
            full_id: "abcdef1234567".to_owned(),
            message: "Fix crash".to_owned(),
            author_name: "A".to_owned(),
            author_email: "a@x.com".to_owned(),
            source_url: Some("https://example.test/c/abcdef1".to_owned()),
        }
    }

    fn request<'a>(
        set: &'a ArtifactSet,
        manifest: &'a Manifest,
        release: Option<&'a ReleaseRecord>,
    ) -> PublishRequest<'a> {
        PublishRequest {
            set,
            manifest,
            manifest_path: Utf8Path::new("work/SHA256SUMS"),
            release,
            changelog: None,
        }
    }

    #[rstest]
    fn announces_then_uploads_sorted_documents(release: ReleaseRecord) {
        let set = set_of(&["app-x86_64-signed.apk", "app-arm64-v8a-signed.apk"]);
        let manifest = Manifest::default();
        let mut channel = MockChatChannel::new();
        let mut seq = Sequence::new();
        channel
            .expect_send_photo()
            .withf(|photo, caption, buttons| {
                photo == "https://img.test/logo.png"
                    && caption.starts_with("<b>Nightly abcdef1</b>")
                    && buttons.len() == 1
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        channel
            .expect_send_documents()
            .withf(|docs| {
                docs == [
                    Utf8PathBuf::from("work/app-arm64-v8a-signed.apk"),
                    Utf8PathBuf::from("work/app-x86_64-signed.apk"),
                ]
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        let config = ChatConfig {
            title: "Nightly".to_owned(),
            photo_url: "https://img.test/logo.png".to_owned(),
            ..ChatConfig::default()
        };

        let publisher = ChatPublisher::new(Box::new(channel), &config);
        let delivery = publisher
            .publish(&request(&set, &manifest, Some(&release)))
            .expect("published");
        assert!(matches!(delivery, Delivery::Published { .. }));
    }

    #[rstest]
    fn missing_metadata_fails_without_sending() {
        let set = set_of(&["app-x86.apk"]);
        let manifest = Manifest::default();
        let mut channel = MockChatChannel::new();
        channel.expect_send_photo().never();
        channel.expect_send_documents().never();

        let publisher = ChatPublisher::new(Box::new(channel), &ChatConfig::default());
        let err = publisher
            .publish(&request(&set, &manifest, None))
            .expect_err("metadata required");
        assert!(matches!(err, PublishError::MissingMetadata));
        assert_eq!(err.to_string(), "missing metadata");
    }

    #[rstest]
    fn document_failure_after_announcement_is_reported(release: ReleaseRecord) {
        let set = set_of(&["app-x86.apk"]);
        let manifest = Manifest::default();
        let mut channel = MockChatChannel::new();
        channel.expect_send_photo().returning(|_, _, _| Ok(()));
        channel.expect_send_documents().returning(|_| {
            Err(PublishError::NetworkFailure {
                reason: "connection reset".to_owned(),
            })
        });

        let publisher = ChatPublisher::new(Box::new(channel), &ChatConfig::default());
        let err = publisher
            .publish(&request(&set, &manifest, Some(&release)))
            .expect_err("upload fails");
        assert!(matches!(err, PublishError::NetworkFailure { .. }));
    }
}
