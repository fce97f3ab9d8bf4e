//! Telegram Bot API transport.
//!
//! Requests go to `<api_base>/bot<token>/<method>`. The token never appears
//! in error messages or logs.

use super::PublishError;
use super::chat::ChatChannel;
use super::multipart::MultipartForm;
use crate::artefact::download::http_agent;
use apkrelay::{ChatConfig, LinkButton};
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use serde::Deserialize;
use serde_json::json;

const APK_CONTENT_TYPE: &str = "application/vnd.android.package-archive";
const MAX_RESPONSE_BYTES: u64 = 1024 * 1024;

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    description: Option<String>,
}

/// Chat channel backed by the Telegram Bot API.
pub struct TelegramChannel {
    api_base: String,
    token: String,
    chat_id: String,
    agent: ureq::Agent,
}

impl TelegramChannel {
    /// Create a channel from the chat section of the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::AuthFailure`] when the token or chat id is
    /// missing.
    pub fn new(config: &ChatConfig) -> Result<Self, PublishError> {
        let token = non_blank(config.token.as_deref()).ok_or_else(|| PublishError::AuthFailure {
            reason: "no bot token configured".to_owned(),
        })?;
        let chat_id =
            non_blank(config.chat_id.as_deref()).ok_or_else(|| PublishError::AuthFailure {
                reason: "no chat id configured".to_owned(),
            })?;
        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_owned(),
            token: token.to_owned(),
            chat_id: chat_id.to_owned(),
            agent: http_agent(config.timeout()),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.token)
    }

    fn post(&self, method: &str, content_type: &str, body: &[u8]) -> Result<(), PublishError> {
        debug!("telegram: {method} ({} bytes)", body.len());
        let response = self
            .agent
            .post(&self.method_url(method))
            .header("Content-Type", content_type)
            .send(body)
            .map_err(|err| self.map_error(method, &err))?;

        let mut body = response.into_body();
        let text = body
            .with_config()
            .limit(MAX_RESPONSE_BYTES)
            .read_to_string()
            .map_err(|err| self.map_error(method, &err))?;
        check_api_response(method, &text)
    }

    fn map_error(&self, method: &str, err: &ureq::Error) -> PublishError {
        match err {
            ureq::Error::StatusCode(code @ (401 | 403 | 404)) => PublishError::AuthFailure {
                reason: format!("{method} rejected with HTTP {code}"),
            },
            ureq::Error::StatusCode(code) => PublishError::NetworkFailure {
                reason: format!("{method} failed with HTTP {code}"),
            },
            other => PublishError::NetworkFailure {
                reason: format!("{method}: {}", self.redact(&other.to_string())),
            },
        }
    }

    fn redact(&self, message: &str) -> String {
        message.replace(&self.token, "<redacted>")
    }
}

impl ChatChannel for TelegramChannel {
    fn send_photo(
        &self,
        photo_url: &str,
        caption: &str,
        buttons: &[Vec<LinkButton>],
    ) -> Result<(), PublishError> {
        let payload = photo_payload(&self.chat_id, photo_url, caption, buttons);
        let body = serde_json::to_vec(&payload).map_err(|err| PublishError::NetworkFailure {
            reason: format!("cannot encode sendPhoto payload: {err}"),
        })?;
        self.post("sendPhoto", "application/json", &body)
    }

    fn send_documents(&self, documents: &[Utf8PathBuf]) -> Result<(), PublishError> {
        let (method, form) = documents_form(&self.chat_id, documents, MultipartForm::new())?;
        let content_type = form.content_type();
        self.post(method, &content_type, &form.finish())
    }
}

/// JSON body for `sendPhoto`.
pub(crate) fn photo_payload(
    chat_id: &str,
    photo_url: &str,
    caption: &str,
    buttons: &[Vec<LinkButton>],
) -> serde_json::Value {
    let mut payload = json!({
        "chat_id": chat_id,
        "photo": photo_url,
        "caption": caption,
        "parse_mode": "HTML",
    });
    if !buttons.is_empty() {
        payload["reply_markup"] = json!({ "inline_keyboard": buttons });
    }
    payload
}

/// Multipart form uploading `documents`.
///
/// The Bot API requires two to ten items in a media group, so a single
/// document goes through `sendDocument` instead.
pub(crate) fn documents_form(
    chat_id: &str,
    documents: &[Utf8PathBuf],
    form: MultipartForm,
) -> Result<(&'static str, MultipartForm), PublishError> {
    let form = form.text("chat_id", chat_id);
    if let [single] = documents {
        let content = read_document(single)?;
        let form = form.file("document", file_name(single), APK_CONTENT_TYPE, &content);
        return Ok(("sendDocument", form));
    }

    let media: Vec<_> = (0..documents.len())
        .map(|index| json!({ "type": "document", "media": format!("attach://file{index}") }))
        .collect();
    let mut form = form.text("media", &serde_json::Value::from(media).to_string());
    for (index, path) in documents.iter().enumerate() {
        let content = read_document(path)?;
        form = form.file(
            &format!("file{index}"),
            file_name(path),
            APK_CONTENT_TYPE,
            &content,
        );
    }
    Ok(("sendMediaGroup", form))
}

fn read_document(path: &Utf8Path) -> Result<Vec<u8>, PublishError> {
    std::fs::read(path).map_err(|source| PublishError::Io {
        path: path.to_owned(),
        source,
    })
}

fn file_name(path: &Utf8Path) -> &str {
    path.file_name().unwrap_or(path.as_str())
}

fn check_api_response(method: &str, text: &str) -> Result<(), PublishError> {
    match serde_json::from_str::<ApiResponse>(text) {
        Ok(ApiResponse { ok: true, .. }) => Ok(()),
        Ok(ApiResponse { description, .. }) => Err(PublishError::NetworkFailure {
            reason: format!(
                "{method} refused: {}",
                description.unwrap_or_else(|| "no description".to_owned())
            ),
        }),
        Err(err) => Err(PublishError::NetworkFailure {
            reason: format!("{method} returned an unreadable response: {err}"),
        }),
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn channel() -> TelegramChannel {
        TelegramChannel::new(&ChatConfig {
            token: Some("123:secret".to_owned()),
            chat_id: Some("@nightly".to_owned()),
            api_base: "https://bot.test/".to_owned(),
            ..ChatConfig::default()
        })
        .expect("configured")
    }

    #[rstest]
    fn method_urls_embed_the_token() {
        assert_eq!(
            channel().method_url("sendPhoto"),
            "https://bot.test/bot123:secret/sendPhoto"
        );
    }

    #[rstest]
    #[case(None, Some("@c"))]
    #[case(Some("  "), Some("@c"))]
    #[case(Some("123:secret"), None)]
    fn missing_credentials_are_auth_failures(
        #[case] token: Option<&str>,
        #[case] chat_id: Option<&str>,
    ) {
        let result = TelegramChannel::new(&ChatConfig {
            token: token.map(str::to_owned),
            chat_id: chat_id.map(str::to_owned),
            ..ChatConfig::default()
        });
        assert!(matches!(result, Err(PublishError::AuthFailure { .. })));
    }

    #[rstest]
    fn photo_payload_carries_caption_and_keyboard() {
        let buttons = vec![vec![LinkButton {
            text: "Commit".to_owned(),
            url: "https://example.test/c/1".to_owned(),
        }]];
        let payload = photo_payload("@nightly", "https://img.test/p.jpg", "<b>hi</b>", &buttons);
        assert_eq!(
            payload,
            json!({
                "chat_id": "@nightly",
                "photo": "https://img.test/p.jpg",
                "caption": "<b>hi</b>",
                "parse_mode": "HTML",
                "reply_markup": {
                    "inline_keyboard": [[{ "text": "Commit", "url": "https://example.test/c/1" }]]
                }
            })
        );
    }

    #[rstest]
    fn photo_payload_omits_empty_keyboard() {
        let payload = photo_payload("@nightly", "https://img.test/p.jpg", "hi", &[]);
        assert!(payload.get("reply_markup").is_none());
    }

    #[rstest]
    fn rejected_credentials_map_to_auth_failure() {
        let err = channel().map_error("sendPhoto", &ureq::Error::StatusCode(401));
        assert!(matches!(err, PublishError::AuthFailure { .. }));
        let err = channel().map_error("sendPhoto", &ureq::Error::StatusCode(502));
        assert!(matches!(err, PublishError::NetworkFailure { .. }));
    }

    #[rstest]
    fn api_level_refusals_are_network_failures() {
        assert!(check_api_response("sendPhoto", r#"{"ok":true,"result":{}}"#).is_ok());
        let err = check_api_response(
            "sendMediaGroup",
            r#"{"ok":false,"description":"Bad Request: too many documents"}"#,
        )
        .expect_err("refused");
        assert!(err.to_string().contains("too many documents"));
    }

    #[rstest]
    fn token_is_redacted_from_messages() {
        assert_eq!(
            channel().redact("connect to bot.test/bot123:secret failed"),
            "connect to bot.test/bot<redacted> failed"
        );
    }

    #[rstest]
    fn single_document_uses_send_document() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("app-x86.apk")).expect("utf-8");
        std::fs::write(&path, b"PK").expect("write");

        let (method, form) =
            documents_form("@c", &[path], MultipartForm::with_boundary("B")).expect("form");
        assert_eq!(method, "sendDocument");
        let body = String::from_utf8(form.finish()).expect("ascii");
        assert!(body.contains("name=\"document\"; filename=\"app-x86.apk\""));
    }

    #[rstest]
    fn several_documents_form_a_media_group() {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8");
        let paths: Vec<_> = ["app-x86.apk", "app-x86_64.apk"]
            .iter()
            .map(|name| {
                let path = root.join(name);
                std::fs::write(&path, b"PK").expect("write");
                path
            })
            .collect();

        let (method, form) =
            documents_form("@c", &paths, MultipartForm::with_boundary("B")).expect("form");
        assert_eq!(method, "sendMediaGroup");
        let body = String::from_utf8(form.finish()).expect("ascii");
        assert!(body.contains(r#"{"media":"attach://file0","type":"document"}"#));
        assert!(body.contains("name=\"file1\"; filename=\"app-x86_64.apk\""));
    }

    #[rstest]
    fn unreadable_documents_are_io_errors() {
        let err = documents_form(
            "@c",
            &[Utf8PathBuf::from("/nonexistent/app-x86.apk")],
            MultipartForm::with_boundary("B"),
        )
        .expect_err("missing file");
        assert!(matches!(err, PublishError::Io { .. }));
    }
}
