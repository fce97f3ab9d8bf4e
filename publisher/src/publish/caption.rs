//! Announcement caption and link buttons.
//!
//! Captions use the Bot API's HTML parse mode:
//!
//! ```text
//! <b>LibreTube nightly abcdef1</b>
//!
//! <blockquote><a href="https://…/commit/abcdef1…">Fix crash</a></blockquote>
//!
//! <b>What's changed?</b>
//! <pre>…</pre>
//!
//! Signed-off-by: A &lt;a@x.com&gt;
//! ```
//!
//! Captions are capped at [`CAPTION_LIMIT`] characters. The changelog is
//! shortened first, then the commit message; both end in an ellipsis when
//! cut.

use crate::release::ReleaseRecord;
use apkrelay::LinkButton;

/// Longest caption the Bot API accepts on a media message.
pub const CAPTION_LIMIT: usize = 1024;

/// Label of the automatic button pointing at the released commit.
pub const COMMIT_BUTTON_TEXT: &str = "Commit";

const ELLIPSIS: char = '…';

/// Build the announcement caption for `release`.
///
/// # Examples
///
/// ```
/// use apkrelay_publisher::publish::caption::build_caption;
/// use apkrelay_publisher::release::ReleaseRecord;
///
/// let release = ReleaseRecord {
///     short_id: "abcdef1".to_owned(),
///     full_id: "abcdef1234567".to_owned(),
///     message: "Fix <crash>".to_owned(),
///     author_name: "A".to_owned(),
///     author_email: "a@x.com".to_owned(),
///     source_url: None,
/// };
/// let caption = build_caption("Nightly", &release, None);
/// assert_eq!(
///     caption,
///     "<b>Nightly abcdef1</b>\n\n<blockquote>Fix &lt;crash&gt;</blockquote>\n\n\
///      Signed-off-by: A &lt;a@x.com&gt;"
/// );
/// ```
#[must_use]
pub fn build_caption(title: &str, release: &ReleaseRecord, changelog: Option<&str>) -> String {
    let message = escape_html(release.message.trim());
    let changelog = changelog.map(str::trim).filter(|text| !text.is_empty());
    let full = render(title, release, &message, changelog.map(escape_html).as_deref());
    if char_len(&full) <= CAPTION_LIMIT {
        return full;
    }

    if let Some(changelog) = changelog {
        let overhead = char_len(&render(title, release, &message, Some("")));
        if let Some(budget) = CAPTION_LIMIT.checked_sub(overhead).filter(|b| *b > 1) {
            let excerpt = fit(changelog, budget);
            return render(title, release, &message, Some(&excerpt));
        }
    }

    let overhead = char_len(&render(title, release, "", None));
    let budget = CAPTION_LIMIT.saturating_sub(overhead);
    let message = fit(release.message.trim(), budget);
    render(title, release, &message, None)
}

/// Arrange the configured buttons and the automatic commit button into rows.
///
/// Configured buttons share the first row; the commit button, present only
/// when the release has a source URL, gets a row of its own.
#[must_use]
pub fn button_rows(configured: &[LinkButton], release: &ReleaseRecord) -> Vec<Vec<LinkButton>> {
    let mut rows = Vec::new();
    if !configured.is_empty() {
        rows.push(configured.to_vec());
    }
    if let Some(url) = &release.source_url {
        rows.push(vec![LinkButton {
            text: COMMIT_BUTTON_TEXT.to_owned(),
            url: url.clone(),
        }]);
    }
    rows
}

/// Escape the characters the Bot API's HTML mode treats as markup.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        push_escaped(&mut escaped, ch);
    }
    escaped
}

fn push_escaped(out: &mut String, ch: char) {
    match ch {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        '"' => out.push_str("&quot;"),
        other => out.push(other),
    }
}

fn render(title: &str, release: &ReleaseRecord, message: &str, changelog: Option<&str>) -> String {
    let mut caption = format!(
        "<b>{} {}</b>\n\n",
        escape_html(title),
        escape_html(&release.short_id)
    );
    match &release.source_url {
        Some(url) => caption.push_str(&format!(
            "<blockquote><a href=\"{}\">{message}</a></blockquote>",
            escape_html(url)
        )),
        None => caption.push_str(&format!("<blockquote>{message}</blockquote>")),
    }
    if let Some(changelog) = changelog {
        caption.push_str(&format!("\n\n<b>What's changed?</b>\n<pre>{changelog}</pre>"));
    }
    caption.push_str(&format!(
        "\n\nSigned-off-by: {} &lt;{}&gt;",
        escape_html(&release.author_name),
        escape_html(&release.author_email)
    ));
    caption
}

/// Escape `raw`, cutting it so the escaped text plus an ellipsis fits in
/// `budget` characters. Entities are never split.
fn fit(raw: &str, budget: usize) -> String {
    let escaped = escape_html(raw);
    if char_len(&escaped) <= budget {
        return escaped;
    }
    let mut out = String::new();
    let mut used = 0;
    let mut piece = String::new();
    for ch in raw.chars() {
        piece.clear();
        push_escaped(&mut piece, ch);
        let width = char_len(&piece);
        if used + width + 1 > budget {
            break;
        }
        out.push_str(&piece);
        used += width;
    }
    out.push(ELLIPSIS);
    out
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
