//! User-facing progress and result lines.
//!
//! Everything here goes to stderr; stdout is reserved for the manifest
//! printed by `apkrelay manifest`.

use crate::publish::{PublishOutcome, PublishStatus};
use std::fmt::Display;
use std::io::Write;

/// Write one line to `stderr`, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort reporting; a closed stderr must not fail the run.
    }
}

/// One line per outcome, in the order given.
#[must_use]
pub fn outcome_lines(outcomes: &[PublishOutcome]) -> Vec<String> {
    outcomes
        .iter()
        .map(|outcome| format!("  {outcome}"))
        .collect()
}

/// Final aggregate line for a finished run.
///
/// # Examples
///
/// ```
/// use apkrelay_publisher::output::summary_line;
/// use apkrelay_publisher::publish::{PublishOutcome, PublishTarget};
///
/// let outcomes = vec![
///     PublishOutcome::skipped(PublishTarget::Git, "dry run"),
///     PublishOutcome::failed(PublishTarget::Chat, "missing metadata"),
/// ];
/// assert_eq!(
///     summary_line(3, &outcomes),
///     "Release of 3 artefact(s) failed: 0 published, 1 skipped, 1 failed"
/// );
/// ```
#[must_use]
pub fn summary_line(artefacts: usize, outcomes: &[PublishOutcome]) -> String {
    let count = |status| outcomes.iter().filter(|o| o.status == status).count();
    let failed = count(PublishStatus::Failed);
    let verdict = if failed == 0 { "succeeded" } else { "failed" };
    format!(
        "Release of {artefacts} artefact(s) {verdict}: {} published, {} skipped, {failed} failed",
        count(PublishStatus::Published),
        count(PublishStatus::Skipped),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::PublishTarget;
    use rstest::rstest;

    #[rstest]
    fn outcome_lines_are_indented() {
        let lines = outcome_lines(&[PublishOutcome::skipped(PublishTarget::Git, "already archived")]);
        assert_eq!(lines, vec!["  git: skipped (already archived)".to_owned()]);
    }

    #[rstest]
    fn summary_reports_success_without_failures() {
        let outcomes = vec![PublishOutcome::skipped(PublishTarget::Git, "dry run")];
        assert_eq!(
            summary_line(2, &outcomes),
            "Release of 2 artefact(s) succeeded: 0 published, 1 skipped, 0 failed"
        );
    }

    #[rstest]
    fn write_failures_are_ignored() {
        struct Closed;
        impl Write for Closed {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("closed"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        write_stderr_line(&mut Closed, "ignored");
    }
}
