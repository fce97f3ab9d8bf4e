//! Changelog excerpts.
//!
//! Store listings keep one changelog per version code as `<n>.txt`; the
//! newest entry is the file with the highest number.

use super::MetadataError;
use camino::Utf8Path;

/// Return the trimmed text of the highest-numbered `<n>.txt` in `dir`, or
/// `None` when the directory holds no such file.
///
/// # Errors
///
/// Returns [`MetadataError::Unreadable`] when the directory or the chosen
/// file cannot be read.
pub fn latest_changelog(dir: &Utf8Path) -> Result<Option<String>, MetadataError> {
    let unreadable = |path: &Utf8Path| {
        let path = path.to_owned();
        move |source| MetadataError::Unreadable { path, source }
    };

    let mut newest: Option<(u64, camino::Utf8PathBuf)> = None;
    for entry in dir.read_dir_utf8().map_err(unreadable(dir))? {
        let entry = entry.map_err(unreadable(dir))?;
        let Some(number) = version_code(entry.file_name()) else {
            continue;
        };
        if newest.as_ref().is_none_or(|(best, _)| number > *best) {
            newest = Some((number, entry.path().to_owned()));
        }
    }

    newest
        .map(|(_, path)| {
            std::fs::read_to_string(&path)
                .map(|text| text.trim().to_owned())
                .map_err(unreadable(&path))
        })
        .transpose()
}

fn version_code(file_name: &str) -> Option<u64> {
    file_name.strip_suffix(".txt")?.parse().ok()
}
