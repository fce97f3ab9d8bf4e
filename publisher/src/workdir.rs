//! Exclusive ownership of the working directory.
//!
//! A run holds an advisory lock on `<working dir>/.apkrelay.lock` for its
//! whole lifetime. A second run against the same directory fails fast
//! instead of racing the first over half-written artefacts.

use camino::{Utf8Path, Utf8PathBuf};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use thiserror::Error;

/// Name of the lock file inside the working directory.
pub const LOCK_FILE_NAME: &str = ".apkrelay.lock";

/// Errors raised while claiming the working directory.
#[derive(Debug, Error)]
pub enum WorkdirError {
    /// Another run holds the lock.
    #[error("working directory {path} is in use by another run")]
    Busy {
        /// The contested directory.
        path: Utf8PathBuf,
    },

    /// The directory or lock file could not be prepared.
    #[error("cannot prepare working directory {path}: {source}")]
    Io {
        /// The path being prepared.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// A working directory owned by the current run. The lock is released on
/// drop.
#[derive(Debug)]
pub struct WorkdirLock {
    root: Utf8PathBuf,
    file: File,
}

impl WorkdirLock {
    /// Create `root` if needed and lock it.
    ///
    /// # Errors
    ///
    /// Returns [`WorkdirError::Busy`] when another process holds the lock and
    /// [`WorkdirError::Io`] when the directory or lock file cannot be created.
    pub fn acquire(root: &Utf8Path) -> Result<Self, WorkdirError> {
        let io_error = |path: &Utf8Path| {
            let path = path.to_owned();
            move |source| WorkdirError::Io { path, source }
        };
        std::fs::create_dir_all(root).map_err(io_error(root))?;

        let lock_path = root.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(io_error(&lock_path))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                root: root.to_owned(),
                file,
            }),
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                Err(WorkdirError::Busy {
                    path: root.to_owned(),
                })
            }
            Err(source) => Err(WorkdirError::Io {
                path: lock_path,
                source,
            }),
        }
    }

    /// The locked directory.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }
}

impl Drop for WorkdirLock {
    fn drop(&mut self) {
        // Closing the file releases the lock as well.
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_on_a_directory_is_refused() {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().join("work")).expect("utf-8 path");

        let first = WorkdirLock::acquire(&root).expect("first claim");
        assert!(matches!(
            WorkdirLock::acquire(&root),
            Err(WorkdirError::Busy { .. })
        ));

        drop(first);
        assert!(WorkdirLock::acquire(&root).is_ok());
    }
}
