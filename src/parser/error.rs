//! Error types for archive parsing.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort reading an archive directory.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The archive directory does not exist.
    #[error("archive directory not found: {path}\n  Suggestion: pass the folder holding the WoS .txt exports with -a")]
    MissingDirectory {
        /// The path that was given.
        path: PathBuf,
    },

    /// The directory holds no `.txt` exports.
    #[error("no .txt files in {path}\n  Suggestion: export records from Web of Science as plain text")]
    NoTextFiles {
        /// The directory that was scanned.
        path: PathBuf,
    },

    /// Listing the directory failed.
    #[error("cannot read archive directory {path}: {source}")]
    Io {
        /// The directory being listed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl ArchiveError {
    /// Creates a directory listing error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_directory_display_has_suggestion() {
        let msg = ArchiveError::MissingDirectory {
            path: PathBuf::from("/nope"),
        }
        .to_string();
        assert!(msg.contains("/nope"));
        assert!(msg.contains("Suggestion:"));
    }
}
