//! Deterministic output paths, the idempotent skip check, and diagnostics dumps.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::constants::{DEBUG_DIR, PAYLOAD_EXTENSION};

/// Replaces path-unsafe characters of an identifier with underscores.
///
/// ```
/// use doihive_core::download::sanitize_identifier;
///
/// assert_eq!(sanitize_identifier("10.1000/xyz:123"), "10.1000_xyz_123");
/// ```
#[must_use]
pub fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            other => other,
        })
        .collect()
}

/// Output filename for an identifier: sanitized identifier plus the payload extension.
#[must_use]
pub fn output_filename(identifier: &str) -> String {
    format!("{}.{PAYLOAD_EXTENSION}", sanitize_identifier(identifier))
}

/// Where finished payloads and diagnostics go for one run.
#[derive(Debug, Clone)]
pub struct OutputSink {
    dir: PathBuf,
}

impl OutputSink {
    /// Sink rooted at `dir`. The directory is expected to exist.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The output directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final path for an identifier's payload.
    #[must_use]
    pub fn path_for(&self, identifier: &str) -> PathBuf {
        self.dir.join(output_filename(identifier))
    }

    /// Size of the already committed payload, if any.
    ///
    /// Only committed files can exist at this path: payloads are staged under
    /// a different name and renamed in place after validation.
    pub async fn existing_size(&self, identifier: &str) -> Option<u64> {
        let path = self.path_for(identifier);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {
                debug!(path = %path.display(), bytes = meta.len(), "output already present");
                Some(meta.len())
            }
            Ok(_) => {
                warn!(path = %path.display(), "output path exists but is not a file");
                None
            }
            Err(_) => None,
        }
    }

    /// Path of the raw markup dump for an identifier.
    #[must_use]
    pub fn diagnostics_path_for(&self, identifier: &str) -> PathBuf {
        self.dir
            .join(DEBUG_DIR)
            .join(format!("{}.html", sanitize_identifier(identifier)))
    }

    /// Persists raw landing page markup for manual triage. Best effort.
    pub async fn save_diagnostics(&self, identifier: &str, markup: &str) -> Option<PathBuf> {
        let path = self.diagnostics_path_for(identifier);
        if let Some(parent) = path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            warn!(path = %parent.display(), error = %e, "failed to create diagnostics directory");
            return None;
        }
        match tokio::fs::write(&path, markup).await {
            Ok(()) => {
                debug!(path = %path.display(), "saved landing page for triage");
                Some(path)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to save landing page");
                None
            }
        }
    }
}
