//! Timestamped run log files.
//!
//! Each run writes into `<base>/logs/`:
//!
//! | File | Content |
//! |------|---------|
//! | `download_log_<ts>.txt` | statistics and failures grouped by kind |
//! | `failed_dois_<ts>.txt` | `DOI \| reason` lines with per-kind counts |
//! | `retry_dois_<ts>.txt` | failed DOIs only, one per line, for a rerun |
//! | `run_summary_<ts>.json` | the statistics as JSON |
//!
//! The two failure files are skipped when nothing failed.

use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;
use tracing::{debug, info};

use crate::download::RunStatistics;

use super::format::{format_duration, format_size};
use super::summary::group_failures;

const LOG_DIR: &str = "logs";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
const HEADER_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors from writing run logs.
#[derive(Debug, Error)]
pub enum ReportError {
    /// A log file or the log directory could not be written.
    #[error("cannot write {path}: {source}")]
    Io {
        /// The path being written.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The statistics could not be serialized.
    #[error("cannot serialize run summary: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Paths of the files one run writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPaths {
    /// Full statistics log.
    pub download_log: PathBuf,
    /// Failed DOIs with reasons.
    pub failed_dois: PathBuf,
    /// Failed DOIs only.
    pub retry_dois: PathBuf,
    /// JSON statistics.
    pub summary_json: PathBuf,
}

/// Writes one run's log files under a fixed timestamp.
#[derive(Debug, Clone)]
pub struct RunLogger {
    dir: PathBuf,
    timestamp: String,
}

impl RunLogger {
    /// Creates `<base_dir>/logs` and stamps the logger with the current local time.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Io`] if the log directory cannot be created.
    pub fn new(base_dir: &Path) -> Result<Self, ReportError> {
        Self::with_timestamp(base_dir, Local::now().format(TIMESTAMP_FORMAT).to_string())
    }

    /// Like [`new`](Self::new) with an explicit timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Io`] if the log directory cannot be created.
    pub fn with_timestamp(base_dir: &Path, timestamp: impl Into<String>) -> Result<Self, ReportError> {
        let dir = base_dir.join(LOG_DIR);
        std::fs::create_dir_all(&dir).map_err(|source| ReportError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            timestamp: timestamp.into(),
        })
    }

    /// The log directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where this run's files go.
    #[must_use]
    pub fn paths(&self) -> LogPaths {
        let ts = &self.timestamp;
        LogPaths {
            download_log: self.dir.join(format!("download_log_{ts}.txt")),
            failed_dois: self.dir.join(format!("failed_dois_{ts}.txt")),
            retry_dois: self.dir.join(format!("retry_dois_{ts}.txt")),
            summary_json: self.dir.join(format!("run_summary_{ts}.json")),
        }
    }

    /// Writes every log file for `stats` and returns the paths written.
    ///
    /// # Errors
    ///
    /// Returns the first [`ReportError`] encountered.
    pub fn write_all(&self, stats: &RunStatistics) -> Result<Vec<PathBuf>, ReportError> {
        let paths = self.paths();
        let mut written = Vec::with_capacity(4);

        write_file(&paths.download_log, &render_download_log(stats))?;
        written.push(paths.download_log);

        let json = serde_json::to_string_pretty(stats)?;
        write_file(&paths.summary_json, &json)?;
        written.push(paths.summary_json);

        if !stats.failures.is_empty() {
            write_file(&paths.failed_dois, &render_failed_dois(stats))?;
            written.push(paths.failed_dois);
            write_file(&paths.retry_dois, &render_retry_dois(stats))?;
            written.push(paths.retry_dois);
        }

        info!(dir = %self.dir.display(), files = written.len(), "run logs written");
        Ok(written)
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), ReportError> {
    std::fs::write(path, contents).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "wrote log file");
    Ok(())
}

fn now_header() -> String {
    Local::now().format(HEADER_TIME_FORMAT).to_string()
}

fn render_download_log(stats: &RunStatistics) -> String {
    let rule = "=".repeat(40);
    let mut log = format!(
        "{rule}\n      DoiHive download log\n{rule}\n\nGenerated: {}\n\n=== Statistics ===\n\n",
        now_header()
    );
    log.push_str(&format!(
        "Total:   {}\nSuccess: {}\nSkipped: {}\nFailed:  {}\n",
        stats.total, stats.success, stats.skip, stats.failed
    ));
    if stats.total > 0 {
        log.push_str(&format!("Success rate: {:.2}%\n", stats.success_rate()));
    }
    if stats.total_bytes > 0 {
        log.push_str(&format!("Total size: {}\n", format_size(stats.total_bytes)));
    }
    log.push_str(&format!("Elapsed: {}\n", format_duration(stats.elapsed)));
    if let Some(mean) = stats.mean_duration() {
        log.push_str(&format!("Mean job time: {}\n", format_duration(mean)));
    }
    if let Some(mean) = stats.mean_success_duration() {
        log.push_str(&format!("Mean success time: {}\n", format_duration(mean)));
    }

    if !stats.failures.is_empty() {
        log.push_str(&format!("\n=== Failures ({}) ===\n\n", stats.failures.len()));
        for (kind, records) in group_failures(&stats.failures) {
            log.push_str(&format!("--- {} ({}) ---\n", kind.label(), records.len()));
            for record in records {
                log.push_str(&format!("  - {}\n", record.identifier));
            }
            log.push('\n');
        }
    }
    log.push_str(&format!("\n{rule}\nEnd of log\n{rule}\n"));
    log
}

fn render_failed_dois(stats: &RunStatistics) -> String {
    let mut list = format!(
        "# Failed DOIs\n# Generated: {}\n# Total: {}\n#\n# Format: DOI | reason\n#\n\n# === Counts by kind ===\n",
        now_header(),
        stats.failures.len()
    );
    for (kind, records) in group_failures(&stats.failures) {
        list.push_str(&format!("# {}: {}\n", kind.label(), records.len()));
    }
    list.push_str("#\n\n# === Details ===\n\n");
    for failure in &stats.failures {
        list.push_str(&format!("{} | {}\n", failure.identifier, failure.reason));
    }
    list
}

fn render_retry_dois(stats: &RunStatistics) -> String {
    let mut list = format!(
        "# DOIs to retry\n# Generated: {}\n# Total: {}\n#\n\n",
        now_header(),
        stats.failures.len()
    );
    for failure in &stats.failures {
        list.push_str(&failure.identifier);
        list.push('\n');
    }
    list
}

/// Reads DOIs back from a `retry_dois_*.txt` file, skipping comments and blanks.
#[must_use]
pub fn parse_retry_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
