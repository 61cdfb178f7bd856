//! Archive directories of Web of Science exports.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::error::ArchiveError;
use super::wos::{doi_from_record, is_valid_doi, parse_wos_records};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const EXPORT_EXTENSION: &str = "txt";

/// A record without a usable DOI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingRecord {
    /// Zero-based record index within its file.
    pub index: usize,
    /// The record's lines joined with newlines.
    pub content: String,
}

/// Per-file DOI coverage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCheck {
    /// File name without directory.
    pub file_name: String,
    /// Records in the file.
    pub records: usize,
    /// Records with a valid DOI.
    pub valid_dois: usize,
    /// Records missing a valid DOI.
    pub missing: Vec<MissingRecord>,
}

/// Coverage report over a whole archive directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchiveCheck {
    /// `.txt` files found.
    pub total_files: usize,
    /// Records across readable files.
    pub total_records: usize,
    /// Valid DOIs, duplicates included.
    pub total_dois: usize,
    /// Distinct valid DOIs.
    pub unique_dois: usize,
    /// Records with no valid DOI.
    pub missing_dois: usize,
    /// `total_dois / total_records` as a percentage.
    pub coverage: f64,
    /// Readable files, in name order.
    pub files: Vec<FileCheck>,
    /// DOIs seen more than once, with per-file occurrence counts.
    pub duplicates: BTreeMap<String, BTreeMap<String, usize>>,
}

/// Reads an export file, dropping a UTF-8 BOM and replacing invalid bytes.
///
/// # Errors
///
/// Returns the IO error if the file cannot be read.
pub fn read_archive_text(path: &Path) -> std::io::Result<String> {
    let data = std::fs::read(path)?;
    let body = data.strip_prefix(UTF8_BOM).unwrap_or(&data);
    Ok(String::from_utf8_lossy(body).into_owned())
}

/// Lists `*.txt` files directly inside `dir`, sorted by path.
///
/// # Errors
///
/// Returns [`ArchiveError::MissingDirectory`] or [`ArchiveError::Io`].
pub fn archive_files(dir: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    if !dir.is_dir() {
        return Err(ArchiveError::MissingDirectory {
            path: dir.to_path_buf(),
        });
    }
    let entries = std::fs::read_dir(dir).map_err(|e| ArchiveError::io(dir, e))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file() && path.extension().is_some_and(|ext| ext == EXPORT_EXTENSION)
        })
        .collect();
    files.sort();
    debug!(dir = %dir.display(), count = files.len(), "found export files");
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Reports DOI coverage for every export in `dir`.
///
/// Unreadable files are skipped with a warning.
///
/// # Errors
///
/// Returns [`ArchiveError::NoTextFiles`] if the directory holds no exports.
pub fn check_archive(dir: &Path) -> Result<ArchiveCheck, ArchiveError> {
    let paths = archive_files(dir)?;
    if paths.is_empty() {
        return Err(ArchiveError::NoTextFiles {
            path: dir.to_path_buf(),
        });
    }

    let mut check = ArchiveCheck {
        total_files: paths.len(),
        ..ArchiveCheck::default()
    };
    let mut occurrences: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();

    for path in &paths {
        let text = match read_archive_text(path) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable export");
                continue;
            }
        };
        let name = file_name(path);
        let records = parse_wos_records(&text);
        let mut file = FileCheck {
            file_name: name.clone(),
            records: records.len(),
            valid_dois: 0,
            missing: Vec::new(),
        };

        for (index, record) in records.iter().enumerate() {
            match doi_from_record(record.as_slice()).filter(|doi| is_valid_doi(doi)) {
                Some(doi) => {
                    file.valid_dois += 1;
                    *occurrences
                        .entry(doi)
                        .or_default()
                        .entry(name.clone())
                        .or_default() += 1;
                }
                None => file.missing.push(MissingRecord {
                    index,
                    content: record.join("\n"),
                }),
            }
        }

        check.total_records += file.records;
        check.total_dois += file.valid_dois;
        check.missing_dois += file.missing.len();
        check.files.push(file);
    }

    check.unique_dois = occurrences.len();
    if check.total_records > 0 {
        #[allow(clippy::cast_precision_loss)]
        let coverage = check.total_dois as f64 / check.total_records as f64 * 100.0;
        check.coverage = coverage;
    }
    check.duplicates = occurrences
        .into_iter()
        .filter(|(_, files)| files.values().sum::<usize>() > 1)
        .collect();

    info!(
        files = check.total_files,
        records = check.total_records,
        dois = check.total_dois,
        unique = check.unique_dois,
        "archive checked"
    );
    Ok(check)
}

/// All distinct valid DOIs in `dir`, in first-seen order.
///
/// # Errors
///
/// Returns [`ArchiveError::MissingDirectory`] or [`ArchiveError::Io`].
pub fn extract_archive_dois(dir: &Path) -> Result<Vec<String>, ArchiveError> {
    let mut seen = HashSet::new();
    let mut dois = Vec::new();
    for path in archive_files(dir)? {
        let text = match read_archive_text(&path) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable export");
                continue;
            }
        };
        for doi in super::wos::dois_from_text(&text) {
            if seen.insert(doi.clone()) {
                dois.push(doi);
            }
        }
    }
    debug!(count = dois.len(), "extracted unique DOIs");
    Ok(dois)
}
