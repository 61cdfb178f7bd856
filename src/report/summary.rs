//! Terminal summaries of archive checks and runs.

use std::collections::BTreeMap;

use crate::download::{FailureKind, FailureRecord, RunStatistics};
use crate::parser::ArchiveCheck;

use super::format::{format_duration, format_size};

/// Failures listed individually before the rest is elided.
pub const MAX_LISTED_FAILURES: usize = 10;

/// Groups failures by kind, kinds in declaration order.
#[must_use]
pub fn group_failures(failures: &[FailureRecord]) -> BTreeMap<FailureKind, Vec<&FailureRecord>> {
    let mut groups: BTreeMap<FailureKind, Vec<&FailureRecord>> = BTreeMap::new();
    for failure in failures {
        groups.entry(failure.kind).or_default().push(failure);
    }
    groups
}

/// Renders run statistics for the terminal.
#[must_use]
pub fn render_summary(stats: &RunStatistics) -> String {
    let mut summary = format!(
        "Download summary:\n  Total:   {}\n  Success: {}\n  Skipped: {}\n  Failed:  {}\n",
        stats.total, stats.success, stats.skip, stats.failed
    );
    if stats.total > 0 {
        summary.push_str(&format!("  Success rate: {:.2}%\n", stats.success_rate()));
    }
    if stats.total_bytes > 0 {
        summary.push_str(&format!("  Total size: {}\n", format_size(stats.total_bytes)));
    }
    summary.push_str(&format!("  Elapsed: {}\n", format_duration(stats.elapsed)));
    if let Some(per_job) = stats.mean_time_per_job().filter(|d| !d.is_zero()) {
        summary.push_str(&format!("  Wall-clock per job: {}\n", format_duration(per_job)));
    }
    if let Some(mean) = stats.mean_duration() {
        summary.push_str(&format!("  Mean job time: {}\n", format_duration(mean)));
    }
    if let Some(mean) = stats.mean_success_duration() {
        summary.push_str(&format!("  Mean success time: {}\n", format_duration(mean)));
    }

    if !stats.failures.is_empty() {
        summary.push_str(&format!("\nFailures ({}):\n", stats.failures.len()));
        for failure in stats.failures.iter().take(MAX_LISTED_FAILURES) {
            summary.push_str(&format!("  - {}: {}\n", failure.identifier, failure.reason));
        }
        if stats.failures.len() > MAX_LISTED_FAILURES {
            summary.push_str(&format!(
                "  ... and {} more\n",
                stats.failures.len() - MAX_LISTED_FAILURES
            ));
        }
    }
    summary
}

/// Renders an archive coverage report for the terminal.
#[must_use]
pub fn render_check(check: &ArchiveCheck) -> String {
    let mut report = format!(
        "Archive check:\n  Files:        {}\n  Records:      {}\n  Valid DOIs:   {} (with duplicates)\n  Unique DOIs:  {}\n  Missing DOIs: {}\n",
        check.total_files,
        check.total_records,
        check.total_dois,
        check.unique_dois,
        check.missing_dois
    );
    if check.total_records > 0 {
        report.push_str(&format!("  Coverage:     {:.2}%\n", check.coverage));
    }
    report.push_str("\nFiles:\n");
    for file in &check.files {
        if file.missing.is_empty() {
            report.push_str(&format!(
                "  {}: {} records (all have DOIs)\n",
                file.file_name, file.records
            ));
        } else {
            report.push_str(&format!(
                "  {}: {} records ({} missing DOI)\n",
                file.file_name,
                file.records,
                file.missing.len()
            ));
        }
    }
    if !check.duplicates.is_empty() {
        report.push_str(&format!("\nDuplicated DOIs: {}\n", check.duplicates.len()));
    }
    report
}
