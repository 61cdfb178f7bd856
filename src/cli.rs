//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Batch retrieve documents for DOIs from a mirror site.
///
/// DOIs are read from a directory of Web of Science exports and/or given
/// directly. Existing files in the output directory are skipped, so an
/// interrupted run can simply be started again.
#[derive(Parser, Debug)]
#[command(name = "doihive")]
#[command(author, version, about)]
pub struct Args {
    /// Directory of Web of Science `*.txt` exports
    #[arg(short, long)]
    pub archive: Option<PathBuf>,

    /// Retrieve this DOI (repeatable)
    #[arg(long = "doi", value_name = "DOI")]
    pub dois: Vec<String>,

    /// Retry the DOIs listed in a `retry_dois_*.txt` file from an earlier run
    #[arg(long, value_name = "FILE")]
    pub retry_file: Option<PathBuf>,

    /// Maximum DOIs to process this run (0 = all)
    #[arg(short, long, default_value_t = 0)]
    pub budget: usize,

    /// Concurrent workers (1-100) [default: 3]
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub workers: Option<u8>,

    /// Output directory for documents [default: ./pdf]
    #[arg(short = 'o', long)]
    pub pdf_dir: Option<PathBuf>,

    /// Mirror base URL [default: https://sci-hub.se]
    #[arg(long)]
    pub mirror: Option<String>,

    /// JSON config file; flags override its values
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Base directory for run logs (default: parent of the pdf directory)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Jobs per batch slice (0 = one slice)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Seconds to wait between batch slices
    #[arg(long, value_name = "SECS")]
    pub cool_down: Option<u64>,

    /// Rate-limit/captcha share at which a slice counts as anomalous (0-1]
    #[arg(long)]
    pub max_failure_rate: Option<f64>,

    /// Only report DOI coverage of the archive, retrieve nothing
    #[arg(long, requires = "archive")]
    pub check_only: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
