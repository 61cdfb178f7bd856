//! Run reports: terminal summaries and timestamped log files.

mod format;
mod logger;
mod summary;

pub use format::{format_duration, format_size};
pub use logger::{LogPaths, ReportError, RunLogger, parse_retry_list};
pub use summary::{MAX_LISTED_FAILURES, group_failures, render_check, render_summary};
