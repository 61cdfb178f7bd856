//! Progress bar fed by worker outcomes.

use std::time::Duration;

use doihive_core::{Outcome, OutcomeObserver, OutcomeStatus};
use indicatif::{ProgressBar, ProgressStyle};

/// Advances a bar by one on every outcome.
pub(crate) struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    /// A visible bar for `total` jobs, or a hidden one when `enabled` is false.
    pub(crate) fn new(total: usize, enabled: bool) -> Self {
        let bar = if enabled {
            ProgressBar::new(u64::try_from(total).unwrap_or(u64::MAX))
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] {wide_bar} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl OutcomeObserver for ProgressObserver {
    fn on_outcome(&self, outcome: &Outcome) {
        let mark = match outcome.status {
            OutcomeStatus::Success => "ok",
            OutcomeStatus::Skip => "skip",
            OutcomeStatus::Failed => "fail",
        };
        self.bar.set_message(format!("{mark} {}", outcome.identifier));
        self.bar.inc(1);
    }
}
