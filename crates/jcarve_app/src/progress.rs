//! Progress reporting for CLI

use indicatif::{ProgressBar, ProgressStyle};
use jcarve_core::{ProgressObserver, ScanProgress, ScanSummary};
use std::time::Duration;

/// Progress reporter using indicatif
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new(total: u64) -> Self {
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{wide_bar:.cyan/blue}] {msg}")
                .expect("invalid progress bar template - this is a bug")
                .progress_chars("#>-"),
        );
        Self { bar }
    }

    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    pub fn finish(&self, summary: &ScanSummary) {
        let message = if summary.cancelled {
            format!("cancelled, {} files", summary.files_extracted())
        } else {
            format!("done, {} files", summary.files_extracted())
        };
        self.bar.finish_with_message(message);
    }
}

impl ProgressObserver for ProgressReporter {
    fn on_progress(&mut self, progress: &ScanProgress) {
        self.bar.set_position(progress.scanned_bytes);
        self.bar.set_message(status_line(progress));
    }
}

/// `12.50% 3 files -00:00:04 +00:00:28 1024.00 kB/s`
pub fn status_line(progress: &ScanProgress) -> String {
    let remaining = progress
        .estimated_remaining()
        .map(format_hms)
        .unwrap_or_else(|| "--:--:--".to_string());

    format!(
        "{:.2}% {} files -{} +{} {:.2} kB/s",
        progress.percentage(),
        progress.files_extracted,
        format_hms(progress.elapsed),
        remaining,
        progress.speed_bps() as f64 / 1024.0
    )
}

pub fn format_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    format!("{h:02}:{m:02}:{s:02}")
}
