use crate::util::size::{human_size, savings_ratio};
use log::{info, warn};
use owo_colors::OwoColorize;
use std::path::Path;

/// Running counters for one batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    /// Files that passed the format and time filters.
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Successes where the original was kept because the result was not smaller.
    pub unchanged: usize,
}

impl Summary {
    pub fn new(total: usize, skipped: usize) -> Self {
        Self {
            total,
            skipped,
            ..Default::default()
        }
    }

    pub fn record_written(&mut self, from: &Path, to: &Path, before: u64, after: u64) {
        self.succeeded += 1;
        info!(
            "{} {} -> {}",
            "✓".green(),
            from.display(),
            to.display()
        );
        info!(
            "    {} -> {}, saved {:.2}%",
            human_size(before),
            human_size(after),
            savings_ratio(before, after)
        );
    }

    pub fn record_unchanged(&mut self, path: &Path, before: u64, after: u64) {
        self.succeeded += 1;
        self.unchanged += 1;
        info!(
            "{} {} kept original ({} <= {})",
            "✓".green(),
            path.display(),
            human_size(before),
            human_size(after)
        );
    }

    pub fn record_failure(&mut self, path: &Path, err: &anyhow::Error) {
        self.failed += 1;
        warn!("{} {}: {err:#}", "✗".red(), path.display());
    }

    pub fn log(&self) {
        info!("=== Done ===");
        info!(
            "total: {}, succeeded: {}, failed: {}, skipped: {}, unchanged: {}",
            self.total, self.succeeded, self.failed, self.skipped, self.unchanged
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counters() {
        let mut summary = Summary::new(3, 2);
        summary.record_written(Path::new("a.png"), Path::new("a.png"), 100, 50);
        summary.record_unchanged(Path::new("b.png"), 100, 120);
        summary.record_failure(Path::new("c.png"), &anyhow::anyhow!("boom"));

        assert_eq!(
            summary,
            Summary {
                total: 3,
                succeeded: 2,
                failed: 1,
                skipped: 2,
                unchanged: 1,
            }
        );
    }
}
