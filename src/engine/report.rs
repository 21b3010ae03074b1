//! Per-run outcome tallies and the end-of-run summary.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Final classification of one episode or target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Success(PathBuf),
    /// Already on disk, either via the cache or the skip-existing check.
    Skipped(PathBuf),
    DrmBlocked,
    /// Content removed upstream.
    NotFound,
    Failed(String),
}

impl TransferOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, TransferOutcome::NotFound | TransferOutcome::Failed(_))
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub total_processed: usize,
    pub successful: Vec<String>,
    pub skipped: Vec<String>,
    pub drm_blocked: Vec<String>,
    pub failed: Vec<String>,
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            total_processed: 0,
            successful: Vec::new(),
            skipped: Vec::new(),
            drm_blocked: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Files `label` under the list matching `outcome`.
    pub fn record(&mut self, label: impl Into<String>, outcome: &TransferOutcome) {
        let label = label.into();
        self.total_processed += 1;
        match outcome {
            TransferOutcome::Success(_) => self.successful.push(label),
            TransferOutcome::Skipped(_) => self.skipped.push(label),
            TransferOutcome::DrmBlocked => self.drm_blocked.push(label),
            TransferOutcome::NotFound => {
                self.failed.push(format!("{} (content removed upstream)", label));
            }
            TransferOutcome::Failed(reason) => {
                self.failed.push(format!("{} ({})", label, reason));
            }
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Process exit status for this run.
    pub fn exit_code(&self) -> u8 {
        if self.has_failures() { 1 } else { 0 }
    }

    pub fn print_summary(&self) {
        let elapsed = Utc::now().signed_duration_since(self.started_at);
        let separator = "=".repeat(60);

        info!("{}", separator);
        info!("Downloads finished in {}s", elapsed.num_seconds());
        info!("{}", separator);
        info!("Total processed: {} videos", self.total_processed);

        info!("Downloaded: {}", self.successful.len());
        for label in &self.successful {
            info!("  - {}", label);
        }

        info!("Already present (skipped): {}", self.skipped.len());

        if !self.drm_blocked.is_empty() {
            info!("DRM protected (skipped): {}", self.drm_blocked.len());
            for label in &self.drm_blocked {
                info!("  - {}", label);
            }
        }

        if !self.failed.is_empty() {
            warn!("Failed: {}", self.failed.len());
            for label in &self.failed {
                warn!("  - {}", label);
            }
        }

        info!("{}", separator);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_classifies_outcomes() {
        let mut report = RunReport::new();
        report.record("a", &TransferOutcome::Success(PathBuf::from("a.mp4")));
        report.record("b", &TransferOutcome::Skipped(PathBuf::from("b.mp4")));
        report.record("c", &TransferOutcome::DrmBlocked);
        report.record("d", &TransferOutcome::Failed("timeout".to_string()));
        report.record("e", &TransferOutcome::NotFound);

        assert_eq!(report.total_processed, 5);
        assert_eq!(report.successful, vec!["a"]);
        assert_eq!(report.skipped, vec!["b"]);
        assert_eq!(report.drm_blocked, vec!["c"]);
        assert_eq!(report.failed, vec!["d (timeout)", "e (content removed upstream)"]);
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_drm_is_not_a_failure() {
        let mut report = RunReport::new();
        report.record("c", &TransferOutcome::DrmBlocked);
        assert!(!report.has_failures());
        assert_eq!(report.exit_code(), 0);
        assert!(!TransferOutcome::DrmBlocked.is_failure());
    }
}
