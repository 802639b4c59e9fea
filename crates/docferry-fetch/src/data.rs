//! Request, state and summary types for the transfer engine.

use std::collections::VecDeque;
use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;

/// One document to transfer. Produced by the discovery collaborator,
/// consumed once by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub url: String,
    pub local_path: PathBuf,
    /// Stable key grouping related transfers (e.g. `"GDX/fact_sheet"`),
    /// used for ledger lookups independent of the exact URL.
    pub resource_id: String,
    /// Hex-encoded SHA-256 the finished file must match. Usually absent;
    /// the target servers publish no canonical checksums.
    pub expected_checksum: Option<String>,
}

impl TransferRequest {
    pub fn new(
        url: impl Into<String>,
        local_path: impl Into<PathBuf>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            local_path: local_path.into(),
            resource_id: resource_id.into(),
            expected_checksum: None,
        }
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.expected_checksum = Some(checksum.into());
        self
    }
}

/// What the probe learned about one attempt. Recomputed per attempt,
/// never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeState {
    /// Size of any partial file already on disk.
    pub existing_bytes: u64,
    /// Remote size from the probe, when the server reported one.
    pub remote_size: Option<u64>,
    /// Whether the server advertised `Accept-Ranges: bytes`.
    pub supports_range: bool,
}

impl ResumeState {
    /// Byte offset a ranged request should start from, if resuming is
    /// worthwhile. Without confirmed range support (or a known remote
    /// size to bound the range) any partial file is rewritten from zero.
    pub fn resume_offset(&self) -> Option<u64> {
        match self.remote_size {
            Some(remote)
                if self.supports_range
                    && self.existing_bytes > 0
                    && self.existing_bytes < remote =>
            {
                Some(self.existing_bytes)
            }
            _ => None,
        }
    }

    /// A partial file at least as large as the remote is treated as
    /// complete without re-checksumming; the stale excess came from an
    /// earlier remote revision and re-downloading would not fix it.
    pub fn is_already_complete(&self) -> bool {
        matches!(
            self.remote_size,
            Some(remote) if self.supports_range
                && self.existing_bytes > 0
                && self.existing_bytes >= remote
        )
    }
}

/// Per-request result surfaced to the reporting collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct TransferOutcome {
    pub resource_id: String,
    pub url: String,
    pub local_path: PathBuf,
    pub success: bool,
    /// Bytes moved over the network by this run (resumes count only the
    /// new tail).
    pub bytes: u64,
    pub checksum: Option<String>,
    pub resumed: bool,
    pub duration_seconds: f64,
    pub error: Option<String>,
}

/// Aggregate for one batch run. Owned exclusively by the orchestrator
/// while the run is in flight; callers persist or report it afterwards.
#[derive(Debug, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_bytes: u64,
    pub elapsed_seconds: f64,
    /// Last N failure descriptions, oldest dropped first.
    pub errors: VecDeque<String>,
    #[serde(skip)]
    max_errors: usize,
}

impl BatchSummary {
    pub fn new(total: usize, max_errors: usize) -> Self {
        Self {
            total,
            downloaded: 0,
            skipped: 0,
            failed: 0,
            total_bytes: 0,
            elapsed_seconds: 0.0,
            errors: VecDeque::new(),
            max_errors,
        }
    }

    pub fn record_downloaded(&mut self, new_bytes: u64) {
        self.downloaded += 1;
        self.total_bytes += new_bytes;
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn record_failed(&mut self, error: impl Into<String>) {
        self.failed += 1;
        self.errors.push_back(error.into());
        while self.errors.len() > self.max_errors {
            self.errors.pop_front();
        }
    }

    pub fn total_mb(&self) -> f64 {
        self.total_bytes as f64 / (1024.0 * 1024.0)
    }

    pub fn download_rate_mbps(&self) -> f64 {
        self.total_mb() / self.elapsed_seconds.max(1.0)
    }

    pub fn success_rate(&self) -> f64 {
        self.downloaded as f64 / (self.total.max(1)) as f64 * 100.0
    }
}

/// Everything one batch run produced: the summary plus per-request detail.
#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub summary: BatchSummary,
    pub outcomes: Vec<TransferOutcome>,
}

impl BatchReport {
    /// Audit document written at the end of each run, with the derived
    /// metrics expanded so the file is useful without this crate.
    pub fn audit_document(&self) -> serde_json::Value {
        serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "total": self.summary.total,
            "downloaded": self.summary.downloaded,
            "skipped": self.summary.skipped,
            "failed": self.summary.failed,
            "total_bytes": self.summary.total_bytes,
            "total_mb": self.summary.total_mb(),
            "elapsed_seconds": self.summary.elapsed_seconds,
            "download_rate_mbps": self.summary.download_rate_mbps(),
            "success_rate": self.summary.success_rate(),
            "errors": &self.summary.errors,
            "details": &self.outcomes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(existing: u64, remote: Option<u64>, ranges: bool) -> ResumeState {
        ResumeState {
            existing_bytes: existing,
            remote_size: remote,
            supports_range: ranges,
        }
    }

    #[test]
    fn resume_only_with_range_support_and_known_size() {
        assert_eq!(state(100, Some(1000), true).resume_offset(), Some(100));
        assert_eq!(state(100, Some(1000), false).resume_offset(), None);
        assert_eq!(state(100, None, true).resume_offset(), None);
        assert_eq!(state(0, Some(1000), true).resume_offset(), None);
    }

    #[test]
    fn oversized_partial_counts_as_complete() {
        assert!(state(1000, Some(1000), true).is_already_complete());
        assert!(state(1500, Some(1000), true).is_already_complete());
        assert!(!state(999, Some(1000), true).is_already_complete());
        assert!(!state(1500, Some(1000), false).is_already_complete());
        assert!(!state(0, Some(0), true).is_already_complete());
    }

    #[test]
    fn error_ring_keeps_only_the_tail() {
        let mut summary = BatchSummary::new(20, 3);
        for i in 0..5 {
            summary.record_failed(format!("error {i}"));
        }
        assert_eq!(summary.failed, 5);
        assert_eq!(
            summary.errors.iter().cloned().collect::<Vec<_>>(),
            ["error 2", "error 3", "error 4"],
        );
    }

    #[test]
    fn derived_metrics_match_counts() {
        let mut summary = BatchSummary::new(4, 10);
        summary.record_downloaded(2 * 1024 * 1024);
        summary.record_downloaded(0);
        summary.record_skipped();
        summary.record_failed("boom");
        summary.elapsed_seconds = 2.0;

        assert_eq!(summary.total_mb(), 2.0);
        assert_eq!(summary.download_rate_mbps(), 1.0);
        assert_eq!(summary.success_rate(), 50.0);
    }
}
