//! Pre-transfer probing: ledger short-circuit and resume discovery.

use std::path::Path;

use docferry_ledger::{Ledger, TransferRecord};
use tokio::fs;
use tracing::{debug, warn};

use crate::data::{ResumeState, TransferRequest};
use crate::http::HttpClient;

/// Decides what a transfer attempt should do before any bytes move.
pub struct ResumeProbe<'a, C> {
    client: &'a C,
    ledger: &'a Ledger,
}

impl<'a, C: HttpClient> ResumeProbe<'a, C> {
    pub fn new(client: &'a C, ledger: &'a Ledger) -> Self {
        Self { client, ledger }
    }

    /// Cross-run idempotence check, resolved without any network call.
    ///
    /// Satisfied only when a ledger record exists *and* the file on disk
    /// still has the recorded size; an externally deleted or truncated
    /// file forces a re-download. An unreadable manifest is downgraded to
    /// "not satisfied" so one corrupt metadata file cannot wedge a batch.
    pub async fn already_satisfied(&self, request: &TransferRequest) -> Option<TransferRecord> {
        let existing = file_size(&request.local_path).await;
        if existing == 0 {
            return None;
        }

        match self
            .ledger
            .lookup(&request.local_path, &request.resource_id)
            .await
        {
            Ok(Some(record)) if record.file_size == existing => {
                debug!(resource_id = %request.resource_id, size = existing, "ledger record matches disk");
                Some(record)
            }
            Ok(_) => None,
            Err(err) => {
                warn!(
                    resource_id = %request.resource_id,
                    error = %err,
                    "unreadable ledger manifest, treating as unsatisfied"
                );
                None
            }
        }
    }

    /// Probe the remote for size and range support.
    ///
    /// Probe failures are not transfer failures: the worker falls back to
    /// a full restart, and the GET itself reports anything genuinely
    /// wrong with the document.
    pub async fn remote_state(&self, request: &TransferRequest) -> ResumeState {
        let existing_bytes = file_size(&request.local_path).await;

        match self.client.probe(&request.url).await {
            Ok(info) => ResumeState {
                existing_bytes,
                remote_size: info.size,
                supports_range: info.supports_range,
            },
            Err(err) => {
                warn!(url = %request.url, error = %err, "probe failed, falling back to full transfer");
                ResumeState {
                    existing_bytes,
                    remote_size: None,
                    supports_range: false,
                }
            }
        }
    }
}

async fn file_size(path: &Path) -> u64 {
    fs::metadata(path).await.map(|meta| meta.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tempfile::TempDir;

    use crate::error::{FetchError, Result};
    use crate::http::{FetchResponse, RemoteInfo};

    struct StubClient {
        info: Option<RemoteInfo>,
        probes: AtomicUsize,
    }

    impl StubClient {
        fn with_info(info: RemoteInfo) -> Self {
            Self {
                info: Some(info),
                probes: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                info: None,
                probes: AtomicUsize::new(0),
            }
        }
    }

    impl HttpClient for StubClient {
        async fn probe(&self, url: &str) -> Result<RemoteInfo> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            self.info.ok_or_else(|| FetchError::Connect(format!("no route to {url}")))
        }

        async fn get(&self, _url: &str, _resume_from: Option<u64>) -> Result<FetchResponse> {
            unreachable!("probe tests never open a body")
        }
    }

    fn request_in(dir: &TempDir) -> TransferRequest {
        TransferRequest::new(
            "https://example.com/fact_sheet.pdf",
            dir.path().join("fact_sheet.pdf"),
            "GDX/fact_sheet",
        )
    }

    async fn seed(ledger: &Ledger, request: &TransferRequest, recorded: u64) {
        let record = TransferRecord::new(
            &request.url,
            &request.local_path,
            &request.resource_id,
            recorded,
            "cd".repeat(32),
        );
        ledger.record(&record).await.unwrap();
    }

    #[tokio::test]
    async fn matching_record_short_circuits_without_network() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::new(dir.path());
        let request = request_in(&dir);
        std::fs::write(&request.local_path, b"hello").unwrap();
        seed(&ledger, &request, 5).await;

        let client = StubClient::with_info(RemoteInfo {
            size: Some(5),
            supports_range: true,
        });
        let probe = ResumeProbe::new(&client, &ledger);

        assert!(probe.already_satisfied(&request).await.is_some());
        assert_eq!(client.probes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn size_drift_forces_redownload() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::new(dir.path());
        let request = request_in(&dir);
        std::fs::write(&request.local_path, b"hel").unwrap();
        seed(&ledger, &request, 5).await;

        let client = StubClient::failing();
        let probe = ResumeProbe::new(&client, &ledger);
        assert!(probe.already_satisfied(&request).await.is_none());
    }

    #[tokio::test]
    async fn missing_file_is_never_satisfied() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::new(dir.path());
        let request = request_in(&dir);
        seed(&ledger, &request, 5).await;

        let client = StubClient::failing();
        let probe = ResumeProbe::new(&client, &ledger);
        assert!(probe.already_satisfied(&request).await.is_none());
    }

    #[tokio::test]
    async fn corrupt_manifest_is_treated_as_unsatisfied() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::new(dir.path());
        let request = request_in(&dir);
        std::fs::write(&request.local_path, b"hello").unwrap();
        std::fs::write(dir.path().join(docferry_ledger::MANIFEST_FILE), b"{oops").unwrap();

        let client = StubClient::failing();
        let probe = ResumeProbe::new(&client, &ledger);
        assert!(probe.already_satisfied(&request).await.is_none());
    }

    #[tokio::test]
    async fn remote_state_carries_probe_results() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::new(dir.path());
        let request = request_in(&dir);
        std::fs::write(&request.local_path, b"part").unwrap();

        let client = StubClient::with_info(RemoteInfo {
            size: Some(1000),
            supports_range: true,
        });
        let probe = ResumeProbe::new(&client, &ledger);
        let state = probe.remote_state(&request).await;

        assert_eq!(state.existing_bytes, 4);
        assert_eq!(state.remote_size, Some(1000));
        assert!(state.supports_range);
        assert_eq!(state.resume_offset(), Some(4));
    }

    #[tokio::test]
    async fn probe_failure_degrades_to_full_restart() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::new(dir.path());
        let request = request_in(&dir);
        std::fs::write(&request.local_path, b"part").unwrap();

        let client = StubClient::failing();
        let probe = ResumeProbe::new(&client, &ledger);
        let state = probe.remote_state(&request).await;

        assert_eq!(state.existing_bytes, 4);
        assert_eq!(state.remote_size, None);
        assert!(!state.supports_range);
        assert_eq!(state.resume_offset(), None);
    }
}
