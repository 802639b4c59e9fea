//! One resumable, checksummed transfer attempt.

use std::path::Path;

use docferry_ledger::TransferRecord;
use docferry_verify::{Hasher, Sha256Hasher, verify_hex};
use futures_util::TryStreamExt;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::data::{ResumeState, TransferRequest};
use crate::error::{FetchError, Result};
use crate::http::{BodyKind, HttpClient};

/// Result of one successful attempt.
#[derive(Debug)]
pub struct CompletedTransfer {
    pub record: TransferRecord,
    /// Bytes actually moved over the network; a resume counts only the
    /// appended tail.
    pub new_bytes: u64,
    pub resumed: bool,
}

/// Streams one document to disk, honouring a [`ResumeState`].
///
/// The worker exclusively owns `local_path` for the duration of the
/// attempt. On mid-stream failure the partial file is left in place so a
/// later run can resume from it; only zero-length leftovers are removed.
pub struct TransferWorker<'a, C> {
    client: &'a C,
    config: &'a EngineConfig,
    cancel: CancellationToken,
}

impl<'a, C: HttpClient> TransferWorker<'a, C> {
    pub fn new(client: &'a C, config: &'a EngineConfig, cancel: CancellationToken) -> Self {
        Self {
            client,
            config,
            cancel,
        }
    }

    pub async fn run(
        &self,
        request: &TransferRequest,
        resume: &ResumeState,
    ) -> Result<CompletedTransfer> {
        let offset = resume.resume_offset();
        let response = self.client.get(&request.url, offset).await?;

        let mut base = offset.unwrap_or(0);
        let mut resumed = base > 0;
        // Some servers silently ignore Range and answer 200 with the whole
        // document; appending that would corrupt the file.
        if resumed && response.kind == BodyKind::Full {
            warn!(url = %request.url, "server ignored range request, restarting from byte 0");
            base = 0;
            resumed = false;
        }

        if let Some(parent) = request.local_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }

        let path = &request.local_path;
        let mut file = if resumed {
            OpenOptions::new().append(true).open(path).await
        } else {
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)
                .await
        }
        .map_err(|e| io_error(path, e))?;

        debug!(url = %request.url, offset = base, "streaming transfer");
        let mut body = response.body;
        let mut written: u64 = 0;
        loop {
            let chunk = match body.try_next().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(err) => {
                    drop(file);
                    self.discard_if_empty(path).await;
                    return Err(err);
                }
            };

            // A cancelled batch stops at a chunk boundary: everything
            // already written stays a valid prefix for the next run.
            if self.cancel.is_cancelled() {
                file.flush().await.map_err(|e| io_error(path, e))?;
                return Err(FetchError::Cancelled);
            }

            file.write_all(&chunk)
                .await
                .map_err(|e| io_error(path, e))?;
            written += chunk.len() as u64;
        }

        file.sync_all().await.map_err(|e| io_error(path, e))?;
        drop(file);

        let total = base + written;
        if written == 0 {
            // An empty payload for a document that was supposed to have
            // content; recording it would enshrine a placeholder file.
            self.discard_if_empty(path).await;
            return Err(FetchError::EmptyBody);
        }

        if let Some(remote) = resume.remote_size {
            if total != remote {
                // Advertised sizes are unreliable for generated documents;
                // keep the transfer and leave a trace for operators.
                warn!(
                    url = %request.url,
                    expected = remote,
                    actual = total,
                    "size mismatch against probed remote size"
                );
            }
        }

        let digest = self.hash_file(path).await?;
        if let Some(expected) = &request.expected_checksum {
            verify_hex(expected, &digest)?;
        }
        let checksum = hex::encode(&digest);

        debug!(url = %request.url, bytes = total, new_bytes = written, "transfer complete");
        Ok(CompletedTransfer {
            record: TransferRecord::new(
                &request.url,
                &request.local_path,
                &request.resource_id,
                total,
                checksum,
            ),
            new_bytes: written,
            resumed,
        })
    }

    /// SHA-256 of the finished file, read back in fixed-size chunks so
    /// memory use stays flat for arbitrarily large documents.
    async fn hash_file(&self, path: &Path) -> Result<Vec<u8>> {
        let mut file = fs::File::open(path).await.map_err(|e| io_error(path, e))?;
        let mut hasher = Sha256Hasher::new();
        let mut buffer = vec![0u8; self.config.chunk_size.max(512)];
        loop {
            let n = file.read(&mut buffer).await.map_err(|e| io_error(path, e))?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        Ok(hasher.finalize())
    }

    async fn discard_if_empty(&self, path: &Path) {
        if let Ok(meta) = fs::metadata(path).await {
            if meta.len() == 0 {
                let _ = fs::remove_file(path).await;
            }
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> FetchError {
    FetchError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use bytes::Bytes;
    use futures_util::stream;
    use tempfile::TempDir;

    use crate::http::{ByteStream, FetchResponse, RemoteInfo};

    /// Plays back a scripted response per `get` call.
    struct ScriptedClient {
        responses: Mutex<Vec<ScriptedResponse>>,
        calls: Mutex<Vec<Option<u64>>>,
    }

    struct ScriptedResponse {
        kind: BodyKind,
        chunks: Vec<Result<Bytes>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<ScriptedResponse>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn single(kind: BodyKind, chunks: Vec<Result<Bytes>>) -> Self {
            Self::new(vec![ScriptedResponse { kind, chunks }])
        }

        fn calls(&self) -> Vec<Option<u64>> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl HttpClient for ScriptedClient {
        async fn probe(&self, _url: &str) -> Result<RemoteInfo> {
            unreachable!("worker tests supply ResumeState directly")
        }

        async fn get(&self, _url: &str, resume_from: Option<u64>) -> Result<FetchResponse> {
            self.calls.lock().unwrap().push(resume_from);
            let scripted = self.responses.lock().unwrap().remove(0);
            let body: ByteStream = Box::pin(stream::iter(scripted.chunks));
            Ok(FetchResponse {
                kind: scripted.kind,
                content_length: None,
                body,
            })
        }
    }

    fn chunks_of(data: &[u8], size: usize) -> Vec<Result<Bytes>> {
        data.chunks(size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect()
    }

    fn state(existing: u64, remote: Option<u64>, ranges: bool) -> ResumeState {
        ResumeState {
            existing_bytes: existing,
            remote_size: remote,
            supports_range: ranges,
        }
    }

    fn request_in(dir: &TempDir) -> TransferRequest {
        TransferRequest::new(
            "https://example.com/holdings.csv",
            dir.path().join("holdings.csv"),
            "GDX/holdings",
        )
    }

    #[tokio::test]
    async fn fresh_transfer_writes_and_records() {
        let dir = TempDir::new().unwrap();
        let request = request_in(&dir);
        let body = b"ticker,weight\nGDX,1.0\n";
        let client = ScriptedClient::single(BodyKind::Full, chunks_of(body, 8));
        let config = EngineConfig::default();
        let worker = TransferWorker::new(&client, &config, CancellationToken::new());

        let done = worker
            .run(&request, &state(0, Some(body.len() as u64), true))
            .await
            .unwrap();

        assert_eq!(std::fs::read(&request.local_path).unwrap(), body);
        assert_eq!(done.new_bytes, body.len() as u64);
        assert!(!done.resumed);
        assert_eq!(done.record.file_size, body.len() as u64);
        assert_eq!(
            done.record.sha256_checksum,
            hex::encode(Sha256Hasher::digest(body)),
        );
        assert_eq!(client.calls(), vec![None]);
    }

    #[tokio::test]
    async fn resume_appends_the_missing_tail() {
        let dir = TempDir::new().unwrap();
        let request = request_in(&dir);
        let body = b"0123456789abcdef";
        std::fs::write(&request.local_path, &body[..6]).unwrap();

        let client = ScriptedClient::single(BodyKind::Partial, chunks_of(&body[6..], 4));
        let config = EngineConfig::default();
        let worker = TransferWorker::new(&client, &config, CancellationToken::new());

        let done = worker
            .run(&request, &state(6, Some(body.len() as u64), true))
            .await
            .unwrap();

        assert_eq!(std::fs::read(&request.local_path).unwrap(), body);
        assert_eq!(done.new_bytes, (body.len() - 6) as u64);
        assert!(done.resumed);
        assert_eq!(
            done.record.sha256_checksum,
            hex::encode(Sha256Hasher::digest(body)),
        );
        assert_eq!(client.calls(), vec![Some(6)]);
    }

    #[tokio::test]
    async fn ignored_range_restarts_from_scratch() {
        let dir = TempDir::new().unwrap();
        let request = request_in(&dir);
        let body = b"full document body";
        std::fs::write(&request.local_path, b"stale prefix").unwrap();

        // Server answers 200 with the whole document despite the range.
        let client = ScriptedClient::single(BodyKind::Full, chunks_of(body, 5));
        let config = EngineConfig::default();
        let worker = TransferWorker::new(&client, &config, CancellationToken::new());

        let done = worker
            .run(&request, &state(12, Some(body.len() as u64), true))
            .await
            .unwrap();

        // Not a corrupt concatenation: the file is exactly the fresh body.
        assert_eq!(std::fs::read(&request.local_path).unwrap(), body);
        assert!(!done.resumed);
        assert_eq!(done.record.file_size, body.len() as u64);
        assert_eq!(client.calls(), vec![Some(12)]);
    }

    #[tokio::test]
    async fn empty_body_is_a_failure_not_a_placeholder() {
        let dir = TempDir::new().unwrap();
        let request = request_in(&dir);
        let client = ScriptedClient::single(BodyKind::Full, Vec::new());
        let config = EngineConfig::default();
        let worker = TransferWorker::new(&client, &config, CancellationToken::new());

        let err = worker.run(&request, &state(0, None, false)).await.unwrap_err();
        assert!(matches!(err, FetchError::EmptyBody));
        assert!(!request.local_path.exists());
    }

    #[tokio::test]
    async fn mid_stream_failure_leaves_the_partial_file() {
        let dir = TempDir::new().unwrap();
        let request = request_in(&dir);
        let chunks = vec![
            Ok(Bytes::from_static(b"first chunk ")),
            Err(FetchError::Stream("connection reset".into())),
        ];
        let client = ScriptedClient::single(BodyKind::Full, chunks);
        let config = EngineConfig::default();
        let worker = TransferWorker::new(&client, &config, CancellationToken::new());

        let err = worker.run(&request, &state(0, None, false)).await.unwrap_err();
        assert!(matches!(err, FetchError::Stream(_)));
        assert_eq!(
            std::fs::read(&request.local_path).unwrap(),
            b"first chunk ",
        );
    }

    #[tokio::test]
    async fn checksum_mismatch_fails_the_transfer() {
        let dir = TempDir::new().unwrap();
        let request = request_in(&dir).with_checksum("ab".repeat(32));
        let client = ScriptedClient::single(BodyKind::Full, chunks_of(b"payload", 7));
        let config = EngineConfig::default();
        let worker = TransferWorker::new(&client, &config, CancellationToken::new());

        let err = worker.run(&request, &state(0, None, false)).await.unwrap_err();
        assert!(matches!(err, FetchError::Verify(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn matching_expected_checksum_passes() {
        let dir = TempDir::new().unwrap();
        let body = b"annual report";
        let request = request_in(&dir).with_checksum(hex::encode(Sha256Hasher::digest(body)));
        let client = ScriptedClient::single(BodyKind::Full, chunks_of(body, 4));
        let config = EngineConfig::default();
        let worker = TransferWorker::new(&client, &config, CancellationToken::new());

        worker.run(&request, &state(0, None, false)).await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_stops_at_a_chunk_boundary() {
        let dir = TempDir::new().unwrap();
        let request = request_in(&dir);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let client = ScriptedClient::single(BodyKind::Full, chunks_of(b"0123456789", 2));
        let config = EngineConfig::default();
        let worker = TransferWorker::new(&client, &config, cancel);

        let err = worker.run(&request, &state(0, None, false)).await.unwrap_err();
        assert!(matches!(err, FetchError::Cancelled));
        // Nothing was written after the cancellation point.
        assert_eq!(std::fs::read(&request.local_path).unwrap(), b"");
    }
}
