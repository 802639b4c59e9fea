//! Batch orchestration: fan-out, aggregation, cancellation.

use std::time::Instant;

use docferry_ledger::{Ledger, TransferRecord};
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::data::{BatchReport, BatchSummary, TransferOutcome, TransferRequest};
use crate::error::Result;
use crate::gate::ConcurrencyGate;
use crate::http::HttpClient;
use crate::probe::ResumeProbe;
use crate::rate::RateLimiter;
use crate::retry::RetryPolicy;
use crate::worker::{CompletedTransfer, TransferWorker};

enum Settled {
    Downloaded {
        outcome: TransferOutcome,
        record: TransferRecord,
    },
    Skipped {
        outcome: TransferOutcome,
    },
    Failed {
        outcome: TransferOutcome,
    },
}

enum Attempt {
    Completed(CompletedTransfer),
    /// The partial on disk already covers the probed remote size.
    StaleComplete,
}

/// Fans a batch of requests out across the rate limiter, gate, probe,
/// worker and retry policy, and folds every outcome into one
/// [`BatchReport`].
pub struct TransferOrchestrator<C> {
    client: C,
    ledger: Ledger,
    config: EngineConfig,
    limiter: RateLimiter,
    gate: ConcurrencyGate,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl<C: HttpClient> TransferOrchestrator<C> {
    pub fn new(client: C, ledger: Ledger, config: EngineConfig) -> Self {
        let limiter = RateLimiter::new(config.calls_per_minute);
        let gate = ConcurrencyGate::new(config.max_concurrent);
        let retry = RetryPolicy::from_config(&config);
        Self {
            client,
            ledger,
            config,
            limiter,
            gate,
            retry,
            cancel: CancellationToken::new(),
        }
    }

    /// Handle for external shutdown. Cancelling stops admitting new
    /// transfers; in-flight workers stop at their next chunk boundary,
    /// leaving resumable partial files behind.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Process every request to completion and return the aggregate.
    ///
    /// Individual failures never abort the batch: the report accounts for
    /// all requests even when every one of them failed. Only an
    /// unwritable ledger aborts the run, since the engine can no longer
    /// make durable progress.
    pub async fn run_batch(&self, requests: Vec<TransferRequest>) -> Result<BatchReport> {
        let started = Instant::now();
        info!(total = requests.len(), "starting batch run");

        let mut summary = BatchSummary::new(requests.len(), self.config.max_recorded_errors);
        let mut outcomes = Vec::with_capacity(summary.total);

        let mut in_flight: FuturesUnordered<_> = requests
            .into_iter()
            .map(|request| self.process(request))
            .collect();

        // Single mutation point: every task settles through this loop, so
        // summary counters and ledger writes never race.
        while let Some(settled) = in_flight.next().await {
            match settled {
                Settled::Downloaded { outcome, record } => {
                    self.ledger.record(&record).await?;
                    summary.record_downloaded(outcome.bytes);
                    outcomes.push(outcome);
                }
                Settled::Skipped { outcome } => {
                    summary.record_skipped();
                    outcomes.push(outcome);
                }
                Settled::Failed { outcome } => {
                    let detail = outcome
                        .error
                        .clone()
                        .unwrap_or_else(|| "unknown error".to_string());
                    summary.record_failed(detail);
                    outcomes.push(outcome);
                }
            }
        }
        drop(in_flight);

        summary.elapsed_seconds = started.elapsed().as_secs_f64();
        info!(
            downloaded = summary.downloaded,
            skipped = summary.skipped,
            failed = summary.failed,
            total_bytes = summary.total_bytes,
            "batch run finished"
        );

        let report = BatchReport { summary, outcomes };
        // Every transfer has already settled; losing the audit file is
        // not worth discarding a complete in-memory report.
        if let Err(err) = self.ledger.write_summary(&report.audit_document()).await {
            warn!(error = %err, "failed to write batch summary file");
        }
        Ok(report)
    }

    async fn process(&self, request: TransferRequest) -> Settled {
        let started = Instant::now();

        if self.cancel.is_cancelled() {
            return failed(request, "batch cancelled".to_string(), started);
        }
        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return failed(request, "batch cancelled".to_string(), started);
            }
            permit = self.gate.acquire() => permit,
        };

        let probe = ResumeProbe::new(&self.client, &self.ledger);
        if let Some(record) = probe.already_satisfied(&request).await {
            debug!(resource_id = %request.resource_id, "already satisfied, skipping");
            return skipped(request, Some(record.sha256_checksum), started);
        }

        let worker = TransferWorker::new(&self.client, &self.config, self.cancel.clone());
        let attempt = self
            .retry
            .run(|attempt| {
                let probe = &probe;
                let worker = &worker;
                let request = &request;
                let limiter = &self.limiter;
                async move {
                    if attempt > 0 {
                        debug!(attempt, url = %request.url, "retrying transfer");
                    }
                    limiter.acquire().await;
                    let state = probe.remote_state(request).await;
                    if state.is_already_complete() {
                        return Ok(Attempt::StaleComplete);
                    }
                    Ok(Attempt::Completed(worker.run(request, &state).await?))
                }
            })
            .await;

        match attempt {
            Ok(Attempt::Completed(done)) => downloaded(request, done, started),
            Ok(Attempt::StaleComplete) => {
                debug!(
                    resource_id = %request.resource_id,
                    "partial file already covers remote size, skipping"
                );
                skipped(request, None, started)
            }
            Err(err) => {
                error!(url = %request.url, error = %err, "transfer failed");
                let detail = format!("failed to download {}: {err}", request.url);
                failed(request, detail, started)
            }
        }
    }
}

fn downloaded(request: TransferRequest, done: CompletedTransfer, started: Instant) -> Settled {
    Settled::Downloaded {
        outcome: TransferOutcome {
            resource_id: request.resource_id,
            url: request.url,
            local_path: request.local_path,
            success: true,
            bytes: done.new_bytes,
            checksum: Some(done.record.sha256_checksum.clone()),
            resumed: done.resumed,
            duration_seconds: started.elapsed().as_secs_f64(),
            error: None,
        },
        record: done.record,
    }
}

fn skipped(request: TransferRequest, checksum: Option<String>, started: Instant) -> Settled {
    Settled::Skipped {
        outcome: TransferOutcome {
            resource_id: request.resource_id,
            url: request.url,
            local_path: request.local_path,
            success: true,
            bytes: 0,
            checksum,
            resumed: false,
            duration_seconds: started.elapsed().as_secs_f64(),
            error: None,
        },
    }
}

fn failed(request: TransferRequest, error: String, started: Instant) -> Settled {
    Settled::Failed {
        outcome: TransferOutcome {
            resource_id: request.resource_id,
            url: request.url,
            local_path: request.local_path,
            success: false,
            bytes: 0,
            checksum: None,
            resumed: false,
            duration_seconds: started.elapsed().as_secs_f64(),
            error: Some(error),
        },
    }
}
