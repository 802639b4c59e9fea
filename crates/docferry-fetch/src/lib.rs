//! Batched HTTP document transfer with resume, rate limiting and integrity
//! bookkeeping.
//!
//! The engine pulls large sets of remote documents from servers that offer
//! no API contract: content-type headers lie, range support is optional,
//! and links rot. Its job is not "download a file" but downloading many
//! files reliably, without overwhelming the remote host, while surviving
//! interruption and re-runs.
//!
//! # Components
//!
//! - [`RateLimiter`] - request budget per rolling minute
//! - [`ConcurrencyGate`] - bound on simultaneous transfers
//! - [`ResumeProbe`] - ledger short-circuit and range-support discovery
//! - [`TransferWorker`] - one streamed, checksummed transfer attempt
//! - [`RetryPolicy`] - bounded exponential backoff over transient failures
//! - [`TransferOrchestrator`] - fans a batch out and folds a [`BatchSummary`]
//!
//! The HTTP transport is abstracted behind [`HttpClient`] so tests (and
//! alternative stacks) substitute fakes without process-wide side effects;
//! [`ReqwestClient`] is the production implementation behind the default
//! `reqwest` feature.

pub use batch::TransferOrchestrator;
pub use config::EngineConfig;
pub use data::{BatchReport, BatchSummary, ResumeState, TransferOutcome, TransferRequest};
pub use error::{FetchError, Result};
pub use gate::ConcurrencyGate;
pub use http::{BodyKind, BoxStream, ByteStream, FetchResponse, HttpClient, RemoteInfo};
pub use probe::ResumeProbe;
pub use rate::RateLimiter;
pub use retry::RetryPolicy;
pub use worker::{CompletedTransfer, TransferWorker};

#[cfg(feature = "reqwest")]
pub use http::ReqwestClient;

// Persistence types callers need alongside the engine.
pub use docferry_ledger::{Ledger, TransferRecord};

mod batch;
mod config;
mod data;
mod error;
mod gate;
mod http;
mod probe;
mod rate;
mod retry;
mod worker;
