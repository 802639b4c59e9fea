//! Persisted transfer records for cross-run idempotence.
//!
//! Completed transfers are recorded in a JSON manifest stored alongside the
//! downloaded content, one manifest per directory. A later run consults the
//! manifest before touching the network, so re-running a batch against an
//! unchanged remote performs zero transfers.
//!
//! Records are superseded, never deleted: a new successful transfer for the
//! same resource overwrites the prior entry. Manifest writes go through a
//! temp-file-and-rename so a crash mid-write never corrupts existing state.

pub use self::error::{LedgerError, Result};
pub use self::ledger::{Ledger, MANIFEST_FILE, SUMMARY_FILE};
pub use self::record::TransferRecord;

mod error;
mod ledger;
mod record;
