//! Content verification primitives for downloaded documents.
//!
//! Provides incremental hashing for data that streams through the transfer
//! engine, plus comparison against hex-encoded digests supplied by callers.
//! No verification policy lives here; the engine decides when a mismatch is
//! fatal.

pub use self::error::{Result, VerifyError};
pub use self::hasher::{Hasher, Sha256Hasher, verify_hex};

mod error;
mod hasher;
