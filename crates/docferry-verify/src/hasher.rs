use sha2::Digest;

use crate::{Result, VerifyError};

/// Incremental digest over a byte stream.
pub trait Hasher: Send {
    fn update(&mut self, data: &[u8]);
    fn finalize(self) -> Vec<u8>;
}

/// SHA-256 implementation backed by `sha2`.
pub struct Sha256Hasher(sha2::Sha256);

impl Sha256Hasher {
    pub fn new() -> Self {
        Self(sha2::Sha256::new())
    }

    /// One-shot digest of an in-memory buffer.
    pub fn digest(data: &[u8]) -> Vec<u8> {
        sha2::Sha256::digest(data).to_vec()
    }
}

impl Default for Sha256Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for Sha256Hasher {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize(self) -> Vec<u8> {
        self.0.finalize().to_vec()
    }
}

/// Compare a raw digest against a hex-encoded expectation.
///
/// The expected string is trimmed and compared case-insensitively, since
/// upstream catalogs publish digests in either case.
pub fn verify_hex(expected_hex: &str, digest: &[u8]) -> Result<()> {
    let expected_hex = expected_hex.trim();
    let expected = hex::decode(expected_hex)
        .map_err(|_| VerifyError::InvalidHex(expected_hex.to_string()))?;

    if expected == digest {
        Ok(())
    } else {
        Err(VerifyError::Mismatch {
            expected: expected_hex.to_ascii_lowercase(),
            actual: hex::encode(digest),
        })
    }
}
