use thiserror::Error;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    Mismatch { expected: String, actual: String },

    #[error("invalid hex digest: {0}")]
    InvalidHex(String),
}

pub type Result<T> = std::result::Result<T, VerifyError>;
