use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted outcome of a completed transfer.
///
/// At most one live record exists per `resource_id`; a later successful
/// transfer for the same resource supersedes the prior record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub url: String,
    pub local_path: PathBuf,
    pub resource_id: String,
    pub file_size: u64,
    pub sha256_checksum: String,
    pub completed_at: DateTime<Utc>,
}

impl TransferRecord {
    pub fn new(
        url: impl Into<String>,
        local_path: impl Into<PathBuf>,
        resource_id: impl Into<String>,
        file_size: u64,
        sha256_checksum: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            local_path: local_path.into(),
            resource_id: resource_id.into(),
            file_size,
            sha256_checksum: sha256_checksum.into(),
            completed_at: Utc::now(),
        }
    }
}
