use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{LedgerError, Result};
use crate::record::TransferRecord;

/// Manifest file written next to the downloaded content in each directory.
pub const MANIFEST_FILE: &str = "transfers.json";

/// Batch-level audit file written under the ledger root after each run.
pub const SUMMARY_FILE: &str = "batch_summary.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    records: BTreeMap<String, TransferRecord>,
}

/// Durable map of `resource_id` to the latest completed [`TransferRecord`].
///
/// State is sharded into one JSON manifest per content directory, so the
/// metadata lives with the files it describes and partial cleanup of the
/// download tree invalidates exactly the affected records. A single
/// orchestrator instance per run is assumed; writes within a run must be
/// serialized by the caller.
pub struct Ledger {
    root: PathBuf,
}

impl Ledger {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fetch the live record for a resource, if any.
    ///
    /// `local_path` selects the manifest shard (the content file's
    /// directory). A missing manifest is an empty one; a manifest that
    /// exists but fails to parse is reported as [`LedgerError::Corrupt`] so
    /// the caller can decide whether to re-download.
    pub async fn lookup(
        &self,
        local_path: &Path,
        resource_id: &str,
    ) -> Result<Option<TransferRecord>> {
        let manifest = self.load_manifest(&self.manifest_path(local_path)).await?;
        Ok(manifest.records.get(resource_id).cloned())
    }

    /// Insert or supersede the record for `record.resource_id`.
    pub async fn record(&self, record: &TransferRecord) -> Result<()> {
        let path = self.manifest_path(&record.local_path);
        // A corrupt manifest propagates here rather than being replaced
        // wholesale; overwriting it would silently drop sibling records.
        let mut manifest = self.load_manifest(&path).await?;

        manifest
            .records
            .insert(record.resource_id.clone(), record.clone());
        debug!(resource_id = %record.resource_id, path = %path.display(), "recording transfer");
        self.store_manifest(&path, &manifest).await
    }

    /// Write the end-of-run audit document under the ledger root.
    pub async fn write_summary<T: Serialize>(&self, summary: &T) -> Result<PathBuf> {
        let path = self.root.join(SUMMARY_FILE);
        let json = serde_json::to_vec_pretty(summary).map_err(LedgerError::Encode)?;
        self.write_atomic(&path, &json).await?;
        debug!(path = %path.display(), "wrote batch summary");
        Ok(path)
    }

    fn manifest_path(&self, local_path: &Path) -> PathBuf {
        local_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone())
            .join(MANIFEST_FILE)
    }

    async fn load_manifest(&self, path: &Path) -> Result<Manifest> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Manifest::default()),
            Err(err) => {
                return Err(LedgerError::Io {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        serde_json::from_slice(&bytes).map_err(|err| LedgerError::Corrupt {
            path: path.to_path_buf(),
            source: err,
        })
    }

    async fn store_manifest(&self, path: &Path, manifest: &Manifest) -> Result<()> {
        let json = serde_json::to_vec_pretty(manifest).map_err(LedgerError::Encode)?;
        self.write_atomic(path, &json).await
    }

    /// Write via a sibling temp file and rename, so readers observe either
    /// the old manifest or the new one, never a torn write.
    async fn write_atomic(&self, path: &Path, content: &[u8]) -> Result<()> {
        let io_err = |source: std::io::Error, at: &Path| LedgerError::Io {
            path: at.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err(e, parent))?;
        }

        let tmp_path = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp_path)
                .await
                .map_err(|e| io_err(e, &tmp_path))?;
            file.write_all(content)
                .await
                .map_err(|e| io_err(e, &tmp_path))?;
            file.sync_all().await.map_err(|e| io_err(e, &tmp_path))?;
        }

        fs::rename(&tmp_path, path)
            .await
            .map_err(|e| io_err(e, path))
    }
}
