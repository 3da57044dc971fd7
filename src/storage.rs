//! On-disk copy of the most recent upload per device.
//!
//! Each accepted upload overwrites `<dir>/d_<device_id>.jpg`. The relay never
//! reads these files back; they exist for operators and offline tooling, so a
//! failed write is reported to the caller but never blocks publication.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::error::AppResult;

#[derive(Debug, Clone)]
/// Directory holding one `d_<device_id>.jpg` per device.
pub struct UploadArchive {
    dir: PathBuf,
}

impl UploadArchive {
    /// Create the archive directory if needed.
    pub async fn create(dir: impl Into<PathBuf>) -> AppResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// Directory the archive writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final path of the file for `device_id`.
    pub fn path_for(&self, device_id: u32) -> PathBuf {
        self.dir.join(format!("d_{device_id}.jpg"))
    }

    /// Overwrite the device's file with `bytes`.
    ///
    /// Writes to a sibling temp file and renames it into place so a reader
    /// never sees a truncated JPEG.
    pub async fn store(&self, device_id: u32, bytes: &[u8]) -> AppResult<PathBuf> {
        let path = self.path_for(device_id);
        let staging = self.dir.join(format!(".d_{device_id}.jpg.part"));

        fs::write(&staging, bytes).await?;
        fs::rename(&staging, &path).await?;

        debug!(device_id, bytes = bytes.len(), path = %path.display(), "Upload persisted");
        Ok(path)
    }
}
