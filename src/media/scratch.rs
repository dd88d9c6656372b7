//! Per-invocation scratch directory.
//!
//! Extracted video frames are written here. The directory is removed when
//! the [`ScratchSpace`] is dropped, so every exit path (success, error,
//! timeout, cancellation) releases it.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::ProcessingError;

#[derive(Debug)]
pub struct ScratchSpace {
    dir: TempDir,
}

impl ScratchSpace {
    pub fn new() -> Result<Self, ProcessingError> {
        let dir = tempfile::Builder::new()
            .prefix("captionforge-")
            .tempdir()
            .map_err(|e| {
                ProcessingError::vision_transient(format!("failed to create scratch directory: {e}"))
            })?;
        debug!(path = %dir.path().display(), "scratch space created");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path for a named artifact inside the scratch directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Remove the directory now. Removal failures are logged, not returned.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!(path = %path.display(), error = %e, "failed to remove scratch space");
        }
    }
}
