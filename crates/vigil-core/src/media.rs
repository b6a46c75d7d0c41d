//! Image files written alongside verdicts.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::capture::Frame;
use crate::error::Result;

/// Writes captured frames under one directory
#[derive(Debug, Clone)]
pub struct MediaStore {
    images_dir: PathBuf,
}

impl MediaStore {
    pub fn new(images_dir: impl Into<PathBuf>) -> Self {
        Self {
            images_dir: images_dir.into(),
        }
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    pub async fn save_baseline(&self, session_id: &str, frame: &Frame) -> Result<PathBuf> {
        self.write(&format!("baseline_{}", session_id), frame).await
    }

    pub async fn save_current(&self, session_id: &str, frame: &Frame) -> Result<PathBuf> {
        self.write(&format!("current_{}", session_id), frame).await
    }

    /// On-demand capture outside any session.
    pub async fn save_capture(&self, frame: &Frame) -> Result<PathBuf> {
        self.write("capture", frame).await
    }

    async fn write(&self, prefix: &str, frame: &Frame) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.images_dir).await?;
        let path = self.images_dir.join(format!(
            "{}_{}.jpg",
            prefix,
            frame.captured_at.format("%Y%m%d_%H%M%S_%3f")
        ));
        tokio::fs::write(&path, &frame.bytes).await?;
        debug!(path = %path.display(), bytes = frame.len(), "Image saved");
        Ok(path)
    }
}

/// Delete files left behind by pruned records. Missing files are ignored.
pub async fn remove_files(paths: &[String]) -> usize {
    let mut removed = 0;
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path, error = %e, "Failed to remove media file"),
        }
    }
    removed
}
