//! Demo asset fetching (behind the `demo-assets` feature).
//!
//! Downloads a small sample clip so the pipeline can be exercised without
//! supplying footage. Skips the download when the file is already present.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

/// Published sample clip of aerial traffic footage.
pub const DEMO_VIDEO_URL: &str =
    "https://github.com/Juank0621/VisDrone_YOLO11/raw/main/assets/video_demo.mp4";

/// Local file name for the demo clip.
pub const DEMO_VIDEO_FILE: &str = "video_demo.mp4";

/// Asset-layer error types
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("Download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("Download failed: HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("Write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Download the demo clip into `dest_dir`, returning its path.
///
/// A file that already exists is reused without touching the network.
pub fn fetch_demo_video(dest_dir: &Path) -> Result<PathBuf, AssetError> {
    let dest = dest_dir.join(DEMO_VIDEO_FILE);
    if dest.exists() {
        info!(path = %dest.display(), "demo video already present");
        return Ok(dest);
    }

    std::fs::create_dir_all(dest_dir)?;

    info!(url = DEMO_VIDEO_URL, "downloading demo video");
    let response = reqwest::blocking::get(DEMO_VIDEO_URL)?;
    if !response.status().is_success() {
        return Err(AssetError::Status(response.status()));
    }

    let bytes = response.bytes()?;

    // Write through a temp name so an interrupted download never leaves a
    // plausible-looking partial file.
    let temp = dest.with_extension("mp4.part");
    let mut file = std::fs::File::create(&temp)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(&temp, &dest)?;

    info!(path = %dest.display(), bytes = bytes.len(), "demo video downloaded");
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existing_file_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join(DEMO_VIDEO_FILE);
        std::fs::write(&existing, b"cached").unwrap();

        let path = fetch_demo_video(dir.path()).unwrap();
        assert_eq!(path, existing);
        assert_eq!(std::fs::read(&path).unwrap(), b"cached");
    }
}
