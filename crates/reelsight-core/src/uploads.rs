//! Upload staging.
//!
//! An HTTP boundary hands the pipeline raw request bytes; the external
//! decoder needs a real file. [`UploadedMedia`] bridges the two: it persists
//! the bytes under a request-unique name in the system temp directory and
//! deletes the file when dropped, so staged uploads live exactly as long as
//! the request that carried them.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

/// A staged upload on disk, deleted on drop.
#[derive(Debug)]
pub struct UploadedMedia {
    path: PathBuf,
}

impl UploadedMedia {
    /// Write `bytes` to a request-unique file in the system temp directory.
    ///
    /// The original file name contributes only its extension, so hostile
    /// upload names cannot influence the staging path.
    pub fn persist(bytes: &[u8], original_name: &str) -> std::io::Result<UploadedMedia> {
        let extension = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("bin");

        let path = std::env::temp_dir().join(format!("reelsight-upload-{}.{extension}", Uuid::new_v4()));

        let mut file = std::fs::File::create(&path)?;
        file.write_all(bytes)?;
        file.sync_all()?;

        debug!(path = %path.display(), bytes = bytes.len(), "upload staged");
        Ok(UploadedMedia { path })
    }

    /// Location of the staged file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UploadedMedia {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "upload removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove upload"),
        }
    }
}

/// Build a collision-free artifact file name from the upload's original
/// name: sanitized stem, UUID suffix, `.mp4` extension.
pub fn artifact_file_name(original_name: &str) -> String {
    let stem = Path::new(original_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("media");
    format!("{}-{}.mp4", sanitize_stem(stem), Uuid::new_v4())
}

/// Keep alphanumerics, `-` and `_`; everything else becomes `_`. Truncated
/// so pathological names cannot blow past filesystem name limits.
fn sanitize_stem(stem: &str) -> String {
    let sanitized: String = stem
        .chars()
        .take(64)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        "media".to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persist_and_drop() {
        let upload = UploadedMedia::persist(b"not really a video", "clip.mp4").unwrap();
        let path = upload.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(path.extension().unwrap(), "mp4");

        drop(upload);
        assert!(!path.exists());
    }

    #[test]
    fn test_persist_rejects_weird_extension() {
        let upload = UploadedMedia::persist(b"x", "../../etc/passwd").unwrap();
        let name = upload.path().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("reelsight-upload-"));
        assert!(name.ends_with(".bin"));
    }

    #[test]
    fn test_artifact_file_name_sanitizes() {
        let name = artifact_file_name("my holiday/видео.mov");
        assert!(name.ends_with(".mp4"));
        assert!(!name.contains('/'));
        assert!(!name.contains(' '));
    }

    #[test]
    fn test_artifact_file_name_unique() {
        assert_ne!(artifact_file_name("a.mp4"), artifact_file_name("a.mp4"));
    }

    #[test]
    fn test_sanitize_stem_fallback() {
        assert_eq!(sanitize_stem(""), "media");
        assert_eq!(sanitize_stem("ok-name_1"), "ok-name_1");
        assert_eq!(sanitize_stem("a b"), "a_b");
    }
}
