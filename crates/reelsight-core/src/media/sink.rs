//! Frame sink: accumulates annotated frames into a lossless intermediate.
//!
//! Spawns an ffmpeg child consuming packed rgb24 on stdin and encoding FFV1
//! at the source's geometry and frame rate. FFV1 is lossless, so no
//! compression-artifact loss occurs before the final transcode.
//!
//! `close` must be invoked exactly once per successfully opened sink; it is
//! an idempotent no-op afterwards. `Drop` performs best-effort teardown when
//! a failure path skips `close`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Stdio};

use image::RgbImage;
use tracing::debug;

use super::{base_command, FfmpegInfo, MediaError, MediaResult};
use crate::FrameGeometry;

/// An open encoding context bound to one intermediate container.
pub struct FrameSink {
    geometry: FrameGeometry,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    destination: PathBuf,
    frames_written: u64,
}

impl FrameSink {
    /// Create an intermediate container at `destination`, fixed to the given
    /// geometry.
    pub fn open(
        info: &FfmpegInfo,
        geometry: FrameGeometry,
        destination: &Path,
    ) -> MediaResult<FrameSink> {
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(MediaError::Process)?;
            }
        }

        let mut child = base_command(&info.ffmpeg_path)
            .args([
                "-v",
                "error",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-s",
                &format!("{}x{}", geometry.width, geometry.height),
                "-r",
                &format!("{}", geometry.fps),
                "-i",
                "pipe:0",
                "-c:v",
                "ffv1",
                "-y",
            ])
            .arg(destination)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(MediaError::Process)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::Encode("encoder stdin not captured".to_string()))?;

        debug!(destination = %destination.display(), %geometry, "opened frame sink");

        Ok(FrameSink {
            geometry,
            child: Some(child),
            stdin: Some(stdin),
            destination: destination.to_path_buf(),
            frames_written: 0,
        })
    }

    /// Number of frames appended so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Append one frame.
    ///
    /// Fails with [`MediaError::GeometryMismatch`] if the frame does not
    /// conform to the geometry fixed at open time.
    pub fn write(&mut self, frame: &RgbImage) -> MediaResult<()> {
        if !self.geometry.matches(frame) {
            return Err(MediaError::GeometryMismatch {
                expected: self.geometry,
                actual_width: frame.width(),
                actual_height: frame.height(),
            });
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::Encode("sink already closed".to_string()))?;

        stdin
            .write_all(frame.as_raw())
            .map_err(|e| MediaError::Encode(format!("frame {}: {e}", self.frames_written)))?;

        self.frames_written += 1;
        Ok(())
    }

    /// Flush and release the encoder. Idempotent: a second call is a no-op.
    pub fn close(&mut self) -> MediaResult<()> {
        // Dropping stdin signals end of input to the encoder.
        drop(self.stdin.take());

        if let Some(mut child) = self.child.take() {
            let status = child.wait().map_err(MediaError::Process)?;
            if !status.success() {
                return Err(MediaError::Encode(format!(
                    "intermediate encoder exited with {status} after {} frames",
                    self.frames_written
                )));
            }
            debug!(
                frames = self.frames_written,
                destination = %self.destination.display(),
                "frame sink closed"
            );
        }

        Ok(())
    }
}

impl Drop for FrameSink {
    fn drop(&mut self) {
        // Failure path: close() was never reached. Kill rather than wait so
        // a wedged encoder cannot block teardown.
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Sinks that talk to a real encoder are covered by the integration
    // tests; the geometry invariant is pure and checked here.

    #[test]
    fn test_geometry_mismatch_is_checked_before_write() {
        let geometry = FrameGeometry {
            width: 64,
            height: 48,
            fps: 30.0,
        };
        let frame = RgbImage::new(48, 64);
        assert!(!geometry.matches(&frame));

        let err = MediaError::GeometryMismatch {
            expected: geometry,
            actual_width: frame.width(),
            actual_height: frame.height(),
        };
        assert!(err.to_string().contains("expected 64x48"));
        assert!(err.to_string().contains("48x64"));
    }
}
