//! Frame source: sequential decoding of a video container.
//!
//! Opens the container, captures its geometry, then spawns an ffmpeg child
//! decoding to packed rgb24 on stdout. Frames are read back as exact
//! `width * height * 3` byte chunks — a lazy, finite, forward-only sequence
//! with no seek support.
//!
//! The child process is an owned OS resource: `Drop` kills and reaps it so
//! early termination (a downstream failure mid-stream) cannot leak the
//! handle.

use std::io::Read;
use std::path::Path;
use std::process::{Child, ChildStdout, Stdio};

use image::RgbImage;
use tracing::debug;

use super::{base_command, probe, FfmpegInfo, MediaError, MediaResult};
use crate::FrameGeometry;

/// An open decoding context bound to one container.
pub struct FrameSource {
    geometry: FrameGeometry,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    frames_decoded: u64,
    finished: bool,
}

impl FrameSource {
    /// Open a container and capture its geometry.
    ///
    /// Fails with [`MediaError::ContainerOpen`] if the container cannot be
    /// parsed or carries no video stream.
    pub fn open(info: &FfmpegInfo, input: &Path) -> MediaResult<(FrameSource, FrameGeometry)> {
        let media = probe(info, input)?;
        let geometry = media.geometry()?;

        let mut child = base_command(&info.ffmpeg_path)
            .args(["-v", "error", "-i"])
            .arg(input)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(MediaError::Process)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::Parse("decoder stdout not captured".to_string()))?;

        debug!(input = %input.display(), %geometry, "opened frame source");

        let source = FrameSource {
            geometry,
            child: Some(child),
            stdout: Some(stdout),
            frames_decoded: 0,
            finished: false,
        };
        Ok((source, geometry))
    }

    /// Number of frames decoded so far.
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Decode the next frame. Returns `Ok(None)` at end of stream.
    ///
    /// A truncated frame (the decoder died mid-frame) is an error, as is a
    /// non-zero decoder exit at end of stream.
    pub fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        if self.finished {
            return Ok(None);
        }

        let frame_bytes = self.geometry.frame_bytes();
        let mut buf = vec![0u8; frame_bytes];

        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| MediaError::Parse("frame source already released".to_string()))?;

        let read = read_full(stdout, &mut buf).map_err(MediaError::Process)?;

        if read == 0 {
            // Clean end of stream: reap the decoder and check its verdict.
            self.finished = true;
            self.stdout = None;
            if let Some(mut child) = self.child.take() {
                let status = child.wait().map_err(MediaError::Process)?;
                if !status.success() {
                    return Err(MediaError::ContainerOpen(format!(
                        "decoder exited with {status} after {} frames",
                        self.frames_decoded
                    )));
                }
            }
            debug!(frames = self.frames_decoded, "frame source exhausted");
            return Ok(None);
        }

        if read < frame_bytes {
            return Err(MediaError::ContainerOpen(format!(
                "truncated frame {} ({read} of {frame_bytes} bytes)",
                self.frames_decoded
            )));
        }

        let frame = RgbImage::from_raw(self.geometry.width, self.geometry.height, buf)
            .ok_or_else(|| MediaError::Parse("frame buffer size mismatch".to_string()))?;

        self.frames_decoded += 1;
        Ok(Some(frame))
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        // Best-effort release on early termination.
        if let Some(mut child) = self.child.take() {
            self.stdout = None;
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Read until `buf` is full or the reader is exhausted. Unlike
/// `read_exact`, a clean EOF at a frame boundary is distinguishable from a
/// truncated frame.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_full_exact() {
        let data = [1u8, 2, 3, 4, 5, 6];
        let mut reader = &data[..];
        let mut buf = [0u8; 6];
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 6);
        assert_eq!(buf, data);
    }

    #[test]
    fn test_read_full_short() {
        let data = [1u8, 2, 3];
        let mut reader = &data[..];
        let mut buf = [0u8; 6];
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 3);
    }

    #[test]
    fn test_read_full_empty() {
        let data: [u8; 0] = [];
        let mut reader = &data[..];
        let mut buf = [0u8; 4];
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 0);
    }
}
