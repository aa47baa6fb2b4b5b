//! Pipeline Orchestration Module
//!
//! Wires source, detector, sink, and transcoder into the two public
//! operations:
//! - [`annotate_image`] — single frame in, detections plus annotated copy out
//! - [`annotate_video`] — full container in, delivery-format artifact out
//!
//! A video request moves through fixed stages: open, stream frames through
//! the detector into the lossless intermediate, close the sink, transcode.
//! Execution is synchronous; one call, one request, blocking until done.
//!
//! Cleanup is owed on every path: the intermediate container never survives
//! the request, whether it ends in an artifact or an error.

use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::detector::{render_detections, Detector};
use crate::media::{probe, transcode, EncodeSettings, FfmpegInfo, FrameSink, FrameSource};
use crate::{Detection, PipelineArtifact, PipelineError, PipelineResult};

/// Result of a single-image annotation request.
#[derive(Debug)]
pub struct ImageOutcome {
    /// Detections found in the image
    pub detections: Vec<Detection>,
    /// Copy of the input with boxes and labels drawn in
    pub image: RgbImage,
}

/// Run detection on a single image file.
///
/// The input image is decoded in-process; a file that cannot be decoded is
/// a [`PipelineError::ContainerOpen`], same taxonomy as a bad video upload.
pub fn annotate_image(detector: &dyn Detector, input: &Path) -> PipelineResult<ImageOutcome> {
    let image = image::open(input)
        .map_err(|e| PipelineError::ContainerOpen(format!("{}: {e}", input.display())))?
        .to_rgb8();

    let detections = detector
        .detect(&image)
        .map_err(|source| PipelineError::Detection { frame: 0, source })?;

    info!(
        input = %input.display(),
        detections = detections.len(),
        "image annotated"
    );

    let image = render_detections(&image, &detections);
    Ok(ImageOutcome { detections, image })
}

/// Run the full video annotation pipeline.
///
/// Decodes `input` frame by frame, draws each frame's detections, encodes
/// the annotated frames into a lossless intermediate, then transcodes the
/// intermediate into an H.264 MP4 at `output`. Blocks until the artifact
/// exists or the request has failed.
///
/// On failure no partial artifact is left behind: the intermediate is
/// deleted on every path and the final output only appears after a
/// successful transcode.
pub fn annotate_video(
    ffmpeg: &FfmpegInfo,
    detector: &dyn Detector,
    input: &Path,
    output: &Path,
    encode: &EncodeSettings,
) -> PipelineResult<PipelineArtifact> {
    let (mut source, geometry) = FrameSource::open(ffmpeg, input)?;
    info!(input = %input.display(), %geometry, "pipeline opened");

    let intermediate = intermediate_path(output);
    let guard = IntermediateGuard::new(&intermediate);
    let mut sink = FrameSink::open(ffmpeg, geometry, &intermediate)?;

    while let Some(frame) = source.next_frame()? {
        let frame_index = source.frames_decoded() - 1;

        let detections = detector
            .detect(&frame)
            .map_err(|source| PipelineError::Detection {
                frame: frame_index,
                source,
            })?;

        let annotated = render_detections(&frame, &detections);
        sink.write(&annotated)?;

        if detections.is_empty() {
            debug!(frame = frame_index, "no detections");
        } else {
            debug!(frame = frame_index, detections = detections.len(), "frame annotated");
        }
    }

    let frames = sink.frames_written();
    sink.close()?;
    info!(frames, "streaming complete, sink closed");

    transcode(ffmpeg, &intermediate, output, encode)?;
    // The transcoder consumed the intermediate; the guard has nothing left
    // to do.
    guard.disarm();
    info!(output = %output.display(), frames, "pipeline done");

    Ok(PipelineArtifact {
        path: output.to_path_buf(),
        frames,
        geometry,
    })
}

/// Probe a container without running detection. Thin re-export point so
/// service callers need only the pipeline module.
pub fn probe_media(ffmpeg: &FfmpegInfo, input: &Path) -> PipelineResult<crate::media::MediaInfo> {
    Ok(probe(ffmpeg, input)?)
}

/// Intermediate container path: hidden sibling of the output with a
/// request-unique name, so concurrent requests into the same directory
/// cannot collide.
fn intermediate_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("artifact");
    let name = format!(".{stem}-{}.mkv", Uuid::new_v4());
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(name),
        _ => PathBuf::from(name),
    }
}

/// Deletes the intermediate file on drop unless disarmed.
///
/// Backstop for failure paths between sink open and transcode; the happy
/// path disarms after the transcoder has consumed the file.
struct IntermediateGuard {
    path: PathBuf,
    armed: bool,
}

impl IntermediateGuard {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for IntermediateGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed intermediate"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "failed to remove intermediate"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intermediate_path_is_hidden_sibling() {
        let output = Path::new("/tmp/artifacts/result.mp4");
        let intermediate = intermediate_path(output);
        assert_eq!(intermediate.parent(), Some(Path::new("/tmp/artifacts")));

        let name = intermediate.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(".result-"));
        assert!(name.ends_with(".mkv"));
    }

    #[test]
    fn test_intermediate_path_is_unique_per_call() {
        let output = Path::new("out.mp4");
        assert_ne!(intermediate_path(output), intermediate_path(output));
    }

    #[test]
    fn test_guard_removes_file_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".leftover.mkv");
        std::fs::write(&path, b"data").unwrap();

        {
            let _guard = IntermediateGuard::new(&path);
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_disarmed_guard_leaves_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".kept.mkv");
        std::fs::write(&path, b"data").unwrap();

        let guard = IntermediateGuard::new(&path);
        guard.disarm();
        assert!(path.exists());
    }

    #[test]
    fn test_guard_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".never-created.mkv");
        let _guard = IntermediateGuard::new(&path);
        // Drop must not panic.
    }
}
