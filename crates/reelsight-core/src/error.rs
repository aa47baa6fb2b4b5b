//! ReelSight Error Definitions
//!
//! Defines the pipeline-level error taxonomy. Module-local errors
//! ([`crate::media::MediaError`], [`crate::detector::DetectorError`]) are
//! folded into [`PipelineError`] at the orchestrator boundary so callers see
//! one uniform failure type with a human-readable message.

use thiserror::Error;

use crate::detector::DetectorError;
use crate::media::MediaError;
use crate::FrameGeometry;

/// Pipeline error types
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The uploaded container could not be parsed (corrupt upload,
    /// unsupported codec, zero-byte file). A user-input problem: surfaces
    /// with 4xx semantics at an HTTP boundary.
    #[error("Cannot open media container: {0}")]
    ContainerOpen(String),

    /// The detector failed on a specific frame. Fatal for the whole request;
    /// partial annotation of a video is defined as a failure.
    #[error("Detection failed on frame {frame}: {source}")]
    Detection {
        frame: u64,
        #[source]
        source: DetectorError,
    },

    /// A frame did not conform to the geometry fixed at open time. An
    /// internal invariant violation — indicates a bug in frame handling.
    #[error("Frame geometry mismatch: expected {expected}, got {actual_width}x{actual_height}")]
    GeometryMismatch {
        expected: FrameGeometry,
        actual_width: u32,
        actual_height: u32,
    },

    /// The external encoder exited non-zero during the final transcode.
    #[error("Transcode failed (exit code {exit_code:?}): {stderr}")]
    Transcode {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// Any other media-layer failure (ffmpeg missing, probe error, encode
    /// failure on the intermediate container).
    #[error("Media error: {0}")]
    Media(MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pipeline result type
pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    /// Whether this failure was caused by the user's input rather than the
    /// service (maps to 4xx vs 5xx at an HTTP boundary).
    pub fn is_user_error(&self) -> bool {
        matches!(self, PipelineError::ContainerOpen(_))
    }
}

impl From<MediaError> for PipelineError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::ContainerOpen(msg) => PipelineError::ContainerOpen(msg),
            MediaError::GeometryMismatch {
                expected,
                actual_width,
                actual_height,
            } => PipelineError::GeometryMismatch {
                expected,
                actual_width,
                actual_height,
            },
            MediaError::Transcode { exit_code, stderr } => {
                PipelineError::Transcode { exit_code, stderr }
            }
            other => PipelineError::Media(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_open_is_user_error() {
        let err = PipelineError::ContainerOpen("not a video".to_string());
        assert!(err.is_user_error());

        let err = PipelineError::Transcode {
            exit_code: Some(1),
            stderr: "boom".to_string(),
        };
        assert!(!err.is_user_error());
    }

    #[test]
    fn test_media_error_conversion_preserves_variants() {
        let err: PipelineError = MediaError::ContainerOpen("bad".to_string()).into();
        assert!(matches!(err, PipelineError::ContainerOpen(_)));

        let err: PipelineError = MediaError::Transcode {
            exit_code: Some(187),
            stderr: "codec not found".to_string(),
        }
        .into();
        match err {
            PipelineError::Transcode { exit_code, stderr } => {
                assert_eq!(exit_code, Some(187));
                assert!(stderr.contains("codec"));
            }
            other => panic!("unexpected variant: {other}"),
        }
    }

    #[test]
    fn test_detection_error_display_includes_frame() {
        let err = PipelineError::Detection {
            frame: 3,
            source: DetectorError::Inference("tensor shape".to_string()),
        };
        assert!(err.to_string().contains("frame 3"));
    }
}
