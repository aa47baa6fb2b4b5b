//! Common types shared across the pipeline.

use std::path::PathBuf;

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Fixed geometry of a video stream, captured when the container is opened.
///
/// Every frame produced by the source and accepted by the sink must conform
/// to this geometry exactly; a mismatch is a programming error, not a
/// runtime condition to recover from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameGeometry {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (frames per second)
    pub fps: f64,
}

impl FrameGeometry {
    /// Size in bytes of one packed rgb24 frame at this geometry.
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Whether an image buffer conforms to this geometry.
    pub fn matches(&self, frame: &RgbImage) -> bool {
        frame.width() == self.width && frame.height() == self.height
    }
}

impl std::fmt::Display for FrameGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{} @ {:.3} fps", self.width, self.height, self.fps)
    }
}

/// Axis-aligned bounding box in source-frame pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection-over-union with another box. Returns 0.0 when either box
    /// is degenerate.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        let intersection = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - intersection;

        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// One detected object on one frame.
///
/// Produced fresh per frame; there is no cross-frame identity or tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Class label (e.g. "car", "pedestrian")
    pub label: String,
    /// Confidence score in [0, 1]
    pub confidence: f32,
    /// Bounding box in source-frame pixels
    pub bbox: BoundingBox,
}

/// The final output of a successful video pipeline run.
///
/// The artifact path is the only file surviving the invocation; all
/// intermediate resources have been released by the time this is returned.
#[derive(Debug, Clone)]
pub struct PipelineArtifact {
    /// Path of the annotated, transcoded video
    pub path: PathBuf,
    /// Number of frames processed
    pub frames: u64,
    /// Geometry captured from the input container
    pub geometry: FrameGeometry,
}
