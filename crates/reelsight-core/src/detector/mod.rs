//! Object Detection Module
//!
//! The [`Detector`] trait is the seam between the pipeline and any inference
//! backend. The pipeline only ever sees `&RgbImage -> Vec<Detection>`;
//! model format, preprocessing, and postprocessing live behind the trait.
//!
//! [`OnnxDetector`] is the production implementation: a YOLOv8-family model
//! run through ONNX Runtime. Tests substitute trivial implementations.

mod draw;
mod onnx;

pub use draw::render_detections;
pub use onnx::{DetectorConfig, OnnxDetector};

use image::RgbImage;

use crate::Detection;

/// Detector-layer error types
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("Model load failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Detector-layer result type
pub type DetectorResult<T> = Result<T, DetectorError>;

/// Per-frame object detection.
///
/// Implementations must be shareable across threads; stateful backends guard
/// their session internally.
pub trait Detector: Send + Sync {
    /// Run detection on a single frame.
    fn detect(&self, frame: &RgbImage) -> DetectorResult<Vec<Detection>>;
}

/// Class labels for models trained on the VisDrone aerial dataset.
pub const VISDRONE_LABELS: [&str; 10] = [
    "pedestrian",
    "people",
    "bicycle",
    "car",
    "van",
    "truck",
    "tricycle",
    "awning-tricycle",
    "bus",
    "motor",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visdrone_label_count() {
        assert_eq!(VISDRONE_LABELS.len(), 10);
        assert_eq!(VISDRONE_LABELS[3], "car");
    }

    #[test]
    fn test_detector_error_display() {
        let err = DetectorError::ModelLoad("no such file".to_string());
        assert!(err.to_string().contains("Model load failed"));
    }
}
