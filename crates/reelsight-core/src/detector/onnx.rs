//! ONNX Runtime backend for YOLOv8-family detection models.
//!
//! Preprocessing letterboxes the frame into a square model input, inference
//! runs through an `ort` session, and postprocessing decodes the
//! `[1, 4 + classes, anchors]` output head, maps boxes back to frame
//! coordinates, and applies class-wise non-maximum suppression.

use std::path::Path;
use std::sync::Mutex;

use image::imageops::FilterType;
use image::RgbImage;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use tracing::debug;

use super::{Detector, DetectorError, DetectorResult, VISDRONE_LABELS};
use crate::{BoundingBox, Detection};

/// Inference parameters for [`OnnxDetector`].
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Minimum class confidence to keep a candidate box
    pub confidence_threshold: f32,
    /// IoU threshold for non-maximum suppression
    pub nms_threshold: f32,
    /// Square model input size in pixels
    pub input_size: u32,
    /// Class labels in model output order
    pub labels: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            nms_threshold: 0.45,
            input_size: 640,
            labels: VISDRONE_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// YOLOv8 detector backed by ONNX Runtime.
///
/// The session is guarded by a mutex: `ort` sessions require exclusive
/// access per run, while [`Detector`] is shared by reference.
pub struct OnnxDetector {
    session: Mutex<Session>,
    config: DetectorConfig,
}

impl OnnxDetector {
    /// Load a model from disk.
    pub fn load(model_path: &Path, config: DetectorConfig) -> DetectorResult<Self> {
        let session = Session::builder()
            .and_then(|b| Ok(b.with_optimization_level(GraphOptimizationLevel::Level3)?))
            .and_then(|b| Ok(b.with_intra_threads(4)?))
            .and_then(|mut b| b.commit_from_file(model_path))
            .map_err(|e| {
                DetectorError::ModelLoad(format!("{}: {e}", model_path.display()))
            })?;

        debug!(model = %model_path.display(), input_size = config.input_size, "model loaded");

        Ok(Self {
            session: Mutex::new(session),
            config,
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }
}

impl Detector for OnnxDetector {
    fn detect(&self, frame: &RgbImage) -> DetectorResult<Vec<Detection>> {
        let size = self.config.input_size;
        let (input_data, scale, pad_x, pad_y) = letterbox(frame, size);

        let input_tensor = Tensor::from_array((vec![1, 3, size as i32, size as i32], input_data))
            .map_err(|e| DetectorError::Inference(format!("input tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| DetectorError::Inference("session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![input_tensor])
            .map_err(|e| DetectorError::Inference(format!("session run: {e}")))?;

        let (shape, data) = outputs["output0"]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::Inference(format!("output tensor: {e}")))?;

        let candidates = decode_predictions(
            shape,
            data,
            &self.config,
            scale,
            pad_x,
            pad_y,
            frame.width() as f32,
            frame.height() as f32,
        )?;

        Ok(non_max_suppression(candidates, self.config.nms_threshold))
    }
}

/// Resize into a square canvas preserving aspect ratio, padding with gray.
///
/// Returns the NCHW float data normalized to `[0, 1]`, plus the scale and
/// padding needed to map model coordinates back to frame coordinates.
fn letterbox(frame: &RgbImage, size: u32) -> (Vec<f32>, f32, f32, f32) {
    let (fw, fh) = (frame.width() as f32, frame.height() as f32);
    let scale = (size as f32 / fw).min(size as f32 / fh);
    let new_w = (fw * scale).round() as u32;
    let new_h = (fh * scale).round() as u32;
    let pad_x = (size - new_w) as f32 / 2.0;
    let pad_y = (size - new_h) as f32 / 2.0;

    let resized = image::imageops::resize(frame, new_w, new_h, FilterType::Triangle);

    let side = size as usize;
    // Pad value 114/255, the YOLO training-time convention.
    let mut data = vec![114.0f32 / 255.0; 3 * side * side];

    let x0 = pad_x.round() as usize;
    let y0 = pad_y.round() as usize;
    for (x, y, pixel) in resized.enumerate_pixels() {
        let px = x as usize + x0;
        let py = y as usize + y0;
        for c in 0..3 {
            data[c * side * side + py * side + px] = pixel[c] as f32 / 255.0;
        }
    }

    (data, scale, pad_x, pad_y)
}

/// Decode the `[1, 4 + classes, anchors]` YOLOv8 output head.
#[allow(clippy::too_many_arguments)]
fn decode_predictions(
    shape: &[i64],
    data: &[f32],
    config: &DetectorConfig,
    scale: f32,
    pad_x: f32,
    pad_y: f32,
    frame_w: f32,
    frame_h: f32,
) -> DetectorResult<Vec<Detection>> {
    if shape.len() != 3 {
        return Err(DetectorError::Inference(format!(
            "unexpected output rank {} (shape {shape:?})",
            shape.len()
        )));
    }

    let attrs = shape[1] as usize;
    let anchors = shape[2] as usize;
    let num_classes = attrs.saturating_sub(4);

    if num_classes == 0 || data.len() < attrs * anchors {
        return Err(DetectorError::Inference(format!(
            "output shape {shape:?} does not match data length {}",
            data.len()
        )));
    }

    // Attribute-major layout: data[attr * anchors + anchor].
    let at = |attr: usize, anchor: usize| data[attr * anchors + anchor];

    let mut detections = Vec::new();
    for i in 0..anchors {
        let mut best_class = 0;
        let mut best_score = 0.0f32;
        for c in 0..num_classes {
            let score = at(4 + c, i);
            if score > best_score {
                best_score = score;
                best_class = c;
            }
        }

        if best_score < config.confidence_threshold {
            continue;
        }

        let cx = at(0, i);
        let cy = at(1, i);
        let w = at(2, i);
        let h = at(3, i);

        // Undo letterbox, clamp to frame bounds.
        let x1 = ((cx - w / 2.0 - pad_x) / scale).clamp(0.0, frame_w);
        let y1 = ((cy - h / 2.0 - pad_y) / scale).clamp(0.0, frame_h);
        let x2 = ((cx + w / 2.0 - pad_x) / scale).clamp(0.0, frame_w);
        let y2 = ((cy + h / 2.0 - pad_y) / scale).clamp(0.0, frame_h);

        let label = config
            .labels
            .get(best_class)
            .cloned()
            .unwrap_or_else(|| format!("class_{best_class}"));

        detections.push(Detection {
            label,
            confidence: best_score,
            bbox: BoundingBox::new(x1, y1, x2, y2),
        });
    }

    Ok(detections)
}

/// Class-wise non-maximum suppression.
///
/// Candidates are sorted by confidence; a candidate is kept unless a
/// higher-confidence detection of the same class overlaps it above the
/// IoU threshold.
fn non_max_suppression(mut candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::new();
    for candidate in candidates {
        let suppressed = kept.iter().any(|k| {
            k.label == candidate.label && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(label: &str, confidence: f32, bbox: BoundingBox) -> Detection {
        Detection {
            label: label.to_string(),
            confidence,
            bbox,
        }
    }

    #[test]
    fn test_letterbox_wide_frame() {
        let frame = RgbImage::new(640, 320);
        let (data, scale, pad_x, pad_y) = letterbox(&frame, 640);
        assert_eq!(data.len(), 3 * 640 * 640);
        assert_eq!(scale, 1.0);
        assert_eq!(pad_x, 0.0);
        assert_eq!(pad_y, 160.0);
    }

    #[test]
    fn test_letterbox_pads_with_gray() {
        let frame = RgbImage::from_pixel(64, 32, image::Rgb([255, 255, 255]));
        let (data, _, _, pad_y) = letterbox(&frame, 64);
        assert!(pad_y > 0.0);
        // Top-left corner lies in the padding band.
        assert!((data[0] - 114.0 / 255.0).abs() < 1e-6);
        // Frame center is white.
        let side = 64usize;
        assert!((data[32 * side + 32] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_predictions_thresholds_and_rescales() {
        let config = DetectorConfig {
            confidence_threshold: 0.5,
            ..DetectorConfig::default()
        };
        // 2 anchors, 2 classes: attrs = 6, attribute-major.
        let shape = [1i64, 6, 2];
        // One row per attribute (cx, cy, w, h, class0, class1), one column
        // per anchor.
        #[rustfmt::skip]
        let data = [
            320.0, 100.0,
            320.0, 100.0,
            100.0,  50.0,
             80.0,  40.0,
              0.9,   0.1,
              0.2,   0.3,
        ];
        let detections =
            decode_predictions(&shape, &data, &config, 1.0, 0.0, 0.0, 640.0, 640.0).unwrap();

        assert_eq!(detections.len(), 1);
        let d = &detections[0];
        assert_eq!(d.label, "pedestrian");
        assert!((d.confidence - 0.9).abs() < 1e-6);
        assert!((d.bbox.x1 - 270.0).abs() < 1e-3);
        assert!((d.bbox.y1 - 280.0).abs() < 1e-3);
        assert!((d.bbox.x2 - 370.0).abs() < 1e-3);
        assert!((d.bbox.y2 - 360.0).abs() < 1e-3);
    }

    #[test]
    fn test_decode_predictions_rejects_bad_shape() {
        let config = DetectorConfig::default();
        assert!(decode_predictions(&[1, 6], &[], &config, 1.0, 0.0, 0.0, 1.0, 1.0).is_err());
        assert!(
            decode_predictions(&[1, 6, 100], &[0.0; 10], &config, 1.0, 0.0, 0.0, 1.0, 1.0)
                .is_err()
        );
    }

    #[test]
    fn test_nms_suppresses_same_class_overlap() {
        let candidates = vec![
            detection("car", 0.9, BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
            detection("car", 0.8, BoundingBox::new(1.0, 1.0, 11.0, 11.0)),
            detection("car", 0.7, BoundingBox::new(50.0, 50.0, 60.0, 60.0)),
        ];
        let kept = non_max_suppression(candidates, 0.45);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
        assert!((kept[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_different_classes() {
        let candidates = vec![
            detection("car", 0.9, BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
            detection("van", 0.8, BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
        ];
        let kept = non_max_suppression(candidates, 0.45);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_default_config_uses_visdrone_labels() {
        let config = DetectorConfig::default();
        assert_eq!(config.labels.len(), 10);
        assert_eq!(config.input_size, 640);
    }
}
