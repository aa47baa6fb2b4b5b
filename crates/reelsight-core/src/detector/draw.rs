//! Detection overlay rendering.
//!
//! Draws bounding boxes and label tags straight into the rgb24 pixel
//! buffer. Text uses a tiny built-in 3x5 bitmap font, so no font assets
//! ship with the service.

use image::{Rgb, RgbImage};

use crate::Detection;

/// Per-class color palette, cycled by label hash.
const PALETTE: [(u8, u8, u8); 8] = [
    (255, 64, 64),
    (64, 200, 64),
    (64, 128, 255),
    (255, 200, 0),
    (200, 64, 255),
    (0, 220, 220),
    (255, 128, 0),
    (160, 255, 96),
];

const BOX_THICKNESS: u32 = 2;
const FONT_SCALE: u32 = 2;

/// Return a copy of `frame` with boxes and `label confidence%` tags drawn
/// over each detection. The input frame is left untouched.
pub fn render_detections(frame: &RgbImage, detections: &[Detection]) -> RgbImage {
    let mut canvas = frame.clone();
    for detection in detections {
        let color = class_color(&detection.label);
        draw_box(&mut canvas, detection, color);
        draw_tag(&mut canvas, detection, color);
    }
    canvas
}

fn class_color(label: &str) -> (u8, u8, u8) {
    let hash: u32 = label
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
    PALETTE[(hash as usize) % PALETTE.len()]
}

fn draw_box(canvas: &mut RgbImage, detection: &Detection, color: (u8, u8, u8)) {
    let (w, h) = (canvas.width(), canvas.height());
    if w == 0 || h == 0 {
        return;
    }

    let x1 = (detection.bbox.x1.max(0.0) as u32).min(w - 1);
    let y1 = (detection.bbox.y1.max(0.0) as u32).min(h - 1);
    let x2 = (detection.bbox.x2.max(0.0) as u32).min(w - 1);
    let y2 = (detection.bbox.y2.max(0.0) as u32).min(h - 1);

    for t in 0..BOX_THICKNESS {
        for x in x1..=x2 {
            put_pixel(canvas, x, y1.saturating_add(t), color);
            put_pixel(canvas, x, y2.saturating_sub(t), color);
        }
        for y in y1..=y2 {
            put_pixel(canvas, x1.saturating_add(t), y, color);
            put_pixel(canvas, x2.saturating_sub(t), y, color);
        }
    }
}

fn draw_tag(canvas: &mut RgbImage, detection: &Detection, color: (u8, u8, u8)) {
    let text = format!(
        "{} {}%",
        detection.label,
        (detection.confidence * 100.0).round() as u32
    );

    let glyph_h = 5 * FONT_SCALE;
    // Tag sits above the box when there is room, inside it otherwise.
    let x = detection.bbox.x1.max(0.0) as u32;
    let y_box = detection.bbox.y1.max(0.0) as u32;
    let y = y_box.checked_sub(glyph_h + 2).unwrap_or(y_box + 2);

    draw_text(canvas, x, y, &text, color);
}

/// Draw `text` with the built-in 3x5 font at `FONT_SCALE`.
fn draw_text(canvas: &mut RgbImage, x: u32, y: u32, text: &str, color: (u8, u8, u8)) {
    let mut cx = x;
    let advance = 4 * FONT_SCALE; // 3 columns + 1 spacing
    for c in text.chars() {
        draw_glyph(canvas, cx, y, c, color);
        cx = cx.saturating_add(advance);
    }
}

fn draw_glyph(canvas: &mut RgbImage, x: u32, y: u32, c: char, color: (u8, u8, u8)) {
    // 3x5 glyphs: five rows, three bits each, MSB on the left.
    let rows: [u8; 5] = match c.to_ascii_uppercase() {
        '0' => [0x7, 0x5, 0x5, 0x5, 0x7],
        '1' => [0x2, 0x6, 0x2, 0x2, 0x7],
        '2' => [0x7, 0x1, 0x7, 0x4, 0x7],
        '3' => [0x7, 0x1, 0x7, 0x1, 0x7],
        '4' => [0x5, 0x5, 0x7, 0x1, 0x1],
        '5' => [0x7, 0x4, 0x7, 0x1, 0x7],
        '6' => [0x7, 0x4, 0x7, 0x5, 0x7],
        '7' => [0x7, 0x1, 0x2, 0x4, 0x4],
        '8' => [0x7, 0x5, 0x7, 0x5, 0x7],
        '9' => [0x7, 0x5, 0x7, 0x1, 0x7],
        'A' => [0x2, 0x5, 0x7, 0x5, 0x5],
        'B' => [0x6, 0x5, 0x6, 0x5, 0x6],
        'C' => [0x7, 0x4, 0x4, 0x4, 0x7],
        'D' => [0x6, 0x5, 0x5, 0x5, 0x6],
        'E' => [0x7, 0x4, 0x6, 0x4, 0x7],
        'F' => [0x7, 0x4, 0x6, 0x4, 0x4],
        'G' => [0x7, 0x4, 0x5, 0x5, 0x7],
        'H' => [0x5, 0x5, 0x7, 0x5, 0x5],
        'I' => [0x7, 0x2, 0x2, 0x2, 0x7],
        'J' => [0x1, 0x1, 0x1, 0x5, 0x7],
        'K' => [0x5, 0x6, 0x4, 0x6, 0x5],
        'L' => [0x4, 0x4, 0x4, 0x4, 0x7],
        'M' => [0x5, 0x7, 0x5, 0x5, 0x5],
        'N' => [0x6, 0x5, 0x5, 0x5, 0x5],
        'O' => [0x7, 0x5, 0x5, 0x5, 0x7],
        'P' => [0x7, 0x5, 0x7, 0x4, 0x4],
        'Q' => [0x7, 0x5, 0x5, 0x7, 0x1],
        'R' => [0x6, 0x5, 0x6, 0x5, 0x5],
        'S' => [0x3, 0x4, 0x2, 0x1, 0x6],
        'T' => [0x7, 0x2, 0x2, 0x2, 0x2],
        'U' => [0x5, 0x5, 0x5, 0x5, 0x7],
        'V' => [0x5, 0x5, 0x5, 0x5, 0x2],
        'W' => [0x5, 0x5, 0x5, 0x7, 0x5],
        'X' => [0x5, 0x5, 0x2, 0x5, 0x5],
        'Y' => [0x5, 0x5, 0x2, 0x2, 0x2],
        'Z' => [0x7, 0x1, 0x2, 0x4, 0x7],
        '%' => [0x5, 0x1, 0x2, 0x4, 0x5],
        '-' => [0x0, 0x0, 0x7, 0x0, 0x0],
        '.' => [0x0, 0x0, 0x0, 0x0, 0x2],
        ' ' => [0x0, 0x0, 0x0, 0x0, 0x0],
        _ => [0x7, 0x7, 0x7, 0x7, 0x7],
    };

    for (row, bits) in rows.iter().enumerate() {
        for col in 0..3u32 {
            if (bits >> (2 - col)) & 1 == 1 {
                for dy in 0..FONT_SCALE {
                    for dx in 0..FONT_SCALE {
                        put_pixel(
                            canvas,
                            x + col * FONT_SCALE + dx,
                            y + row as u32 * FONT_SCALE + dy,
                            color,
                        );
                    }
                }
            }
        }
    }
}

fn put_pixel(canvas: &mut RgbImage, x: u32, y: u32, color: (u8, u8, u8)) {
    if x < canvas.width() && y < canvas.height() {
        canvas.put_pixel(x, y, Rgb([color.0, color.1, color.2]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoundingBox;

    fn sample_detection() -> Detection {
        Detection {
            label: "car".to_string(),
            confidence: 0.87,
            bbox: BoundingBox::new(20.0, 30.0, 80.0, 70.0),
        }
    }

    #[test]
    fn test_render_preserves_geometry_and_input() {
        let frame = RgbImage::new(160, 120);
        let rendered = render_detections(&frame, &[sample_detection()]);
        assert_eq!(rendered.dimensions(), frame.dimensions());
        // Original frame is untouched.
        assert!(frame.pixels().all(|p| p.0 == [0, 0, 0]));
        // Some pixels were painted.
        assert!(rendered.pixels().any(|p| p.0 != [0, 0, 0]));
    }

    #[test]
    fn test_render_without_detections_is_identity() {
        let frame = RgbImage::from_pixel(32, 32, Rgb([9, 9, 9]));
        let rendered = render_detections(&frame, &[]);
        assert_eq!(frame, rendered);
    }

    #[test]
    fn test_render_clamps_out_of_bounds_boxes() {
        let frame = RgbImage::new(64, 64);
        let detection = Detection {
            label: "bus".to_string(),
            confidence: 0.5,
            bbox: BoundingBox::new(-50.0, -50.0, 500.0, 500.0),
        };
        // Must not panic.
        let rendered = render_detections(&frame, &[detection]);
        assert_eq!(rendered.dimensions(), (64, 64));
    }

    #[test]
    fn test_class_color_is_stable() {
        assert_eq!(class_color("car"), class_color("car"));
    }
}
