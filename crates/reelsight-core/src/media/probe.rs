//! Container probing via ffprobe.
//!
//! Runs `ffprobe` with JSON output and extracts the pieces the pipeline
//! needs: container-level duration/size/format and the first video stream's
//! geometry. A file ffprobe rejects — corrupt upload, unsupported codec,
//! zero-byte file — surfaces as [`MediaError::ContainerOpen`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{base_command, FfmpegInfo, MediaError, MediaResult};
use crate::FrameGeometry;

/// Media information extracted by FFprobe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Duration in seconds
    pub duration_sec: f64,
    /// File size in bytes
    pub size_bytes: u64,
    /// Container format
    pub format: String,
    /// Video stream info (if present)
    pub video: Option<VideoStreamInfo>,
}

/// Video stream information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (frames per second)
    pub fps: f64,
    /// Codec name (e.g. "h264")
    pub codec: String,
    /// Pixel format
    pub pixel_format: String,
}

impl MediaInfo {
    /// Geometry of the first video stream, or `ContainerOpen` if the
    /// container carries no video.
    pub fn geometry(&self) -> MediaResult<FrameGeometry> {
        let video = self
            .video
            .as_ref()
            .ok_or_else(|| MediaError::ContainerOpen("no video stream in container".to_string()))?;

        if video.width == 0 || video.height == 0 || video.fps <= 0.0 {
            return Err(MediaError::ContainerOpen(format!(
                "invalid video geometry: {}x{} @ {}",
                video.width, video.height, video.fps
            )));
        }

        Ok(FrameGeometry {
            width: video.width,
            height: video.height,
            fps: video.fps,
        })
    }
}

/// Probe a media file.
pub fn probe(info: &FfmpegInfo, input: &Path) -> MediaResult<MediaInfo> {
    if !input.exists() {
        return Err(MediaError::ContainerOpen(format!(
            "input file does not exist: {}",
            input.display()
        )));
    }

    // `-v error` rather than `quiet`: ffprobe's stderr carries the reason a
    // container was rejected, and that detail belongs in the error message.
    let output = base_command(&info.ffprobe_path)
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(input)
        .output()
        .map_err(MediaError::Process)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MediaError::ContainerOpen(format!(
            "ffprobe rejected {}: {}",
            input.display(),
            stderr.trim()
        )));
    }

    let json_str = String::from_utf8_lossy(&output.stdout);
    parse_probe_output(&json_str)
}

/// Parse FFprobe JSON output
fn parse_probe_output(json_str: &str) -> MediaResult<MediaInfo> {
    let json: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| MediaError::Parse(format!("invalid ffprobe output: {e}")))?;

    let format = json
        .get("format")
        .ok_or_else(|| MediaError::ContainerOpen("ffprobe reported no format".to_string()))?;

    let duration_sec = format
        .get("duration")
        .and_then(|d| d.as_str())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    let size_bytes = format
        .get("size")
        .and_then(|s| s.as_str())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let format_name = format
        .get("format_name")
        .and_then(|f| f.as_str())
        .unwrap_or("unknown")
        .to_string();

    let streams = json
        .get("streams")
        .and_then(|s| s.as_array())
        .cloned()
        .unwrap_or_default();

    let video = streams
        .iter()
        .find(|s| s.get("codec_type").and_then(|c| c.as_str()) == Some("video"))
        .map(parse_video_stream);

    Ok(MediaInfo {
        duration_sec,
        size_bytes,
        format: format_name,
        video,
    })
}

fn parse_video_stream(stream: &serde_json::Value) -> VideoStreamInfo {
    let width = stream.get("width").and_then(|w| w.as_u64()).unwrap_or(0) as u32;
    let height = stream.get("height").and_then(|h| h.as_u64()).unwrap_or(0) as u32;

    // r_frame_rate is a fraction, e.g. "30/1" or "30000/1001"
    let fps = stream
        .get("r_frame_rate")
        .and_then(|f| f.as_str())
        .and_then(parse_rate)
        .unwrap_or(0.0);

    let codec = stream
        .get("codec_name")
        .and_then(|c| c.as_str())
        .unwrap_or("unknown")
        .to_string();

    let pixel_format = stream
        .get("pix_fmt")
        .and_then(|p| p.as_str())
        .unwrap_or("unknown")
        .to_string();

    VideoStreamInfo {
        width,
        height,
        fps,
        codec,
        pixel_format,
    }
}

fn parse_rate(s: &str) -> Option<f64> {
    match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den > 0.0 {
                Some(num / den)
            } else {
                None
            }
        }
        None => s.parse().ok(),
    }
}
