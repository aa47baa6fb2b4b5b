//! Final transcode: lossless intermediate to delivery format.
//!
//! One blocking ffmpeg invocation re-encodes the FFV1 intermediate into a
//! browser-playable H.264 MP4 with `+faststart`. The intermediate is deleted
//! on every exit path, success or failure, so a crashed encode cannot leave
//! bulky FFV1 files behind.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{base_command, FfmpegInfo, MediaError, MediaResult};

/// Delivery-encode parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeSettings {
    /// Output video codec
    pub video_codec: String,
    /// Encoder speed/compression preset
    pub preset: String,
    /// Constant rate factor (0-51, lower is better quality)
    pub crf: u8,
    /// Output pixel format
    pub pixel_format: String,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "medium".to_string(),
            crf: 23,
            pixel_format: "yuv420p".to_string(),
        }
    }
}

/// Transcode `intermediate` into `output`, consuming the intermediate.
///
/// The intermediate file is removed whether the encode succeeds or fails. A
/// non-zero encoder exit surfaces as [`MediaError::Transcode`] carrying the
/// exit code and captured stderr.
pub fn transcode(
    info: &FfmpegInfo,
    intermediate: &Path,
    output: &Path,
    settings: &EncodeSettings,
) -> MediaResult<()> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(MediaError::Process)?;
        }
    }

    debug!(
        intermediate = %intermediate.display(),
        output = %output.display(),
        codec = %settings.video_codec,
        "starting transcode"
    );

    let result = base_command(&info.ffmpeg_path)
        .args(["-v", "error", "-i"])
        .arg(intermediate)
        .args([
            "-c:v",
            &settings.video_codec,
            "-preset",
            &settings.preset,
            "-crf",
            &settings.crf.to_string(),
            "-pix_fmt",
            &settings.pixel_format,
            "-movflags",
            "+faststart",
            "-y",
        ])
        .arg(output)
        .output();

    // The intermediate is consumed on every path.
    if let Err(e) = std::fs::remove_file(intermediate) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(
                intermediate = %intermediate.display(),
                error = %e,
                "failed to remove intermediate file"
            );
        }
    }

    let output_result = result.map_err(MediaError::Process)?;

    if !output_result.status.success() {
        return Err(MediaError::Transcode {
            exit_code: output_result.status.code(),
            stderr: String::from_utf8_lossy(&output_result.stderr)
                .trim()
                .to_string(),
        });
    }

    debug!(output = %output.display(), "transcode complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_encode_settings() {
        let settings = EncodeSettings::default();
        assert_eq!(settings.video_codec, "libx264");
        assert_eq!(settings.preset, "medium");
        assert_eq!(settings.crf, 23);
        assert_eq!(settings.pixel_format, "yuv420p");
    }

    #[test]
    fn test_encode_settings_serde_round_trip() {
        let settings = EncodeSettings {
            video_codec: "libx265".to_string(),
            preset: "fast".to_string(),
            crf: 28,
            pixel_format: "yuv420p10le".to_string(),
        };
        let json = serde_json::to_value(&settings).unwrap();
        // Persisted schema is uniformly camelCase.
        assert_eq!(json["videoCodec"], "libx265");
        assert_eq!(json["pixelFormat"], "yuv420p10le");

        let back: EncodeSettings = serde_json::from_value(json).unwrap();
        assert_eq!(settings, back);
    }
}
