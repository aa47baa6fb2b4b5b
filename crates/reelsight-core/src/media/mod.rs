//! Media I/O Module
//!
//! All container work is delegated to external `ffmpeg`/`ffprobe` processes:
//! - `probe` — geometry/timing metadata via ffprobe
//! - `source` — sequential frame decoding over a rawvideo pipe
//! - `sink` — lossless intermediate encoding over a rawvideo pipe
//! - `transcode` — final delivery-format encode
//!
//! The encoder is an explicit process-boundary dependency, never assumed to
//! succeed: every invocation captures the exit status and stderr.

mod probe;
mod sink;
mod source;
mod transcode;

pub use probe::{probe, MediaInfo, VideoStreamInfo};
pub use sink::FrameSink;
pub use source::FrameSource;
pub use transcode::{transcode, EncodeSettings};

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::FrameGeometry;

/// Media-layer error types
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("FFmpeg not found. Install FFmpeg or set the REELSIGHT_FFMPEG_DIR override.")]
    FfmpegNotFound,

    #[error("Cannot open media container: {0}")]
    ContainerOpen(String),

    #[error("Frame geometry mismatch: expected {expected}, got {actual_width}x{actual_height}")]
    GeometryMismatch {
        expected: FrameGeometry,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("Intermediate encode failed: {0}")]
    Encode(String),

    #[error("Transcode failed (exit code {exit_code:?}): {stderr}")]
    Transcode {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("FFprobe error: {0}")]
    Probe(String),

    #[error("Process error: {0}")]
    Process(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Media-layer result type
pub type MediaResult<T> = Result<T, MediaError>;

/// Information about a detected FFmpeg installation
#[derive(Debug, Clone)]
pub struct FfmpegInfo {
    /// Path to ffmpeg binary
    pub ffmpeg_path: PathBuf,
    /// Path to ffprobe binary
    pub ffprobe_path: PathBuf,
    /// FFmpeg version string
    pub version: String,
}

/// Environment variable pointing at a directory containing ffmpeg/ffprobe.
pub const FFMPEG_DIR_ENV: &str = "REELSIGHT_FFMPEG_DIR";

/// Detect FFmpeg and FFprobe binaries.
///
/// Resolution order: the `REELSIGHT_FFMPEG_DIR` override, common install
/// locations for the platform, then a PATH search via `which`/`where`.
pub fn detect_system_ffmpeg() -> MediaResult<FfmpegInfo> {
    let ffmpeg_path = locate_binary(ffmpeg_binary_name())?;
    let ffprobe_path = locate_binary(ffprobe_binary_name())?;

    let version = get_ffmpeg_version(&ffmpeg_path)?;

    Ok(FfmpegInfo {
        ffmpeg_path,
        ffprobe_path,
        version,
    })
}

fn ffmpeg_binary_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "ffmpeg.exe"
    } else {
        "ffmpeg"
    }
}

fn ffprobe_binary_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "ffprobe.exe"
    } else {
        "ffprobe"
    }
}

fn locate_binary(binary_name: &str) -> MediaResult<PathBuf> {
    // Explicit override first
    if let Ok(dir) = std::env::var(FFMPEG_DIR_ENV) {
        let candidate = PathBuf::from(dir).join(binary_name);
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    for dir in common_install_paths() {
        let candidate = dir.join(binary_name);
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    // Fall back to PATH search using `where` (Windows) or `which` (Unix)
    let finder = if cfg!(target_os = "windows") {
        "where"
    } else {
        "which"
    };
    // Strip the .exe suffix for `where`; it resolves extensions itself
    let lookup = binary_name.trim_end_matches(".exe");

    let output = Command::new(finder)
        .arg(lookup)
        .output()
        .map_err(|_| MediaError::FfmpegNotFound)?;

    if output.status.success() {
        let path_str = String::from_utf8_lossy(&output.stdout);
        if let Some(first_line) = path_str.lines().next() {
            let trimmed = first_line.trim();
            if !trimmed.is_empty() {
                return Ok(PathBuf::from(trimmed));
            }
        }
    }

    Err(MediaError::FfmpegNotFound)
}

/// Common FFmpeg installation paths for the current platform
fn common_install_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    #[cfg(target_os = "windows")]
    {
        paths.push(PathBuf::from(r"C:\ffmpeg\bin"));
        paths.push(PathBuf::from(r"C:\Program Files\ffmpeg\bin"));

        if let Ok(programdata) = std::env::var("ProgramData") {
            paths.push(PathBuf::from(programdata).join("chocolatey").join("bin"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        paths.push(PathBuf::from("/opt/homebrew/bin"));
        paths.push(PathBuf::from("/usr/local/bin"));
    }

    #[cfg(target_os = "linux")]
    {
        paths.push(PathBuf::from("/usr/bin"));
        paths.push(PathBuf::from("/usr/local/bin"));
        paths.push(PathBuf::from("/snap/bin"));
    }

    paths
}

/// Get the FFmpeg version string
fn get_ffmpeg_version(ffmpeg_path: &Path) -> MediaResult<String> {
    let output = Command::new(ffmpeg_path)
        .arg("-version")
        .output()
        .map_err(MediaError::Process)?;

    if !output.status.success() {
        return Err(MediaError::FfmpegNotFound);
    }

    let output_str = String::from_utf8_lossy(&output.stdout);

    // First line: "ffmpeg version X.X.X ..."
    if let Some(first_line) = output_str.lines().next() {
        if let Some(version_part) = first_line.strip_prefix("ffmpeg version ") {
            if let Some(version) = version_part.split_whitespace().next() {
                return Ok(version.to_string());
            }
        }
        return Ok(first_line.to_string());
    }

    Err(MediaError::Parse(
        "Could not parse FFmpeg version".to_string(),
    ))
}

/// Build a process command with platform flags applied.
///
/// On Windows, spawning console binaries from a service can pop a console
/// window per invocation; CREATE_NO_WINDOW suppresses that.
pub(crate) fn base_command(program: &Path) -> Command {
    #[allow(unused_mut)]
    let mut cmd = Command::new(program);
    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_error_display() {
        let err = MediaError::FfmpegNotFound;
        assert!(err.to_string().contains("FFmpeg not found"));

        let err = MediaError::Transcode {
            exit_code: Some(1),
            stderr: "unknown encoder".to_string(),
        };
        assert!(err.to_string().contains("unknown encoder"));
    }

    #[test]
    fn test_common_paths_not_empty() {
        assert!(!common_install_paths().is_empty());
    }

    #[test]
    fn test_detect_system_ffmpeg() {
        // Passes when FFmpeg is installed; tolerated otherwise so CI without
        // FFmpeg does not hard-fail.
        match detect_system_ffmpeg() {
            Ok(info) => {
                assert!(!info.version.is_empty());
                assert!(info.ffmpeg_path.exists());
                assert!(info.ffprobe_path.exists());
            }
            Err(MediaError::FfmpegNotFound) => {
                eprintln!("FFmpeg not found on system (expected in CI without FFmpeg)");
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}
