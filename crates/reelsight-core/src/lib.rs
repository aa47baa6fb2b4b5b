//! ReelSight Core Library
//!
//! Object-detection annotation engine for uploaded media. Contains the video
//! annotation pipeline (decode → detect → draw → encode → transcode), the
//! detector capability, and the boundary helpers an upload front-end calls.
//!
//! The pipeline delegates all container work to external `ffmpeg`/`ffprobe`
//! processes and runs synchronously within the scope of one request; each
//! invocation owns its decode/encode handles and intermediate file, with
//! cleanup guaranteed on every exit path.

#[cfg(feature = "demo-assets")]
pub mod assets;
pub mod detector;
pub mod media;
pub mod pipeline;
pub mod settings;
pub mod uploads;

// Re-export common types
mod types;
pub use types::*;

mod error;
pub use error::*;
