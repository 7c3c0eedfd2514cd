//! Video frame sources: webcam stream and on-demand screen capture.
//!
//! Frames are plain RGB bitmaps; consumers that need to embed them in a
//! model request encode them as base64 JPEG data URIs via [`encode`].

mod encode;
mod screen;
mod webcam;

pub use encode::{data_uri, encode_jpeg_base64};
pub use screen::{capture_screen, capture_screen_encoded};
pub use webcam::{FrameSlot, SourceStatus, WebcamStream};
