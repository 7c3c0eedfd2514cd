//! On-demand capture of the primary display.
//!
//! Each call enumerates monitors and owns its own capture context, so
//! concurrent callers (display loop, turn worker) do not share state.

use anyhow::{Context, Result};
use image::{DynamicImage, RgbImage};
use xcap::Monitor;

use super::encode::encode_jpeg_base64;

/// Grab one bitmap from the primary monitor, alpha channel dropped.
pub fn capture_screen() -> Result<RgbImage> {
    let monitors = Monitor::all().context("failed to enumerate monitors")?;

    let monitor = monitors
        .iter()
        .find(|m| m.is_primary().unwrap_or(false))
        .or_else(|| monitors.first())
        .context("no monitor available")?;

    let rgba = monitor.capture_image().context("failed to capture screen")?;
    Ok(DynamicImage::ImageRgba8(rgba).to_rgb8())
}

/// Capture the primary monitor and encode it like the webcam path.
pub fn capture_screen_encoded(quality: u8) -> Result<String> {
    let frame = capture_screen()?;
    encode_jpeg_base64(&frame, quality)
}
