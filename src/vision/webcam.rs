//! Webcam stream with a lock-guarded single-slot frame buffer.
//!
//! A dedicated capture thread performs blocking device reads in a tight loop
//! and replaces the slot under a mutex; readers always receive a copy taken
//! under the lock, never a reference into the live frame. Encoding happens
//! outside the lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use image::RgbImage;
use nokhwa::Camera;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::encode::encode_jpeg_base64;

/// Consecutive failed device reads before the source is reported degraded.
const MAX_CONSECUTIVE_FAILURES: u32 = 10;

/// Pause between retries after a failed device read.
const FAILURE_BACKOFF: Duration = Duration::from_millis(250);

/// Health of a frame source.
///
/// A degraded source keeps serving its last good frame; it never fails reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    /// Frames are being replaced at device rate.
    Live,
    /// The device stopped producing; the last captured frame remains visible.
    Degraded,
}

/// The shared latest-frame slot.
///
/// Writers replace the frame atomically with respect to readers; readers get
/// a full copy. The lock is held only for the replace or the copy.
pub struct FrameSlot {
    frame: Mutex<RgbImage>,
}

impl FrameSlot {
    pub fn new(initial: RgbImage) -> Self {
        Self { frame: Mutex::new(initial) }
    }

    /// Replace the current frame.
    pub fn store(&self, frame: RgbImage) {
        *self.frame.lock() = frame;
    }

    /// Copy the current frame out of the slot.
    pub fn snapshot(&self) -> RgbImage {
        self.frame.lock().clone()
    }
}

/// Continuously-updated webcam source.
pub struct WebcamStream {
    slot: Arc<FrameSlot>,
    camera_index: u32,
    running: Arc<AtomicBool>,
    degraded: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WebcamStream {
    /// Open the camera, grab the initial frame, and release the device until
    /// [`start`](Self::start) is called.
    ///
    /// # Errors
    /// Returns an error if the device is entirely inaccessible; this is the
    /// one camera failure that is fatal at startup.
    pub fn new(camera_index: u32) -> Result<Self> {
        let mut camera = open_camera(camera_index)?;
        let initial = grab_frame(&mut camera)?;

        info!("Camera {} opened: {}x{}", camera_index, initial.width(), initial.height());

        Ok(Self {
            slot: Arc::new(FrameSlot::new(initial)),
            camera_index,
            running: Arc::new(AtomicBool::new(false)),
            degraded: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        })
    }

    /// Begin the capture loop on a dedicated thread. Idempotent.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Webcam capture already running");
            return;
        }

        let slot = self.slot.clone();
        let running = self.running.clone();
        let degraded = self.degraded.clone();
        let camera_index = self.camera_index;

        let handle = std::thread::spawn(move || {
            capture_loop(camera_index, &slot, &running, &degraded);
        });

        *self.handle.lock() = Some(handle);
        info!("Webcam capture started");
    }

    /// Copy the most recent frame. Before `start` this is the frame captured
    /// at construction.
    pub fn read(&self) -> RgbImage {
        self.slot.snapshot()
    }

    /// Copy the most recent frame and encode it as base64 JPEG. The encode
    /// runs on the copy, outside the slot lock.
    pub fn read_encoded(&self, quality: u8) -> Result<String> {
        let frame = self.slot.snapshot();
        encode_jpeg_base64(&frame, quality)
    }

    /// Current health of the capture loop.
    pub fn status(&self) -> SourceStatus {
        if self.degraded.load(Ordering::Relaxed) { SourceStatus::Degraded } else { SourceStatus::Live }
    }

    /// Signal the capture loop to exit, join its thread, and release the
    /// device. Safe to call twice; `start` afterwards resumes capture.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.handle.lock().take() {
            if let Err(e) = handle.join() {
                warn!("Failed to join webcam capture thread: {:?}", e);
            }
            info!("Webcam capture stopped");
        }
    }
}

impl Drop for WebcamStream {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_camera(index: u32) -> Result<Camera> {
    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
    let mut camera =
        Camera::new(CameraIndex::Index(index), requested).with_context(|| format!("failed to open camera {index}"))?;
    camera.open_stream().context("failed to open camera stream")?;
    Ok(camera)
}

fn grab_frame(camera: &mut Camera) -> Result<RgbImage> {
    let frame = camera.frame().context("camera read failed")?;
    frame.decode_image::<RgbFormat>().context("failed to decode camera frame")
}

fn capture_loop(camera_index: u32, slot: &FrameSlot, running: &AtomicBool, degraded: &AtomicBool) {
    let mut camera = match open_camera(camera_index) {
        Ok(camera) => camera,
        Err(e) => {
            warn!("Camera {} unavailable: {:#}", camera_index, e);
            degraded.store(true, Ordering::Relaxed);
            return;
        }
    };

    let mut failures = 0u32;

    while running.load(Ordering::Relaxed) {
        match grab_frame(&mut camera) {
            Ok(frame) => {
                failures = 0;
                if degraded.swap(false, Ordering::Relaxed) {
                    info!("Camera {} recovered", camera_index);
                }
                slot.store(frame);
            }
            Err(e) => {
                failures += 1;
                debug!("Camera read failed ({}): {:#}", failures, e);
                if failures == MAX_CONSECUTIVE_FAILURES {
                    warn!("Camera {} stopped producing frames; last frame remains visible", camera_index);
                    degraded.store(true, Ordering::Relaxed);
                }
                std::thread::sleep(FAILURE_BACKOFF);
            }
        }
    }

    debug!("Webcam capture loop exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(value: u8) -> RgbImage {
        RgbImage::from_pixel(64, 64, image::Rgb([value, value, value]))
    }

    #[test]
    fn test_snapshot_before_any_store_returns_initial() {
        let slot = FrameSlot::new(uniform(7));
        let frame = slot.snapshot();
        assert!(frame.pixels().all(|p| p.0 == [7, 7, 7]));
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let slot = FrameSlot::new(uniform(1));
        let before = slot.snapshot();
        slot.store(uniform(2));
        // The earlier copy is unaffected by the replacement.
        assert!(before.pixels().all(|p| p.0 == [1, 1, 1]));
        assert!(slot.snapshot().pixels().all(|p| p.0 == [2, 2, 2]));
    }

    #[test]
    fn test_concurrent_replace_never_tears() {
        let slot = Arc::new(FrameSlot::new(uniform(0)));
        let stop = Arc::new(AtomicBool::new(false));

        let writer_slot = slot.clone();
        let writer_stop = stop.clone();
        let writer = std::thread::spawn(move || {
            let mut value = 0u8;
            while !writer_stop.load(Ordering::Relaxed) {
                writer_slot.store(uniform(value));
                value = value.wrapping_add(1);
            }
        });

        // Every observed frame must be uniform: all pixels from the frame in
        // place either before or after a given write, never a mix.
        for _ in 0..500 {
            let frame = slot.snapshot();
            let first = frame.pixels().next().unwrap().0;
            assert!(frame.pixels().all(|p| p.0 == first), "observed a torn frame");
        }

        stop.store(true, Ordering::Relaxed);
        writer.join().unwrap();
    }
}
