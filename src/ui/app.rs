//! Preview application: live webcam and screen views, exit keys, and the
//! shutdown signal for the background workers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use egui::{ColorImage, Key, TextureHandle, TextureOptions, ViewportCommand};
use image::RgbImage;
use tracing::{debug, info, warn};

use crate::vision::{SourceStatus, WebcamStream, capture_screen};

/// Repaint cadence; doubles as the display loop's suspension point.
const REPAINT_INTERVAL: Duration = Duration::from_millis(66);

/// How often a fresh screen grab replaces the screen preview.
const SCREEN_GRAB_INTERVAL: Duration = Duration::from_millis(200);

/// Displayed width of each preview.
const PREVIEW_WIDTH: f32 = 480.0;

/// Screen grabs are downscaled to this width before texture upload.
const SCREEN_THUMBNAIL_WIDTH: u32 = 960;

/// Foreground preview application. Owns the process lifetime: closing it
/// (Escape, `q`, or the window button) triggers the orderly shutdown in
/// `main`.
pub struct PreviewApp {
    webcam: Arc<WebcamStream>,
    shutdown: Arc<AtomicBool>,
    webcam_texture: Option<TextureHandle>,
    screen_texture: Option<TextureHandle>,
    last_screen_grab: Option<Instant>,
    camera_degraded: bool,
}

impl PreviewApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, webcam: Arc<WebcamStream>, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            webcam,
            shutdown,
            webcam_texture: None,
            screen_texture: None,
            last_screen_grab: None,
            camera_degraded: false,
        }
    }

    fn refresh_webcam(&mut self, ctx: &egui::Context) {
        let frame = self.webcam.read();
        let image = to_color_image(&frame);
        match &mut self.webcam_texture {
            Some(texture) => texture.set(image, TextureOptions::LINEAR),
            None => self.webcam_texture = Some(ctx.load_texture("webcam", image, TextureOptions::LINEAR)),
        }

        match self.webcam.status() {
            SourceStatus::Degraded if !self.camera_degraded => {
                warn!("Camera degraded; preview shows the last captured frame");
                self.camera_degraded = true;
            }
            SourceStatus::Live if self.camera_degraded => {
                info!("Camera preview live again");
                self.camera_degraded = false;
            }
            _ => {}
        }
    }

    fn refresh_screen(&mut self, ctx: &egui::Context) {
        let due = self.last_screen_grab.is_none_or(|at| at.elapsed() >= SCREEN_GRAB_INTERVAL);
        if !due {
            return;
        }
        self.last_screen_grab = Some(Instant::now());

        let grab = match capture_screen() {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Screen preview capture failed: {:#}", e);
                return;
            }
        };

        let grab = if grab.width() > SCREEN_THUMBNAIL_WIDTH {
            let height = grab.height() * SCREEN_THUMBNAIL_WIDTH / grab.width();
            image::imageops::thumbnail(&grab, SCREEN_THUMBNAIL_WIDTH, height)
        } else {
            grab
        };

        let image = to_color_image(&grab);
        match &mut self.screen_texture {
            Some(texture) => texture.set(image, TextureOptions::LINEAR),
            None => self.screen_texture = Some(ctx.load_texture("screen", image, TextureOptions::LINEAR)),
        }
    }
}

impl eframe::App for PreviewApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if ctx.input(|i| i.key_pressed(Key::Escape) || i.key_pressed(Key::Q)) {
            ctx.send_viewport_cmd(ViewportCommand::Close);
            return;
        }

        self.refresh_webcam(ctx);
        self.refresh_screen(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.label("Listening. Press Esc or q to quit.");
            if self.camera_degraded {
                ui.colored_label(egui::Color32::YELLOW, "Camera unavailable - showing last frame");
            }
        });

        egui::Window::new("Webcam").show(ctx, |ui| match &self.webcam_texture {
            Some(texture) => {
                ui.add(egui::Image::new(texture).max_width(PREVIEW_WIDTH));
            }
            None => {
                ui.label("Waiting for camera...");
            }
        });

        egui::Window::new("Screen").show(ctx, |ui| match &self.screen_texture {
            Some(texture) => {
                ui.add(egui::Image::new(texture).max_width(PREVIEW_WIDTH));
            }
            None => {
                ui.label("Waiting for screen capture...");
            }
        });

        ctx.request_repaint_after(REPAINT_INTERVAL);
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        // Non-blocking stop signal; an in-flight turn checks it at entry.
        self.shutdown.store(true, Ordering::SeqCst);
        debug!("Preview closed, shutdown signalled");
    }
}

fn to_color_image(frame: &RgbImage) -> ColorImage {
    ColorImage::from_rgb([frame.width() as usize, frame.height() as usize], frame.as_raw())
}
