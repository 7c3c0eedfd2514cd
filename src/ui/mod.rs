//! Preview GUI built on eframe/egui.

mod app;

pub use app::PreviewApp;
