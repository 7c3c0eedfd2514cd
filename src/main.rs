//! Glance - a voice assistant that watches your webcam and screen.
//!
//! A background listener segments microphone audio into utterances; each
//! utterance is transcribed, combined with fresh webcam and screen snapshots
//! into one multimodal chat request, and the reply is spoken back through
//! streamed PCM synthesis. A foreground window shows live previews and owns
//! the process lifetime.

mod assistant;
mod audio;
mod config;
mod llm;
mod stt;
mod tts;
mod ui;
mod vision;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::LocalTime;

use assistant::Assistant;
use audio::{Capturer, Playback};
use config::AppConfig;
use llm::{LlmClient, select_model};
use stt::{Segmenter, Transcriber};
use tts::Synthesizer;
use ui::PreviewApp;
use vision::{WebcamStream, capture_screen_encoded};

/// Sample rate of the synthesis endpoint's PCM output (mono, s16).
const TTS_SAMPLE_RATE: u32 = 24000;

/// Spawn the turn worker: receives completed utterances, transcribes them,
/// snapshots both frame sources, and dispatches inference + speech output.
///
/// Utterances are processed strictly one at a time, which serializes history
/// mutation and playback. Errors inside a turn are logged and must never
/// terminate the worker.
fn spawn_turn_task(
    mut segment_rx: mpsc::Receiver<Vec<f32>>,
    transcriber: Transcriber,
    mut assistant: Assistant,
    webcam: Arc<WebcamStream>,
    shutdown: Arc<AtomicBool>,
    jpeg_quality: u8,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while !shutdown.load(Ordering::Relaxed) {
            // Use timeout to allow shutdown checks
            let samples = match tokio::time::timeout(Duration::from_millis(100), segment_rx.recv()).await {
                Ok(Some(samples)) => samples,
                Ok(None) => {
                    debug!("Segment channel closed");
                    break;
                }
                Err(_) => continue,
            };

            // Stop signal checked at callback entry; an utterance segmented
            // during shutdown is simply dropped.
            if shutdown.load(Ordering::Relaxed) {
                break;
            }

            if let Err(e) = run_turn(&transcriber, &mut assistant, &webcam, jpeg_quality, &samples).await {
                error!("❌ Turn failed: {:#}", e);
            }
        }
        debug!("Turn worker exiting");
    })
}

/// One utterance end to end.
async fn run_turn(
    transcriber: &Transcriber,
    assistant: &mut Assistant,
    webcam: &WebcamStream,
    jpeg_quality: u8,
    samples: &[f32],
) -> Result<()> {
    let transcript = match transcriber.transcribe(samples).await? {
        Some(text) => text,
        None => {
            info!("Didn't catch that.");
            return Ok(());
        }
    };

    info!("🗣️ You: {}", transcript);

    // Snapshot both sources at utterance time, before inference.
    let screen_b64 = tokio::task::spawn_blocking(move || capture_screen_encoded(jpeg_quality))
        .await
        .context("screen capture task panicked")??;
    let webcam_b64 = webcam.read_encoded(jpeg_quality)?;

    if let Some(reply) = assistant.answer(&transcript, &screen_b64, &webcam_b64).await? {
        info!("🤖 Assistant: {}", reply);
    }

    Ok(())
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_args();

    // Respect RUST_LOG env var, fallback to verbose flag, default to info
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| if config.verbose { EnvFilter::try_new("debug") } else { EnvFilter::try_new("info") })
        .unwrap();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(LocalTime::new(time::macros::format_description!("[hour]:[minute]:[second]")))
        .init();

    info!("👁️ Glance v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.validate() {
        error!("❌ Configuration error: {}", e);
        std::process::exit(1);
    }
    config.log_config();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    // One-time model selection with the static fallback chain. Fatal only
    // when probing is possible and no identifier works at all.
    let http = reqwest::Client::new();
    let model = runtime.block_on(select_model(&http, &config.api_base_url, &config.api_key, &config.model))?;

    // An entirely inaccessible camera is the other fatal startup condition.
    let webcam = Arc::new(WebcamStream::new(config.camera_index)?);
    webcam.start();

    let playback = Playback::new(TTS_SAMPLE_RATE)?;
    let assistant = Assistant::new(LlmClient::new(&config, model), Synthesizer::new(&config), playback);
    let transcriber = Transcriber::new(&config);

    // Speech listener: microphone -> segmenter -> turn worker channel.
    // Calibration runs on the first second of audio after capture starts.
    let (segment_tx, segment_rx) = mpsc::channel::<Vec<f32>>(8);
    let mut segmenter = Segmenter::new(config.sample_rate, config.silence_duration);
    let mut capturer = Capturer::new(config.sample_rate, move |samples: &[f32]| {
        if let Some(segment) = segmenter.push(samples)
            && segment_tx.try_send(segment).is_err()
        {
            warn!("Dropped an utterance: turn worker is behind");
        }
    })?;
    capturer.start()?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let turn_handle = {
        // Enter the runtime only to spawn; the guard must not outlive this
        // block or the shutdown block_on below would panic.
        let _guard = runtime.enter();
        spawn_turn_task(segment_rx, transcriber, assistant, webcam.clone(), shutdown.clone(), config.jpeg_quality)
    };

    info!("Listening. Press Esc or q in the preview window to quit.");

    // The display loop owns the main thread until the user exits.
    let webcam_for_ui = webcam.clone();
    let shutdown_for_ui = shutdown.clone();
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1000.0, 620.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Glance",
        options,
        Box::new(move |cc| Ok(Box::new(PreviewApp::new(cc, webcam_for_ui, shutdown_for_ui)))),
    )
    .map_err(|e| anyhow::anyhow!("display loop failed: {e}"))?;

    // Orderly shutdown: signal first, then stop devices, then give the turn
    // worker a bounded window to finish an in-flight turn.
    shutdown.store(true, Ordering::SeqCst);
    capturer.shutdown();
    webcam.stop();

    runtime.block_on(async {
        tokio::select! {
            _ = turn_handle => {
                debug!("Turn worker finished gracefully");
            }
            _ = tokio::time::sleep(Duration::from_millis(500)) => {
                debug!("Turn worker didn't finish in time");
            }
        }
    });

    info!("✅ Assistant stopped");
    Ok(())
}
