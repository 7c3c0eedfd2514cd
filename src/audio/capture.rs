//! Microphone capture using cpal.
//!
//! The device callback downmixes to mono, resamples to the recognizer rate
//! when the device rate differs, and pushes into a lock-free ring buffer. A
//! drain thread empties the ring buffer and hands samples to the consumer
//! callback, so recognizer work never runs on the audio thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use parking_lot::Mutex;
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use tracing::{debug, info, warn};

use super::resampler::StreamResampler;
use super::util::{downmix_to_mono, find_best_config, get_device_name};

/// Ring buffer capacity in samples (~4 seconds at 16 kHz).
const CAPTURE_RING_SIZE: usize = 65536;

/// Audio capturer that streams mono samples from the default input device.
pub struct Capturer {
    stream: Stream,
    running: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    drain_handle: Option<std::thread::JoinHandle<()>>,
}

impl Capturer {
    /// Create a new capturer delivering mono samples at `sample_rate`.
    ///
    /// # Errors
    /// Returns an error if no input device is available or the stream cannot
    /// be built.
    pub fn new<F>(sample_rate: u32, mut callback: F) -> Result<Self>
    where
        F: FnMut(&[f32]) + Send + 'static,
    {
        let host = cpal::default_host();
        let device = host.default_input_device().context("No input device available")?;

        info!("Using input device: {}", get_device_name(&device));

        let supported_configs = device.supported_input_configs().context("Failed to get supported input configs")?;
        let config = find_best_config(supported_configs, sample_rate)?;
        let device_sample_rate = config.sample_rate();

        if device_sample_rate != sample_rate {
            info!("Device sample rate {} Hz differs from target {} Hz - resampling will be applied", device_sample_rate, sample_rate);
        }

        debug!("Audio capture config: {} Hz, {} channels, {:?}", device_sample_rate, config.channels(), config.sample_format());

        let running = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));
        let running_for_stream = running.clone();
        let channels = config.channels() as usize;
        let stream_config: StreamConfig = config.config();

        let ring = HeapRb::<f32>::new(CAPTURE_RING_SIZE);
        let (mut producer, mut consumer) = ring.split();

        let resampler = if device_sample_rate != sample_rate {
            Some(Arc::new(Mutex::new(StreamResampler::new(device_sample_rate, sample_rate)?)))
        } else {
            None
        };

        let err_fn = |err| {
            tracing::error!("Audio capture error: {}", err);
        };

        let stream = device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if !running_for_stream.load(Ordering::Relaxed) {
                    return;
                }

                let mono = downmix_to_mono(data, channels);
                let samples = match &resampler {
                    Some(state) => state.lock().process(&mono),
                    None => mono,
                };

                if samples.is_empty() {
                    return;
                }

                let written = producer.push_slice(&samples);
                if written < samples.len() {
                    static DROP_COUNT: AtomicU64 = AtomicU64::new(0);
                    let count = DROP_COUNT.fetch_add(1, Ordering::Relaxed);
                    if count.is_multiple_of(100) {
                        warn!("Capture ring buffer full, dropped {} audio chunks", count + 1);
                    }
                }
            },
            err_fn,
            None,
        )?;

        // Drain thread: pull samples off the ring buffer and invoke the
        // consumer callback on this thread, not the audio thread.
        let drain_running = running.clone();
        let drain_shutdown = shutdown.clone();
        let drain_handle = std::thread::spawn(move || {
            let mut read_buffer = vec![0.0f32; 2048];

            loop {
                if drain_shutdown.load(Ordering::Relaxed) {
                    debug!("Capture drain thread shutting down");
                    return;
                }

                if !drain_running.load(Ordering::Relaxed) {
                    std::thread::sleep(std::time::Duration::from_millis(10));
                    continue;
                }

                let available = consumer.occupied_len();
                if available == 0 {
                    std::thread::sleep(std::time::Duration::from_micros(500));
                    continue;
                }

                let to_read = available.min(read_buffer.len());
                let read = consumer.pop_slice(&mut read_buffer[..to_read]);
                if read > 0 {
                    callback(&read_buffer[..read]);
                }
            }
        });

        info!("Audio capture configured: device {} Hz -> output {} Hz", device_sample_rate, sample_rate);

        Ok(Self { stream, running, shutdown, drain_handle: Some(drain_handle) })
    }

    /// Start capturing audio. Idempotent.
    pub fn start(&mut self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        self.stream.play().context("Failed to start audio stream")?;
        info!("Audio capture started");
        Ok(())
    }

    /// Permanently stop capture and join the drain thread.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        let _ = self.stream.pause();

        if let Some(handle) = self.drain_handle.take() {
            std::thread::sleep(std::time::Duration::from_millis(100));
            if !handle.is_finished() {
                warn!("Capture drain thread didn't exit in time");
            }
            if let Err(e) = handle.join() {
                warn!("Failed to join capture drain thread: {:?}", e);
            }
            info!("Audio capture stopped");
        }
    }
}

impl Drop for Capturer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
