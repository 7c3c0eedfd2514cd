//! Speech playback using cpal.
//!
//! The synthesis endpoint streams raw s16-LE PCM; each reply gets its own
//! scoped output stream ([`PcmSink`]) so the device is released when the
//! reply finishes or fails partway. Chunks are converted, resampled to the
//! device rate, and queued through a lock-free ring buffer that the audio
//! callback drains.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Producer, Split};
use tracing::{debug, info, warn};

use super::resampler::StreamResampler;
use super::util::{find_best_config, get_device_name, pcm_s16le_to_f32};

/// Ring buffer capacity in samples (~10 seconds at 48 kHz).
const PLAYBACK_RING_SIZE: usize = 524288;

/// Pause while waiting for ring buffer space or queued samples to play out.
const WAIT_INTERVAL: Duration = Duration::from_millis(20);

/// Output device handle with a resolved stream configuration.
///
/// Created once at startup; [`open_sink`](Self::open_sink) builds one stream
/// per spoken reply.
pub struct Playback {
    device: Device,
    config: StreamConfig,
    device_sample_rate: u32,
    input_sample_rate: u32,
}

impl Playback {
    /// Resolve the default output device and a configuration near the
    /// device's preferred rate.
    ///
    /// # Errors
    /// Returns an error if no output device is available or no usable
    /// configuration exists.
    pub fn new(input_sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device().context("No output device available")?;

        info!("Using output device: {}", get_device_name(&device));

        let preferred_rate = device.default_output_config().map(|c| c.sample_rate()).unwrap_or(48000);

        let supported_configs = device.supported_output_configs().context("Failed to get supported output configs")?;
        let config = find_best_config(supported_configs, preferred_rate)?;
        let device_sample_rate = config.sample_rate();

        if device_sample_rate != input_sample_rate {
            info!("Device sample rate {} Hz differs from input {} Hz - resampling will be applied", device_sample_rate, input_sample_rate);
        }

        Ok(Self { device, config: config.config(), device_sample_rate, input_sample_rate })
    }

    /// Open a playback stream for one reply.
    pub fn open_sink(&self) -> Result<PcmSink> {
        let ring = HeapRb::<f32>::new(PLAYBACK_RING_SIZE);
        let (producer, mut consumer) = ring.split();

        let queued = Arc::new(AtomicUsize::new(0));
        let queued_for_stream = queued.clone();
        let channels = self.config.channels as usize;

        let err_fn = |err| {
            tracing::error!("Audio playback error: {}", err);
        };

        let stream = self.device.build_output_stream(
            &self.config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut consumed = 0;
                for frame in data.chunks_mut(channels) {
                    let sample = match consumer.try_pop() {
                        Some(sample) => {
                            consumed += 1;
                            sample
                        }
                        None => 0.0,
                    };
                    // Duplicate the mono sample to all channels.
                    for channel in frame.iter_mut() {
                        *channel = sample;
                    }
                }
                if consumed > 0 {
                    queued_for_stream.fetch_sub(consumed, Ordering::Relaxed);
                }
            },
            err_fn,
            None,
        )?;

        stream.play().context("Failed to start playback stream")?;
        debug!("Playback stream opened at {} Hz", self.device_sample_rate);

        let resampler = if self.device_sample_rate != self.input_sample_rate {
            Some(StreamResampler::new(self.input_sample_rate, self.device_sample_rate)?)
        } else {
            None
        };

        Ok(PcmSink {
            stream: Some(stream),
            producer,
            resampler,
            carry: None,
            queued,
            device_sample_rate: self.device_sample_rate,
        })
    }
}

/// One reply's playback stream. Dropping the sink closes the stream even if
/// writing failed partway.
pub struct PcmSink {
    stream: Option<Stream>,
    producer: ringbuf::HeapProd<f32>,
    resampler: Option<StreamResampler>,
    carry: Option<u8>,
    queued: Arc<AtomicUsize>,
    device_sample_rate: u32,
}

impl PcmSink {
    /// Queue one chunk of s16-LE PCM bytes, preserving arrival order.
    ///
    /// Applies backpressure by waiting for ring buffer space rather than
    /// dropping samples.
    pub async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        // Re-align on sample boundaries across chunk splits.
        let mut bytes = Vec::with_capacity(chunk.len() + 1);
        if let Some(byte) = self.carry.take() {
            bytes.push(byte);
        }
        bytes.extend_from_slice(chunk);
        if bytes.len() % 2 != 0 {
            self.carry = bytes.pop();
        }

        let samples = pcm_s16le_to_f32(&bytes);
        let samples = match &mut self.resampler {
            Some(resampler) => resampler.process(&samples),
            None => samples,
        };

        self.queue_samples(&samples).await;
        Ok(())
    }

    /// Flush the resampler tail, wait for queued audio to play out, and close
    /// the stream.
    pub async fn drain(mut self) -> Result<()> {
        let tail = match &mut self.resampler {
            Some(resampler) => resampler.flush(),
            None => Vec::new(),
        };
        if !tail.is_empty() {
            self.queue_samples(&tail).await;
        }

        let remaining = self.queued.load(Ordering::Relaxed);
        let play_time = Duration::from_secs_f64(remaining as f64 / self.device_sample_rate as f64);
        let deadline = std::time::Instant::now() + play_time + Duration::from_secs(1);

        while self.queued.load(Ordering::Relaxed) > 0 {
            if std::time::Instant::now() > deadline {
                warn!("Playback drain timed out with samples still queued");
                break;
            }
            tokio::time::sleep(WAIT_INTERVAL).await;
        }

        // Let the device play out its own buffered frames.
        tokio::time::sleep(Duration::from_millis(100)).await;

        debug!("Playback stream drained");
        Ok(())
    }

    async fn queue_samples(&mut self, samples: &[f32]) {
        let mut offset = 0;
        while offset < samples.len() {
            let written = self.producer.push_slice(&samples[offset..]);
            self.queued.fetch_add(written, Ordering::Relaxed);
            offset += written;
            if offset < samples.len() {
                tokio::time::sleep(WAIT_INTERVAL).await;
            }
        }
    }
}

impl Drop for PcmSink {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
        }
    }
}
