//! Streaming audio resampling built on rubato's FFT resampler.
//!
//! Both directions of the pipeline use the same state: microphone capture
//! (device rate down to the recognizer's 16 kHz) and synthesis playback
//! (24 kHz up to the device rate). Samples arrive in arbitrary chunk sizes
//! from callbacks, so input is accumulated until a full FFT chunk is ready.

use anyhow::{Context, Result};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{Fft, FixedSync, Resampler};

/// FFT chunk size in frames.
const CHUNK_SIZE: usize = 1024;

/// Sub-chunks per FFT chunk; two is a good quality/CPU balance.
const SUB_CHUNKS: usize = 2;

/// Streaming mono resampler with internal accumulation.
pub struct StreamResampler {
    resampler: Fft<f32>,
    pending: Vec<f32>,
    output: Vec<f32>,
    output_frames_max: usize,
}

impl StreamResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self> {
        let resampler = Fft::<f32>::new(
            from_rate as usize,
            to_rate as usize,
            CHUNK_SIZE,
            SUB_CHUNKS,
            1, // mono
            FixedSync::Input,
        )
        .context("failed to create resampler")?;

        let output_frames_max = resampler.output_frames_max();

        Ok(Self {
            resampler,
            pending: Vec::with_capacity(CHUNK_SIZE * 2),
            output: vec![0.0f32; output_frames_max],
            output_frames_max,
        })
    }

    /// Feed samples in, get resampled samples out.
    ///
    /// Input shorter than a full chunk is buffered; the returned vector may
    /// be empty until enough input has accumulated.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        self.pending.extend_from_slice(samples);

        let mut produced = Vec::new();
        while self.pending.len() >= CHUNK_SIZE {
            let chunk: Vec<f32> = self.pending.drain(..CHUNK_SIZE).collect();
            if let Some(frames) = self.process_chunk(&chunk) {
                produced.extend_from_slice(&self.output[..frames]);
            }
        }
        produced
    }

    /// Flush the tail: pad the remaining input to a full chunk and return the
    /// proportional share of the output. Call once, when the stream ends.
    pub fn flush(&mut self) -> Vec<f32> {
        if self.pending.is_empty() {
            return Vec::new();
        }

        let remainder = self.pending.len();
        let mut chunk = std::mem::take(&mut self.pending);
        chunk.resize(CHUNK_SIZE, 0.0);

        match self.process_chunk(&chunk) {
            Some(frames) => {
                let useful = (frames * remainder).div_ceil(CHUNK_SIZE).min(frames);
                self.output[..useful].to_vec()
            }
            None => Vec::new(),
        }
    }

    fn process_chunk(&mut self, chunk: &[f32]) -> Option<usize> {
        let input = InterleavedSlice::new(chunk, 1, CHUNK_SIZE).ok()?;
        let mut output = InterleavedSlice::new_mut(&mut self.output, 1, self.output_frames_max).ok()?;

        match self.resampler.process_into_buffer(&input, &mut output, None) {
            Ok((_, frames_written)) => Some(frames_written),
            Err(e) => {
                tracing::error!("Resampling error: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsampling_ratio() {
        let mut resampler = StreamResampler::new(16000, 48000).unwrap();
        let mut out = resampler.process(&vec![0.0f32; 16000]);
        out.extend(resampler.flush());
        // Roughly 3x, allowing for FFT chunking at the edges.
        assert!(out.len() > 46000 && out.len() < 50000, "got {}", out.len());
    }

    #[test]
    fn test_downsampling_ratio() {
        let mut resampler = StreamResampler::new(48000, 16000).unwrap();
        let mut out = resampler.process(&vec![0.0f32; 48000]);
        out.extend(resampler.flush());
        assert!(out.len() > 15000 && out.len() < 17000, "got {}", out.len());
    }

    #[test]
    fn test_small_chunks_accumulate() {
        let mut resampler = StreamResampler::new(24000, 48000).unwrap();
        // Feeding less than one FFT chunk produces nothing yet.
        assert!(resampler.process(&vec![0.0f32; 100]).is_empty());
        // The rest of the chunk flushes it through.
        let out = resampler.process(&vec![0.0f32; CHUNK_SIZE]);
        assert!(!out.is_empty());
    }
}
