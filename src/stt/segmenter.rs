//! Energy-based utterance segmentation.
//!
//! Calibrates an ambient-noise floor from the first second of audio, then
//! runs a small state machine over RMS energy: speech begins when a chunk
//! rises above the threshold, and the utterance ends after a configured run
//! of silence. Completed segments include a short pre-roll so the first
//! syllable is not clipped.

use std::collections::VecDeque;

use tracing::{debug, info};

/// Seconds of audio used for ambient-noise calibration.
const CALIBRATION_SECONDS: f32 = 1.0;

/// Ambient RMS is scaled by this factor to form the speech threshold.
const CALIBRATION_FACTOR: f32 = 2.5;

/// Lower bound on the speech threshold, for very quiet rooms.
const ENERGY_FLOOR: f32 = 0.015;

/// Audio kept from before speech onset.
const PRE_ROLL_SECONDS: f32 = 0.25;

/// Segments shorter than this are discarded as noise blips.
const MIN_UTTERANCE_SECONDS: f32 = 0.3;

/// Runaway utterances are force-completed at this length.
const MAX_UTTERANCE_SECONDS: f32 = 30.0;

enum Phase {
    Calibrating,
    Idle,
    Speaking,
}

/// Splits a continuous mono sample stream into discrete utterances.
pub struct Segmenter {
    sample_rate: u32,
    threshold: f32,
    silence_limit: usize,
    phase: Phase,
    // Calibration accumulators
    calibration_energy: f64,
    calibration_count: usize,
    // Segmentation state
    pre_roll: VecDeque<f32>,
    buffer: Vec<f32>,
    silence_run: usize,
}

impl Segmenter {
    /// Create a segmenter for mono audio at `sample_rate`, ending utterances
    /// after `silence_duration` seconds below the threshold.
    pub fn new(sample_rate: u32, silence_duration: f32) -> Self {
        Self {
            sample_rate,
            threshold: ENERGY_FLOOR,
            silence_limit: (silence_duration * sample_rate as f32) as usize,
            phase: Phase::Calibrating,
            calibration_energy: 0.0,
            calibration_count: 0,
            pre_roll: VecDeque::new(),
            buffer: Vec::new(),
            silence_run: 0,
        }
    }

    /// Feed a chunk of samples; returns a completed utterance when one ends.
    pub fn push(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        match self.phase {
            Phase::Calibrating => {
                self.calibrate(samples);
                None
            }
            Phase::Idle => {
                if rms(samples) >= self.threshold {
                    self.buffer = self.pre_roll.iter().copied().collect();
                    self.buffer.extend_from_slice(samples);
                    self.silence_run = 0;
                    self.phase = Phase::Speaking;
                    debug!("Speech started");
                } else {
                    self.push_pre_roll(samples);
                }
                None
            }
            Phase::Speaking => self.push_speaking(samples),
        }
    }

    fn calibrate(&mut self, samples: &[f32]) {
        self.calibration_energy += samples.iter().map(|s| f64::from(*s) * f64::from(*s)).sum::<f64>();
        self.calibration_count += samples.len();

        let needed = (CALIBRATION_SECONDS * self.sample_rate as f32) as usize;
        if self.calibration_count >= needed {
            let ambient = (self.calibration_energy / self.calibration_count as f64).sqrt() as f32;
            self.threshold = (ambient * CALIBRATION_FACTOR).max(ENERGY_FLOOR);
            self.phase = Phase::Idle;
            info!("Ambient noise calibrated: rms {:.4}, speech threshold {:.4}", ambient, self.threshold);
        }
    }

    fn push_speaking(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        self.buffer.extend_from_slice(samples);

        if rms(samples) >= self.threshold {
            self.silence_run = 0;
        } else {
            self.silence_run += samples.len();
        }

        let max_samples = (MAX_UTTERANCE_SECONDS * self.sample_rate as f32) as usize;
        let min_samples = (MIN_UTTERANCE_SECONDS * self.sample_rate as f32) as usize;

        if self.buffer.len() >= max_samples {
            debug!("Utterance hit maximum length, completing");
            return Some(self.complete());
        }

        if self.silence_run >= self.silence_limit {
            if self.buffer.len() - self.silence_run >= min_samples {
                debug!("Speech ended ({:.1}s)", self.buffer.len() as f32 / self.sample_rate as f32);
                return Some(self.complete());
            }
            // Too short to be speech; drop it and go back to waiting.
            debug!("Discarding {}-sample noise blip", self.buffer.len());
            self.reset_to_idle();
        }

        None
    }

    fn complete(&mut self) -> Vec<f32> {
        let segment = std::mem::take(&mut self.buffer);
        self.reset_to_idle();
        segment
    }

    fn reset_to_idle(&mut self) {
        self.buffer = Vec::new();
        self.silence_run = 0;
        self.pre_roll.clear();
        self.phase = Phase::Idle;
    }

    fn push_pre_roll(&mut self, samples: &[f32]) {
        let capacity = (PRE_ROLL_SECONDS * self.sample_rate as f32) as usize;
        self.pre_roll.extend(samples.iter().copied());
        while self.pre_roll.len() > capacity {
            self.pre_roll.pop_front();
        }
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16000;
    const CHUNK: usize = 512;

    fn feed(segmenter: &mut Segmenter, level: f32, seconds: f32) -> Option<Vec<f32>> {
        let total = (seconds * RATE as f32) as usize;
        let chunk = vec![level; CHUNK];
        let mut result = None;
        for _ in 0..total / CHUNK {
            if let Some(segment) = segmenter.push(&chunk) {
                result = Some(segment);
            }
        }
        result
    }

    #[test]
    fn test_calibration_raises_threshold_above_ambient() {
        let mut segmenter = Segmenter::new(RATE, 0.5);
        feed(&mut segmenter, 0.05, 1.1);
        assert!(segmenter.threshold >= 0.05 * CALIBRATION_FACTOR * 0.99);
    }

    #[test]
    fn test_quiet_room_uses_energy_floor() {
        let mut segmenter = Segmenter::new(RATE, 0.5);
        feed(&mut segmenter, 0.0001, 1.1);
        assert_eq!(segmenter.threshold, ENERGY_FLOOR);
    }

    #[test]
    fn test_speech_then_silence_emits_segment() {
        let mut segmenter = Segmenter::new(RATE, 0.5);
        feed(&mut segmenter, 0.0, 1.1); // calibration
        assert!(feed(&mut segmenter, 0.2, 1.0).is_none()); // still speaking
        let segment = feed(&mut segmenter, 0.0, 0.8).expect("expected a completed utterance");
        // Segment spans the speech plus the trailing silence run.
        assert!(segment.len() >= RATE as usize);
    }

    #[test]
    fn test_silence_alone_emits_nothing() {
        let mut segmenter = Segmenter::new(RATE, 0.5);
        assert!(feed(&mut segmenter, 0.0, 3.0).is_none());
    }

    #[test]
    fn test_short_blip_is_discarded() {
        let mut segmenter = Segmenter::new(RATE, 0.5);
        feed(&mut segmenter, 0.0, 1.1); // calibration
        // 64 ms of noise, well under the minimum utterance length.
        let chunk = vec![0.5f32; 1024];
        assert!(segmenter.push(&chunk).is_none());
        assert!(feed(&mut segmenter, 0.0, 1.0).is_none());
    }
}
