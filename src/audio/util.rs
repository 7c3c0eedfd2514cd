//! Shared audio utilities: device configuration, channel downmix, and the
//! sample conversions used at the service boundaries (WAV upload for
//! transcription, s16-LE PCM from synthesis).

use anyhow::{Context, Result};
use cpal::traits::DeviceTrait;
use cpal::{Device, SampleFormat, SupportedStreamConfig, SupportedStreamConfigRange};

/// Get a human-readable device name.
pub fn get_device_name(device: &Device) -> String {
    device.description().ok().map(|desc| desc.name().to_string()).unwrap_or_else(|| "Unknown".to_string())
}

/// Find the best matching audio configuration.
///
/// Accepts mono or stereo F32 configurations only, preferring one that spans
/// the target sample rate and otherwise clamping to the closest supported
/// rate (the resampler covers the difference).
pub fn find_best_config(
    configs: impl Iterator<Item = SupportedStreamConfigRange>,
    target_sample_rate: u32,
) -> Result<SupportedStreamConfig> {
    let f32_configs: Vec<SupportedStreamConfigRange> =
        configs.filter(|c| c.channels() <= 2 && c.sample_format() == SampleFormat::F32).collect();

    if f32_configs.is_empty() {
        anyhow::bail!("No F32 audio configuration found - this is unexpected on modern hardware");
    }

    for config in &f32_configs {
        if target_sample_rate >= config.min_sample_rate() && target_sample_rate <= config.max_sample_rate() {
            return Ok((*config).with_sample_rate(target_sample_rate));
        }
    }

    let config = &f32_configs[0];
    let rate = if target_sample_rate < config.min_sample_rate() { config.min_sample_rate() } else { config.max_sample_rate() };
    Ok((*config).with_sample_rate(rate))
}

/// Downmix interleaved f32 samples to mono by averaging channels.
pub fn downmix_to_mono(data: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        data.to_vec()
    } else {
        data.chunks(channels).map(|frame| frame.iter().sum::<f32>() / channels as f32).collect()
    }
}

/// Encode mono f32 samples as a 16-bit PCM WAV byte buffer.
///
/// The transcription endpoint takes a WAV upload; this is the only place the
/// crate produces one.
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).context("failed to create WAV writer")?;
        for &sample in samples {
            let value = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer.write_sample(value).context("failed to write WAV sample")?;
        }
        writer.finalize().context("failed to finalize WAV")?;
    }

    Ok(cursor.into_inner())
}

/// Decode little-endian s16 PCM bytes to f32 samples in [-1.0, 1.0].
///
/// `bytes` must hold an even number of bytes; synthesis chunks are re-aligned
/// by the caller before conversion.
pub fn pcm_s16le_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes.chunks_exact(2).map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_downmix() {
        let data = vec![0.5f32, 1.0, -0.5, -1.0];
        let result = downmix_to_mono(&data, 2);
        assert_eq!(result, vec![0.75, -0.75]);
    }

    #[test]
    fn test_mono_downmix_is_identity() {
        let data = vec![0.25f32, -0.25];
        assert_eq!(downmix_to_mono(&data, 1), data);
    }

    #[test]
    fn test_samples_to_wav_header_and_length() {
        let samples = vec![0.0f32; 160];
        let wav = samples_to_wav(&samples, 16000).unwrap();

        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        // 44-byte canonical header + 2 bytes per sample
        assert_eq!(wav.len(), 44 + samples.len() * 2);
    }

    #[test]
    fn test_pcm_s16le_scale_and_sign() {
        let bytes = [0x00, 0x40, 0x00, 0xC0]; // +16384, -16384
        let samples = pcm_s16le_to_f32(&bytes);
        assert!((samples[0] - 0.5).abs() < 1e-4);
        assert!((samples[1] + 0.5).abs() < 1e-4);
    }
}
