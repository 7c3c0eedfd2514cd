//! Application configuration and CLI argument parsing.

use anyhow::Result;
use clap::Parser;
use tracing::info;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a visual and voice assistant. You receive the user's spoken words \
together with a capture of their screen and their webcam. Use everything you can see to answer. Keep replies \
short, friendly, and witty. Plain spoken language only: no emojis, no markdown, no long stories.";

/// Voice assistant application configuration.
#[derive(Parser, Debug, Clone)]
#[command(name = "glance")]
#[command(author, version, about = "A voice assistant that watches your webcam and screen", long_about = None)]
pub struct AppConfig {
    /// API key for the hosted model endpoints. Missing keys fail at the
    /// first request rather than at startup.
    #[arg(long, env = "OPENAI_API_KEY", default_value = "", hide_env_values = true)]
    pub api_key: String,

    /// Base URL for the hosted model endpoints
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub api_base_url: String,

    /// Preferred chat model (a fixed fallback chain is tried when unavailable)
    #[arg(long, short = 'm', env = "GLANCE_MODEL", default_value = "gpt-5-mini")]
    pub model: String,

    /// Transcription model
    #[arg(long, default_value = "whisper-1")]
    pub stt_model: String,

    /// Transcription language hint
    #[arg(long, default_value = "en")]
    pub stt_language: String,

    /// Speech synthesis model
    #[arg(long, default_value = "tts-1")]
    pub tts_model: String,

    /// Speech synthesis voice
    #[arg(long, default_value = "alloy")]
    pub tts_voice: String,

    /// Camera device index
    #[arg(long, default_value = "0")]
    pub camera_index: u32,

    /// Audio sample rate for speech recognition
    #[arg(long, default_value = "16000")]
    pub sample_rate: u32,

    /// Silence duration in seconds that ends an utterance
    #[arg(long, default_value = "0.8")]
    pub silence_duration: f32,

    /// JPEG quality (1-100) for frames embedded in model requests
    #[arg(long, default_value = "80")]
    pub jpeg_quality: u8,

    /// System prompt for the chat model
    #[arg(long, short = 'p', default_value = DEFAULT_SYSTEM_PROMPT)]
    pub system_prompt: String,

    /// Chat model temperature (0.0-2.0)
    #[arg(long, default_value = "0.7", value_parser = parse_temperature)]
    pub temperature: f32,

    /// Maximum chat completion length in tokens
    #[arg(long, default_value = "1000")]
    pub max_tokens: u32,

    /// Enable verbose logging
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl AppConfig {
    /// Parse configuration from command line arguments.
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.silence_duration <= 0.0 {
            anyhow::bail!("Silence duration must be positive");
        }

        if !(1..=100).contains(&self.jpeg_quality) {
            anyhow::bail!("JPEG quality must be between 1 and 100");
        }

        if self.sample_rate == 0 {
            anyhow::bail!("Sample rate must be positive");
        }

        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        info!("Configuration:");
        info!("  API base URL: {}", self.api_base_url);
        info!("  Chat model: {}", self.model);
        info!("  STT model: {} ({})", self.stt_model, self.stt_language);
        info!("  TTS model: {} (voice: {})", self.tts_model, self.tts_voice);
        info!("  Camera index: {}", self.camera_index);
        info!("  Sample rate: {} Hz", self.sample_rate);
        info!("  Silence duration: {}s", self.silence_duration);
        info!("  JPEG quality: {}", self.jpeg_quality);
        info!("  System prompt: {}...", &self.system_prompt.chars().take(50).collect::<String>());
        if self.api_key.is_empty() {
            info!("  API key: not set (requests will fail until provided)");
        }
    }
}

/// Parse and validate temperature value (0.0-2.0).
fn parse_temperature(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|_| format!("'{}' is not a valid float", s))?;
    if (0.0..=2.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("temperature must be between 0.0 and 2.0, got {}", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::parse_from(["glance"])
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = base_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.temperature, 0.7);
        assert_eq!(config.max_tokens, 1000);
        assert_eq!(config.sample_rate, 16000);
    }

    #[test]
    fn test_parse_temperature_bounds() {
        assert!(parse_temperature("0.0").is_ok());
        assert!(parse_temperature("2.0").is_ok());
        assert!(parse_temperature("2.1").is_err());
        assert!(parse_temperature("abc").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_quality() {
        let mut config = base_config();
        config.jpeg_quality = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_nonpositive_silence() {
        let mut config = base_config();
        config.silence_duration = 0.0;
        assert!(config.validate().is_err());
    }
}
