//! Streamed speech synthesis.
//!
//! Requests a raw-PCM rendering of the reply from the hosted endpoint and
//! writes each chunk to a scoped playback sink in arrival order. The sink is
//! drained on success and dropped (closing the device) on any failure, so
//! both the HTTP stream and the output stream are released on every exit
//! path.

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::audio::Playback;
use crate::config::AppConfig;

/// Client for the hosted speech-synthesis endpoint.
pub struct Synthesizer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    voice: String,
}

impl Synthesizer {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.api_base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.tts_model.clone(),
            voice: config.tts_voice.clone(),
        }
    }

    /// Synthesize `text` and play it through one scoped output stream.
    ///
    /// # Errors
    /// Returns an error on transport failures, non-success responses, or
    /// audio device failures; resources are released in all cases.
    pub async fn speak(&self, text: &str, playback: &Playback) -> Result<()> {
        if text.trim().is_empty() {
            return Ok(());
        }

        let mut sink = playback.open_sink()?;

        let body = build_speech_body(&self.model, &self.voice, text);
        let mut response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("synthesis request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("synthesis error {status}: {body}");
        }

        let mut received = 0usize;
        while let Some(chunk) = response.chunk().await.context("synthesis stream interrupted")? {
            received += chunk.len();
            sink.write(&chunk).await?;
        }

        debug!("Synthesis stream complete ({} bytes)", received);
        sink.drain().await?;

        info!("🔊 Spoke reply ({} chars)", text.chars().count());
        Ok(())
    }
}

/// Build the synthesis request body: raw PCM output so chunks can be written
/// straight to the device.
fn build_speech_body(model: &str, voice: &str, text: &str) -> Value {
    json!({
        "model": model,
        "voice": voice,
        "response_format": "pcm",
        "input": text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speech_body_carries_exact_text() {
        let body = build_speech_body("tts-1", "alloy", "A laptop on a desk.");
        assert_eq!(body["input"], "A laptop on a desk.");
        assert_eq!(body["voice"], "alloy");
        assert_eq!(body["model"], "tts-1");
        assert_eq!(body["response_format"], "pcm");
    }
}
