//! Hosted speech recognition.
//!
//! Uploads one utterance as a WAV file to the transcription endpoint with
//! model and language hints. An empty transcript is the service's "no speech
//! recognized" answer and is reported as `Ok(None)` so callers can treat it
//! as a no-op rather than an error.

use anyhow::{Context, Result};
use reqwest::multipart;
use tracing::debug;

use crate::audio::util::samples_to_wav;
use crate::config::AppConfig;

#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Client for the hosted transcription endpoint.
pub struct Transcriber {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    language: String,
    sample_rate: u32,
}

impl Transcriber {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.api_base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.stt_model.clone(),
            language: config.stt_language.clone(),
            sample_rate: config.sample_rate,
        }
    }

    /// Transcribe one utterance.
    ///
    /// Returns `Ok(None)` when the recognizer heard no intelligible speech.
    ///
    /// # Errors
    /// Returns an error on transport failures or non-success responses.
    pub async fn transcribe(&self, samples: &[f32]) -> Result<Option<String>> {
        if samples.is_empty() {
            return Ok(None);
        }

        debug!("Transcribing {} samples", samples.len());

        let wav = samples_to_wav(samples, self.sample_rate)?;
        let part = multipart::Part::bytes(wav)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .context("failed to build audio upload part")?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("language", self.language.clone());

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .context("transcription request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("transcription error {status}: {body}");
        }

        let result: TranscriptionResponse = response.json().await.context("failed to parse transcription response")?;

        let text = result.text.trim().to_string();
        if text.is_empty() {
            debug!("No speech recognized");
            return Ok(None);
        }

        Ok(Some(text))
    }
}
