//! Hosted chat-completion client with multimodal turns.
//!
//! Each turn embeds the spoken transcript plus two inline JPEG data URIs
//! (screen, webcam) in a single user message, preceded by the system prompt
//! and the accumulated history. History belongs to one implicit session and
//! grows for the process lifetime; it is only mutated after a successful
//! response, so a failed call leaves it untouched.

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::vision::data_uri;

/// Models tried in order after the preferred one fails to initialize.
const FALLBACK_MODELS: &[&str] = &["gpt-4o-mini", "gpt-4o"];

/// Pick a working chat model at startup.
///
/// Probes the preferred identifier and then the fixed fallback chain against
/// the models endpoint, returning the first one the service knows. With no
/// API key configured the probe is skipped and the preferred identifier is
/// returned as-is; the missing credential then surfaces at the first request.
///
/// # Errors
/// Returns an error when probing is possible and no identifier works.
pub async fn select_model(client: &reqwest::Client, base_url: &str, api_key: &str, preferred: &str) -> Result<String> {
    if api_key.is_empty() {
        warn!("No API key configured; using model '{}' unprobed", preferred);
        return Ok(preferred.to_string());
    }

    let mut candidates = vec![preferred];
    candidates.extend(FALLBACK_MODELS.iter().copied().filter(|m| *m != preferred));

    for candidate in candidates {
        match probe_model(client, base_url, api_key, candidate).await {
            Ok(()) => {
                info!("Using chat model: {}", candidate);
                return Ok(candidate.to_string());
            }
            Err(e) => {
                warn!("Model '{}' unavailable: {:#}", candidate, e);
            }
        }
    }

    anyhow::bail!("no working chat model found (tried '{preferred}' and fallbacks {FALLBACK_MODELS:?})")
}

async fn probe_model(client: &reqwest::Client, base_url: &str, api_key: &str, model: &str) -> Result<()> {
    let response = client
        .get(format!("{base_url}/models/{model}"))
        .bearer_auth(api_key)
        .send()
        .await
        .context("model probe request failed")?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("model probe returned {status}: {body}");
    }

    Ok(())
}

/// Chat client owning the single-session conversation history.
pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    system_prompt: String,
    temperature: f32,
    max_tokens: u32,
    history: Vec<Value>,
}

impl LlmClient {
    /// Create a client for the given (already selected) model.
    pub fn new(config: &AppConfig, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.api_base_url.clone(),
            api_key: config.api_key.clone(),
            model,
            system_prompt: config.system_prompt.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            history: Vec::new(),
        }
    }

    /// Run one inference turn.
    ///
    /// An empty or whitespace-only transcript short-circuits to `Ok(None)`:
    /// no request is sent and history is not touched. On success the human
    /// turn and the assistant turn are appended to history, in that order,
    /// and the trimmed reply is returned.
    ///
    /// # Errors
    /// Returns an error on transport failures, non-success responses, or a
    /// malformed completion; history is unchanged in every error case.
    pub async fn chat(&mut self, transcript: &str, screen_b64: &str, webcam_b64: &str) -> Result<Option<String>> {
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return Ok(None);
        }

        let user_message = build_user_message(transcript, screen_b64, webcam_b64);
        let body = build_request_body(&self.model, &self.system_prompt, &self.history, &user_message, self.temperature, self.max_tokens);

        debug!("User: {}", transcript);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("chat request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("chat completion error {status}: {body}");
        }

        let completion: Value = response.json().await.context("failed to parse chat response")?;

        if let Some(error) = completion.get("error") {
            let message = error["message"].as_str().unwrap_or("unknown error");
            anyhow::bail!("chat completion error: {message}");
        }

        let reply = completion["choices"]
            .get(0)
            .and_then(|choice| choice["message"]["content"].as_str())
            .context("chat response contained no completion text")?
            .trim()
            .to_string();

        debug!("Assistant: {}", reply);

        self.record_exchange(user_message, &reply);
        Ok(Some(reply))
    }

    /// Append a completed exchange to history: human turn, then assistant.
    fn record_exchange(&mut self, user_message: Value, reply: &str) {
        self.history.push(user_message);
        self.history.push(json!({ "role": "assistant", "content": reply }));
    }
}

/// Build the multimodal user message: transcript text followed by the screen
/// and webcam snapshots as inline image URIs.
fn build_user_message(transcript: &str, screen_b64: &str, webcam_b64: &str) -> Value {
    json!({
        "role": "user",
        "content": [
            { "type": "text", "text": transcript },
            { "type": "image_url", "image_url": { "url": data_uri(screen_b64) } },
            { "type": "image_url", "image_url": { "url": data_uri(webcam_b64) } },
        ]
    })
}

/// Assemble the full request body: system message, prior history in order,
/// then the current user message.
fn build_request_body(
    model: &str,
    system_prompt: &str,
    history: &[Value],
    user_message: &Value,
    temperature: f32,
    max_tokens: u32,
) -> Value {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(json!({ "role": "system", "content": system_prompt }));
    messages.extend(history.iter().cloned());
    messages.push(user_message.clone());

    json!({
        "model": model,
        "messages": messages,
        "temperature": temperature,
        "max_tokens": max_tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    /// Config pointing at an unroutable endpoint so any accidental request
    /// fails immediately instead of reaching a live service.
    fn offline_config() -> AppConfig {
        AppConfig::parse_from(["glance", "--api-base-url", "http://127.0.0.1:1/v1", "--api-key", "test-key"])
    }

    #[test]
    fn test_request_body_ordering() {
        let history = vec![
            json!({ "role": "user", "content": "earlier question" }),
            json!({ "role": "assistant", "content": "earlier answer" }),
        ];
        let user = build_user_message("What do you see?", "U0NSRUVO", "V0VCQ0FN");
        let body = build_request_body("gpt-5-mini", "persona", &history, &user, 0.7, 1000);

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "persona");
        assert_eq!(messages[1]["content"], "earlier question");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[3]["role"], "user");

        let content = messages[3]["content"].as_array().unwrap();
        assert_eq!(content.len(), 3);
        assert_eq!(content[0]["text"], "What do you see?");
        assert_eq!(content[1]["image_url"]["url"], "data:image/jpeg;base64,U0NSRUVO");
        assert_eq!(content[2]["image_url"]["url"], "data:image/jpeg;base64,V0VCQ0FN");

        assert_eq!(body["model"], "gpt-5-mini");
        assert_eq!(body["temperature"], 0.7);
        assert_eq!(body["max_tokens"], 1000);
    }

    #[tokio::test]
    async fn test_empty_transcript_short_circuits() {
        let config = offline_config();
        let mut client = LlmClient::new(&config, "gpt-5-mini".to_string());

        let result = client.chat("   ", "U0NSRUVO", "V0VCQ0FN").await.unwrap();
        assert!(result.is_none());
        assert_eq!(client.history.len(), 0);
    }

    #[tokio::test]
    async fn test_failed_inference_leaves_history_unchanged() {
        let config = offline_config();
        let mut client = LlmClient::new(&config, "gpt-5-mini".to_string());

        let result = client.chat("What do you see?", "U0NSRUVO", "V0VCQ0FN").await;
        assert!(result.is_err());
        assert_eq!(client.history.len(), 0);
    }

    #[test]
    fn test_successful_exchange_appends_two_turns_in_order() {
        let config = offline_config();
        let mut client = LlmClient::new(&config, "gpt-5-mini".to_string());

        let user = build_user_message("What do you see?", "U0NSRUVO", "V0VCQ0FN");
        client.record_exchange(user, "A laptop on a desk.");

        assert_eq!(client.history.len(), 2);
        assert_eq!(client.history[0]["role"], "user");
        assert_eq!(client.history[0]["content"][0]["text"], "What do you see?");
        assert_eq!(client.history[1]["role"], "assistant");
        assert_eq!(client.history[1]["content"], "A laptop on a desk.");
    }

    #[tokio::test]
    async fn test_select_model_without_key_skips_probe() {
        let client = reqwest::Client::new();
        let model = select_model(&client, "http://127.0.0.1:1/v1", "", "gpt-5-mini").await.unwrap();
        assert_eq!(model, "gpt-5-mini");
    }

    #[tokio::test]
    async fn test_select_model_errors_when_no_candidate_works() {
        let client = reqwest::Client::new();
        let result = select_model(&client, "http://127.0.0.1:1/v1", "test-key", "gpt-5-mini").await;
        assert!(result.is_err());
    }
}
