//! Per-turn dispatch: inference followed by speech output.

use anyhow::Result;
use tracing::error;

use crate::audio::Playback;
use crate::llm::LlmClient;
use crate::tts::Synthesizer;

/// Owns the inference client, the synthesizer, and the output device for
/// sequential turn processing. Turns never overlap: the turn worker calls
/// [`answer`](Self::answer) one utterance at a time, which also keeps the
/// single playback stream invariant and serializes history mutation.
pub struct Assistant {
    llm: LlmClient,
    tts: Synthesizer,
    playback: Playback,
}

impl Assistant {
    pub fn new(llm: LlmClient, tts: Synthesizer, playback: Playback) -> Self {
        Self { llm, tts, playback }
    }

    /// Run one turn: inference, then speech output for a non-empty reply.
    ///
    /// Returns `Ok(None)` when the transcript was empty (no request sent).
    /// Speech-output failures are logged but do not fail the turn; the reply
    /// is already recorded in history at that point.
    ///
    /// # Errors
    /// Returns an error when inference fails; the turn is discarded and
    /// history is unchanged.
    pub async fn answer(&mut self, transcript: &str, screen_b64: &str, webcam_b64: &str) -> Result<Option<String>> {
        let Some(reply) = self.llm.chat(transcript, screen_b64, webcam_b64).await? else {
            return Ok(None);
        };

        if !reply.is_empty()
            && let Err(e) = self.tts.speak(&reply, &self.playback).await
        {
            error!("❌ Speech output failed: {:#}", e);
        }

        Ok(Some(reply))
    }
}
