//! Speech capture and recognition.
//!
//! Local energy-based segmentation turns the microphone stream into bounded
//! utterances; transcription is delegated to a hosted recognizer.

mod segmenter;
mod transcriber;

pub use segmenter::Segmenter;
pub use transcriber::Transcriber;
