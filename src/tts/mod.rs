//! Text-to-speech module for the hosted synthesis endpoint.

mod synthesizer;

pub use synthesizer::Synthesizer;
