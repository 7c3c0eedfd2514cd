//! Audio I/O: microphone capture and speech playback via cpal, with
//! streaming resampling when device rates differ from the pipeline rates.

mod capture;
mod playback;
pub mod resampler;
pub mod util;

pub use capture::Capturer;
pub use playback::{PcmSink, Playback};
