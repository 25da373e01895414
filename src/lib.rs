//! Practice looper: cut a time window out of an audio or video file, stretch
//! it without changing pitch, and play it back in a loop.
//!
//! The pieces run in a straight line. [`audio_io::AudioSource`] decodes the
//! file, [`segment::extract_window`] cuts the window,
//! [`dsp::stretch::TimeStretcher`] slows it down and
//! [`playback::PlaybackController`] loops it on an [`traits::AudioSink`].
//! [`session::Session`] wires them together for the command line front-end.

pub mod audio_io;
pub mod cli;
pub mod config;
pub mod dsp;
pub mod error;
pub mod playback;
pub mod resample;
pub mod segment;
pub mod session;
#[cfg(test)]
mod testing;
pub mod traits;
pub mod types;

pub use audio_io::{AudioSource, CpalSink, extract_audio_from_video, load_audio, load_media};
pub use config::Settings;
pub use dsp::stretch::{TimeStretcher, stretch};
pub use error::{Error, Result};
pub use playback::{PlaybackController, PlaybackRequest, PlaybackState, PlaybackStatus};
pub use segment::extract_window;
pub use session::Session;
pub use traits::{AudioSink, MediaDecoder, PlayOutcome};
pub use types::{AudioBuffer, Sample};
