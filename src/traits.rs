use std::path::Path;

use crate::error::Result;
use crate::types::AudioBuffer;

/// How a blocking [`AudioSink::play`] call ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayOutcome {
    /// Every sample reached the device.
    Finished,
    /// [`AudioSink::stop_immediately`] cut the segment short.
    Interrupted,
}

/// Audio output the playback controller drives.
pub trait AudioSink: Send + Sync + 'static {
    /// Play `buffer` from its first sample, blocking until it ends or is interrupted.
    fn play(&self, buffer: &AudioBuffer) -> Result<PlayOutcome>;

    /// Interrupt an in-flight `play`. A sink that is still setting up a
    /// `play` should remember the request and return
    /// [`PlayOutcome::Interrupted`] once it is ready.
    fn stop_immediately(&self);

    /// Forget a stop that arrived while no `play` was running. Called under
    /// the controller's lock right before each iteration starts.
    fn rearm(&self) {}
}

/// Turns media files into sample buffers.
pub trait MediaDecoder: Send {
    /// Decode an audio container to mono samples at the file's native rate.
    fn decode(&self, path: &Path) -> Result<AudioBuffer>;

    /// Write the audio track of `video` to `dest` as WAV.
    fn demux_audio_track(&self, video: &Path, dest: &Path) -> Result<()>;
}
