//! Front-end state: the loaded file, the practice parameters and the player.
//!
//! A [`Session`] is what the REPL drives. It validates user input the way a
//! practice tool should (a window is nudged back inside the file rather than
//! rejected), keeps the last processed segment around for saving, and turns
//! the controller's status into a one-line message.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::audio_io::AudioSource;
use crate::config::Settings;
use crate::dsp::stretch::{TimeStretcher, check_factor};
use crate::error::{Error, Result};
use crate::playback::{PlaybackController, PlaybackRequest, PlaybackState, PlaybackStatus};
use crate::segment::extract_window;
use crate::traits::AudioSink;
use crate::types::AudioBuffer;

struct LoadedAudio {
    path: PathBuf,
    buffer: AudioBuffer,
}

pub struct Session<S: AudioSink> {
    source: AudioSource,
    controller: PlaybackController<S>,
    stretcher: TimeStretcher,
    default_end: f64,
    audio: Option<LoadedAudio>,
    start_secs: f64,
    end_secs: f64,
    slowdown: f64,
    loops: u32,
    processed: Option<AudioBuffer>,
}

impl<S: AudioSink> Session<S> {
    pub fn new(settings: &Settings, source: AudioSource, sink: Arc<S>) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            source,
            controller: PlaybackController::new(sink).with_loop_gap(settings.loop_gap()),
            stretcher: TimeStretcher::new(settings.stretch)?,
            default_end: settings.window.end_secs,
            audio: None,
            start_secs: settings.window.start_secs,
            end_secs: settings.window.end_secs,
            slowdown: settings.playback.slowdown,
            loops: settings.playback.loops,
            processed: None,
        })
    }

    /// Load an audio or video file, replacing whatever was loaded.
    ///
    /// Playback of the previous file is stopped. The window end is reset to
    /// the configured default, and the window is then pulled inside the file
    /// as [`set_window`](Self::set_window) does.
    pub fn load(&mut self, path: &Path) -> Result<&AudioBuffer> {
        let buffer = self.source.load_media(path)?;
        self.controller.stop();
        self.processed = None;

        let duration = buffer.duration_secs();
        log::info!(
            "loaded {}: {duration:.2}s at {} Hz",
            path.display(),
            buffer.sample_rate()
        );
        let audio = self.audio.insert(LoadedAudio {
            path: path.to_path_buf(),
            buffer,
        });
        let (start, end) = fit_window(self.start_secs, self.default_end, duration);
        self.start_secs = start;
        self.end_secs = end;
        Ok(&audio.buffer)
    }

    pub fn audio(&self) -> Option<&AudioBuffer> {
        self.audio.as_ref().map(|a| &a.buffer)
    }

    pub fn path(&self) -> Option<&Path> {
        self.audio.as_ref().map(|a| a.path.as_path())
    }

    pub fn window(&self) -> (f64, f64) {
        (self.start_secs, self.end_secs)
    }

    /// Set the practice window, pulled back inside the loaded file.
    ///
    /// A start before 0 becomes 0, a start at or past the end of the file
    /// moves to one second before it, an end not after the start becomes
    /// start + 1 and an end past the file becomes its duration. Returns the
    /// window actually applied.
    pub fn set_window(&mut self, start_secs: f64, end_secs: f64) -> Result<(f64, f64)> {
        if !start_secs.is_finite() || !end_secs.is_finite() {
            return Err(Error::InvalidWindow {
                start: start_secs,
                end: end_secs,
            });
        }

        let (start, end) = match self.audio().map(AudioBuffer::duration_secs) {
            Some(duration) => fit_window(start_secs, end_secs, duration),
            None => fit_window(start_secs, end_secs, f64::INFINITY),
        };

        if (start, end) != (start_secs, end_secs) {
            log::warn!("window {start_secs}..{end_secs} adjusted to {start}..{end}");
        }
        self.start_secs = start;
        self.end_secs = end;
        self.processed = None;
        Ok((start, end))
    }

    pub fn slowdown(&self) -> f64 {
        self.slowdown
    }

    /// Factors outside [`FACTOR_RANGE`](crate::dsp::stretch::FACTOR_RANGE) are rejected.
    pub fn set_slowdown(&mut self, factor: f64) -> Result<()> {
        check_factor(factor)?;
        self.slowdown = factor;
        self.processed = None;
        Ok(())
    }

    pub fn loops(&self) -> u32 {
        self.loops
    }

    /// 0 loops until stopped.
    pub fn set_loops(&mut self, loops: u32) {
        self.loops = loops;
    }

    /// Cut the window and stretch it. The result is kept for [`save_processed`](Self::save_processed).
    pub fn prepare(&mut self) -> Result<AudioBuffer> {
        let audio = self.audio.as_ref().ok_or(Error::NoAudioLoaded)?;
        let segment = extract_window(&audio.buffer, self.start_secs, self.end_secs)?;
        let processed = if self.slowdown == 1.0 {
            segment
        } else {
            self.stretcher.stretch(&segment, self.slowdown)?
        };
        self.processed = Some(processed.clone());
        Ok(processed)
    }

    /// Resume if paused, otherwise start the current window from scratch.
    ///
    /// Resuming keeps the segment that was playing: window, speed or loop
    /// changes made while paused apply from the next `stop` and `play`.
    pub fn play(&mut self) -> Result<()> {
        if self.controller.state() == PlaybackState::Paused {
            return self.controller.resume();
        }
        let segment = self.prepare()?;
        self.controller
            .submit(PlaybackRequest::new(segment, self.loops))
    }

    pub fn pause(&self) -> Result<()> {
        self.controller.pause()
    }

    pub fn resume(&self) -> Result<()> {
        self.controller.resume()
    }

    pub fn stop(&self) {
        self.controller.stop();
    }

    pub fn status(&self) -> PlaybackStatus {
        self.controller.status()
    }

    /// See [`PlaybackController::wait`].
    pub fn wait(&self, timeout: Duration) -> PlaybackState {
        self.controller.wait(timeout)
    }

    pub fn status_line(&self) -> String {
        let status = self.status();
        match status.state {
            PlaybackState::Idle => "Ready".to_string(),
            PlaybackState::Playing if status.loop_count == 0 => {
                format!("Playing loop {} (infinite)", status.loops_played + 1)
            }
            PlaybackState::Playing => format!(
                "Playing loop {} of {}",
                (status.loops_played + 1).min(status.loop_count),
                status.loop_count
            ),
            PlaybackState::Paused => "Playback paused".to_string(),
            PlaybackState::Stopped => "Playback stopped".to_string(),
            PlaybackState::Completed => "Playback completed".to_string(),
            PlaybackState::Failed(reason) => format!("Playback failed: {reason}"),
        }
    }

    /// Write the processed segment as 32-bit float mono WAV, preparing it first if needed.
    pub fn save_processed(&mut self, path: &Path) -> Result<()> {
        let segment = match &self.processed {
            Some(segment) => segment.clone(),
            None => self.prepare()?,
        };
        let spec = WavSpec {
            channels: 1,
            sample_rate: segment.sample_rate(),
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(path, spec)?;
        for &s in segment.samples() {
            writer.write_sample(s)?;
        }
        writer.finalize()?;
        log::info!("saved {} samples to {}", segment.len(), path.display());
        Ok(())
    }
}

/// Nudge `[start, end]` inside `[0, duration]`: a start at or past the end
/// moves to one second before it and an empty window is widened to one
/// second where the file allows.
fn fit_window(start: f64, end: f64, duration: f64) -> (f64, f64) {
    let mut start = start.max(0.0);
    if start >= duration {
        start = (duration - 1.0).max(0.0);
    }
    let mut end = end;
    if end <= start {
        end = start + 1.0;
    }
    (start, end.min(duration))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSink, sine};
    use crate::traits::MediaDecoder;

    /// Every path decodes to a 440 Hz tone of the given length.
    struct ToneDecoder {
        secs: f64,
    }

    impl MediaDecoder for ToneDecoder {
        fn decode(&self, _path: &Path) -> Result<AudioBuffer> {
            Ok(sine(440.0, 8000, self.secs))
        }

        fn demux_audio_track(&self, _video: &Path, _dest: &Path) -> Result<()> {
            Ok(())
        }
    }

    fn session(secs: f64) -> Session<FakeSink> {
        let mut settings = Settings::default();
        settings.playback.loop_gap_ms = 0;
        let source = AudioSource::new(
            Box::new(ToneDecoder { secs }),
            settings.video.extensions.clone(),
        );
        let sink = Arc::new(FakeSink::new(Duration::from_millis(20)));
        Session::new(&settings, source, sink).unwrap()
    }

    fn loaded(secs: f64) -> Session<FakeSink> {
        let mut session = session(secs);
        session.load(Path::new("tune.wav")).unwrap();
        session
    }

    #[test]
    fn load_caps_window_to_duration() {
        let short = loaded(3.0);
        assert_eq!(short.window(), (0.0, 3.0));
        assert_eq!(short.path(), Some(Path::new("tune.wav")));

        let long = loaded(10.0);
        assert_eq!(long.window(), (0.0, 5.0));
        assert_eq!(long.audio().unwrap().len(), 80000);
    }

    #[test]
    fn loading_a_shorter_file_keeps_a_playable_window() {
        let mut session = loaded(10.0);
        session.set_window(4.0, 5.0).unwrap();

        session.source = AudioSource::new(
            Box::new(ToneDecoder { secs: 3.0 }),
            Settings::default().video.extensions,
        );
        session.load(Path::new("short.wav")).unwrap();
        assert_eq!(session.window(), (2.0, 3.0));
        assert_eq!(session.prepare().unwrap().len(), 16000);
    }

    #[test]
    fn video_paths_go_through_demux() {
        let mut session = session(2.0);
        let buffer = session.load(Path::new("lesson.MOV")).unwrap();
        assert_eq!(buffer.len(), 16000);
    }

    #[test]
    fn window_is_pulled_inside_the_file() {
        let mut session = loaded(10.0);
        assert_eq!(session.set_window(-2.0, 4.0).unwrap(), (0.0, 4.0));
        assert_eq!(session.set_window(12.0, 20.0).unwrap(), (9.0, 10.0));
        assert_eq!(session.set_window(3.0, 2.0).unwrap(), (3.0, 4.0));
        assert_eq!(session.set_window(9.5, 9.5).unwrap(), (9.5, 10.0));
        assert_eq!(session.set_window(2.0, 7.0).unwrap(), (2.0, 7.0));
        assert_eq!(session.window(), (2.0, 7.0));
    }

    #[test]
    fn non_finite_window_is_rejected() {
        let mut session = loaded(10.0);
        assert!(matches!(
            session.set_window(f64::NAN, 4.0),
            Err(Error::InvalidWindow { .. })
        ));
        assert_eq!(session.window(), (0.0, 5.0));
    }

    #[test]
    fn slowdown_must_be_positive() {
        let mut session = loaded(1.0);
        assert!(session.set_slowdown(0.0).is_err());
        assert!(session.set_slowdown(-1.5).is_err());
        assert!(matches!(session.set_slowdown(1e9), Err(Error::Stretch(_))));
        assert_eq!(session.slowdown(), 2.0);
        session.set_slowdown(0.75).unwrap();
        assert_eq!(session.slowdown(), 0.75);
    }

    #[test]
    fn nothing_loaded() {
        let mut session = session(1.0);
        assert!(matches!(session.prepare(), Err(Error::NoAudioLoaded)));
        assert!(matches!(session.play(), Err(Error::NoAudioLoaded)));
        assert_eq!(session.status_line(), "Ready");
    }

    #[test]
    fn prepare_stretches_the_window() {
        let mut session = loaded(10.0);
        session.set_window(1.0, 3.0).unwrap();
        let slowed = session.prepare().unwrap();
        assert_eq!(slowed.len(), 32000);

        session.set_slowdown(1.0).unwrap();
        let plain = session.prepare().unwrap();
        assert_eq!(plain.samples(), &session.audio().unwrap().samples()[8000..24000]);
    }

    #[test]
    fn plays_requested_loops() {
        let mut session = loaded(2.0);
        session.set_window(0.0, 0.5).unwrap();
        session.set_loops(2);
        session.play().unwrap();
        assert!(session.status_line().starts_with("Playing loop "));

        assert_eq!(session.wait(Duration::from_secs(5)), PlaybackState::Completed);
        assert_eq!(session.status().loops_played, 2);
        assert_eq!(session.status_line(), "Playback completed");
    }

    #[test]
    fn infinite_status_line() {
        let mut session = loaded(2.0);
        session.set_window(0.0, 0.5).unwrap();
        session.set_loops(0);
        session.play().unwrap();
        assert!(session.status_line().ends_with("(infinite)"));
        session.stop();
        assert_eq!(session.status_line(), "Playback stopped");
    }

    #[test]
    fn play_while_paused_resumes() {
        let mut session = loaded(2.0);
        session.set_window(0.0, 0.5).unwrap();
        session.set_loops(0);
        session.play().unwrap();
        session.pause().unwrap();
        assert_eq!(session.status_line(), "Playback paused");

        session.play().unwrap();
        assert_eq!(session.status().state, PlaybackState::Playing);
        session.stop();
    }

    #[test]
    fn saves_processed_segment_as_float_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slow.wav");
        let mut session = loaded(4.0);
        session.set_window(1.0, 2.0).unwrap();
        session.save_processed(&path).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 8000);
        assert_eq!(spec.sample_format, SampleFormat::Float);
        assert_eq!(reader.len(), 16000);
    }

    #[test]
    fn save_without_audio_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(1.0);
        let err = session.save_processed(&dir.path().join("x.wav")).unwrap_err();
        assert!(matches!(err, Error::NoAudioLoaded));
    }
}
