//! Fixtures shared by the unit tests: signal generators, WAV files and a fake output sink.

use std::f32::consts::PI;
use std::path::Path;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::error::{Error, Result};
use crate::traits::{AudioSink, PlayOutcome};
use crate::types::AudioBuffer;

pub fn sine(freq: f32, sample_rate: u32, secs: f64) -> AudioBuffer {
    let len = (secs * sample_rate as f64).round() as usize;
    let samples: Vec<f32> = (0..len)
        .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
        .collect();
    AudioBuffer::new(samples, sample_rate).unwrap()
}

/// Write interleaved 16-bit PCM.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32, channels: u16) {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    for &s in samples {
        let s_i16 = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(s_i16).unwrap();
    }
    writer.finalize().unwrap();
}

/// Frequency estimate from rising zero crossings over the middle half of the buffer.
pub fn dominant_frequency(buffer: &AudioBuffer) -> f32 {
    let samples = buffer.samples();
    let mid = &samples[samples.len() / 4..samples.len() * 3 / 4];
    let crossings = mid
        .windows(2)
        .filter(|w| w[0] < 0.0 && w[1] >= 0.0)
        .count();
    crossings as f32 * buffer.sample_rate() as f32 / mid.len() as f32
}

#[derive(Default, Debug, Clone)]
pub struct FakeSinkStats {
    pub started: usize,
    pub finished: usize,
    pub interrupted: usize,
    pub played_lengths: Vec<usize>,
}

#[derive(Default)]
struct FakeSinkState {
    playing: bool,
    interrupt: bool,
    fail_on: Option<usize>,
    stats: FakeSinkStats,
}

/// Sink that "plays" a segment by sleeping for a fixed time.
pub struct FakeSink {
    play_time: Duration,
    /// Time spent in `play` before a stop can reach it.
    setup_time: Duration,
    state: Mutex<FakeSinkState>,
    changed: Condvar,
}

impl FakeSink {
    pub fn new(play_time: Duration) -> Self {
        Self {
            play_time,
            setup_time: Duration::ZERO,
            state: Mutex::new(FakeSinkState::default()),
            changed: Condvar::new(),
        }
    }

    /// Make the `n`th call to `play` (1-based) fail.
    pub fn failing_on(self, n: usize) -> Self {
        self.state.lock().unwrap().fail_on = Some(n);
        self
    }

    /// Spend `setup_time` in each `play` before playing, ignoring stops meanwhile.
    pub fn with_setup_time(mut self, setup_time: Duration) -> Self {
        self.setup_time = setup_time;
        self
    }

    pub fn stats(&self) -> FakeSinkStats {
        self.state.lock().unwrap().stats.clone()
    }
}

impl AudioSink for FakeSink {
    fn play(&self, buffer: &AudioBuffer) -> Result<PlayOutcome> {
        let mut state = self.state.lock().unwrap();
        state.stats.started += 1;
        state.stats.played_lengths.push(buffer.len());
        if state.fail_on == Some(state.stats.started) {
            return Err(Error::Playback("device unplugged".into()));
        }
        if !self.setup_time.is_zero() {
            drop(state);
            std::thread::sleep(self.setup_time);
            state = self.state.lock().unwrap();
        }
        state.playing = true;
        state.interrupt = false;

        let deadline = Instant::now() + self.play_time;
        while !state.interrupt {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            state = self.changed.wait_timeout(state, deadline - now).unwrap().0;
        }
        state.playing = false;

        if state.interrupt {
            state.interrupt = false;
            state.stats.interrupted += 1;
            Ok(PlayOutcome::Interrupted)
        } else {
            state.stats.finished += 1;
            Ok(PlayOutcome::Finished)
        }
    }

    fn stop_immediately(&self) {
        let mut state = self.state.lock().unwrap();
        if state.playing {
            state.interrupt = true;
            self.changed.notify_all();
        }
    }
}
