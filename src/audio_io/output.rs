use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use crossbeam_channel::{Sender, bounded};
use rtrb::{Consumer, Producer, RingBuffer};

use crate::error::{Error, Result};
use crate::resample::Resampler;
use crate::traits::{AudioSink, PlayOutcome};
use crate::types::{AudioBuffer, Sample};

/// Slack on top of the segment length before a silent device counts as hung.
const DEVICE_TIMEOUT_SLACK: Duration = Duration::from_secs(5);
const RESAMPLE_CHUNK: usize = 1024;

enum VoiceCommand {
    Halt,
}

type Completion = std::result::Result<PlayOutcome, String>;

/// Segment converted to the device rate, kept so loops don't resample again.
struct Converted {
    source: Arc<[Sample]>,
    device_rate: u32,
    samples: Arc<[Sample]>,
}

#[derive(Default)]
struct Control {
    /// Command queue of the stream currently playing.
    commands: Option<Producer<VoiceCommand>>,
    /// Set by `stop_immediately`, cleared by `rearm`.
    halted: bool,
}

/// Plays segments on the default output device through cpal.
///
/// The stream is opened per `play` call on the calling thread and closed when
/// the segment ends. `stop_immediately` reaches the audio callback through a
/// lock-free command queue. A stop that arrives while `play` is still opening
/// the device or resampling is remembered, and `play` returns
/// [`PlayOutcome::Interrupted`] as soon as it notices. The sink stays halted
/// until [`rearm`](AudioSink::rearm).
#[derive(Default)]
pub struct CpalSink {
    control: spin::Mutex<Control>,
    converted: spin::Mutex<Option<Converted>>,
}

impl CpalSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_halted(&self) -> bool {
        self.control.lock().halted
    }

    /// Hand the stream's command queue to `stop_immediately`. False if a stop
    /// is already pending, in which case the stream must not start.
    fn register(&self, commands: Producer<VoiceCommand>) -> bool {
        let mut control = self.control.lock();
        if control.halted {
            return false;
        }
        control.commands = Some(commands);
        true
    }

    fn device_samples(&self, buffer: &AudioBuffer, device_rate: u32) -> Result<Arc<[Sample]>> {
        if buffer.sample_rate() == device_rate {
            return Ok(Arc::clone(buffer.shared_samples()));
        }

        let mut cache = self.converted.lock();
        if let Some(hit) = cache.as_ref() {
            if hit.device_rate == device_rate && Arc::ptr_eq(&hit.source, buffer.shared_samples()) {
                return Ok(Arc::clone(&hit.samples));
            }
        }

        log::info!(
            "resampling segment {} Hz -> {device_rate} Hz",
            buffer.sample_rate()
        );
        let mut resampler = Resampler::new(buffer.sample_rate(), device_rate, RESAMPLE_CHUNK)?;
        let samples: Arc<[Sample]> = resampler.process_all(buffer.samples())?.into();
        *cache = Some(Converted {
            source: Arc::clone(buffer.shared_samples()),
            device_rate,
            samples: Arc::clone(&samples),
        });
        Ok(samples)
    }

    fn build_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mut voice: Voice,
        errors: Sender<Completion>,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| voice.render(data),
                move |err| {
                    log::error!("output stream error: {err}");
                    let _ = errors.try_send(Err(err.to_string()));
                },
                None,
            )
            .map_err(|e| Error::Playback(format!("cannot open output stream: {e}")))
    }
}

impl AudioSink for CpalSink {
    fn play(&self, buffer: &AudioBuffer) -> Result<PlayOutcome> {
        if self.is_halted() {
            return Ok(PlayOutcome::Interrupted);
        }
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Playback("no output device available".into()))?;
        let supported = device
            .default_output_config()
            .map_err(|e| Error::Playback(format!("no usable output config: {e}")))?;
        let device_rate = supported.sample_rate().0;
        let channels = supported.channels().max(1) as usize;
        log::debug!(
            "output: {}, {device_rate} Hz, {channels} channel(s)",
            supported.sample_format()
        );

        let samples = self.device_samples(buffer, device_rate)?;
        if self.is_halted() {
            log::debug!("stopped while preparing the output stream");
            return Ok(PlayOutcome::Interrupted);
        }
        let length = Duration::from_secs_f64(samples.len() as f64 / device_rate as f64);

        let (producer, consumer) = RingBuffer::<VoiceCommand>::new(4);
        let (done_tx, done_rx) = bounded::<Completion>(2);
        let voice = Voice {
            samples,
            position: 0,
            channels,
            commands: consumer,
            done: Some(done_tx.clone()),
        };

        let config: cpal::StreamConfig = supported.config();
        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => Self::build_stream::<f32>(&device, &config, voice, done_tx)?,
            cpal::SampleFormat::I16 => Self::build_stream::<i16>(&device, &config, voice, done_tx)?,
            cpal::SampleFormat::U16 => Self::build_stream::<u16>(&device, &config, voice, done_tx)?,
            format => {
                return Err(Error::Playback(format!(
                    "sample format {format} not supported"
                )));
            }
        };

        if !self.register(producer) {
            log::debug!("stopped while opening the output stream");
            return Ok(PlayOutcome::Interrupted);
        }
        let result = stream
            .play()
            .map_err(|e| Error::Playback(format!("cannot start output stream: {e}")))
            .and_then(|()| {
                done_rx
                    .recv_timeout(length + DEVICE_TIMEOUT_SLACK)
                    .map_err(|_| Error::Playback("output device stopped responding".into()))?
                    .map_err(Error::Playback)
            });
        self.control.lock().commands = None;
        drop(stream);
        result
    }

    fn stop_immediately(&self) {
        let mut control = self.control.lock();
        control.halted = true;
        if let Some(commands) = control.commands.as_mut() {
            let _ = commands.push(VoiceCommand::Halt);
        }
    }

    fn rearm(&self) {
        self.control.lock().halted = false;
    }
}

/// Callback-side playhead over one segment.
struct Voice {
    samples: Arc<[Sample]>,
    position: usize,
    channels: usize,
    commands: Consumer<VoiceCommand>,
    /// Taken once the outcome has been reported.
    done: Option<Sender<Completion>>,
}

impl Voice {
    fn render<T>(&mut self, data: &mut [T])
    where
        T: SizedSample + FromSample<f32>,
    {
        while let Ok(VoiceCommand::Halt) = self.commands.pop() {
            self.report(PlayOutcome::Interrupted);
        }

        for frame in data.chunks_mut(self.channels) {
            let value = match self.samples.get(self.position) {
                Some(&s) if self.done.is_some() => {
                    self.position += 1;
                    T::from_sample(s)
                }
                _ => T::EQUILIBRIUM,
            };
            frame.fill(value);
        }

        if self.position >= self.samples.len() {
            self.report(PlayOutcome::Finished);
        }
    }

    fn report(&mut self, outcome: PlayOutcome) {
        if let Some(done) = self.done.take() {
            let _ = done.try_send(Ok(outcome));
        }
    }
}
