use crate::error::{Error, Result};
use crate::types::Sample;
use rubato::{
    Resampler as _, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};

/// Mono sinc resampler used to bring a segment to the output device's rate.
pub struct Resampler {
    inner: SincFixedIn<Sample>,
    ratio: f64,
}

impl Resampler {
    pub fn new(in_sr: u32, out_sr: u32, chunk_size: usize) -> Result<Self> {
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 160,
            window: WindowFunction::Hann2,
        };
        let ratio = out_sr as f64 / in_sr as f64;
        let inner = SincFixedIn::<Sample>::new(ratio, 1.0, params, chunk_size, 1)
            .map_err(|e| Error::Playback(format!("resampler init: {e}")))?;
        Ok(Self { inner, ratio })
    }

    /// Resample a whole signal. The filter delay is trimmed so the output lines
    /// up with the input and holds `round(len * ratio)` samples.
    pub fn process_all(&mut self, input: &[Sample]) -> Result<Vec<Sample>> {
        let expected = (input.len() as f64 * self.ratio).round() as usize;
        if expected == 0 {
            return Ok(Vec::new());
        }
        let delay = self.inner.output_delay();
        let mut out = Vec::with_capacity(expected + delay);
        let mut chunk = Vec::new();
        let mut pos = 0;

        while out.len() < expected + delay {
            let needed = self.inner.input_frames_next();
            chunk.clear();
            chunk.resize(needed, 0.0);
            if pos < input.len() {
                let end = (pos + needed).min(input.len());
                chunk[..end - pos].copy_from_slice(&input[pos..end]);
            }
            pos += needed;

            let wave_in = [&chunk[..]];
            let frames = self
                .inner
                .process(&wave_in[..], None)
                .map_err(|e| Error::Playback(format!("resampling: {e}")))?;
            out.extend_from_slice(&frames[0]);
        }

        out.drain(..delay);
        out.truncate(expected);
        Ok(out)
    }
}
