//! Pitch-preserving time-stretch by phase vocoder.
//!
//! The input is cut into Hann-windowed frames `hop_length` apart (centred, so
//! the first frame is padded with `fft_size / 2` zeros). Output frames are
//! read at fractional positions `0, r, 2r, ...` with `r = 1 / factor`:
//! magnitudes are interpolated between the two neighbouring analysis frames
//! and each bin's phase is advanced by its measured instantaneous frequency.
//! Overlap-adding the result at the original hop yields a signal `factor`
//! times as long with the same spectral content.

use std::f32::consts::PI;
use std::ops::RangeInclusive;

use rustfft::num_complex::Complex;

use super::fft::FftProcessor;
use super::hann_window;
use crate::config::StretchSettings;
use crate::error::{Error, Result};
use crate::types::{AudioBuffer, Sample};

const TWO_PI: f32 = 2.0 * PI;

/// Accepted stretch factors. Outside this range the result is unusable for
/// practice and the output buffer grows without bound.
pub const FACTOR_RANGE: RangeInclusive<f64> = 0.1..=10.0;

/// Stretch with the default frame layout.
pub fn stretch(buffer: &AudioBuffer, factor: f64) -> Result<AudioBuffer> {
    TimeStretcher::new(StretchSettings::default())?.stretch(buffer, factor)
}

/// Fails with [`Error::Stretch`] unless `factor` lies in [`FACTOR_RANGE`].
pub fn check_factor(factor: f64) -> Result<()> {
    if !FACTOR_RANGE.contains(&factor) {
        return Err(Error::Stretch(format!(
            "stretch factor must be between {} and {}, got {factor}",
            FACTOR_RANGE.start(),
            FACTOR_RANGE.end()
        )));
    }
    Ok(())
}

pub struct TimeStretcher {
    fft_size: usize,
    hop: usize,
    window: Vec<f32>,
    fft: FftProcessor,
}

impl TimeStretcher {
    pub fn new(settings: StretchSettings) -> Result<Self> {
        let StretchSettings {
            fft_size,
            hop_length,
        } = settings;
        if fft_size < 64 || !fft_size.is_power_of_two() {
            return Err(Error::Stretch(format!(
                "FFT size must be a power of two >= 64, got {fft_size}"
            )));
        }
        if hop_length == 0 || hop_length > fft_size / 2 {
            return Err(Error::Stretch(format!(
                "hop length must be in 1..={}, got {hop_length}",
                fft_size / 2
            )));
        }
        Ok(Self {
            fft_size,
            hop: hop_length,
            window: hann_window(fft_size),
            fft: FftProcessor::new(fft_size),
        })
    }

    /// Scale the duration of `buffer` by `factor` (> 1 slows down) without
    /// changing pitch. The output holds exactly `round(len * factor)` samples;
    /// a factor of 1 returns the input unchanged. Factors outside
    /// [`FACTOR_RANGE`] are rejected.
    pub fn stretch(&mut self, buffer: &AudioBuffer, factor: f64) -> Result<AudioBuffer> {
        check_factor(factor)?;
        if factor == 1.0 || buffer.is_empty() {
            return Ok(buffer.clone());
        }

        let target_len = (buffer.len() as f64 * factor).round() as usize;
        log::info!(
            "stretching {} samples by {factor} -> {target_len} samples",
            buffer.len()
        );

        let frames = self.analyze(buffer.samples())?;
        let frames = self.advance_phases(&frames, 1.0 / factor);
        let samples = self.synthesize(frames, target_len)?;
        AudioBuffer::new(samples, buffer.sample_rate())
    }

    /// Centred short-time spectra of `samples`.
    fn analyze(&mut self, samples: &[Sample]) -> Result<Vec<Vec<Complex<f32>>>> {
        let pad = self.fft_size / 2;
        let mut padded = vec![0.0; pad];
        padded.extend_from_slice(samples);
        padded.resize((padded.len() + pad).max(self.fft_size), 0.0);

        let count = 1 + (padded.len() - self.fft_size) / self.hop;
        let mut frame = vec![0.0; self.fft_size];
        let mut spectra = Vec::with_capacity(count);
        for i in 0..count {
            let start = i * self.hop;
            for ((dst, src), w) in frame
                .iter_mut()
                .zip(&padded[start..start + self.fft_size])
                .zip(&self.window)
            {
                *dst = src * w;
            }
            spectra.push(self.fft.forward(&mut frame)?.to_vec());
        }
        log::debug!("analyzed {count} frames of {} samples", self.fft_size);
        Ok(spectra)
    }

    /// Resample the frame sequence at step `rate`, keeping phases coherent.
    fn advance_phases(&self, spectra: &[Vec<Complex<f32>>], rate: f64) -> Vec<Vec<Complex<f32>>> {
        let bins = self.fft.bins();
        let expected: Vec<f32> = (0..bins)
            .map(|k| TWO_PI * (self.hop * k) as f32 / self.fft_size as f32)
            .collect();
        let silence = vec![Complex::new(0.0, 0.0); bins];
        let mut phase: Vec<f32> = spectra[0].iter().map(|c| c.arg()).collect();

        let capacity = (spectra.len() as f64 / rate).ceil() as usize;
        let mut out = Vec::with_capacity(capacity);
        let mut position = 0.0f64;
        while position < spectra.len() as f64 {
            let index = position.floor() as usize;
            let alpha = (position - index as f64) as f32;
            let left = &spectra[index];
            let right = spectra.get(index + 1).unwrap_or(&silence);

            let mut frame = Vec::with_capacity(bins);
            for k in 0..bins {
                let magnitude = (1.0 - alpha) * left[k].norm() + alpha * right[k].norm();
                frame.push(Complex::from_polar(magnitude, phase[k]));

                let deviation = right[k].arg() - left[k].arg() - expected[k];
                let wrapped = deviation - TWO_PI * (deviation / TWO_PI).round();
                phase[k] += expected[k] + wrapped;
            }
            out.push(frame);
            position += rate;
        }
        out
    }

    /// Overlap-add the frames and normalise by the summed squared window.
    fn synthesize(&mut self, frames: Vec<Vec<Complex<f32>>>, target_len: usize) -> Result<Vec<Sample>> {
        let span = self.fft_size + self.hop * frames.len().saturating_sub(1);
        let mut signal = vec![0.0f32; span];
        let mut weight = vec![0.0f32; span];

        for (i, mut spectrum) in frames.into_iter().enumerate() {
            let start = i * self.hop;
            let frame = self.fft.inverse(&mut spectrum)?;
            for (n, (&s, &w)) in frame.iter().zip(&self.window).enumerate() {
                signal[start + n] += s * w;
                weight[start + n] += w * w;
            }
        }

        for (s, &w) in signal.iter_mut().zip(&weight) {
            if w > f32::EPSILON {
                *s /= w;
            }
        }

        let pad = self.fft_size / 2;
        let mut samples: Vec<Sample> = signal.into_iter().skip(pad).take(target_len).collect();
        samples.resize(target_len, 0.0);
        Ok(samples)
    }
}
