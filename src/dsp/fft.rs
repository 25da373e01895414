use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Forward and inverse real FFTs of one fixed length, with their scratch space.
pub struct FftProcessor {
    len: usize,
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
    forward_scratch: Vec<Complex<f32>>,
    inverse_scratch: Vec<Complex<f32>>,
    spectrum: Vec<Complex<f32>>,
    output: Vec<f32>,
}

impl FftProcessor {
    pub fn new(len: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(len);
        let inverse = planner.plan_fft_inverse(len);
        Self {
            len,
            forward_scratch: forward.make_scratch_vec(),
            inverse_scratch: inverse.make_scratch_vec(),
            spectrum: forward.make_output_vec(),
            output: inverse.make_output_vec(),
            forward,
            inverse,
        }
    }

    /// Number of bins in a half spectrum.
    pub fn bins(&self) -> usize {
        self.len / 2 + 1
    }

    /// Half spectrum of `frame`. `frame` is used as scratch and left undefined.
    pub fn forward(&mut self, frame: &mut [f32]) -> Result<&[Complex<f32>]> {
        self.forward
            .process_with_scratch(frame, &mut self.spectrum, &mut self.forward_scratch)
            .map_err(|e| Error::Stretch(format!("forward FFT: {e}")))?;
        Ok(&self.spectrum)
    }

    /// Time-domain frame for a half spectrum, scaled so `inverse(forward(x)) == x`.
    pub fn inverse(&mut self, spectrum: &mut [Complex<f32>]) -> Result<&[f32]> {
        // DC and Nyquist must be real for a real-valued output.
        if let Some(first) = spectrum.first_mut() {
            first.im = 0.0;
        }
        if let Some(last) = spectrum.last_mut() {
            last.im = 0.0;
        }
        self.inverse
            .process_with_scratch(spectrum, &mut self.output, &mut self.inverse_scratch)
            .map_err(|e| Error::Stretch(format!("inverse FFT: {e}")))?;
        let scale = 1.0 / self.len as f32;
        for s in self.output.iter_mut() {
            *s *= scale;
        }
        Ok(&self.output)
    }
}
