use std::sync::Arc;

use crate::error::{Error, Result};

pub type Sample = f32;

/// Immutable mono audio: samples plus the rate they were captured at.
///
/// Samples sit behind an `Arc` so handing a buffer to the playback thread
/// is a pointer copy.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Arc<[Sample]>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Build a buffer. Fails when `sample_rate` is zero.
    pub fn new(samples: impl Into<Arc<[Sample]>>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(Error::InvalidSampleRate);
        }
        Ok(Self {
            samples: samples.into(),
            sample_rate,
        })
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// The shared sample storage, for consumers that outlive the borrow.
    pub fn shared_samples(&self) -> &Arc<[Sample]> {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Peak envelope of the buffer reduced to at most `points` values in `0.0..=1.0`.
    pub fn overview(&self, points: usize) -> Vec<f32> {
        if points == 0 || self.samples.is_empty() {
            return Vec::new();
        }
        let step = self.samples.len().div_ceil(points).max(1);
        self.samples
            .chunks(step)
            .map(|chunk| {
                chunk
                    .iter()
                    .fold(0.0f32, |peak, s| peak.max(s.abs()))
                    .min(1.0)
            })
            .collect()
    }
}
