pub mod fft;
pub mod stretch;

use std::f32::consts::PI;

/// Periodic Hann window of length `n`.
pub fn hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| {
            let x = (i as f32) / (n as f32);
            0.5 - 0.5 * (2.0 * PI * x).cos()
        })
        .collect()
}
