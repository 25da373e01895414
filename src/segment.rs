use crate::error::{Error, Result};
use crate::types::AudioBuffer;

/// Cut `[start_secs, end_secs)` out of `buffer`.
///
/// Bounds are converted to sample indices by truncation and then clamped to
/// the buffer, so a window running past the end comes back shorter (or empty)
/// instead of failing. Non-finite or inverted bounds are rejected.
pub fn extract_window(buffer: &AudioBuffer, start_secs: f64, end_secs: f64) -> Result<AudioBuffer> {
    if !start_secs.is_finite() || !end_secs.is_finite() || end_secs < start_secs {
        return Err(Error::InvalidWindow {
            start: start_secs,
            end: end_secs,
        });
    }

    let rate = buffer.sample_rate() as f64;
    let len = buffer.len();
    let start = to_index(start_secs * rate, len);
    let end = to_index(end_secs * rate, len).max(start);

    log::debug!(
        "extracting window {start_secs:.3}s..{end_secs:.3}s -> samples {start}..{end} of {len}"
    );
    AudioBuffer::new(&buffer.samples()[start..end], buffer.sample_rate())
}

fn to_index(position: f64, len: usize) -> usize {
    if position <= 0.0 {
        0
    } else {
        (position as usize).min(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sine;

    fn ramp(len: usize, rate: u32) -> AudioBuffer {
        AudioBuffer::new((0..len).map(|i| i as f32).collect::<Vec<_>>(), rate).unwrap()
    }

    #[test]
    fn window_length_matches_duration() {
        let buffer = sine(440.0, 44100, 10.0);
        for (start, end) in [(0.0, 10.0), (2.0, 7.0), (0.123, 0.456), (9.99, 10.0), (1.0, 1.0001)] {
            let window = extract_window(&buffer, start, end).unwrap();
            let expected = ((end - start) * 44100.0).round() as i64;
            let diff = (window.len() as i64 - expected).abs();
            assert!(diff <= 1, "{start}..{end}: got {} want {expected}", window.len());
        }
    }

    #[test]
    fn window_starts_at_requested_sample() {
        let buffer = ramp(100, 10);
        let window = extract_window(&buffer, 2.5, 4.0).unwrap();
        assert_eq!(window.samples(), &buffer.samples()[25..40]);
        assert_eq!(window.sample_rate(), 10);
    }

    #[test]
    fn out_of_range_bounds_are_clamped() {
        let buffer = ramp(100, 10);
        assert_eq!(extract_window(&buffer, -3.0, 2.0).unwrap().len(), 20);
        assert_eq!(extract_window(&buffer, 8.0, 50.0).unwrap().len(), 20);
        assert!(extract_window(&buffer, 20.0, 30.0).unwrap().is_empty());
        assert!(extract_window(&buffer, 3.0, 3.0).unwrap().is_empty());
    }

    #[test]
    fn rejects_inverted_or_nan_bounds() {
        let buffer = ramp(100, 10);
        assert!(matches!(
            extract_window(&buffer, 5.0, 2.0),
            Err(Error::InvalidWindow { .. })
        ));
        assert!(extract_window(&buffer, f64::NAN, 2.0).is_err());
        assert!(extract_window(&buffer, 0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn ten_second_example_window() {
        let buffer = sine(220.0, 44100, 10.0);
        let window = extract_window(&buffer, 2.0, 7.0).unwrap();
        assert_eq!(window.len(), 220_500);
        assert!((window.duration_secs() - 5.0).abs() < 1e-9);
    }
}
