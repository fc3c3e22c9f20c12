//! Sample source adapter over an external ring buffer.
//!
//! The real SDR ring buffer is an external collaborator;
//! this module defines the uniform interface the rest of the pipeline reads
//! through, plus an in-memory implementation used by tests and by callers
//! that don't have a live ring buffer handy.

use rustfft::num_complex::Complex32;

/// Per-channel metadata the source reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceMetadata {
    pub sample_rate: f64,
    pub center_freq: f64,
}

/// Uniform read/bounds/metadata interface over an external ring buffer.
pub trait SampleSource {
    /// `(i_lo, i_hi)`, the currently valid sample-index range.
    fn bounds(&self, channel: &str) -> (i64, i64);

    /// Read `n` samples starting at index `i`. Fails if
    /// `[i, i + n) ⊄ [i_lo, i_hi)`.
    fn read(&self, channel: &str, i: i64, n: usize) -> Option<Vec<Complex32>>;

    fn metadata(&self, channel: &str) -> SourceMetadata;
}

/// An in-memory ring buffer backing a single channel, for tests and
/// small offline runs. Samples outside `[0, data.len())` are out of bounds.
pub struct InMemorySource {
    channel: String,
    data: Vec<Complex32>,
    metadata: SourceMetadata,
    /// Lower bound advances to simulate ring-buffer overwrite; kept separate
    /// from 0 so callers can exercise "schedule miss" behavior.
    i_lo: i64,
}

impl InMemorySource {
    pub fn new(channel: impl Into<String>, data: Vec<Complex32>, metadata: SourceMetadata) -> Self {
        Self {
            channel: channel.into(),
            data,
            metadata,
            i_lo: 0,
        }
    }

    /// Advance the ring buffer's lower bound, simulating data falling off
    /// the back of the buffer.
    pub fn advance_lower_bound(&mut self, new_i_lo: i64) {
        self.i_lo = new_i_lo;
    }
}

impl SampleSource for InMemorySource {
    fn bounds(&self, channel: &str) -> (i64, i64) {
        debug_assert_eq!(channel, self.channel);
        (self.i_lo, self.data.len() as i64)
    }

    fn read(&self, channel: &str, i: i64, n: usize) -> Option<Vec<Complex32>> {
        if channel != self.channel {
            return None;
        }
        let (lo, hi) = self.bounds(channel);
        let end = i.checked_add(n as i64)?;
        if i < lo || end > hi {
            return None;
        }
        let start = i as usize;
        Some(self.data[start..start + n].to_vec())
    }

    fn metadata(&self, channel: &str) -> SourceMetadata {
        debug_assert_eq!(channel, self.channel);
        self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> SourceMetadata {
        SourceMetadata {
            sample_rate: 100e3,
            center_freq: 0.0,
        }
    }

    #[test]
    fn test_reads_in_bounds_slice() {
        let data: Vec<Complex32> = (0..100).map(|i| Complex32::new(i as f32, 0.0)).collect();
        let src = InMemorySource::new("ch0", data, meta());
        let v = src.read("ch0", 10, 5).unwrap();
        assert_eq!(v.len(), 5);
        assert_eq!(v[0].re, 10.0);
    }

    #[test]
    fn test_rejects_out_of_bounds_read() {
        let data: Vec<Complex32> = vec![Complex32::new(0.0, 0.0); 10];
        let src = InMemorySource::new("ch0", data, meta());
        assert!(src.read("ch0", 5, 10).is_none());
        assert!(src.read("ch0", -1, 1).is_none());
    }

    #[test]
    fn test_lower_bound_advances() {
        let data: Vec<Complex32> = vec![Complex32::new(0.0, 0.0); 10];
        let mut src = InMemorySource::new("ch0", data, meta());
        src.advance_lower_bound(5);
        assert!(src.read("ch0", 0, 1).is_none());
        assert!(src.read("ch0", 5, 1).is_some());
    }
}
