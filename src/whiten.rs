//! Whitening FFT stage.

use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

const EPS: f32 = 1e-9;

/// Precomputed forward/inverse FFT pair for whitening blocks of a fixed
/// length, so the matched-filter bank (C4) doesn't replan per block.
pub struct Whitener {
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    len: usize,
}

impl Whitener {
    pub fn new(len: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        Self {
            fft: planner.plan_fft_forward(len),
            ifft: planner.plan_fft_inverse(len),
            len,
        }
    }

    /// `Z = FFT(w*z)`; `z' = IFFT(Z / (|Z| + eps))`.
    ///
    /// `z` and `window` must both have length `self.len`.
    pub fn whiten(&self, z: &[Complex32], window: &[f32]) -> Vec<Complex32> {
        assert_eq!(z.len(), self.len);
        assert_eq!(window.len(), self.len);

        let mut buf: Vec<Complex32> = z
            .iter()
            .zip(window.iter())
            .map(|(s, w)| s * w)
            .collect();
        self.fft.process(&mut buf);

        for c in buf.iter_mut() {
            let mag = c.norm() + EPS;
            *c /= mag;
        }
        self.ifft.process(&mut buf);

        // rustfft's inverse FFT is unnormalized; scale by 1/len to match the
        // forward/inverse pair's usual convention.
        let scale = 1.0 / self.len as f32;
        for c in buf.iter_mut() {
            *c *= scale;
        }
        buf
    }
}
