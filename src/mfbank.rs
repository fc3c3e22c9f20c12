//! Chirp matched-filter bank: detection + CLEAN peak picking.

use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

use crate::chirp::reference_chirp;
use crate::config::Config;
use crate::error::ChirpError;
use crate::paramrecord::ParameterRecord;
use crate::sample_source::SampleSource;
use crate::whiten::Whitener;
use crate::window::hann;

/// `fftshift`, matching `numpy.fft.fftshift`: rotate by `n/2` so the
/// zero-frequency bin lands at index `n/2`.
fn fftshift(v: &[Complex32]) -> Vec<Complex32> {
    let n = v.len();
    let shift = n / 2;
    let mut out = vec![Complex32::new(0.0, 0.0); n];
    for i in 0..n {
        out[i] = v[(i + n - shift) % n];
    }
    out
}

/// Detects chirps of unknown start time in a stream of fixed-length blocks
/// and emits parameter records via CLEAN-style iterative peak picking.
pub struct ChirpMatchedFilterBank {
    rates: Vec<f64>,
    /// `filter[c][k] = window[k] * conj(reference_chirp(rates[c])[k])`.
    filters: Vec<Vec<Complex32>>,
    window: Vec<f32>,
    whitener: Whitener,
    fft: Arc<dyn Fft<f32>>,
    n: usize,
    sample_rate: f64,
    fvec: Vec<f64>,
    threshold_snr: f32,
    max_simultaneous_detections: usize,
    mfsi: usize,
    /// Block-skip between successive blocks in [`scan`](Self::scan): block
    /// `b` starts at `i0_start + b * n_samples_per_block * step`.
    step: usize,
}

impl ChirpMatchedFilterBank {
    pub fn new(config: &Config) -> Self {
        let n = config.n_samples_per_block;
        let window = hann(n);

        let filters: Vec<Vec<Complex32>> = config
            .chirp_rates
            .iter()
            .map(|&r| {
                let chi = reference_chirp(r, n, config.sample_rate);
                window
                    .iter()
                    .zip(chi.iter())
                    .map(|(w, c)| w * c.conj())
                    .collect()
            })
            .collect();

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n);

        Self {
            rates: config.chirp_rates.clone(),
            filters,
            window,
            whitener: Whitener::new(n),
            fft,
            n,
            sample_rate: config.sample_rate,
            fvec: config.fvec(),
            threshold_snr: config.threshold_snr,
            max_simultaneous_detections: config.max_simultaneous_detections,
            mfsi: config.mfsi,
            step: config.step,
        }
    }

    /// Look for chirps in a block `(z, i0)` where `i0` is the sample index
    /// of the block's leading edge. Returns the parameter records for every
    /// detection above `threshold_snr`, most prominent first.
    ///
    /// `id` on each returned record is always `0`: sounder identity is not
    /// derivable from the signal alone and must be resolved
    /// by the caller against externally supplied sounder timings.
    pub fn seek(&self, z: &[Complex32], i0: i64) -> Result<Vec<ParameterRecord>, ChirpError> {
        if z.len() != self.n {
            return Err(ChirpError::WrongBlockLength {
                expected: self.n,
                actual: z.len(),
            });
        }

        let t0 = i0 as f64 / self.sample_rate;
        let z_white = self.whitener.whiten(z, &self.window);

        let n = self.n;
        let n_rates = self.rates.len();

        // envelope mf_p[k] = max_c mf[c, k] and its argmax rate index,
        // folded in as each rate's matched-filter power is computed so the
        // dense (n_rates x N) matrix never needs to be materialized.
        let mut mf_p: Vec<f32> = vec![0.0; n];
        let mut cr_idx: Vec<usize> = vec![0; n];

        for c in 0..n_rates {
            let mut buf: Vec<Complex32> = self.filters[c]
                .iter()
                .zip(z_white.iter())
                .map(|(f, z)| f * z)
                .collect();
            self.fft.process(&mut buf);
            let shifted = fftshift(&buf);

            for k in 0..n {
                let p = shifted[k].norm_sqr();
                // strict '>' preserves a stable, first-rate-wins tie-break
                if p > mf_p[k] {
                    mf_p[k] = p;
                    cr_idx[k] = c;
                }
            }
        }

        let mut records = Vec::new();
        for _ in 0..self.max_simultaneous_detections {
            let (m, snr) = mf_p
                .iter()
                .enumerate()
                .fold((0usize, f32::NEG_INFINITY), |(bi, bv), (i, &v)| {
                    if v > bv {
                        (i, v)
                    } else {
                        (bi, bv)
                    }
                });

            if snr < self.threshold_snr {
                break;
            }

            let f0 = self.fvec[m];
            let detected_rate = self.rates[cr_idx[m]];
            let chirp_time = t0 - f0 / detected_rate;

            records.push(ParameterRecord {
                t0: chirp_time,
                chirp_rate: detected_rate,
                id: 0,
                detected_snr: snr,
                detected_at: i0,
            });

            // clamp, not wrap, the exclusion window
            let lo = m.saturating_sub(self.mfsi);
            let hi = (m + self.mfsi).min(n - 1);
            for v in mf_p[lo..=hi].iter_mut() {
                *v = 0.0;
            }
        }

        Ok(records)
    }

    /// Streaming detection scan over `n_blocks` consecutive blocks starting
    /// at sample index `i0_start`, advancing the read position by
    /// `n_samples_per_block * step` between blocks (`step == 1` scans every
    /// block; `step > 1` skips ahead, trading detection latency for
    /// throughput). A block the source can't currently provide is a gap and
    /// is skipped rather than treated as a failure.
    pub fn scan<S: SampleSource>(
        &self,
        source: &S,
        channel: &str,
        i0_start: i64,
        n_blocks: usize,
    ) -> Result<Vec<ParameterRecord>, ChirpError> {
        let stride = (self.n * self.step.max(1)) as i64;
        let mut records = Vec::new();
        let mut i0 = i0_start;
        for _ in 0..n_blocks {
            if let Some(z) = source.read(channel, i0, self.n) {
                records.extend(self.seek(&z, i0)?);
            }
            i0 += stride;
        }
        Ok(records)
    }
}
