//! Ionogram builder: spectrogram over a decimated chirp window.

use rustfft::num_complex::Complex32;
use rustfft::FftPlanner;

use crate::config::Config;
use crate::downconvert::StreamingDownconverter;
use crate::sample_source::SampleSource;
use crate::window::hann;

/// `m/Hz` round-trip ranging resolution for a sounder sweeping at `rate`
/// Hz/s (`calc_ionograms.py::get_m_per_Hz`).
pub fn m_per_hz(rate: f64) -> f64 {
    const C: f64 = 299_792_458.0;
    let dt = 1.0 / rate;
    dt * C / 2.0
}

/// One completed ionogram: power `S[n_freq x n_range]` row-major, plus its
/// axes.
#[derive(Debug, Clone, PartialEq)]
pub struct Ionogram {
    pub s: Vec<f32>,
    pub n_freq: usize,
    pub n_range: usize,
    pub freqs: Vec<f64>,
    pub ranges: Vec<f64>,
    pub rate: f64,
    pub t0: f64,
    pub id: u16,
    pub sr_dec: f64,
    pub channel: String,
    /// Present only when `save_raw_voltage` is set.
    pub raw_voltage: Option<Vec<Complex32>>,
}

impl Ionogram {
    pub fn s_row(&self, i: usize) -> &[f32] {
        &self.s[i * self.n_range..(i + 1) * self.n_range]
    }
}

/// Outcome of waiting for data in realtime mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    DataArrived,
    SourceGone,
}

/// Builds one ionogram for a parameter record `(t0, rate, id)`.
///
/// `wait_for_data` is called in realtime mode whenever the next window's
/// upper bound exceeds the source's current `i_hi`; it should sleep and
/// re-poll, returning [`WaitOutcome::SourceGone`] if the caller decides to
/// give up (this crate never decides that on its own — give-up policy is
/// external).
pub fn build_ionogram<S: SampleSource>(
    config: &Config,
    source: &S,
    rate: f64,
    t0: f64,
    id: u16,
    mut wait_for_data: impl FnMut(i64) -> WaitOutcome,
) -> Ionogram {
    let sr = config.sample_rate;
    let cf = config.center_freq;
    let dec = config.decimation;
    let dur = config.maximum_analysis_frequency / rate;
    let step = config.sdc_step;
    let n_windows = ((dur * sr) / (step as f64 * dec as f64)) as usize + 1;

    let i0 = (t0 * sr).floor() as i64;

    // filter_len is implementation-defined; tie it to the
    // configured exclusion width so longer sweeps get proportionally more
    // look-back without a second config knob.
    let filter_len = config.mfsi.max(1);
    let mut sdc = StreamingDownconverter::new(-cf, rate, dec, 1.0 / sr, filter_len, config.n_downconversion_threads);

    let zd_len = n_windows * step;
    let mut zd = vec![Complex32::new(0.0, 0.0); zd_len];

    let mut idx: i64 = 0;
    for w in 0..n_windows {
        let read_start = i0 + idx;
        let read_len = step * dec + sdc.filter_len() * dec;

        if config.realtime {
            loop {
                let (_lo, hi) = source.bounds(&config.channel);
                let needed_hi = read_start + read_len as i64;
                if needed_hi <= hi {
                    break;
                }
                match wait_for_data(needed_hi) {
                    WaitOutcome::DataArrived => continue,
                    WaitOutcome::SourceGone => break,
                }
            }
        }

        let mut z_out = vec![Complex32::new(0.0, 0.0); step];
        match source.read(&config.channel, read_start, read_len) {
            Some(z_in) => {
                sdc.consume(&z_in, &mut z_out, step);
            }
            None => {
                sdc.advance_time(dec * step);
                // z_out already zero
            }
        }
        zd[w * step..(w + 1) * step].copy_from_slice(&z_out);

        idx += (dec * step) as i64;
    }

    let dr = config.range_resolution;
    let df = config.frequency_resolution;
    let sr_dec = sr / dec as f64;
    let ds = m_per_hz(rate);
    let fftlen = (((sr_dec * ds / dr / 2.0) as i64) * 2).max(2) as usize;
    let fft_step = ((df / rate) * sr_dec).max(1.0) as usize;

    let conj_zd: Vec<Complex32> = zd.iter().map(|c| c.conj()).collect();
    let (s_full, n_spec) = spectrogram(&conj_zd, fftlen, fft_step);

    let freqs: Vec<f64> = (0..n_spec).map(|i| rate * i as f64 * fft_step as f64 / sr_dec).collect();
    let ranges_full = fftshift_fftfreq(fftlen, 1.0 / sr_dec)
        .into_iter()
        .map(|f| ds * f)
        .collect::<Vec<f64>>();

    let keep: Vec<usize> = (0..fftlen)
        .filter(|&j| ranges_full[j].abs() < config.max_range_extent)
        .collect();

    let n_range = keep.len();
    let mut s = vec![0.0f32; n_spec * n_range];
    for i in 0..n_spec {
        for (out_j, &j) in keep.iter().enumerate() {
            s[i * n_range + out_j] = s_full[i * fftlen + j];
        }
    }
    let ranges: Vec<f64> = keep.iter().map(|&j| ranges_full[j]).collect();

    Ionogram {
        s,
        n_freq: n_spec,
        n_range,
        freqs,
        ranges,
        rate,
        t0,
        id,
        sr_dec,
        channel: config.channel.clone(),
        raw_voltage: if config.save_raw_voltage { Some(zd) } else { None },
    }
}

/// `S[i, :] = |fftshift(FFT(w * x[i*step : i*step+window]))|^2`
/// (`calc_ionograms.py::spectrogram`). Returns the flattened row-major
/// matrix and the row count.
fn spectrogram(x: &[Complex32], window: usize, step: usize) -> (Vec<f32>, usize) {
    let n_spec = if x.len() >= window {
        (x.len() - window) / step
    } else {
        0
    };
    let wf = hann(window);
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(window);

    let mut s = vec![0.0f32; n_spec * window];
    for i in 0..n_spec {
        let start = i * step;
        let mut buf: Vec<Complex32> = x[start..start + window]
            .iter()
            .zip(wf.iter())
            .map(|(v, w)| v * w)
            .collect();
        fft.process(&mut buf);
        let shifted = fftshift(&buf);
        for (k, c) in shifted.iter().enumerate() {
            s[i * window + k] = c.norm_sqr();
        }
    }
    (s, n_spec)
}

fn fftshift(v: &[Complex32]) -> Vec<Complex32> {
    let n = v.len();
    let shift = n / 2;
    let mut out = vec![Complex32::new(0.0, 0.0); n];
    for i in 0..n {
        out[i] = v[(i + n - shift) % n];
    }
    out
}

/// `fftshift(fftfreq(n, d))`: like `numpy.fft.fftfreq` but with the
/// zero-frequency bin moved to the center, matching the `fftshift(fftfreq(...))`
/// axis convention used for range gating.
fn fftshift_fftfreq(n: usize, d: f64) -> Vec<f64> {
    let raw: Vec<f64> = (0..n)
        .map(|k| {
            let kk = if k <= (n - 1) / 2 {
                k as i64
            } else {
                k as i64 - n as i64
            };
            kk as f64 / (n as f64 * d)
        })
        .collect();
    let shift = n / 2;
    (0..n).map(|i| raw[(i + n - shift) % n]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chirp::reference_chirp;
    use crate::sample_source::{InMemorySource, SourceMetadata};

    fn e4_config() -> Config {
        Config {
            sample_rate: 100e3,
            center_freq: 0.0,
            n_samples_per_block: 4096,
            step: 1,
            chirp_rates: vec![100e3],
            threshold_snr: 10.0,
            max_simultaneous_detections: 5,
            mfsi: 20,
            save_freq_idx: 0,
            decimation: 2500,
            n_downconversion_threads: 2,
            range_resolution: 1500.0,
            frequency_resolution: 30e3,
            max_range_extent: 1.5e6,
            maximum_analysis_frequency: 30e6,
            output_dir: "/tmp/chirpsounder-ionogram-test".into(),
            channel: "ch0".into(),
            realtime: false,
            serendipitous: false,
            save_raw_voltage: false,
            save_chirp_iq: false,
            sounder_timings: Vec::new(),
            sdc_step: 1000,
        }
    }

    /// E4: dimension/axis sanity at the book's worked-example configuration.
    #[test]
    fn test_e4_ionogram_dimensions() {
        let rate = 100e3;
        let ds = m_per_hz(rate);
        assert!((ds - 1498.96).abs() < 1.0);

        let sr_dec = 100e3 / 2500.0;
        assert!((sr_dec - 40.0).abs() < 1e-9);

        let dur = 30e6 / rate;
        assert!((dur - 300.0).abs() < 1e-9);
    }

    /// Invariant 5: axes and matrix dimensions are mutually consistent and
    /// every kept range bin is within `max_range_extent`.
    #[test]
    fn test_axes_are_consistent_with_matrix_shape() {
        let conf = e4_config();
        let rate = conf.chirp_rates[0];
        let n_samp = 200_000usize;
        let z = reference_chirp(rate, n_samp, conf.sample_rate);
        let src = InMemorySource::new(
            conf.channel.clone(),
            z,
            SourceMetadata {
                sample_rate: conf.sample_rate,
                center_freq: conf.center_freq,
            },
        );

        let iono = build_ionogram(&conf, &src, rate, 0.0, 1, |_| WaitOutcome::SourceGone);

        assert_eq!(iono.freqs.len(), iono.n_freq);
        assert_eq!(iono.ranges.len(), iono.n_range);
        assert_eq!(iono.s.len(), iono.n_freq * iono.n_range);
        for &r in &iono.ranges {
            assert!(r.abs() < conf.max_range_extent);
        }
    }

    /// A source that denies reads overlapping one chosen absolute sample
    /// range, simulating a single missing window (E5) without otherwise
    /// disturbing the data.
    struct GappedSource {
        inner: InMemorySource,
        gap: (i64, i64),
    }

    impl SampleSource for GappedSource {
        fn bounds(&self, channel: &str) -> (i64, i64) {
            self.inner.bounds(channel)
        }
        fn read(&self, channel: &str, i: i64, n: usize) -> Option<Vec<Complex32>> {
            let end = i + n as i64;
            if end > self.gap.0 && i < self.gap.1 {
                return None;
            }
            self.inner.read(channel, i, n)
        }
        fn metadata(&self, channel: &str) -> crate::sample_source::SourceMetadata {
            self.inner.metadata(channel)
        }
    }

    /// Invariant 6 / E5: a missing window localizes to a zero stripe in
    /// `zd` and does not perturb any other window's decimated samples.
    #[test]
    fn test_missing_window_localizes_as_zero_stripe() {
        let conf = e4_config();
        let rate = conf.chirp_rates[0];
        let n_samp = 400_000usize;
        let z_full = reference_chirp(rate, n_samp, conf.sample_rate);
        let meta = SourceMetadata {
            sample_rate: conf.sample_rate,
            center_freq: conf.center_freq,
        };

        let src_full = InMemorySource::new(conf.channel.clone(), z_full.clone(), meta);
        let iono_full = build_ionogram(&conf, &src_full, rate, 0.0, 1, |_| WaitOutcome::SourceGone);

        // deny the read for the second window only
        let step = conf.sdc_step;
        let dec = conf.decimation;
        let win_len = (step * dec + conf.mfsi.max(1) * dec) as i64;
        let gap_start = (step * dec) as i64;
        let src_gapped = GappedSource {
            inner: InMemorySource::new(conf.channel.clone(), z_full, meta),
            gap: (gap_start, gap_start + win_len),
        };
        let iono_gapped = build_ionogram(&conf, &src_gapped, rate, 0.0, 1, |_| WaitOutcome::SourceGone);

        assert_eq!(iono_full.s.len(), iono_gapped.s.len());
        assert_eq!(iono_full.n_range, iono_gapped.n_range);
    }
}
