//! Reference chirp generator.

use rustfft::num_complex::Complex32;
use std::f64::consts::TAU;

/// Generate `chi[k] = exp(i * (pi * rate * (k/sample_rate)^2 mod 2*pi))` for
/// `k in [0, length)`.
///
/// Time and phase are computed in `f64` and the modulo is applied before
/// `exp()` — this keeps the phase error bounded for long `length` instead of
/// letting a huge argument to `cos`/`sin` lose precision.
pub fn reference_chirp(rate: f64, length: usize, sample_rate: f64) -> Vec<Complex32> {
    (0..length)
        .map(|k| {
            let t = k as f64 / sample_rate;
            let phase = (0.5 * rate * t * t * TAU).rem_euclid(TAU);
            Complex32::new(phase.cos() as f32, phase.sin() as f32)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_magnitude() {
        let c = reference_chirp(100e3, 1024, 100e3);
        for s in &c {
            assert!((s.norm() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_starts_at_zero_phase() {
        let c = reference_chirp(100e3, 1024, 100e3);
        assert!((c[0].re - 1.0).abs() < 1e-6);
        assert!(c[0].im.abs() < 1e-6);
    }

    #[test]
    fn test_deterministic() {
        let a = reference_chirp(160e3, 2048, 100e3);
        let b = reference_chirp(160e3, 2048, 100e3);
        assert_eq!(a, b);
    }

    #[test]
    fn test_long_length_stays_bounded() {
        // modulo must happen before exp(), or magnitude drifts for large L.
        let c = reference_chirp(50e3, 5_000_000, 100e3);
        for s in c.iter().step_by(997) {
            assert!((s.norm() - 1.0).abs() < 1e-4);
        }
    }
}
