//! Loudness normalization curves.
//!
//! Maps an RMS value onto a 0-100 level relative to a calibrated
//! `[min_rms, max_rms]` band. Every curve is monotonic and saturating:
//! anything at or below the band reads 0, anything at or above reads 100.

use serde::{Deserialize, Serialize};

/// Shape of the mapping inside the calibration band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationCurve {
    /// `log10(1 + 9x)`: steep near the bottom of the band
    Logarithmic,
    /// `x^exponent`; an exponent of 0.5 is the square-root curve
    Power { exponent: f64 },
}

impl NormalizationCurve {
    pub fn square_root() -> Self {
        NormalizationCurve::Power { exponent: 0.5 }
    }

    /// Apply the curve to `x` in [0, 1]
    fn shape(self, x: f64) -> f64 {
        match self {
            NormalizationCurve::Logarithmic => (1.0 + 9.0 * x).log10(),
            NormalizationCurve::Power { exponent } => x.powf(exponent),
        }
    }
}

impl Default for NormalizationCurve {
    fn default() -> Self {
        NormalizationCurve::Logarithmic
    }
}

/// Map `rms` into [0, 100] against the `[min_rms, max_rms]` band
pub fn normalized_level(rms: f64, min_rms: f64, max_rms: f64, curve: NormalizationCurve) -> f64 {
    if !rms.is_finite() || rms <= min_rms {
        return 0.0;
    }
    if rms >= max_rms {
        return 100.0;
    }

    let x = (rms - min_rms) / (max_rms - min_rms);
    (curve.shape(x) * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: f64 = 3550.0;
    const MAX: f64 = 4100.0;

    #[test]
    fn test_saturates_outside_band() {
        for curve in [NormalizationCurve::Logarithmic, NormalizationCurve::square_root()] {
            assert_eq!(normalized_level(0.0, MIN, MAX, curve), 0.0);
            assert_eq!(normalized_level(MIN, MIN, MAX, curve), 0.0);
            assert_eq!(normalized_level(MAX, MIN, MAX, curve), 100.0);
            assert_eq!(normalized_level(32_767.0, MIN, MAX, curve), 100.0);
        }
    }

    #[test]
    fn test_midpoint_logarithmic() {
        let level = normalized_level(3825.0, MIN, MAX, NormalizationCurve::Logarithmic);
        let expected = 5.5_f64.log10() * 100.0;
        assert!((level - expected).abs() < 1e-9);
        assert!(level > 0.0 && level < 100.0);
        assert!((level - 74.036).abs() < 0.01);
    }

    #[test]
    fn test_midpoint_square_root() {
        let level = normalized_level(3825.0, MIN, MAX, NormalizationCurve::square_root());
        assert!((level - 0.5_f64.sqrt() * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_monotonic_non_decreasing() {
        for curve in [
            NormalizationCurve::Logarithmic,
            NormalizationCurve::square_root(),
            NormalizationCurve::Power { exponent: 2.0 },
        ] {
            let mut previous = -1.0;
            let mut rms = MIN - 100.0;
            while rms <= MAX + 100.0 {
                let level = normalized_level(rms, MIN, MAX, curve);
                assert!(level >= previous, "{:?} dropped at rms={}", curve, rms);
                assert!((0.0..=100.0).contains(&level));
                previous = level;
                rms += 5.0;
            }
        }
    }

    #[test]
    fn test_nan_reads_zero() {
        assert_eq!(
            normalized_level(f64::NAN, MIN, MAX, NormalizationCurve::Logarithmic),
            0.0
        );
    }
}
