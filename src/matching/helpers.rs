//! Shared constants and comparison helpers for window matching
//!
//! Neutral indicator defaults, decay rates and the data-quality threshold used
//! across the scorer, feature extractor and scanner.

// ============================================================
// NUMERIC GUARDS
// ============================================================

/// Floor used in relative comparisons so `0 / 0` never happens
pub const SIMILARITY_EPSILON: f64 = 1e-10;

/// Largest bar-to-bar close change accepted by the quality filter (50%)
pub const MAX_CLOSE_JUMP: f64 = 0.5;

// ============================================================
// SIGNAL DECAY RATES
// ============================================================

/// Decay applied to cumulative-shape differences: `exp(-5 * |a - b|)`
pub const SHAPE_DECAY: f64 = 5.0;
/// Decay applied to bar-to-bar return differences: `exp(-20 * |a - b|)`
pub const RHYTHM_DECAY: f64 = 20.0;

/// Score given to volume when only one side reports volume
pub const NEUTRAL_VOLUME_SIMILARITY: f64 = 0.5;

// ============================================================
// INDICATOR LOOKBACKS AND NEUTRAL DEFAULTS
// ============================================================

pub const RSI_PERIOD: usize = 14;
pub const MOMENTUM_PERIOD: usize = 10;
pub const WILLIAMS_R_PERIOD: usize = 14;
pub const CCI_PERIOD: usize = 20;
pub const TREND_STRENGTH_PERIOD: usize = 14;

/// CCI scaling constant (Lambert)
pub const CCI_CONSTANT: f64 = 0.015;

pub const NEUTRAL_RSI: f64 = 50.0;
pub const NEUTRAL_MOMENTUM: f64 = 0.0;
pub const NEUTRAL_WILLIAMS_R: f64 = -50.0;
pub const NEUTRAL_CCI: f64 = 0.0;
pub const NEUTRAL_TREND_STRENGTH: f64 = 50.0;

/// CCI differences are measured against at least this span
pub const CCI_SCALE_FLOOR: f64 = 100.0;
/// Momentum differences (in percent) are measured against at least this span
pub const MOMENTUM_SCALE_FLOOR: f64 = 1.0;

// ============================================================
// HELPER FUNCTIONS
// ============================================================

/// `1 - |a - b| / max(|a|, |b|, floor)`, clamped to `[0, 1]`.
#[inline]
pub fn relative_similarity(a: f64, b: f64, floor: f64) -> f64 {
    let scale = a.abs().max(b.abs()).max(floor);
    (1.0 - (a - b).abs() / scale).clamp(0.0, 1.0)
}

/// Agreement of two values living on a fixed-width scale (e.g. RSI on 0..100).
#[inline]
pub fn bounded_similarity(a: f64, b: f64, width: f64) -> f64 {
    (1.0 - (a - b).abs() / width).clamp(0.0, 1.0)
}

/// Mean of `exp(-decay * |a[i] - b[i]|)` over aligned elements. Empty input → 1.0.
#[inline]
pub fn mean_exp_decay(a: &[f64], b: &[f64], decay: f64) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 1.0;
    }
    let sum: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| (-decay * (x - y).abs()).exp())
        .sum();
    sum / n as f64
}

/// Population standard deviation. Fewer than two values → 0.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

/// Round to two decimals (percent outcomes)
#[inline]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_similarity() {
        assert_eq!(relative_similarity(2.0, 2.0, SIMILARITY_EPSILON), 1.0);
        assert!((relative_similarity(1.0, 2.0, SIMILARITY_EPSILON) - 0.5).abs() < 1e-12);
        assert_eq!(relative_similarity(0.0, 0.0, SIMILARITY_EPSILON), 1.0);
        assert_eq!(relative_similarity(-5.0, 5.0, SIMILARITY_EPSILON), 0.0);
    }

    #[test]
    fn test_mean_exp_decay_identical() {
        let a = [0.1, -0.2, 0.3];
        assert_eq!(mean_exp_decay(&a, &a, RHYTHM_DECAY), 1.0);
        assert_eq!(mean_exp_decay(&[], &[], RHYTHM_DECAY), 1.0);
    }

    #[test]
    fn test_std_dev() {
        assert_eq!(std_dev(&[1.0]), 0.0);
        assert!((std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(5.004), 5.0);
        assert_eq!(round2(-2.345_6), -2.35);
    }
}
