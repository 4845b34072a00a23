//! Auxiliary window descriptors
//!
//! Volatility, net trend, average volume and a handful of technical
//! indicators. Every indicator falls back to a fixed neutral value when the
//! window is shorter than its lookback, so extraction never fails.

use serde::{Deserialize, Serialize};

use super::helpers::{
    self, std_dev, CCI_CONSTANT, CCI_PERIOD, MOMENTUM_PERIOD, RSI_PERIOD, TREND_STRENGTH_PERIOD,
    WILLIAMS_R_PERIOD,
};
use crate::{OHLCVExt, OHLCV};

/// Technical indicator readings at the last bar of a window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    /// 0..=100
    pub rsi: f64,
    /// Percent change over [`MOMENTUM_PERIOD`] bars
    pub momentum: f64,
    /// -100..=0
    pub williams_r: f64,
    pub cci: f64,
    /// ADX-like directional strength, 0..=100
    pub trend_strength: f64,
}

impl Default for IndicatorSet {
    fn default() -> Self {
        Self {
            rsi: helpers::NEUTRAL_RSI,
            momentum: helpers::NEUTRAL_MOMENTUM,
            williams_r: helpers::NEUTRAL_WILLIAMS_R,
            cci: helpers::NEUTRAL_CCI,
            trend_strength: helpers::NEUTRAL_TREND_STRENGTH,
        }
    }
}

/// Descriptors of one window used as secondary similarity signals
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    /// Standard deviation of bar-to-bar returns
    pub volatility: f64,
    /// Net return from first to last close
    pub trend: f64,
    /// `None` when no bar reports volume
    pub average_volume: Option<f64>,
    pub indicators: IndicatorSet,
}

/// Compute the feature set of a window. Empty windows yield neutral defaults.
pub fn extract_features<T: OHLCV>(bars: &[T]) -> FeatureSet {
    let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
        return FeatureSet::default();
    };

    let returns: Vec<f64> = bars.windows(2).map(|w| w[1].return_from(&w[0])).collect();
    let trend = if first.close() > 0.0 {
        (last.close() - first.close()) / first.close()
    } else {
        0.0
    };

    FeatureSet {
        volatility: std_dev(&returns),
        trend,
        average_volume: average_volume(bars),
        indicators: IndicatorSet {
            rsi: rsi(bars, RSI_PERIOD),
            momentum: momentum(bars, MOMENTUM_PERIOD),
            williams_r: williams_r(bars, WILLIAMS_R_PERIOD),
            cci: cci(bars, CCI_PERIOD),
            trend_strength: trend_strength(bars, TREND_STRENGTH_PERIOD),
        },
    }
}

fn average_volume<T: OHLCV>(bars: &[T]) -> Option<f64> {
    if !bars.iter().any(|b| b.volume() > 0.0) {
        return None;
    }
    Some(bars.iter().map(|b| b.volume().max(0.0)).sum::<f64>() / bars.len() as f64)
}

/// Simple-average RSI over up to `period` trailing close deltas.
pub fn rsi<T: OHLCV>(bars: &[T], period: usize) -> f64 {
    if bars.len() < 2 || period == 0 {
        return helpers::NEUTRAL_RSI;
    }

    let start = bars.len().saturating_sub(period + 1);
    let (gains, losses) = bars[start..]
        .windows(2)
        .map(|w| w[1].close() - w[0].close())
        .fold((0.0, 0.0), |(g, l), delta| {
            if delta > 0.0 {
                (g + delta, l)
            } else {
                (g, l - delta)
            }
        });

    match (gains > 0.0, losses > 0.0) {
        (false, false) => helpers::NEUTRAL_RSI,
        (_, false) => 100.0,
        (false, true) => 0.0,
        (true, true) => 100.0 - 100.0 / (1.0 + gains / losses),
    }
}

/// Percent change of the last close versus the close `period` bars earlier.
pub fn momentum<T: OHLCV>(bars: &[T], period: usize) -> f64 {
    let len = bars.len();
    if period == 0 || len <= period {
        return helpers::NEUTRAL_MOMENTUM;
    }
    let base = bars[len - 1 - period].close();
    if base <= 0.0 {
        return helpers::NEUTRAL_MOMENTUM;
    }
    (bars[len - 1].close() - base) / base * 100.0
}

/// Williams %R over the trailing `period` bars.
pub fn williams_r<T: OHLCV>(bars: &[T], period: usize) -> f64 {
    if period == 0 || bars.len() < period {
        return helpers::NEUTRAL_WILLIAMS_R;
    }
    let slice = &bars[bars.len() - period..];
    let highest = slice.iter().map(|b| b.high()).fold(f64::NEG_INFINITY, f64::max);
    let lowest = slice.iter().map(|b| b.low()).fold(f64::INFINITY, f64::min);
    let range = highest - lowest;
    if range <= 0.0 {
        return helpers::NEUTRAL_WILLIAMS_R;
    }
    let close = slice[slice.len() - 1].close();
    (highest - close) / range * -100.0
}

/// Commodity Channel Index of the last bar over the trailing `period` bars.
pub fn cci<T: OHLCV>(bars: &[T], period: usize) -> f64 {
    if period == 0 || bars.len() < period {
        return helpers::NEUTRAL_CCI;
    }
    let typical: Vec<f64> = bars[bars.len() - period..]
        .iter()
        .map(|b| b.typical_price())
        .collect();
    let mean = typical.iter().sum::<f64>() / period as f64;
    let mean_dev = typical.iter().map(|tp| (tp - mean).abs()).sum::<f64>() / period as f64;
    if mean_dev <= 0.0 {
        return helpers::NEUTRAL_CCI;
    }
    (typical[period - 1] - mean) / (CCI_CONSTANT * mean_dev)
}

/// Directional movement index over the trailing `period` bar pairs.
///
/// `+DI` and `-DI` are the summed directional moves divided by the summed true
/// range; the result is `|+DI - -DI| / (+DI + -DI) * 100`.
pub fn trend_strength<T: OHLCV>(bars: &[T], period: usize) -> f64 {
    if period == 0 || bars.len() < period + 1 {
        return helpers::NEUTRAL_TREND_STRENGTH;
    }

    let start = bars.len() - period - 1;
    let (plus_dm, minus_dm, true_range) =
        bars[start..]
            .windows(2)
            .fold((0.0, 0.0, 0.0), |(plus, minus, tr), w| {
                let (prev, cur) = (&w[0], &w[1]);
                let up = cur.high() - prev.high();
                let down = prev.low() - cur.low();
                let plus_move = if up > down && up > 0.0 { up } else { 0.0 };
                let minus_move = if down > up && down > 0.0 { down } else { 0.0 };
                (plus + plus_move, minus + minus_move, tr + cur.true_range(prev))
            });

    if true_range <= 0.0 {
        return helpers::NEUTRAL_TREND_STRENGTH;
    }
    let plus_di = plus_dm / true_range * 100.0;
    let minus_di = minus_dm / true_range * 100.0;
    let di_sum = plus_di + minus_di;
    if di_sum <= 0.0 {
        return helpers::NEUTRAL_TREND_STRENGTH;
    }
    (plus_di - minus_di).abs() / di_sum * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bar;

    fn trending(n: usize, step: f64) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let c = 100.0 + i as f64 * step;
                Bar::new(i as i64, c - step / 2.0, c + 1.0, c - 1.0, c, 500.0)
            })
            .collect()
    }

    #[test]
    fn test_empty_window_is_neutral() {
        let bars: Vec<Bar> = vec![];
        let f = extract_features(&bars);
        assert_eq!(f, FeatureSet::default());
        assert_eq!(f.indicators.rsi, 50.0);
        assert_eq!(f.indicators.williams_r, -50.0);
    }

    #[test]
    fn test_short_window_uses_defaults() {
        let f = extract_features(&trending(5, 1.0));
        assert_eq!(f.indicators.momentum, helpers::NEUTRAL_MOMENTUM);
        assert_eq!(f.indicators.williams_r, helpers::NEUTRAL_WILLIAMS_R);
        assert_eq!(f.indicators.cci, helpers::NEUTRAL_CCI);
        assert_eq!(f.indicators.trend_strength, helpers::NEUTRAL_TREND_STRENGTH);
        // RSI works on whatever deltas exist
        assert_eq!(f.indicators.rsi, 100.0);
    }

    #[test]
    fn test_rsi_extremes() {
        assert_eq!(rsi(&trending(20, 1.0), 14), 100.0);
        assert_eq!(rsi(&trending(20, -1.0), 14), 0.0);
        assert_eq!(rsi(&trending(20, 0.0), 14), 50.0);
    }

    #[test]
    fn test_rsi_mixed() {
        let closes = [100.0, 102.0, 101.0];
        let bars: Vec<Bar> = closes
            .iter()
            .map(|&c| Bar::new(0, c, c + 1.0, c - 1.0, c, 0.0))
            .collect();
        // gains 2, losses 1 -> RS 2 -> RSI 66.67
        assert!((rsi(&bars, 14) - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_trend_and_volatility() {
        let f = extract_features(&trending(11, 1.0));
        assert!((f.trend - 0.1).abs() < 1e-12);
        assert!(f.volatility > 0.0);
        assert_eq!(f.average_volume, Some(500.0));
        assert!((f.indicators.momentum - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_volume() {
        let bars: Vec<Bar> = (0..3).map(|_| Bar::new(0, 10.0, 11.0, 9.0, 10.0, 0.0)).collect();
        assert_eq!(extract_features(&bars).average_volume, None);
    }

    #[test]
    fn test_williams_r_at_high() {
        let bars = trending(14, 1.0);
        let w = williams_r(&bars, 14);
        // close sits 1.0 below the highest high of a 15-wide range
        assert!((w - (-100.0 / 15.0)).abs() < 1e-9, "got {w}");
    }

    #[test]
    fn test_trend_strength_strong_uptrend() {
        let ts = trend_strength(&trending(30, 1.0), 14);
        assert!((ts - 100.0).abs() < 1e-9, "got {ts}");
    }

    #[test]
    fn test_cci_flat_is_neutral() {
        assert_eq!(cci(&trending(25, 0.0), 20), helpers::NEUTRAL_CCI);
        assert!(cci(&trending(25, 1.0), 20) > 100.0);
    }
}
