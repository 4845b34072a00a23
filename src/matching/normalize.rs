//! Window normalization
//!
//! Removes absolute price level from a window so windows from different price
//! regimes can be compared point by point.

use serde::{Deserialize, Serialize};

use crate::{EngineError, Result, OHLCV};

/// How a window is mapped into price-free coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NormalizeMode {
    /// Scale OHLC into the window's close range: `(p - min_close) / (max_close - min_close)`.
    #[default]
    MinMax,
    /// Each field relative to the previous close. Entry 0 is all zeros.
    Returns,
    /// Each field relative to the window's first close.
    Cumulative,
}

/// One normalized bar
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl NormalizedPoint {
    #[inline]
    fn relative_to<T: OHLCV>(bar: &T, base: f64) -> Self {
        Self {
            open: (bar.open() - base) / base,
            high: (bar.high() - base) / base,
            low: (bar.low() - base) / base,
            close: (bar.close() - base) / base,
        }
    }

    /// Euclidean distance over the four fields
    #[inline]
    pub fn distance(&self, other: &Self) -> f64 {
        let d_open = self.open - other.open;
        let d_high = self.high - other.high;
        let d_low = self.low - other.low;
        let d_close = self.close - other.close;
        (d_open * d_open + d_high * d_high + d_low * d_low + d_close * d_close).sqrt()
    }
}

/// Price-free representation of a window, one point per bar
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedSeries {
    points: Vec<NormalizedPoint>,
}

impl NormalizedSeries {
    pub fn new(points: Vec<NormalizedPoint>) -> Self {
        Self { points }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub fn points(&self) -> &[NormalizedPoint] {
        &self.points
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }
}

impl From<Vec<NormalizedPoint>> for NormalizedSeries {
    fn from(points: Vec<NormalizedPoint>) -> Self {
        Self::new(points)
    }
}

/// Normalize a window. Empty windows are rejected with [`EngineError::EmptySeries`].
pub fn normalize<T: OHLCV>(bars: &[T], mode: NormalizeMode) -> Result<NormalizedSeries> {
    if bars.is_empty() {
        return Err(EngineError::EmptySeries);
    }

    let points = match mode {
        NormalizeMode::MinMax => min_max(bars),
        NormalizeMode::Returns => returns(bars),
        NormalizeMode::Cumulative => {
            let base = bars[0].close();
            bars.iter()
                .map(|b| NormalizedPoint::relative_to(b, base))
                .collect()
        }
    };

    Ok(NormalizedSeries::new(points))
}

fn min_max<T: OHLCV>(bars: &[T]) -> Vec<NormalizedPoint> {
    let (min_close, max_close) = bars
        .iter()
        .map(|b| b.close())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
            (lo.min(c), hi.max(c))
        });
    let span = max_close - min_close;

    if span <= 0.0 {
        return vec![NormalizedPoint::default(); bars.len()];
    }

    let scale = |p: f64| (p - min_close) / span;
    bars.iter()
        .map(|b| NormalizedPoint {
            open: scale(b.open()),
            high: scale(b.high()),
            low: scale(b.low()),
            close: scale(b.close()),
        })
        .collect()
}

fn returns<T: OHLCV>(bars: &[T]) -> Vec<NormalizedPoint> {
    let mut points = Vec::with_capacity(bars.len());
    points.push(NormalizedPoint::default());
    points.extend(
        bars.windows(2)
            .map(|pair| NormalizedPoint::relative_to(&pair[1], pair[0].close())),
    );
    points
}
