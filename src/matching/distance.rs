//! Dynamic Time Warping distance between normalized windows
//!
//! Classic O(n·m) dynamic program over a `(n+1) × (m+1)` cost matrix. The
//! result is divided by the query length so distances stay comparable across
//! query sizes.

use super::normalize::NormalizedSeries;
use crate::{EngineError, Result};

/// DTW distance between `a` (query) and `b` (candidate), normalized by `|a|`.
pub fn dtw_distance(a: &NormalizedSeries, b: &NormalizedSeries) -> Result<f64> {
    let n = a.len();
    let m = b.len();
    dtw_distance_banded(a, b, n.max(m))
}

/// DTW restricted to a Sakoe-Chiba band of half-width `band` around the
/// diagonal. The band is widened to `|n - m|` so a warping path always exists.
pub fn dtw_distance_banded(a: &NormalizedSeries, b: &NormalizedSeries, band: usize) -> Result<f64> {
    let n = a.len();
    let m = b.len();
    if n == 0 || m == 0 {
        return Err(EngineError::EmptySeries);
    }

    let band = band.max(n.abs_diff(m));
    let a = a.points();
    let b = b.points();

    // Row-major (n+1) x (m+1); row 0 and column 0 are the +inf border.
    let width = m + 1;
    let mut cost = vec![f64::INFINITY; (n + 1) * width];
    cost[0] = 0.0;

    for i in 1..=n {
        // Band is centred on the scaled diagonal so unequal lengths still line up.
        let centre = (i * m) / n;
        let j_start = centre.saturating_sub(band).max(1);
        let j_end = (centre + band).min(m);

        for j in j_start..=j_end {
            let d = a[i - 1].distance(&b[j - 1]);
            let up = cost[(i - 1) * width + j];
            let left = cost[i * width + j - 1];
            let diag = cost[(i - 1) * width + j - 1];
            cost[i * width + j] = d + up.min(left).min(diag);
        }
    }

    Ok(cost[n * width + m] / n as f64)
}

/// Map a distance onto `(0, 1]`: `1 / (1 + d)`.
#[inline]
pub fn similarity_from_distance(distance: f64) -> f64 {
    1.0 / (1.0 + distance.max(0.0))
}
