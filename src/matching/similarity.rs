//! Window similarity scorers
//!
//! [`SimilarityScorer`] blends six signals into one score in `[0, 1]`:
//!
//! | Signal     | Extended | Compact |
//! |------------|----------|---------|
//! | shape      | 0.35     | 0.35    |
//! | rhythm     | 0.25     | 0.30    |
//! | volatility | 0.15     | 0.15    |
//! | trend      | 0.10     | 0.15    |
//! | volume     | 0.05     | 0.05    |
//! | indicators | 0.10     | -       |
//!
//! Shape compares closes relative to the window's first close (cumulative
//! returns) rather than the bar-to-bar return series; the bar-to-bar returns
//! feed the rhythm signal instead.
//!
//! [`DtwScorer`] compares min-max normalized windows with DTW instead and
//! tolerates candidates of a different length.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::distance::{dtw_distance_banded, similarity_from_distance};
use super::features::{extract_features, FeatureSet, IndicatorSet};
use super::helpers::{
    self, bounded_similarity, mean_exp_decay, relative_similarity, RHYTHM_DECAY, SHAPE_DECAY,
    SIMILARITY_EPSILON,
};
use super::normalize::{normalize, NormalizeMode, NormalizedSeries};
use crate::{EngineError, Result, ScorerId, WindowScorer, OHLCV};

// ============================================================
// WEIGHTS
// ============================================================

/// Named weight presets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeightProfile {
    /// Six signals including indicator agreement
    #[default]
    Extended,
    /// Five signals, no indicators
    Compact,
}

/// Per-signal weights; always sum to 1.0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub shape: f64,
    pub rhythm: f64,
    pub volatility: f64,
    pub trend: f64,
    pub volume: f64,
    pub indicators: f64,
}

impl ScoreWeights {
    pub const EXTENDED: Self = Self {
        shape: 0.35,
        rhythm: 0.25,
        volatility: 0.15,
        trend: 0.10,
        volume: 0.05,
        indicators: 0.10,
    };

    pub const COMPACT: Self = Self {
        shape: 0.35,
        rhythm: 0.30,
        volatility: 0.15,
        trend: 0.15,
        volume: 0.05,
        indicators: 0.0,
    };

    /// Custom weights. Each must be finite and non-negative, total must be 1.0.
    pub fn new(
        shape: f64,
        rhythm: f64,
        volatility: f64,
        trend: f64,
        volume: f64,
        indicators: f64,
    ) -> Result<Self> {
        let weights = Self {
            shape,
            rhythm,
            volatility,
            trend,
            volume,
            indicators,
        };
        weights.validate()?;
        Ok(weights)
    }

    pub fn validate(&self) -> Result<()> {
        let all = self.as_array();
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(EngineError::InvalidValue(
                "weights must be finite and non-negative",
            ));
        }
        let total: f64 = all.iter().sum();
        if (total - 1.0).abs() > 1e-9 {
            return Err(EngineError::InvalidConfig(format!(
                "weights must sum to 1.0, got {total}"
            )));
        }
        Ok(())
    }

    fn as_array(&self) -> [f64; 6] {
        [
            self.shape,
            self.rhythm,
            self.volatility,
            self.trend,
            self.volume,
            self.indicators,
        ]
    }
}

impl From<WeightProfile> for ScoreWeights {
    fn from(profile: WeightProfile) -> Self {
        match profile {
            WeightProfile::Extended => Self::EXTENDED,
            WeightProfile::Compact => Self::COMPACT,
        }
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self::EXTENDED
    }
}

// ============================================================
// WINDOW PROFILE
// ============================================================

/// Everything the direct scorer needs from one window, computed once
#[derive(Debug, Clone, PartialEq)]
pub struct WindowProfile {
    /// Closes relative to the first close
    shape: Vec<f64>,
    /// Bar-to-bar close returns (length `len - 1`)
    returns: Vec<f64>,
    features: FeatureSet,
}

impl WindowProfile {
    pub fn new<T: OHLCV>(bars: &[T]) -> Result<Self> {
        let shape = normalize(bars, NormalizeMode::Cumulative)?.closes();
        let mut returns = normalize(bars, NormalizeMode::Returns)?.closes();
        returns.remove(0);

        Ok(Self {
            shape,
            returns,
            features: extract_features(bars),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.shape.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shape.is_empty()
    }

    #[inline]
    pub fn features(&self) -> &FeatureSet {
        &self.features
    }
}

/// Individual signal values behind a score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub shape: f64,
    pub rhythm: f64,
    pub volatility: f64,
    pub trend: f64,
    /// `None` when neither window carries volume
    pub volume: Option<f64>,
    pub indicators: f64,
}

impl ScoreBreakdown {
    /// Weighted blend. A missing volume signal drops out and the remaining
    /// weights are renormalized.
    pub fn combine(&self, w: &ScoreWeights) -> f64 {
        let mut total = w.shape * self.shape
            + w.rhythm * self.rhythm
            + w.volatility * self.volatility
            + w.trend * self.trend
            + w.indicators * self.indicators;
        let mut weight_sum = w.shape + w.rhythm + w.volatility + w.trend + w.indicators;

        if let Some(volume) = self.volume {
            total += w.volume * volume;
            weight_sum += w.volume;
        }

        if weight_sum <= 0.0 {
            return 0.0;
        }
        (total / weight_sum).clamp(0.0, 1.0)
    }
}

// ============================================================
// DIRECT SCORER
// ============================================================

/// Multi-signal scorer for equal-length windows
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityScorer {
    pub weights: ScoreWeights,
}

impl Default for SimilarityScorer {
    fn default() -> Self {
        Self::with_profile(WeightProfile::Extended)
    }
}

impl SimilarityScorer {
    pub fn with_profile(profile: WeightProfile) -> Self {
        Self {
            weights: profile.into(),
        }
    }

    pub fn with_weights(weights: ScoreWeights) -> Result<Self> {
        weights.validate()?;
        Ok(Self { weights })
    }

    /// Signal-by-signal comparison of two prepared windows.
    pub fn compare(&self, query: &WindowProfile, candidate: &WindowProfile) -> Result<ScoreBreakdown> {
        if query.is_empty() || candidate.is_empty() {
            return Err(EngineError::EmptySeries);
        }
        if query.len() != candidate.len() {
            return Err(EngineError::LengthMismatch {
                query: query.len(),
                candidate: candidate.len(),
            });
        }

        let qf = &query.features;
        let cf = &candidate.features;

        Ok(ScoreBreakdown {
            shape: mean_exp_decay(&query.shape, &candidate.shape, SHAPE_DECAY),
            rhythm: mean_exp_decay(&query.returns, &candidate.returns, RHYTHM_DECAY),
            volatility: relative_similarity(qf.volatility, cf.volatility, SIMILARITY_EPSILON),
            trend: trend_similarity(qf.trend, cf.trend),
            volume: volume_similarity(qf.average_volume, cf.average_volume),
            indicators: indicator_similarity(&qf.indicators, &cf.indicators),
        })
    }

    /// Breakdown for two raw windows.
    pub fn breakdown<T: OHLCV>(&self, query: &[T], candidate: &[T]) -> Result<ScoreBreakdown> {
        if query.len() != candidate.len() && !query.is_empty() && !candidate.is_empty() {
            return Err(EngineError::LengthMismatch {
                query: query.len(),
                candidate: candidate.len(),
            });
        }
        self.compare(&WindowProfile::new(query)?, &WindowProfile::new(candidate)?)
    }
}

impl WindowScorer for SimilarityScorer {
    type Prepared = WindowProfile;

    fn id(&self) -> ScorerId {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for w in self.weights.as_array() {
            w.to_bits().hash(&mut hasher);
        }
        ScorerId {
            name: "SIMILARITY",
            params: hasher.finish(),
        }
    }

    fn prepare<T: OHLCV>(&self, query: &[T]) -> Result<WindowProfile> {
        WindowProfile::new(query)
    }

    fn score_prepared<T: OHLCV>(&self, query: &WindowProfile, candidate: &[T]) -> Result<f64> {
        if candidate.len() != query.len() && !candidate.is_empty() {
            return Err(EngineError::LengthMismatch {
                query: query.len(),
                candidate: candidate.len(),
            });
        }
        let candidate = WindowProfile::new(candidate)?;
        Ok(self.compare(query, &candidate)?.combine(&self.weights))
    }
}

fn trend_similarity(a: f64, b: f64) -> f64 {
    if a * b < 0.0 {
        return 0.0;
    }
    relative_similarity(a, b, SIMILARITY_EPSILON)
}

fn volume_similarity(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(relative_similarity(a, b, SIMILARITY_EPSILON)),
        (None, None) => None,
        _ => Some(helpers::NEUTRAL_VOLUME_SIMILARITY),
    }
}

fn indicator_similarity(a: &IndicatorSet, b: &IndicatorSet) -> f64 {
    let agreements = [
        bounded_similarity(a.rsi, b.rsi, 100.0),
        relative_similarity(a.momentum, b.momentum, helpers::MOMENTUM_SCALE_FLOOR),
        bounded_similarity(a.williams_r, b.williams_r, 100.0),
        relative_similarity(a.cci, b.cci, helpers::CCI_SCALE_FLOOR),
        bounded_similarity(a.trend_strength, b.trend_strength, 100.0),
    ];
    agreements.iter().sum::<f64>() / agreements.len() as f64
}

// ============================================================
// DTW SCORER
// ============================================================

/// DTW-based scorer: `1 / (1 + dtw(query, candidate))`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DtwScorer {
    pub mode: NormalizeMode,
    /// Sakoe-Chiba half-width; `None` runs the full matrix
    pub band: Option<usize>,
}

impl Default for DtwScorer {
    fn default() -> Self {
        Self {
            mode: NormalizeMode::MinMax,
            band: None,
        }
    }
}

impl DtwScorer {
    pub fn with_band(band: usize) -> Self {
        Self {
            band: Some(band),
            ..Self::default()
        }
    }

    /// DTW distance between a prepared query and a raw candidate.
    pub fn distance<T: OHLCV>(&self, query: &NormalizedSeries, candidate: &[T]) -> Result<f64> {
        let candidate = normalize(candidate, self.mode)?;
        let band = self
            .band
            .unwrap_or_else(|| query.len().max(candidate.len()));
        dtw_distance_banded(query, &candidate, band)
    }
}

impl WindowScorer for DtwScorer {
    type Prepared = NormalizedSeries;

    fn id(&self) -> ScorerId {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.mode.hash(&mut hasher);
        self.band.hash(&mut hasher);
        ScorerId {
            name: "DTW",
            params: hasher.finish(),
        }
    }

    fn prepare<T: OHLCV>(&self, query: &[T]) -> Result<NormalizedSeries> {
        normalize(query, self.mode)
    }

    fn score_prepared<T: OHLCV>(&self, query: &NormalizedSeries, candidate: &[T]) -> Result<f64> {
        Ok(similarity_from_distance(self.distance(query, candidate)?))
    }
}
