//! # YAPMATCH - Yet Another Price-pattern Matcher
//!
//! Historical similarity search over OHLC(V) bars: pick a query window, find
//! the windows of a long history that look like it, rank them, and see what
//! price did next.
//!
//! ## Quick Start
//!
//! ```rust
//! use yapmatch::prelude::*;
//!
//! let history: Vec<Bar> = (0..200)
//!     .map(|i| {
//!         let c = 100.0 + (i as f64 * 0.3).sin() * 5.0;
//!         Bar::new(i, c, c * 1.01, c * 0.99, c, 1000.0)
//!     })
//!     .collect();
//!
//! let engine = EngineBuilder::new()
//!     .similarity_threshold(0.8)
//!     .look_ahead(10)
//!     .top_n(5)
//!     .build()
//!     .unwrap();
//!
//! // Use the last 20 bars as the query and skip matching it against itself
//! let query = WindowSpan::new(history.len() - 20, 20);
//! let matches = engine.scan_excluding(query, &history).unwrap();
//! let summary = MatchSummary::from_matches(&matches);
//! assert!(summary.count <= 5);
//! ```

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::debug;

pub mod matching;
pub mod params;

pub mod prelude {
    pub use crate::{
        // Pipeline
        matching::*,
        // Parameters
        params::{get_period, get_threshold, ParamMeta, ParamType, ParameterizedConfig},
        // Free-standing operations
        scan,
        scan_instruments,
        validate_series,
        // Types
        Bar,
        // Engine
        EngineBuilder,
        // Errors
        EngineError,
        InstrumentError,
        InstrumentMatches,
        Match,
        MatchEngine,
        OHLCVExt,
        Period,
        Ratio,
        Result,
        ScorerId,
        SearchConfig,
        WindowScorer,
        WindowSpan,
        OHLCV,
    };
}

use matching::{rank, scanner, DtwScorer, ScoreCache, SimilarityScorer, WeightProfile, WindowScan};

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the matching engine. All are recoverable.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Empty series: a window or series has no bars")]
    EmptySeries,

    #[error("Length mismatch: query has {query} bars, candidate has {candidate}")]
    LengthMismatch { query: usize, candidate: usize },

    #[error("Insufficient history: need {need} bars, got {got}")]
    InsufficientHistory { need: usize, got: usize },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid OHLCV at index {index}: {reason}")]
    InvalidOHLCV { index: usize, reason: &'static str },

    #[error("Scan cancelled")]
    Cancelled,
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(EngineError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(EngineError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Bar count (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(EngineError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    /// Unchecked constructor; configs built this way are checked by `SearchConfig::validate`.
    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    /// Return 0.0 when the data source has no volume
    fn volume(&self) -> f64;

    fn timestamp(&self) -> Option<i64> {
        None
    }
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    /// Wilder true range against the previous bar
    #[inline]
    fn true_range(&self, prev: &impl OHLCV) -> f64 {
        let prev_close = prev.close();
        self.range()
            .max((self.high() - prev_close).abs())
            .max((self.low() - prev_close).abs())
    }

    /// (high + low + close) / 3
    #[inline]
    fn typical_price(&self) -> f64 {
        (self.high() + self.low() + self.close()) / 3.0
    }

    /// Close-to-close return versus `prev`. Zero if the previous close is not positive.
    #[inline]
    fn return_from(&self, prev: &impl OHLCV) -> f64 {
        let base = prev.close();
        if base > 0.0 {
            (self.close() - base) / base
        } else {
            0.0
        }
    }

    /// Validate OHLCV data consistency
    fn validate(&self) -> Result<()> {
        let (o, h, l, c) = (self.open(), self.high(), self.low(), self.close());
        if !(o.is_finite() && h.is_finite() && l.is_finite() && c.is_finite()) {
            return Err(EngineError::InvalidOHLCV {
                index: 0,
                reason: "NaN or infinite value in OHLC",
            });
        }
        if o <= 0.0 || h <= 0.0 || l <= 0.0 || c <= 0.0 {
            return Err(EngineError::InvalidOHLCV {
                index: 0,
                reason: "non-positive price",
            });
        }
        if h < l {
            return Err(EngineError::InvalidOHLCV {
                index: 0,
                reason: "high < low",
            });
        }
        if !(l..=h).contains(&o) {
            return Err(EngineError::InvalidOHLCV {
                index: 0,
                reason: "open outside [low, high]",
            });
        }
        if !(l..=h).contains(&c) {
            return Err(EngineError::InvalidOHLCV {
                index: 0,
                reason: "close outside [low, high]",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

/// Validate every bar of a series, reporting the first bad index.
pub fn validate_series<T: OHLCV>(bars: &[T]) -> Result<()> {
    for (index, bar) in bars.iter().enumerate() {
        bar.validate().map_err(|e| match e {
            EngineError::InvalidOHLCV { reason, .. } => EngineError::InvalidOHLCV { index, reason },
            other => other,
        })?;
    }
    Ok(())
}

/// Plain OHLCV bar for callers without their own bar type
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bar {
    /// Caller-defined time unit (e.g. unix millis)
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl Bar {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl OHLCV for Bar {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.timestamp)
    }
}

// ============================================================
// WINDOWS AND MATCHES
// ============================================================

/// Contiguous slice of a series: `[start, start + len)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct WindowSpan {
    pub start: usize,
    pub len: usize,
}

impl WindowSpan {
    #[inline]
    pub const fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    /// One past the last index
    #[inline]
    pub fn end(&self) -> usize {
        self.start.saturating_add(self.len)
    }

    #[inline]
    pub fn range(&self) -> std::ops::Range<usize> {
        self.start..self.end()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn overlaps(&self, other: &WindowSpan) -> bool {
        !self.is_empty() && !other.is_empty() && self.start < other.end() && other.start < self.end()
    }
}

/// One historical window similar to the query - Copy, no allocations
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Match {
    pub start_index: usize,
    /// Inclusive
    pub end_index: usize,
    /// Similarity 0.0..=1.0
    pub score: f64,
    pub source: WindowSpan,
    /// Bars after the source window; shorter than the look-ahead near the end of history
    pub future: WindowSpan,
    /// Percent move over the look-ahead horizon, `None` without enough trailing bars
    pub outcome: Option<f64>,
    pub start_timestamp: Option<i64>,
    pub end_timestamp: Option<i64>,
}

// ============================================================
// SCORER TRAIT
// ============================================================

/// Identity of a scorer and its parameters (used as cache namespace)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScorerId {
    pub name: &'static str,
    pub params: u64,
}

/// Compares a query window against candidate windows.
///
/// `prepare` runs once per scan so per-query work is not repeated at every
/// position.
pub trait WindowScorer: Send + Sync {
    type Prepared: Send + Sync;

    fn id(&self) -> ScorerId;

    fn prepare<T: OHLCV>(&self, query: &[T]) -> Result<Self::Prepared>;

    fn score_prepared<T: OHLCV>(&self, query: &Self::Prepared, candidate: &[T]) -> Result<f64>;

    fn score<T: OHLCV>(&self, query: &[T], candidate: &[T]) -> Result<f64> {
        let prepared = self.prepare(query)?;
        self.score_prepared(&prepared, candidate)
    }
}

// ============================================================
// SEARCH CONFIG
// ============================================================

/// Parameters of one search
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Minimum score to keep a candidate, in (0, 1]
    pub similarity_threshold: f64,
    /// Distance between consecutive candidate starts
    pub step_size: Period,
    /// Bars after a candidate used for the outcome
    pub look_ahead: Period,
    /// Bars a candidate must have after it to be scanned at all
    pub min_look_ahead: Period,
    pub top_n: Period,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.75,
            step_size: Period::new_const(1),
            look_ahead: Period::new_const(20),
            min_look_ahead: Period::new_const(1),
            top_n: Period::new_const(10),
        }
    }
}

impl SearchConfig {
    pub fn new(
        similarity_threshold: f64,
        step_size: usize,
        look_ahead: usize,
        top_n: usize,
    ) -> Result<Self> {
        let config = Self {
            similarity_threshold,
            step_size: Period::new_const(step_size),
            look_ahead: Period::new_const(look_ahead),
            top_n: Period::new_const(top_n),
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let t = self.similarity_threshold;
        if !(t > 0.0 && t <= 1.0) {
            return Err(EngineError::InvalidConfig(format!(
                "similarity_threshold must be in (0, 1], got {t}"
            )));
        }
        for (name, value) in [
            ("step_size", self.step_size),
            ("look_ahead", self.look_ahead),
            ("min_look_ahead", self.min_look_ahead),
            ("top_n", self.top_n),
        ] {
            if value.get() == 0 {
                return Err(EngineError::InvalidConfig(format!("{name} must be >= 1")));
            }
        }
        if self.min_look_ahead > self.look_ahead {
            return Err(EngineError::InvalidConfig(format!(
                "min_look_ahead ({}) exceeds look_ahead ({})",
                self.min_look_ahead.get(),
                self.look_ahead.get()
            )));
        }
        Ok(())
    }
}

// ============================================================
// MATCH ENGINE
// ============================================================

/// Main similarity search engine
pub struct MatchEngine<S: WindowScorer = SimilarityScorer> {
    scorer: S,
    config: SearchConfig,
    parallel: bool,
    cache: Option<Arc<ScoreCache>>,
}

impl<S: WindowScorer> MatchEngine<S> {
    pub fn new(scorer: S, config: SearchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            scorer,
            config,
            parallel: false,
            cache: None,
        })
    }

    #[inline]
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    #[inline]
    pub fn scorer(&self) -> &S {
        &self.scorer
    }

    pub fn cache(&self) -> Option<&Arc<ScoreCache>> {
        self.cache.as_ref()
    }

    // ===========================================
    // LOW-LEVEL: Single comparison
    // ===========================================

    /// Score one candidate against the query.
    #[inline]
    pub fn score<T: OHLCV>(&self, query: &[T], candidate: &[T]) -> Result<f64> {
        self.scorer.score(query, candidate)
    }

    // ===========================================
    // MID-LEVEL: Lazy scan
    // ===========================================

    /// Iterate accepted matches in position order, unranked.
    pub fn iter<'a, T: OHLCV>(&'a self, query: &[T], history: &'a [T]) -> Result<WindowScan<'a, T, S>> {
        self.check_inputs(query, history)?;
        let ctx = scanner::context(&self.scorer, query, history, &self.config, self.cache.as_deref())?;
        Ok(WindowScan::new(ctx))
    }

    // ===========================================
    // HIGH-LEVEL: Ranked search
    // ===========================================

    /// Scan the whole history and return the ranked top-N matches.
    pub fn scan<T: OHLCV + Sync>(&self, query: &[T], history: &[T]) -> Result<Vec<Match>> {
        self.run(query, history, None, None)
    }

    /// Like [`scan`](Self::scan) with the query taken from `history` itself;
    /// candidates overlapping the query window are skipped.
    pub fn scan_excluding<T: OHLCV + Sync>(&self, query: WindowSpan, history: &[T]) -> Result<Vec<Match>> {
        let bars = history
            .get(query.range())
            .ok_or(EngineError::InsufficientHistory {
                need: query.end(),
                got: history.len(),
            })?;
        self.run(bars, history, Some(query), None)
    }

    /// Like [`scan`](Self::scan), aborting with [`EngineError::Cancelled`] once
    /// `cancel` is set. The flag is polled between positions.
    pub fn scan_with_cancel<T: OHLCV + Sync>(
        &self,
        query: &[T],
        history: &[T],
        cancel: &AtomicBool,
    ) -> Result<Vec<Match>> {
        self.run(query, history, None, Some(cancel))
    }

    /// Re-score a shortlist with DTW and re-rank it.
    pub fn rerank_with_dtw<T: OHLCV>(
        &self,
        query: &[T],
        history: &[T],
        matches: &[Match],
        dtw: &DtwScorer,
    ) -> Result<Vec<Match>> {
        matching::rerank_with_dtw(query, history, matches, dtw)
    }

    // ===========================================
    // Internal helpers
    // ===========================================

    fn run<T: OHLCV + Sync>(
        &self,
        query: &[T],
        history: &[T],
        exclude: Option<WindowSpan>,
        cancel: Option<&AtomicBool>,
    ) -> Result<Vec<Match>> {
        self.check_inputs(query, history)?;

        let mut ctx = scanner::context(&self.scorer, query, history, &self.config, self.cache.as_deref())?;
        ctx.exclude = exclude;
        ctx.cancel = cancel;

        debug!(
            query_len = query.len(),
            history_len = history.len(),
            positions = ctx.position_count(),
            parallel = self.parallel,
            scorer = self.scorer.id().name,
            "starting window scan"
        );

        let accepted = if self.parallel {
            ctx.positions()
                .into_par_iter()
                .map(|start| {
                    ctx.check_cancelled()?;
                    ctx.evaluate(start)
                })
                .collect::<Result<Vec<Option<Match>>>>()?
                .into_iter()
                .flatten()
                .collect()
        } else {
            WindowScan::new(ctx).collect::<Result<Vec<Match>>>()?
        };

        let accepted_count = accepted.len();
        let ranked = rank(accepted, self.config.top_n.get());
        debug!(
            accepted = accepted_count,
            returned = ranked.len(),
            "window scan finished"
        );
        Ok(ranked)
    }

    fn check_inputs<T: OHLCV>(&self, query: &[T], history: &[T]) -> Result<()> {
        if query.is_empty() || history.is_empty() {
            return Err(EngineError::EmptySeries);
        }
        let need = query.len().saturating_mul(2);
        if history.len() < need {
            return Err(EngineError::InsufficientHistory {
                need,
                got: history.len(),
            });
        }
        Ok(())
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating MatchEngine instances
pub struct EngineBuilder<S: WindowScorer = SimilarityScorer> {
    scorer: S,
    config: SearchConfig,
    parallel: bool,
    cache: Option<Arc<ScoreCache>>,
}

impl Default for EngineBuilder<SimilarityScorer> {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder<SimilarityScorer> {
    pub fn new() -> Self {
        Self {
            scorer: SimilarityScorer::default(),
            config: SearchConfig::default(),
            parallel: false,
            cache: None,
        }
    }

    /// Switch the direct scorer to a named weight profile
    pub fn weights(mut self, profile: WeightProfile) -> Self {
        self.scorer = SimilarityScorer::with_profile(profile);
        self
    }
}

impl<S: WindowScorer> EngineBuilder<S> {
    /// Change scorer
    pub fn scorer<S2: WindowScorer>(self, scorer: S2) -> EngineBuilder<S2> {
        EngineBuilder {
            scorer,
            config: self.config,
            parallel: self.parallel,
            cache: self.cache,
        }
    }

    /// Replace the whole search config
    pub fn config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn similarity_threshold(mut self, threshold: f64) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    pub fn step_size(mut self, step: usize) -> Self {
        self.config.step_size = Period::new_const(step);
        self
    }

    pub fn look_ahead(mut self, bars: usize) -> Self {
        self.config.look_ahead = Period::new_const(bars);
        self
    }

    pub fn min_look_ahead(mut self, bars: usize) -> Self {
        self.config.min_look_ahead = Period::new_const(bars);
        self
    }

    pub fn top_n(mut self, n: usize) -> Self {
        self.config.top_n = Period::new_const(n);
        self
    }

    /// Score positions on the rayon pool
    pub fn parallel(mut self, enable: bool) -> Self {
        self.parallel = enable;
        self
    }

    /// Share a score cache across scans
    pub fn cache(mut self, cache: Arc<ScoreCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<MatchEngine<S>> {
        let mut engine = MatchEngine::new(self.scorer, self.config)?;
        engine.parallel = self.parallel;
        engine.cache = self.cache;
        Ok(engine)
    }
}

// ============================================================
// FREE-STANDING SCAN
// ============================================================

/// Ranked search with the default scorer.
pub fn scan<T: OHLCV + Sync>(query: &[T], history: &[T], config: &SearchConfig) -> Result<Vec<Match>> {
    MatchEngine::new(SimilarityScorer::default(), *config)?.scan(query, history)
}

pub use matching::dtw_distance;

// ============================================================
// PARALLEL SCANNING
// ============================================================

use rayon::prelude::*;

/// Matches found in a single instrument
#[derive(Debug)]
pub struct InstrumentMatches {
    pub symbol: String,
    pub matches: Vec<Match>,
}

/// Error from scanning a single instrument
#[derive(Debug)]
pub struct InstrumentError {
    pub symbol: String,
    pub error: EngineError,
}

/// Search one query across many instruments in parallel
pub fn scan_instruments<'a, T, I, S>(
    engine: &MatchEngine<S>,
    query: &[T],
    instruments: I,
) -> (Vec<InstrumentMatches>, Vec<InstrumentError>)
where
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [T])>,
    S: WindowScorer,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, history)| {
            engine
                .scan(query, history)
                .map(|matches| InstrumentMatches {
                    symbol: symbol.to_string(),
                    matches,
                })
                .map_err(|error| InstrumentError {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TYPE ALIASES
// ============================================================

/// Engine with the DTW scorer
pub type DtwEngine = MatchEngine<DtwScorer>;

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize, start: f64, step: f64) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let c = start + i as f64 * step;
                Bar::new(i as i64, c, c + 0.5, c - 0.5, c, 1000.0)
            })
            .collect()
    }

    fn zigzag(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let c = if i % 2 == 0 { 100.0 } else { 103.0 };
                Bar::new(i as i64, c, c + 0.5, c - 0.5, c, 1000.0)
            })
            .collect()
    }

    #[test]
    fn test_ratio_validation() {
        assert!(Ratio::new(0.0).is_ok());
        assert!(Ratio::new(1.0).is_ok());
        assert!(Ratio::new(-0.1).is_err());
        assert!(Ratio::new(1.1).is_err());
        assert!(Ratio::new(f64::NAN).is_err());
    }

    #[test]
    fn test_period_validation() {
        assert!(Period::new(1).is_ok());
        assert!(Period::new(0).is_err());
    }

    #[test]
    fn test_ohlcv_ext() {
        let prev = Bar::new(0, 100.0, 101.0, 99.0, 100.0, 0.0);
        let bar = Bar::new(1, 104.0, 106.0, 103.0, 105.0, 0.0);
        assert_eq!(bar.range(), 3.0);
        assert_eq!(bar.true_range(&prev), 6.0);
        assert!((bar.typical_price() - 314.0 / 3.0).abs() < 1e-12);
        assert!((bar.return_from(&prev) - 0.05).abs() < 1e-12);
        assert!(bar.validate().is_ok());
    }

    #[test]
    fn test_validate_series_reports_index() {
        let mut bars = ramp(5, 100.0, 1.0);
        assert!(validate_series(&bars).is_ok());
        bars[3].close = 200.0;
        assert_eq!(
            validate_series(&bars),
            Err(EngineError::InvalidOHLCV {
                index: 3,
                reason: "close outside [low, high]"
            })
        );
    }

    #[test]
    fn test_window_span() {
        let a = WindowSpan::new(10, 5);
        assert_eq!(a.end(), 15);
        assert_eq!(a.range(), 10..15);
        assert!(a.overlaps(&WindowSpan::new(14, 3)));
        assert!(!a.overlaps(&WindowSpan::new(15, 3)));
        assert!(!a.overlaps(&WindowSpan::new(12, 0)));
    }

    #[test]
    fn test_config_validation() {
        assert!(SearchConfig::default().validate().is_ok());
        assert!(SearchConfig::new(0.0, 1, 5, 3).is_err());
        assert!(SearchConfig::new(1.0, 1, 5, 3).is_ok());
        assert!(SearchConfig::new(1.01, 1, 5, 3).is_err());
        assert!(SearchConfig::new(0.5, 0, 5, 3).is_err());
        assert!(SearchConfig::new(0.5, 1, 0, 3).is_err());
        assert!(SearchConfig::new(0.5, 1, 5, 0).is_err());
        assert!(SearchConfig::new(f64::NAN, 1, 5, 3).is_err());
    }

    #[test]
    fn test_builder_rejects_bad_config() {
        assert!(matches!(
            EngineBuilder::new().step_size(0).build(),
            Err(EngineError::InvalidConfig(_))
        ));
        assert!(EngineBuilder::new().look_ahead(2).min_look_ahead(3).build().is_err());
        assert!(EngineBuilder::new().similarity_threshold(1.5).build().is_err());
    }

    #[test]
    fn test_insufficient_history() {
        let engine = EngineBuilder::new().build().unwrap();
        let history = ramp(15, 100.0, 1.0);
        let query = ramp(10, 50.0, 1.0);
        assert_eq!(
            engine.scan(&query, &history),
            Err(EngineError::InsufficientHistory { need: 20, got: 15 })
        );
    }

    #[test]
    fn test_empty_query() {
        let engine = EngineBuilder::new().build().unwrap();
        let history = ramp(15, 100.0, 1.0);
        let query: Vec<Bar> = vec![];
        assert_eq!(engine.scan(&query, &history), Err(EngineError::EmptySeries));
    }

    #[test]
    fn test_scan_finds_ramp_in_zigzag() {
        let mut history = zigzag(40);
        history.extend(ramp(5, 100.0, 1.0).into_iter().map(|b| Bar {
            timestamp: b.timestamp + 40,
            ..b
        }));
        history.extend(zigzag(20));

        let query = history[40..45].to_vec();
        let engine = EngineBuilder::new()
            .similarity_threshold(0.9)
            .look_ahead(3)
            .build()
            .unwrap();
        let matches = engine.scan(&query, &history).unwrap();

        assert_eq!(matches[0].start_index, 40);
        assert_eq!(matches[0].score, 1.0);
        assert_eq!(matches[0].end_index, 44);
        assert_eq!(matches[0].start_timestamp, Some(40));
        assert_eq!(matches[0].future, WindowSpan::new(45, 3));
        assert!(matches[0].outcome.is_some());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let history: Vec<Bar> = (0..300)
            .map(|i| {
                let c = 100.0 + (i as f64 * 0.21).sin() * 4.0 + (i as f64 * 0.05).cos() * 2.0;
                Bar::new(i, c, c * 1.005, c * 0.995, c, 1000.0)
            })
            .collect();
        let query = &history[100..120];

        let sequential = EngineBuilder::new().similarity_threshold(0.5).top_n(50).build().unwrap();
        let parallel = EngineBuilder::new()
            .similarity_threshold(0.5)
            .top_n(50)
            .parallel(true)
            .build()
            .unwrap();

        assert_eq!(
            sequential.scan(query, &history).unwrap(),
            parallel.scan(query, &history).unwrap()
        );
    }

    #[test]
    fn test_scan_excluding_skips_query_window() {
        let history: Vec<Bar> = (0..200)
            .map(|i| {
                let c = 100.0 + (i as f64 * 0.3).sin() * 5.0;
                Bar::new(i, c, c * 1.01, c * 0.99, c, 1000.0)
            })
            .collect();
        let engine = EngineBuilder::new().similarity_threshold(0.5).top_n(200).build().unwrap();
        let query = WindowSpan::new(60, 20);
        let matches = engine.scan_excluding(query, &history).unwrap();
        assert!(matches.iter().all(|m| !m.source.overlaps(&query)));

        let out_of_bounds = WindowSpan::new(195, 20);
        assert!(matches!(
            engine.scan_excluding(out_of_bounds, &history),
            Err(EngineError::InsufficientHistory { .. })
        ));
    }

    #[test]
    fn test_cancel_before_start() {
        let engine = EngineBuilder::new().parallel(true).build().unwrap();
        let history = zigzag(100);
        let cancel = AtomicBool::new(true);
        assert_eq!(
            engine.scan_with_cancel(&history[0..10], &history, &cancel),
            Err(EngineError::Cancelled)
        );
    }

    #[test]
    fn test_cache_reused_between_scans() {
        let cache = Arc::new(ScoreCache::new(10_000));
        let engine = EngineBuilder::new().cache(cache.clone()).build().unwrap();
        let history = zigzag(60);
        let query = ramp(6, 100.0, 1.0);

        let first = engine.scan(&query, &history).unwrap();
        let misses = cache.stats().misses;
        let second = engine.scan(&query, &history).unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.stats().misses, misses);
        assert!(cache.stats().hits > 0);
    }

    fn wave(n: usize, freq: f64) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let c = 100.0 + (i as f64 * freq).sin() * 5.0;
                Bar::new(i as i64, c, c * 1.01, c * 0.99, c, 1000.0)
            })
            .collect()
    }

    #[test]
    fn test_shared_cache_across_histories() {
        let first = wave(200, 0.17);
        let second = wave(200, 0.61);
        let query = first[20..40].to_vec();

        let plain = EngineBuilder::new().similarity_threshold(0.3).top_n(50).build().unwrap();
        let cached = EngineBuilder::new()
            .similarity_threshold(0.3)
            .top_n(50)
            .cache(Arc::new(ScoreCache::new(10_000)))
            .build()
            .unwrap();

        assert_eq!(cached.scan(&query, &first).unwrap(), plain.scan(&query, &first).unwrap());
        assert_eq!(cached.scan(&query, &second).unwrap(), plain.scan(&query, &second).unwrap());
    }

    #[test]
    fn test_huge_look_ahead_scans() {
        let history = wave(100, 0.17);
        let engine = EngineBuilder::new()
            .similarity_threshold(0.9)
            .look_ahead(usize::MAX)
            .build()
            .unwrap();
        let matches = engine.scan(&history[0..10], &history).unwrap();
        assert_eq!(matches[0].start_index, 0);
        assert!(matches.iter().all(|m| m.outcome.is_none()));
        assert!(matches.iter().all(|m| m.future.end() == 100));
    }

    #[test]
    fn test_dtw_engine() {
        let mut history = zigzag(30);
        history.extend(ramp(8, 103.0, 1.0).into_iter().map(|b| Bar {
            timestamp: b.timestamp + 30,
            ..b
        }));
        history.extend(zigzag(10));

        let engine: DtwEngine = EngineBuilder::new()
            .scorer(DtwScorer::default())
            .similarity_threshold(0.9)
            .build()
            .unwrap();
        let query = ramp(8, 10.0, 1.0);
        let matches = engine.scan(&query, &history).unwrap();
        assert_eq!(matches[0].start_index, 30);
        assert!((matches[0].score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_scan_instruments() {
        let engine = EngineBuilder::new().build().unwrap();
        let query = ramp(5, 10.0, 1.0);
        let long = zigzag(50);
        let short = zigzag(6);

        let instruments: Vec<(&str, &[Bar])> = vec![("AAA", long.as_slice()), ("BBB", short.as_slice())];
        let (results, errors) = scan_instruments(&engine, &query, instruments);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].symbol, "AAA");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].symbol, "BBB");
    }
}
