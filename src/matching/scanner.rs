//! Sliding-window scan over a full history
//!
//! A [`WindowScan`] walks candidate start positions `0, step, 2·step, ...`
//! while a candidate of the query's length still leaves `min_look_ahead` bars
//! after it. Positions whose candidate or future slice fails the data-quality
//! check are skipped; accepted positions become unranked [`Match`]es.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::trace;

use super::cache::{window_fingerprint, CacheKey, ScoreCache};
use super::helpers::MAX_CLOSE_JUMP;
use super::ranking::compute_outcome;
use crate::{EngineError, Match, Result, SearchConfig, WindowScorer, WindowSpan, OHLCVExt, OHLCV};

/// Lifecycle of a scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanState {
    #[default]
    Idle,
    Scanning,
    Done,
}

// ============================================================
// DATA QUALITY
// ============================================================

/// True if every bar is internally consistent and no close jumps more than 50%.
pub fn is_clean<T: OHLCV>(bars: &[T]) -> bool {
    bars.iter().all(|b| b.validate().is_ok())
        && bars
            .windows(2)
            .all(|w| w[1].return_from(&w[0]).abs() <= MAX_CLOSE_JUMP)
}

// ============================================================
// SCAN CONTEXT
// ============================================================

/// Read-only inputs shared by every position of one scan
pub(crate) struct ScanContext<'a, T: OHLCV, S: WindowScorer> {
    pub scorer: &'a S,
    pub prepared: S::Prepared,
    pub query_len: usize,
    pub query_fingerprint: u64,
    pub history: &'a [T],
    pub config: &'a SearchConfig,
    pub cache: Option<&'a ScoreCache>,
    pub exclude: Option<WindowSpan>,
    pub cancel: Option<&'a AtomicBool>,
}

impl<'a, T: OHLCV, S: WindowScorer> ScanContext<'a, T, S> {
    /// Last valid candidate start, or `None` when no candidate fits.
    pub fn last_start(&self) -> Option<usize> {
        let needed = self.query_len.checked_add(self.config.min_look_ahead.get())?;
        self.history.len().checked_sub(needed)
    }

    /// Every start position the scan visits, in order.
    pub fn positions(&self) -> Vec<usize> {
        match self.last_start() {
            Some(last) => (0..=last).step_by(self.config.step_size.get()).collect(),
            None => Vec::new(),
        }
    }

    pub fn position_count(&self) -> usize {
        self.last_start()
            .map_or(0, |last| last / self.config.step_size.get() + 1)
    }

    /// Cooperative cancellation, checked once per position.
    pub fn check_cancelled(&self) -> Result<()> {
        match self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(EngineError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Score one position. `Ok(None)` means skipped or below threshold.
    pub fn evaluate(&self, start: usize) -> Result<Option<Match>> {
        let span = WindowSpan::new(start, self.query_len);

        if let Some(excluded) = self.exclude {
            if span.overlaps(&excluded) {
                return Ok(None);
            }
        }

        let candidate = &self.history[span.range()];
        let future_end = span
            .end()
            .saturating_add(self.config.look_ahead.get())
            .min(self.history.len());
        let future = &self.history[span.end()..future_end];

        if !is_clean(candidate) || !is_clean(&self.history[span.end() - 1..future_end]) {
            trace!(start, "skipping window that fails data-quality check");
            return Ok(None);
        }

        let score = self.score(candidate)?;
        if score < self.config.similarity_threshold {
            return Ok(None);
        }

        let future_span = WindowSpan::new(span.end(), future.len());
        Ok(Some(Match {
            start_index: span.start,
            end_index: span.end() - 1,
            score,
            source: span,
            future: future_span,
            outcome: compute_outcome(candidate, future, self.config.look_ahead.get()),
            start_timestamp: candidate.first().and_then(|b| b.timestamp()),
            end_timestamp: candidate.last().and_then(|b| b.timestamp()),
        }))
    }

    fn score(&self, candidate: &[T]) -> Result<f64> {
        let Some(cache) = self.cache else {
            return self.scorer.score_prepared(&self.prepared, candidate);
        };

        let key = CacheKey {
            query: self.query_fingerprint,
            candidate: window_fingerprint(candidate),
            scorer: self.scorer.id(),
        };
        if let Some(score) = cache.get(&key) {
            return Ok(score);
        }
        let score = self.scorer.score_prepared(&self.prepared, candidate)?;
        cache.insert(key, score);
        Ok(score)
    }
}

// ============================================================
// SEQUENTIAL ITERATOR
// ============================================================

/// Iterator over accepted (unranked) matches, in position order
pub struct WindowScan<'a, T: OHLCV, S: WindowScorer> {
    ctx: ScanContext<'a, T, S>,
    next_start: usize,
    last_start: Option<usize>,
    state: ScanState,
    visited: usize,
}

impl<'a, T: OHLCV, S: WindowScorer> WindowScan<'a, T, S> {
    pub(crate) fn new(ctx: ScanContext<'a, T, S>) -> Self {
        let last_start = ctx.last_start();
        Self {
            ctx,
            next_start: 0,
            last_start,
            state: ScanState::Idle,
            visited: 0,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Number of positions evaluated so far
    pub fn visited(&self) -> usize {
        self.visited
    }
}

impl<'a, T: OHLCV, S: WindowScorer> Iterator for WindowScan<'a, T, S> {
    type Item = Result<Match>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == ScanState::Done {
            return None;
        }
        self.state = ScanState::Scanning;

        while let Some(last) = self.last_start {
            if self.next_start > last {
                break;
            }
            let start = self.next_start;
            self.next_start = self.next_start.saturating_add(self.ctx.config.step_size.get());
            self.visited += 1;

            match self.ctx.check_cancelled().and_then(|_| self.ctx.evaluate(start)) {
                Ok(Some(m)) => return Some(Ok(m)),
                Ok(None) => continue,
                Err(e) => {
                    self.state = ScanState::Done;
                    return Some(Err(e));
                }
            }
        }

        self.state = ScanState::Done;
        None
    }
}

/// Build the read-only context for a scan; `query` must be non-empty.
pub(crate) fn context<'a, T: OHLCV, S: WindowScorer>(
    scorer: &'a S,
    query: &[T],
    history: &'a [T],
    config: &'a SearchConfig,
    cache: Option<&'a ScoreCache>,
) -> Result<ScanContext<'a, T, S>> {
    Ok(ScanContext {
        scorer,
        prepared: scorer.prepare(query)?,
        query_len: query.len(),
        query_fingerprint: cache.map(|_| window_fingerprint(query)).unwrap_or_default(),
        history,
        config,
        cache,
        exclude: None,
        cancel: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bar;

    fn bar(c: f64) -> Bar {
        Bar::new(0, c, c * 1.01, c * 0.99, c, 100.0)
    }

    #[test]
    fn test_clean_bars() {
        let bars = vec![bar(100.0), bar(110.0), bar(105.0)];
        assert!(is_clean(&bars));
    }

    #[test]
    fn test_close_jump_rejected() {
        let bars = vec![bar(100.0), bar(151.0)];
        assert!(!is_clean(&bars));
        let bars = vec![bar(100.0), bar(149.0)];
        assert!(is_clean(&bars));
    }

    #[test]
    fn test_inconsistent_bars_rejected() {
        // close above high
        assert!(!is_clean(&[Bar::new(0, 10.0, 11.0, 9.0, 12.0, 0.0)]));
        // open below low
        assert!(!is_clean(&[Bar::new(0, 8.0, 11.0, 9.0, 10.0, 0.0)]));
        // high < low
        assert!(!is_clean(&[Bar::new(0, 10.0, 9.0, 11.0, 10.0, 0.0)]));
        // non-positive price
        assert!(!is_clean(&[Bar::new(0, 0.0, 1.0, 0.0, 0.5, 0.0)]));
    }

    #[test]
    fn test_state_machine() {
        let history: Vec<Bar> = (0..30).map(|i| bar(100.0 + i as f64)).collect();
        let query = &history[0..5];
        let scorer = crate::SimilarityScorer::default();
        let config = SearchConfig::default();
        let ctx = context(&scorer, query, &history, &config, None).unwrap();
        assert_eq!(ctx.positions().len(), 30 - 5 - 1 + 1);
        assert_eq!(ctx.position_count(), ctx.positions().len());

        let mut scan = WindowScan::new(ctx);
        assert_eq!(scan.state(), ScanState::Idle);
        let first = scan.next();
        assert!(first.is_some());
        assert_eq!(scan.state(), ScanState::Scanning);
        let rest: Vec<_> = scan.by_ref().collect();
        assert!(!rest.is_empty());
        assert_eq!(scan.state(), ScanState::Done);
        assert_eq!(scan.visited(), 25);
        assert!(scan.next().is_none());
    }

    #[test]
    fn test_cancel_flag_stops_scan() {
        let history: Vec<Bar> = (0..30).map(|i| bar(100.0 + i as f64)).collect();
        let scorer = crate::SimilarityScorer::default();
        let config = SearchConfig::default();
        let cancel = AtomicBool::new(true);
        let mut ctx = context(&scorer, &history[0..5], &history, &config, None).unwrap();
        ctx.cancel = Some(&cancel);

        let mut scan = WindowScan::new(ctx);
        assert!(matches!(scan.next(), Some(Err(EngineError::Cancelled))));
        assert_eq!(scan.state(), ScanState::Done);
        assert!(scan.next().is_none());
    }

    #[test]
    fn test_excluded_span_skipped() {
        let history: Vec<Bar> = (0..30).map(|i| bar(100.0 + i as f64)).collect();
        let scorer = crate::SimilarityScorer::default();
        let config = SearchConfig::default();
        let mut ctx = context(&scorer, &history[10..15], &history, &config, None).unwrap();
        ctx.exclude = Some(WindowSpan::new(10, 5));

        for start in 6..15 {
            assert!(ctx.evaluate(start).unwrap().is_none());
        }
    }

    #[test]
    fn test_huge_horizons_do_not_overflow() {
        let history: Vec<Bar> = (0..30).map(|i| bar(100.0 + i as f64)).collect();
        let scorer = crate::SimilarityScorer::default();

        let config = SearchConfig {
            look_ahead: crate::Period::new_const(usize::MAX),
            ..SearchConfig::default()
        };
        let ctx = context(&scorer, &history[0..5], &history, &config, None).unwrap();
        let first = ctx.evaluate(0).unwrap().unwrap();
        assert_eq!(first.future, WindowSpan::new(5, 25));
        assert_eq!(first.outcome, None);

        let config = SearchConfig {
            look_ahead: crate::Period::new_const(usize::MAX),
            min_look_ahead: crate::Period::new_const(usize::MAX),
            ..SearchConfig::default()
        };
        let ctx = context(&scorer, &history[0..5], &history, &config, None).unwrap();
        assert_eq!(ctx.last_start(), None);
        assert_eq!(WindowScan::new(ctx).count(), 0);

        let config = SearchConfig {
            step_size: crate::Period::new_const(usize::MAX),
            ..SearchConfig::default()
        };
        let ctx = context(&scorer, &history[0..5], &history, &config, None).unwrap();
        let mut scan = WindowScan::new(ctx);
        assert_eq!(scan.by_ref().count(), 1);
        assert_eq!(scan.visited(), 1);
    }
}
