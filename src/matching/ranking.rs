//! Ranking, forward outcomes and match statistics

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::distance::similarity_from_distance;
use super::helpers::round2;
use super::similarity::DtwScorer;
use crate::{EngineError, Match, Result, WindowScorer, OHLCV};

/// Realized percent move from the candidate's last close to the last close of
/// the future window, rounded to 2 decimals. `None` when fewer than
/// `look_ahead` future bars exist.
pub fn compute_outcome<T: OHLCV>(candidate: &[T], future: &[T], look_ahead: usize) -> Option<f64> {
    if look_ahead == 0 || future.len() < look_ahead {
        return None;
    }
    let base = candidate.last()?.close();
    let exit = future.get(look_ahead - 1)?.close();
    if base <= 0.0 {
        return None;
    }
    Some(round2((exit - base) / base * 100.0))
}

/// Score descending, ties by start index ascending.
#[inline]
pub fn match_order(a: &Match, b: &Match) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.start_index.cmp(&b.start_index))
}

/// Sort and keep the best `top_n`.
pub fn rank(mut matches: Vec<Match>, top_n: usize) -> Vec<Match> {
    matches.sort_by(match_order);
    matches.truncate(top_n);
    matches
}

/// Replace the scores of a shortlist with DTW similarity and re-rank it.
///
/// The query is compared against each match's source window in `history`.
pub fn rerank_with_dtw<T: OHLCV>(
    query: &[T],
    history: &[T],
    matches: &[Match],
    scorer: &DtwScorer,
) -> Result<Vec<Match>> {
    let prepared = scorer.prepare(query)?;

    let mut reranked = matches
        .iter()
        .map(|m| {
            let window = history
                .get(m.source.range())
                .ok_or(EngineError::InsufficientHistory {
                    need: m.source.end(),
                    got: history.len(),
                })?;
            let distance = scorer.distance(&prepared, window)?;
            Ok(Match {
                score: similarity_from_distance(distance),
                ..*m
            })
        })
        .collect::<Result<Vec<_>>>()?;

    reranked.sort_by(match_order);
    Ok(reranked)
}

/// Aggregate view of a ranked match list
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub count: usize,
    pub mean_score: f64,
    /// Matches with a full look-ahead window
    pub with_outcome: usize,
    pub mean_outcome: Option<f64>,
    pub median_outcome: Option<f64>,
    /// Share of resolved outcomes that were positive, 0..=1
    pub positive_ratio: Option<f64>,
}

impl MatchSummary {
    pub fn from_matches(matches: &[Match]) -> Self {
        if matches.is_empty() {
            return Self::default();
        }

        let mean_score = matches.iter().map(|m| m.score).sum::<f64>() / matches.len() as f64;
        let mut outcomes: Vec<f64> = matches.iter().filter_map(|m| m.outcome).collect();

        if outcomes.is_empty() {
            return Self {
                count: matches.len(),
                mean_score,
                ..Self::default()
            };
        }

        outcomes.sort_by(f64::total_cmp);
        let n = outcomes.len();
        let median = if n % 2 == 0 {
            (outcomes[n / 2 - 1] + outcomes[n / 2]) / 2.0
        } else {
            outcomes[n / 2]
        };
        let positives = outcomes.iter().filter(|o| **o > 0.0).count();

        Self {
            count: matches.len(),
            mean_score,
            with_outcome: n,
            mean_outcome: Some(round2(outcomes.iter().sum::<f64>() / n as f64)),
            median_outcome: Some(round2(median)),
            positive_ratio: Some(positives as f64 / n as f64),
        }
    }
}
