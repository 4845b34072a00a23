//! Parameter metadata for search configuration
//!
//! This module describes the tunable search parameters, enabling:
//! - Grid search over thresholds and horizons
//! - Building configs from loosely-typed key/value maps
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use yapmatch::params::ParameterizedConfig;
//! use yapmatch::SearchConfig;
//!
//! for param in SearchConfig::param_meta() {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//!
//! let mut params = HashMap::new();
//! params.insert("similarity_threshold", 0.9);
//! let config = SearchConfig::with_params(&params).unwrap();
//! assert_eq!(config.similarity_threshold, 0.9);
//! ```

use std::collections::HashMap;

use crate::{EngineError, Period, Ratio, Result, SearchConfig};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Ratio value in 0.0..=1.0
  Ratio,
  /// Period value (positive integer)
  Period,
}

/// Metadata for a single search parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "look_ahead")
  pub name: &'static str,
  /// Parameter type (Ratio or Period)
  pub param_type: ParamType,
  /// Default value
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  /// Human-readable description
  pub description: &'static str,
}

impl ParamMeta {
  /// Create a new ParamMeta for a Ratio parameter
  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range, description }
  }

  /// Create a new ParamMeta for a Period parameter
  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default, range, description }
  }

  /// Generate all values for grid search
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    if step <= 0.0 {
      return vec![min];
    }
    let count = ((max - min) / step + 1e-9).floor() as usize + 1;
    (0..count)
      .map(|i| ((min + step * i as f64) * 1e10).round() / 1e10)
      .collect()
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value.is_nan() || value < min || value > max {
      return Err(EngineError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Ratio => Ratio::new(value).map(|_| ()),
      ParamType::Period => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(EngineError::InvalidValue("Period must be a positive integer"));
        }
        Ok(())
      },
    }
  }
}

// ============================================================
// PARAMETERIZED CONFIG TRAIT
// ============================================================

/// Trait for configs that can be described and rebuilt from key/value maps
pub trait ParameterizedConfig: Sized {
  /// Returns metadata for all configurable parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Creates a config from a HashMap
  ///
  /// Missing parameters use their default values.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;

  /// Every valid combination of the named parameters' grids; other
  /// parameters stay at their defaults. Unknown names are ignored.
  fn param_grid(names: &[&str]) -> Vec<Self> {
    let axes: Vec<(&'static str, Vec<f64>)> = Self::param_meta()
      .iter()
      .filter(|m| names.contains(&m.name))
      .map(|m| (m.name, m.generate_grid()))
      .collect();

    let mut combos: Vec<HashMap<&str, f64>> = vec![HashMap::new()];
    for (name, values) in &axes {
      combos = combos
        .into_iter()
        .flat_map(|combo| {
          values.iter().map(move |&v| {
            let mut next = combo.clone();
            next.insert(*name, v);
            next
          })
        })
        .collect();
    }

    combos.iter().filter_map(|combo| Self::with_params(combo).ok()).collect()
  }
}

const SEARCH_PARAMS: &[ParamMeta] = &[
  ParamMeta::ratio(
    "similarity_threshold",
    0.75,
    (0.5, 1.0, 0.05),
    "Minimum score for a window to count as a match",
  ),
  ParamMeta::period("step_size", 1.0, (1.0, 10.0, 1.0), "Bars between candidate starts"),
  ParamMeta::period("look_ahead", 20.0, (5.0, 60.0, 5.0), "Bars used for the forward outcome"),
  ParamMeta::period(
    "min_look_ahead",
    1.0,
    (1.0, 20.0, 1.0),
    "Bars a candidate must leave after itself to be scanned",
  ),
  ParamMeta::period("top_n", 10.0, (1.0, 50.0, 1.0), "Number of ranked matches returned"),
];

impl ParameterizedConfig for SearchConfig {
  fn param_meta() -> &'static [ParamMeta] {
    SEARCH_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    let defaults = SearchConfig::default();
    for meta in SEARCH_PARAMS {
      if let Some(&value) = params.get(meta.name) {
        meta.validate(value)?;
      }
    }

    let config = SearchConfig {
      similarity_threshold: get_threshold(params, "similarity_threshold", defaults.similarity_threshold)?,
      step_size: get_period(params, "step_size", defaults.step_size.get())?,
      look_ahead: get_period(params, "look_ahead", defaults.look_ahead.get())?,
      min_look_ahead: get_period(params, "min_look_ahead", defaults.min_look_ahead.get())?,
      top_n: get_period(params, "top_n", defaults.top_n.get())?,
    };
    config.validate()?;
    Ok(config)
  }
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Helper to get a Ratio from params with default fallback
pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
  let value = params.get(key).copied().unwrap_or(default);
  Ratio::new(value)
}

/// Helper to get a similarity threshold in (0, 1] with default fallback
pub fn get_threshold(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<f64> {
  let value = get_ratio(params, key, default)?.get();
  if value == 0.0 {
    return Err(EngineError::InvalidValue("threshold must be > 0"));
  }
  Ok(value)
}

/// Helper to get a Period from params with default fallback
pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  if !value.is_finite() || value < 1.0 || value.fract() != 0.0 {
    return Err(EngineError::InvalidValue("Period must be a positive integer"));
  }
  Period::new(value as usize)
}

// ============================================================
// TESTS
// ============================================================
