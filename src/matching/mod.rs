//! Window matching pipeline
//!
//! Leaf-first:
//!
//! - **normalize**: price-free window representations (min-max, returns, cumulative)
//! - **distance**: DTW distance and the `1 / (1 + d)` similarity mapping
//! - **features**: volatility, trend, volume and indicator descriptors
//! - **similarity**: the weighted multi-signal scorer and the DTW scorer
//! - **scanner**: sliding-window scan with data-quality filtering
//! - **ranking**: ordering, top-N, forward outcomes, DTW re-ranking, summaries
//! - **cache**: optional bounded score side-table

pub mod helpers;

pub mod cache;
pub mod distance;
pub mod features;
pub mod normalize;
pub mod ranking;
pub mod scanner;
pub mod similarity;

pub use cache::*;
pub use distance::*;
pub use features::*;
pub use normalize::*;
pub use ranking::*;
pub use scanner::{is_clean, ScanState, WindowScan};
pub use similarity::*;
