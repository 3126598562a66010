//! One-pass mean/variance aggregation over streams of table columns.
//!
//! An [`Aggregate`] folds whole columns into running per-row statistics using
//! Welford's algorithm. Every column is one more observation for every row at once.
//! Aggregates built over disjoint column sets can be merged with
//! [`Aggregate::combine`], persisted as partial tables and compared with a
//! two-sample t-statistic.

#![forbid(unsafe_code)]

mod aggregate;
mod error;
mod partial;
mod ttest;

pub use crate::aggregate::{Aggregate, CountRatio, DeltaMode};
pub use crate::error::{AggrError, AggrResult};
pub use crate::partial::{aggregate_count, align_partial, AGGR_COUNT_KEY, AGGR_MODE_KEY};
