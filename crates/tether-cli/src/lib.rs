//! Experiment drivers around the aggregation core.
//!
//! - `aggr`: time Welford aggregation over a table read from an IPC file
//! - `partial`: compute and store the partial aggregate of one partition
//! - `ttest`: merge stored partials per group and store the per-gene t-test

pub mod cli;
mod config;
mod experiment;
mod partial;
mod ttest;

pub use config::{ExperimentConfig, TTestConfig, DEFAULT_ANNOTATION_KEY};
pub use experiment::{aggregate_table, AggrMode, AggrOptions, AggrReport, AggrScope};
pub use partial::{compute_partial, PartialSummary};
pub use ttest::{run_ttest, TTestSummary};
