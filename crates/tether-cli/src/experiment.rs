use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;
use std::time::{Duration, Instant};
use tether_columnar::{concat_tables, Table, TableSlicer};
use tether_stats::{Aggregate, DeltaMode};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum AggrScope {
    /// One aggregation over the whole table.
    Table,
    /// One aggregation per slice of record batches.
    Slices,
}

impl AggrScope {
    fn as_str(self) -> &'static str {
        match self {
            AggrScope::Table => "table",
            AggrScope::Slices => "slices",
        }
    }
}

/// Delta update used by the accumulator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum AggrMode {
    /// Standard Welford update.
    #[default]
    Signed,
    /// Absolute deltas; the running mean only moves up.
    Absolute,
}

impl From<AggrMode> for DeltaMode {
    fn from(mode: AggrMode) -> Self {
        match mode {
            AggrMode::Signed => DeltaMode::Signed,
            AggrMode::Absolute => DeltaMode::Absolute,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AggrOptions {
    pub scope: AggrScope,
    pub mode: DeltaMode,
    /// Record batches per slice.
    pub batch_count: usize,
    /// Exclusive end of the aggregated column range; 0 means all columns.
    pub col_limit: usize,
    /// Re-chunk the table so no batch exceeds this many rows before slicing.
    pub max_batch_rows: Option<usize>,
}

impl Default for AggrOptions {
    fn default() -> Self {
        Self {
            scope: AggrScope::Table,
            mode: DeltaMode::Absolute,
            batch_count: 1,
            col_limit: 0,
            max_batch_rows: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AggrReport {
    pub scope: &'static str,
    pub mode: &'static str,
    pub rows: usize,
    pub columns: usize,
    pub aggregations: usize,
    /// Rows in the first and in the final slice.
    pub slice_rows: Option<(usize, usize)>,
    pub total_ms: f64,
    pub avg_ms: f64,
}

/// Aggregate value columns `[1, col_limit)` of `table`, timing only the aggregation
/// itself. Returns the report and the `{mean, variance}` result (concatenated
/// across slices).
pub fn aggregate_table(table: &Table, options: &AggrOptions) -> Result<(AggrReport, Table)> {
    if table.num_columns() < 2 {
        anyhow::bail!("table needs a key column and at least one value column");
    }

    let mut elapsed = Duration::ZERO;
    let (result, slice_rows, aggregations) = match options.scope {
        AggrScope::Table => {
            let (result, took) = timed_aggregate(table, options)?;
            elapsed += took;
            (result, None, 1)
        }
        AggrScope::Slices => {
            let slicer =
                TableSlicer::with_max_rows(table, options.batch_count, options.max_batch_rows)?;
            let mut results = Vec::new();
            let mut rows = Vec::new();
            for (idx, slice) in slicer.enumerate() {
                let slice = slice?;
                let (result, took) = timed_aggregate(&slice, options)
                    .with_context(|| format!("aggregate slice {idx}"))?;
                elapsed += took;
                rows.push(slice.num_rows());
                results.push(result);
            }
            let (Some(&first), Some(&last)) = (rows.first(), rows.last()) else {
                anyhow::bail!("table has no rows to slice");
            };
            (concat_tables(&results)?, Some((first, last)), results.len())
        }
    };

    let total_ms = elapsed.as_secs_f64() * 1_000.0;
    let report = AggrReport {
        scope: options.scope.as_str(),
        mode: options.mode.as_str(),
        rows: table.num_rows(),
        columns: if options.col_limit > 0 {
            options.col_limit
        } else {
            table.num_columns()
        },
        aggregations,
        slice_rows,
        total_ms,
        avg_ms: total_ms / aggregations as f64,
    };
    log::debug!("{report:?}");
    Ok((report, result))
}

fn timed_aggregate(table: &Table, options: &AggrOptions) -> Result<(Table, Duration)> {
    let start = Instant::now();
    let mut aggr = Aggregate::with_mode(options.mode);
    aggr.accumulate(table, 1, options.col_limit)?;
    let result = aggr.take_result()?;
    Ok((result, start.elapsed()))
}
