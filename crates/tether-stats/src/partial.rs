//! Partial aggregates stored as tables.
//!
//! A partial table has three columns `{gene_id, mean, variance}` (variance holds
//! M2) and carries the observation count in its schema metadata, so that partials
//! computed near the data can be shipped, realigned and merged elsewhere.

use crate::aggregate::{Aggregate, DeltaMode, Moments};
use crate::error::{AggrError, AggrResult};
use arrow_schema::{Field, Schema};
use std::collections::HashMap;
use std::sync::Arc;
use tether_columnar::{copy_matched_rows, ChunkedColumn, Table};

pub const AGGR_COUNT_KEY: &str = "aggr_count";
pub const AGGR_MODE_KEY: &str = "aggr_mode";

/// Observation count recorded in a partial table's schema metadata.
pub fn aggregate_count(schema: &Schema) -> AggrResult<u64> {
    let raw = schema
        .metadata()
        .get(AGGR_COUNT_KEY)
        .ok_or(AggrError::MissingCount(AGGR_COUNT_KEY))?;
    let count = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| AggrError::InvalidCount(raw.clone()))?;
    if count == 0 {
        return Err(AggrError::InvalidCount(raw.clone()));
    }
    Ok(count)
}

/// Reorder a partial table to `gene_order` and load it as an aggregate. Genes the
/// partial does not cover get zero mean and zero M2.
pub fn align_partial(gene_order: &ChunkedColumn, table: &Table) -> AggrResult<Aggregate> {
    let aligned = copy_matched_rows(gene_order, table)?;
    Aggregate::from_partial_table(&aligned)
}

impl Aggregate {
    /// Export as a partial table keyed by `keys`, one key per aggregated row.
    pub fn to_partial_table(&self, keys: &ChunkedColumn) -> AggrResult<Table> {
        let moments = self.initialized()?;
        if keys.len() != moments.means.len() {
            return Err(AggrError::LengthMismatch {
                expected: moments.means.len(),
                actual: keys.len(),
            });
        }

        let metadata = HashMap::from([
            (AGGR_COUNT_KEY.to_string(), self.count().to_string()),
            (AGGR_MODE_KEY.to_string(), self.mode().as_str().to_string()),
        ]);
        let schema = Schema::new(vec![
            Field::new("gene_id", keys.data_type().clone(), true),
            Field::new("mean", moments.means.data_type().clone(), true),
            Field::new("variance", moments.m2.data_type().clone(), true),
        ])
        .with_metadata(metadata);

        Ok(Table::try_new(
            Arc::new(schema),
            vec![keys.clone(), moments.means.clone(), moments.m2.clone()],
        )?)
    }

    /// Load an aggregate from a partial table. Columns 1 and 2 hold means and M2.
    pub fn from_partial_table(table: &Table) -> AggrResult<Self> {
        let count = aggregate_count(table.schema())?;
        let mode = match table.metadata().get(AGGR_MODE_KEY) {
            None => DeltaMode::Signed,
            Some(raw) => {
                DeltaMode::parse(raw).ok_or_else(|| AggrError::InvalidMode(raw.clone()))?
            }
        };
        let means = table.column(1)?.to_float64()?;
        let m2 = table.column(2)?.to_float64()?;

        log::debug!(
            "loaded partial aggregate: {} rows, count {count}",
            means.len()
        );
        Ok(Self::from_parts(mode, count, Moments { means, m2 }))
    }
}
