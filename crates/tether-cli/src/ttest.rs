use crate::config::ExperimentConfig;
use crate::partial::gene_order;
use anyhow::{Context, Result};
use arrow_schema::{Field, Schema};
use serde::Serialize;
use std::sync::Arc;
use tether_columnar::ipc::write_ipc_stream;
use tether_columnar::{copy_matched_rows, ChunkedColumn, Table};
use tether_stats::{align_partial, Aggregate};
use tether_store::{PartitionSource, ResultSink};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TTestSummary {
    pub result_key: String,
    pub genes: usize,
    pub left_count: u64,
    pub right_count: u64,
}

/// Merge each side's partitions into one aggregate and store the per-gene
/// `{gene_id, t_statistic, p_value}` table under the configured result key.
///
/// With `raw` set, partitions hold expression values and are aggregated here;
/// otherwise they hold partial tables written by `compute_partial`.
pub fn run_ttest<S>(store: &S, config: &ExperimentConfig, raw: bool) -> Result<TTestSummary>
where
    S: PartitionSource + ResultSink,
{
    let ttest = config.ttest()?;
    let genes = gene_order(store, config)?;

    let left = merge_side(store, config, &genes, &ttest.left, raw).context("left group")?;
    let right = merge_side(store, config, &genes, &ttest.right, raw).context("right group")?;

    let stats = left.t_test_with(&right)?;
    let mut fields = vec![Field::new("gene_id", genes.data_type().clone(), true)];
    fields.extend(stats.schema().fields().iter().map(|f| f.as_ref().clone()));
    let mut columns = vec![genes.clone()];
    columns.extend(stats.columns().iter().cloned());
    let result = Table::try_new(Arc::new(Schema::new(fields)), columns)?;

    store.put_key(&ttest.result_key, &write_ipc_stream(&result)?)?;
    log::info!(
        "stored t-test of {} vs {} observations under {}",
        left.count(),
        right.count(),
        ttest.result_key
    );

    Ok(TTestSummary {
        result_key: ttest.result_key.clone(),
        genes: result.num_rows(),
        left_count: left.count(),
        right_count: right.count(),
    })
}

fn merge_side<S: PartitionSource>(
    store: &S,
    config: &ExperimentConfig,
    genes: &ChunkedColumn,
    names: &[String],
    raw: bool,
) -> Result<Aggregate> {
    let mut merged = Aggregate::new();
    for name in names {
        let key = config.store.domain_key(name);
        let table = store
            .map_partition(&key, config.store.queue_depth)
            .with_context(|| format!("read partition {key}"))?;

        let partial = if raw {
            let aligned = copy_matched_rows(genes, &table)?;
            let mut aggr = Aggregate::new();
            aggr.accumulate_all(&aligned)?;
            aggr
        } else {
            align_partial(genes, &table)?
        };
        log::debug!("{key}: {} observations", partial.count());
        merged
            .combine(&partial)
            .with_context(|| format!("merge partition {key}"))?;
    }
    Ok(merged)
}
