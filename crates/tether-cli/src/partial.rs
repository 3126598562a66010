use crate::config::ExperimentConfig;
use anyhow::{Context, Result};
use serde::Serialize;
use tether_columnar::ipc::write_ipc_stream;
use tether_columnar::{copy_matched_rows, ChunkedColumn};
use tether_stats::{Aggregate, DeltaMode};
use tether_store::{PartitionSource, ResultSink};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialSummary {
    pub key: String,
    pub out: String,
    pub genes: usize,
    pub count: u64,
    pub mode: &'static str,
}

/// Canonical gene order: the first column of the annotation partition.
pub(crate) fn gene_order<S: PartitionSource>(
    store: &S,
    config: &ExperimentConfig,
) -> Result<ChunkedColumn> {
    let annotations = store
        .get_partition(&config.annotation_key)
        .with_context(|| format!("read gene annotations {}", config.annotation_key))?;
    Ok(annotations.column(0)?.clone())
}

/// Aggregate every value column of partition `name` (resolved under the store
/// domain), align the result to the canonical gene order and store it as a
/// partial table under `out`. The delta mode is recorded in the table metadata.
pub fn compute_partial<S>(
    store: &S,
    config: &ExperimentConfig,
    name: &str,
    out: &str,
    mode: DeltaMode,
) -> Result<PartialSummary>
where
    S: PartitionSource + ResultSink,
{
    let genes = gene_order(store, config)?;
    let key = config.store.domain_key(name);

    let data = store
        .map_partition(&key, config.store.queue_depth)
        .with_context(|| format!("read partition {key}"))?;
    let mut aggr = Aggregate::with_mode(mode);
    aggr.accumulate_all(&data)
        .with_context(|| format!("aggregate partition {key}"))?;

    let partial = aggr.to_partial_table(data.column(0)?)?;
    let aligned = copy_matched_rows(&genes, &partial)?;
    store.put_key(out, &write_ipc_stream(&aligned)?)?;

    log::info!(
        "stored partial aggregate of {key} ({} observations) under {out}",
        aggr.count()
    );
    Ok(PartialSummary {
        key,
        out: out.to_string(),
        genes: aligned.num_rows(),
        count: aggr.count(),
        mode: mode.as_str(),
    })
}
