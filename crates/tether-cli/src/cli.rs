use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tether_columnar::ipc::read_ipc_file;
use tether_store::LocalPartitionStore;

use crate::{
    aggregate_table, compute_partial, run_ttest, AggrMode, AggrOptions, AggrReport, AggrScope,
    ExperimentConfig,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(
    name = "tether",
    about = "Streaming mean/variance aggregation and t-tests over Arrow partitions."
)]
pub struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Time aggregation over a table read from an Arrow IPC file.
    Aggr(AggrArgs),
    /// Compute the partial aggregate of one partition and store it.
    Partial(PartialArgs),
    /// Merge partial aggregates per group and store the per-gene t-test.
    Ttest(TTestArgs),
}

#[derive(ClapArgs)]
struct AggrArgs {
    /// Arrow IPC file whose first column holds row keys.
    file: PathBuf,

    /// Aggregate the whole table at once or slice by slice.
    #[arg(long, value_enum, default_value_t = AggrScope::Table)]
    scope: AggrScope,

    /// Delta update used by the accumulator.
    #[arg(long, value_enum, default_value_t = AggrMode::Absolute)]
    mode: AggrMode,

    /// Record batches per slice (with `--scope slices`).
    #[arg(long, default_value_t = 1)]
    batch_count: usize,

    /// Exclusive end of the aggregated column range (default: all columns).
    #[arg(long, default_value_t = 0)]
    col_limit: usize,

    /// Split record batches longer than this many rows before slicing.
    #[arg(long)]
    max_batch_rows: Option<usize>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(ClapArgs)]
struct PartialArgs {
    /// Experiment config (JSON).
    #[arg(long, value_name = "PATH")]
    config: PathBuf,

    /// Partition to aggregate, relative to the store domain.
    #[arg(long)]
    key: String,

    /// Key the partial table is stored under.
    #[arg(long)]
    out: String,

    /// Delta update used by the accumulator. Partials merged for a t-test must use
    /// `signed`.
    #[arg(long, value_enum, default_value_t = AggrMode::Signed)]
    mode: AggrMode,
}

#[derive(ClapArgs)]
struct TTestArgs {
    /// Experiment config (JSON) with a `ttest` section.
    #[arg(long, value_name = "PATH")]
    config: PathBuf,

    /// Partitions hold raw expression values instead of partial aggregates.
    #[arg(long)]
    raw: bool,
}

pub fn run() -> Result<()> {
    run_with_args(Args::parse())
}

pub fn run_with_args(args: Args) -> Result<()> {
    match args.command {
        Command::Aggr(args) => run_aggr(args),
        Command::Partial(args) => {
            let config = ExperimentConfig::from_path(&args.config)?;
            let store = LocalPartitionStore::open(config.store.clone())?;
            let summary =
                compute_partial(&store, &config, &args.key, &args.out, args.mode.into())?;
            store.log_stats();
            print_json(&summary)
        }
        Command::Ttest(args) => {
            let config = ExperimentConfig::from_path(&args.config)?;
            let store = LocalPartitionStore::open(config.store.clone())?;
            let summary = run_ttest(&store, &config, args.raw)?;
            store.log_stats();
            print_json(&summary)
        }
    }
}

fn run_aggr(args: AggrArgs) -> Result<()> {
    let table = read_ipc_file(&args.file)
        .with_context(|| format!("read {}", args.file.display()))?;
    let options = AggrOptions {
        scope: args.scope,
        mode: args.mode.into(),
        batch_count: args.batch_count,
        col_limit: args.col_limit,
        max_batch_rows: args.max_batch_rows,
    };
    let (report, _result) = aggregate_table(&table, &options)?;

    match args.format {
        OutputFormat::Text => write_stdout(render_text(&report).as_bytes()),
        OutputFormat::Json => print_json(&report),
    }
}

fn render_text(report: &AggrReport) -> String {
    let mut out = format!(
        "Table dimensions [{}, {}]\nAggregating over [{}] ({} aggregations, {} deltas)\n",
        report.rows, report.columns, report.scope, report.aggregations, report.mode
    );
    if let Some((first, last)) = report.slice_rows {
        out.push_str(&format!("Slice rows [{first}], final slice [{last}]\n"));
    }
    out.push_str(&format!(
        "Aggr Time:\n\tTotal: {:.3}ms\n\tAvg  : {:.3}ms\n",
        report.total_ms, report.avg_ms
    ));
    out
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut bytes = serde_json::to_vec(value)?;
    bytes.push(b'\n');
    write_stdout(&bytes)
}

/// Write to stdout, treating a closed pipe (e.g. `tether ... | head`) as success.
fn write_stdout(bytes: &[u8]) -> Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    match handle.write_all(bytes).and_then(|()| handle.flush()) {
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        other => Ok(other?),
    }
}
