use arrow_schema::{DataType, Field, Schema};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use tether_columnar::{ChunkedColumn, Table};
use tether_stats::{Aggregate, DeltaMode};

fn bench_rows() -> usize {
    std::env::var("TETHER_ACCUMULATE_BENCH_ROWS")
        .ok()
        .and_then(|v| v.replace('_', "").parse::<usize>().ok())
        .filter(|&v| (1_000..=2_000_000).contains(&v))
        .unwrap_or(20_000)
}

/// Gene-by-cell expression table: one key column and `cells` value columns.
fn expression_table(rows: usize, cells: usize) -> Table {
    let mut fields = vec![Field::new("gene_id", DataType::Utf8, false)];
    let ids: Vec<String> = (0..rows).map(|i| format!("ENSG{i:011}")).collect();
    let mut columns = vec![ChunkedColumn::from_strs(&ids)];
    for cell in 0..cells {
        fields.push(Field::new(format!("cell_{cell}"), DataType::Float64, true));
        columns.push(ChunkedColumn::from_f64(
            (0..rows)
                .map(|row| ((row * 31 + cell * 17) % 97) as f64 / 7.0)
                .collect(),
        ));
    }
    Table::try_new(Arc::new(Schema::new(fields)), columns).unwrap()
}

fn bench_accumulate(c: &mut Criterion) {
    let rows = bench_rows();
    let mut group = c.benchmark_group("accumulate");
    group.sample_size(20);

    for cells in [8usize, 64] {
        let table = expression_table(rows, cells);
        group.throughput(Throughput::Elements((rows * cells) as u64));
        for mode in [DeltaMode::Signed, DeltaMode::Absolute] {
            group.bench_with_input(
                BenchmarkId::new(mode.as_str(), cells),
                &table,
                |b, table| {
                    b.iter(|| {
                        let mut aggr = Aggregate::with_mode(mode);
                        aggr.accumulate_all(black_box(table)).unwrap();
                        black_box(aggr.count())
                    })
                },
            );
        }
    }
    group.finish();
}

fn bench_combine(c: &mut Criterion) {
    let rows = bench_rows();
    let mut left = Aggregate::new();
    left.accumulate_all(&expression_table(rows, 16)).unwrap();
    let mut right = Aggregate::new();
    right.accumulate_all(&expression_table(rows, 16)).unwrap();

    c.bench_function("combine", |b| {
        b.iter(|| {
            let mut merged = left.clone();
            merged.combine(black_box(&right)).unwrap();
            black_box(merged.count())
        })
    });
}

criterion_group!(benches, bench_accumulate, bench_combine);
criterion_main!(benches);
