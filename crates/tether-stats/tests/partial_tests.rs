use arrow_schema::{DataType, Field, Schema};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::Arc;
use tether_columnar::{ChunkedColumn, Table};
use tether_stats::{
    aggregate_count, align_partial, AggrError, Aggregate, DeltaMode, AGGR_COUNT_KEY, AGGR_MODE_KEY,
};

fn accumulated(mode: DeltaMode, genes: &[&str], columns: &[Vec<f64>]) -> Aggregate {
    let mut fields = vec![Field::new("gene_id", DataType::Utf8, false)];
    let mut data = vec![ChunkedColumn::from_strs(genes)];
    for (i, c) in columns.iter().enumerate() {
        fields.push(Field::new(format!("cell_{i}"), DataType::Float64, true));
        data.push(ChunkedColumn::from_f64(c.clone()));
    }
    let table = Table::try_new(Arc::new(Schema::new(fields)), data).unwrap();
    let mut aggr = Aggregate::with_mode(mode);
    aggr.accumulate_all(&table).unwrap();
    aggr
}

#[test]
fn partial_table_round_trip() {
    let genes = ["g1", "g2"];
    let aggr = accumulated(
        DeltaMode::Absolute,
        &genes,
        &[vec![1.0, 2.0], vec![3.0, 5.0], vec![2.0, 2.0]],
    );

    let partial = aggr.to_partial_table(&ChunkedColumn::from_strs(&genes)).unwrap();
    assert_eq!(partial.column_names(), vec!["gene_id", "mean", "variance"]);
    assert_eq!(
        partial.metadata().get(AGGR_COUNT_KEY).map(String::as_str),
        Some("3")
    );
    assert_eq!(
        partial.metadata().get(AGGR_MODE_KEY).map(String::as_str),
        Some("absolute")
    );
    assert_eq!(aggregate_count(partial.schema()).unwrap(), 3);

    let restored = Aggregate::from_partial_table(&partial).unwrap();
    assert_eq!(restored, aggr);
}

#[test]
fn partials_without_mode_default_to_signed() {
    let schema = Schema::new(vec![
        Field::new("gene_id", DataType::Utf8, false),
        Field::new("mean", DataType::Float64, true),
        Field::new("variance", DataType::Float64, true),
    ])
    .with_metadata(HashMap::from([(AGGR_COUNT_KEY.to_string(), "4".to_string())]));
    let table = Table::try_new(
        Arc::new(schema),
        vec![
            ChunkedColumn::from_strs(&["g1"]),
            ChunkedColumn::from_f64(vec![1.5]),
            ChunkedColumn::from_f64(vec![0.5]),
        ],
    )
    .unwrap();

    let aggr = Aggregate::from_partial_table(&table).unwrap();
    assert_eq!(aggr.mode(), DeltaMode::Signed);
    assert_eq!(aggr.count(), 4);
    assert_eq!(aggr.len(), 1);
}

#[test]
fn align_partial_fills_missing_genes_and_merges() {
    let gene_order = ChunkedColumn::from_strs(&["g1", "g2", "g3"]);

    let left = accumulated(DeltaMode::Signed, &["g3", "g1"], &[vec![3.0, 1.0], vec![5.0, 1.0]]);
    let partial = left
        .to_partial_table(&ChunkedColumn::from_strs(&["g3", "g1"]))
        .unwrap();

    let aligned = align_partial(&gene_order, &partial).unwrap();
    assert_eq!(aligned.count(), 2);
    assert_eq!(
        aligned.means().unwrap().to_f64_vec().unwrap(),
        vec![Some(1.0), Some(0.0), Some(4.0)]
    );
    assert_eq!(
        aligned.variances().unwrap().to_f64_vec().unwrap(),
        vec![Some(0.0), Some(0.0), Some(2.0)]
    );

    let right = accumulated(
        DeltaMode::Signed,
        &["g1", "g2", "g3"],
        &[vec![1.0, 2.0, 4.0], vec![1.0, 2.0, 4.0]],
    );
    let mut merged = aligned.clone();
    merged.combine(&right).unwrap();
    assert_eq!(merged.count(), 4);
    assert_eq!(
        merged.means().unwrap().to_f64_vec().unwrap(),
        vec![Some(1.0), Some(1.0), Some(4.0)]
    );
}

#[test]
fn partial_table_errors() {
    let aggr = accumulated(DeltaMode::Signed, &["g1"], &[vec![1.0]]);
    assert!(matches!(
        aggr.to_partial_table(&ChunkedColumn::from_strs(&["g1", "g2"])),
        Err(AggrError::LengthMismatch { expected: 1, actual: 2 })
    ));
    assert!(matches!(
        Aggregate::new().to_partial_table(&ChunkedColumn::from_strs(&["g1"])),
        Err(AggrError::Uninitialized)
    ));

    let mut partial = aggr
        .to_partial_table(&ChunkedColumn::from_strs(&["g1"]))
        .unwrap();
    let mut metadata = partial.metadata().clone();
    metadata.insert(AGGR_MODE_KEY.to_string(), "sideways".to_string());
    partial = partial.with_metadata(metadata);
    assert!(matches!(
        Aggregate::from_partial_table(&partial),
        Err(AggrError::InvalidMode(_))
    ));

    let stripped = partial.with_metadata(HashMap::new());
    assert!(matches!(
        Aggregate::from_partial_table(&stripped),
        Err(AggrError::MissingCount(_))
    ));
}
