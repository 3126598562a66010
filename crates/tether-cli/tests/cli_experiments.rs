use arrow_array::{ArrayRef, Float64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use tether_columnar::ipc::{read_ipc_bytes, write_ipc_file};
use tether_columnar::Table;

fn expression_schema(cells: usize) -> SchemaRef {
    let mut fields = vec![Field::new("gene_id", DataType::Utf8, false)];
    fields.extend((0..cells).map(|c| Field::new(format!("cell_{c}"), DataType::Float64, true)));
    Arc::new(Schema::new(fields))
}

/// Expression table with `batches` record batches of `rows_per_batch` rows each.
fn expression_table(genes: &[&str], cells: &[Vec<f64>], batches: usize) -> Table {
    let schema = expression_schema(cells.len());
    let rows_per_batch = genes.len() / batches;
    let batches: Vec<RecordBatch> = (0..batches)
        .map(|b| {
            let range = b * rows_per_batch..(b + 1) * rows_per_batch;
            let mut columns: Vec<ArrayRef> =
                vec![Arc::new(StringArray::from(genes[range.clone()].to_vec()))];
            columns.extend(
                cells
                    .iter()
                    .map(|c| Arc::new(Float64Array::from(c[range.clone()].to_vec())) as ArrayRef),
            );
            RecordBatch::try_new(schema.clone(), columns).unwrap()
        })
        .collect();
    Table::from_batches(schema, &batches).unwrap()
}

/// Tables stored through `put_key` are IPC streams.
fn read_stored(path: impl AsRef<Path>) -> Table {
    read_ipc_bytes(&std::fs::read(path).unwrap()).unwrap()
}

fn tether() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("tether"))
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "tether failed\nstderr:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("json on stdout")
}

#[test]
fn aggr_reports_table_and_slice_runs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("expression.arrow");
    let genes = ["g0", "g1", "g2", "g3", "g4", "g5"];
    let cells = vec![vec![1.0; 6], vec![2.0; 6], vec![3.0; 6]];
    write_ipc_file(&expression_table(&genes, &cells, 3), &path).unwrap();

    let whole = stdout_json(
        &tether()
            .args(["aggr", "--format", "json"])
            .arg(&path)
            .output()
            .unwrap(),
    );
    assert_eq!(whole["scope"], "table");
    assert_eq!(whole["rows"], 6);
    assert_eq!(whole["columns"], 4);
    assert_eq!(whole["aggregations"], 1);
    assert_eq!(whole["mode"], "absolute");

    let sliced = stdout_json(
        &tether()
            .args(["aggr", "--scope", "slices", "--batch-count", "2", "--format", "json"])
            .arg(&path)
            .output()
            .unwrap(),
    );
    assert_eq!(sliced["aggregations"], 2);
    assert_eq!(sliced["slice_rows"], serde_json::json!([4, 2]));
}

#[test]
fn aggr_text_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("expression.arrow");
    write_ipc_file(
        &expression_table(&["g0", "g1"], &[vec![1.0, 2.0], vec![3.0, 4.0]], 1),
        &path,
    )
    .unwrap();

    let output = tether().arg("aggr").arg(&path).output().unwrap();
    assert!(output.status.success());
    let text = String::from_utf8(output.stdout).unwrap();
    assert!(text.contains("Table dimensions [2, 3]"), "{text}");
    assert!(text.contains("Aggr Time:"), "{text}");
}

#[test]
fn aggr_does_not_fail_on_broken_pipe() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("expression.arrow");
    write_ipc_file(&expression_table(&["g0"], &[vec![1.0]], 1), &path).unwrap();

    let mut child = tether()
        .args(["aggr", "--format", "json"])
        .arg(&path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn tether");

    // Closing the read end forces stdout writes to return EPIPE / BrokenPipe.
    drop(child.stdout.take());

    let output = child.wait_with_output().expect("wait for tether to finish");
    assert!(
        output.status.success(),
        "expected success even when stdout is closed\nstderr:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn missing_input_exits_with_one() {
    let dir = tempfile::tempdir().unwrap();
    let output = tether()
        .arg("aggr")
        .arg(dir.path().join("missing.arrow"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("error:"));
}

fn write_store(root: &Path) {
    let genes = ["g1", "g2", "g3"];
    std::fs::create_dir_all(root.join("annotations")).unwrap();
    write_ipc_file(
        &expression_table(&genes, &[], 1),
        root.join("annotations").join("genes.arrow"),
    )
    .unwrap();

    // Left group: g2 is missing from one dataset, rows are out of order in the other.
    let ebi = root.join("ebi");
    std::fs::create_dir_all(ebi.join("left-b")).unwrap();
    write_ipc_file(
        &expression_table(&["g3", "g1"], &[vec![3.0, 1.0], vec![5.0, 1.0]], 1),
        ebi.join("left-a.arrow"),
    )
    .unwrap();
    let left_b = expression_table(
        &["g1", "g2", "g3"],
        &[vec![1.0, 2.0, 4.0], vec![1.0, 2.0, 4.0]],
        1,
    );
    write_ipc_file(&left_b.slice(0, 2).unwrap(), ebi.join("left-b").join("0000.arrow")).unwrap();
    write_ipc_file(&left_b.slice(2, 1).unwrap(), ebi.join("left-b").join("0001.arrow")).unwrap();

    write_ipc_file(
        &expression_table(
            &genes,
            &[vec![10.0, 2.0, 4.0], vec![12.0, 2.0, 4.0], vec![11.0, 2.0, 4.0]],
            1,
        ),
        ebi.join("right.arrow"),
    )
    .unwrap();
}

fn write_config(dir: &Path, root: &Path, left: &[&str], right: &[&str]) -> std::path::PathBuf {
    let config = serde_json::json!({
        "store": { "root": root, "domain": "ebi", "queue_depth": 2 },
        "ttest": { "left": left, "right": right, "result_key": "results/ttest" },
    });
    let path = dir.join("experiment.json");
    std::fs::write(&path, config.to_string()).unwrap();
    path
}

#[test]
fn partial_then_ttest_matches_raw_ttest() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("store");
    write_store(&root);

    let config = write_config(dir.path(), &root, &["left-a", "left-b"], &["right"]);
    let raw = stdout_json(
        &tether()
            .args(["ttest", "--raw", "--config"])
            .arg(&config)
            .output()
            .unwrap(),
    );
    assert_eq!(raw["left_count"], 4);
    assert_eq!(raw["right_count"], 3);
    let raw_result = read_stored(root.join("results").join("ttest.arrow"));

    for (name, out) in [
        ("left-a", "partials/left-a"),
        ("left-b", "partials/left-b"),
        ("right", "partials/right"),
    ] {
        let summary = stdout_json(
            &tether()
                .args(["partial", "--key", name, "--out", out, "--config"])
                .arg(&config)
                .output()
                .unwrap(),
        );
        assert_eq!(summary["genes"], 3);
    }

    // Partials are stored outside the domain; point the second run at them.
    let config = serde_json::json!({
        "store": { "root": root, "queue_depth": 2 },
        "ttest": {
            "left": ["partials/left-a", "partials/left-b"],
            "right": ["partials/right"],
            "result_key": "results/ttest-partials",
        },
    });
    let config_path = dir.path().join("partials.json");
    std::fs::write(&config_path, config.to_string()).unwrap();

    let merged = stdout_json(
        &tether()
            .args(["ttest", "--config"])
            .arg(&config_path)
            .output()
            .unwrap(),
    );
    assert_eq!(merged["left_count"], 4);
    assert_eq!(merged["genes"], 3);

    let merged_result = read_stored(root.join("results").join("ttest-partials.arrow"));
    assert_eq!(merged_result.column_names(), vec!["gene_id", "t_statistic", "p_value"]);

    let t_raw = raw_result.column(1).unwrap().to_f64_vec().unwrap();
    let t_merged = merged_result.column(1).unwrap().to_f64_vec().unwrap();
    for (a, b) in t_raw.iter().zip(&t_merged) {
        match (a, b) {
            (Some(a), Some(b)) if a.is_nan() => assert!(b.is_nan()),
            (Some(a), Some(b)) => assert!((a - b).abs() < 1e-9, "{a} vs {b}"),
            other => panic!("unexpected nulls {other:?}"),
        }
    }
}

#[test]
fn ttest_without_section_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        serde_json::json!({ "store": { "root": dir.path() } }).to_string(),
    )
    .unwrap();

    let output = tether().args(["ttest", "--config"]).arg(&path).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("ttest"));
}

#[test]
fn partial_mode_selects_the_delta_update() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("store");
    std::fs::create_dir_all(root.join("annotations")).unwrap();
    std::fs::create_dir_all(root.join("ebi")).unwrap();
    write_ipc_file(
        &expression_table(&["g1"], &[], 1),
        root.join("annotations").join("genes.arrow"),
    )
    .unwrap();
    // Signed mean is 3. Absolute deltas give 2, then 2 + 4 / 2 = 4, then 4 + |1 - 4| / 3 = 5.
    write_ipc_file(
        &expression_table(&["g1"], &[vec![2.0], vec![6.0], vec![1.0]], 1),
        root.join("ebi").join("sample.arrow"),
    )
    .unwrap();
    let config = write_config(dir.path(), &root, &["sample"], &["sample"]);

    let mut means = Vec::new();
    for mode in ["signed", "absolute"] {
        let out = format!("partials/{mode}");
        let summary = stdout_json(
            &tether()
                .args(["partial", "--key", "sample", "--out", out.as_str(), "--mode", mode, "--config"])
                .arg(&config)
                .output()
                .unwrap(),
        );
        assert_eq!(summary["mode"], mode);
        assert_eq!(summary["count"], 3);

        let stored = read_stored(root.join("partials").join(format!("{mode}.arrow")));
        assert_eq!(
            stored.metadata().get("aggr_mode").map(String::as_str),
            Some(mode)
        );
        means.push(stored.column_by_name("mean").unwrap().to_f64_vec().unwrap()[0].unwrap());
    }

    assert!((means[0] - 3.0).abs() < 1e-12, "signed mean {}", means[0]);
    assert!((means[1] - 5.0).abs() < 1e-12, "absolute mean {}", means[1]);
}

#[test]
fn aggr_mode_flag_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("expression.arrow");
    write_ipc_file(&expression_table(&["g0"], &[vec![1.0], vec![2.0]], 1), &path).unwrap();

    let report = stdout_json(
        &tether()
            .args(["aggr", "--mode", "signed", "--format", "json"])
            .arg(&path)
            .output()
            .unwrap(),
    );
    assert_eq!(report["mode"], "signed");
}
