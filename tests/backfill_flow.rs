use std::fs;
use std::path::{Path, PathBuf};

use attribute_backfill::replies::{request_id, write_pending};
use attribute_backfill::{
    load_dataset, run_apply, select_pending, ApplyOptions, ApplyStats, ColumnLayout, Dataset, DatasetError,
    FieldTally, PendingExport, PromptTemplate, RunConfig,
};

const DATASET: &str = "\
Eksternt varenr.;Beskrivelse;Leverandør;Vægt;Enhed;Climatiq factor;Climatic factor navn;Note
100-1;Hex bolt M8;Acme;;;;;first
100-2;Nut M8;Acme;4;g;0.5 kgCO2e/kg;Steel, cradle-to-shelf;
100-1;Hex bolt M8;Acme;;;;;duplicate
100-3;Washer;Bolt & Co;  ;  ;  ;  ;
";

const CONFIG: &str = r#"
description: integration run
dataset: items.csv
identity_columns: ["Eksternt varenr.", "Beskrivelse", "Leverandør"]
target_columns: ["Vægt", "Enhed", "Climatiq factor", "Climatic factor navn"]
delimiter: ";"
prompt_template: "Find the net weight of {Eksternt varenr.} ({Beskrivelse}) from {Leverandør}."
"#;

fn setup() -> (tempfile::TempDir, RunConfig) {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("items.csv"), DATASET).unwrap();
    fs::write(dir.path().join("run.yaml"), CONFIG).unwrap();
    let config = RunConfig::load(&dir.path().join("run.yaml")).unwrap();
    (dir, config)
}

fn load(config: &RunConfig) -> (Dataset, ColumnLayout) {
    let dataset = Dataset::load(&config.dataset, config.delimiter_byte()).unwrap();
    let layout = ColumnLayout::resolve(
        &dataset,
        config.identity_columns.as_slice(),
        &config.target_columns_array(),
    )
    .unwrap();
    (dataset, layout)
}

#[test]
fn select_export_includes_rendered_prompts() {
    let (_dir, config) = setup();
    let (dataset, layout) = load(&config);
    let template = PromptTemplate::new(config.prompt_template.as_deref().unwrap(), &dataset);

    let exports: Vec<PendingExport> = select_pending(&dataset, &layout, config.target_columns.as_slice())
        .unwrap()
        .map(|record| {
            let prompt = template.render(&dataset, record.row_index);
            PendingExport::new(&config.identity_columns, &record, Some(prompt))
        })
        .collect();

    assert_eq!(exports.len(), 3);
    assert_eq!(exports[0].row_number, 1);
    assert_eq!(exports[2].row_number, 4);
    assert_eq!(exports[0].request_id, exports[1].request_id);
    assert_eq!(
        exports[2].prompt.as_deref(),
        Some("Find the net weight of 100-3 (Washer) from Bolt & Co.")
    );

    let mut out = Vec::new();
    assert_eq!(write_pending(&mut out, exports).unwrap(), 3);
    assert_eq!(String::from_utf8(out).unwrap().lines().count(), 3);
}

const REPLIES: &str = concat!(
    r#"{"identity":{"Eksternt varenr.":"100-1","Beskrivelse":"Hex bolt M8","Leverandør":"Acme"},"reply":"\"12.5\"\n\"g\"\n\"0.8 kgCO2e/kg\"\n\"Steel, cradle-to-shelf\""}"#,
    "\n",
    r#"{"identity":{"Eksternt varenr.":"100-3","Beskrivelse":"Washer","Leverandør":"Bolt & Co"},"reply":"2 (AS)\rg\r"}"#,
    "\n",
    r#"{"identity":{"Eksternt varenr.":"999","Beskrivelse":"Ghost","Leverandør":"Nobody"},"reply":"1\n2\n3\n4"}"#,
    "\n",
    "not a reply\n",
);

fn write_replies(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("replies.jsonl");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn apply_merges_replies_and_writes_output_elsewhere() {
    let (dir, config) = setup();
    let replies = write_replies(dir.path(), REPLIES);
    let output = dir.path().join("updated.csv");
    let options = ApplyOptions {
        replies: &replies,
        output: Some(&output),
        audit: None,
        dry_run: false,
    };

    let mut progress = Vec::new();
    let report = run_apply(&config, &options, |total, identity| {
        progress.push((total, identity[0].clone()))
    })
    .unwrap();

    assert_eq!(report.replies_read, 3);
    assert_eq!(report.malformed_lines, 1);
    assert_eq!(report.pending_before, 3);
    assert_eq!(report.pending_after, 0);
    assert_eq!(report.stats.replies_merged, 2);
    assert_eq!(report.stats.replies_unmatched, 1);
    assert_eq!(report.stats.rows_updated, 3);
    assert_eq!(
        report.stats.tally,
        FieldTally {
            determined: 5,
            assumed: 1,
            missing: 2
        }
    );
    assert_eq!(report.saved_to.as_deref(), Some(output.as_path()));
    assert_eq!(progress.len(), 3);
    assert!(progress.iter().all(|(total, _)| *total == 3));

    let reloaded = Dataset::load(&output, b';').unwrap();
    assert_eq!(reloaded.len(), 4);
    assert_eq!(reloaded.cell(0, 3), "12.5");
    assert_eq!(reloaded.cell(2, 6), "Steel, cradle-to-shelf");
    assert_eq!(reloaded.cell(2, 7), "duplicate");
    assert_eq!(reloaded.cell(3, 3), "2 (AS)");
    assert_eq!(reloaded.cell(3, 4), "g");
    assert_eq!(reloaded.cell(3, 5), "N/A");
    assert_eq!(reloaded.cell(1, 3), "4");

    // the input file is untouched when writing elsewhere
    assert_eq!(fs::read_to_string(dir.path().join("items.csv")).unwrap(), DATASET);
}

#[test]
fn apply_overwrites_configured_dataset_by_default() {
    let (dir, config) = setup();
    let replies = write_replies(dir.path(), REPLIES);
    let audit = dir.path().join("audit.csv");
    let options = ApplyOptions {
        replies: &replies,
        output: None,
        audit: Some(&audit),
        dry_run: false,
    };

    let report = run_apply(&config, &options, |_, _| {}).unwrap();
    assert_eq!(report.saved_to.as_deref(), Some(config.dataset.as_path()));

    let (dataset, layout) = load_dataset(&config).unwrap();
    assert_eq!(dataset.cell(0, 3), "12.5");
    assert_eq!(
        select_pending(&dataset, &layout, config.target_columns.as_slice())
            .unwrap()
            .count(),
        0
    );
    let mut reader = csv::Reader::from_path(&audit).unwrap();
    assert_eq!(reader.records().count(), 3);
}

#[test]
fn dry_run_leaves_dataset_untouched() {
    let (dir, config) = setup();
    let replies = write_replies(dir.path(), REPLIES);
    let options = ApplyOptions {
        replies: &replies,
        output: None,
        audit: None,
        dry_run: true,
    };

    let report = run_apply(&config, &options, |_, _| {}).unwrap();
    assert_eq!(report.stats.replies_merged, 2);
    assert_eq!(report.pending_after, 0);
    assert!(report.saved_to.is_none());
    assert_eq!(fs::read_to_string(&config.dataset).unwrap(), DATASET);
}

#[test]
fn empty_reply_batch_returns_before_saving() {
    let (dir, config) = setup();
    let replies = write_replies(dir.path(), "\n   \nnot json\n");
    let output = dir.path().join("never.csv");
    let audit = dir.path().join("never-audit.csv");
    let options = ApplyOptions {
        replies: &replies,
        output: Some(&output),
        audit: Some(&audit),
        dry_run: false,
    };

    let report = run_apply(&config, &options, |_, _| panic!("no reply expected")).unwrap();
    assert_eq!(report.replies_read, 0);
    assert_eq!(report.malformed_lines, 1);
    assert_eq!(report.pending_after, report.pending_before);
    assert_eq!(report.stats, ApplyStats::default());
    assert!(report.saved_to.is_none());
    assert!(!output.exists());
    assert!(!audit.exists());
}

#[test]
fn mismatched_request_id_is_reported() {
    let (dir, config) = setup();
    let other = request_id(&["100-3".to_string(), "Washer".to_string(), "Bolt & Co".to_string()]);
    let line = format!(
        r#"{{"request_id":"{}","identity":{{"Eksternt varenr.":"100-1","Beskrivelse":"Hex bolt M8","Leverandør":"Acme"}},"reply":"7"}}"#,
        other
    );
    let replies = write_replies(dir.path(), &line);
    let options = ApplyOptions {
        replies: &replies,
        output: None,
        audit: None,
        dry_run: true,
    };

    let report = run_apply(&config, &options, |_, _| {}).unwrap();
    assert_eq!(report.stats.request_id_mismatches, 1);
    assert_eq!(report.stats.rows_updated, 2);
}

#[test]
fn missing_configured_column_fails_at_load() {
    let (dir, mut config) = setup();
    config.target_columns[3] = "CO2 navn".to_string();
    let dataset = Dataset::load(&dir.path().join("items.csv"), b';').unwrap();
    let err = ColumnLayout::resolve(
        &dataset,
        config.identity_columns.as_slice(),
        &config.target_columns_array(),
    )
    .unwrap_err();
    assert!(matches!(err, DatasetError::MissingColumn { ref column, .. } if column == "CO2 navn"));
}
