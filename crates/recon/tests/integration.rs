use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use docrecon_config::ProcessConfig;
use docrecon_engine::{ActionRegistry, Table, WorkerPool};
use docrecon_io::SourcePath;
use docrecon_recon::{Job, JobResult, PartitionKind, ReconError};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn fixture_config() -> String {
    std::fs::read_to_string(fixtures_dir().join("settlement.toml")).unwrap()
}

fn fixture_inputs() -> BTreeMap<String, SourcePath> {
    let dir = fixtures_dir();
    BTreeMap::from([
        ("atm".to_string(), SourcePath::resolve(&dir.join("atm"), false).unwrap()),
        ("ledger".to_string(), SourcePath::resolve(&dir.join("ledger.csv"), false).unwrap()),
    ])
}

fn run(config_toml: &str, inputs: &BTreeMap<String, SourcePath>) -> Result<JobResult, ReconError> {
    let config = ProcessConfig::from_toml(config_toml).unwrap();
    let pool = WorkerPool::new(2).unwrap();
    let job = Job::new(&config, ActionRegistry::builtin())?;
    job.run(inputs, &pool)
}

fn column(table: &Table, name: &str) -> Vec<String> {
    table.iter().map(|r| r.get(name).unwrap().render()).collect()
}

fn partition<'r>(result: &'r JobResult, name: &str) -> &'r Table {
    &result
        .partition(name)
        .unwrap_or_else(|| panic!("no partition '{name}'"))
        .table
}

// -------------------------------------------------------------------------
// Full job
// -------------------------------------------------------------------------

#[test]
fn settlement_against_ledger() {
    let result = run(&fixture_config(), &fixture_inputs()).unwrap();

    let names: Vec<&str> = result.partitions.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "SETTLEMENT BULK",
            "LEDGER MANUAL",
            "SETTLEMENT RECONCILED",
            "SETTLEMENT OUTSTANDING",
            "SETTLEMENT DUPLICATES",
            "LEDGER RECONCILED",
            "LEDGER OUTSTANDING",
            "LEDGER DUPLICATES",
            "LEDGER REVERSALS",
        ]
    );

    let reconciled = partition(&result, "SETTLEMENT RECONCILED");
    assert_eq!(
        reconciled.columns(),
        &["transaction_id".to_string(), "Amount".to_string(), "Date".to_string()][..]
    );
    assert_eq!(column(reconciled, "transaction_id"), vec!["R2"]);
    assert_eq!(column(reconciled, "Date"), vec!["01-Mar-24"]);
    assert_eq!(column(partition(&result, "SETTLEMENT OUTSTANDING"), "transaction_id"), vec!["R3"]);
    assert_eq!(column(partition(&result, "SETTLEMENT DUPLICATES"), "transaction_id"), vec!["R5", "R5"]);

    assert_eq!(column(partition(&result, "LEDGER RECONCILED"), "transaction_id"), vec!["R2"]);
    assert!(partition(&result, "LEDGER OUTSTANDING").is_empty());
    assert_eq!(column(partition(&result, "LEDGER DUPLICATES"), "Amount"), vec!["10", "12"]);
    assert_eq!(column(partition(&result, "LEDGER REVERSALS"), "Amount"), vec!["100", "-100"]);
}

#[test]
fn folder_files_carry_their_total_rows() {
    let result = run(&fixture_config(), &fixture_inputs()).unwrap();
    let bulk = partition(&result, "SETTLEMENT BULK");

    // set-aside partitions keep the source's own column names
    assert!(bulk.has_column("settlement_impact"));
    assert!(!bulk.has_column("amount"));
    assert_eq!(column(bulk, "settlement_impact"), vec!["125", "40"]);
    assert_eq!(column(bulk, "settlement_impact_desc"), vec!["Special_Case", "Special_Case"]);

    let labels = column(bulk, "rrn");
    assert_eq!(labels[0], "SETTLEMENT FIGURE ATM REPORT 2024-03-01 11:00:00");
    assert!(labels[1].contains("2024-03-02 09:05:00"));
}

#[test]
fn manual_postings_are_set_aside_after_mutations() {
    let result = run(&fixture_config(), &fixture_inputs()).unwrap();
    let manual = partition(&result, "LEDGER MANUAL");
    assert_eq!(manual.len(), 1);
    assert_eq!(column(manual, "amt.lcy"), vec!["30"]);
    // mutations ran before the rule
    assert_eq!(column(manual, "booking.date"), vec!["01-Mar-24"]);
}

#[test]
fn summary_counts_each_stage() {
    let result = run(&fixture_config(), &fixture_inputs()).unwrap();
    assert_eq!(result.meta.process, "Settlement");
    assert_eq!(result.meta.workers, 2);

    let settlement = &result.summary.sides[0];
    assert_eq!(settlement.name, "settlement");
    assert_eq!(settlement.documents, 2);
    assert_eq!(settlement.loaded, 6);
    assert_eq!(settlement.set_aside, 2);
    assert_eq!(settlement.unique, 2);
    assert_eq!(settlement.duplicates, 2);
    assert_eq!(settlement.inverse_pairs, 0);
    assert_eq!((settlement.reconciled, settlement.outstanding), (1, 1));

    let ledger = &result.summary.sides[1];
    assert_eq!(ledger.documents, 1);
    assert_eq!(ledger.loaded, 6);
    assert_eq!(ledger.set_aside, 1);
    assert_eq!(ledger.unique, 1);
    assert_eq!(ledger.inverse_pairs, 2);
    assert_eq!((ledger.reconciled, ledger.outstanding), (1, 0));

    let json: serde_json::Value = serde_json::from_str(&result.to_json()).unwrap();
    assert_eq!(json["summary"]["partitions"][0]["kind"], "set_aside");
    assert_eq!(json["summary"]["partitions"][0]["rows"], 2);
    assert!(json.get("partitions").is_none());
    assert_eq!(result.partitions[2].kind, PartitionKind::Reconciled);
}

#[test]
fn worker_count_does_not_change_partitions() {
    let config = ProcessConfig::from_toml(&fixture_config()).unwrap();
    let inputs = fixture_inputs();
    let job = Job::new(&config, ActionRegistry::builtin()).unwrap();

    let one = job.run(&inputs, &WorkerPool::new(1).unwrap()).unwrap();
    let many = job.run(&inputs, &WorkerPool::new(5).unwrap()).unwrap();
    for (a, b) in one.partitions.iter().zip(&many.partitions) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.table, b.table);
    }
}

// -------------------------------------------------------------------------
// Writing
// -------------------------------------------------------------------------

#[test]
fn partitions_written_per_name() {
    let config = ProcessConfig::from_toml(&fixture_config()).unwrap();
    let pool = WorkerPool::new(2).unwrap();
    let job = Job::new(&config, ActionRegistry::builtin()).unwrap();
    let result = job.run(&fixture_inputs(), &pool).unwrap();

    let out = tempfile::tempdir().unwrap();
    let written = job.write(&result, out.path(), &pool).unwrap();
    assert_eq!(written.len(), result.partitions.len());

    let outstanding = std::fs::read_to_string(out.path().join("SETTLEMENT OUTSTANDING.csv")).unwrap();
    assert_eq!(outstanding, "transaction_id,Amount,Date\nR3,75,01-Mar-24\n");
    assert!(out.path().join("LEDGER OUTSTANDING.csv").is_file());
}

#[test]
fn write_mutations_apply_to_every_partition() {
    let toml = fixture_config().replace(
        "config = { create_if_absent = true }",
        "config = { create_if_absent = true }\n[[outputs.folders.main_output.mutations.write]]\naction = \"lowercase_columns\"",
    );
    let config = ProcessConfig::from_toml(&toml).unwrap();
    let pool = WorkerPool::new(2).unwrap();
    let job = Job::new(&config, ActionRegistry::builtin()).unwrap();
    let result = job.run(&fixture_inputs(), &pool).unwrap();

    let out = tempfile::tempdir().unwrap();
    job.write(&result, out.path(), &pool).unwrap();
    let reconciled = std::fs::read_to_string(out.path().join("LEDGER RECONCILED.csv")).unwrap();
    assert!(reconciled.starts_with("transaction_id,amount,date\n"));
}

// -------------------------------------------------------------------------
// Failure modes
// -------------------------------------------------------------------------

#[test]
fn unresolved_input_is_an_error() {
    let mut inputs = fixture_inputs();
    inputs.remove("ledger");
    let err = run(&fixture_config(), &inputs).unwrap_err();
    assert!(matches!(err, ReconError::MissingInput(ref key) if key == "ledger"));
}

#[test]
fn unknown_action_fails_before_reading() {
    let toml = fixture_config().replace(
        "action = \"format_dates\"\nparams = { column = \"booking.date\" }",
        "action = \"explode\"",
    );
    let config = ProcessConfig::from_toml(&toml).unwrap();
    let err = Job::new(&config, ActionRegistry::builtin()).err().unwrap();
    assert!(err.to_string().contains("explode"));
}

#[test]
fn missing_ledger_file_is_soft() {
    let dir = tempfile::tempdir().unwrap();
    let mut inputs = fixture_inputs();
    inputs.insert(
        "ledger".to_string(),
        SourcePath::File(dir.path().join("not-exported-yet.csv")),
    );
    let result = run(&fixture_config(), &inputs).unwrap();
    assert!(partition(&result, "LEDGER RECONCILED").is_empty());
    assert!(partition(&result, "SETTLEMENT RECONCILED").is_empty());
    assert_eq!(column(partition(&result, "SETTLEMENT OUTSTANDING"), "transaction_id"), vec!["R2", "R3"]);
}

// -------------------------------------------------------------------------
// Carry forward
// -------------------------------------------------------------------------

fn write_previous(path: &Path) {
    let mut book = rust_xlsxwriter::Workbook::new();
    let sheet = book.add_worksheet();
    sheet.set_name("SETTLEMENT OUTSTANDING").unwrap();
    for (col, header) in ["transaction_id", "Amount", "Date", "Age"].iter().enumerate() {
        sheet.write_string(0, col as u16, *header).unwrap();
    }
    sheet.write_string(1, 0, "R9").unwrap();
    sheet.write_number(1, 1, 15.0).unwrap();
    sheet.write_string(1, 2, "28-Feb-24").unwrap();
    sheet.write_number(1, 3, 1.0).unwrap();
    book.save(path).unwrap();
}

#[test]
fn previous_outstanding_items_carry_forward() {
    let dir = tempfile::tempdir().unwrap();
    let previous = dir.path().join("previous.xlsx");
    write_previous(&previous);

    let toml = fixture_config()
        .replace(
            "[outputs.folders.main_output]",
            "[inputs.files.previous]\ninfo = \"Last run's outstanding items\"\n[inputs.files.previous.sections.\"SETTLEMENT OUTSTANDING\"]\n\n[outputs.folders.main_output]",
        )
        .replace(
            "duplicates = \"SETTLEMENT DUPLICATES\"",
            "duplicates = \"SETTLEMENT DUPLICATES\"\ncarry_forward = { source = \"previous\", section = \"SETTLEMENT OUTSTANDING\", age_column = \"Age\" }",
        );
    let mut inputs = fixture_inputs();
    inputs.insert("previous".to_string(), SourcePath::resolve(&previous, false).unwrap());

    let result = run(&toml, &inputs).unwrap();
    let outstanding = partition(&result, "SETTLEMENT OUTSTANDING");
    assert_eq!(column(outstanding, "transaction_id"), vec!["R9", "R3"]);
    assert_eq!(column(outstanding, "Age"), vec!["2", ""]);
    assert_eq!(result.summary.sides[0].carried_forward, 1);
}
