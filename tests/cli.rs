use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;
use tempfile::TempDir;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::write(
        root.join("tender.txt"),
        "The contractor shall provide a warranty of twenty four months.\n\
         Deliveries must arrive within ten working days of the purchase order.\n\
         Invoices are payable thirty days after receipt.",
    )
    .unwrap();
    fs::write(
        root.join("requirements.txt"),
        "The contractor shall provide a warranty of twenty four months.\n\
         \n\
         Spare parts stocked for seven years\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[storage]
root = "{}/data"

[chunking]
chunk_size = 80
chunk_overlap = 0

[embedding]
provider = "hash"
model = "feature-hash"
dims = 128
"#,
        root.display()
    );
    let config_path = root.join("ragc.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_ragc(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_ragc"))
        .arg("--config")
        .arg(config_path)
        .args(args)
        .output()
        .expect("failed to run ragc");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

fn json(stdout: &str) -> Value {
    serde_json::from_str(stdout).unwrap_or_else(|e| panic!("bad JSON ({}): {}", e, stdout))
}

#[test]
fn test_ingest_then_query_across_invocations() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("tender.txt");

    let (stdout, stderr, ok) = run_ragc(&config, &["ingest", file.to_str().unwrap()]);
    assert!(ok, "stderr: {}", stderr);
    let ingest = json(&stdout);
    assert_eq!(ingest["success"], true);
    assert_eq!(ingest["document_name"], "tender");

    let (stdout, _, ok) = run_ragc(&config, &["query", "tender", "warranty", "--top-k", "2"]);
    assert!(ok);
    let query = json(&stdout);
    assert_eq!(query["num_results"], 2);

    let (stdout, _, ok) = run_ragc(&config, &["list"]);
    assert!(ok);
    assert_eq!(json(&stdout)["total_documents"], 1);

    let (stdout, _, ok) = run_ragc(&config, &["tables", "tender"]);
    assert!(ok);
    assert_eq!(json(&stdout)["total_tables"], 0);
}

#[test]
fn test_compare_and_report() {
    let (tmp, config) = setup_test_env();
    let file = tmp.path().join("tender.txt");
    let spec = tmp.path().join("requirements.txt");
    assert!(run_ragc(&config, &["ingest", file.to_str().unwrap()]).2);

    let (stdout, stderr, ok) = run_ragc(
        &config,
        &["compare", "tender", "--spec", spec.to_str().unwrap()],
    );
    assert!(ok, "stderr: {}", stderr);
    let result = json(&stdout);
    assert_eq!(result["total_requirements"], 2);
    assert_eq!(result["items"][0]["requirement_id"], "REQ_001");
    assert_eq!(result["items"][0]["status"], "compliant");

    let (stdout, _, ok) = run_ragc(
        &config,
        &[
            "report",
            "tender",
            "--spec",
            spec.to_str().unwrap(),
            "--spec-name",
            "Tender 42",
        ],
    );
    assert!(ok);
    assert!(stdout.contains("COMPLIANCE REPORT"));
    assert!(stdout.contains("Specification: Tender 42"));
    assert!(stdout.contains("[REQ_002]"));
}

#[test]
fn test_failures_exit_non_zero() {
    let (tmp, config) = setup_test_env();

    let (stdout, _, ok) = run_ragc(
        &config,
        &["ingest", tmp.path().join("missing.pdf").to_str().unwrap()],
    );
    assert!(!ok);
    assert_eq!(json(&stdout)["success"], false);

    let (_, stderr, ok) = run_ragc(&config, &["query", "ghost", "anything"]);
    assert!(!ok);
    assert!(stderr.contains("not indexed"), "stderr: {}", stderr);

    let (stdout, _, ok) = run_ragc(&config, &["delete", "ghost"]);
    assert!(ok);
    assert_eq!(json(&stdout)["success"], true);
}
