//! CLI test cases.
//!
//! None of these talk to the Gemini API. Commands that would need it are run
//! without credentials, so we only check that they fail in the right place.

use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use serde_json::Value;

/// Create a new `Command` with our binary, and no credentials.
fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("chalan-scanner").unwrap();
    // Run somewhere without a `.env` file, so a developer's key is never used.
    cmd.current_dir(std::env::temp_dir())
        .env_remove("GEMINI_API_KEY")
        .env_remove("API_KEY")
        .env_remove("GEMINI_API_BASE");
    cmd
}

/// The absolute path of a fixture file.
fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

/// Parse a command's standard output as JSON.
fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

#[test]
fn test_help() {
    cmd().arg("--help").assert().success();
}

#[test]
fn test_version() {
    cmd().arg("--version").assert().success();
}

#[test]
fn test_models() {
    cmd()
        .arg("models")
        .assert()
        .success()
        .stdout(predicate::str::contains("gemini-3-pro-preview"))
        .stdout(predicate::str::contains("3.0 Flash"))
        .stdout(predicate::str::contains("(default)"));
}

#[test]
fn test_models_json() {
    let output = cmd().args(["models", "--json"]).output().unwrap();
    assert!(output.status.success());
    let models = stdout_json(&output);
    assert_eq!(models.as_array().unwrap().len(), 3);
    assert_eq!(models[0]["input_price"], 1.25);
}

#[test]
fn test_cost() {
    cmd()
        .args(["cost", "1000000", "1000000", "--model", "gemini-3-pro-preview"])
        .assert()
        .success()
        .stdout(predicate::str::contains("$6.250000"));
}

#[test]
fn test_cost_unknown_model_uses_default_prices() {
    let output = cmd()
        .args(["cost", "2000000", "0", "--model", "mystery", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let cost = stdout_json(&output);
    assert_eq!(cost["input_cost"], 0.2);
    assert_eq!(cost["output_cost"], 0.0);
}

#[test]
fn test_schemas() {
    for schema_type in ["Document", "DocumentUpdate", "OcrResult", "Prompt"] {
        println!("Testing schema: {}", schema_type);
        cmd().args(["schema", schema_type]).assert().success();
    }
    cmd()
        .args(["schema", "Document"])
        .assert()
        .stdout(predicate::str::contains("chalan_number"));
}

#[test]
fn test_edit_with_patch() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("edited.json");
    cmd()
        .arg("edit")
        .arg(fixture("document.json"))
        .arg("--patch")
        .arg(fixture("patch.toml"))
        .args(["--set", "date=13/03/2024"])
        .arg("-o")
        .arg(&out)
        .assert()
        .success()
        .stderr(predicate::str::contains("Made 2 corrections"));

    let doc: Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(doc["chalan_number"], "DC/2024/119");
    assert_eq!(doc["date"], "13/03/2024");
    assert_eq!(doc["buyer"]["name"], "Karim Stores Ltd");
    assert_eq!(doc["buyer"]["additional"][0]["key"], "TIN");
    // Untouched fields survive.
    assert_eq!(doc["po_number"], "PO-5521");
    assert_eq!(doc["supplier"]["additional"][0]["key"], "BIN");
    assert_eq!(doc["line_items"]["rows"].as_array().unwrap().len(), 2);
}

#[test]
fn test_edit_line_items() {
    let output = cmd()
        .arg("edit")
        .arg(fixture("document.json"))
        .args(["--add-column", "Unit Price", "--column-type", "currency"])
        .args(["--remove-column", "sl"])
        .args(["--add-row", "--add-row"])
        .args(["--remove-row", "row-2"])
        .args(["--set-cell", "row-1:qty=55"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let doc = stdout_json(&output);

    let columns = doc["line_items"]["columns"].as_array().unwrap();
    let ids = columns
        .iter()
        .map(|c| c["id"].as_str().unwrap().to_owned())
        .collect::<Vec<_>>();
    assert_eq!(ids.len(), 3);
    assert_eq!(ids[0], "product");
    assert!(ids[2].starts_with("unit_price_"));
    assert_eq!(columns[2]["type"], "currency");

    let rows = doc["line_items"]["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["id"], "row-1");
    assert_eq!(rows[0]["cells"]["qty"], 55);
    assert!(rows[0]["cells"].get("sl").is_none());
    assert_eq!(rows[0]["cells"][&ids[2]], "");
    assert_eq!(rows[2]["confidence"], 1.0);
}

#[test]
fn test_edit_parties_metadata_and_summary() {
    let output = cmd()
        .arg("edit")
        .arg(fixture("document.json"))
        .args(["--set-party", "supplier.phone=01800-000000"])
        .args(["--set-party", "buyer.TIN=1234"])
        .args(["--remove-party-field", "supplier.BIN"])
        .args(["--add-metadata", "চালক=Jamal"])
        .args(["--set-metadata", "meta-1=ঢাকা মেট্রো ট-১১-৯৯৯৯"])
        .args(["--add-summary", "VAT=750"])
        .args(["--remove-summary", "sum-1"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let doc = stdout_json(&output);
    assert_eq!(doc["supplier"]["phone"], "01800-000000");
    assert_eq!(doc["supplier"]["additional"].as_array().unwrap().len(), 0);
    assert_eq!(doc["buyer"]["additional"][0]["value"], "1234");
    assert_eq!(doc["additional_metadata"][0]["value"], "ঢাকা মেট্রো ট-১১-৯৯৯৯");
    assert_eq!(doc["additional_metadata"][1]["key"], "চালক");
    assert_eq!(doc["summary"].as_array().unwrap().len(), 1);
    assert_eq!(doc["summary"][0]["value"], 750);
}

#[test]
fn test_edit_unknown_row_fails() {
    cmd()
        .arg("edit")
        .arg(fixture("document.json"))
        .args(["--remove-row", "no-such-row"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no row with ID"));
}

#[test]
fn test_edit_unknown_column_fails() {
    cmd()
        .arg("edit")
        .arg(fixture("document.json"))
        .args(["--set-cell", "row-1:bogus=1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no column with ID"));
}

#[test]
fn test_edit_rejects_unknown_column_types() {
    cmd()
        .arg("edit")
        .arg(fixture("document.json"))
        .args(["--add-column", "Rate", "--column-type", "curency"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_edit_rejects_provenance_patches() {
    cmd()
        .arg("edit")
        .arg(fixture("document.json"))
        .arg("--patch")
        .arg(fixture("bad_patch.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("bad_patch.json"));
}

#[test]
fn test_extract_rejects_non_documents_before_checking_credentials() {
    cmd()
        .arg("extract")
        .arg(fixture("notes.txt"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("valid image or PDF"))
        .stderr(predicate::str::contains("API key").not());
}

#[test]
fn test_extract_without_api_key() {
    cmd()
        .arg("extract")
        .arg(fixture("chalan.png"))
        .arg("--stdout")
        .assert()
        .failure()
        .stderr(predicate::str::contains("API key is missing"));
}

#[test]
fn test_ocr_without_api_key() {
    cmd()
        .arg("ocr")
        .arg(fixture("chalan.png"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("API key is missing"));
}

#[test]
fn test_structure_rejects_empty_text() {
    cmd()
        .arg("structure")
        .arg(fixture("empty.txt"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("contains no text"));
}
