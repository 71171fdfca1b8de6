mod common;

use assert_cmd::Command;
use book_ledger::aggregate::Summary;
use common::{TestWorkspace, bookstore_root, fixture_path};
use predicates::{prelude::*, str::contains};

fn ledger() -> Command {
    Command::cargo_bin("book-ledger").expect("binary exists")
}

#[test]
fn analyze_prints_table_and_writes_outputs() {
    let out = TestWorkspace::new();
    ledger()
        .args([
            "analyze",
            "--data-root",
            bookstore_root().to_str().unwrap(),
            "--out-dir",
            out.path().to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(contains("dataset"))
        .stdout(contains("DATA1"))
        .stdout(contains("48.50"));

    let summaries: Vec<Summary> =
        serde_json::from_str(&out.read("all_summaries.json")).expect("parse all summaries");
    assert_eq!(summaries.len(), 2);
    assert!(out.path().join("DATA2_books_processed.csv").is_file());
}

#[test]
fn analyze_json_flag_emits_contract_field_names() {
    let out = TestWorkspace::new();
    ledger()
        .args([
            "analyze",
            "--data-root",
            bookstore_root().to_str().unwrap(),
            "--out-dir",
            out.path().to_str().unwrap(),
            "--json",
        ])
        .assert()
        .success()
        .stdout(contains("\"top5_days\""))
        .stdout(contains("\"unique_real_users\": 2"))
        .stdout(contains("\"top_customer_user_ids\""));
}

#[test]
fn analyze_applies_config_file_then_flags() {
    let ws = TestWorkspace::new();
    ws.copy_dataset("DATA1", "DATA1");
    let config = ws.write("ledger.yaml", "eur_rate: 2.0\ntop_days: 1\n");
    let out = ws.path().join("out");
    ledger()
        .args([
            "analyze",
            "--data-root",
            ws.path().to_str().unwrap(),
            "--out-dir",
            out.to_str().unwrap(),
            "--config",
            config.to_str().unwrap(),
        ])
        .assert()
        .success();

    let summaries: Vec<Summary> =
        serde_json::from_str(&ws.read("out/all_summaries.json")).expect("parse all summaries");
    let data1 = &summaries[0];
    assert_eq!(data1.top5_days.len(), 1);
    // the €10 order is now worth 20
    assert_eq!(data1.top_customer_total_spent, 56.5);
}

#[test]
fn analyze_rejects_invalid_threshold() {
    let out = TestWorkspace::new();
    ledger()
        .args([
            "analyze",
            "--data-root",
            bookstore_root().to_str().unwrap(),
            "--out-dir",
            out.path().to_str().unwrap(),
            "--match-threshold",
            "9",
        ])
        .assert()
        .failure()
        .stderr(contains("match_threshold"));
}

#[test]
fn analyze_fails_when_no_dataset_is_usable() {
    let ws = TestWorkspace::new();
    ws.write("DATA1/users.csv", "id,name\n1,A\n");
    ledger()
        .args([
            "analyze",
            "--data-root",
            ws.path().to_str().unwrap(),
            "--out-dir",
            ws.path().join("out").to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(contains("could be processed"));
}

#[test]
fn clusters_lists_merged_customers() {
    let users = fixture_path("bookstore").join("DATA1").join("users.csv");
    ledger()
        .args(["clusters", "-i", users.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("cluster_id"))
        .stdout(contains("1, 3, 4"))
        .stdout(contains("   1  2").not());
}

#[test]
fn clusters_honors_semicolon_delimiter_and_all_flag() {
    let ws = TestWorkspace::new();
    let users = ws.write(
        "users.csv",
        "id;name;email;phone;address\n1;Kim;k@x;1;A\n2;Kim;k@x;1;B\n3;Lou;l@x;2;C\n",
    );
    ledger()
        .args([
            "clusters",
            "-i",
            users.to_str().unwrap(),
            "--delimiter",
            ";",
            "--all",
        ])
        .assert()
        .success()
        .stdout(contains("1, 2"))
        .stdout(contains("   1  3"));
}
