//! End-to-end tests driving the `solidity-sentinel` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/test_contracts")
        .join(name)
}

fn sentinel() -> Command {
    let mut cmd = Command::cargo_bin("solidity-sentinel").unwrap();
    cmd.env("RUST_LOG", "error");
    cmd
}

/// Runs `analyze --format json` and returns the parsed report and exit code.
fn analyze_json(args: &[&str]) -> (Value, i32) {
    let output = sentinel()
        .arg("analyze")
        .args(args)
        .args(["--format", "json", "--no-progress"])
        .output()
        .unwrap();
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    (report, output.status.code().unwrap())
}

fn rule_ids(report: &Value) -> Vec<String> {
    report["findings"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["rule_id"].as_str().unwrap().to_string())
        .collect()
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_reentrant_withdraw_is_reported_once() {
    let input = fixture("reentrancy.json");
    let (report, code) = analyze_json(&[path_str(&input)]);

    let findings = report["findings"].as_array().unwrap();
    assert_eq!(findings.len(), 1, "{:#}", report);

    let finding = &findings[0];
    assert_eq!(finding["rule_id"], "reentrancy-external-call");
    assert_eq!(finding["severity"], "high");
    assert_eq!(finding["contract"], "Bank");
    assert_eq!(finding["function"], "withdraw");
    assert_eq!(finding["location"]["file"], "contracts/Bank.sol");
    assert_eq!(finding["location"]["line"], 12);
    assert_eq!(code, 1);
}

#[test]
fn test_tx_origin_guard_collapses_into_auth_finding() {
    let input = fixture("tx_origin.json");
    let (report, code) = analyze_json(&[path_str(&input)]);

    assert_eq!(rule_ids(&report), vec!["tx-origin-auth"]);
    assert_eq!(report["findings"][0]["severity"], "high");
    assert_eq!(code, 1);
}

#[test]
fn test_only_unbounded_loop_is_flagged() {
    let input = fixture("loops.json");
    let (report, _) = analyze_json(&[path_str(&input)]);

    let findings = report["findings"].as_array().unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0]["rule_id"], "unbounded-loop");
    assert_eq!(findings[0]["function"], "creditAll");
    assert_eq!(findings[0]["severity"], "medium");
    assert_eq!(findings[0]["confidence"], "suspected");
}

#[test]
fn test_access_control_findings() {
    let input = fixture("access_control.json");
    let (report, code) = analyze_json(&[path_str(&input)]);

    assert_eq!(
        rule_ids(&report),
        vec![
            "unprotected-selfdestruct",
            "unprotected-privileged-write",
            "modifier-checks-parameter",
        ]
    );
    assert_eq!(code, 1);
}

#[test]
fn test_malformed_contract_does_not_stop_the_batch() {
    let input = fixture("malformed.json");
    let (report, code) = analyze_json(&[path_str(&input)]);

    let findings = report["findings"].as_array().unwrap();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0]["rule_id"], "malformed-input");
    assert_eq!(findings[0]["contract"], "Broken");
    assert_eq!(findings[0]["severity"], "info");
    assert_eq!(report["metadata"]["contracts"], 1);
    assert_eq!(code, 0);
}

#[test]
fn test_severity_floor_controls_exit_code() {
    let input = fixture("loops.json");
    let (report, code) = analyze_json(&[path_str(&input), "--severity", "high"]);

    assert!(report["findings"].as_array().unwrap().is_empty());
    assert_eq!(code, 0);
}

#[test]
fn test_output_is_deterministic() {
    let dir = fixture("");
    let first = sentinel()
        .args(["analyze", path_str(&dir), "--format", "json", "--no-progress"])
        .output()
        .unwrap();
    let second = sentinel()
        .args(["analyze", path_str(&dir), "--format", "json", "--no-progress", "--threads", "1"])
        .output()
        .unwrap();

    assert!(!first.stdout.is_empty());
    assert_eq!(first.stdout, second.stdout);
}

#[test]
fn test_baseline_round_trip_silences_known_findings() {
    let tmp = TempDir::new().unwrap();
    let baseline = tmp.path().join("baseline.json");
    let dir = fixture("");

    sentinel()
        .args(["baseline", path_str(&dir), "--output", path_str(&baseline)])
        .assert()
        .success()
        .stdout(predicate::str::contains("Baseline recorded"));

    let saved: Value = serde_json::from_str(&fs::read_to_string(&baseline).unwrap()).unwrap();
    assert_eq!(saved["version"], 1);
    assert!(!saved["fingerprints"].as_array().unwrap().is_empty());

    let (report, code) = analyze_json(&[path_str(&dir), "--baseline", path_str(&baseline)]);
    assert!(rule_ids(&report).iter().all(|id| id == "malformed-input"));
    assert_eq!(code, 0);
}

#[test]
fn test_inline_annotation_suppresses_next_line() {
    let tmp = TempDir::new().unwrap();
    let mut document: Value =
        serde_json::from_str(&fs::read_to_string(fixture("reentrancy.json")).unwrap()).unwrap();

    let mut lines: Vec<String> = (1..=10).map(|i| format!("// line {}", i)).collect();
    lines.push("        // sentinel-disable-next-line reentrancy-external-call: reviewed".to_string());
    lines.push("        (bool ok, ) = msg.sender.call{value: amount}(\"\");".to_string());
    document["source"] = Value::String(lines.join("\n"));

    let input = tmp.path().join("bank.json");
    fs::write(&input, serde_json::to_string(&document).unwrap()).unwrap();

    let (report, code) = analyze_json(&[path_str(&input), "--verbose"]);
    assert!(report["findings"].as_array().unwrap().is_empty());
    assert_eq!(report["summary"]["suppressed"], 1);
    assert_eq!(
        report["suppressed"][0]["finding"]["rule_id"],
        "reentrancy-external-call"
    );
    assert_eq!(code, 0);

    document["source"] = Value::Null;
    fs::write(&input, serde_json::to_string(&document).unwrap()).unwrap();
    let (report, code) = analyze_json(&[path_str(&input)]);
    assert_eq!(rule_ids(&report), vec!["reentrancy-external-call"]);
    assert_eq!(code, 1);
}

#[test]
fn test_expired_suppression_reports_stale_entry() {
    let tmp = TempDir::new().unwrap();
    let suppressions = tmp.path().join("suppressions.json");
    fs::write(
        &suppressions,
        r#"{ "suppressions": [
            { "rule": "reentrancy-external-call",
              "scope": { "contract": "Bank", "function": "withdraw" },
              "reason": "fixed in v2",
              "expires": "2024-01-01" }
        ] }"#,
    )
    .unwrap();

    let input = fixture("reentrancy.json");
    let (report, code) = analyze_json(&[
        path_str(&input),
        "--suppressions",
        path_str(&suppressions),
        "--as-of",
        "2024-06-01",
    ]);

    assert_eq!(rule_ids(&report), vec!["stale-suppression"]);
    assert_eq!(code, 0);
}

#[test]
fn test_exclude_drops_rule() {
    let input = fixture("access_control.json");
    let (report, _) = analyze_json(&[
        path_str(&input),
        "-x",
        "unprotected-selfdestruct,modifier-checks-parameter",
    ]);

    assert_eq!(rule_ids(&report), vec!["unprotected-privileged-write"]);
}

#[test]
fn test_zero_budget_reports_timeout() {
    let input = fixture("loops.json");
    let (report, _) = analyze_json(&[path_str(&input), "--timeout-ms", "0"]);

    assert!(rule_ids(&report).contains(&"analysis-timeout".to_string()));
}

#[test]
fn test_github_annotations() {
    sentinel()
        .args(["analyze", path_str(&fixture("tx_origin.json")), "--format", "github", "--no-progress"])
        .assert()
        .code(1)
        .stdout(predicate::str::starts_with("::error file=contracts/Wallet.sol,line=7"));
}

#[test]
fn test_missing_path_exits_with_error() {
    sentinel()
        .args(["analyze", "does/not/exist", "--no-progress"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("input path does not exist"));
}

#[test]
fn test_invalid_catalog_exits_with_error() {
    let tmp = TempDir::new().unwrap();
    let catalog = tmp.path().join("rules.json");
    fs::write(
        &catalog,
        r#"[ { "id": "custom", "title": "Custom", "severity": "low",
               "required_facts": ["no_such_fact"],
               "description": "d", "remediation": "r",
               "pattern": { "fact": "no_such_fact", "message": "m" } } ]"#,
    )
    .unwrap();

    sentinel()
        .args([
            "analyze",
            path_str(&fixture("loops.json")),
            "--rules",
            path_str(&catalog),
            "--no-progress",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no_such_fact"));
}

#[test]
fn test_list_includes_catalog_rules() {
    sentinel()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("reentrancy-external-call"))
        .stdout(predicate::str::contains("block-timestamp-dependence"));
}
