//! CLI contract tests: exit codes, the single summary line on stdout, and
//! the persisted diagnostics record, exercised by spawning the real binary
//! with injected environments. Paths that need a browser or a server are
//! covered at the unit level; these tests pin the shapes CI systems parse.

mod common;

use common::{run_preflight_in, run_smoke_in, stdout_lines, summary_from};

#[test]
fn skip_download_exits_zero_without_strict() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_smoke_in(dir.path(), &[("PLAYWRIGHT_SKIP_BROWSER_DOWNLOAD", "1")]);
    assert_eq!(output.status.code(), Some(0));

    let summary = summary_from(&output);
    assert_eq!(summary["ui_smoke"], "skipped");
    assert_eq!(summary["classification"], "binary-installation-failure");
    assert_eq!(summary["action"], "npx playwright install");
}

#[test]
fn skip_download_with_strict_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_smoke_in(
        dir.path(),
        &[
            ("PLAYWRIGHT_SKIP_BROWSER_DOWNLOAD", "1"),
            ("PLAYWRIGHT_STRICT", "1"),
        ],
    );
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(summary_from(&output)["ui_smoke"], "skipped");
}

#[test]
fn skip_download_accepts_the_true_literal() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_smoke_in(dir.path(), &[("PLAYWRIGHT_SKIP_BROWSER_DOWNLOAD", "true")]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(summary_from(&output)["ui_smoke"], "skipped");
}

#[test]
fn stdout_carries_exactly_one_line() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_smoke_in(dir.path(), &[("PLAYWRIGHT_SKIP_BROWSER_DOWNLOAD", "1")]);
    let lines = stdout_lines(&output);
    assert_eq!(lines.len(), 1, "expected one summary line, got: {lines:?}");
}

#[test]
fn diagnostics_record_is_persisted_with_the_verdict() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_smoke_in(dir.path(), &[("PLAYWRIGHT_SKIP_BROWSER_DOWNLOAD", "1")]);
    assert_eq!(output.status.code(), Some(0));

    let record_path = dir.path().join("test-results/ui-smoke/diagnostics.json");
    let raw = std::fs::read_to_string(&record_path)
        .unwrap_or_else(|err| panic!("missing diagnostics at {}: {err}", record_path.display()));
    let record: serde_json::Value = serde_json::from_str(&raw).unwrap();

    assert_eq!(record["result"], "skipped");
    assert_eq!(record["classification"], "binary-installation-failure");
    assert_eq!(record["environment"]["skip_download"], true);
    assert!(record["run_id"].is_string());
    assert!(record["finished_at"].is_string());
    assert!(record["started_at"].is_string());
}

#[test]
fn missing_toolchain_fails_with_install_classification() {
    let dir = tempfile::tempdir().unwrap();
    // An empty PATH makes the toolchain probe fail to spawn, which is the
    // terminal engine-missing path: always a failure, exit 1.
    let output = run_smoke_in(dir.path(), &[("PATH", "")]);
    assert_eq!(output.status.code(), Some(1));

    let summary = summary_from(&output);
    assert_eq!(summary["ui_smoke"], "failed");
    assert_eq!(summary["classification"], "binary-installation-failure");

    // No browser may have been attempted on this path.
    let record_path = dir.path().join("test-results/ui-smoke/diagnostics.json");
    let record: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(record_path).unwrap()).unwrap();
    assert_eq!(record["result"], "failed");
    assert_eq!(
        record["browser_launch_attempts"].as_array().map(Vec::len),
        Some(0)
    );
    assert_eq!(record["server_probes"].as_array().map(Vec::len), Some(0));
}

#[test]
fn strictness_does_not_rescue_a_missing_toolchain() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_smoke_in(dir.path(), &[("PATH", ""), ("CI", "true")]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(summary_from(&output)["ui_smoke"], "failed");
}

#[test]
fn preflight_reports_unavailable_without_toolchain() {
    let dir = tempfile::tempdir().unwrap();
    let output = run_preflight_in(dir.path(), &[("PATH", "")]);
    assert_eq!(output.status.code(), Some(1));

    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("preflight report is JSON");
    assert_eq!(report["available"], false);
    assert_eq!(report["classification"], "binary-installation-failure");
    assert!(report["reason"].is_string());
    assert_eq!(report["viewport"]["mobile"], true);
}
