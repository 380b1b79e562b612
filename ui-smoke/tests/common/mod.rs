//! Shared helpers for CLI contract tests.

use std::path::Path;
use std::process::{Command, Output};

/// Environment variables the harness reads; cleared before every test run so
/// the invoking shell (or CI) cannot leak state into assertions.
const SMOKE_ENV_VARS: [&str; 6] = [
    "UI_SMOKE_PORT",
    "UI_SMOKE_ALLOW_HTTP",
    "PLAYWRIGHT_STRICT",
    "PLAYWRIGHT_SKIP_BROWSER_DOWNLOAD",
    "CI",
    "UI_SMOKE_REQUIRE_BROWSERS",
];

/// Run the harness binary in `dir` with exactly the given environment
/// overrides applied on top of a scrubbed smoke environment.
pub fn run_smoke_in(dir: &Path, envs: &[(&str, &str)]) -> Output {
    command_in(dir, envs).output().expect("failed to run ui-smoke")
}

/// Same, but for the `preflight` subcommand.
pub fn run_preflight_in(dir: &Path, envs: &[(&str, &str)]) -> Output {
    let mut cmd = command_in(dir, envs);
    cmd.arg("preflight");
    cmd.output().expect("failed to run ui-smoke preflight")
}

fn command_in(dir: &Path, envs: &[(&str, &str)]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ui-smoke"));
    cmd.current_dir(dir);
    for var in SMOKE_ENV_VARS {
        cmd.env_remove(var);
    }
    for (key, value) in envs {
        cmd.env(key, value);
    }
    cmd
}

/// Parse the machine-readable summary line (the last non-empty stdout line).
pub fn summary_from(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .next_back()
        .unwrap_or_else(|| panic!("no summary line on stdout, stdout was: {stdout:?}"));
    serde_json::from_str(line)
        .unwrap_or_else(|err| panic!("summary line is not JSON ({err}): {line}"))
}

/// Non-empty stdout lines (the contract allows exactly one).
pub fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}
