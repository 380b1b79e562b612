//! Run driver.
//!
//! One cooperative control flow: probe → server → binaries → launch →
//! sanity → navigate → interact → capture. Every phase folds its evidence
//! into the diagnostics record; every path funnels through [`finalize`],
//! which records the single terminal conclusion, persists the record, emits
//! the one-line stdout summary and yields the process exit code. The server
//! is stopped before finalize runs, whatever the outcome.

use crate::prober::{self, EngineStatus, Provisioning};
use crate::server::ServerHandle;
use crate::browser;
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};
use ui_smoke_common::policy::{conclude, summary_line};
use ui_smoke_common::{EnvConfig, RunDiagnostics, RunOutcome};

/// Execute the full smoke pass and return the process exit code.
pub async fn run_smoke(config: EnvConfig) -> i32 {
    let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let mut diag = RunDiagnostics::begin(config.clone(), working_dir);
    info!(run_id = %diag.run_id, port = config.port, ci = config.ci, "smoke run starting");

    let outcome = execute(&config, &mut diag).await;
    finalize(&config, &mut diag, &outcome)
}

/// Standalone environment probe (the `preflight` subcommand).
pub async fn run_preflight(config: &EnvConfig) -> i32 {
    let report = prober::probe(config).await;
    match serde_json::to_string_pretty(&report) {
        Ok(rendered) => println!("{rendered}"),
        Err(err) => {
            warn!(%err, "could not render preflight report");
            return 1;
        }
    }
    if report.available { 0 } else { 1 }
}

async fn execute(config: &EnvConfig, diag: &mut RunDiagnostics) -> RunOutcome {
    if config.skip_download {
        info!("browser download disabled by environment; skipping run");
        return RunOutcome::SkipDownloadRequested;
    }

    match prober::probe_engine().await {
        EngineStatus::Available { version } => {
            info!(%version, "automation toolchain available");
            diag.engine_version = Some(version);
        }
        EngineStatus::Missing { reason } => {
            warn!(%reason, "automation toolchain unavailable");
            flush(diag);
            return RunOutcome::EngineMissing { reason };
        }
    }

    let mut server = match ServerHandle::start(config, diag.artifacts.server_log.clone()) {
        Ok(server) => server,
        Err(err) => {
            warn!(%err, "preview server failed to start");
            flush(diag);
            return RunOutcome::ServerUnreachable {
                detail: err.to_string(),
            };
        }
    };

    // The server is owned here and released exactly once, whichever way the
    // remaining phases go.
    let outcome = drive(config, diag, &mut server).await;
    server.stop().await;
    outcome
}

async fn drive(
    config: &EnvConfig,
    diag: &mut RunDiagnostics,
    server: &mut ServerHandle,
) -> RunOutcome {
    let Some(host) = server.wait_until_ready(config, diag).await else {
        flush(diag);
        return RunOutcome::ServerUnreachable {
            detail: format!("no host alias answered on port {}", config.port),
        };
    };

    match prober::ensure_browsers(config, diag).await {
        Provisioning::Ready => {}
        Provisioning::Missing {
            install_blocked,
            detail,
        } => {
            warn!(install_blocked, %detail, "browser binaries unavailable");
            flush(diag);
            return RunOutcome::BinariesMissing {
                install_blocked,
                detail,
            };
        }
    }

    browser::run_checks(config, diag, &host).await
}

fn finalize(config: &EnvConfig, diag: &mut RunDiagnostics, outcome: &RunOutcome) -> i32 {
    let conclusion = conclude(config, outcome);
    if !diag.record_conclusion(&conclusion) {
        warn!("conclusion already recorded; keeping the first verdict");
    }
    if let Err(err) = diag.persist() {
        warn!(%err, "could not persist diagnostics record");
    }

    let details = json!({
        "run_id": &diag.run_id,
        "reason": &conclusion.reason,
        "browser": diag.browser_used,
        "strategy": diag.navigation_strategy_used,
        "base_url": &diag.base_url,
        "screenshot": &diag.artifacts.screenshot,
        "diagnostics": &diag.artifacts.diagnostics,
    });
    println!("{}", summary_line(&conclusion, &details));
    info!(status = %conclusion.status, exit_code = conclusion.exit_code, "smoke run finished");
    conclusion.exit_code
}

/// Best-effort intermediate flush on early-failure paths; the terminal
/// persist in [`finalize`] is the authoritative one.
fn flush(diag: &RunDiagnostics) {
    if let Err(err) = diag.persist() {
        warn!(%err, "intermediate diagnostics flush failed");
    }
}
