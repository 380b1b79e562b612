//! Capability probing: automation toolchain, browser binaries, and the
//! bounded on-demand install path.
//!
//! The managed-browser toolchain (`npx playwright`) is this harness's
//! browser provisioner: it installs and lays out browser builds, which the
//! harness then drives directly over CDP. If the toolchain itself cannot be
//! invoked there is no way to provision a browser, which is terminal for a
//! run. Browser executables are resolved from system locations first, then
//! from the managed cache.

use crate::browser;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use serde::Serialize;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use ui_smoke_common::classify::{classify_preflight, is_blocked_download_error};
use ui_smoke_common::{BrowserName, EnvConfig, FailureClass, RunDiagnostics};

/// Upper bound for the toolchain version probe.
const ENGINE_PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound for the single install invocation (it downloads a browser).
const INSTALL_TIMEOUT: Duration = Duration::from_secs(240);

/// Outcome of loading the automation toolchain.
#[derive(Debug, Clone)]
pub enum EngineStatus {
    Available { version: String },
    Missing { reason: String },
}

/// Outcome of the binary-presence check plus install attempt.
#[derive(Debug, Clone)]
pub enum Provisioning {
    /// At least one launch candidate has a resolvable executable.
    Ready,
    /// No candidate resolves, even after the install attempt.
    Missing { install_blocked: bool, detail: String },
}

/// Per-browser result inside a preflight report.
#[derive(Debug, Clone, Serialize)]
pub struct BrowserProbe {
    pub name: BrowserName,
    pub path: Option<PathBuf>,
    pub exists: bool,
    /// `None` when the trial launch was not attempted (no executable).
    pub launched: Option<bool>,
    pub error: Option<String>,
}

/// Standalone environment-readiness report (the `preflight` subcommand).
#[derive(Debug, Clone, Serialize)]
pub struct PreflightReport {
    pub available: bool,
    pub engine_version: Option<String>,
    pub reason: Option<String>,
    pub classification: Option<FailureClass>,
    pub browsers: Vec<BrowserProbe>,
    pub viewport: browser::ViewportProfile,
}

/// Probe the automation toolchain.
///
/// A "package not found" signature (missing `npx`, missing `playwright`
/// package) means no browser can be provisioned.
pub async fn probe_engine() -> EngineStatus {
    let mut cmd = Command::new("npx");
    cmd.args(["playwright", "--version"]);
    match capture(cmd, ENGINE_PROBE_TIMEOUT).await {
        Ok((status, output)) if status.success() => {
            let version = output
                .split_whitespace()
                .last()
                .unwrap_or("unknown")
                .to_string();
            debug!(version, "automation toolchain resolved");
            EngineStatus::Available { version }
        }
        Ok((status, output)) => EngineStatus::Missing {
            reason: format!(
                "`npx playwright --version` exited with {status}: {}",
                tail(&output, 300)
            ),
        },
        Err(CaptureError::Spawn(err)) if err.kind() == ErrorKind::NotFound => {
            EngineStatus::Missing {
                reason: "npx executable not found; install Node.js and project dependencies"
                    .to_string(),
            }
        }
        Err(err) => EngineStatus::Missing {
            reason: format!("failed to probe automation toolchain: {err}"),
        },
    }
}

/// Full standalone probe: toolchain, per-browser resolution, and a minimal
/// trial launch (blank-page navigation) of every present candidate.
pub async fn probe(config: &EnvConfig) -> PreflightReport {
    let viewport = browser::MOBILE_EMULATION;
    let engine = match probe_engine().await {
        EngineStatus::Missing { reason } => {
            return PreflightReport {
                available: false,
                engine_version: None,
                reason: Some(reason),
                classification: Some(FailureClass::BinaryInstallationFailure),
                browsers: Vec::new(),
                viewport,
            };
        }
        EngineStatus::Available { version } => version,
    };

    let mut browsers = Vec::new();
    let mut failure: Option<(String, FailureClass)> = None;
    for name in config.browser_candidates() {
        let path = resolve_executable(name);
        let mut probe = BrowserProbe {
            name,
            exists: path.is_some(),
            path: path.clone(),
            launched: None,
            error: None,
        };
        match path {
            Some(path) => match browser::trial_launch(name, &path).await {
                Ok(()) => probe.launched = Some(true),
                Err(err) => {
                    let class = classify_preflight(&err);
                    probe.launched = Some(false);
                    probe.error = Some(err.clone());
                    failure.get_or_insert((format!("{name}: {err}"), class));
                }
            },
            None => {
                failure.get_or_insert((
                    format!("{name}: executable not found"),
                    FailureClass::BinaryInstallationFailure,
                ));
            }
        }
        browsers.push(probe);
    }

    let available = failure.is_none();
    let (reason, classification) = match failure {
        Some((reason, class)) => (Some(reason), Some(class)),
        None => (None, None),
    };
    PreflightReport {
        available,
        engine_version: Some(engine),
        reason,
        classification,
        browsers,
        viewport,
    }
}

/// Check executable presence for every candidate, install on demand, and
/// re-check. Ready as soon as any candidate resolves; the sequential launch
/// fallback deals with candidates that resolve but fail to start.
pub async fn ensure_browsers(config: &EnvConfig, diag: &mut RunDiagnostics) -> Provisioning {
    let candidates = config.browser_candidates();
    let mut missing = Vec::new();
    for name in &candidates {
        let path = resolve_executable(*name);
        let exists = path.is_some();
        diag.push_binary_check(*name, path, exists);
        if !exists {
            missing.push(*name);
        }
    }
    if missing.is_empty() {
        return Provisioning::Ready;
    }

    info!(?missing, "browser binaries missing; attempting on-demand install");
    let install = install_browsers(config).await;

    let mut present_after = false;
    for name in &candidates {
        let path = resolve_executable(*name);
        let exists = path.is_some();
        diag.push_binary_check(*name, path, exists);
        present_after |= exists;
    }
    if present_after {
        return Provisioning::Ready;
    }

    match install {
        Ok(output) => {
            let install_blocked = is_blocked_download_error(&output);
            Provisioning::Missing {
                install_blocked,
                detail: format!("install left no usable browser: {}", tail(&output, 300)),
            }
        }
        Err(err) => Provisioning::Missing {
            install_blocked: is_blocked_download_error(&err),
            detail: format!("install invocation failed: {err}"),
        },
    }
}

/// Single bounded install invocation; combined stdout/stderr returned for
/// the blocked-download heuristic regardless of exit status.
async fn install_browsers(config: &EnvConfig) -> Result<String, String> {
    let targets = config.install_targets();
    let mut cmd = Command::new("npx");
    cmd.args(["playwright", "install"]).args(targets);
    match capture(cmd, INSTALL_TIMEOUT).await {
        Ok((status, output)) => {
            if status.success() {
                debug!("browser install completed");
            } else {
                warn!(%status, "browser install exited unsuccessfully");
            }
            Ok(output)
        }
        Err(err) => Err(err.to_string()),
    }
}

/// Resolve the expected executable for a browser, preferring system
/// installations over the managed cache.
pub fn resolve_executable(name: BrowserName) -> Option<PathBuf> {
    let (binaries, fixed): (&[&str], &[&str]) = match name {
        BrowserName::Chrome => (
            &["google-chrome", "google-chrome-stable"],
            &[
                "/usr/bin/google-chrome",
                "/usr/bin/google-chrome-stable",
                "/opt/google/chrome/chrome",
                "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            ],
        ),
        BrowserName::Chromium => (
            &["chromium", "chromium-browser"],
            &[
                "/usr/bin/chromium",
                "/usr/bin/chromium-browser",
                "/snap/bin/chromium",
                "/Applications/Chromium.app/Contents/MacOS/Chromium",
            ],
        ),
    };

    for bin in binaries {
        if let Ok(path) = which::which(bin) {
            return Some(path);
        }
    }
    for path in fixed {
        let path = PathBuf::from(*path);
        if path.exists() {
            return Some(path);
        }
    }
    if name == BrowserName::Chromium {
        return managed_chromium();
    }
    None
}

/// Newest chromium build in the managed cache
/// (`~/.cache/ms-playwright/chromium-*/…`).
fn managed_chromium() -> Option<PathBuf> {
    let root = dirs::cache_dir()?.join("ms-playwright");
    let mut builds: Vec<PathBuf> = std::fs::read_dir(&root)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("chromium-"))
        })
        .collect();
    builds.sort();
    for build in builds.into_iter().rev() {
        for relative in [
            "chrome-linux/chrome",
            "chrome-linux64/chrome",
            "chrome-mac/Chromium.app/Contents/MacOS/Chromium",
        ] {
            let candidate = build.join(relative);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }
    None
}

#[derive(Debug, thiserror::Error)]
enum CaptureError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to spawn: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Run a command to completion with a hard deadline, returning its exit
/// status and combined stdout+stderr.
async fn capture(mut cmd: Command, limit: Duration) -> Result<(ExitStatus, String), CaptureError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let output = timeout(limit, cmd.output())
        .await
        .map_err(|_| CaptureError::Timeout(limit))??;
    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.stderr.is_empty() {
        if !combined.is_empty() {
            combined.push('\n');
        }
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
    }
    Ok((output.status, combined))
}

fn tail(text: &str, max: usize) -> &str {
    let trimmed = text.trim();
    match trimmed.char_indices().nth_back(max.saturating_sub(1)) {
        Some((idx, _)) => &trimmed[idx..],
        None => trimmed,
    }
}
