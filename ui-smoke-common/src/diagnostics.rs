//! The diagnostics record: one mutable aggregate per run.
//!
//! Created at process start, mutated by every phase in program order, and
//! persisted as human-readable JSON. The record is owned exclusively by the
//! run driver; helpers receive `&mut` for the duration of a phase. The
//! terminal `result`/`classification` pair is write-once: the first recorded
//! conclusion wins and later attempts are no-ops.

use crate::config::EnvConfig;
use crate::policy::Conclusion;
use crate::types::{BrowserName, FailureClass, NavStrategy, RunStatus, SummaryClassification};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Fixed artifact directory, relative to the working directory.
pub const ARTIFACT_DIR: &str = "test-results/ui-smoke";

/// Resolved locations of every artifact a run may produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    /// Full-page screenshot of the app after the scripted interaction.
    pub screenshot: PathBuf,
    /// Screenshot of the static sanity document.
    pub sanity_screenshot: PathBuf,
    /// Trace bundle: ordered page-event streams plus navigation history.
    pub trace: PathBuf,
    /// This record, serialized.
    pub diagnostics: PathBuf,
    /// Captured combined stdout/stderr of the preview server.
    pub server_log: PathBuf,
}

impl ArtifactPaths {
    pub fn under(dir: &Path) -> Self {
        Self {
            screenshot: dir.join("app.png"),
            sanity_screenshot: dir.join("sanity.png"),
            trace: dir.join("trace.json"),
            diagnostics: dir.join("diagnostics.json"),
            server_log: dir.join("server.log"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleEvent {
    pub at: DateTime<Utc>,
    pub level: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageErrorEvent {
    pub at: DateTime<Utc>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFailureEvent {
    pub at: DateTime<Utc>,
    pub url: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerProbeEvent {
    pub at: DateTime<Utc>,
    pub host: String,
    pub url: String,
    pub ok: bool,
    pub status: Option<u16>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavAttemptEvent {
    pub at: DateTime<Utc>,
    pub strategy: NavStrategy,
    pub target: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavErrorEvent {
    pub at: DateTime<Utc>,
    pub strategy: NavStrategy,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackTransitionEvent {
    pub at: DateTime<Utc>,
    pub from: NavStrategy,
    pub to: NavStrategy,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchAttemptEvent {
    pub at: DateTime<Utc>,
    pub browser: BrowserName,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchErrorEvent {
    pub at: DateTime<Utc>,
    pub browser: BrowserName,
    pub error: String,
    pub classification: FailureClass,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryCheckEvent {
    pub browser: BrowserName,
    pub path: Option<PathBuf>,
    pub exists: bool,
}

/// The run-long mutable aggregate.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunDiagnostics {
    pub run_id: Uuid,
    pub harness_version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub working_dir: PathBuf,
    pub artifacts: ArtifactPaths,
    pub environment: EnvConfig,

    pub result: RunStatus,
    pub classification: Option<SummaryClassification>,
    pub conclusion_reason: Option<String>,
    pub navigation_strategy_used: Option<NavStrategy>,
    pub browser_used: Option<BrowserName>,
    pub base_url: Option<String>,
    pub engine_version: Option<String>,
    /// Verbatim text of the failure that decided the run, kept so a human
    /// can audit a misclassification.
    pub raw_failure: Option<String>,

    pub console_messages: Vec<ConsoleEvent>,
    pub page_errors: Vec<PageErrorEvent>,
    pub failed_requests: Vec<RequestFailureEvent>,
    pub server_probes: Vec<ServerProbeEvent>,
    pub navigation_attempts: Vec<NavAttemptEvent>,
    pub navigation_errors: Vec<NavErrorEvent>,
    pub fallback_transitions: Vec<FallbackTransitionEvent>,
    pub browser_launch_attempts: Vec<LaunchAttemptEvent>,
    pub browser_launch_errors: Vec<LaunchErrorEvent>,
    pub binary_checks: Vec<BinaryCheckEvent>,
}

impl RunDiagnostics {
    /// Open a fresh record with artifacts rooted under [`ARTIFACT_DIR`].
    pub fn begin(environment: EnvConfig, working_dir: PathBuf) -> Self {
        let artifact_dir = working_dir.join(ARTIFACT_DIR);
        Self {
            run_id: Uuid::new_v4(),
            harness_version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Utc::now(),
            finished_at: None,
            working_dir,
            artifacts: ArtifactPaths::under(&artifact_dir),
            environment,
            result: RunStatus::Running,
            classification: None,
            conclusion_reason: None,
            navigation_strategy_used: None,
            browser_used: None,
            base_url: None,
            engine_version: None,
            raw_failure: None,
            console_messages: Vec::new(),
            page_errors: Vec::new(),
            failed_requests: Vec::new(),
            server_probes: Vec::new(),
            navigation_attempts: Vec::new(),
            navigation_errors: Vec::new(),
            fallback_transitions: Vec::new(),
            browser_launch_attempts: Vec::new(),
            browser_launch_errors: Vec::new(),
            binary_checks: Vec::new(),
        }
    }

    pub fn push_server_probe(
        &mut self,
        host: &str,
        url: &str,
        ok: bool,
        status: Option<u16>,
        error: Option<String>,
    ) {
        self.server_probes.push(ServerProbeEvent {
            at: Utc::now(),
            host: host.to_string(),
            url: url.to_string(),
            ok,
            status,
            error,
        });
    }

    pub fn push_nav_attempt(&mut self, strategy: NavStrategy, target: &str) {
        self.navigation_attempts.push(NavAttemptEvent {
            at: Utc::now(),
            strategy,
            target: target.to_string(),
        });
    }

    pub fn push_nav_error(&mut self, strategy: NavStrategy, error: &str) {
        self.navigation_errors.push(NavErrorEvent {
            at: Utc::now(),
            strategy,
            error: error.to_string(),
        });
    }

    pub fn push_fallback(&mut self, from: NavStrategy, to: NavStrategy, reason: String) {
        self.fallback_transitions.push(FallbackTransitionEvent {
            at: Utc::now(),
            from,
            to,
            reason,
        });
    }

    pub fn push_launch_attempt(&mut self, browser: BrowserName) {
        self.browser_launch_attempts.push(LaunchAttemptEvent {
            at: Utc::now(),
            browser,
        });
    }

    pub fn push_launch_error(
        &mut self,
        browser: BrowserName,
        error: String,
        classification: FailureClass,
    ) {
        self.browser_launch_errors.push(LaunchErrorEvent {
            at: Utc::now(),
            browser,
            error,
            classification,
        });
    }

    pub fn push_binary_check(&mut self, browser: BrowserName, path: Option<PathBuf>, exists: bool) {
        self.binary_checks.push(BinaryCheckEvent {
            browser,
            path,
            exists,
        });
    }

    /// Record the terminal conclusion. First write wins; a second call is a
    /// no-op and returns `false`.
    pub fn record_conclusion(&mut self, conclusion: &Conclusion) -> bool {
        if self.result != RunStatus::Running {
            return false;
        }
        self.result = conclusion.status;
        self.classification = Some(conclusion.classification);
        self.conclusion_reason = Some(conclusion.reason.clone());
        self.finished_at = Some(Utc::now());
        true
    }

    /// Serialize the record to its artifact path, creating the artifact
    /// directory if needed.
    pub fn persist(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.artifacts.diagnostics.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating artifact directory {}", parent.display()))?;
        }
        let json = serde_json::to_vec_pretty(self).context("serializing diagnostics record")?;
        std::fs::write(&self.artifacts.diagnostics, json).with_context(|| {
            format!(
                "writing diagnostics to {}",
                self.artifacts.diagnostics.display()
            )
        })?;
        Ok(())
    }
}
