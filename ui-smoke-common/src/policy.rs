//! Terminal conclusion policy.
//!
//! One decision table maps (environment flags × failure evidence) to the
//! final status and process exit code. The central intent: infrastructure
//! unavailability never fails a build by default, genuine application or
//! connectivity regressions always do. Strict mode flips the skip rows to
//! exit 1 so hardened pipelines can refuse to run blind.

use crate::config::EnvConfig;
use crate::types::{FailureClass, RunStatus, SummaryClassification};
use serde::Serialize;

/// Remediation surfaced in the machine-readable summary line.
pub const REMEDIATION_ACTION: &str = "npx playwright install";

/// Everything the run driver learned, reduced to the one fact the policy
/// table dispatches on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// `PLAYWRIGHT_SKIP_BROWSER_DOWNLOAD` requested an unconditional skip.
    SkipDownloadRequested,
    /// The automation toolchain itself could not be loaded.
    EngineMissing { reason: String },
    /// No browser binary present, even after the on-demand install.
    BinariesMissing { install_blocked: bool, detail: String },
    /// No host alias ever answered a readiness probe.
    ServerUnreachable { detail: String },
    /// Every launch candidate failed.
    BrowserLaunchExhausted { detail: String },
    /// Navigation, the scripted interaction, or artifact capture failed.
    CheckFailed { class: FailureClass, detail: String },
    /// Screenshot and trace captured after a successful scripted click.
    Passed,
}

/// The single terminal verdict of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conclusion {
    pub status: RunStatus,
    pub exit_code: i32,
    pub classification: SummaryClassification,
    pub reason: String,
}

/// Apply the decision table. Pure: same inputs, same conclusion.
pub fn conclude(env: &EnvConfig, outcome: &RunOutcome) -> Conclusion {
    match outcome {
        RunOutcome::SkipDownloadRequested => skip_unless_strict(
            env,
            SummaryClassification::BinaryInstallationFailure,
            "browser download skipped by PLAYWRIGHT_SKIP_BROWSER_DOWNLOAD".to_string(),
        ),
        RunOutcome::EngineMissing { reason } => Conclusion {
            status: RunStatus::Failed,
            exit_code: 1,
            classification: SummaryClassification::BinaryInstallationFailure,
            reason: format!("automation engine unavailable: {reason}"),
        },
        RunOutcome::BinariesMissing {
            install_blocked,
            detail,
        } => conclude_binaries_missing(env, *install_blocked, detail),
        RunOutcome::ServerUnreachable { detail } => Conclusion {
            status: RunStatus::Failed,
            exit_code: 1,
            classification: SummaryClassification::ConnectivityFailure,
            reason: format!("preview server never became reachable: {detail}"),
        },
        RunOutcome::BrowserLaunchExhausted { detail } => Conclusion {
            status: RunStatus::Failed,
            exit_code: 1,
            classification: SummaryClassification::TestFailure,
            reason: format!("no browser candidate could be launched: {detail}"),
        },
        RunOutcome::CheckFailed { class, detail } => {
            if class.skips_by_default() {
                skip_unless_strict(env, (*class).into(), detail.clone())
            } else {
                Conclusion {
                    status: RunStatus::Failed,
                    exit_code: 1,
                    classification: SummaryClassification::TestFailure,
                    reason: detail.clone(),
                }
            }
        }
        RunOutcome::Passed => Conclusion {
            status: RunStatus::Passed,
            exit_code: 0,
            classification: SummaryClassification::Success,
            reason: "scripted check passed".to_string(),
        },
    }
}

fn conclude_binaries_missing(env: &EnvConfig, install_blocked: bool, detail: &str) -> Conclusion {
    let classification = SummaryClassification::BinaryInstallationFailure;
    if env.require_browsers {
        return Conclusion {
            status: RunStatus::Failed,
            exit_code: 1,
            classification,
            reason: format!("browsers required by UI_SMOKE_REQUIRE_BROWSERS but missing: {detail}"),
        };
    }
    if install_blocked {
        return skip_unless_strict(
            env,
            classification,
            format!("browser install blocked by network policy: {detail}"),
        );
    }
    if env.ci && !env.strict {
        return Conclusion {
            status: RunStatus::Skipped,
            exit_code: 0,
            classification,
            reason: format!("browsers unavailable in CI sandbox: {detail}"),
        };
    }
    Conclusion {
        status: RunStatus::Failed,
        exit_code: 1,
        classification,
        reason: format!("browser binaries missing after install attempt: {detail}"),
    }
}

fn skip_unless_strict(
    env: &EnvConfig,
    classification: SummaryClassification,
    reason: String,
) -> Conclusion {
    Conclusion {
        status: RunStatus::Skipped,
        exit_code: if env.strict { 1 } else { 0 },
        classification,
        reason,
    }
}

/// The one machine-readable line external CI systems parse from stdout.
#[derive(Debug, Serialize)]
pub struct SummaryLine<'a> {
    pub ui_smoke: RunStatus,
    pub classification: SummaryClassification,
    pub action: &'static str,
    pub details: &'a serde_json::Value,
}

/// Render the summary as a single JSON line (no trailing newline).
pub fn summary_line(conclusion: &Conclusion, details: &serde_json::Value) -> String {
    let line = SummaryLine {
        ui_smoke: conclusion.status,
        classification: conclusion.classification,
        action: REMEDIATION_ACTION,
        details,
    };
    serde_json::to_string(&line)
        .unwrap_or_else(|_| format!(r#"{{"ui_smoke":"{}"}}"#, conclusion.status))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(strict: bool, ci: bool) -> EnvConfig {
        EnvConfig::from_lookup(|name| match name {
            "PLAYWRIGHT_STRICT" if strict => Some("1".to_string()),
            "CI" if ci => Some("true".to_string()),
            _ => None,
        })
    }

    fn env_require_browsers(ci: bool) -> EnvConfig {
        EnvConfig::from_lookup(|name| match name {
            "UI_SMOKE_REQUIRE_BROWSERS" => Some("1".to_string()),
            "CI" if ci => Some("true".to_string()),
            _ => None,
        })
    }

    #[test]
    fn skip_download_exits_zero_unless_strict() {
        let c = conclude(&env(false, false), &RunOutcome::SkipDownloadRequested);
        assert_eq!((c.status, c.exit_code), (RunStatus::Skipped, 0));
        let c = conclude(&env(true, false), &RunOutcome::SkipDownloadRequested);
        assert_eq!((c.status, c.exit_code), (RunStatus::Skipped, 1));
        assert_eq!(
            c.classification,
            SummaryClassification::BinaryInstallationFailure
        );
    }

    #[test]
    fn engine_missing_always_fails() {
        for (strict, ci) in [(false, false), (true, false), (false, true), (true, true)] {
            let c = conclude(
                &env(strict, ci),
                &RunOutcome::EngineMissing {
                    reason: "npx not found".to_string(),
                },
            );
            assert_eq!((c.status, c.exit_code), (RunStatus::Failed, 1));
            assert_eq!(
                c.classification,
                SummaryClassification::BinaryInstallationFailure
            );
        }
    }

    #[test]
    fn blocked_install_skips_unless_strict() {
        let outcome = RunOutcome::BinariesMissing {
            install_blocked: true,
            detail: "403 from cdn".to_string(),
        };
        let c = conclude(&env(false, false), &outcome);
        assert_eq!((c.status, c.exit_code), (RunStatus::Skipped, 0));
        let c = conclude(&env(true, true), &outcome);
        assert_eq!((c.status, c.exit_code), (RunStatus::Skipped, 1));
    }

    #[test]
    fn missing_binaries_in_relaxed_ci_skip_with_exit_zero() {
        let outcome = RunOutcome::BinariesMissing {
            install_blocked: false,
            detail: "chromium absent".to_string(),
        };
        let c = conclude(&env(false, true), &outcome);
        assert_eq!((c.status, c.exit_code), (RunStatus::Skipped, 0));
    }

    #[test]
    fn missing_binaries_fail_outside_relaxed_ci() {
        let outcome = RunOutcome::BinariesMissing {
            install_blocked: false,
            detail: "chromium absent".to_string(),
        };
        let c = conclude(&env(false, false), &outcome);
        assert_eq!((c.status, c.exit_code), (RunStatus::Failed, 1));
        let c = conclude(&env(true, true), &outcome);
        assert_eq!((c.status, c.exit_code), (RunStatus::Failed, 1));
    }

    #[test]
    fn require_browsers_overrides_every_skip_row_for_missing_binaries() {
        for ci in [false, true] {
            for blocked in [false, true] {
                let c = conclude(
                    &env_require_browsers(ci),
                    &RunOutcome::BinariesMissing {
                        install_blocked: blocked,
                        detail: "gone".to_string(),
                    },
                );
                assert_eq!((c.status, c.exit_code), (RunStatus::Failed, 1));
            }
        }
    }

    #[test]
    fn unreachable_server_is_a_connectivity_failure() {
        let c = conclude(
            &env(false, true),
            &RunOutcome::ServerUnreachable {
                detail: "no alias answered".to_string(),
            },
        );
        assert_eq!((c.status, c.exit_code), (RunStatus::Failed, 1));
        assert_eq!(c.classification, SummaryClassification::ConnectivityFailure);
    }

    #[test]
    fn launch_exhaustion_fails_as_test_failure() {
        let c = conclude(
            &env(false, false),
            &RunOutcome::BrowserLaunchExhausted {
                detail: "all candidates failed".to_string(),
            },
        );
        assert_eq!((c.status, c.exit_code), (RunStatus::Failed, 1));
        assert_eq!(c.classification, SummaryClassification::TestFailure);
    }

    #[test]
    fn infrastructure_class_check_failures_downgrade_to_skip() {
        for class in [
            FailureClass::BinaryInstallationFailure,
            FailureClass::BrowserRuntimeFailure,
        ] {
            let outcome = RunOutcome::CheckFailed {
                class,
                detail: "browser fell over".to_string(),
            };
            let c = conclude(&env(false, false), &outcome);
            assert_eq!((c.status, c.exit_code), (RunStatus::Skipped, 0));
            let c = conclude(&env(true, false), &outcome);
            assert_eq!((c.status, c.exit_code), (RunStatus::Skipped, 1));
        }
    }

    #[test]
    fn application_and_connectivity_check_failures_always_fail() {
        for class in [
            FailureClass::ApplicationFailure,
            FailureClass::ConnectivityFailure,
            FailureClass::Unknown,
        ] {
            let c = conclude(
                &env(false, true),
                &RunOutcome::CheckFailed {
                    class,
                    detail: "boom".to_string(),
                },
            );
            assert_eq!((c.status, c.exit_code), (RunStatus::Failed, 1));
            assert_eq!(c.classification, SummaryClassification::TestFailure);
        }
    }

    #[test]
    fn pass_exits_zero_with_success_classification() {
        let c = conclude(&env(true, true), &RunOutcome::Passed);
        assert_eq!((c.status, c.exit_code), (RunStatus::Passed, 0));
        assert_eq!(c.classification, SummaryClassification::Success);
    }

    #[test]
    fn summary_line_is_single_line_json_with_contract_fields() {
        let c = conclude(&env(false, false), &RunOutcome::Passed);
        let details = serde_json::json!({"browser": "chromium"});
        let line = summary_line(&c, &details);
        assert!(!line.contains('\n'));
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["ui_smoke"], "passed");
        assert_eq!(parsed["classification"], "success");
        assert_eq!(parsed["action"], "npx playwright install");
        assert_eq!(parsed["details"]["browser"], "chromium");
    }
}
