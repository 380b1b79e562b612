//! Shared core for the ui-smoke harness.
//!
//! Everything in this crate is pure and synchronous: the environment
//! snapshot, the failure-text classifiers, the diagnostics record and the
//! conclusion decision table. The browser, server and process plumbing live
//! in the `ui-smoke` binary crate; keeping this side free of them is what
//! makes the policy and classification exhaustively unit-testable.

#![forbid(unsafe_code)]

pub mod classify;
pub mod config;
pub mod diagnostics;
pub mod policy;
pub mod types;

pub use classify::{classify, classify_preflight, is_blocked_download_error};
pub use config::EnvConfig;
pub use diagnostics::{ArtifactPaths, RunDiagnostics, ARTIFACT_DIR};
pub use policy::{conclude, summary_line, Conclusion, RunOutcome, REMEDIATION_ACTION};
pub use types::{BrowserName, FailureClass, NavStrategy, RunStatus, SummaryClassification};
