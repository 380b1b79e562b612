//! Common types shared between the orchestrator and its pure helpers.

use serde::{Deserialize, Serialize};

/// Result state of a smoke run.
///
/// A run starts as `Running` and moves to exactly one terminal state; the
/// transition is enforced by [`crate::diagnostics::RunDiagnostics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Run is still in flight (never persisted as a final state on the happy path).
    Running,
    /// The scripted check completed and produced its artifacts.
    Passed,
    /// A genuine regression (application or connectivity) was observed.
    Failed,
    /// The environment cannot run a browser; not a verdict about the app.
    Skipped,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed taxonomy a raw failure text is classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureClass {
    /// Automation engine or browser binaries absent/unlaunchable.
    BinaryInstallationFailure,
    /// Server or navigation target unreachable.
    ConnectivityFailure,
    /// Browser process crashed or closed unexpectedly.
    BrowserRuntimeFailure,
    /// Page-level error or scripted-interaction failure.
    ApplicationFailure,
    /// Nothing matched and no text was available.
    Unknown,
    /// Unclassified fallback used by the preflight probe.
    UnknownBrowserFailure,
}

impl FailureClass {
    /// Whether a check failure with this classification downgrades the run
    /// to `skipped` (infrastructure unavailability) instead of failing it.
    pub fn skips_by_default(self) -> bool {
        matches!(
            self,
            Self::BinaryInstallationFailure | Self::BrowserRuntimeFailure
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BinaryInstallationFailure => "binary-installation-failure",
            Self::ConnectivityFailure => "connectivity-failure",
            Self::BrowserRuntimeFailure => "browser-runtime-failure",
            Self::ApplicationFailure => "application-failure",
            Self::Unknown => "unknown",
            Self::UnknownBrowserFailure => "unknown-browser-failure",
        }
    }
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification carried by the terminal conclusion and the stdout summary
/// line. Narrower vocabulary than [`FailureClass`]: application-class and
/// unclassifiable check failures both surface as `test-failure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SummaryClassification {
    Success,
    TestFailure,
    BinaryInstallationFailure,
    ConnectivityFailure,
    BrowserRuntimeFailure,
    Unknown,
}

impl SummaryClassification {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::TestFailure => "test-failure",
            Self::BinaryInstallationFailure => "binary-installation-failure",
            Self::ConnectivityFailure => "connectivity-failure",
            Self::BrowserRuntimeFailure => "browser-runtime-failure",
            Self::Unknown => "unknown",
        }
    }
}

impl From<FailureClass> for SummaryClassification {
    fn from(class: FailureClass) -> Self {
        match class {
            FailureClass::BinaryInstallationFailure => Self::BinaryInstallationFailure,
            FailureClass::ConnectivityFailure => Self::ConnectivityFailure,
            FailureClass::BrowserRuntimeFailure => Self::BrowserRuntimeFailure,
            FailureClass::ApplicationFailure => Self::TestFailure,
            FailureClass::Unknown | FailureClass::UnknownBrowserFailure => Self::Unknown,
        }
    }
}

impl std::fmt::Display for SummaryClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Way the target page is presented to the browser, from most realistic to
/// most primitive. Attempted strictly in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavStrategy {
    /// Served URL over loopback HTTP.
    Http,
    /// Direct `file://` navigation to the built page.
    File,
    /// Markup injected into a fresh document.
    Inline,
}

impl NavStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::File => "file",
            Self::Inline => "inline",
        }
    }
}

impl std::fmt::Display for NavStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A launchable browser engine. Order of candidates encodes preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserName {
    /// System Google Chrome.
    Chrome,
    /// Chromium, system or managed build.
    Chromium,
}

impl BrowserName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::Chromium => "chromium",
        }
    }
}

impl std::fmt::Display for BrowserName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
