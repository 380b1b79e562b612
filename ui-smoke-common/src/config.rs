//! Environment-driven run configuration.
//!
//! The harness takes no CLI arguments for the smoke pass itself; everything
//! is controlled by environment variables so that CI systems can steer it
//! without touching the invocation. The snapshot is captured once at process
//! start and never mutated afterwards.

use crate::types::BrowserName;
use serde::{Deserialize, Serialize};

/// Default preview-server port (the bundler's preview default).
pub const DEFAULT_PORT: u16 = 4173;

/// Loopback aliases polled for readiness, in selection order.
pub const HOST_ALIASES: [&str; 2] = ["127.0.0.1", "localhost"];

/// Directory the built application is served from (and navigated to in the
/// file/inline fallback strategies).
pub const APP_DIST_DIR: &str = "dist";

/// Entry page of the built application, relative to the working directory.
pub const APP_INDEX_FILE: &str = "dist/index.html";

/// Known interactive control the scripted check clicks once.
pub const APP_CLICK_SELECTOR: &str = "#add-entry-button";

/// Read-only environment snapshot for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvConfig {
    /// Preview-server port (`UI_SMOKE_PORT`, default 4173).
    pub port: u16,
    /// Whether the HTTP navigation strategy is enabled (`UI_SMOKE_ALLOW_HTTP=1`).
    pub allow_http: bool,
    /// Strict mode: infrastructure unavailability exits 1 (`PLAYWRIGHT_STRICT=1`).
    pub strict: bool,
    /// Unconditional early skip (`PLAYWRIGHT_SKIP_BROWSER_DOWNLOAD=1|true`).
    pub skip_download: bool,
    /// CI indicator (`CI=true`): one browser candidate, relaxed strictness.
    pub ci: bool,
    /// Treat missing browser binaries as a failure even in non-strict CI
    /// (`UI_SMOKE_REQUIRE_BROWSERS=1`).
    pub require_browsers: bool,
    /// Host aliases polled for server readiness, in selection order.
    pub host_aliases: Vec<String>,
}

impl EnvConfig {
    /// Capture the snapshot from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the snapshot from an arbitrary variable lookup. Test seam: the
    /// parsing rules are exercised without mutating process state.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = lookup("UI_SMOKE_PORT")
            .and_then(|v| v.trim().parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);
        Self {
            port,
            allow_http: flag_is(&lookup, "UI_SMOKE_ALLOW_HTTP", &["1"]),
            strict: flag_is(&lookup, "PLAYWRIGHT_STRICT", &["1"]),
            skip_download: flag_is(&lookup, "PLAYWRIGHT_SKIP_BROWSER_DOWNLOAD", &["1", "true"]),
            ci: flag_is(&lookup, "CI", &["true"]),
            require_browsers: flag_is(&lookup, "UI_SMOKE_REQUIRE_BROWSERS", &["1"]),
            host_aliases: HOST_ALIASES.iter().map(|h| (*h).to_string()).collect(),
        }
    }

    /// Ordered launch candidates. Outside CI the system Chrome build is
    /// preferred for fidelity; CI is narrowed to the single hardened engine.
    pub fn browser_candidates(&self) -> Vec<BrowserName> {
        if self.ci {
            vec![BrowserName::Chromium]
        } else {
            vec![BrowserName::Chrome, BrowserName::Chromium]
        }
    }

    /// Targets passed to the single on-demand install invocation.
    pub fn install_targets(&self) -> &'static [&'static str] {
        if self.ci {
            &["chromium"]
        } else {
            &["chromium", "chrome"]
        }
    }
}

fn flag_is<F>(lookup: &F, name: &str, truthy: &[&str]) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| truthy.contains(&v.trim()))
        .unwrap_or(false)
}
