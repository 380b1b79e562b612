//! Failure-text classification.
//!
//! Heuristic, best-effort mapping of raw error text onto the closed failure
//! taxonomy. Kept as pure functions over strings so the signature corpus can
//! be tested exhaustively without ever starting a browser.
//!
//! Priority order is load-bearing: installation signatures are checked
//! before connectivity, connectivity before runtime crashes. Ambiguous text
//! (a timeout reported while a browser was dying) resolves deterministically
//! toward the more actionable classification. Raw text is never discarded by
//! callers; the classification rides alongside it in diagnostics.

use crate::types::FailureClass;
use regex::{RegexSet, RegexSetBuilder};
use std::sync::LazyLock;

/// Missing engine package, missing browser executable, or install guidance
/// in the message.
static BINARY_SIGNATURES: LazyLock<RegexSet> = LazyLock::new(|| {
    build_set(&[
        r"executable (doesn't|does not) exist",
        r"executable not found",
        r"no such file or directory",
        r"os error 2",
        r"browser is not (installed|downloaded)",
        r"playwright install",
        r"please run.*install",
        r"cannot find (package|module)",
        r"err_module_not_found",
        r"command not found",
        r"program not found",
    ])
});

/// Server or navigation target unreachable.
static CONNECTIVITY_SIGNATURES: LazyLock<RegexSet> = LazyLock::new(|| {
    build_set(&[
        r"connection refused",
        r"econnrefused",
        r"err_connection_refused",
        r"err_connection_reset",
        r"err_empty_response",
        r"empty (response|reply)",
        r"navigation timeout",
        r"timed? out",
        r"timeout \d+\s*ms exceeded",
        r"err_address_unreachable",
        r"err_name_not_resolved",
        r"err_internet_disconnected",
    ])
});

/// Browser process died underneath us.
static RUNTIME_SIGNATURES: LazyLock<RegexSet> = LazyLock::new(|| {
    build_set(&[
        r"target closed",
        r"session closed",
        r"browser closed",
        r"disconnected",
        r"crash(ed)?",
        r"segmentation fault",
        r"sigsegv",
    ])
});

/// Install output phrases that point at a blocked download path rather than
/// a broken installer.
static BLOCKED_DOWNLOAD_SIGNATURES: LazyLock<RegexSet> = LazyLock::new(|| {
    build_set(&[
        r"\b403\b",
        r"forbidden",
        r"\bcdn\b",
        r"\bdns\b",
        r"getaddrinfo",
        r"enotfound",
        r"eai_again",
        r"econnreset",
        r"connection reset",
        r"network",
    ])
});

fn build_set(patterns: &[&str]) -> RegexSet {
    RegexSetBuilder::new(patterns)
        .case_insensitive(true)
        .build()
        .expect("static classifier patterns compile")
}

/// Classify a raw failure text (message plus stack, concatenated).
///
/// Falls back to [`FailureClass::ApplicationFailure`]: once infrastructure
/// signatures are ruled out, an unrecognized error during the check is
/// treated as the app's problem, not the environment's.
pub fn classify(raw: &str) -> FailureClass {
    classify_with_fallback(raw, FailureClass::ApplicationFailure)
}

/// Preflight variant: nothing app-related runs during a probe, so the
/// fallback is [`FailureClass::UnknownBrowserFailure`].
pub fn classify_preflight(raw: &str) -> FailureClass {
    classify_with_fallback(raw, FailureClass::UnknownBrowserFailure)
}

fn classify_with_fallback(raw: &str, fallback: FailureClass) -> FailureClass {
    let text = raw.trim();
    if text.is_empty() {
        return match fallback {
            FailureClass::ApplicationFailure => FailureClass::Unknown,
            other => other,
        };
    }
    if BINARY_SIGNATURES.is_match(text) {
        FailureClass::BinaryInstallationFailure
    } else if CONNECTIVITY_SIGNATURES.is_match(text) {
        FailureClass::ConnectivityFailure
    } else if RUNTIME_SIGNATURES.is_match(text) {
        FailureClass::BrowserRuntimeFailure
    } else {
        fallback
    }
}

/// Heuristic over install-command output: does it look like the download
/// itself was blocked (corporate proxy, no outbound network, CDN refusal)?
///
/// Deliberately not part of the main taxonomy — it only disambiguates
/// "install failed because the network policy forbids it" from "install
/// failed for some other reason", and only over installer output.
pub fn is_blocked_download_error(output: &str) -> bool {
    BLOCKED_DOWNLOAD_SIGNATURES.is_match(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn installation_signatures_classify_as_binary() {
        let corpus = [
            "browserType.launch: Executable doesn't exist at /root/.cache/ms-playwright/chromium-1140/chrome-linux/chrome",
            "Failed to launch browser: No such file or directory (os error 2)",
            "npx: command not found",
            "Cannot find package 'playwright' imported from smoke.mjs",
            "Error [ERR_MODULE_NOT_FOUND]: Cannot find module 'playwright'",
            "Looks like Playwright was just installed. Please run the following command: npx playwright install",
            "chromium is not downloaded, run install first",
        ];
        for text in corpus {
            assert_eq!(
                classify(text),
                FailureClass::BinaryInstallationFailure,
                "misclassified: {text}"
            );
        }
    }

    #[test]
    fn connectivity_signatures_classify_as_connectivity() {
        let corpus = [
            "net::ERR_CONNECTION_REFUSED at http://127.0.0.1:4173/",
            "connect ECONNREFUSED 127.0.0.1:4173",
            "page.goto: net::ERR_EMPTY_RESPONSE",
            "Navigation timeout of 30000 ms exceeded",
            "request timed out after 2000ms",
            "net::ERR_NAME_NOT_RESOLVED at http://localhost:4173/",
        ];
        for text in corpus {
            assert_eq!(
                classify(text),
                FailureClass::ConnectivityFailure,
                "misclassified: {text}"
            );
        }
    }

    #[test]
    fn runtime_signatures_classify_as_runtime() {
        let corpus = [
            "Target closed",
            "Protocol error (Page.captureScreenshot): Session closed. Most likely the page has been closed.",
            "browser has disconnected",
            "Chromium crashed with signal 11",
            "received segmentation fault during render",
        ];
        for text in corpus {
            assert_eq!(
                classify(text),
                FailureClass::BrowserRuntimeFailure,
                "misclassified: {text}"
            );
        }
    }

    #[test]
    fn unrecognized_text_falls_back_to_application_failure() {
        assert_eq!(
            classify("TypeError: Cannot read properties of undefined (reading 'totals')"),
            FailureClass::ApplicationFailure
        );
    }

    #[test]
    fn preflight_falls_back_to_unknown_browser_failure() {
        assert_eq!(
            classify_preflight("some entirely novel failure"),
            FailureClass::UnknownBrowserFailure
        );
        // Shared priority tiers still apply.
        assert_eq!(
            classify_preflight("Target closed"),
            FailureClass::BrowserRuntimeFailure
        );
    }

    #[test]
    fn empty_text_is_unknown() {
        assert_eq!(classify(""), FailureClass::Unknown);
        assert_eq!(classify("   \n"), FailureClass::Unknown);
        assert_eq!(classify_preflight(""), FailureClass::UnknownBrowserFailure);
    }

    #[test]
    fn installation_takes_priority_over_connectivity_and_runtime() {
        // A timeout reported while the executable was missing must surface
        // the actionable install problem, not the timeout.
        let text = "Navigation timeout of 30000 ms exceeded; executable doesn't exist; target closed";
        assert_eq!(classify(text), FailureClass::BinaryInstallationFailure);
    }

    #[test]
    fn connectivity_takes_priority_over_runtime() {
        let text = "net::ERR_CONNECTION_REFUSED, after which the target closed";
        assert_eq!(classify(text), FailureClass::ConnectivityFailure);
    }

    #[test]
    fn blocked_download_corpus() {
        let blocked = [
            "Error: Download failed: server returned code 403. URL: https://cdn.playwright.dev/builds/chromium",
            "getaddrinfo ENOTFOUND cdn.playwright.dev",
            "read ECONNRESET while downloading",
            "DNS lookup failed for playwright.azureedge.net",
            "network is unreachable",
            "access to this domain is forbidden by policy",
        ];
        for text in blocked {
            assert!(is_blocked_download_error(text), "not flagged: {text}");
        }
        let not_blocked = [
            "ENOSPC: no space left on device",
            "installer exited with code 1",
            "",
        ];
        for text in not_blocked {
            assert!(!is_blocked_download_error(text), "wrongly flagged: {text}");
        }
    }

    proptest! {
        #[test]
        fn classify_is_total_and_never_panics(s in ".*") {
            let class = classify(&s);
            // The main classifier never yields the preflight-only fallback.
            prop_assert_ne!(class, FailureClass::UnknownBrowserFailure);
        }

        #[test]
        fn preflight_never_yields_application_failure(s in ".*") {
            let class = classify_preflight(&s);
            prop_assert_ne!(class, FailureClass::ApplicationFailure);
            prop_assert_ne!(class, FailureClass::Unknown);
        }

        #[test]
        fn blocked_download_never_panics(s in ".*") {
            let _ = is_blocked_download_error(&s);
        }
    }
}
