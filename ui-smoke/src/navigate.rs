//! Navigation strategy engine.
//!
//! A three-state fallback machine, attempted in fixed order, each state a
//! more primitive way of presenting the page to the browser:
//!
//! 1. `http` — the served URL over loopback. Off by default: HTTP
//!    navigation is unreliable inside namespace-isolated browser sandboxes,
//!    so it must be opted into with `UI_SMOKE_ALLOW_HTTP=1`.
//! 2. `file` — direct `file://` navigation to the built entry page.
//! 3. `inline` — markup injected into a fresh document, with the document
//!    base rewritten to the built app's directory so relative resources
//!    still resolve.
//!
//! Retry policy is data-driven per state. HTTP abandonment falls through
//! only on connectivity-class errors; anything else propagates so an app
//! bug cannot masquerade as a navigation problem. FILE falls through to
//! INLINE on any terminal error; INLINE is deterministic and never retried.

use chromiumoxide::Page;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};
use ui_smoke_common::classify::classify;
use ui_smoke_common::config::{APP_DIST_DIR, APP_INDEX_FILE};
use ui_smoke_common::{EnvConfig, FailureClass, NavStrategy, RunDiagnostics};

/// Reason recorded when HTTP is skipped without being attempted.
pub const HTTP_DISABLED_REASON: &str =
    "http navigation disabled by default (set UI_SMOKE_ALLOW_HTTP=1 to enable)";

/// Per-strategy retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: u32,
}

/// The transition table's retry column.
pub fn retry_policy(strategy: NavStrategy) -> RetryPolicy {
    match strategy {
        NavStrategy::Http => RetryPolicy {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(500),
            multiplier: 2,
        },
        NavStrategy::File => RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(500),
            multiplier: 2,
        },
        // Direct content injection is deterministic; a retry would only
        // repeat the same failure.
        NavStrategy::Inline => RetryPolicy {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            multiplier: 1,
        },
    }
}

/// Terminal navigation failure, carrying the strategy that gave up and the
/// classification of its last error.
#[derive(Debug, thiserror::Error)]
#[error("{strategy} navigation failed: {message}")]
pub struct NavFailure {
    pub strategy: NavStrategy,
    pub class: FailureClass,
    pub message: String,
}

/// Successful navigation: the strategy that worked and the base it loaded.
#[derive(Debug, Clone)]
pub struct NavResult {
    pub strategy: NavStrategy,
    pub base_url: String,
}

/// Drive the fallback machine until one strategy completes navigation.
pub async fn navigate(
    page: &Page,
    config: &EnvConfig,
    host: &str,
    diag: &mut RunDiagnostics,
) -> Result<NavResult, NavFailure> {
    let working_dir = diag.working_dir.clone();

    let http_url = format!("http://{host}:{}/", config.port);
    if !config.allow_http {
        diag.push_fallback(
            NavStrategy::Http,
            NavStrategy::File,
            HTTP_DISABLED_REASON.to_string(),
        );
    } else {
        match attempt_with_retries(page, NavStrategy::Http, &http_url, diag).await {
            Ok(()) => {
                return Ok(NavResult {
                    strategy: NavStrategy::Http,
                    base_url: http_url,
                });
            }
            Err(message) => {
                let class = classify(&message);
                if class == FailureClass::ConnectivityFailure {
                    diag.push_fallback(
                        NavStrategy::Http,
                        NavStrategy::File,
                        format!("http navigation abandoned after retries: {message}"),
                    );
                } else {
                    // Not a connectivity problem: do not mask it behind a
                    // more primitive strategy.
                    return Err(NavFailure {
                        strategy: NavStrategy::Http,
                        class,
                        message,
                    });
                }
            }
        }
    }

    let index_path = app_index_path(&working_dir);
    let file_url = format!("file://{}", index_path.display());
    match attempt_with_retries(page, NavStrategy::File, &file_url, diag).await {
        Ok(()) => {
            return Ok(NavResult {
                strategy: NavStrategy::File,
                base_url: file_url,
            });
        }
        Err(message) => {
            diag.push_fallback(
                NavStrategy::File,
                NavStrategy::Inline,
                format!("file navigation failed: {message}"),
            );
        }
    }

    let target = format!("inline:{APP_INDEX_FILE}");
    diag.push_nav_attempt(NavStrategy::Inline, &target);
    match inline_render(page, &working_dir).await {
        Ok(()) => Ok(NavResult {
            strategy: NavStrategy::Inline,
            base_url: target,
        }),
        Err(message) => {
            diag.push_nav_error(NavStrategy::Inline, &message);
            let class = classify(&message);
            Err(NavFailure {
                strategy: NavStrategy::Inline,
                class,
                message,
            })
        }
    }
}

async fn attempt_with_retries(
    page: &Page,
    strategy: NavStrategy,
    target: &str,
    diag: &mut RunDiagnostics,
) -> Result<(), String> {
    let policy = retry_policy(strategy);
    let mut backoff = policy.initial_backoff;
    let mut last_error = String::new();
    for attempt in 0..policy.max_attempts {
        if attempt > 0 {
            warn!(
                %strategy,
                attempt = attempt + 1,
                max = policy.max_attempts,
                backoff_ms = backoff.as_millis() as u64,
                "retrying navigation"
            );
            sleep(backoff).await;
            backoff = backoff.saturating_mul(policy.multiplier);
        }
        diag.push_nav_attempt(strategy, target);
        match page.goto(target).await {
            Ok(_) => {
                debug!(%strategy, target, "navigation succeeded");
                return Ok(());
            }
            Err(err) => {
                last_error = err.to_string();
                diag.push_nav_error(strategy, &last_error);
            }
        }
    }
    Err(last_error)
}

/// Read the entry markup and inject it into the live document, rebasing
/// relative resource loads onto the built app's directory.
async fn inline_render(page: &Page, working_dir: &Path) -> Result<(), String> {
    let index_path = app_index_path(working_dir);
    let markup = match std::fs::read_to_string(&index_path) {
        Ok(markup) => markup,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(format!(
                "entry page {} is missing (is the app built?)",
                index_path.display()
            ));
        }
        Err(err) => {
            return Err(format!(
                "entry page {} unreadable: {err}",
                index_path.display()
            ));
        }
    };
    let dist_root = index_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| working_dir.join(APP_DIST_DIR));
    let href = format!("file://{}/", dist_root.display());
    let html = inject_base_href(&markup, &href);
    page.set_content(html)
        .await
        .map_err(|err| err.to_string())?;
    Ok(())
}

fn app_index_path(working_dir: &Path) -> PathBuf {
    let joined = working_dir.join(APP_INDEX_FILE);
    std::fs::canonicalize(&joined).unwrap_or(joined)
}

/// Insert a `<base href>` right after the opening `<head>` tag, or prepend
/// one when the markup has no head element.
pub fn inject_base_href(html: &str, href: &str) -> String {
    let base_tag = format!("<base href=\"{href}\">");
    if let Some(insert_at) = head_insertion_point(html) {
        let mut out = String::with_capacity(html.len() + base_tag.len());
        out.push_str(&html[..insert_at]);
        out.push_str(&base_tag);
        out.push_str(&html[insert_at..]);
        out
    } else {
        format!("{base_tag}{html}")
    }
}

/// Byte offset just past the `>` of the opening head tag, matched
/// ASCII-case-insensitively. `<header>` must not match.
fn head_insertion_point(html: &str) -> Option<usize> {
    let bytes = html.as_bytes();
    let needle = b"<head";
    let start = bytes
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
        .filter(|&idx| {
            matches!(
                bytes.get(idx + needle.len()),
                Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r')
            )
        })?;
    let close = html[start..].find('>')?;
    Some(start + close + 1)
}
