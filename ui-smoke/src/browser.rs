//! Browser launch and the scripted check.
//!
//! Candidates are tried in strict sequential order; the first engine that
//! launches is used for the whole run. Launches are hardened for constrained
//! containers (sandbox off, no GPU, no /dev/shm reliance) and emulate a
//! mobile device profile. Page-level signals — console output, uncaught
//! exceptions, failed sub-resource requests — are captured for the life of
//! the page and folded into the diagnostics record whatever the outcome.

use crate::navigate;
use crate::prober;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{EventLoadingFailed, EventRequestWillBeSent};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::js_protocol::runtime::{
    EventConsoleApiCalled, EventExceptionThrown, ExceptionDetails, RemoteObject,
};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use chrono::Utc;
use futures::StreamExt;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use ui_smoke_common::classify::classify;
use ui_smoke_common::config::APP_CLICK_SELECTOR;
use ui_smoke_common::diagnostics::{ConsoleEvent, PageErrorEvent, RequestFailureEvent};
use ui_smoke_common::{BrowserName, EnvConfig, FailureClass, RunDiagnostics, RunOutcome};

/// Settle delay after navigation, before the scripted interaction.
const SETTLE_AFTER_NAV: Duration = Duration::from_millis(1500);

/// Settle delay after the scripted interaction, before capture.
const SETTLE_AFTER_CLICK: Duration = Duration::from_millis(1200);

/// Per-operation CDP request timeout.
const NAV_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Flags for running inside constrained containers.
const HARDENING_ARGS: [&str; 5] = [
    "--disable-gpu",
    "--disable-dev-shm-usage",
    "--disable-setuid-sandbox",
    "--hide-scrollbars",
    "--mute-audio",
];

/// Static document rendered to prove the browser works before the app runs.
const SANITY_HTML: &str = "<!doctype html><html><head><meta charset=\"utf-8\">\
<title>sanity</title></head><body><h1 id=\"sanity-probe\">browser up</h1></body></html>";

/// Reference mobile-device emulation profile.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ViewportProfile {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
    pub mobile: bool,
    pub touch: bool,
}

pub const MOBILE_EMULATION: ViewportProfile = ViewportProfile {
    width: 390,
    height: 844,
    device_scale_factor: 3.0,
    mobile: true,
    touch: true,
};

fn cdp_viewport() -> Viewport {
    Viewport {
        width: MOBILE_EMULATION.width,
        height: MOBILE_EMULATION.height,
        device_scale_factor: Some(MOBILE_EMULATION.device_scale_factor),
        emulating_mobile: MOBILE_EMULATION.mobile,
        is_landscape: false,
        has_touch: MOBILE_EMULATION.touch,
    }
}

/// A live browser: the CDP handle plus its message-pump task.
pub struct LaunchedBrowser {
    pub name: BrowserName,
    browser: Browser,
    handler_task: JoinHandle<()>,
}

impl LaunchedBrowser {
    /// Close the browser and reap both the process and the message pump.
    pub async fn shutdown(mut self) {
        if let Err(err) = self.browser.close().await {
            debug!(%err, "browser close returned an error");
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
    }
}

async fn launch(name: BrowserName, executable: &Path) -> Result<LaunchedBrowser, String> {
    let config = BrowserConfig::builder()
        .chrome_executable(executable)
        .no_sandbox()
        .args(HARDENING_ARGS)
        .viewport(cdp_viewport())
        .request_timeout(NAV_REQUEST_TIMEOUT)
        .build()?;
    let (browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|err| err.to_string())?;
    let handler_task = tokio::spawn(async move {
        while let Some(message) = handler.next().await {
            if message.is_err() {
                break;
            }
        }
    });
    Ok(LaunchedBrowser {
        name,
        browser,
        handler_task,
    })
}

/// Minimal viability check used by the preflight probe: launch, open a blank
/// page, shut down.
pub async fn trial_launch(name: BrowserName, executable: &Path) -> Result<(), String> {
    let launched = launch(name, executable).await?;
    let result = launched
        .browser
        .new_page("about:blank")
        .await
        .map(|_| ())
        .map_err(|err| err.to_string());
    launched.shutdown().await;
    result
}

/// Launch the first viable candidate and run the scripted check against the
/// app. The browser is released before this returns, on every path.
pub async fn run_checks(config: &EnvConfig, diag: &mut RunDiagnostics, host: &str) -> RunOutcome {
    let mut last_error = String::from("no browser candidates configured");
    let mut live: Option<LaunchedBrowser> = None;
    for name in config.browser_candidates() {
        diag.push_launch_attempt(name);
        let Some(path) = prober::resolve_executable(name) else {
            let error = "executable not found".to_string();
            diag.push_launch_error(name, error.clone(), FailureClass::BinaryInstallationFailure);
            last_error = format!("{name}: {error}");
            continue;
        };
        match launch(name, &path).await {
            Ok(browser) => {
                info!(%name, path = %path.display(), "browser launched");
                live = Some(browser);
                break;
            }
            Err(error) => {
                let class = classify(&error);
                warn!(%name, %error, "browser launch failed");
                diag.push_launch_error(name, error.clone(), class);
                last_error = format!("{name}: {error}");
            }
        }
    }
    let Some(launched) = live else {
        return RunOutcome::BrowserLaunchExhausted { detail: last_error };
    };
    diag.browser_used = Some(launched.name);

    let outcome = scripted_check(&launched, config, diag, host).await;
    launched.shutdown().await;
    outcome
}

async fn scripted_check(
    launched: &LaunchedBrowser,
    config: &EnvConfig,
    diag: &mut RunDiagnostics,
    host: &str,
) -> RunOutcome {
    // Prove the browser itself renders before blaming the app for anything.
    if let Err(error) = sanity_render(launched, &diag.artifacts.sanity_screenshot).await {
        diag.raw_failure = Some(error.clone());
        return RunOutcome::CheckFailed {
            class: classify(&error),
            detail: format!("sanity render failed: {error}"),
        };
    }
    debug!("sanity render captured");

    let page = match launched.browser.new_page("about:blank").await {
        Ok(page) => page,
        Err(err) => {
            let error = err.to_string();
            diag.raw_failure = Some(error.clone());
            return RunOutcome::CheckFailed {
                class: classify(&error),
                detail: format!("could not open app page: {error}"),
            };
        }
    };
    let sink = PageEventSink::attach(&page).await;

    let outcome = match navigate::navigate(&page, config, host, diag).await {
        Ok(result) => {
            diag.navigation_strategy_used = Some(result.strategy);
            diag.base_url = Some(result.base_url.clone());
            info!(strategy = %result.strategy, base = %result.base_url, "app page loaded");
            sleep(SETTLE_AFTER_NAV).await;
            match click_known_control(&page).await {
                Ok(()) => {
                    sleep(SETTLE_AFTER_CLICK).await;
                    match capture_app_screenshot(&page, &diag.artifacts.screenshot).await {
                        Ok(()) => RunOutcome::Passed,
                        Err(error) => {
                            diag.raw_failure = Some(error.clone());
                            RunOutcome::CheckFailed {
                                class: classify(&error),
                                detail: format!("screenshot capture failed: {error}"),
                            }
                        }
                    }
                }
                Err(error) => {
                    diag.raw_failure = Some(error.clone());
                    RunOutcome::CheckFailed {
                        class: classify(&error),
                        detail: format!("scripted interaction failed: {error}"),
                    }
                }
            }
        }
        Err(failure) => {
            diag.raw_failure = Some(failure.message.clone());
            RunOutcome::CheckFailed {
                class: failure.class,
                detail: failure.to_string(),
            }
        }
    };

    sink.drain_into(diag);
    write_trace_bundle(diag);
    outcome
}

async fn sanity_render(launched: &LaunchedBrowser, out: &Path) -> Result<(), String> {
    let page = launched
        .browser
        .new_page("about:blank")
        .await
        .map_err(|err| err.to_string())?;
    page.set_content(SANITY_HTML)
        .await
        .map_err(|err| err.to_string())?;
    let png = page
        .screenshot(
            ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .full_page(false)
                .build(),
        )
        .await
        .map_err(|err| err.to_string())?;
    write_artifact(out, &png)
}

async fn click_known_control(page: &Page) -> Result<(), String> {
    let element = page
        .find_element(APP_CLICK_SELECTOR)
        .await
        .map_err(|err| format!("control {APP_CLICK_SELECTOR} not found: {err}"))?;
    element
        .click()
        .await
        .map_err(|err| format!("click on {APP_CLICK_SELECTOR} failed: {err}"))?;
    Ok(())
}

async fn capture_app_screenshot(page: &Page, out: &Path) -> Result<(), String> {
    let png = page
        .screenshot(
            ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .full_page(true)
                .build(),
        )
        .await
        .map_err(|err| err.to_string())?;
    write_artifact(out, &png)
}

fn write_artifact(path: &Path, bytes: &[u8]) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|err| format!("creating {}: {err}", parent.display()))?;
    }
    std::fs::write(path, bytes).map_err(|err| format!("writing {}: {err}", path.display()))
}

/// The trace bundle: ordered page-event streams plus navigation history, in
/// the engine-native JSON form. Best-effort; a write failure must not change
/// the verdict.
fn write_trace_bundle(diag: &RunDiagnostics) {
    let bundle = serde_json::json!({
        "run_id": diag.run_id,
        "browser": diag.browser_used,
        "strategy": diag.navigation_strategy_used,
        "base_url": diag.base_url,
        "console": diag.console_messages,
        "page_errors": diag.page_errors,
        "failed_requests": diag.failed_requests,
        "navigation": {
            "attempts": diag.navigation_attempts,
            "errors": diag.navigation_errors,
            "transitions": diag.fallback_transitions,
        },
    });
    let path = &diag.artifacts.trace;
    let payload = match serde_json::to_vec_pretty(&bundle) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(%err, "could not serialize trace bundle");
            return;
        }
    };
    if let Err(err) = write_artifact(path, &payload) {
        warn!(%err, "could not write trace bundle");
    }
}

/// Continuous page-event capture. Listener tasks push into shared buffers;
/// the buffers are folded into the diagnostics record once the page is done.
struct PageEventSink {
    console: Arc<Mutex<Vec<ConsoleEvent>>>,
    page_errors: Arc<Mutex<Vec<PageErrorEvent>>>,
    failed_requests: Arc<Mutex<Vec<RequestFailureEvent>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl PageEventSink {
    async fn attach(page: &Page) -> Self {
        let console: Arc<Mutex<Vec<ConsoleEvent>>> = Arc::default();
        let page_errors: Arc<Mutex<Vec<PageErrorEvent>>> = Arc::default();
        let failed_requests: Arc<Mutex<Vec<RequestFailureEvent>>> = Arc::default();
        let request_urls: Arc<Mutex<HashMap<String, String>>> = Arc::default();
        let mut tasks = Vec::new();

        match page.event_listener::<EventConsoleApiCalled>().await {
            Ok(mut stream) => {
                let buffer = console.clone();
                tasks.push(tokio::spawn(async move {
                    while let Some(event) = stream.next().await {
                        let level = format!("{:?}", event.r#type).to_lowercase();
                        let text = event
                            .args
                            .iter()
                            .map(remote_object_text)
                            .collect::<Vec<_>>()
                            .join(" ");
                        if let Ok(mut buffer) = buffer.lock() {
                            buffer.push(ConsoleEvent {
                                at: Utc::now(),
                                level,
                                text,
                            });
                        }
                    }
                }));
            }
            Err(err) => debug!(%err, "console listener unavailable"),
        }

        match page.event_listener::<EventExceptionThrown>().await {
            Ok(mut stream) => {
                let buffer = page_errors.clone();
                tasks.push(tokio::spawn(async move {
                    while let Some(event) = stream.next().await {
                        let text = exception_text(&event.exception_details);
                        if let Ok(mut buffer) = buffer.lock() {
                            buffer.push(PageErrorEvent {
                                at: Utc::now(),
                                text,
                            });
                        }
                    }
                }));
            }
            Err(err) => debug!(%err, "exception listener unavailable"),
        }

        match page.event_listener::<EventRequestWillBeSent>().await {
            Ok(mut stream) => {
                let urls = request_urls.clone();
                tasks.push(tokio::spawn(async move {
                    while let Some(event) = stream.next().await {
                        if let Ok(mut urls) = urls.lock() {
                            urls.insert(
                                event.request_id.inner().to_string(),
                                event.request.url.clone(),
                            );
                        }
                    }
                }));
            }
            Err(err) => debug!(%err, "request listener unavailable"),
        }

        match page.event_listener::<EventLoadingFailed>().await {
            Ok(mut stream) => {
                let buffer = failed_requests.clone();
                let urls = request_urls.clone();
                tasks.push(tokio::spawn(async move {
                    while let Some(event) = stream.next().await {
                        let url = urls
                            .lock()
                            .ok()
                            .and_then(|urls| urls.get(event.request_id.inner()).cloned());
                        if let Ok(mut buffer) = buffer.lock() {
                            buffer.push(RequestFailureEvent {
                                at: Utc::now(),
                                url,
                                error: event.error_text.clone(),
                            });
                        }
                    }
                }));
            }
            Err(err) => debug!(%err, "loading-failure listener unavailable"),
        }

        Self {
            console,
            page_errors,
            failed_requests,
            tasks,
        }
    }

    fn drain_into(mut self, diag: &mut RunDiagnostics) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Ok(mut buffer) = self.console.lock() {
            diag.console_messages.append(&mut buffer);
        }
        if let Ok(mut buffer) = self.page_errors.lock() {
            diag.page_errors.append(&mut buffer);
        }
        if let Ok(mut buffer) = self.failed_requests.lock() {
            diag.failed_requests.append(&mut buffer);
        }
    }
}

fn remote_object_text(object: &RemoteObject) -> String {
    if let Some(value) = &object.value {
        value.to_string()
    } else if let Some(description) = &object.description {
        description.clone()
    } else {
        "<object>".to_string()
    }
}

fn exception_text(details: &ExceptionDetails) -> String {
    let mut text = details
        .exception
        .as_ref()
        .and_then(|exception| exception.description.clone())
        .unwrap_or_else(|| details.text.clone());
    if let Some(url) = &details.url {
        text.push_str(&format!(" ({url}:{})", details.line_number));
    }
    text
}
