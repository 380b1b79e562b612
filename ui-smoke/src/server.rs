//! Preview-server lifecycle: spawn, readiness polling, guaranteed stop.
//!
//! The server process is exclusively owned by [`ServerHandle`]. `stop` is
//! called exactly once on every exit path of the run driver; `kill_on_drop`
//! backstops abnormal unwinds so the child never outlives the harness.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};
use ui_smoke_common::{EnvConfig, RunDiagnostics};

/// Delay between readiness probes.
const PROBE_INTERVAL: Duration = Duration::from_millis(400);

/// Per-request probe timeout.
const PROBE_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Total readiness window per host alias.
const HOST_WINDOW: Duration = Duration::from_secs(12);

/// Grace period between kill and log flush.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Running preview server plus its buffered output.
pub struct ServerHandle {
    child: Child,
    output: Arc<Mutex<Vec<String>>>,
    reader_tasks: Vec<JoinHandle<()>>,
    log_path: PathBuf,
    stopped: bool,
}

impl ServerHandle {
    /// Spawn the static preview server on loopback, buffering its combined
    /// output for later persistence.
    pub fn start(config: &EnvConfig, log_path: PathBuf) -> anyhow::Result<Self> {
        let port = config.port.to_string();
        let mut cmd = Command::new("npm");
        cmd.args(["run", "preview", "--", "--host", "127.0.0.1", "--port", port.as_str(), "--strictPort"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = cmd
            .spawn()
            .context("failed to spawn preview server (`npm run preview`)")?;
        info!(port = config.port, "preview server spawned");

        let output = Arc::new(Mutex::new(Vec::new()));
        let mut reader_tasks = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            reader_tasks.push(spawn_reader(stdout, "stdout", output.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            reader_tasks.push(spawn_reader(stderr, "stderr", output.clone()));
        }

        Ok(Self {
            child,
            output,
            reader_tasks,
            log_path,
            stopped: false,
        })
    }

    /// Poll the configured host aliases in order; the first one that answers
    /// an HTTP HEAD within its window is the selected host for the rest of
    /// the run. Every probe is recorded.
    pub async fn wait_until_ready(
        &mut self,
        config: &EnvConfig,
        diag: &mut RunDiagnostics,
    ) -> Option<String> {
        let client = match reqwest::Client::builder()
            .timeout(PROBE_REQUEST_TIMEOUT)
            .build()
        {
            Ok(client) => client,
            Err(err) => {
                warn!(%err, "could not build readiness probe client");
                return None;
            }
        };

        for host in config.host_aliases.clone() {
            let url = format!("http://{host}:{}/", config.port);
            let deadline = Instant::now() + HOST_WINDOW;
            while Instant::now() < deadline {
                if let Ok(Some(status)) = self.child.try_wait() {
                    diag.push_server_probe(
                        &host,
                        &url,
                        false,
                        None,
                        Some(format!("server process exited early with {status}")),
                    );
                    warn!(%status, "preview server exited before becoming ready");
                    return None;
                }
                match client.head(&url).send().await {
                    Ok(response) => {
                        let status = response.status();
                        diag.push_server_probe(&host, &url, status.is_success(), Some(status.as_u16()), None);
                        info!(%host, %status, "preview server reachable");
                        return Some(host);
                    }
                    Err(err) => {
                        diag.push_server_probe(&host, &url, false, None, Some(err.to_string()));
                        debug!(%host, %err, "readiness probe failed");
                    }
                }
                sleep(PROBE_INTERVAL).await;
            }
        }
        None
    }

    /// Scoped release: terminate the process, allow a brief grace period,
    /// then flush the buffered output to the server log artifact. Safe to
    /// call once; subsequent calls are no-ops.
    pub async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        if let Err(err) = self.child.start_kill() {
            debug!(%err, "preview server already gone at stop");
        }
        if timeout(STOP_GRACE, self.child.wait()).await.is_err() {
            warn!("preview server did not exit within the grace period");
        }
        for task in self.reader_tasks.drain(..) {
            task.abort();
        }

        let lines = match self.output.lock() {
            Ok(lines) => lines.join("\n"),
            Err(_) => String::new(),
        };
        if let Some(parent) = self.log_path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!(%err, "could not create artifact directory for server log");
                return;
            }
        }
        if let Err(err) = std::fs::write(&self.log_path, lines) {
            warn!(%err, path = %self.log_path.display(), "could not write server log");
        } else {
            debug!(path = %self.log_path.display(), "server log flushed");
        }
    }
}

fn spawn_reader(
    stream: impl tokio::io::AsyncRead + Unpin + Send + 'static,
    label: &'static str,
    output: Arc<Mutex<Vec<String>>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Ok(mut buffer) = output.lock() {
                buffer.push(format!("[{label}] {line}"));
            }
        }
    })
}
