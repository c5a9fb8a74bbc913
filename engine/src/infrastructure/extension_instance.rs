//! Extension server instance
//!
//! Owns at most one child process for a configuration and drives the
//! `Inactive -> Connecting -> Active | Error` lifecycle. `start`, `stop` and
//! `retire` on one instance are serialized in the order they were issued;
//! status reads never wait behind them. An `Active` process that exits on its
//! own is reported as `Error` by the next read.

use crate::domain::constants::{
    KILL_CONFIRM_TIMEOUT, PROBATION_DELAY, STDERR_FLUSH_TIMEOUT, STDERR_TAIL_LINES,
    STOP_GRACE_TIMEOUT, STOP_POLL_INTERVAL,
};
use crate::domain::{DomainError, ExtensionConfig, InstanceState, InstanceStatus, Result};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdin, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, error, info, warn};

/// Carries `None` while the child runs, then a description of how it exited.
type ExitWatch = watch::Receiver<Option<String>>;

type StderrTail = Arc<Mutex<VecDeque<String>>>;

/// Delivers a signal to a pid. Replaced in tests to simulate delivery failures.
type Signaller = fn(u32, Signal) -> Result<()>;

struct LiveProcess {
    pid: u32,
    exited: ExitWatch,
    // Held open so stdio-driven servers never observe EOF.
    _stdin: Option<ChildStdin>,
    stderr_tail: StderrTail,
    stderr_drain: JoinHandle<()>,
}

impl LiveProcess {
    fn is_alive(&self) -> bool {
        self.exited.borrow().is_none()
    }

    fn outcome(&self) -> String {
        self.exited.borrow().clone().unwrap_or_default()
    }

    fn stderr_snapshot(&self) -> String {
        let tail = self
            .stderr_tail
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        tail.iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Captured stderr once the process is gone.
    async fn into_stderr(mut self) -> String {
        let _ = timeout(STDERR_FLUSH_TIMEOUT, &mut self.stderr_drain).await;
        self.stderr_snapshot()
    }
}

impl Drop for LiveProcess {
    fn drop(&mut self) {
        // An orphaned grandchild may keep the pipe open forever.
        self.stderr_drain.abort();
    }
}

struct InstanceInner {
    config: ExtensionConfig,
    state: InstanceState,
    last_error: Option<String>,
    process: Option<LiveProcess>,
    retired: bool,
}

pub struct ExtensionInstance {
    id: String,
    lifecycle: tokio::sync::Mutex<()>,
    inner: Mutex<InstanceInner>,
    signaller: Signaller,
}

impl ExtensionInstance {
    pub fn new(config: ExtensionConfig) -> Self {
        Self::with_signaller(config, send_signal)
    }

    fn with_signaller(config: ExtensionConfig, signaller: Signaller) -> Self {
        Self {
            id: config.id.clone(),
            lifecycle: tokio::sync::Mutex::new(()),
            inner: Mutex::new(InstanceInner {
                config,
                state: InstanceState::Inactive,
                last_error: None,
                process: None,
                retired: false,
            }),
            signaller,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> ExtensionConfig {
        self.inner().config.clone()
    }

    /// Swap in an updated configuration. A running process keeps its original
    /// launch parameters; the new ones apply from the next start.
    pub fn rebind(&self, config: ExtensionConfig) {
        debug_assert_eq!(config.id, self.id);
        debug!(extension_id = %self.id, "Rebinding instance to updated config");
        self.inner().config = config;
    }

    pub fn is_running(&self) -> bool {
        let mut inner = self.inner();
        self.note_unexpected_exit(&mut inner);
        inner.process.as_ref().is_some_and(LiveProcess::is_alive)
    }

    /// Set once `retire` succeeded; a retired instance never starts again.
    pub fn is_retired(&self) -> bool {
        self.inner().retired
    }

    pub fn get_status(&self) -> InstanceStatus {
        let mut inner = self.inner();
        self.note_unexpected_exit(&mut inner);
        let pid = inner
            .process
            .as_ref()
            .filter(|p| p.is_alive())
            .map(|p| p.pid);
        InstanceStatus::from_config(&inner.config, inner.state, pid, inner.last_error.clone())
    }

    /// Spawn the configured command unless it is already running, then hold it
    /// through the probation window. Returns whether the instance ended up
    /// `Active`; failures are recorded in `last_error`.
    pub async fn start(&self) -> bool {
        let _op = self.lifecycle.lock().await;

        let config = {
            let mut inner = self.inner();
            if inner.retired {
                debug!(extension_id = %self.id, "Ignoring start of retired instance");
                return false;
            }
            self.note_unexpected_exit(&mut inner);
            if let Some(p) = inner.process.as_ref().filter(|p| p.is_alive()) {
                debug!(extension_id = %self.id, pid = p.pid, "Already running");
                return true;
            }
            inner.process = None;

            if !inner.config.enabled {
                warn!(extension_id = %self.id, "Refusing to start disabled extension server");
                inner.last_error = Some("extension server is disabled".to_string());
                return false;
            }

            self.transition(&mut inner, InstanceState::Connecting);
            inner.config.clone()
        };

        let process = match launch(&config) {
            Ok(process) => process,
            Err(e) => {
                error!(
                    extension_id = %self.id,
                    command = %config.command,
                    error = %e,
                    "Failed to spawn extension server"
                );
                let mut inner = self.inner();
                inner.last_error = Some(e.to_string());
                self.transition(&mut inner, InstanceState::Error);
                return false;
            }
        };

        let pid = process.pid;
        let mut exited = process.exited.clone();
        self.inner().process = Some(process);
        info!(
            extension_id = %self.id,
            pid = pid,
            command = %config.command,
            "Extension server spawned"
        );

        match timeout(PROBATION_DELAY, wait_for_exit(&mut exited)).await {
            Err(_) => {
                let mut inner = self.inner();
                inner.last_error = None;
                self.transition(&mut inner, InstanceState::Active);
                info!(extension_id = %self.id, pid = pid, "Extension server active");
                true
            }
            Ok(outcome) => {
                let process = self.inner().process.take();
                let stderr = match process {
                    Some(process) => process.into_stderr().await,
                    None => String::new(),
                };
                let message = if stderr.trim().is_empty() {
                    format!("process exited during startup ({outcome})")
                } else {
                    stderr
                };
                warn!(
                    extension_id = %self.id,
                    pid = pid,
                    outcome = %outcome,
                    "Extension server exited during probation"
                );

                let mut inner = self.inner();
                inner.last_error = Some(message);
                self.transition(&mut inner, InstanceState::Error);
                false
            }
        }
    }

    /// SIGTERM, poll for exit through the grace period, then SIGKILL.
    ///
    /// Returns `false` only when the process could not be signalled or did not
    /// go away; the instance state is then left untouched.
    pub async fn stop(&self) -> bool {
        let _op = self.lifecycle.lock().await;
        self.terminate().await
    }

    /// Stop for good. Starts queued behind this call, and any later ones, do
    /// nothing. If the process cannot be stopped the instance stays usable.
    pub async fn retire(&self) -> bool {
        let _op = self.lifecycle.lock().await;
        if !self.terminate().await {
            return false;
        }
        self.inner().retired = true;
        debug!(extension_id = %self.id, "Instance retired");
        true
    }

    // Caller holds the lifecycle lock.
    async fn terminate(&self) -> bool {
        let (pid, mut exited) = {
            let mut inner = self.inner();
            self.note_unexpected_exit(&mut inner);
            let live = inner
                .process
                .as_ref()
                .filter(|p| p.is_alive())
                .map(|p| (p.pid, p.exited.clone()));
            match live {
                Some(live) => live,
                None => {
                    inner.process = None;
                    self.transition(&mut inner, InstanceState::Inactive);
                    return true;
                }
            }
        };

        info!(extension_id = %self.id, pid = pid, "Sending SIGTERM");
        if let Err(e) = (self.signaller)(pid, Signal::SIGTERM) {
            error!(extension_id = %self.id, error = %e, "Failed to stop extension server");
            return false;
        }

        if !exited_within(&exited, STOP_GRACE_TIMEOUT).await {
            warn!(
                extension_id = %self.id,
                pid = pid,
                grace_secs = STOP_GRACE_TIMEOUT.as_secs(),
                "Stop timeout reached, sending SIGKILL"
            );
            if let Err(e) = (self.signaller)(pid, Signal::SIGKILL) {
                error!(extension_id = %self.id, error = %e, "Failed to kill extension server");
                return false;
            }
            if timeout(KILL_CONFIRM_TIMEOUT, wait_for_exit(&mut exited))
                .await
                .is_err()
            {
                error!(extension_id = %self.id, pid = pid, "Still running after SIGKILL");
                return false;
            }
        }

        let process = {
            let mut inner = self.inner();
            self.transition(&mut inner, InstanceState::Inactive);
            inner.process.take()
        };
        drop(process);
        info!(extension_id = %self.id, pid = pid, "Extension server stopped");
        true
    }

    /// An `Active` process that has exited becomes `Error`. Probation exits
    /// are left to `start`, which is still waiting on them.
    fn note_unexpected_exit(&self, inner: &mut InstanceInner) {
        if inner.state != InstanceState::Active {
            return;
        }
        let Some(process) = inner.process.take_if(|p| !p.is_alive()) else {
            return;
        };

        let outcome = process.outcome();
        let stderr = process.stderr_snapshot();
        warn!(
            extension_id = %self.id,
            pid = process.pid,
            outcome = %outcome,
            "Extension server exited since it became active"
        );
        inner.last_error = Some(match stderr.lines().last() {
            Some(line) if !line.trim().is_empty() => {
                format!("process exited unexpectedly ({outcome}): {line}")
            }
            _ => format!("process exited unexpectedly ({outcome})"),
        });
        self.transition(inner, InstanceState::Error);
    }

    fn inner(&self) -> MutexGuard<'_, InstanceInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, inner: &mut InstanceInner, next: InstanceState) {
        if !inner.state.can_transition_to(next) {
            warn!(
                extension_id = %self.id,
                from = %inner.state,
                to = %next,
                "Unexpected state transition"
            );
        }
        debug!(extension_id = %self.id, from = %inner.state, to = %next, "State transition");
        inner.state = next;
    }
}

fn launch(config: &ExtensionConfig) -> Result<LiveProcess> {
    let spawn_error = |source| DomainError::Spawn {
        command: config.command.clone(),
        source,
    };

    let mut child = Command::new(&config.command)
        .args(&config.args)
        .env_clear()
        .envs(&config.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(spawn_error)?;

    let Some(pid) = child.id() else {
        return Err(spawn_error(std::io::Error::other(
            "process exited before its pid was read",
        )));
    };

    let stdin = child.stdin.take();
    let stderr_tail: StderrTail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
    let stderr_drain = match child.stderr.take() {
        Some(stderr) => tokio::spawn(drain_stderr(
            config.id.clone(),
            stderr,
            stderr_tail.clone(),
        )),
        None => tokio::spawn(async {}),
    };

    let (exit_tx, exited) = watch::channel(None);
    let id = config.id.clone();
    tokio::spawn(async move {
        let outcome = match child.wait().await {
            Ok(status) => status.to_string(),
            Err(e) => format!("wait failed: {e}"),
        };
        debug!(extension_id = %id, pid = pid, outcome = %outcome, "Child exited");
        let _ = exit_tx.send(Some(outcome));
    });

    Ok(LiveProcess {
        pid,
        exited,
        _stdin: stdin,
        stderr_tail,
        stderr_drain,
    })
}

async fn drain_stderr(id: String, stderr: ChildStderr, tail: StderrTail) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                debug!(extension_id = %id, "stderr: {line}");
                let mut tail = tail.lock().unwrap_or_else(PoisonError::into_inner);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Err(e) => {
                debug!(extension_id = %id, error = %e, "Stopped reading stderr");
                break;
            }
        }
    }
}

async fn wait_for_exit(exited: &mut ExitWatch) -> String {
    match exited.wait_for(Option::is_some).await {
        Ok(outcome) => outcome.as_deref().unwrap_or_default().to_owned(),
        Err(_) => "exit watcher stopped".to_string(),
    }
}

async fn exited_within(exited: &ExitWatch, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    loop {
        if exited.borrow().is_some() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(STOP_POLL_INTERVAL).await;
    }
}

fn send_signal(pid: u32, sig: Signal) -> Result<()> {
    match signal::kill(Pid::from_raw(pid as i32), sig) {
        // Already gone: the exit watcher will report it.
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(source) => Err(DomainError::Signal {
            pid,
            signal: sig,
            source,
        }),
    }
}
