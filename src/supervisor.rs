//! Subject process supervision.
//!
//! A [`SubjectRun`] is one live invocation of the test binary. It always reaches a terminal
//! state: either through an explicit [`SubjectRun::terminate`] or, failing that, on drop.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config;
use crate::error::LaunchError;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long to wait for a freshly started process before touching its output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Settle {
    /// Sleep for a fixed time
    Fixed { ms: u64 },
    /// Poll a readiness probe every `interval_ms`, giving up after `timeout_ms`
    Poll { interval_ms: u64, timeout_ms: u64 },
}

impl Settle {
    pub fn fixed(duration: Duration) -> Self {
        Settle::Fixed {
            ms: duration.as_millis() as u64,
        }
    }

    /// Upper bound on time spent settling
    pub fn budget(&self) -> Duration {
        match *self {
            Settle::Fixed { ms } => Duration::from_millis(ms),
            Settle::Poll { timeout_ms, .. } => Duration::from_millis(timeout_ms),
        }
    }

    fn interval(&self) -> Duration {
        match *self {
            Settle::Fixed { .. } => POLL_INTERVAL,
            Settle::Poll { interval_ms, .. } => Duration::from_millis(interval_ms.max(1)),
        }
    }
}

/// Result of a settle wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Fixed delay elapsed
    Slept,
    /// Readiness probe succeeded after the given time
    Ready(Duration),
    /// Probe never succeeded within the budget
    TimedOut,
    /// Process exited while settling
    Exited,
}

/// How a supervised process reached its terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Process had already exited before any stop request
    AlreadyExited(ExitStatus),
    /// Process honored the stop request within the grace period
    Graceful(ExitStatus),
    /// Process was force-killed; status is absent if the final wait failed
    Killed(Option<ExitStatus>),
}

/// Stop a child: graceful request first, forced kill after `grace`.
///
/// Never fails; problems are logged and escalated.
pub fn terminate_child(child: &mut Child, grace: Duration, label: &str) -> Termination {
    let pid = child.id();
    match child.try_wait() {
        Ok(Some(status)) => {
            debug!(label, pid, %status, "process already exited");
            return Termination::AlreadyExited(status);
        }
        Ok(None) => {}
        Err(err) => warn!(label, pid, error = %err, "failed to poll process"),
    }

    if request_stop(child) {
        if let Some(status) = wait_timeout(child, grace) {
            debug!(label, pid, %status, "process stopped gracefully");
            return Termination::Graceful(status);
        }
        warn!(label, pid, grace_ms = grace.as_millis() as u64, "stop request not honored, killing");
    }

    if let Err(err) = child.kill() {
        debug!(label, pid, error = %err, "kill failed");
    }
    match child.wait() {
        Ok(status) => Termination::Killed(Some(status)),
        Err(err) => {
            warn!(label, pid, error = %err, "failed to reap killed process");
            Termination::Killed(None)
        }
    }
}

#[cfg(unix)]
fn request_stop(child: &Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM).is_ok()
}

#[cfg(not(unix))]
fn request_stop(_child: &Child) -> bool {
    false
}

/// Poll `try_wait` until the process exits or `timeout` passes
pub fn wait_timeout(child: &mut Child, timeout: Duration) -> Option<ExitStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) => {}
            Err(_) => return None,
        }
        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

/// Subject launch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubjectConfig {
    /// Arguments passed to the test binary
    pub args: Vec<String>,
    /// Extra environment (e.g. software GL switches)
    pub env: BTreeMap<String, String>,
    /// Title substring identifying the subject's window
    pub window_title: String,
    /// Wait between launch and capture
    pub settle: Settle,
    /// Grace period between stop request and forced kill (ms)
    pub grace_ms: u64,
    /// Working directory of the subject
    pub working_dir: Option<PathBuf>,
}

impl Default for SubjectConfig {
    fn default() -> Self {
        let cfg = config::get();
        Self {
            args: Vec::new(),
            env: BTreeMap::new(),
            window_title: config::DEFAULT_WINDOW_TITLE.to_string(),
            settle: Settle::fixed(cfg.timing.settle),
            grace_ms: cfg.timing.grace.as_millis() as u64,
            working_dir: None,
        }
    }
}

/// Launches subject processes bound to the display session
#[derive(Debug, Clone)]
pub struct Supervisor {
    config: SubjectConfig,
    display_env: Vec<(String, String)>,
}

impl Supervisor {
    pub fn new(config: SubjectConfig, display_env: Vec<(String, String)>) -> Self {
        Self {
            config,
            display_env,
        }
    }

    pub fn config(&self) -> &SubjectConfig {
        &self.config
    }

    /// Spawn the binary and return immediately.
    ///
    /// `workspace` is the scenario's private directory; it receives the subject log and the
    /// ready marker.
    pub fn launch(
        &self,
        scenario: &str,
        binary: &Path,
        workspace: &Path,
    ) -> Result<SubjectRun, LaunchError> {
        let spawn_err = |source: std::io::Error| LaunchError::Spawn {
            binary: binary.to_path_buf(),
            source,
        };

        fs::create_dir_all(workspace).map_err(spawn_err)?;
        let ready_marker = workspace.join("ready");
        let _ = fs::remove_file(&ready_marker);

        let log = File::create(workspace.join("subject.log")).map_err(spawn_err)?;
        let log_err = log.try_clone().map_err(spawn_err)?;

        let mut cmd = Command::new(binary);
        cmd.args(&self.config.args)
            .envs(self.display_env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .envs(&self.config.env)
            .env(config::READY_FILE_ENV, &ready_marker)
            .stdin(Stdio::null())
            .stdout(log)
            .stderr(log_err);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(spawn_err)?;
        let started = Instant::now();
        info!(scenario, pid = child.id(), binary = %binary.display(), "subject launched");

        Ok(SubjectRun {
            scenario: scenario.to_string(),
            child,
            started,
            settle_deadline: started + self.config.settle.budget(),
            settle: self.config.settle,
            ready_marker,
            grace: Duration::from_millis(self.config.grace_ms),
            outcome: None,
        })
    }
}

/// One live invocation of the test binary
#[derive(Debug)]
pub struct SubjectRun {
    scenario: String,
    child: Child,
    started: Instant,
    settle_deadline: Instant,
    settle: Settle,
    ready_marker: PathBuf,
    grace: Duration,
    outcome: Option<Termination>,
}

impl SubjectRun {
    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Monotonic launch time
    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn settle_deadline(&self) -> Instant {
        self.settle_deadline
    }

    /// Path exported to the subject as its ready marker
    pub fn ready_marker(&self) -> &Path {
        &self.ready_marker
    }

    /// Exit status if the process is no longer running
    pub fn exit_status(&mut self) -> Option<ExitStatus> {
        match self.outcome {
            Some(Termination::AlreadyExited(s) | Termination::Graceful(s)) => Some(s),
            Some(Termination::Killed(s)) => s,
            None => self.child.try_wait().ok().flatten(),
        }
    }

    /// Fail if the subject has already exited
    pub fn ensure_alive(&mut self) -> Result<(), LaunchError> {
        match self.exit_status() {
            Some(status) => Err(LaunchError::ExitedEarly {
                status: status.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Wait until the subject should be renderable.
    ///
    /// `Fixed` sleeps until the settle deadline. `Poll` waits for the ready marker and
    /// returns `TimedOut` at the deadline; callers capture anyway.
    pub fn settle(&mut self) -> SettleOutcome {
        let interval = self.settle.interval();
        loop {
            if self.exit_status().is_some() {
                return SettleOutcome::Exited;
            }
            if let Settle::Poll { .. } = self.settle {
                if self.ready_marker.exists() {
                    return SettleOutcome::Ready(self.started.elapsed());
                }
            }
            let now = Instant::now();
            if now >= self.settle_deadline {
                return match self.settle {
                    Settle::Fixed { .. } => SettleOutcome::Slept,
                    Settle::Poll { .. } => SettleOutcome::TimedOut,
                };
            }
            thread::sleep(interval.min(self.settle_deadline - now));
        }
    }

    /// Stop the subject. Idempotent; never fails.
    pub fn terminate(&mut self) -> Termination {
        if let Some(outcome) = self.outcome {
            return outcome;
        }
        let outcome = terminate_child(&mut self.child, self.grace, &self.scenario);
        info!(
            scenario = %self.scenario,
            pid = self.child.id(),
            alive_ms = self.started.elapsed().as_millis() as u64,
            ?outcome,
            "subject terminated"
        );
        self.outcome = Some(outcome);
        outcome
    }
}

impl Drop for SubjectRun {
    fn drop(&mut self) {
        if self.outcome.is_none() {
            self.terminate();
        }
    }
}
