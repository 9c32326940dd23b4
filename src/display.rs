//! Display session management.
//!
//! One session hosts every scenario of a run. On X11 platforms it owns a background Xvfb
//! process; on Windows the native desktop is used and no process is started.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::capture::Platform;
use crate::config;
use crate::error::SessionOpenError;
use crate::supervisor::{Settle, SettleOutcome, Termination, terminate_child};

/// Name of the screen-0 framebuffer file Xvfb writes under `-fbdir`
pub const XVFB_SCREEN0: &str = "Xvfb_screen0";

/// Virtual display settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Display server binary
    pub program: String,
    /// Display number (`:N`)
    pub number: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    /// Extra server arguments
    pub extra_args: Vec<String>,
    /// Wait after spawning the server
    pub settle: Settle,
    /// Grace period before a forced kill on close (ms)
    pub grace_ms: u64,
    /// Command polled until it succeeds when `settle` is `poll` (e.g. `xdpyinfo`)
    pub ready_probe: Vec<String>,
    /// Command run once after the display is ready; output is logged (e.g. `glxinfo`)
    pub diagnostics: Vec<String>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        let cfg = config::get();
        Self {
            program: "Xvfb".to_string(),
            number: cfg.display.number,
            width: cfg.display.width,
            height: cfg.display.height,
            depth: cfg.display.depth,
            extra_args: ["-nolisten", "tcp", "-nolisten", "unix"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            settle: Settle::fixed(cfg.timing.display_settle),
            grace_ms: cfg.timing.grace.as_millis() as u64,
            ready_probe: Vec::new(),
            diagnostics: Vec::new(),
        }
    }
}

impl DisplayConfig {
    /// Display name as used in `DISPLAY`
    pub fn display_name(&self) -> String {
        format!(":{}", self.number)
    }

    /// Server command line (without the program)
    pub fn server_args(&self, fbdir: Option<&Path>) -> Vec<String> {
        let mut args = vec![
            self.display_name(),
            "-screen".to_string(),
            "0".to_string(),
            format!("{}x{}x{}", self.width, self.height, self.depth),
        ];
        if let Some(dir) = fbdir {
            args.push("-fbdir".to_string());
            args.push(dir.to_string_lossy().into_owned());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// The provisioned capture surface for a whole run
#[derive(Debug)]
pub struct DisplaySession {
    process: Option<Child>,
    display: Option<String>,
    framebuffer: Option<PathBuf>,
    grace: Duration,
    opened: Instant,
}

impl DisplaySession {
    /// Start the display surface for `platform`.
    ///
    /// Returns as soon as the server is spawned; call [`DisplaySession::wait_ready`] before
    /// the first draw. `scratch` receives the framebuffer file on `x11-framebuffer`.
    pub fn open(
        config: &DisplayConfig,
        platform: Platform,
        scratch: &Path,
    ) -> Result<Self, SessionOpenError> {
        if !platform.supported_on_host() {
            return Err(SessionOpenError::UnsupportedPlatform(platform.to_string()));
        }
        if !platform.uses_virtual_display() {
            info!(%platform, "using native desktop");
            return Ok(Self::native());
        }

        let fbdir = platform.uses_framebuffer().then(|| scratch.join("framebuffer"));
        if let Some(dir) = &fbdir {
            std::fs::create_dir_all(dir).map_err(|source| SessionOpenError::Spawn {
                program: config.program.clone(),
                source,
            })?;
        }

        let args = config.server_args(fbdir.as_deref());
        let child = Command::new(&config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| SessionOpenError::Spawn {
                program: config.program.clone(),
                source,
            })?;

        info!(
            program = %config.program,
            pid = child.id(),
            display = %config.display_name(),
            args = %args.join(" "),
            "display server spawned"
        );

        Ok(Self {
            process: Some(child),
            display: Some(config.display_name()),
            framebuffer: fbdir.map(|dir| dir.join(XVFB_SCREEN0)),
            grace: Duration::from_millis(config.grace_ms),
            opened: Instant::now(),
        })
    }

    /// Session on the native desktop (no background process)
    pub fn native() -> Self {
        Self {
            process: None,
            display: None,
            framebuffer: None,
            grace: Duration::ZERO,
            opened: Instant::now(),
        }
    }

    /// Display identifier, if this is a virtual session
    pub fn display(&self) -> Option<&str> {
        self.display.as_deref()
    }

    /// Framebuffer file mapped by the server, if any
    pub fn framebuffer(&self) -> Option<&Path> {
        self.framebuffer.as_deref()
    }

    /// Environment that binds a child process to this session
    pub fn env(&self) -> Vec<(String, String)> {
        self.display
            .iter()
            .map(|d| ("DISPLAY".to_string(), d.clone()))
            .collect()
    }

    /// Wait until the surface accepts draws.
    ///
    /// Fails only if the server died. A poll that never succeeds is logged and treated as
    /// settled, matching the fixed-delay behavior.
    pub fn wait_ready(
        &mut self,
        settle: Settle,
        ready_probe: &[String],
    ) -> Result<SettleOutcome, SessionOpenError> {
        if self.process.is_none() {
            return Ok(SettleOutcome::Slept);
        }

        let deadline = self.opened + settle.budget();
        let interval = match settle {
            Settle::Poll { interval_ms, .. } => Duration::from_millis(interval_ms.max(1)),
            Settle::Fixed { .. } => Duration::from_millis(50),
        };

        loop {
            self.check_alive()?;
            if let Settle::Poll { .. } = settle {
                if self.probe(ready_probe) {
                    let waited = self.opened.elapsed();
                    info!(waited_ms = waited.as_millis() as u64, "display ready");
                    return Ok(SettleOutcome::Ready(waited));
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(match settle {
                    Settle::Fixed { .. } => SettleOutcome::Slept,
                    Settle::Poll { .. } => {
                        warn!(budget = ?settle.budget(), "display readiness not confirmed, continuing");
                        SettleOutcome::TimedOut
                    }
                });
            }
            thread::sleep(interval.min(deadline - now));
        }
    }

    fn check_alive(&mut self) -> Result<(), SessionOpenError> {
        if let Some(child) = self.process.as_mut() {
            if let Ok(Some(status)) = child.try_wait() {
                self.process = None;
                return Err(SessionOpenError::ExitedEarly {
                    status: status.to_string(),
                });
            }
        }
        Ok(())
    }

    fn probe(&self, ready_probe: &[String]) -> bool {
        if let Some(fb) = &self.framebuffer {
            if !fb.exists() {
                return false;
            }
        }
        match ready_probe.split_first() {
            Some((program, args)) => Command::new(program)
                .args(args)
                .envs(self.env())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|s| s.success())
                .unwrap_or(false),
            None => self.framebuffer.is_some(),
        }
    }

    /// Run a diagnostics command against the session and log its output
    pub fn run_diagnostics(&self, command: &[String]) {
        let Some((program, args)) = command.split_first() else {
            return;
        };
        match Command::new(program).args(args).envs(self.env()).output() {
            Ok(output) => {
                debug!(
                    program = %program,
                    status = %output.status,
                    stdout = %String::from_utf8_lossy(&output.stdout),
                    stderr = %String::from_utf8_lossy(&output.stderr),
                    "display diagnostics"
                );
                if !output.status.success() {
                    warn!(program = %program, status = %output.status, "diagnostics command failed");
                }
            }
            Err(err) => warn!(program = %program, error = %err, "diagnostics command could not run"),
        }
    }

    /// Stop the display server. Problems are logged, never returned.
    pub fn close(mut self) -> Option<Termination> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Option<Termination> {
        let mut child = self.process.take()?;
        let outcome = terminate_child(&mut child, self.grace, "display");
        match outcome {
            Termination::Killed(_) => warn!(?outcome, "display server did not exit cleanly"),
            _ => info!(?outcome, "display server stopped"),
        }
        Some(outcome)
    }
}

impl Drop for DisplaySession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
