//! Window-search capture on an X11 display.
//!
//! The subject window is located with `xdotool search --onlyvisible --name` and grabbed with
//! ImageMagick `import -window <id> png:-`. The PNG is decoded straight from stdout; nothing
//! touches disk.

use image::RgbaImage;
use std::process::{Command, Output};
use std::thread;
use std::time::Instant;
use tracing::{debug, info};

use super::{Capture, CaptureConfig, CaptureResult, FrameCapturer};
use crate::error::CaptureError;
use crate::supervisor::SubjectRun;

/// Captures the subject window's contents from the session display
#[derive(Debug, Clone)]
pub struct WindowSearchCapturer {
    env: Vec<(String, String)>,
    config: CaptureConfig,
}

impl WindowSearchCapturer {
    /// `env` binds the utilities to the display (normally the session's `DISPLAY`)
    pub fn new(env: Vec<(String, String)>, config: CaptureConfig) -> Self {
        Self { env, config }
    }

    fn run(&self, program: &str, args: &[&str]) -> CaptureResult<Output> {
        Command::new(program)
            .args(args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .output()
            .map_err(|source| CaptureError::Spawn {
                program: program.to_string(),
                source,
            })
    }

    /// Poll for a visible window whose name contains `title`
    pub fn find_window(&self, title: &str) -> CaptureResult<String> {
        let pattern = escape_title(title);
        let started = Instant::now();
        let deadline = started + self.config.window_timeout();
        let program = self.config.search_program.as_str();

        loop {
            let output = self.run(program, &["search", "--onlyvisible", "--name", &pattern])?;
            // xdotool exits 1 when nothing matches
            if let Some(id) = parse_window_ids(&String::from_utf8_lossy(&output.stdout)).into_iter().next() {
                debug!(title, window = %id, waited_ms = started.elapsed().as_millis() as u64, "window found");
                return Ok(id);
            }
            if output.status.code().is_some_and(|c| c > 1) {
                return Err(CaptureError::UtilityFailed {
                    program: program.to_string(),
                    exit_code: output.status.code(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(CaptureError::WindowNotFound {
                    title: title.to_string(),
                    waited: started.elapsed(),
                });
            }
            thread::sleep(self.config.retry_interval().min(deadline - now));
        }
    }

    /// Grab one window as an RGBA raster
    pub fn grab(&self, window: &str) -> CaptureResult<RgbaImage> {
        let program = self.config.grab_program.as_str();
        let output = self.run(program, &["-window", window, "png:-"])?;
        if !output.status.success() {
            return Err(CaptureError::UtilityFailed {
                program: program.to_string(),
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let decoded = image::load_from_memory_with_format(&output.stdout, image::ImageFormat::Png)?;
        Ok(decoded.to_rgba8())
    }
}

impl FrameCapturer for WindowSearchCapturer {
    fn capture(&mut self, subject: &SubjectRun, title_hint: &str) -> CaptureResult<Capture> {
        let window = self.find_window(title_hint)?;
        let image = self.grab(&window)?;
        info!(
            scenario = subject.scenario(),
            window = %window,
            width = image.width(),
            height = image.height(),
            "window captured"
        );
        Capture::new(image, self.source_type())
    }

    fn source_type(&self) -> &str {
        "x11"
    }
}

/// Window ids printed by `xdotool search`, one per line
fn parse_window_ids(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && line.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .collect()
}

/// `xdotool --name` takes a regex; match the title literally
fn escape_title(title: &str) -> String {
    let mut escaped = String::with_capacity(title.len());
    for c in title.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_window_ids() {
        assert_eq!(parse_window_ids("4194305\n4194318\n"), vec!["4194305", "4194318"]);
        assert!(parse_window_ids("").is_empty());
        assert!(parse_window_ids("Defaulting to search window name\n").is_empty());
    }

    #[test]
    fn test_escape_title() {
        assert_eq!(escape_title("System Tests"), "System Tests");
        assert_eq!(escape_title("Tests (debug) v1.2"), "Tests \\(debug\\) v1\\.2");
    }

    #[cfg(unix)]
    #[test]
    fn test_find_window_times_out() {
        let capturer = WindowSearchCapturer::new(
            Vec::new(),
            CaptureConfig {
                window_timeout_ms: 100,
                retry_interval_ms: 20,
                // prints nothing and exits 1, like xdotool without a match
                search_program: "false".to_string(),
                ..CaptureConfig::default()
            },
        );
        match capturer.find_window("System Tests") {
            Err(CaptureError::WindowNotFound { title, waited }) => {
                assert_eq!(title, "System Tests");
                assert!(waited.as_millis() >= 100);
            }
            other => panic!("expected WindowNotFound, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_utility_is_spawn_error() {
        let capturer = WindowSearchCapturer::new(
            Vec::new(),
            CaptureConfig {
                search_program: "/nonexistent/xdotool".to_string(),
                ..CaptureConfig::default()
            },
        );
        assert!(matches!(
            capturer.find_window("System Tests"),
            Err(CaptureError::Spawn { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_grab_failure_reports_utility() {
        let capturer = WindowSearchCapturer::new(
            Vec::new(),
            CaptureConfig {
                grab_program: "false".to_string(),
                ..CaptureConfig::default()
            },
        );
        assert!(matches!(
            capturer.grab("12345"),
            Err(CaptureError::UtilityFailed { exit_code: Some(1), .. })
        ));
    }
}
