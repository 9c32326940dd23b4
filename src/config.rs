//! Configuration management with environment variable support.
//!
//! Compiled defaults can be overridden through the environment; the suite manifest and
//! CLI flags sit on top of these values.
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `VISREG_ARTIFACT_DIR` | Base directory for run artifacts | `./visreg-artifacts` |
//! | `VISREG_DISPLAY` | Virtual display number | `99` |
//! | `VISREG_RESOLUTION` | Virtual screen geometry (`WxHxD`) | `768x512x24` |
//! | `VISREG_SETTLE_MS` | Settle delay after launching a subject (ms) | `3000` |
//! | `VISREG_GRACE_MS` | Grace period before a forced kill (ms) | `2000` |
//! | `VISREG_FUZZ_PERCENT` | Per-channel fuzz tolerance (percent of channel range) | `5` |
//! | `VISREG_PLATFORM` | Capture platform (`x11`, `x11-framebuffer`, `windows`) | host dependent |
//!
//! # Example
//!
//! ```bash
//! export VISREG_DISPLAY=42
//! export VISREG_SETTLE_MS=1000
//! visreg run --manifest visreg.json
//! ```

use std::env;
use std::sync::OnceLock;
use std::time::Duration;

// ============================================================================
// Default Values
// ============================================================================

/// Default artifact base directory
pub const DEFAULT_ARTIFACT_DIR: &str = "./visreg-artifacts";

/// Default virtual display number
pub const DEFAULT_DISPLAY_NUMBER: u32 = 99;

/// Default virtual screen width (pixels)
pub const DEFAULT_SCREEN_WIDTH: u32 = 768;

/// Default virtual screen height (pixels)
pub const DEFAULT_SCREEN_HEIGHT: u32 = 512;

/// Default virtual screen color depth (bits)
pub const DEFAULT_SCREEN_DEPTH: u32 = 24;

/// Default settle delay after launching a subject (milliseconds)
pub const DEFAULT_SETTLE_MS: u64 = 3000;

/// Default settle delay after opening the display session (milliseconds)
pub const DEFAULT_DISPLAY_SETTLE_MS: u64 = 1000;

/// Default grace period between a stop request and a forced kill (milliseconds)
pub const DEFAULT_GRACE_MS: u64 = 2000;

/// Default per-channel fuzz tolerance, in percent of the channel range
pub const DEFAULT_FUZZ_PERCENT: f64 = 5.0;

/// Default pass threshold for `max-percent` scenarios
pub const DEFAULT_THRESHOLD_PERCENT: f64 = 5.0;

/// Default bound on the subject window lookup (milliseconds)
pub const DEFAULT_WINDOW_TIMEOUT_MS: u64 = 5000;

/// Default window title hint of the subject application
pub const DEFAULT_WINDOW_TITLE: &str = "System Tests";

/// Default substitution token in build descriptor templates
pub const DEFAULT_TEMPLATE_TOKEN: &str = "{TEST_CASE}";

/// Environment variable handed to the subject naming its ready-marker file
pub const READY_FILE_ENV: &str = "VISREG_READY_FILE";

// ============================================================================
// Environment Variable Names
// ============================================================================

/// Environment variable for the artifact directory
pub const ENV_ARTIFACT_DIR: &str = "VISREG_ARTIFACT_DIR";

/// Environment variable for the virtual display number
pub const ENV_DISPLAY: &str = "VISREG_DISPLAY";

/// Environment variable for the virtual screen geometry
pub const ENV_RESOLUTION: &str = "VISREG_RESOLUTION";

/// Environment variable for the subject settle delay
pub const ENV_SETTLE_MS: &str = "VISREG_SETTLE_MS";

/// Environment variable for the termination grace period
pub const ENV_GRACE_MS: &str = "VISREG_GRACE_MS";

/// Environment variable for the fuzz tolerance
pub const ENV_FUZZ_PERCENT: &str = "VISREG_FUZZ_PERCENT";

/// Environment variable for the capture platform
pub const ENV_PLATFORM: &str = "VISREG_PLATFORM";

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Environment-level defaults for a run
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Base directory for run artifacts
    pub artifact_dir: String,
    /// Virtual display settings
    pub display: DisplaySettings,
    /// Subject process timing
    pub timing: TimingSettings,
    /// Per-channel fuzz tolerance in percent
    pub fuzz_percent: f64,
    /// Platform name, if set in the environment
    pub platform: Option<String>,
}

/// Virtual display geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySettings {
    /// Display number (`:N`)
    pub number: u32,
    /// Screen width in pixels
    pub width: u32,
    /// Screen height in pixels
    pub height: u32,
    /// Color depth in bits
    pub depth: u32,
}

/// Process timing settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingSettings {
    /// Settle delay after launching the subject
    pub settle: Duration,
    /// Settle delay after opening the display
    pub display_settle: Duration,
    /// Grace period before a forced kill
    pub grace: Duration,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::defaults();
        let (width, height, depth) = env::var(ENV_RESOLUTION)
            .ok()
            .and_then(|s| parse_resolution(&s))
            .unwrap_or((defaults.display.width, defaults.display.height, defaults.display.depth));

        Self {
            artifact_dir: env::var(ENV_ARTIFACT_DIR).unwrap_or(defaults.artifact_dir),
            display: DisplaySettings {
                number: env_parse(ENV_DISPLAY).unwrap_or(DEFAULT_DISPLAY_NUMBER),
                width,
                height,
                depth,
            },
            timing: TimingSettings {
                settle: env_parse(ENV_SETTLE_MS)
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.timing.settle),
                display_settle: defaults.timing.display_settle,
                grace: env_parse(ENV_GRACE_MS)
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.timing.grace),
            },
            fuzz_percent: env_parse::<f64>(ENV_FUZZ_PERCENT)
                .filter(|p| (0.0..=100.0).contains(p))
                .unwrap_or(DEFAULT_FUZZ_PERCENT),
            platform: env::var(ENV_PLATFORM).ok().filter(|s| !s.is_empty()),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            artifact_dir: DEFAULT_ARTIFACT_DIR.to_string(),
            display: DisplaySettings {
                number: DEFAULT_DISPLAY_NUMBER,
                width: DEFAULT_SCREEN_WIDTH,
                height: DEFAULT_SCREEN_HEIGHT,
                depth: DEFAULT_SCREEN_DEPTH,
            },
            timing: TimingSettings {
                settle: Duration::from_millis(DEFAULT_SETTLE_MS),
                display_settle: Duration::from_millis(DEFAULT_DISPLAY_SETTLE_MS),
                grace: Duration::from_millis(DEFAULT_GRACE_MS),
            },
            fuzz_percent: DEFAULT_FUZZ_PERCENT,
            platform: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

/// Parse a screen geometry string.
/// Supports "WxHxD" (e.g. "768x512x24") and "WxH" (depth defaults to 24).
pub fn parse_resolution(value: &str) -> Option<(u32, u32, u32)> {
    let parts: Vec<&str> = value.trim().split('x').collect();
    let (w, h, d) = match parts.as_slice() {
        [w, h] => (w.parse().ok()?, h.parse().ok()?, DEFAULT_SCREEN_DEPTH),
        [w, h, d] => (w.parse().ok()?, h.parse().ok()?, d.parse().ok()?),
        _ => return None,
    };
    if w == 0 || h == 0 || !matches!(d, 8 | 16 | 24 | 32) {
        return None;
    }
    Some((w, h, d))
}

/// Convert a fuzz percentage into an absolute per-channel allowance (0..=255)
pub fn fuzz_from_percent(percent: f64) -> u8 {
    (percent.clamp(0.0, 100.0) / 100.0 * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolution() {
        assert_eq!(parse_resolution("768x512x24"), Some((768, 512, 24)));
        assert_eq!(parse_resolution("1024x768"), Some((1024, 768, 24)));
        assert_eq!(parse_resolution(" 640x480x16 "), Some((640, 480, 16)));
    }

    #[test]
    fn test_parse_resolution_invalid() {
        assert_eq!(parse_resolution("768"), None);
        assert_eq!(parse_resolution("0x512"), None);
        assert_eq!(parse_resolution("768x512x12"), None);
        assert_eq!(parse_resolution("wide x tall"), None);
    }

    #[test]
    fn test_fuzz_from_percent() {
        assert_eq!(fuzz_from_percent(0.0), 0);
        assert_eq!(fuzz_from_percent(5.0), 13);
        assert_eq!(fuzz_from_percent(100.0), 255);
        assert_eq!(fuzz_from_percent(250.0), 255);
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::defaults();
        assert_eq!(config.display.number, DEFAULT_DISPLAY_NUMBER);
        assert_eq!((config.display.width, config.display.height), (768, 512));
        assert_eq!(config.timing.settle, Duration::from_millis(3000));
        assert_eq!(config.artifact_dir, DEFAULT_ARTIFACT_DIR);
        assert!(config.platform.is_none());
    }
}
