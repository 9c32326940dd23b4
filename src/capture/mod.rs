//! Frame capture for visual regression runs.
//!
//! This module provides one interface over the platform capture paths:
//! - `WindowSearchCapturer` locates the subject window on an X11 display and grabs it
//! - `FramebufferCapturer` reads the Xvfb screen framebuffer directly
//! - `Win32Capturer` grabs a window's client area on the Windows desktop
//! - `MemoryCapturer` returns prepared frames (tests and dry runs)

pub mod memory;
#[cfg(target_os = "windows")]
pub mod win32;
pub mod x11;
pub mod xwd;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::config;
use crate::display::DisplaySession;
use crate::error::CaptureError;
use crate::supervisor::SubjectRun;

pub use memory::{MemoryCapturer, draw_rect, solid};
#[cfg(target_os = "windows")]
pub use win32::Win32Capturer;
pub use x11::WindowSearchCapturer;
pub use xwd::{FramebufferCapturer, decode_xwd};

pub type CaptureResult<T> = Result<T, CaptureError>;

/// Target platform; selects display provisioning and capture strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    /// Xvfb display, window-search capture
    #[serde(rename = "x11")]
    X11,
    /// Xvfb display, framebuffer surface capture
    #[serde(rename = "x11-framebuffer")]
    X11Framebuffer,
    /// Native desktop, Win32 window capture
    #[serde(rename = "windows")]
    Windows,
}

impl Platform {
    /// Platform used when none is configured
    pub fn host_default() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::X11
        }
    }

    /// Whether a virtual display server is started for the run
    pub fn uses_virtual_display(&self) -> bool {
        matches!(self, Platform::X11 | Platform::X11Framebuffer)
    }

    /// Whether the display server must expose its framebuffer file
    pub fn uses_framebuffer(&self) -> bool {
        matches!(self, Platform::X11Framebuffer)
    }

    /// Whether this build can drive the platform
    pub fn supported_on_host(&self) -> bool {
        match self {
            Platform::X11 | Platform::X11Framebuffer => cfg!(unix),
            Platform::Windows => cfg!(target_os = "windows"),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Platform::X11 => "x11",
            Platform::X11Framebuffer => "x11-framebuffer",
            Platform::Windows => "windows",
        })
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "x11" | "linux" => Ok(Platform::X11),
            "x11-framebuffer" | "framebuffer" | "xvfb-fb" => Ok(Platform::X11Framebuffer),
            "windows" | "win32" => Ok(Platform::Windows),
            other => Err(format!(
                "unknown platform '{}' (expected x11, x11-framebuffer or windows)",
                other
            )),
        }
    }
}

/// Capture tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Total time spent looking for the subject window
    pub window_timeout_ms: u64,
    /// Delay between window lookups
    pub retry_interval_ms: u64,
    /// Window enumeration utility (X11)
    pub search_program: String,
    /// Window grab utility (X11)
    pub grab_program: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            window_timeout_ms: config::DEFAULT_WINDOW_TIMEOUT_MS,
            retry_interval_ms: 100,
            search_program: "xdotool".to_string(),
            grab_program: "import".to_string(),
        }
    }
}

impl CaptureConfig {
    pub fn window_timeout(&self) -> Duration {
        Duration::from_millis(self.window_timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms.max(1))
    }
}

/// A still frame extracted from the subject. Never zero-area.
#[derive(Debug, Clone)]
pub struct Capture {
    image: RgbaImage,
    source: String,
}

impl Capture {
    /// Wrap a raster, rejecting empty images
    pub fn new(image: RgbaImage, source: impl Into<String>) -> CaptureResult<Self> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(CaptureError::EmptyImage { width, height });
        }
        Ok(Self {
            image,
            source: source.into(),
        })
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Capturer that produced the frame (e.g. "x11", "memory")
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Encode as PNG
    pub fn save(&self, path: &Path) -> CaptureResult<()> {
        self.image
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(|e| CaptureError::Io(std::io::Error::other(e.to_string())))
    }
}

/// Extracts a frame from a live subject
pub trait FrameCapturer {
    /// Capture what `subject` rendered; `title_hint` identifies its window where relevant
    fn capture(&mut self, subject: &SubjectRun, title_hint: &str) -> CaptureResult<Capture>;

    /// Source type identifier (e.g. "x11", "x11-framebuffer", "windows", "memory")
    fn source_type(&self) -> &str;
}

/// Select the capturer for `platform`, bound to the open display session
pub fn capturer_for(
    platform: Platform,
    session: &DisplaySession,
    config: &CaptureConfig,
) -> CaptureResult<Box<dyn FrameCapturer>> {
    match platform {
        Platform::X11 => Ok(Box::new(WindowSearchCapturer::new(session.env(), config.clone()))),
        Platform::X11Framebuffer => {
            let path = session.framebuffer().ok_or_else(|| {
                CaptureError::Unavailable("display session exposes no framebuffer".into())
            })?;
            Ok(Box::new(FramebufferCapturer::new(path)))
        }
        #[cfg(target_os = "windows")]
        Platform::Windows => Ok(Box::new(Win32Capturer::new(config.clone()))),
        #[cfg(not(target_os = "windows"))]
        Platform::Windows => Err(CaptureError::Unavailable(
            "windows capture is not available on this target".into(),
        )),
    }
}
