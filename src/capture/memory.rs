//! In-memory frame source for tests and dry runs.

use image::{Rgba, RgbaImage};
use std::collections::HashMap;

use super::{Capture, CaptureResult, FrameCapturer};
use crate::error::CaptureError;
use crate::supervisor::SubjectRun;

/// Image of the given size filled with one color
pub fn solid(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba(color))
}

/// Draw a filled rectangle, clipped to the image
pub fn draw_rect(image: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, color: [u8; 4]) {
    let (width, height) = image.dimensions();
    for py in y..y.saturating_add(h).min(height) {
        for px in x..x.saturating_add(w).min(width) {
            image.put_pixel(px, py, Rgba(color));
        }
    }
}

/// Returns a prepared frame per scenario name
///
/// Scenarios without a frame of their own get the fallback frame, or a
/// `WindowNotFound` error when there is none.
#[derive(Debug, Clone, Default)]
pub struct MemoryCapturer {
    frames: HashMap<String, RgbaImage>,
    fallback: Option<RgbaImage>,
    captured: Vec<String>,
}

impl MemoryCapturer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame returned for `scenario`
    pub fn frame(mut self, scenario: impl Into<String>, image: RgbaImage) -> Self {
        self.frames.insert(scenario.into(), image);
        self
    }

    /// Frame returned for every scenario without its own
    pub fn fallback(mut self, image: RgbaImage) -> Self {
        self.fallback = Some(image);
        self
    }

    /// Scenario names captured so far, in order
    pub fn captured(&self) -> &[String] {
        &self.captured
    }
}

impl FrameCapturer for MemoryCapturer {
    fn capture(&mut self, subject: &SubjectRun, title_hint: &str) -> CaptureResult<Capture> {
        let scenario = subject.scenario();
        let image = self
            .frames
            .get(scenario)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| CaptureError::WindowNotFound {
                title: title_hint.to_string(),
                waited: std::time::Duration::ZERO,
            })?;
        self.captured.push(scenario.to_string());
        Capture::new(image, self.source_type())
    }

    fn source_type(&self) -> &str {
        "memory"
    }
}
