//! Window-search capture on the Windows desktop.
//!
//! Visible top-level windows are enumerated until one whose title contains the hint is found;
//! its client rectangle is copied from the screen DC with `BitBlt`.

use image::{Rgba, RgbaImage};
use std::thread;
use std::time::Instant;
use tracing::{debug, info};
use windows::Win32::Foundation::{BOOL, HWND, LPARAM, POINT, RECT};
use windows::Win32::Graphics::Gdi::{
    BI_RGB, BITMAPINFO, BITMAPINFOHEADER, BitBlt, ClientToScreen, CreateCompatibleBitmap,
    CreateCompatibleDC, DIB_RGB_COLORS, DeleteDC, DeleteObject, GetDC, GetDIBits, ReleaseDC,
    SRCCOPY, SelectObject,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetClientRect, GetWindowTextW, IsWindowVisible,
};

use super::{Capture, CaptureConfig, CaptureResult, FrameCapturer};
use crate::error::CaptureError;
use crate::supervisor::SubjectRun;

struct Search {
    needle: String,
    found: Option<HWND>,
}

unsafe extern "system" fn enum_window(hwnd: HWND, lparam: LPARAM) -> BOOL {
    // SAFETY: lparam carries the `Search` owned by `find_window` for the duration of EnumWindows
    let search = unsafe { &mut *(lparam.0 as *mut Search) };
    if !unsafe { IsWindowVisible(hwnd) }.as_bool() {
        return BOOL(1);
    }
    let mut buf = [0u16; 512];
    let len = unsafe { GetWindowTextW(hwnd, &mut buf) };
    if len > 0 && String::from_utf16_lossy(&buf[..len as usize]).contains(&search.needle) {
        search.found = Some(hwnd);
        return BOOL(0);
    }
    BOOL(1)
}

/// Captures the client area of the subject's window
#[derive(Debug, Clone)]
pub struct Win32Capturer {
    config: CaptureConfig,
}

impl Win32Capturer {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    fn find_window(&self, title: &str) -> CaptureResult<HWND> {
        let started = Instant::now();
        let deadline = started + self.config.window_timeout();
        loop {
            let mut search = Search {
                needle: title.to_string(),
                found: None,
            };
            // Returns an error when the callback stops enumeration early
            let _ = unsafe { EnumWindows(Some(enum_window), LPARAM(&mut search as *mut Search as isize)) };
            if let Some(hwnd) = search.found {
                debug!(title, waited_ms = started.elapsed().as_millis() as u64, "window found");
                return Ok(hwnd);
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

    fn client_rect(hwnd: HWND) -> CaptureResult<(i32, i32, u32, u32)> {
        let mut rect = RECT::default();
        unsafe { GetClientRect(hwnd, &mut rect) }
            .map_err(|e| CaptureError::Unavailable(format!("GetClientRect: {}", e)))?;
        let mut origin = POINT { x: rect.left, y: rect.top };
        if !unsafe { ClientToScreen(hwnd, &mut origin) }.as_bool() {
            return Err(CaptureError::Unavailable("ClientToScreen failed".into()));
        }
        let width = (rect.right - rect.left).max(0) as u32;
        let height = (rect.bottom - rect.top).max(0) as u32;
        Ok((origin.x, origin.y, width, height))
    }

    fn grab(x: i32, y: i32, width: u32, height: u32) -> CaptureResult<RgbaImage> {
        if width == 0 || height == 0 {
            return Err(CaptureError::EmptyImage { width, height });
        }
        let mut bgra = vec![0u8; width as usize * height as usize * 4];
        unsafe {
            let screen = GetDC(HWND::default());
            let memory = CreateCompatibleDC(screen);
            let bitmap = CreateCompatibleBitmap(screen, width as i32, height as i32);
            let previous = SelectObject(memory, bitmap);

            let copied = BitBlt(memory, 0, 0, width as i32, height as i32, screen, x, y, SRCCOPY);

            let mut info = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: width as i32,
                    // negative height: top-down rows
                    biHeight: -(height as i32),
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0,
                    ..Default::default()
                },
                ..Default::default()
            };
            let lines = GetDIBits(
                memory,
                bitmap,
                0,
                height,
                Some(bgra.as_mut_ptr().cast()),
                &mut info,
                DIB_RGB_COLORS,
            );

            SelectObject(memory, previous);
            let _ = DeleteObject(bitmap);
            let _ = DeleteDC(memory);
            ReleaseDC(HWND::default(), screen);

            copied.map_err(|e| CaptureError::Unavailable(format!("BitBlt: {}", e)))?;
            if lines != height as i32 {
                return Err(CaptureError::Unavailable(format!(
                    "GetDIBits copied {} of {} lines",
                    lines, height
                )));
            }
        }

        let mut image = RgbaImage::new(width, height);
        for (pixel, px) in image.pixels_mut().zip(bgra.chunks_exact(4)) {
            *pixel = Rgba([px[2], px[1], px[0], 255]);
        }
        Ok(image)
    }
}

impl FrameCapturer for Win32Capturer {
    fn capture(&mut self, subject: &SubjectRun, title_hint: &str) -> CaptureResult<Capture> {
        let hwnd = self.find_window(title_hint)?;
        let (x, y, width, height) = Self::client_rect(hwnd)?;
        let image = Self::grab(x, y, width, height)?;
        info!(scenario = subject.scenario(), x, y, width, height, "window captured");
        Capture::new(image, self.source_type())
    }

    fn source_type(&self) -> &str {
        "windows"
    }
}
