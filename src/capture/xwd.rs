//! Surface capture from the Xvfb framebuffer file.
//!
//! With `-fbdir`, Xvfb keeps each screen in an XWD-format file. The header is 25 big-endian
//! CARD32 fields followed by the window name and the colormap; pixel data follows in the
//! byte order the header declares.

use image::{Rgba, RgbaImage};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::{Capture, CaptureResult, FrameCapturer};
use crate::error::CaptureError;
use crate::supervisor::SubjectRun;

const HEADER_FIELDS: usize = 25;
const HEADER_LEN: usize = HEADER_FIELDS * 4;
const COLOR_ENTRY_LEN: usize = 12;
const XWD_FILE_VERSION: u32 = 7;
const Z_PIXMAP: u32 = 2;
const MSB_FIRST: u32 = 1;

/// Parsed XWD header fields that matter for decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct XwdHeader {
    header_size: u32,
    pixmap_format: u32,
    width: u32,
    height: u32,
    byte_order: u32,
    bits_per_pixel: u32,
    bytes_per_line: u32,
    red_mask: u32,
    green_mask: u32,
    blue_mask: u32,
    ncolors: u32,
}

impl XwdHeader {
    fn parse(data: &[u8]) -> CaptureResult<Self> {
        if data.len() < HEADER_LEN {
            return Err(decode_err(format!("file too short for XWD header ({} bytes)", data.len())));
        }
        let field = |i: usize| {
            let at = i * 4;
            u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
        };
        if field(1) != XWD_FILE_VERSION {
            return Err(decode_err(format!("unsupported XWD version {}", field(1))));
        }
        Ok(Self {
            header_size: field(0),
            pixmap_format: field(2),
            width: field(4),
            height: field(5),
            byte_order: field(7),
            bits_per_pixel: field(11),
            bytes_per_line: field(12),
            red_mask: field(14),
            green_mask: field(15),
            blue_mask: field(16),
            ncolors: field(19),
        })
    }

    fn data_offset(&self) -> usize {
        self.header_size as usize + self.ncolors as usize * COLOR_ENTRY_LEN
    }
}

fn decode_err(msg: impl Into<String>) -> CaptureError {
    CaptureError::Decode(msg.into())
}

/// Expand a masked channel to 8 bits
fn channel(pixel: u32, mask: u32) -> u8 {
    if mask == 0 {
        return 0;
    }
    let shift = mask.trailing_zeros();
    let bits = mask.count_ones();
    let value = (pixel & mask) >> shift;
    if bits >= 8 {
        (value >> (bits - 8)) as u8
    } else {
        (value * 255 / ((1 << bits) - 1)) as u8
    }
}

/// Decode a true-color ZPixmap XWD image
pub fn decode_xwd(data: &[u8]) -> CaptureResult<RgbaImage> {
    let header = XwdHeader::parse(data)?;
    if header.pixmap_format != Z_PIXMAP {
        return Err(decode_err(format!("unsupported pixmap format {}", header.pixmap_format)));
    }
    let bytes_per_pixel = match header.bits_per_pixel {
        16 | 24 | 32 => (header.bits_per_pixel / 8) as usize,
        other => return Err(decode_err(format!("unsupported bits per pixel {}", other))),
    };
    if header.width == 0 || header.height == 0 {
        return Err(CaptureError::EmptyImage {
            width: header.width,
            height: header.height,
        });
    }

    let offset = header.data_offset();
    let stride = header.bytes_per_line as usize;
    let needed = offset + stride * header.height as usize;
    if stride < header.width as usize * bytes_per_pixel || data.len() < needed {
        return Err(decode_err(format!(
            "truncated XWD image: need {} bytes, have {}",
            needed,
            data.len()
        )));
    }

    let mut image = RgbaImage::new(header.width, header.height);
    for y in 0..header.height {
        let row = &data[offset + y as usize * stride..];
        for x in 0..header.width {
            let bytes = &row[x as usize * bytes_per_pixel..(x as usize + 1) * bytes_per_pixel];
            let pixel = if header.byte_order == MSB_FIRST {
                bytes.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b))
            } else {
                bytes.iter().rev().fold(0u32, |acc, &b| (acc << 8) | u32::from(b))
            };
            image.put_pixel(
                x,
                y,
                Rgba([
                    channel(pixel, header.red_mask),
                    channel(pixel, header.green_mask),
                    channel(pixel, header.blue_mask),
                    255,
                ]),
            );
        }
    }
    Ok(image)
}

/// Reads the whole screen straight from the framebuffer file
#[derive(Debug, Clone)]
pub struct FramebufferCapturer {
    path: PathBuf,
}

impl FramebufferCapturer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameCapturer for FramebufferCapturer {
    fn capture(&mut self, subject: &SubjectRun, _title_hint: &str) -> CaptureResult<Capture> {
        let data = fs::read(&self.path).map_err(|err| {
            CaptureError::Unavailable(format!("framebuffer {}: {}", self.path.display(), err))
        })?;
        let image = decode_xwd(&data)?;
        info!(
            scenario = subject.scenario(),
            width = image.width(),
            height = image.height(),
            "framebuffer captured"
        );
        Capture::new(image, self.source_type())
    }

    fn source_type(&self) -> &str {
        "x11-framebuffer"
    }
}
