//! Image comparison against stored references.
//!
//! Two pixels are equal when every RGBA channel differs by at most the fuzz tolerance.
//! The metric is then the differing-pixel percentage (`max-percent`) or count
//! (`max-pixel-count`, `exact`), and a scenario passes iff `metric <= threshold`.

use image::{Rgba, RgbaImage};
use std::path::Path;
use tracing::{debug, warn};

use crate::capture::Capture;
use crate::config;
use crate::error::CompareError;
use crate::scenario::CompareMode;

const DIFF_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
const MATCH_COLOR: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Knobs that do not change between scenarios of a suite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompareOptions {
    /// Per-channel absolute difference still considered equal
    pub fuzz: u8,
    /// Border width ignored on every side
    pub trim_edges: u32,
    /// Produce a diff-visualization image for failures
    pub diff_image: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            fuzz: config::fuzz_from_percent(config::get().fuzz_percent),
            trim_edges: 0,
            diff_image: true,
        }
    }
}

impl CompareOptions {
    pub fn with_fuzz_percent(mut self, percent: f64) -> Self {
        self.fuzz = config::fuzz_from_percent(percent);
        self
    }

    pub fn with_trim_edges(mut self, trim: u32) -> Self {
        self.trim_edges = trim;
        self
    }
}

/// Outcome of one capture/reference comparison
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub mode: CompareMode,
    /// Threshold actually applied (`exact` is always zero)
    pub threshold: f64,
    pub differing_pixels: u64,
    /// Pixels compared after edge trimming
    pub total_pixels: u64,
    /// Value checked against `threshold`
    pub metric: f64,
    pub passed: bool,
    /// Transparent where pixels match, red where they differ; failures only
    pub diff: Option<RgbaImage>,
}

impl Comparison {
    /// Differing pixels as a percentage of compared pixels
    pub fn percent(&self) -> f64 {
        percent(self.differing_pixels, self.total_pixels)
    }
}

fn percent(differing: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        differing as f64 / total as f64 * 100.0
    }
}

#[inline]
fn pixels_differ(a: &Rgba<u8>, b: &Rgba<u8>, fuzz: u8) -> bool {
    a.0.iter().zip(b.0.iter()).any(|(x, y)| x.abs_diff(*y) > fuzz)
}

/// Load a reference image as RGBA
pub fn load_reference(path: &Path) -> Result<RgbaImage, CompareError> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|source| CompareError::Reference {
            path: path.to_path_buf(),
            source,
        })
}

/// Compare two rasters. Inputs are never modified.
pub fn compare_images(
    capture: &RgbaImage,
    reference: &RgbaImage,
    threshold: f64,
    mode: CompareMode,
    options: &CompareOptions,
) -> Result<Comparison, CompareError> {
    if capture.dimensions() != reference.dimensions() {
        return Err(CompareError::DimensionMismatch {
            expected: reference.dimensions(),
            actual: capture.dimensions(),
        });
    }

    let (width, height) = capture.dimensions();
    let trim = options.trim_edges;
    if trim.saturating_mul(2) >= width.min(height) {
        return Err(CompareError::EmptyRegion {
            dimensions: (width, height),
            trim,
        });
    }
    let x_range = trim..width.saturating_sub(trim);
    let y_range = trim..height.saturating_sub(trim);

    let mut differing = Vec::new();
    let mut total_pixels = 0u64;
    for y in y_range.clone() {
        for x in x_range.clone() {
            total_pixels += 1;
            if pixels_differ(capture.get_pixel(x, y), reference.get_pixel(x, y), options.fuzz) {
                differing.push((x, y));
            }
        }
    }
    let differing_pixels = differing.len() as u64;

    let threshold = match mode {
        CompareMode::Exact => 0.0,
        _ => threshold,
    };
    let metric = match mode {
        CompareMode::MaxPercent => percent(differing_pixels, total_pixels),
        CompareMode::MaxPixelCount | CompareMode::Exact => differing_pixels as f64,
    };
    let passed = metric <= threshold;

    let diff = (!passed && options.diff_image).then(|| {
        let mut diff = RgbaImage::from_pixel(width, height, MATCH_COLOR);
        for &(x, y) in &differing {
            diff.put_pixel(x, y, DIFF_COLOR);
        }
        diff
    });

    debug!(
        %mode,
        differing_pixels,
        total_pixels,
        metric,
        threshold,
        passed,
        "images compared"
    );

    Ok(Comparison {
        mode,
        threshold,
        differing_pixels,
        total_pixels,
        metric,
        passed,
        diff,
    })
}

/// Compare a capture against the reference image stored at `reference_path`
pub fn compare(
    capture: &Capture,
    reference_path: &Path,
    threshold: f64,
    mode: CompareMode,
    options: &CompareOptions,
) -> Result<Comparison, CompareError> {
    let reference = load_reference(reference_path)?;
    let result = compare_images(capture.image(), &reference, threshold, mode, options);
    if let Err(CompareError::DimensionMismatch { expected, actual }) = &result {
        warn!(
            reference = %reference_path.display(),
            ?expected,
            ?actual,
            "capture and reference sizes differ"
        );
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::solid;
    use pretty_assertions::assert_eq;

    const RED: [u8; 4] = [255, 0, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];

    fn options(fuzz: u8) -> CompareOptions {
        CompareOptions {
            fuzz,
            trim_edges: 0,
            diff_image: true,
        }
    }

    #[test]
    fn test_identical_images_pass_every_mode() {
        let red = solid(10, 10, RED);
        for mode in [CompareMode::MaxPercent, CompareMode::MaxPixelCount, CompareMode::Exact] {
            let result = compare_images(&red, &red.clone(), 0.0, mode, &options(13)).unwrap();
            assert_eq!(result.metric, 0.0);
            assert!(result.passed);
            assert!(result.diff.is_none());
        }
    }

    #[test]
    fn test_red_against_blue_differs_everywhere() {
        let red = solid(10, 10, RED);
        let blue = solid(10, 10, BLUE);

        let result = compare_images(&blue, &red, 99.9, CompareMode::MaxPercent, &options(13)).unwrap();
        assert_eq!(result.differing_pixels, 100);
        assert_eq!(result.total_pixels, 100);
        assert_eq!(result.metric, 100.0);
        assert!(!result.passed);

        let diff = result.diff.unwrap();
        assert_eq!(diff.dimensions(), (10, 10));
        assert_eq!(*diff.get_pixel(3, 7), DIFF_COLOR);

        // inclusive boundary
        let at_limit = compare_images(&blue, &red, 100.0, CompareMode::MaxPercent, &options(13)).unwrap();
        assert!(at_limit.passed);
    }

    #[test]
    fn test_dimension_mismatch_fails_any_threshold() {
        let reference = solid(50, 50, RED);
        let capture = solid(60, 60, RED);
        for mode in [CompareMode::MaxPercent, CompareMode::MaxPixelCount, CompareMode::Exact] {
            let result = compare_images(&capture, &reference, f64::MAX, mode, &options(255));
            match result {
                Err(CompareError::DimensionMismatch { expected, actual }) => {
                    assert_eq!(expected, (50, 50));
                    assert_eq!(actual, (60, 60));
                }
                other => panic!("expected dimension mismatch, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_fuzz_tolerance_is_per_channel() {
        let reference = solid(4, 4, [100, 100, 100, 255]);
        let near = solid(4, 4, [113, 87, 100, 255]);
        let far = solid(4, 4, [114, 100, 100, 255]);

        let near_result = compare_images(&near, &reference, 0.0, CompareMode::Exact, &options(13)).unwrap();
        assert!(near_result.passed);

        let far_result = compare_images(&far, &reference, 0.0, CompareMode::Exact, &options(13)).unwrap();
        assert_eq!(far_result.differing_pixels, 16);
        assert!(!far_result.passed);
    }

    #[test]
    fn test_threshold_monotonicity() {
        let reference = solid(20, 20, RED);
        let mut capture = reference.clone();
        crate::capture::draw_rect(&mut capture, 0, 0, 5, 4, BLUE);

        for mode in [CompareMode::MaxPercent, CompareMode::MaxPixelCount] {
            let metric = compare_images(&capture, &reference, 0.0, mode, &options(13))
                .unwrap()
                .metric;
            let mut passed_before = false;
            for step in 0..=40 {
                let threshold = metric * step as f64 / 20.0;
                let passed = compare_images(&capture, &reference, threshold, mode, &options(13))
                    .unwrap()
                    .passed;
                assert!(passed || !passed_before, "{mode} passed then failed at {threshold}");
                passed_before |= passed;
            }
            assert!(passed_before);
        }
    }

    #[test]
    fn test_comparison_is_idempotent() {
        let reference = solid(16, 16, RED);
        let mut capture = reference.clone();
        crate::capture::draw_rect(&mut capture, 4, 4, 3, 3, BLUE);

        let first = compare_images(&capture, &reference, 1.0, CompareMode::MaxPercent, &options(13)).unwrap();
        let second = compare_images(&capture, &reference, 1.0, CompareMode::MaxPercent, &options(13)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.differing_pixels, 9);
    }

    #[test]
    fn test_trim_edges_ignores_border() {
        let reference = solid(10, 10, RED);
        let mut capture = reference.clone();
        // one-pixel frame of noise
        crate::capture::draw_rect(&mut capture, 0, 0, 10, 1, BLUE);
        crate::capture::draw_rect(&mut capture, 0, 9, 10, 1, BLUE);

        let untrimmed = compare_images(&capture, &reference, 0.0, CompareMode::MaxPixelCount, &options(13)).unwrap();
        assert_eq!(untrimmed.differing_pixels, 20);

        let trimmed_options = options(13).with_trim_edges(1);
        let trimmed = compare_images(&capture, &reference, 0.0, CompareMode::MaxPixelCount, &trimmed_options).unwrap();
        assert_eq!(trimmed.differing_pixels, 0);
        assert_eq!(trimmed.total_pixels, 64);
        assert!(trimmed.passed);
    }

    #[test]
    fn test_trim_covering_the_image_is_an_error() {
        let capture = solid(10, 10, [255, 0, 0, 255]);
        let reference = solid(10, 10, [0, 0, 255, 255]);

        let err = compare_images(&capture, &reference, 0.0, CompareMode::Exact, &options(13).with_trim_edges(5))
            .unwrap_err();
        assert!(matches!(
            err,
            CompareError::EmptyRegion {
                dimensions: (10, 10),
                trim: 5
            }
        ));

        // one pixel column left on a narrow image still compares
        let narrow = solid(3, 10, [255, 0, 0, 255]);
        let result = compare_images(&narrow, &narrow, 0.0, CompareMode::Exact, &options(13).with_trim_edges(1)).unwrap();
        assert_eq!(result.total_pixels, 8);
        assert!(result.passed);
    }

    #[test]
    fn test_compare_loads_reference_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Red.png");
        solid(10, 10, RED).save(&path).unwrap();

        let capture = Capture::new(solid(10, 10, RED), "memory").unwrap();
        let result = compare(&capture, &path, 0.0, CompareMode::Exact, &options(13)).unwrap();
        assert!(result.passed);

        let missing = compare(&capture, &dir.path().join("nope.png"), 0.0, CompareMode::Exact, &options(13));
        assert!(matches!(missing, Err(CompareError::Reference { .. })));
    }
}
