//! Error types for visual regression runs.
//!
//! `SessionOpenError` and `VisregError` abort a whole run. Everything wrapped by
//! `ScenarioError` only fails the scenario that raised it.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure to provision the display surface (fatal to the run)
#[derive(Error, Debug)]
pub enum SessionOpenError {
    #[error("failed to spawn display server '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("display server exited during startup ({status})")]
    ExitedEarly { status: String },

    #[error("platform '{0}' is not supported on this target")]
    UnsupportedPlatform(String),
}

/// Failure to produce a test binary for a scenario
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("failed to read template {}: {source}", path.display())]
    Template {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write build descriptor {}: {source}", path.display())]
    Descriptor {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn build tool '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("build tool exited with {}", exit_code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}")))]
    Failed {
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("build succeeded but binary is missing: {}", path.display())]
    MissingBinary {
        path: PathBuf,
        stdout: String,
        stderr: String,
    },
}

impl BuildError {
    /// Captured (stdout, stderr) of the build tool, when it ran at all
    pub fn output(&self) -> Option<(&str, &str)> {
        match self {
            BuildError::Failed { stdout, stderr, .. }
            | BuildError::MissingBinary { stdout, stderr, .. } => Some((stdout, stderr)),
            _ => None,
        }
    }
}

/// Failure to start or keep the subject process alive
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("failed to spawn subject '{}': {source}", binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("subject exited before capture ({status})")]
    ExitedEarly { status: String },
}

/// Failure to extract a frame from the subject
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("no visible window matching '{title}' after {waited:?}")]
    WindowNotFound { title: String, waited: Duration },

    #[error("failed to run capture utility '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("capture utility '{program}' exited with {exit_code:?}: {stderr}")]
    UtilityFailed {
        program: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("captured image has zero area ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("failed to decode captured frame: {0}")]
    Decode(String),

    #[error("capture not available: {0}")]
    Unavailable(String),

    #[error("I/O error during capture: {0}")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for CaptureError {
    fn from(err: image::ImageError) -> Self {
        CaptureError::Decode(err.to_string())
    }
}

/// Failure to compare a capture against its reference
#[derive(Error, Debug)]
pub enum CompareError {
    #[error("dimension mismatch: reference is {}x{}, capture is {}x{}", expected.0, expected.1, actual.0, actual.1)]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("trimming {trim} pixels from each edge of a {}x{} image leaves nothing to compare", dimensions.0, dimensions.1)]
    EmptyRegion { dimensions: (u32, u32), trim: u32 },

    #[error("failed to load reference image {}: {source}", path.display())]
    Reference {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Any scenario-fatal, run-recoverable failure
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("build failed: {0}")]
    Build(#[from] BuildError),

    #[error("launch failed: {0}")]
    Launch(#[from] LaunchError),

    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("comparison failed: {0}")]
    Compare(#[from] CompareError),
}

impl ScenarioError {
    /// Classify the error for the report
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScenarioError::Build(_) => ErrorKind::Build,
            ScenarioError::Launch(_) => ErrorKind::Launch,
            ScenarioError::Capture(_) => ErrorKind::Capture,
            ScenarioError::Compare(
                CompareError::DimensionMismatch { .. } | CompareError::EmptyRegion { .. },
            ) => ErrorKind::DimensionMismatch,
            ScenarioError::Compare(CompareError::Reference { .. }) => ErrorKind::Reference,
        }
    }
}

/// Error classification recorded in a failed result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Build,
    Launch,
    Capture,
    DimensionMismatch,
    Reference,
    ThresholdExceeded,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Build => "build",
            ErrorKind::Launch => "launch",
            ErrorKind::Capture => "capture",
            ErrorKind::DimensionMismatch => "dimension-mismatch",
            ErrorKind::Reference => "reference",
            ErrorKind::ThresholdExceeded => "threshold-exceeded",
        };
        f.write_str(name)
    }
}

/// Run-fatal errors
#[derive(Error, Debug)]
pub enum VisregError {
    #[error("display session: {0}")]
    Session(#[from] SessionOpenError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("comparison: {0}")]
    Compare(#[from] CompareError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type VisregResult<T> = Result<T, VisregError>;
