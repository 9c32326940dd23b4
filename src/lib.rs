//! visreg - visual regression runs for rendering test binaries.
//!
//! This crate provides:
//! - A suite manifest and ordered scenario registry
//! - An Xvfb display session (or the native desktop) shared by a whole run
//! - A build driver that templates a descriptor per scenario and runs the build tool
//! - Subject process supervision with graceful-then-forced termination
//! - Platform frame capture (X11 window search, Xvfb framebuffer, Win32)
//! - Fuzz-tolerant image comparison with diff images
//! - A run coordinator producing a JSON report and failure artifacts
//!
//! # Example
//!
//! ```rust,no_run
//! use visreg::runner::{self, RunConfig};
//! use visreg::scenario::SuiteManifest;
//!
//! let manifest = SuiteManifest::load("visreg.json".as_ref()).unwrap();
//! let registry = manifest.registry().unwrap();
//! let report = runner::run(&RunConfig::from_manifest(&manifest).unwrap(), &registry).unwrap();
//! std::process::exit(report.exit_code().into());
//! ```

pub mod artifacts;
pub mod builder;
pub mod capture;
pub mod compare;
pub mod config;
pub mod display;
pub mod error;
pub mod runner;
pub mod scenario;
pub mod supervisor;

pub use builder::{BuildConfig, CommandBuildDriver, ScenarioBuilder};
pub use capture::{Capture, CaptureConfig, FrameCapturer, MemoryCapturer, Platform};
pub use compare::{CompareOptions, Comparison, compare, compare_images};
pub use display::{DisplayConfig, DisplaySession};
pub use error::{ErrorKind, ScenarioError, VisregError, VisregResult};
pub use runner::{ComparisonResult, RunConfig, RunCoordinator, RunReport, Verdict, run};
pub use scenario::{CompareMode, Scenario, ScenarioRegistry, SuiteManifest};
pub use supervisor::{Settle, SubjectConfig, SubjectRun, Supervisor};
