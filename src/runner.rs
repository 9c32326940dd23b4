//! Run coordination and aggregate reporting.
//!
//! A run opens one display session, then drives every scenario strictly in registry order:
//! build, launch, settle, capture, terminate, compare, artifacts. Scenario failures are
//! recorded and the run moves on; only configuration and session problems abort it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::artifacts::{RunArtifacts, ScenarioArtifacts};
use crate::builder::{BuildConfig, CommandBuildDriver, ScenarioBuilder};
use crate::capture::{self, Capture, CaptureConfig, FrameCapturer, Platform};
use crate::compare::{self, CompareOptions, Comparison};
use crate::config;
use crate::display::{DisplayConfig, DisplaySession};
use crate::error::{ErrorKind, ScenarioError, VisregError, VisregResult};
use crate::scenario::{CompareDefaults, CompareMode, Scenario, ScenarioRegistry, SuiteManifest};
use crate::supervisor::{SettleOutcome, SubjectConfig, SubjectRun, Supervisor};

/// Final classification of a scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
    /// Warm-up scenario; never counts as a failure
    Warmup,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            Verdict::Pass => "pass",
            Verdict::Fail => "fail",
            Verdict::Warmup => "warmup",
        })
    }
}

/// Result of one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub scenario: String,
    pub verdict: Verdict,
    pub mode: CompareMode,
    /// Threshold actually applied
    pub threshold: f64,
    /// Metric checked against the threshold; absent when no comparison took place
    pub difference: Option<f64>,
    pub differing_pixels: Option<u64>,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "ScenarioArtifacts::is_empty")]
    pub artifacts: ScenarioArtifacts,
    pub duration_ms: u64,
}

impl ComparisonResult {
    pub fn failed(&self) -> bool {
        self.verdict == Verdict::Fail
    }
}

/// Verdict counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub warmup: usize,
}

impl RunTotals {
    fn tally(results: &[ComparisonResult]) -> Self {
        let mut totals = RunTotals {
            total: results.len(),
            ..Default::default()
        };
        for result in results {
            match result.verdict {
                Verdict::Pass => totals.passed += 1,
                Verdict::Fail => totals.failed += 1,
                Verdict::Warmup => totals.warmup += 1,
            }
        }
        totals
    }
}

/// Aggregate report of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub host: Option<String>,
    pub platform: Platform,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub artifact_dir: PathBuf,
    pub results: Vec<ComparisonResult>,
    pub totals: RunTotals,
}

impl RunReport {
    pub fn success(&self) -> bool {
        self.totals.failed == 0
    }

    /// 0 when every scenario passed, 1 otherwise
    pub fn exit_code(&self) -> u8 {
        if self.success() { 0 } else { 1 }
    }

    pub fn write(&self, path: &Path) -> VisregResult<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Human-readable summary table
    pub fn summary(&self) -> String {
        let width = self
            .results
            .iter()
            .map(|r| r.scenario.len())
            .max()
            .unwrap_or(8)
            .max(8);
        let mut out = String::new();
        let _ = writeln!(out, "{:<width$}  {:<7}  {:>12}  {:>10}  DETAIL", "SCENARIO", "VERDICT", "DIFFERENCE", "THRESHOLD");
        for r in &self.results {
            let unit = if r.mode == CompareMode::MaxPercent { "%" } else { "px" };
            let difference = r
                .difference
                .map(|d| format!("{:.3}{}", d, unit))
                .unwrap_or_else(|| "-".to_string());
            let threshold = format!("{}{}", r.threshold, unit);
            let detail = match (&r.error_kind, &r.error) {
                (Some(kind), Some(msg)) => format!("{}: {}", kind, msg),
                (Some(kind), None) => kind.to_string(),
                _ => String::new(),
            };
            let _ = writeln!(
                out,
                "{:<width$}  {:<7}  {:>12}  {:>10}  {}",
                r.scenario, r.verdict, difference, threshold, detail
            );
        }
        let _ = writeln!(
            out,
            "\n{} scenarios: {} passed, {} failed, {} warm-up ({})",
            self.totals.total,
            self.totals.passed,
            self.totals.failed,
            self.totals.warmup,
            self.artifact_dir.display()
        );
        out
    }
}

/// Everything a run needs besides the scenario list
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub platform: Platform,
    pub display: DisplayConfig,
    pub build: BuildConfig,
    pub subject: SubjectConfig,
    pub capture: CaptureConfig,
    pub compare: CompareDefaults,
    pub artifact_dir: PathBuf,
    /// Keep captures of passing scenarios
    pub keep_passing: bool,
}

impl RunConfig {
    /// Run settings from a manifest; unset values come from the environment defaults
    pub fn from_manifest(manifest: &SuiteManifest) -> VisregResult<Self> {
        let cfg = config::get();
        let platform = resolve_platform(manifest.platform, cfg.platform.as_deref())?;
        Ok(Self {
            platform,
            display: manifest.display.clone(),
            build: manifest.build.clone(),
            subject: manifest.subject.clone(),
            capture: manifest.capture.clone(),
            compare: manifest.compare.clone(),
            artifact_dir: manifest
                .artifact_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(&cfg.artifact_dir)),
            keep_passing: false,
        })
    }

    fn compare_options(&self) -> CompareOptions {
        CompareOptions {
            fuzz: config::fuzz_from_percent(self.compare.fuzz_percent),
            trim_edges: 0,
            diff_image: self.compare.diff_images,
        }
    }
}

/// Manifest platform, else the `VISREG_PLATFORM` value, else the host default
fn resolve_platform(manifest: Option<Platform>, env: Option<&str>) -> VisregResult<Platform> {
    if let Some(platform) = manifest {
        return Ok(platform);
    }
    match env {
        Some(value) => value
            .parse()
            .map_err(|e| VisregError::Config(format!("{}: {}", config::ENV_PLATFORM, e))),
        None => Ok(Platform::host_default()),
    }
}

/// Run `registry` end to end: display session, external build tool, platform capturer.
///
/// Fails only on run-fatal errors; scenario failures are in the report.
pub fn run(config: &RunConfig, registry: &ScenarioRegistry) -> VisregResult<RunReport> {
    let artifacts = RunArtifacts::create(&config.artifact_dir)?.keep_passing(config.keep_passing);
    info!(
        run = %artifacts.id,
        platform = %config.platform,
        scenarios = registry.len(),
        "run started"
    );

    let mut session = DisplaySession::open(&config.display, config.platform, &artifacts.scratch())?;
    session.wait_ready(config.display.settle, &config.display.ready_probe)?;
    session.run_diagnostics(&config.display.diagnostics);

    let mut capturer = capture::capturer_for(config.platform, &session, &config.capture)
        .map_err(|e| VisregError::Config(e.to_string()))?;
    let builder = CommandBuildDriver::new(config.build.clone());

    let report = RunCoordinator::new(config, &artifacts, &builder, capturer.as_mut(), session.env())
        .run(registry);
    session.close();

    report.write(&artifacts.report_path())?;
    Ok(report)
}

enum Outcome {
    Compared {
        capture: Capture,
        comparison: Comparison,
    },
    Failed {
        error: ScenarioError,
        capture: Option<Capture>,
        descriptor: Option<String>,
    },
}

impl Outcome {
    fn failed(error: impl Into<ScenarioError>) -> Self {
        Outcome::Failed {
            error: error.into(),
            capture: None,
            descriptor: None,
        }
    }
}

/// Sequences the per-scenario pipeline inside an open display session
pub struct RunCoordinator<'a> {
    platform: Platform,
    builder: &'a dyn ScenarioBuilder,
    capturer: &'a mut dyn FrameCapturer,
    supervisor: Supervisor,
    artifacts: &'a RunArtifacts,
    options: CompareOptions,
}

impl<'a> RunCoordinator<'a> {
    /// `display_env` binds subjects to the session (see [`DisplaySession::env`])
    pub fn new(
        config: &RunConfig,
        artifacts: &'a RunArtifacts,
        builder: &'a dyn ScenarioBuilder,
        capturer: &'a mut dyn FrameCapturer,
        display_env: Vec<(String, String)>,
    ) -> Self {
        Self {
            platform: config.platform,
            builder,
            capturer,
            supervisor: Supervisor::new(config.subject.clone(), display_env),
            artifacts,
            options: config.compare_options(),
        }
    }

    /// Run every scenario in order and aggregate the results
    pub fn run(&mut self, registry: &ScenarioRegistry) -> RunReport {
        let started = Utc::now();
        let results: Vec<ComparisonResult> = registry.iter().map(|s| self.run_scenario(s)).collect();
        let totals = RunTotals::tally(&results);
        info!(
            total = totals.total,
            passed = totals.passed,
            failed = totals.failed,
            warmup = totals.warmup,
            "run finished"
        );

        RunReport {
            run_id: self.artifacts.id.clone(),
            host: hostname::get().ok().and_then(|h| h.into_string().ok()),
            platform: self.platform,
            started,
            finished: Utc::now(),
            artifact_dir: self.artifacts.dir.clone(),
            results,
            totals,
        }
    }

    /// Run one scenario. Never fails; errors become a failed result.
    pub fn run_scenario(&mut self, scenario: &Scenario) -> ComparisonResult {
        let started = Instant::now();
        info!(scenario = %scenario.name, warmup = scenario.warmup, "scenario started");

        let outcome = self.execute(scenario);
        let mut result = ComparisonResult {
            scenario: scenario.name.clone(),
            verdict: Verdict::Fail,
            mode: scenario.mode,
            threshold: scenario.effective_threshold(),
            difference: None,
            differing_pixels: None,
            error_kind: None,
            error: None,
            artifacts: ScenarioArtifacts::default(),
            duration_ms: 0,
        };

        match outcome {
            Outcome::Compared { capture, comparison } => {
                result.difference = Some(comparison.metric);
                result.differing_pixels = Some(comparison.differing_pixels);
                if comparison.passed || scenario.warmup {
                    result.verdict = if scenario.warmup { Verdict::Warmup } else { Verdict::Pass };
                    result.artifacts = self.artifacts.discard(&scenario.name, Some(&capture));
                } else {
                    result.error_kind = Some(ErrorKind::ThresholdExceeded);
                    result.artifacts = self.artifacts.retain_failure(
                        &scenario.name,
                        Some(&capture),
                        comparison.diff.as_ref(),
                    );
                }
            }
            Outcome::Failed { error, capture, descriptor } => {
                result.error_kind = Some(error.kind());
                result.error = Some(error.to_string());
                if scenario.warmup {
                    result.verdict = Verdict::Warmup;
                    result.artifacts = self.artifacts.discard(&scenario.name, None);
                } else if let ScenarioError::Build(build) = &error {
                    result.artifacts =
                        self.artifacts.retain_build_failure(&scenario.name, descriptor.as_deref(), build);
                } else {
                    result.artifacts = self.artifacts.retain_failure(&scenario.name, capture.as_ref(), None);
                }
            }
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        match result.verdict {
            Verdict::Fail => warn!(
                scenario = %result.scenario,
                difference = ?result.difference,
                threshold = result.threshold,
                error_kind = ?result.error_kind,
                error = result.error.as_deref().unwrap_or(""),
                "scenario failed"
            ),
            verdict => info!(
                scenario = %result.scenario,
                %verdict,
                difference = ?result.difference,
                threshold = result.threshold,
                duration_ms = result.duration_ms,
                "scenario finished"
            ),
        }
        result
    }

    fn execute(&mut self, scenario: &Scenario) -> Outcome {
        let descriptor = match self.builder.descriptor(scenario) {
            Ok(descriptor) => descriptor,
            Err(err) => return Outcome::failed(err),
        };
        let binary = match self.builder.build(scenario, &descriptor) {
            Ok(binary) => binary,
            Err(err) => {
                return Outcome::Failed {
                    error: err.into(),
                    capture: None,
                    descriptor: Some(descriptor),
                };
            }
        };

        let workspace = self.artifacts.workspace(&scenario.name);
        let mut subject = match self.supervisor.launch(&scenario.name, &binary, &workspace) {
            Ok(subject) => subject,
            Err(err) => return Outcome::failed(err),
        };
        let captured = self.capture(&mut subject);
        // terminal state before comparing or moving on, whatever capture did
        subject.terminate();
        drop(subject);

        let capture = match captured {
            Ok(capture) => capture,
            Err(err) => return Outcome::failed(err),
        };
        let options = CompareOptions {
            trim_edges: scenario.trim_edges,
            ..self.options
        };
        match compare::compare(&capture, &scenario.reference, scenario.threshold, scenario.mode, &options) {
            Ok(comparison) => Outcome::Compared { capture, comparison },
            Err(err) => Outcome::Failed {
                error: err.into(),
                capture: Some(capture),
                descriptor: None,
            },
        }
    }

    fn capture(&mut self, subject: &mut SubjectRun) -> Result<Capture, ScenarioError> {
        match subject.settle() {
            SettleOutcome::Ready(after) => {
                debug!(scenario = subject.scenario(), ready_ms = after.as_millis() as u64, "subject ready")
            }
            SettleOutcome::TimedOut => warn!(
                scenario = subject.scenario(),
                "subject never signalled readiness, capturing anyway"
            ),
            SettleOutcome::Slept | SettleOutcome::Exited => {}
        }
        subject.ensure_alive()?;
        let title = self.supervisor.config().window_title.clone();
        Ok(self.capturer.capture(subject, &title)?)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::capture::{MemoryCapturer, solid};
    use crate::error::BuildError;
    use crate::supervisor::Settle;
    use pretty_assertions::assert_eq;

    const RED: [u8; 4] = [255, 0, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];

    /// "Builds" by handing out `sleep`; scenarios named `Broken*` fail to build
    struct SleepBuilder;

    impl ScenarioBuilder for SleepBuilder {
        fn descriptor(&self, scenario: &Scenario) -> Result<String, BuildError> {
            Ok(format!("{{\"main\": \"{}\"}}", scenario.name))
        }

        fn build(&self, scenario: &Scenario, _descriptor: &str) -> Result<PathBuf, BuildError> {
            if scenario.name.starts_with("Broken") {
                return Err(BuildError::Failed {
                    exit_code: Some(1),
                    stdout: String::new(),
                    stderr: "unknown test case".into(),
                });
            }
            Ok(PathBuf::from("sleep"))
        }
    }

    fn run_config(artifact_dir: &Path) -> RunConfig {
        RunConfig {
            platform: Platform::X11,
            display: DisplayConfig::default(),
            build: BuildConfig::new("true", "template.json", "bin"),
            subject: SubjectConfig {
                args: vec!["30".into()],
                settle: Settle::Fixed { ms: 10 },
                grace_ms: 1000,
                ..SubjectConfig::default()
            },
            capture: CaptureConfig::default(),
            compare: CompareDefaults::default(),
            artifact_dir: artifact_dir.to_path_buf(),
            keep_passing: false,
        }
    }

    fn reference(dir: &Path, name: &str, color: [u8; 4]) -> PathBuf {
        let path = dir.join(format!("{}.png", name));
        solid(10, 10, color).save(&path).unwrap();
        path
    }

    #[test]
    fn test_threshold_failure_keeps_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let config = run_config(dir.path());
        let artifacts = RunArtifacts::create(dir.path()).unwrap();
        let mut capturer = MemoryCapturer::new()
            .frame("Red", solid(10, 10, RED))
            .frame("Blue", solid(10, 10, BLUE));
        let registry = ScenarioRegistry::new(vec![
            Scenario::new("Red", reference(dir.path(), "Red", RED)),
            Scenario::new("Blue", reference(dir.path(), "BlueRef", RED)),
        ])
        .unwrap();

        let report = RunCoordinator::new(&config, &artifacts, &SleepBuilder, &mut capturer, Vec::new())
            .run(&registry);

        assert_eq!(report.totals, RunTotals { total: 2, passed: 1, failed: 1, warmup: 0 });
        assert_eq!(report.exit_code(), 1);

        let blue = &report.results[1];
        assert_eq!(blue.verdict, Verdict::Fail);
        assert_eq!(blue.difference, Some(100.0));
        assert_eq!(blue.error_kind, Some(ErrorKind::ThresholdExceeded));
        assert_eq!(blue.artifacts.capture, Some(artifacts.failed_capture_path("Blue")));
        assert_eq!(blue.artifacts.diff, Some(artifacts.diff_path("Blue")));
        assert!(artifacts.diff_path("Blue").is_file());
        assert!(!artifacts.failed_capture_path("Red").exists());
    }

    #[test]
    fn test_build_failure_is_recorded_and_run_continues() {
        let dir = tempfile::tempdir().unwrap();
        let config = run_config(dir.path());
        let artifacts = RunArtifacts::create(dir.path()).unwrap();
        let mut capturer = MemoryCapturer::new().fallback(solid(10, 10, RED));
        let registry = ScenarioRegistry::new(vec![
            Scenario::new("BrokenText", reference(dir.path(), "BrokenText", RED)),
            Scenario::new("Shapes", reference(dir.path(), "Shapes", RED)),
        ])
        .unwrap();

        let report = RunCoordinator::new(&config, &artifacts, &SleepBuilder, &mut capturer, Vec::new())
            .run(&registry);

        let broken = &report.results[0];
        assert_eq!(broken.verdict, Verdict::Fail);
        assert_eq!(broken.error_kind, Some(ErrorKind::Build));
        assert_eq!(broken.difference, None);
        assert!(broken.artifacts.build_log.is_some());
        assert!(broken.artifacts.descriptor.is_some());

        assert_eq!(report.results[1].verdict, Verdict::Pass);
        // the broken scenario never reached capture
        assert_eq!(capturer.captured(), &["Shapes".to_string()]);
    }

    #[test]
    fn test_warmup_and_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let config = run_config(dir.path());
        let artifacts = RunArtifacts::create(dir.path()).unwrap();
        let mut capturer = MemoryCapturer::new()
            .frame("Dummy", solid(10, 10, BLUE))
            .frame("Wide", solid(12, 10, RED));
        let registry = ScenarioRegistry::new(vec![
            Scenario::new("Dummy", reference(dir.path(), "Dummy", RED)).warmup(true),
            Scenario::new("Wide", reference(dir.path(), "Wide", RED)).threshold(CompareMode::MaxPercent, 100.0),
        ])
        .unwrap();

        let report = RunCoordinator::new(&config, &artifacts, &SleepBuilder, &mut capturer, Vec::new())
            .run(&registry);

        assert_eq!(report.results[0].verdict, Verdict::Warmup);
        assert_eq!(report.results[0].difference, Some(100.0));

        let wide = &report.results[1];
        assert_eq!(wide.verdict, Verdict::Fail);
        assert_eq!(wide.error_kind, Some(ErrorKind::DimensionMismatch));
        assert_eq!(wide.artifacts.capture, Some(artifacts.failed_capture_path("Wide")));

        assert_eq!(report.totals.failed, 1);
        assert_eq!(report.totals.warmup, 1);
    }

    #[test]
    fn test_report_serializes_and_summarizes() {
        let dir = tempfile::tempdir().unwrap();
        let config = run_config(dir.path());
        let artifacts = RunArtifacts::create(dir.path()).unwrap();
        let mut capturer = MemoryCapturer::new().fallback(solid(10, 10, RED));
        let registry =
            ScenarioRegistry::new(vec![Scenario::new("Red", reference(dir.path(), "Red", RED))]).unwrap();

        let report = RunCoordinator::new(&config, &artifacts, &SleepBuilder, &mut capturer, Vec::new())
            .run(&registry);
        assert!(report.success());
        assert_eq!(report.exit_code(), 0);

        report.write(&artifacts.report_path()).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(artifacts.report_path()).unwrap()).unwrap();
        assert_eq!(json["platform"], "x11");
        assert_eq!(json["results"][0]["verdict"], "pass");
        assert_eq!(json["totals"]["passed"], 1);

        let summary = report.summary();
        assert!(summary.contains("Red"));
        assert!(summary.contains("1 passed, 0 failed"));
    }

    #[test]
    fn test_platform_resolution_order() {
        assert_eq!(
            resolve_platform(Some(Platform::X11Framebuffer), Some("windows")).unwrap(),
            Platform::X11Framebuffer
        );
        assert_eq!(resolve_platform(None, Some("x11")).unwrap(), Platform::X11);
        assert_eq!(resolve_platform(None, None).unwrap(), Platform::host_default());

        let err = resolve_platform(None, Some("wayland")).unwrap_err();
        assert!(matches!(err, VisregError::Config(msg) if msg.contains("VISREG_PLATFORM")));
    }

    fn script(dir: &Path, name: &str, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_run_opens_session_writes_report_and_stops_server() {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let frame = root.join("frame.png");
        solid(10, 10, RED).save(&frame).unwrap();
        fs::write(root.join("template.json"), "{\"main\": \"{TEST_CASE}\"}").unwrap();

        let pid_file = root.join("server.pid");
        let mut config = run_config(&root.join("artifacts"));
        config.display = DisplayConfig {
            program: script(root, "fake-server", &format!("echo $$ > '{}'\nexec sleep 30", pid_file.display())),
            number: 187,
            settle: Settle::Fixed { ms: 20 },
            grace_ms: 1000,
            ..DisplayConfig::default()
        };
        config.build = BuildConfig::new("sh", root.join("template.json"), root.join("subject"))
            .args(["-c", "printf '#!/bin/sh\\nexec sleep 30\\n' > subject && chmod +x subject"])
            .descriptor(root.join("build.json"));
        config.build.working_dir = Some(root.to_path_buf());
        config.capture = CaptureConfig {
            search_program: script(root, "fake-search", "echo 4242"),
            grab_program: script(root, "fake-grab", &format!("cat '{}'", frame.display())),
            ..CaptureConfig::default()
        };

        let registry = ScenarioRegistry::new(vec![
            Scenario::new("Red", reference(root, "Red", RED)),
            Scenario::new("Blue", reference(root, "Blue", BLUE)),
        ])
        .unwrap();

        let report = run(&config, &registry).unwrap();

        let verdicts: Vec<Verdict> = report.results.iter().map(|r| r.verdict).collect();
        assert_eq!(verdicts, vec![Verdict::Pass, Verdict::Fail]);
        assert_eq!(report.results[1].error_kind, Some(ErrorKind::ThresholdExceeded));
        assert_eq!(report.exit_code(), 1);

        let written: RunReport =
            serde_json::from_str(&fs::read_to_string(report.artifact_dir.join("report.json")).unwrap()).unwrap();
        assert_eq!(written.run_id, report.run_id);
        assert_eq!(written.totals, report.totals);

        // the display server was stopped and reaped once the run returned
        let pid: i32 = fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
        assert_eq!(kill(Pid::from_raw(pid), None::<Signal>), Err(Errno::ESRCH));
    }
}
