//! Run artifact directory management.
//!
//! Every run gets its own directory under the artifact base:
//! - `work/<scenario>/` private workspace per scenario (subject log, ready marker)
//! - `screenshot_<scenario>_failed.png` and `diff_<scenario>.png` for failures
//! - `build_<scenario>.log` and `build_<scenario>.json` for build failures
//! - `report.json` aggregate report
//!
//! Passing scenarios leave nothing behind unless captures are kept explicitly.

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::capture::Capture;
use crate::error::BuildError;

/// Files written for one scenario
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioArtifacts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_log: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_log: Option<PathBuf>,
}

impl ScenarioArtifacts {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Artifact directory of one run
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    /// Unique run ID
    pub id: String,
    /// Root directory for this run
    pub dir: PathBuf,
    /// Also keep captures of passing scenarios
    pub keep_passing: bool,
}

impl RunArtifacts {
    /// Create a fresh run directory under `base`
    pub fn create(base: &Path) -> io::Result<Self> {
        let id = generate_run_id();
        let dir = base.join(&id);
        fs::create_dir_all(&dir)?;

        let metadata = serde_json::json!({
            "id": id,
            "created": chrono::Utc::now().to_rfc3339(),
            "pid": std::process::id(),
        });
        fs::write(dir.join(".run.json"), serde_json::to_string_pretty(&metadata)?)?;

        debug!(run = %id, dir = %dir.display(), "artifact directory created");
        Ok(Self {
            id,
            dir,
            keep_passing: false,
        })
    }

    /// Set whether passing captures are written too
    pub fn keep_passing(mut self, keep: bool) -> Self {
        self.keep_passing = keep;
        self
    }

    /// Private workspace of one scenario
    pub fn workspace(&self, scenario: &str) -> PathBuf {
        self.dir.join("work").join(sanitize_name(scenario))
    }

    /// Scratch space for the display session
    pub fn scratch(&self) -> PathBuf {
        self.dir.join("session")
    }

    pub fn capture_path(&self, scenario: &str) -> PathBuf {
        self.dir.join(format!("screenshot_{}.png", sanitize_name(scenario)))
    }

    pub fn failed_capture_path(&self, scenario: &str) -> PathBuf {
        self.dir.join(format!("screenshot_{}_failed.png", sanitize_name(scenario)))
    }

    pub fn diff_path(&self, scenario: &str) -> PathBuf {
        self.dir.join(format!("diff_{}.png", sanitize_name(scenario)))
    }

    pub fn report_path(&self) -> PathBuf {
        self.dir.join("report.json")
    }

    /// Passing scenario: drop its workspace, optionally keep the capture
    pub fn discard(&self, scenario: &str, capture: Option<&Capture>) -> ScenarioArtifacts {
        let workspace = self.workspace(scenario);
        if workspace.exists() {
            if let Err(err) = fs::remove_dir_all(&workspace) {
                warn!(scenario, error = %err, "could not remove scenario workspace");
            }
        }

        let mut artifacts = ScenarioArtifacts::default();
        if let (true, Some(capture)) = (self.keep_passing, capture) {
            let path = self.capture_path(scenario);
            match capture.save(&path) {
                Ok(()) => artifacts.capture = Some(path),
                Err(err) => warn!(scenario, error = %err, "could not save capture"),
            }
        }
        artifacts
    }

    /// Failing scenario: keep the capture under a failure name plus any diff image
    pub fn retain_failure(
        &self,
        scenario: &str,
        capture: Option<&Capture>,
        diff: Option<&RgbaImage>,
    ) -> ScenarioArtifacts {
        let mut artifacts = ScenarioArtifacts::default();

        if let Some(capture) = capture {
            let path = self.failed_capture_path(scenario);
            match capture.save(&path) {
                Ok(()) => artifacts.capture = Some(path),
                Err(err) => warn!(scenario, error = %err, "could not save failed capture"),
            }
        }
        if let Some(diff) = diff {
            let path = self.diff_path(scenario);
            match diff.save_with_format(&path, image::ImageFormat::Png) {
                Ok(()) => artifacts.diff = Some(path),
                Err(err) => warn!(scenario, error = %err, "could not save diff image"),
            }
        }

        let subject_log = self.workspace(scenario).join("subject.log");
        if subject_log.is_file() {
            artifacts.subject_log = Some(subject_log);
        }
        artifacts
    }

    /// Build failure: keep the rendered descriptor and the tool's output
    pub fn retain_build_failure(
        &self,
        scenario: &str,
        descriptor: Option<&str>,
        error: &BuildError,
    ) -> ScenarioArtifacts {
        let mut artifacts = ScenarioArtifacts::default();
        let name = sanitize_name(scenario);

        if let Some(text) = descriptor {
            let path = self.dir.join(format!("build_{}.json", name));
            match fs::write(&path, text) {
                Ok(()) => artifacts.descriptor = Some(path),
                Err(err) => warn!(scenario, error = %err, "could not save build descriptor"),
            }
        }
        if let Some((stdout, stderr)) = error.output() {
            let path = self.dir.join(format!("build_{}.log", name));
            let log = format!("{}\n--- stdout ---\n{}\n--- stderr ---\n{}\n", error, stdout, stderr);
            match fs::write(&path, log) {
                Ok(()) => artifacts.build_log = Some(path),
                Err(err) => warn!(scenario, error = %err, "could not save build log"),
            }
        }
        artifacts
    }
}

/// Generate a sortable, unique run ID
fn generate_run_id() -> String {
    format!(
        "run_{}_{}",
        chrono::Utc::now().format("%Y%m%d_%H%M%S%.3f"),
        std::process::id()
    )
    .replace('.', "_")
}

/// Sanitize a name for use in filenames
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::solid;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("ClearColour"), "ClearColour");
        assert_eq!(sanitize_name("text wrap"), "text_wrap");
        assert_eq!(sanitize_name("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_name("../escape"), "___escape");
    }

    #[test]
    fn test_create_run_directory() {
        let base = tempfile::tempdir().unwrap();
        let run = RunArtifacts::create(base.path()).unwrap();
        assert!(run.id.starts_with("run_"));
        assert!(run.dir.join(".run.json").is_file());
        assert!(run.workspace("Text").starts_with(&run.dir));
        assert_eq!(run.report_path(), run.dir.join("report.json"));
    }

    #[test]
    fn test_failure_keeps_capture_and_diff() {
        let base = tempfile::tempdir().unwrap();
        let run = RunArtifacts::create(base.path()).unwrap();
        let capture = Capture::new(solid(4, 4, [0, 0, 255, 255]), "memory").unwrap();
        let diff = solid(4, 4, [255, 0, 0, 255]);

        let artifacts = run.retain_failure("Shapes", Some(&capture), Some(&diff));
        assert_eq!(artifacts.capture, Some(run.dir.join("screenshot_Shapes_failed.png")));
        assert_eq!(artifacts.diff, Some(run.dir.join("diff_Shapes.png")));

        let saved = image::open(run.dir.join("screenshot_Shapes_failed.png")).unwrap().to_rgba8();
        assert_eq!(saved.get_pixel(0, 0).0, [0, 0, 255, 255]);
    }

    #[test]
    fn test_pass_discards_workspace() {
        let base = tempfile::tempdir().unwrap();
        let run = RunArtifacts::create(base.path()).unwrap();
        let workspace = run.workspace("Text");
        fs::create_dir_all(&workspace).unwrap();
        fs::write(workspace.join("subject.log"), "ok").unwrap();
        let capture = Capture::new(solid(2, 2, [0, 0, 0, 255]), "memory").unwrap();

        let artifacts = run.discard("Text", Some(&capture));
        assert!(artifacts.is_empty());
        assert!(!workspace.exists());
        assert!(!run.capture_path("Text").exists());

        let keeping = run.clone().keep_passing(true);
        let kept = keeping.discard("Text", Some(&capture));
        assert_eq!(kept.capture, Some(run.capture_path("Text")));
    }

    #[test]
    fn test_build_failure_artifacts() {
        let base = tempfile::tempdir().unwrap();
        let run = RunArtifacts::create(base.path()).unwrap();
        let error = BuildError::Failed {
            exit_code: Some(1),
            stdout: "compiling".into(),
            stderr: "error: missing class".into(),
        };

        let artifacts = run.retain_build_failure("Text", Some("{\"main\": \"Text\"}"), &error);
        let log = fs::read_to_string(artifacts.build_log.unwrap()).unwrap();
        assert!(log.contains("error: missing class"));
        let descriptor = fs::read_to_string(artifacts.descriptor.unwrap()).unwrap();
        assert_eq!(descriptor, "{\"main\": \"Text\"}");
    }
}
