//! Scenario build driver: descriptor templating and the external build tool.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config;
use crate::error::BuildError;
use crate::scenario::Scenario;

/// Substitute the scenario name into a descriptor template
pub fn render(template: &str, token: &str, scenario: &str) -> String {
    template.replace(token, scenario)
}

/// External build tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Build tool program (e.g. `npx`)
    pub program: String,

    /// Fixed build tool arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Descriptor template containing the substitution token
    pub template: PathBuf,

    /// Where the build tool expects the rendered descriptor
    #[serde(default = "default_descriptor")]
    pub descriptor: PathBuf,

    /// Substitution token in the template
    #[serde(default = "default_token")]
    pub token: String,

    /// Binary produced on success
    pub binary: PathBuf,

    /// Working directory of the build tool
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Extra environment for the build tool
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Run through the platform shell (needed for `.cmd` shims on Windows). Each of `program`
    /// and `args` is quoted as a single word.
    #[serde(default)]
    pub shell: bool,

    /// Leave the rendered descriptor in place after the build
    #[serde(default)]
    pub keep_descriptor: bool,
}

fn default_descriptor() -> PathBuf {
    PathBuf::from("build.json")
}

fn default_token() -> String {
    config::DEFAULT_TEMPLATE_TOKEN.to_string()
}

impl BuildConfig {
    pub fn new(
        program: impl Into<String>,
        template: impl Into<PathBuf>,
        binary: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            template: template.into(),
            descriptor: default_descriptor(),
            token: default_token(),
            binary: binary.into(),
            working_dir: None,
            env: BTreeMap::new(),
            shell: false,
            keep_descriptor: false,
        }
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn descriptor(mut self, path: impl Into<PathBuf>) -> Self {
        self.descriptor = path.into();
        self
    }
}

/// Quote one word for the platform shell; plain words pass through unchanged
fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=+,@%".contains(c));
    if plain {
        word.to_string()
    } else if cfg!(windows) {
        format!("\"{}\"", word.replace('"', "\"\""))
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

/// Command line handed to `sh -c` / `cmd /C`; every word is quoted as one argument
fn shell_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .map(shell_quote)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Produces a runnable test binary for a scenario
pub trait ScenarioBuilder {
    /// Render the build descriptor for `scenario`
    fn descriptor(&self, scenario: &Scenario) -> Result<String, BuildError>;

    /// Build with the rendered descriptor; returns the binary path
    fn build(&self, scenario: &Scenario, descriptor: &str) -> Result<PathBuf, BuildError>;
}

/// Builds by writing the descriptor to disk and running the external build tool
#[derive(Debug, Clone)]
pub struct CommandBuildDriver {
    config: BuildConfig,
}

impl CommandBuildDriver {
    pub fn new(config: BuildConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    fn command(&self) -> Command {
        let mut cmd = if self.config.shell {
            let line = shell_line(&self.config.program, &self.config.args);
            if cfg!(windows) {
                let mut c = Command::new("cmd");
                c.args(["/C", &line]);
                c
            } else {
                let mut c = Command::new("sh");
                c.args(["-c", &line]);
                c
            }
        } else {
            let mut c = Command::new(&self.config.program);
            c.args(&self.config.args);
            c
        };
        cmd.envs(&self.config.env);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    fn remove_stale_binary(&self) {
        match fs::remove_file(&self.config.binary) {
            Ok(()) => debug!(binary = %self.config.binary.display(), "removed previous binary"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(binary = %self.config.binary.display(), error = %err, "could not remove previous binary"),
        }
    }

    fn write_descriptor(&self, descriptor: &str) -> Result<(), BuildError> {
        let path = &self.config.descriptor;
        let descriptor_err = |source| BuildError::Descriptor {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(descriptor_err)?;
        }
        fs::write(path, descriptor).map_err(descriptor_err)
    }
}

impl ScenarioBuilder for CommandBuildDriver {
    fn descriptor(&self, scenario: &Scenario) -> Result<String, BuildError> {
        let path: &Path = scenario.template.as_deref().unwrap_or(&self.config.template);
        let template = fs::read_to_string(path).map_err(|source| BuildError::Template {
            path: path.to_path_buf(),
            source,
        })?;
        if !template.contains(&self.config.token) {
            warn!(
                scenario = %scenario.name,
                template = %path.display(),
                token = %self.config.token,
                "template has no substitution token"
            );
        }
        Ok(render(&template, &self.config.token, &scenario.name))
    }

    fn build(&self, scenario: &Scenario, descriptor: &str) -> Result<PathBuf, BuildError> {
        self.remove_stale_binary();
        self.write_descriptor(descriptor)?;

        let started = Instant::now();
        info!(scenario = %scenario.name, program = %self.config.program, "building");
        let output = self.command().output().map_err(|source| BuildError::Spawn {
            program: self.config.program.clone(),
            source,
        });

        if !self.config.keep_descriptor {
            let _ = fs::remove_file(&self.config.descriptor);
        }

        let output = output?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        info!(
            scenario = %scenario.name,
            status = %output.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "build finished"
        );

        if !output.status.success() {
            return Err(BuildError::Failed {
                exit_code: output.status.code(),
                stdout,
                stderr,
            });
        }
        if !self.config.binary.is_file() {
            return Err(BuildError::MissingBinary {
                path: self.config.binary.clone(),
                stdout,
                stderr,
            });
        }
        Ok(self.config.binary.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_replaces_every_token() {
        let template = r#"{"main": "{TEST_CASE}", "out": "bin/{TEST_CASE}"}"#;
        assert_eq!(
            render(template, "{TEST_CASE}", "Text"),
            r#"{"main": "Text", "out": "bin/Text"}"#
        );
        assert_eq!(render("no token", "{TEST_CASE}", "Text"), "no token");
    }

    #[test]
    fn test_descriptor_uses_scenario_template_override() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("suite.json"), "suite {TEST_CASE}").unwrap();
        std::fs::write(dir.path().join("own.json"), "own {TEST_CASE}").unwrap();

        let driver = CommandBuildDriver::new(BuildConfig::new(
            "true",
            dir.path().join("suite.json"),
            dir.path().join("bin"),
        ));
        let plain = Scenario::new("Shapes", "Shapes.png");
        assert_eq!(driver.descriptor(&plain).unwrap(), "suite Shapes");

        let mut custom = Scenario::new("Text", "Text.png");
        custom.template = Some(dir.path().join("own.json"));
        assert_eq!(driver.descriptor(&custom).unwrap(), "own Text");
    }

    #[test]
    fn test_missing_template_is_build_error() {
        let driver = CommandBuildDriver::new(BuildConfig::new("true", "/nonexistent/template.json", "bin"));
        let result = driver.descriptor(&Scenario::new("A", "A.png"));
        assert!(matches!(result, Err(BuildError::Template { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_build_writes_descriptor_and_finds_binary() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("out").join("SystemTests");
        let config = BuildConfig::new("sh", dir.path().join("template.json"), &binary)
            .args(["-c", "mkdir -p out && cp build.json out/SystemTests"])
            .descriptor(dir.path().join("build.json"));
        let config = BuildConfig {
            working_dir: Some(dir.path().to_path_buf()),
            ..config
        };
        let driver = CommandBuildDriver::new(config);

        let built = driver.build(&Scenario::new("Text", "Text.png"), "descriptor for Text").unwrap();
        assert_eq!(built, binary);
        assert_eq!(std::fs::read_to_string(&binary).unwrap(), "descriptor for Text");
        // descriptor is cleaned up unless keep_descriptor is set
        assert!(!dir.path().join("build.json").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_line_quotes_each_argument() {
        let args = vec!["--file=build.json".to_string(), "out dir".to_string(), "it's".to_string()];
        assert_eq!(
            shell_line("premake5", &args),
            "premake5 --file=build.json 'out dir' 'it'\\''s'"
        );
        assert_eq!(shell_line("make", &[String::new()]), "make ''");
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_build_keeps_arguments_with_spaces_intact() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("out dir").join("SystemTests");
        let mut config = BuildConfig::new("sh", dir.path().join("template.json"), &binary)
            .args(["-c", "mkdir -p \"out dir\" && cp build.json \"out dir/SystemTests\""])
            .descriptor(dir.path().join("build.json"));
        config.working_dir = Some(dir.path().to_path_buf());
        config.shell = true;
        let driver = CommandBuildDriver::new(config);

        let built = driver.build(&Scenario::new("Text", "Text.png"), "shell descriptor").unwrap();
        assert_eq!(built, binary);
        assert_eq!(std::fs::read_to_string(&binary).unwrap(), "shell descriptor");
    }

    #[cfg(unix)]
    #[test]
    fn test_build_failure_carries_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = BuildConfig::new("sh", dir.path().join("template.json"), dir.path().join("bin"))
            .args(["-c", "echo compiling; echo broken >&2; exit 3"])
            .descriptor(dir.path().join("build.json"));
        let driver = CommandBuildDriver::new(config);

        match driver.build(&Scenario::new("A", "A.png"), "{}") {
            Err(BuildError::Failed { exit_code, stdout, stderr }) => {
                assert_eq!(exit_code, Some(3));
                assert_eq!(stdout.trim(), "compiling");
                assert_eq!(stderr.trim(), "broken");
            }
            other => panic!("expected build failure, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_stale_binary_does_not_mask_missing_output() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("SystemTests");
        std::fs::write(&binary, "left over from the previous scenario").unwrap();

        let config = BuildConfig::new("true", dir.path().join("template.json"), &binary)
            .descriptor(dir.path().join("build.json"));
        let driver = CommandBuildDriver::new(config);

        let result = driver.build(&Scenario::new("B", "B.png"), "{}");
        assert!(matches!(result, Err(BuildError::MissingBinary { .. })));
    }
}
