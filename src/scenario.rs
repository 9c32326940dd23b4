//! Scenario model, registry and suite manifest.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::artifacts::sanitize_name;
use crate::builder::BuildConfig;
use crate::capture::{CaptureConfig, Platform};
use crate::config;
use crate::display::DisplayConfig;
use crate::error::{VisregError, VisregResult};
use crate::supervisor::SubjectConfig;

/// How the difference metric is checked against the threshold
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompareMode {
    /// Percentage of differing pixels must be <= threshold
    #[default]
    MaxPercent,
    /// Absolute count of differing pixels must be <= threshold
    MaxPixelCount,
    /// No differing pixel allowed; threshold is implicitly zero
    Exact,
}

impl fmt::Display for CompareMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompareMode::MaxPercent => "max-percent",
            CompareMode::MaxPixelCount => "max-pixel-count",
            CompareMode::Exact => "exact",
        })
    }
}

impl FromStr for CompareMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "max-percent" | "percent" => Ok(CompareMode::MaxPercent),
            "max-pixel-count" | "pixel-count" | "count" => Ok(CompareMode::MaxPixelCount),
            "exact" => Ok(CompareMode::Exact),
            other => Err(format!(
                "unknown compare mode '{}' (expected max-percent, max-pixel-count or exact)",
                other
            )),
        }
    }
}

/// One named visual test case. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name; substituted into the build descriptor template
    pub name: String,

    /// Template override (the suite template is used when absent)
    pub template: Option<PathBuf>,

    /// Stored reference image
    pub reference: PathBuf,

    /// Pass threshold, interpreted according to `mode`
    pub threshold: f64,

    /// Threshold comparison mode
    pub mode: CompareMode,

    /// Border width (pixels) ignored when counting differences
    pub trim_edges: u32,

    /// Warm-up scenarios run the full pipeline but never fail the run
    pub warmup: bool,
}

impl Scenario {
    /// Create a scenario with the default percent threshold
    pub fn new(name: impl Into<String>, reference: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            template: None,
            reference: reference.into(),
            threshold: config::DEFAULT_THRESHOLD_PERCENT,
            mode: CompareMode::MaxPercent,
            trim_edges: 0,
            warmup: false,
        }
    }

    /// Set threshold and mode
    pub fn threshold(mut self, mode: CompareMode, threshold: f64) -> Self {
        self.mode = mode;
        self.threshold = threshold;
        self
    }

    /// Mark as a warm-up scenario
    pub fn warmup(mut self, warmup: bool) -> Self {
        self.warmup = warmup;
        self
    }

    /// Threshold actually applied (`exact` is always zero)
    pub fn effective_threshold(&self) -> f64 {
        match self.mode {
            CompareMode::Exact => 0.0,
            _ => self.threshold,
        }
    }

    fn validate(&self) -> VisregResult<()> {
        if self.name.trim().is_empty() {
            return Err(VisregError::Config("scenario name must not be empty".into()));
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(VisregError::Config(format!(
                "scenario '{}': threshold must be a non-negative number, got {}",
                self.name, self.threshold
            )));
        }
        if self.mode == CompareMode::MaxPixelCount && self.threshold.fract() != 0.0 {
            return Err(VisregError::Config(format!(
                "scenario '{}': max-pixel-count threshold must be an integer, got {}",
                self.name, self.threshold
            )));
        }
        Ok(())
    }
}

/// Ordered, validated set of scenarios for one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioRegistry {
    scenarios: Vec<Scenario>,
}

impl ScenarioRegistry {
    /// Build a registry, rejecting invalid thresholds and names that would share artifact paths
    pub fn new(scenarios: Vec<Scenario>) -> VisregResult<Self> {
        let mut seen: HashMap<String, &str> = HashMap::new();
        for scenario in &scenarios {
            scenario.validate()?;
            if let Some(other) = seen.insert(sanitize_name(&scenario.name), &scenario.name) {
                let message = if other == scenario.name {
                    format!("duplicate scenario name '{}'", scenario.name)
                } else {
                    format!(
                        "scenario names '{}' and '{}' map to the same artifact name",
                        other, scenario.name
                    )
                };
                return Err(VisregError::Config(message));
            }
        }
        Ok(Self { scenarios })
    }

    /// Keep only the named scenarios, preserving registry order
    pub fn only(&self, names: &[String]) -> VisregResult<Self> {
        if names.is_empty() {
            return Ok(self.clone());
        }
        for name in names {
            if self.get(name).is_none() {
                return Err(VisregError::Config(format!("unknown scenario '{}'", name)));
            }
        }
        let scenarios = self
            .scenarios
            .iter()
            .filter(|s| names.iter().any(|n| n == &s.name))
            .cloned()
            .collect();
        Ok(Self { scenarios })
    }

    pub fn get(&self, name: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Scenario> {
        self.scenarios.iter()
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

impl<'a> IntoIterator for &'a ScenarioRegistry {
    type Item = &'a Scenario;
    type IntoIter = std::slice::Iter<'a, Scenario>;

    fn into_iter(self) -> Self::IntoIter {
        self.scenarios.iter()
    }
}

// =============================================================================
// Suite manifest
// =============================================================================

/// Scenario entry in a manifest: a bare name or a detailed object
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScenarioEntry {
    Name(String),
    Detailed(ScenarioSpec),
}

/// Detailed scenario entry; unset fields fall back to suite defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub name: String,
    #[serde(default)]
    pub template: Option<PathBuf>,
    #[serde(default)]
    pub reference: Option<PathBuf>,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub mode: Option<CompareMode>,
    #[serde(default)]
    pub trim_edges: Option<u32>,
    #[serde(default)]
    pub warmup: bool,
}

/// Suite-wide comparison defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareDefaults {
    /// Per-channel fuzz tolerance in percent of channel range
    pub fuzz_percent: f64,
    /// Default mode for scenarios that do not set one
    pub mode: CompareMode,
    /// Default threshold for scenarios that do not set one
    pub threshold: f64,
    /// Default border trim
    pub trim_edges: u32,
    /// Write diff-visualization images for failing scenarios
    pub diff_images: bool,
}

impl Default for CompareDefaults {
    fn default() -> Self {
        Self {
            fuzz_percent: config::get().fuzz_percent,
            mode: CompareMode::MaxPercent,
            threshold: config::DEFAULT_THRESHOLD_PERCENT,
            trim_edges: 0,
            diff_images: true,
        }
    }
}

/// Complete description of a visual regression suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteManifest {
    /// Capture platform; host default when absent
    #[serde(default)]
    pub platform: Option<Platform>,

    #[serde(default)]
    pub display: DisplayConfig,

    pub build: BuildConfig,

    #[serde(default)]
    pub subject: SubjectConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub compare: CompareDefaults,

    /// Directory holding `<scenario>.png` reference images
    #[serde(default = "default_reference_dir")]
    pub reference_dir: PathBuf,

    /// Where run artifacts go; environment default when absent
    #[serde(default)]
    pub artifact_dir: Option<PathBuf>,

    /// Ordered scenario list
    pub scenarios: Vec<ScenarioEntry>,
}

fn default_reference_dir() -> PathBuf {
    PathBuf::from("expected")
}

impl SuiteManifest {
    /// Load a manifest; relative paths are resolved against the manifest's directory
    pub fn load(path: &Path) -> VisregResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            VisregError::Config(format!("cannot read manifest {}: {}", path.display(), e))
        })?;
        let mut manifest: SuiteManifest = serde_json::from_str(&text)?;
        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        manifest.rebase(base);
        Ok(manifest)
    }

    fn rebase(&mut self, base: &Path) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        rebase(&mut self.reference_dir);
        if let Some(dir) = self.artifact_dir.as_mut() {
            rebase(dir);
        }
        rebase(&mut self.build.template);
        rebase(&mut self.build.descriptor);
        rebase(&mut self.build.binary);
        match self.build.working_dir.as_mut() {
            Some(dir) => rebase(dir),
            None => self.build.working_dir = Some(base.to_path_buf()),
        }
        match self.subject.working_dir.as_mut() {
            Some(dir) => rebase(dir),
            None => self.subject.working_dir = Some(base.to_path_buf()),
        }
        for entry in &mut self.scenarios {
            if let ScenarioEntry::Detailed(spec) = entry {
                if let Some(t) = spec.template.as_mut() {
                    rebase(t);
                }
                if let Some(r) = spec.reference.as_mut() {
                    rebase(r);
                }
            }
        }
    }

    /// Resolve entries against suite defaults into a validated registry
    pub fn registry(&self) -> VisregResult<ScenarioRegistry> {
        let scenarios = self
            .scenarios
            .iter()
            .map(|entry| self.resolve(entry))
            .collect();
        ScenarioRegistry::new(scenarios)
    }

    fn resolve(&self, entry: &ScenarioEntry) -> Scenario {
        let spec = match entry {
            ScenarioEntry::Name(name) => ScenarioSpec {
                name: name.clone(),
                ..ScenarioSpec::default()
            },
            ScenarioEntry::Detailed(spec) => spec.clone(),
        };
        let reference = spec
            .reference
            .unwrap_or_else(|| self.reference_dir.join(format!("{}.png", spec.name)));
        Scenario {
            template: spec.template,
            reference,
            threshold: spec.threshold.unwrap_or(self.compare.threshold),
            mode: spec.mode.unwrap_or(self.compare.mode),
            trim_edges: spec.trim_edges.unwrap_or(self.compare.trim_edges),
            warmup: spec.warmup,
            name: spec.name,
        }
    }
}
