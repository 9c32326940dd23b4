use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

use visreg::capture::{Platform, solid};
use visreg::compare::{self, CompareOptions};
use visreg::config;
use visreg::error::{CompareError, VisregError, VisregResult};
use visreg::runner::{self, RunConfig};
use visreg::scenario::{CompareMode, SuiteManifest};

/// visreg - visual regression runner for rendering test binaries
#[derive(Parser, Debug)]
#[command(
    name = "visreg",
    version,
    about = "Build, run, capture and compare rendering scenarios against reference images",
    after_help = "ENVIRONMENT VARIABLES:\n\
        VISREG_ARTIFACT_DIR   Base directory for run artifacts\n\
        VISREG_DISPLAY        Virtual display number\n\
        VISREG_RESOLUTION     Virtual screen geometry (WxHxD)\n\
        VISREG_SETTLE_MS      Settle delay after launching a subject (ms)\n\
        VISREG_GRACE_MS       Grace period before a forced kill (ms)\n\
        VISREG_FUZZ_PERCENT   Per-channel fuzz tolerance (percent)\n\
        VISREG_PLATFORM       Capture platform (x11, x11-framebuffer, windows)\n\
        RUST_LOG              Log filter (default: visreg=info)"
)]
struct Cli {
    /// Debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run every scenario of a suite manifest
    Run {
        /// Suite manifest
        #[arg(short, long, env = "VISREG_MANIFEST", default_value = "visreg.json")]
        manifest: PathBuf,

        /// Only run the named scenario (repeatable)
        #[arg(long)]
        only: Vec<String>,

        /// Capture platform: x11, x11-framebuffer or windows
        #[arg(short, long)]
        platform: Option<Platform>,

        /// Base directory for run artifacts
        #[arg(short, long)]
        artifact_dir: Option<PathBuf>,

        /// Per-channel fuzz tolerance in percent
        #[arg(long)]
        fuzz: Option<f64>,

        /// Keep captures of passing scenarios as well
        #[arg(long, short = 'k')]
        keep_captures: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare two image files
    Compare {
        /// Captured image
        capture: PathBuf,

        /// Reference image
        reference: PathBuf,

        /// max-percent, max-pixel-count or exact
        #[arg(short, long, default_value = "max-percent")]
        mode: CompareMode,

        #[arg(short, long, default_value_t = config::DEFAULT_THRESHOLD_PERCENT)]
        threshold: f64,

        /// Per-channel fuzz tolerance in percent
        #[arg(long, env = "VISREG_FUZZ_PERCENT", default_value_t = config::DEFAULT_FUZZ_PERCENT)]
        fuzz: f64,

        /// Border width to ignore
        #[arg(long, default_value_t = 0)]
        trim_edges: u32,

        /// Write a diff image here when the comparison fails
        #[arg(short, long)]
        diff: Option<PathBuf>,
    },

    /// Write a solid-color PNG (reference fixtures)
    Solid {
        #[arg(short = 'W', long, default_value_t = config::DEFAULT_SCREEN_WIDTH)]
        width: u32,

        #[arg(short = 'H', long, default_value_t = config::DEFAULT_SCREEN_HEIGHT)]
        height: u32,

        /// Fill color as hex RRGGBB or RRGGBBAA
        #[arg(short, long, default_value = "000000")]
        color: String,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// List the scenarios of a suite manifest in run order
    List {
        #[arg(short, long, env = "VISREG_MANIFEST", default_value = "visreg.json")]
        manifest: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "visreg=debug" } else { "visreg=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match execute(cli.command) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!(error = %err, "aborted");
            eprintln!("error: {}", err);
            ExitCode::from(2)
        }
    }
}

fn execute(command: Commands) -> VisregResult<u8> {
    match command {
        Commands::Run {
            manifest,
            only,
            platform,
            artifact_dir,
            fuzz,
            keep_captures,
            json,
        } => {
            let manifest = SuiteManifest::load(&manifest)?;
            let registry = manifest.registry()?.only(&only)?;
            if registry.is_empty() {
                return Err(VisregError::Config("manifest has no scenarios".into()));
            }

            let mut config = RunConfig::from_manifest(&manifest)?;
            if let Some(platform) = platform {
                config.platform = platform;
            }
            if let Some(dir) = artifact_dir {
                config.artifact_dir = dir;
            }
            if let Some(fuzz) = fuzz {
                config.compare.fuzz_percent = fuzz;
            }
            config.keep_passing = keep_captures;

            let report = runner::run(&config, &registry)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.summary());
            }
            Ok(report.exit_code())
        }

        Commands::Compare {
            capture,
            reference,
            mode,
            threshold,
            fuzz,
            trim_edges,
            diff,
        } => {
            let options = CompareOptions {
                diff_image: diff.is_some(),
                ..CompareOptions::default()
            }
            .with_fuzz_percent(fuzz)
            .with_trim_edges(trim_edges);

            let captured = image::open(&capture)?.to_rgba8();
            let expected = compare::load_reference(&reference)?;
            let comparison = match compare::compare_images(&captured, &expected, threshold, mode, &options) {
                Ok(comparison) => comparison,
                Err(err @ (CompareError::DimensionMismatch { .. } | CompareError::EmptyRegion { .. })) => {
                    println!("fail: {}", err);
                    return Ok(1);
                }
                Err(err) => return Err(err.into()),
            };

            let unit = if mode == CompareMode::MaxPercent { "%" } else { " px" };
            println!(
                "{}: {:.3}{} differ ({} of {} pixels), threshold {}{}",
                if comparison.passed { "pass" } else { "fail" },
                comparison.metric,
                unit,
                comparison.differing_pixels,
                comparison.total_pixels,
                comparison.threshold,
                unit
            );
            if let (Some(path), Some(image)) = (diff, comparison.diff.as_ref()) {
                image.save_with_format(&path, image::ImageFormat::Png)?;
                println!("diff image: {}", path.display());
            }
            Ok(if comparison.passed { 0 } else { 1 })
        }

        Commands::Solid {
            width,
            height,
            color,
            output,
        } => {
            if width == 0 || height == 0 {
                return Err(VisregError::Config("width and height must be non-zero".into()));
            }
            let rgba = parse_hex_color(&color)?;
            solid(width, height, rgba).save_with_format(&output, image::ImageFormat::Png)?;
            println!("Created {}x{} image: {}", width, height, output.display());
            Ok(0)
        }

        Commands::List { manifest } => {
            let manifest = SuiteManifest::load(&manifest)?;
            let registry = manifest.registry()?;
            for scenario in &registry {
                println!(
                    "{}{}  {} <= {}  {}",
                    scenario.name,
                    if scenario.warmup { " (warm-up)" } else { "" },
                    scenario.mode,
                    scenario.effective_threshold(),
                    scenario.reference.display()
                );
            }
            Ok(0)
        }
    }
}

fn parse_hex_color(hex: &str) -> VisregResult<[u8; 4]> {
    let hex = hex.trim_start_matches('#');
    let invalid = || VisregError::Config(format!("color must be RRGGBB or RRGGBBAA hex, got '{}'", hex));
    if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
        return Err(invalid());
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
    let alpha = if hex.len() == 8 { channel(6)? } else { 255 };
    Ok([channel(0)?, channel(2)?, channel(4)?, alpha])
}
