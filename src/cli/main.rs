//! Background Extraction CLI Tool
//!
//! Command-line interface for removing background gradients from
//! astronomical images using the extraction session and orchestrator.

use crate::{
    config::{
        Correction, ExtractionConfig, InterpolationMethod, PersistedSettings, RbfKernel,
    },
    extractor::BackgroundExtractor,
    points::GridParams,
    progress::{ProgressReporter, ProgressTracker},
    session::ExtractionSession,
    AstroImage,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Background gradient extraction CLI tool
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "skyflat")]
pub struct Cli {
    /// Input image file (PNG, JPEG or TIFF)
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output file [default: derived from the input stem]
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Preferences file to seed points and parameters from
    #[arg(short, long, value_name = "FILE")]
    pub preferences_file: Option<PathBuf>,

    /// Background modelling method
    #[arg(short, long, value_enum)]
    pub method: Option<CliMethod>,

    /// RBF kernel (thin-plate, linear, cubic, quintic)
    #[arg(long, default_value = "thin_plate")]
    pub kernel: String,

    /// Spline order (0-5)
    #[arg(long, default_value_t = 3)]
    pub spline_order: u8,

    /// Interpolation-vs-relaxation trade-off (0.0-1.0)
    #[arg(short, long)]
    pub smoothing: Option<f64>,

    /// Correction operator applied between image and background
    #[arg(short, long, value_enum)]
    pub correction: Option<CliCorrection>,

    /// Sample neighborhood radius in pixels
    #[arg(long)]
    pub sample_size: Option<u32>,

    /// Automatic grid columns when no points are seeded (4-25)
    #[arg(long, default_value_t = 15)]
    pub points_per_row: u32,

    /// Flood-selection tolerance in MAD units
    #[arg(long, default_value_t = 1.0)]
    pub tolerance: f64,

    /// Path to an ONNX background model (AI method)
    #[arg(long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Also save the extracted background next to the output
    #[arg(long)]
    pub bg: bool,

    /// Enable verbose logging (-v: INFO, -vv: DEBUG, -vvv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliMethod {
    Rbf,
    Kriging,
    Splines,
    Ai,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliCorrection {
    Subtraction,
    Division,
}

pub fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose).context("Failed to initialize tracing")?;

    let preferences = match &cli.preferences_file {
        Some(path) => Some(
            PersistedSettings::from_file(path)
                .with_context(|| format!("Failed to load preferences '{}'", path.display()))?,
        ),
        None => None,
    };

    let config = build_config(&cli, preferences.as_ref())?;
    info!(
        "Method: {}, smoothing: {}, correction: {:?}",
        config.method.name(),
        config.smoothing,
        config.correction
    );

    let dynamic = image::open(&cli.input)
        .with_context(|| format!("Failed to open '{}'", cli.input.display()))?;
    let image = AstroImage::from_dynamic_image(&dynamic).context("Failed to decode image")?;
    info!(
        "Loaded {}: {}x{}x{}",
        cli.input.display(),
        image.height(),
        image.width(),
        image.channels()
    );

    let mut session = ExtractionSession::new();
    session.load_image(image, preferences.as_ref());

    // Without seeded points, place an automatic flood-filtered grid
    if session.ledger().current_points().is_empty()
        && !matches!(config.method, InterpolationMethod::Ai)
    {
        let params = GridParams {
            points_per_row: cli.points_per_row,
            tolerance: cli.tolerance,
            sample_size: config.sample_size,
            flood_select: true,
        };
        session
            .add_grid_points(&params)
            .context("Automatic grid placement failed")?;
        info!(
            "Placed {} automatic sample points",
            session.ledger().current_points().len()
        );
    }

    let mut extractor = create_extractor(config)?;
    let bar = create_progress_bar();
    let tracker = ProgressTracker::new(Arc::new(BarReporter { bar: bar.clone() }));

    let start_time = Instant::now();
    let outcome = session
        .extract_blocking(&mut extractor, &tracker)
        .context("Background extraction failed")?;
    bar.finish_and_clear();

    info!(
        "Extraction finished in {:.2}s (background mean {:.5})",
        start_time.elapsed().as_secs_f64(),
        outcome.background_mean
    );

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| derived_output(&cli.input, "processed"));
    outcome
        .processed
        .to_dynamic_image()
        .save(&output)
        .with_context(|| format!("Failed to save '{}'", output.display()))?;
    println!("Saved corrected image to {}", output.display());

    if cli.bg {
        let bg_output = derived_output(&output, "background");
        outcome
            .background
            .to_dynamic_image()
            .save(&bg_output)
            .with_context(|| format!("Failed to save '{}'", bg_output.display()))?;
        println!("Saved background to {}", bg_output.display());
    }

    Ok(())
}

/// Resolve the effective configuration from preferences and CLI overrides
fn build_config(cli: &Cli, preferences: Option<&PersistedSettings>) -> Result<ExtractionConfig> {
    let base = match preferences {
        Some(settings) => settings
            .to_config()
            .context("Invalid preferences content")?,
        None => ExtractionConfig::default(),
    };

    let method = match cli.method {
        Some(CliMethod::Rbf) => InterpolationMethod::Rbf {
            kernel: RbfKernel::from_name(&cli.kernel)?,
        },
        Some(CliMethod::Kriging) => InterpolationMethod::Kriging,
        Some(CliMethod::Splines) => InterpolationMethod::Splines {
            order: cli.spline_order,
        },
        Some(CliMethod::Ai) => InterpolationMethod::Ai,
        None => base.method.clone(),
    };
    let correction = match cli.correction {
        Some(CliCorrection::Subtraction) => Correction::Subtraction,
        Some(CliCorrection::Division) => Correction::Division,
        None => base.correction,
    };

    let mut builder = ExtractionConfig::builder()
        .method(method)
        .correction(correction)
        .smoothing(cli.smoothing.unwrap_or(base.smoothing))
        .sample_size(cli.sample_size.unwrap_or(base.sample_size));
    if let Some(model) = &cli.model {
        builder = builder.model_path(model);
    }
    Ok(builder.build()?)
}

/// Create the extractor, attaching an inference backend for the AI method
fn create_extractor(config: ExtractionConfig) -> Result<BackgroundExtractor> {
    if matches!(config.method, InterpolationMethod::Ai) {
        #[cfg(feature = "tract")]
        {
            let backend = Box::new(crate::backends::TractBackend::new());
            return Ok(BackgroundExtractor::with_backend(config, backend));
        }
        #[cfg(not(feature = "tract"))]
        anyhow::bail!("The AI method requires the 'tract' feature");
    }
    Ok(BackgroundExtractor::new(config))
}

/// `name.ext` becomes `name_suffix.ext`, defaulting to TIFF output
fn derived_output(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map_or_else(|| "out".to_string(), |s| s.to_string_lossy().into_owned());
    let ext = input
        .extension()
        .map_or_else(|| "tiff".to_string(), |e| e.to_string_lossy().into_owned());
    input.with_file_name(format!("{stem}_{suffix}.{ext}"))
}

fn create_progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}

/// Forwards extraction progress onto the indicatif bar
struct BarReporter {
    bar: ProgressBar,
}

impl ProgressReporter for BarReporter {
    fn report(&self, fraction: f32) {
        self.bar
            .set_position((fraction.clamp(0.0, 1.0) * 100.0) as u64);
    }
}

/// Initialize tracing based on verbosity level
fn init_tracing(verbose_count: u8) -> Result<()> {
    use tracing_subscriber::EnvFilter;

    let level = match verbose_count {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("skyflat={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {e}"))?;

    match verbose_count {
        0 => {},
        1 => tracing::info!("Info level: showing informational messages"),
        2 => tracing::debug!("Debug level: showing internal state and computations"),
        _ => tracing::trace!("Trace level: showing detailed traces"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_output_names() {
        let out = derived_output(Path::new("/data/m31.tiff"), "processed");
        assert_eq!(out, PathBuf::from("/data/m31_processed.tiff"));
        let bg = derived_output(&out, "background");
        assert_eq!(bg, PathBuf::from("/data/m31_processed_background.tiff"));
    }

    #[test]
    fn test_cli_method_overrides_preferences() {
        let cli = Cli::parse_from([
            "skyflat",
            "input.tiff",
            "--method",
            "kriging",
            "--smoothing",
            "0.4",
        ]);
        let settings = PersistedSettings {
            interpol_type_option: Some("Splines".to_string()),
            smoothing: 0.9,
            ..PersistedSettings::default()
        };
        let config = build_config(&cli, Some(&settings)).unwrap();
        assert_eq!(config.method, InterpolationMethod::Kriging);
        assert!((config.smoothing - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_cli_defaults_fall_back_to_preferences() {
        let cli = Cli::parse_from(["skyflat", "input.tiff"]);
        let settings = PersistedSettings {
            interpol_type_option: Some("Kriging".to_string()),
            smoothing: 0.25,
            correction: Some("Division".to_string()),
            ..PersistedSettings::default()
        };
        let config = build_config(&cli, Some(&settings)).unwrap();
        assert_eq!(config.method, InterpolationMethod::Kriging);
        assert_eq!(config.correction, Correction::Division);
        assert!((config.smoothing - 0.25).abs() < 1e-12);
    }
}
