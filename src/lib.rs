#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Skyflat Background Extraction Library
//!
//! A Rust library for extracting and removing smooth background gradients
//! (light pollution, vignetting, skyglow) from astronomical images.
//!
//! The background is modelled from a set of sample points presumed to
//! contain only background signal, fitted with one of several interpolation
//! methods, and then subtracted from or divided out of the image. Sample
//! points live in a versioned, immutable ledger so every edit is undoable
//! and a running extraction is never disturbed by foreground changes.
//!
//! ## Features
//!
//! - **Interpolation Methods**: radial basis functions (thin-plate, linear,
//!   cubic, quintic kernels), dual ordinary Kriging, and least-squares
//!   B-spline surfaces
//! - **AI Method**: ONNX background-prediction models via Tract (pure Rust),
//!   with tiled inference and seam-free blending
//! - **Point Placement**: uniform grids with flood-style selection that
//!   avoids stars and nebulosity
//! - **Versioned Point Ledger**: append-only snapshot history with undo
//! - **Progress Reporting**: monotonic fractional progress to any sink
//! - **CLI Integration**: optional command-line interface (enable with the
//!   `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use skyflat::{
//!     AstroImage, BackgroundExtractor, ExtractionConfig, ExtractionSession,
//!     GridParams, ProgressTracker,
//! };
//!
//! # fn example() -> skyflat::Result<()> {
//! let dynamic = image::open("m31.tiff").map_err(skyflat::SkyflatError::from)?;
//! let mut session = ExtractionSession::new();
//! session.load_image(AstroImage::from_dynamic_image(&dynamic)?, None);
//! session.add_grid_points(&GridParams::default())?;
//!
//! let mut extractor = BackgroundExtractor::new(ExtractionConfig::default());
//! let outcome = session.extract_blocking(&mut extractor, &ProgressTracker::no_op())?;
//! outcome.processed.to_dynamic_image().save("m31_flat.tiff").ok();
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tract` (default): pure Rust ONNX backend for the AI method
//! - `cli` (default): command-line interface and progress bar
//!
//! To use only as a library without CLI dependencies:
//!
//! ```toml
//! [dependencies]
//! skyflat = { version = "0.2", default-features = false, features = ["tract"] }
//! ```

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod extractor;
pub mod fitting;
pub mod image;
pub mod inference;
pub mod ledger;
pub mod points;
pub mod progress;
pub mod session;

// Public API exports
pub use config::{
    Correction, ExtractionConfig, ExtractionConfigBuilder, InterpolationMethod,
    PersistedSettings, RbfKernel,
};
pub use error::{Result, SkyflatError};
pub use extractor::{BackgroundExtractor, ExtractionOutcome};
pub use image::AstroImage;
pub use inference::InferenceBackend;
pub use ledger::{EntryId, LedgerEntry, PointLedger, PointOp, PointSnapshot};
pub use points::{BackgroundPoint, GridParams};
pub use progress::{
    ChannelProgressReporter, ConsoleProgressReporter, NoOpProgressReporter, ProgressReporter,
    ProgressTracker,
};
pub use session::{ExtractionJob, ExtractionSession};

#[cfg(feature = "tract")]
pub use backends::TractBackend;

/// One-shot extraction over an image with automatically placed points
///
/// Places a flood-filtered grid with default parameters, fits the background
/// with the given configuration, and applies the configured correction. Use
/// [`ExtractionSession`] directly for point editing or worker-thread runs.
///
/// # Errors
/// Propagates precondition, fit and inference errors from the pipeline.
pub fn extract_background(
    image: AstroImage,
    config: ExtractionConfig,
) -> Result<ExtractionOutcome> {
    let mut session = ExtractionSession::new();
    session.load_image(image, None);
    if !matches!(config.method, InterpolationMethod::Ai) {
        let params = GridParams {
            sample_size: config.sample_size,
            ..GridParams::default()
        };
        session.add_grid_points(&params)?;
    }
    let mut extractor = BackgroundExtractor::new(config);
    session.extract_blocking(&mut extractor, &ProgressTracker::no_op())?;
    session
        .into_last_outcome()
        .ok_or_else(|| SkyflatError::internal("Extraction finished without an outcome"))
}
