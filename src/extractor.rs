//! Extraction orchestration
//!
//! `BackgroundExtractor` owns the end-to-end flow: validate the method's
//! point-count precondition, dispatch to the interpolation fitter or the
//! inference runner, apply the configured correction, and classify every
//! failure with enough context to log. It never mutates its inputs; both
//! the background surface and the corrected image come back as new arrays.

use crate::config::{Correction, ExtractionConfig, InterpolationMethod};
use crate::error::{Result, SkyflatError};
use crate::fitting;
use crate::image::AstroImage;
use crate::inference::{self, InferenceBackend};
use crate::points::BackgroundPoint;
use crate::progress::ProgressTracker;
use ndarray::Array3;

/// Division guard against near-zero background values
const DIVISION_EPSILON: f32 = 1e-6;

/// Result of a successful extraction run
#[derive(Debug)]
pub struct ExtractionOutcome {
    /// Dense background estimate, same shape as the input image
    pub background: AstroImage,
    /// Corrected image after applying the configured operator
    pub processed: AstroImage,
    /// Mean background level, for stamping into image metadata
    pub background_mean: f32,
}

/// Orchestrator tying together fitting, inference and correction
pub struct BackgroundExtractor {
    config: ExtractionConfig,
    backend: Option<Box<dyn InferenceBackend>>,
}

impl BackgroundExtractor {
    /// Create an extractor for interpolation methods
    #[must_use]
    pub fn new(config: ExtractionConfig) -> Self {
        Self {
            config,
            backend: None,
        }
    }

    /// Create an extractor with an inference backend for the AI method
    #[must_use]
    pub fn with_backend(config: ExtractionConfig, backend: Box<dyn InferenceBackend>) -> Self {
        Self {
            config,
            backend: Some(backend),
        }
    }

    /// The configuration this extractor runs with
    #[must_use]
    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Run one extraction over the given image and point snapshot
    ///
    /// # Errors
    /// - `Precondition` when the point count is below the method minimum
    /// - `Fit` when the interpolation system is degenerate
    /// - `Inference` for model loading or inference failures
    pub fn extract(
        &mut self,
        image: &AstroImage,
        points: &[BackgroundPoint],
        progress: &ProgressTracker,
    ) -> Result<ExtractionOutcome> {
        let required = self.config.method.min_points();
        if points.len() < required {
            return Err(SkyflatError::insufficient_points(
                self.config.method.name(),
                required,
                points.len(),
            ));
        }

        log::info!(
            "Extracting background: method={}, points={}, image={}x{}x{}, correction={:?}",
            self.config.method.name(),
            points.len(),
            image.height(),
            image.width(),
            image.channels(),
            self.config.correction
        );

        let background = match self.config.method {
            InterpolationMethod::Ai => {
                let backend = self.backend.as_deref_mut().ok_or_else(|| {
                    SkyflatError::inference("The AI method requires an inference backend")
                })?;
                backend.initialize(&self.config)?;
                progress.report(0.05);
                inference::predict_background(backend, image, &progress.slice(0.05, 0.85))?
            },
            _ => fitting::fit_background(image, points, &self.config, &progress.slice(0.0, 0.9))
                .map_err(|e| match e {
                    SkyflatError::Fit(detail) => SkyflatError::fit_error_with_context(
                        self.config.method.name(),
                        &detail,
                        points.len(),
                        image.shape(),
                    ),
                    other => other,
                })?,
        };

        let (processed, background_mean) =
            apply_correction(image, &background, self.config.correction)?;
        progress.report(1.0);

        Ok(ExtractionOutcome {
            background,
            processed,
            background_mean,
        })
    }
}

/// Apply the correction operator, returning the corrected image and the
/// background mean used for normalization
fn apply_correction(
    image: &AstroImage,
    background: &AstroImage,
    correction: Correction,
) -> Result<(AstroImage, f32)> {
    if image.shape() != background.shape() {
        return Err(SkyflatError::internal(format!(
            "Background shape {:?} does not match image shape {:?}",
            background.shape(),
            image.shape()
        )));
    }
    let background_mean = background.mean();
    let data: Array3<f32> = match correction {
        Correction::Subtraction => image.data() - background.data(),
        Correction::Division => {
            let mut out = image.data().clone();
            out.zip_mut_with(background.data(), |v, &b| {
                *v = *v / b.max(DIVISION_EPSILON) * background_mean;
            });
            out
        },
    };
    Ok((AstroImage::from_array(data)?, background_mean))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::mock::MockBackend;
    use crate::config::RbfKernel;
    use crate::points::{generate_grid, GridParams};
    use ndarray::Array3;

    fn gradient_image(h: usize, w: usize) -> AstroImage {
        let data = Array3::from_shape_fn((h, w, 1), |(_, x, _)| 0.1 + 0.001 * x as f32);
        AstroImage::from_array(data).unwrap()
    }

    fn uniform_points(image: &AstroImage, per_row: u32) -> Vec<BackgroundPoint> {
        let params = GridParams {
            points_per_row: per_row,
            tolerance: 1.0,
            sample_size: 3,
            flood_select: false,
        };
        generate_grid(image, &params).unwrap()
    }

    fn rbf_config() -> ExtractionConfig {
        ExtractionConfig::builder()
            .method(InterpolationMethod::Rbf {
                kernel: RbfKernel::ThinPlate,
            })
            .sample_size(3)
            .build()
            .unwrap()
    }

    #[test]
    fn test_subtraction_round_trip() {
        let image = gradient_image(64, 64);
        let points = uniform_points(&image, 6);
        let mut extractor = BackgroundExtractor::new(rbf_config());
        let outcome = extractor
            .extract(&image, &points, &ProgressTracker::no_op())
            .unwrap();

        assert_eq!(outcome.background.shape(), image.shape());
        assert_eq!(outcome.processed.shape(), image.shape());
        // corrected + background recovers the input within float tolerance
        for ((p, b), v) in outcome
            .processed
            .data()
            .iter()
            .zip(outcome.background.data().iter())
            .zip(image.data().iter())
        {
            assert!((p + b - v).abs() < 1e-5);
        }
    }

    #[test]
    fn test_division_flattens_pure_gradient() {
        let image = gradient_image(64, 64);
        let points = uniform_points(&image, 6);
        let config = ExtractionConfig::builder()
            .method(InterpolationMethod::Rbf {
                kernel: RbfKernel::ThinPlate,
            })
            .correction(Correction::Division)
            .sample_size(3)
            .build()
            .unwrap();
        let mut extractor = BackgroundExtractor::new(config);
        let outcome = extractor
            .extract(&image, &points, &ProgressTracker::no_op())
            .unwrap();

        // Gradient image divided by its own model is flat at the mean level
        let mean = outcome.background_mean;
        let interior = outcome.processed.data()[[32, 32, 0]];
        assert!((interior - mean).abs() < 0.01, "got {interior}, mean {mean}");
    }

    #[test]
    fn test_minimum_point_gating() {
        let image = gradient_image(64, 64);
        let mut extractor = BackgroundExtractor::new(rbf_config());
        let result = extractor.extract(
            &image,
            &[BackgroundPoint::new(32.0, 32.0)],
            &ProgressTracker::no_op(),
        );
        assert!(matches!(result, Err(SkyflatError::Precondition(_))));
    }

    #[test]
    fn test_fit_failure_carries_context() {
        let image = gradient_image(64, 64);
        // Duplicate coordinates make the collocation matrix singular
        let points = vec![
            BackgroundPoint::new(20.0, 20.0),
            BackgroundPoint::new(20.0, 20.0),
        ];
        let mut extractor = BackgroundExtractor::new(rbf_config());
        let err = extractor
            .extract(&image, &points, &ProgressTracker::no_op())
            .unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, SkyflatError::Fit(_)));
        assert!(msg.contains("RBF"), "missing method in: {msg}");
        assert!(msg.contains("64x64x1"), "missing shape in: {msg}");
    }

    #[test]
    fn test_ai_method_requires_backend() {
        let image = gradient_image(64, 64);
        let config = ExtractionConfig::builder()
            .method(InterpolationMethod::Ai)
            .build()
            .unwrap();
        let mut extractor = BackgroundExtractor::new(config);
        let result = extractor.extract(&image, &[], &ProgressTracker::no_op());
        assert!(matches!(result, Err(SkyflatError::Inference(_))));
    }

    #[test]
    fn test_ai_method_ignores_points() {
        let image = gradient_image(64, 64);
        let config = ExtractionConfig::builder()
            .method(InterpolationMethod::Ai)
            .build()
            .unwrap();
        let mut extractor =
            BackgroundExtractor::with_backend(config, Box::new(MockBackend::channel_mean(64)));
        // Zero points is valid for AI; the surface comes from the model
        let outcome = extractor
            .extract(&image, &[], &ProgressTracker::no_op())
            .unwrap();
        assert_eq!(outcome.background.shape(), image.shape());
        let expected = image.mean();
        assert!((outcome.background_mean - expected).abs() < 1e-3);
    }

    #[test]
    fn test_background_mean_reported() {
        let image = gradient_image(64, 64);
        let points = uniform_points(&image, 6);
        let mut extractor = BackgroundExtractor::new(rbf_config());
        let outcome = extractor
            .extract(&image, &points, &ProgressTracker::no_op())
            .unwrap();
        assert!((outcome.background_mean - outcome.background.mean()).abs() < 1e-6);
    }
}
