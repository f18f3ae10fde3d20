//! Background surface fitting over the selected sample points
//!
//! Each channel is fitted independently from the per-point sample medians.
//! Kernel methods run on a reduced evaluation grid (their solve cost grows
//! superlinearly with point spacing density) and the coarse surface is
//! brought back to full resolution with bicubic resampling.

pub mod kriging;
pub mod rbf;
pub mod splines;

use crate::config::{ExtractionConfig, InterpolationMethod};
use crate::error::{Result, SkyflatError};
use crate::image::AstroImage;
use crate::points::{sample_values, BackgroundPoint};
use crate::progress::ProgressSlice;
use kriging::KrigingInterpolator;
use ndarray::Array3;
use rayon::prelude::*;
use rbf::RbfInterpolator;
use splines::SplineSurface;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A fitted per-channel surface, evaluated in reduced-grid coordinates
enum Surface {
    Rbf(RbfInterpolator),
    Kriging(KrigingInterpolator),
    Spline {
        surface: SplineSurface,
        u_scale: f64,
        v_scale: f64,
    },
}

impl Surface {
    fn eval(&self, x: f64, y: f64) -> f64 {
        match self {
            Self::Rbf(rbf) => rbf.eval(x, y),
            Self::Kriging(kriging) => kriging.eval(x, y),
            Self::Spline {
                surface,
                u_scale,
                v_scale,
            } => surface.eval(x * u_scale, y * v_scale),
        }
    }
}

/// Fit the background surface for `image` through the given sample points
///
/// Samples are taken at full resolution as per-channel neighborhood medians,
/// point coordinates are mapped into the reduced grid, and the coarse
/// surface is resampled back to the image dimensions. Progress covers
/// sampling, per-channel solving and grid evaluation.
///
/// # Errors
/// Returns `Precondition` when the point count is below the method minimum
/// and `Fit` when the interpolation system cannot be solved. The AI method
/// is not handled here and yields `Internal`.
pub fn fit_background(
    image: &AstroImage,
    points: &[BackgroundPoint],
    config: &ExtractionConfig,
    progress: &ProgressSlice<'_>,
) -> Result<AstroImage> {
    if matches!(config.method, InterpolationMethod::Ai) {
        return Err(SkyflatError::internal(
            "AI extraction routed into the interpolation fitter",
        ));
    }
    let required = config.method.min_points();
    if points.len() < required {
        return Err(SkyflatError::insufficient_points(
            config.method.name(),
            required,
            points.len(),
        ));
    }

    let (h, w, c) = image.shape();
    let factor = config.method.downscale_factor() as usize;
    let gh = h.div_ceil(factor).max(2);
    let gw = w.div_ceil(factor).max(2);

    log::debug!(
        "Fitting {} background from {} points on a {gw}x{gh} grid (factor {factor})",
        config.method.name(),
        points.len()
    );

    // Robust per-point values come from the full-resolution image
    let samples: Vec<Vec<f32>> = points
        .par_iter()
        .map(|p| sample_values(image, p, config.sample_size))
        .collect();
    progress.report(0.05);

    let inv = 1.0 / factor as f64;
    let centers: Vec<(f64, f64)> = points.iter().map(|p| (p.x * inv, p.y * inv)).collect();

    let mut coarse = Array3::<f32>::zeros((gh, gw, c));
    let total_rows = gh * c;
    let rows_done = AtomicUsize::new(0);
    let eval_span = progress.sub(0.05, 0.9);

    for ch in 0..c {
        let values: Vec<f64> = samples.iter().map(|s| f64::from(s[ch])).collect();
        let surface = fit_surface(config, &centers, &values, gw, gh)?;

        let rows: Vec<Vec<f32>> = (0..gh)
            .into_par_iter()
            .map(|gy| {
                let row: Vec<f32> = (0..gw)
                    .map(|gx| surface.eval(gx as f64, gy as f64) as f32)
                    .collect();
                let done = rows_done.fetch_add(1, Ordering::Relaxed) + 1;
                if done % 16 == 0 || done == total_rows {
                    eval_span.report(done as f32 / total_rows as f32);
                }
                row
            })
            .collect();
        for (gy, row) in rows.iter().enumerate() {
            for (gx, &value) in row.iter().enumerate() {
                coarse[[gy, gx, ch]] = value;
            }
        }
    }

    let background = AstroImage::from_array(coarse)?.resample_to(h, w);
    progress.report(1.0);
    Ok(background)
}

/// Solve one channel's surface for the configured method
fn fit_surface(
    config: &ExtractionConfig,
    centers: &[(f64, f64)],
    values: &[f64],
    grid_width: usize,
    grid_height: usize,
) -> Result<Surface> {
    match config.method {
        InterpolationMethod::Rbf { kernel } => Ok(Surface::Rbf(RbfInterpolator::fit(
            centers.to_vec(),
            values,
            kernel,
            config.smoothing,
        )?)),
        InterpolationMethod::Kriging => Ok(Surface::Kriging(KrigingInterpolator::fit(
            centers.to_vec(),
            values,
            config.smoothing,
        )?)),
        InterpolationMethod::Splines { order } => {
            let u_scale = 1.0 / (grid_width - 1) as f64;
            let v_scale = 1.0 / (grid_height - 1) as f64;
            let normalized: Vec<(f64, f64)> = centers
                .iter()
                .map(|&(x, y)| (x * u_scale, y * v_scale))
                .collect();
            let surface = SplineSurface::fit(&normalized, values, order, config.smoothing)?;
            Ok(Surface::Spline {
                surface,
                u_scale,
                v_scale,
            })
        },
        InterpolationMethod::Ai => Err(SkyflatError::internal(
            "AI extraction routed into the interpolation fitter",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RbfKernel;
    use crate::points::{generate_grid, GridParams};
    use crate::progress::ProgressTracker;
    use ndarray::Array3;

    fn gradient_image(h: usize, w: usize) -> AstroImage {
        let data = Array3::from_shape_fn((h, w, 1), |(_, x, _)| 0.1 + 0.2 * x as f32 / w as f32);
        AstroImage::from_array(data).unwrap()
    }

    fn grid_points(image: &AstroImage, per_row: u32) -> Vec<BackgroundPoint> {
        let params = GridParams {
            points_per_row: per_row,
            tolerance: 1.0,
            sample_size: 3,
            flood_select: false,
        };
        generate_grid(image, &params).unwrap()
    }

    #[test]
    fn test_rbf_recovers_horizontal_gradient() {
        let image = gradient_image(80, 80);
        let points = grid_points(&image, 8);
        let config = ExtractionConfig::builder()
            .method(InterpolationMethod::Rbf {
                kernel: RbfKernel::ThinPlate,
            })
            .sample_size(3)
            .build()
            .unwrap();
        let tracker = ProgressTracker::no_op();
        let background =
            fit_background(&image, &points, &config, &tracker.slice(0.0, 1.0)).unwrap();

        assert_eq!(background.shape(), image.shape());
        // Interior values track the underlying ramp
        for &(y, x) in &[(40usize, 20usize), (40, 40), (20, 60)] {
            let expected = image.data()[[y, x, 0]];
            let got = background.data()[[y, x, 0]];
            assert!(
                (got - expected).abs() < 0.02,
                "({y}, {x}): got {got}, want {expected}"
            );
        }
    }

    #[test]
    fn test_spline_surface_full_resolution_grid() {
        let image = gradient_image(60, 60);
        let points = grid_points(&image, 5); // 25 points, above the 16 minimum
        let config = ExtractionConfig::builder()
            .method(InterpolationMethod::Splines { order: 3 })
            .sample_size(3)
            .build()
            .unwrap();
        let tracker = ProgressTracker::no_op();
        let background =
            fit_background(&image, &points, &config, &tracker.slice(0.0, 1.0)).unwrap();
        assert_eq!(background.shape(), image.shape());
        let got = background.data()[[30, 30, 0]];
        let expected = image.data()[[30, 30, 0]];
        assert!((got - expected).abs() < 0.02, "got {got}, want {expected}");
    }

    #[test]
    fn test_insufficient_points_rejected() {
        let image = gradient_image(40, 40);
        let points = vec![BackgroundPoint::new(20.0, 20.0)];
        let config = ExtractionConfig::default();
        let tracker = ProgressTracker::no_op();
        let result = fit_background(&image, &points, &config, &tracker.slice(0.0, 1.0));
        assert!(matches!(result, Err(SkyflatError::Precondition(_))));
    }

    #[test]
    fn test_spline_below_minimum_rejected() {
        let image = gradient_image(40, 40);
        let points = grid_points(&image, 4); // 16 rows*cols at aspect 1 -> 16 points
        let config = ExtractionConfig::builder()
            .method(InterpolationMethod::Splines { order: 2 })
            .sample_size(3)
            .build()
            .unwrap();
        let tracker = ProgressTracker::no_op();
        assert!(fit_background(&image, &points, &config, &tracker.slice(0.0, 1.0)).is_ok());

        let fewer = &points[..15];
        let result = fit_background(&image, fewer, &config, &tracker.slice(0.0, 1.0));
        assert!(matches!(result, Err(SkyflatError::Precondition(_))));
    }

    #[test]
    fn test_three_channel_fit() {
        let data = Array3::from_shape_fn((48, 48, 3), |(y, _, c)| {
            0.1 + 0.05 * c as f32 + 0.1 * y as f32 / 48.0
        });
        let image = AstroImage::from_array(data).unwrap();
        let points = grid_points(&image, 6);
        let config = ExtractionConfig::builder().sample_size(3).build().unwrap();
        let tracker = ProgressTracker::no_op();
        let background =
            fit_background(&image, &points, &config, &tracker.slice(0.0, 1.0)).unwrap();
        assert_eq!(background.channels(), 3);
        // Channel offsets survive the per-channel fits
        let r = background.data()[[24, 24, 0]];
        let b = background.data()[[24, 24, 2]];
        assert!((f64::from(b - r) - 0.1).abs() < 0.02);
    }
}
