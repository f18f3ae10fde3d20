//! Background sample points: automatic placement and spatial queries
//!
//! Candidate points come from a uniform grid, optionally filtered to regions
//! statistically likely to contain only background signal (flood selection).
//! Removal queries use Chebyshev distance against the sample neighborhood.

use crate::error::{Result, SkyflatError};
use crate::image::AstroImage;
use serde::{Deserialize, Serialize};

/// A coordinate in image space presumed to contain only background signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackgroundPoint {
    /// Column coordinate, `0 <= x < width`
    pub x: f64,
    /// Row coordinate, `0 <= y < height`
    pub y: f64,
}

impl BackgroundPoint {
    /// Create a point at the given image coordinates
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Chebyshev (L∞) distance to another coordinate
    #[must_use]
    pub fn chebyshev_distance(&self, x: f64, y: f64) -> f64 {
        (self.x - x).abs().max((self.y - y).abs())
    }
}

/// Parameters for automatic grid placement
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GridParams {
    /// Number of sample columns across the image width (4-25)
    pub points_per_row: u32,
    /// Background-likelihood threshold in MAD units; larger accepts more
    /// points, negative restricts placement to darker-than-median regions
    pub tolerance: f64,
    /// Neighborhood radius used for local statistics and hit testing
    pub sample_size: u32,
    /// Keep only candidates whose local statistics pass the threshold
    pub flood_select: bool,
}

impl GridParams {
    /// Validate parameter ranges
    ///
    /// # Errors
    /// Returns `InvalidConfig` when `points_per_row` is outside 4-25 or
    /// `sample_size` is zero.
    pub fn validate(&self) -> Result<()> {
        if !(4..=25).contains(&self.points_per_row) {
            return Err(SkyflatError::config_value_error(
                "points_per_row",
                self.points_per_row,
                "4-25",
            ));
        }
        if self.sample_size == 0 {
            return Err(SkyflatError::config_value_error(
                "sample_size",
                self.sample_size,
                ">= 1",
            ));
        }
        Ok(())
    }
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            points_per_row: 15,
            tolerance: 1.0,
            sample_size: 25,
            flood_select: true,
        }
    }
}

/// Generate candidate sample points for the given image
///
/// Produces a regular grid with `points_per_row` columns and a row count
/// proportional to the image aspect ratio. When flood selection is enabled,
/// candidates whose local median exceeds `global_median + tolerance * MAD`
/// are discarded as likely nebulosity or stars. All points are clamped so
/// that the sample neighborhood stays inside the image.
///
/// # Errors
/// Returns `InvalidConfig` for out-of-range parameters.
pub fn generate_grid(image: &AstroImage, params: &GridParams) -> Result<Vec<BackgroundPoint>> {
    params.validate()?;

    let (h, w, _) = image.shape();
    let cols = params.points_per_row as usize;
    let rows = ((cols as f64 * h as f64 / w as f64).round() as usize).max(1);

    let luminance = image.luminance();
    let (global_median, mad) = if params.flood_select {
        global_stats(&luminance)
    } else {
        (0.0, 0.0)
    };
    let threshold = global_median + params.tolerance * mad;

    let mut points = Vec::with_capacity(cols * rows);
    for row in 0..rows {
        let y = (row as f64 + 0.5) * h as f64 / rows as f64;
        for col in 0..cols {
            let x = (col as f64 + 0.5) * w as f64 / cols as f64;
            let point = clamp_to_sample_bounds(x, y, w, h, params.sample_size);
            // Margin clamping can collapse neighboring candidates onto the
            // same coordinate; one generation never emits duplicates
            if points.contains(&point) {
                continue;
            }
            if params.flood_select {
                let local = local_median(&luminance, &point, params.sample_size);
                if local >= threshold {
                    continue;
                }
            }
            points.push(point);
        }
    }

    log::debug!(
        "Generated {} of {} candidate points ({}x{} grid, flood={})",
        points.len(),
        cols * rows,
        cols,
        rows,
        params.flood_select
    );
    Ok(points)
}

/// Clamp coordinates so the sample neighborhood never reads outside bounds
fn clamp_to_sample_bounds(x: f64, y: f64, w: usize, h: usize, sample_size: u32) -> BackgroundPoint {
    let clamp_axis = |v: f64, dim: usize| {
        let margin = f64::from(sample_size).min(dim as f64 / 2.0);
        v.clamp(margin, (dim as f64 - margin).max(margin))
    };
    BackgroundPoint::new(clamp_axis(x, w), clamp_axis(y, h))
}

/// Index of the nearest point by Chebyshev distance, accepted only within
/// `sample_size`; ties break toward the earliest insertion
#[must_use]
pub fn nearest_match(
    points: &[BackgroundPoint],
    x: f64,
    y: f64,
    sample_size: u32,
) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, p) in points.iter().enumerate() {
        let dist = p.chebyshev_distance(x, y);
        match best {
            Some((_, best_dist)) if dist >= best_dist => {},
            _ => best = Some((i, dist)),
        }
    }
    best.and_then(|(i, dist)| (dist <= f64::from(sample_size)).then_some(i))
}

/// Robust background value at a point: median over the sample neighborhood
/// of radius `sample_size`, per channel
#[must_use]
pub fn sample_values(image: &AstroImage, point: &BackgroundPoint, sample_size: u32) -> Vec<f32> {
    let (h, w, c) = image.shape();
    let radius = sample_size as usize;
    let cx = (point.x.round() as usize).min(w - 1);
    let cy = (point.y.round() as usize).min(h - 1);
    let x0 = cx.saturating_sub(radius);
    let x1 = (cx + radius).min(w - 1);
    let y0 = cy.saturating_sub(radius);
    let y1 = (cy + radius).min(h - 1);

    let mut values = Vec::with_capacity(c);
    let mut buf = Vec::with_capacity((x1 - x0 + 1) * (y1 - y0 + 1));
    for ch in 0..c {
        buf.clear();
        for y in y0..=y1 {
            for x in x0..=x1 {
                buf.push(image.data()[[y, x, ch]]);
            }
        }
        values.push(median_in_place(&mut buf));
    }
    values
}

/// Median and median absolute deviation of the luminance plane, subsampled
/// for large images
fn global_stats(luminance: &ndarray::Array2<f32>) -> (f64, f64) {
    const TARGET_SAMPLES: usize = 250_000;
    let (h, w) = luminance.dim();
    let total = h * w;
    let stride = (((total as f64 / TARGET_SAMPLES as f64).sqrt()).floor() as usize).max(1);

    let mut samples: Vec<f32> = Vec::with_capacity(total / (stride * stride) + 1);
    let mut y = 0;
    while y < h {
        let mut x = 0;
        while x < w {
            let v = luminance[[y, x]];
            if v.is_finite() {
                samples.push(v);
            }
            x += stride;
        }
        y += stride;
    }

    let median = f64::from(median_in_place(&mut samples));
    for v in &mut samples {
        *v = (f64::from(*v) - median).abs() as f32;
    }
    // Floor the deviation so noise-free synthetic frames still accept
    // candidates sitting exactly on the median
    let mad = f64::from(median_in_place(&mut samples)).max(1e-4);
    (median, mad)
}

/// Local luminance median over the sample neighborhood of a candidate
fn local_median(luminance: &ndarray::Array2<f32>, point: &BackgroundPoint, sample_size: u32) -> f64 {
    let (h, w) = luminance.dim();
    let radius = sample_size as usize;
    let cx = (point.x.round() as usize).min(w - 1);
    let cy = (point.y.round() as usize).min(h - 1);
    let x0 = cx.saturating_sub(radius);
    let x1 = (cx + radius).min(w - 1);
    let y0 = cy.saturating_sub(radius);
    let y1 = (cy + radius).min(h - 1);

    let mut buf = Vec::with_capacity((x1 - x0 + 1) * (y1 - y0 + 1));
    for y in y0..=y1 {
        for x in x0..=x1 {
            buf.push(luminance[[y, x]]);
        }
    }
    f64::from(median_in_place(&mut buf))
}

/// Median by partial selection; empty slices yield zero
fn median_in_place(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let len = values.len();
    let mid = len / 2;
    let (_, median, _) = values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    let hi = *median;
    if len % 2 == 1 {
        hi
    } else {
        let lo = values[..mid]
            .iter()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max);
        (lo + hi) / 2.0
    }
}
