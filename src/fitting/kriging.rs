//! Dual ordinary kriging over scattered sample points
//!
//! Solves the augmented system once per channel instead of per prediction
//! point: `[[Gamma, 1], [1^T, 0]] [b; a] = [v; 0]`, where `Gamma` holds
//! pairwise variogram values. Predictions are then
//! `p(x) = sum_i b_i * gamma(|x - p_i|) + a`. The smoothing parameter maps
//! to a nugget term on the variogram diagonal.

use crate::error::{Result, SkyflatError};
use nalgebra::{DMatrix, DVector};

/// Power-model variogram, valid for exponents in (0, 2)
fn variogram(h: f64) -> f64 {
    h.powf(1.5)
}

/// A solved kriging system ready for evaluation
#[derive(Debug)]
pub struct KrigingInterpolator {
    centers: Vec<(f64, f64)>,
    weights: DVector<f64>,
    offset: f64,
}

impl KrigingInterpolator {
    /// Fit the dual system through `(center, value)` pairs
    ///
    /// # Errors
    /// Returns `Fit` for fewer than two points or a singular system.
    pub fn fit(centers: Vec<(f64, f64)>, values: &[f64], smoothing: f64) -> Result<Self> {
        let n = centers.len();
        if n < 2 {
            return Err(SkyflatError::fit(format!(
                "Kriging needs at least 2 points, got {n}"
            )));
        }
        if n != values.len() {
            return Err(SkyflatError::internal(
                "Point and value counts differ in kriging fit",
            ));
        }

        let mut matrix = DMatrix::<f64>::zeros(n + 1, n + 1);
        let mut magnitude_sum = 0.0;
        for i in 0..n {
            for j in 0..n {
                let dx = centers[i].0 - centers[j].0;
                let dy = centers[i].1 - centers[j].1;
                let value = variogram((dx * dx + dy * dy).sqrt());
                matrix[(i, j)] = value;
                magnitude_sum += value;
            }
            matrix[(i, n)] = 1.0;
            matrix[(n, i)] = 1.0;
        }

        // Nugget in units of the mean variogram magnitude
        let nugget = smoothing * magnitude_sum / (n * n) as f64;
        for i in 0..n {
            matrix[(i, i)] += nugget;
        }

        let mut rhs = DVector::<f64>::zeros(n + 1);
        for (i, &v) in values.iter().enumerate() {
            rhs[i] = v;
        }

        let solution = matrix.lu().solve(&rhs).ok_or_else(|| {
            SkyflatError::fit(format!(
                "Singular kriging system for {n} points; check for duplicate sample coordinates"
            ))
        })?;

        let weights = DVector::from_iterator(n, solution.iter().take(n).copied());
        let offset = solution[n];
        Ok(Self {
            centers,
            weights,
            offset,
        })
    }

    /// Evaluate the fitted surface at a coordinate
    #[must_use]
    pub fn eval(&self, x: f64, y: f64) -> f64 {
        let spatial: f64 = self
            .centers
            .iter()
            .zip(self.weights.iter())
            .map(|(&(cx, cy), &w)| {
                let dx = x - cx;
                let dy = y - cy;
                w * variogram((dx * dx + dy * dy).sqrt())
            })
            .sum();
        spatial + self.offset
    }
}
