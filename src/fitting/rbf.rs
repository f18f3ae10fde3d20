//! Radial basis function interpolation over scattered sample points
//!
//! Solves the dense collocation system `(A - lambda I) c = v` where
//! `A[i][j] = phi(|p_i - p_j|)`. With zero smoothing the surface passes
//! through every sample value exactly; positive smoothing relaxes the fit
//! toward a smoother least-squares-like surface.

use crate::config::RbfKernel;
use crate::error::{Result, SkyflatError};
use nalgebra::{DMatrix, DVector};

/// A solved RBF system ready for evaluation
#[derive(Debug)]
pub struct RbfInterpolator {
    centers: Vec<(f64, f64)>,
    coefficients: DVector<f64>,
    kernel: RbfKernel,
}

/// Kernel response for a center distance
fn kernel_value(kernel: RbfKernel, r: f64) -> f64 {
    match kernel {
        RbfKernel::ThinPlate => {
            if r <= 0.0 {
                0.0
            } else {
                r * r * r.ln()
            }
        },
        RbfKernel::Linear => r,
        RbfKernel::Cubic => r * r * r,
        RbfKernel::Quintic => r * r * r * r * r,
    }
}

impl RbfInterpolator {
    /// Fit the interpolator through `(center, value)` pairs
    ///
    /// `smoothing` in `[0, 1]` is scaled by the mean kernel magnitude so the
    /// relaxation strength is independent of the coordinate scale.
    ///
    /// # Errors
    /// Returns `Fit` for fewer than two points, duplicate centers making the
    /// system singular, or a failed solve.
    pub fn fit(
        centers: Vec<(f64, f64)>,
        values: &[f64],
        kernel: RbfKernel,
        smoothing: f64,
    ) -> Result<Self> {
        let n = centers.len();
        if n < 2 {
            return Err(SkyflatError::fit(format!(
                "RBF interpolation needs at least 2 points, got {n}"
            )));
        }
        if n != values.len() {
            return Err(SkyflatError::internal(
                "Point and value counts differ in RBF fit",
            ));
        }

        let mut matrix = DMatrix::<f64>::zeros(n, n);
        let mut magnitude_sum = 0.0;
        for i in 0..n {
            for j in 0..n {
                let dx = centers[i].0 - centers[j].0;
                let dy = centers[i].1 - centers[j].1;
                let value = kernel_value(kernel, (dx * dx + dy * dy).sqrt());
                matrix[(i, j)] = value;
                magnitude_sum += value.abs();
            }
        }

        // Scale-free relaxation term on the diagonal
        let lambda = smoothing * magnitude_sum / (n * n) as f64;
        for i in 0..n {
            matrix[(i, i)] -= lambda;
        }

        let rhs = DVector::from_column_slice(values);
        let coefficients = matrix.lu().solve(&rhs).ok_or_else(|| {
            SkyflatError::fit(format!(
                "Singular RBF system for {n} points; check for duplicate sample coordinates"
            ))
        })?;

        Ok(Self {
            centers,
            coefficients,
            kernel,
        })
    }

    /// Evaluate the fitted surface at a coordinate
    #[must_use]
    pub fn eval(&self, x: f64, y: f64) -> f64 {
        self.centers
            .iter()
            .zip(self.coefficients.iter())
            .map(|(&(cx, cy), &c)| {
                let dx = x - cx;
                let dy = y - cy;
                c * kernel_value(self.kernel, (dx * dx + dy * dy).sqrt())
            })
            .sum()
    }
}
