//! Least-squares tensor-product B-spline surface
//!
//! Fits a smooth surface of configurable degree through scattered samples on
//! the unit square. A 4x4 control grid keeps the normal equations well-posed
//! from 16 points upward (the spline minimum-point requirement); degrees
//! above 3 enlarge the control grid to `degree + 1` per axis and lean on the
//! regularization term.

use crate::error::{Result, SkyflatError};
use nalgebra::{DMatrix, DVector};

/// A fitted B-spline surface over the unit square
#[derive(Debug)]
pub struct SplineSurface {
    degree: usize,
    knots: Vec<f64>,
    controls_per_axis: usize,
    coefficients: DVector<f64>,
}

/// Open uniform knot vector on `[0, 1]` for the given basis count and degree
fn open_uniform_knots(controls: usize, degree: usize) -> Vec<f64> {
    let mut knots = Vec::with_capacity(controls + degree + 1);
    let interior = controls - degree;
    for _ in 0..=degree {
        knots.push(0.0);
    }
    for i in 1..interior {
        knots.push(i as f64 / interior as f64);
    }
    for _ in 0..=degree {
        knots.push(1.0);
    }
    knots
}

/// Cox-de Boor recursion for the `i`-th basis function of the given degree
fn basis(i: usize, degree: usize, t: f64, knots: &[f64]) -> f64 {
    if degree == 0 {
        return if knots[i] <= t && t < knots[i + 1] {
            1.0
        } else {
            0.0
        };
    }
    let mut value = 0.0;
    let left_den = knots[i + degree] - knots[i];
    if left_den > 0.0 {
        value += (t - knots[i]) / left_den * basis(i, degree - 1, t, knots);
    }
    let right_den = knots[i + degree + 1] - knots[i + 1];
    if right_den > 0.0 {
        value += (knots[i + degree + 1] - t) / right_den * basis(i + 1, degree - 1, t, knots);
    }
    value
}

impl SplineSurface {
    /// Fit the surface through `(u, v)` coordinates in `[0, 1]^2` and values
    ///
    /// `smoothing` in `[0, 1]` becomes a Tikhonov term on the control
    /// coefficients; a tiny ridge is always present so high degrees with few
    /// points stay solvable.
    ///
    /// # Errors
    /// Returns `Fit` for fewer than 16 points, degrees above 5, or a
    /// singular normal system.
    pub fn fit(points: &[(f64, f64)], values: &[f64], degree: u8, smoothing: f64) -> Result<Self> {
        let n = points.len();
        if n < 16 {
            return Err(SkyflatError::fit(format!(
                "Spline surface needs at least 16 points, got {n}"
            )));
        }
        if degree > 5 {
            return Err(SkyflatError::fit(format!(
                "Spline order {degree} out of range 0-5"
            )));
        }
        if n != values.len() {
            return Err(SkyflatError::internal(
                "Point and value counts differ in spline fit",
            ));
        }

        let degree = degree as usize;
        let controls = 4.max(degree + 1);
        let knots = open_uniform_knots(controls, degree);
        let unknowns = controls * controls;

        // Row per sample: tensor products of the axis bases
        let mut design = DMatrix::<f64>::zeros(n, unknowns);
        for (row, &(u, v)) in points.iter().enumerate() {
            let u = clamp_param(u);
            let v = clamp_param(v);
            for i in 0..controls {
                let bu = basis(i, degree, u, &knots);
                if bu == 0.0 {
                    continue;
                }
                for j in 0..controls {
                    design[(row, i * controls + j)] = bu * basis(j, degree, v, &knots);
                }
            }
        }

        let mut normal = design.transpose() * &design;
        let rhs = design.transpose() * DVector::from_column_slice(values);

        let trace: f64 = (0..unknowns).map(|i| normal[(i, i)]).sum();
        let lambda = smoothing * trace / unknowns as f64 + 1e-9;
        for i in 0..unknowns {
            normal[(i, i)] += lambda;
        }

        let coefficients = normal.lu().solve(&rhs).ok_or_else(|| {
            SkyflatError::fit(format!(
                "Singular spline system ({n} points, degree {degree})"
            ))
        })?;

        Ok(Self {
            degree,
            knots,
            controls_per_axis: controls,
            coefficients,
        })
    }

    /// Evaluate the surface at `(u, v)` in `[0, 1]^2`
    #[must_use]
    pub fn eval(&self, u: f64, v: f64) -> f64 {
        let u = clamp_param(u);
        let v = clamp_param(v);
        let nc = self.controls_per_axis;
        let mut acc = 0.0;
        for i in 0..nc {
            let bu = basis(i, self.degree, u, &self.knots);
            if bu == 0.0 {
                continue;
            }
            for j in 0..nc {
                let bv = basis(j, self.degree, v, &self.knots);
                if bv != 0.0 {
                    acc += self.coefficients[i * nc + j] * bu * bv;
                }
            }
        }
        acc
    }
}

/// Keep parameters inside the half-open basis support
fn clamp_param(t: f64) -> f64 {
    t.clamp(0.0, 1.0 - 1e-9)
}
