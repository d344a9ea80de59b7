//! Interpolation primitives shared by the whole crate.
//!
//! Two distinct splines are needed, per the Design Notes in `spec.md` §9:
//! a plain 1-D [`NaturalCubicSpline`] (used for the action table S₃(T), for
//! ρ ↦ l(ρ) and ρ ↦ dl/dρ in the bounce integrator, and for rasterizing
//! dV/dl along a path) and a [`ConstantVelocitySpline`] that parameterizes
//! a curve in ℝᵈ by arclength — the tunneling path Γ(l) — and can be
//! periodically re-knotted so the knot density stays uniform in `l` while
//! path deformation moves the knots around.

use crate::convert::f64_from_usize;
use crate::error::{Error, Result};
use crate::potential::FieldVec;
use ndarray::Array1;

/// A natural cubic spline through a set of `(x, y)` samples, sorted by
/// `x`, with the second derivative fixed to zero at both ends.
///
/// Per invariant I5, [`NaturalCubicSpline::evaluate`] never extrapolates:
/// evaluating outside `[x_min, x_max]` is a [`Error::OutsideSplineRange`].
#[derive(Clone, Debug)]
pub struct NaturalCubicSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// Second derivatives at each knot, from the standard tridiagonal
    /// natural-spline solve.
    y2: Vec<f64>,
}

impl NaturalCubicSpline {
    /// Builds a natural cubic spline from samples `(xs[i], ys[i])`. `xs`
    /// must be strictly increasing and at least two points long.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotEnoughSamples`] if fewer than two points are
    /// given.
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> Result<Self> {
        let n = xs.len();
        if n < 2 || ys.len() != n {
            return Err(Error::NotEnoughSamples {
                needed: 2,
                got: n.min(ys.len()),
            });
        }
        for w in xs.windows(2) {
            assert!(w[1] > w[0], "NaturalCubicSpline: xs must be strictly increasing");
        }

        let y2 = Self::second_derivatives(&xs, &ys);
        Ok(Self { xs, ys, y2 })
    }

    fn second_derivatives(xs: &[f64], ys: &[f64]) -> Vec<f64> {
        let n = xs.len();
        let mut y2 = vec![0.0; n];
        if n == 2 {
            return y2;
        }
        let mut u = vec![0.0; n];

        for i in 1..n - 1 {
            let sig = (xs[i] - xs[i - 1]) / (xs[i + 1] - xs[i - 1]);
            let p = sig * y2[i - 1] + 2.0;
            y2[i] = (sig - 1.0) / p;
            let d = (ys[i + 1] - ys[i]) / (xs[i + 1] - xs[i])
                - (ys[i] - ys[i - 1]) / (xs[i] - xs[i - 1]);
            u[i] = (6.0 * d / (xs[i + 1] - xs[i - 1]) - sig * u[i - 1]) / p;
        }

        for k in (0..n - 1).rev() {
            y2[k] = y2[k] * y2[k + 1] + u[k];
        }
        y2
    }

    /// Lowest sampled `x`.
    #[must_use]
    pub fn x_min(&self) -> f64 {
        self.xs[0]
    }

    /// Highest sampled `x`.
    #[must_use]
    pub fn x_max(&self) -> f64 {
        *self.xs.last().unwrap()
    }

    fn find_segment(&self, x: f64) -> usize {
        // binary search for the rightmost knot <= x
        match self
            .xs
            .binary_search_by(|probe| probe.partial_cmp(&x).unwrap())
        {
            Ok(i) => i.min(self.xs.len() - 2),
            Err(0) => 0,
            Err(i) => (i - 1).min(self.xs.len() - 2),
        }
    }

    fn check_range(&self, x: f64) -> Result<()> {
        // small relative tolerance to tolerate roundoff at the exact ends
        let tol = 1e-9 * (self.x_max() - self.x_min()).max(1.0);
        if x < self.x_min() - tol || x > self.x_max() + tol {
            return Err(Error::OutsideSplineRange {
                at: x,
                low: self.x_min(),
                high: self.x_max(),
            });
        }
        Ok(())
    }

    /// Evaluates the spline at `x`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutsideSplineRange`] if `x` lies outside the
    /// sampled range.
    pub fn evaluate(&self, x: f64) -> Result<f64> {
        self.check_range(x)?;
        let i = self.find_segment(x);
        let h = self.xs[i + 1] - self.xs[i];
        let a = (self.xs[i + 1] - x) / h;
        let b = (x - self.xs[i]) / h;
        Ok(a * self.ys[i]
            + b * self.ys[i + 1]
            + ((a.powi(3) - a) * self.y2[i] + (b.powi(3) - b) * self.y2[i + 1]) * h * h / 6.0)
    }

    /// Evaluates the first derivative `dy/dx` at `x`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutsideSplineRange`] if `x` lies outside the
    /// sampled range.
    pub fn derivative(&self, x: f64) -> Result<f64> {
        self.check_range(x)?;
        let i = self.find_segment(x);
        let h = self.xs[i + 1] - self.xs[i];
        let a = (self.xs[i + 1] - x) / h;
        let b = (x - self.xs[i]) / h;
        Ok((self.ys[i + 1] - self.ys[i]) / h
            - (3.0 * a * a - 1.0) / 6.0 * h * self.y2[i]
            + (3.0 * b * b - 1.0) / 6.0 * h * self.y2[i + 1])
    }

    /// Number of samples the spline was built from.
    #[must_use]
    pub fn len(&self) -> usize {
        self.xs.len()
    }

    /// Whether the spline has no samples (always `false`: construction
    /// requires at least two).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// A curve `Γ: [0, L] → ℝᵈ` through a sequence of knots, parameterized by
/// arclength `l` via a [`NaturalCubicSpline`] per field-space dimension.
///
/// Used as the tunneling path in [`crate::bounce_action`]. Knots are
/// re-parameterized (see [`ConstantVelocitySpline::reknot`]) after path
/// deformation moves them so that arclength spacing stays uniform.
#[derive(Clone, Debug)]
pub struct ConstantVelocitySpline {
    /// Arclength of each knot, `l_0 = 0 < l_1 < ... < l_{n-1} = L`.
    knot_arclengths: Vec<f64>,
    /// One spline per field dimension, each built over `knot_arclengths`.
    per_dim: Vec<NaturalCubicSpline>,
    dim: usize,
}

impl ConstantVelocitySpline {
    /// Builds a constant-velocity spline through `knots` (at least two,
    /// all the same dimension). The knots are assumed already ordered from
    /// the true vacuum (`l=0`) to the false vacuum (`l=L`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotEnoughSamples`] if fewer than two knots are
    /// given.
    pub fn new(knots: &[FieldVec]) -> Result<Self> {
        if knots.len() < 2 {
            return Err(Error::NotEnoughSamples {
                needed: 2,
                got: knots.len(),
            });
        }
        let dim = knots[0].len();

        let mut knot_arclengths = vec![0.0];
        for w in knots.windows(2) {
            let d = (&w[1] - &w[0]).mapv(|v| v * v).sum().sqrt();
            knot_arclengths.push(knot_arclengths.last().unwrap() + d);
        }

        let mut per_dim = Vec::with_capacity(dim);
        for k in 0..dim {
            let ys: Vec<f64> = knots.iter().map(|p| p[k]).collect();
            per_dim.push(NaturalCubicSpline::new(knot_arclengths.clone(), ys)?);
        }

        Ok(Self {
            knot_arclengths,
            per_dim,
            dim,
        })
    }

    /// Total arclength `L` of the path.
    #[must_use]
    pub fn length(&self) -> f64 {
        *self.knot_arclengths.last().unwrap()
    }

    /// Field-space dimension.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Evaluates `Γ(l)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutsideSplineRange`] if `l` lies outside `[0, L]`.
    pub fn gamma(&self, l: f64) -> Result<FieldVec> {
        let mut out = Array1::zeros(self.dim);
        for (k, spline) in self.per_dim.iter().enumerate() {
            out[k] = spline.evaluate(l)?;
        }
        Ok(out)
    }

    /// Evaluates `dΓ/dl` at `l`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutsideSplineRange`] if `l` lies outside `[0, L]`.
    pub fn gamma_prime(&self, l: f64) -> Result<FieldVec> {
        let mut out = Array1::zeros(self.dim);
        for (k, spline) in self.per_dim.iter().enumerate() {
            out[k] = spline.derivative(l)?;
        }
        Ok(out)
    }

    /// Samples `n` points uniformly in arclength and rebuilds the spline
    /// from them, restoring uniform knot density after path deformation
    /// has pushed the knots around in field space.
    ///
    /// # Errors
    ///
    /// Propagates any [`Error`] from resampling or rebuilding.
    pub fn reknot(&self, n: usize) -> Result<Self> {
        let l_max = self.length();
        let mut knots = Vec::with_capacity(n);
        for i in 0..n {
            let l = l_max * f64_from_usize(i) / (f64_from_usize(n) - 1.0);
            knots.push(self.gamma(l)?);
        }
        Self::new(&knots)
    }
}
