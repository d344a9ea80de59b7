//! [`MinimumLocator`]: turns an initial guess and a temperature into a
//! verified local minimum of the potential, or a failure.

use crate::potential::{smallest_eigenvalue, FieldMat, FieldVec, Potential};
use ndarray::Array1;
use thiserror::Error;

/// A verified (or provisional, pending the caller's min-ness check) local
/// minimum `φ*` of `V(·, T)`.
#[derive(Clone, Debug, serde::Serialize)]
pub struct Minimum {
    /// The field-space point.
    pub point: FieldVec,
    /// Temperature this minimum was located at.
    pub t: f64,
    /// `V(point, T)`.
    pub v: f64,
    /// Whether this minimum was the deepest among all known minima at `T`
    /// when it was recorded.
    pub is_global_min: bool,
    /// `+1` for the first minimum of a traced phase, `-1` for the last,
    /// `0` for interior points. Set by [`crate::phase`], not here.
    pub edge_marker: i8,
}

/// Why [`locate_minimum`] gave up.
#[derive(Debug, Error)]
pub enum LocateError {
    /// The damped-Newton/gradient-descent iteration did not bring the
    /// gradient below `grad_tol` within `max_iter` steps.
    #[error("minimizer did not converge within {max_iter} iterations (final |grad| = {final_grad})")]
    NotConverged {
        /// Iteration cap that was hit.
        max_iter: usize,
        /// Gradient norm at the last iterate.
        final_grad: f64,
    },
}

/// Tuning knobs for [`locate_minimum`], matching the constants named in
/// `spec.md` §4.2.
#[derive(Clone, Copy, Debug)]
pub struct MinimumLocatorConfig {
    /// Gradient-norm convergence threshold (default `1e-3`).
    pub grad_tol: f64,
    /// Diagonal shift `ε` added to the Hessian before solving for the
    /// Newton step, for conditioning (default `1e-3`).
    pub hessian_shift: f64,
    /// Iteration cap (default `200`).
    pub max_iter: usize,
    /// Step size `c` used by the gradient-descent fallback when the
    /// Hessian is (near-)singular (default `1e-3`).
    pub gradient_step: f64,
    /// `|det H|` threshold below which the Newton step is abandoned in
    /// favor of gradient descent for this iteration (default `1e-12`).
    pub singular_threshold: f64,
}

impl Default for MinimumLocatorConfig {
    fn default() -> Self {
        Self {
            grad_tol: 1e-3,
            hessian_shift: 1e-3,
            max_iter: 200,
            gradient_step: 1e-3,
            singular_threshold: 1e-12,
        }
    }
}

/// Solves `a x = b` by Gaussian elimination with partial pivoting.
/// Returns `None` if `a` is numerically singular (pivot magnitude below
/// `1e-300` times the matrix's largest entry).
pub(crate) fn solve_linear(a: &FieldMat, b: &FieldVec) -> Option<FieldVec> {
    let n = b.len();
    let mut m = a.clone();
    let mut rhs = b.clone();

    for col in 0..n {
        let mut pivot_row = col;
        let mut pivot_val = m[[col, col]].abs();
        for row in (col + 1)..n {
            if m[[row, col]].abs() > pivot_val {
                pivot_val = m[[row, col]].abs();
                pivot_row = row;
            }
        }
        if pivot_val < 1e-300 {
            return None;
        }
        if pivot_row != col {
            for k in 0..n {
                m.swap([col, k], [pivot_row, k]);
            }
            rhs.swap(col, pivot_row);
        }

        let pivot = m[[col, col]];
        for row in (col + 1)..n {
            let factor = m[[row, col]] / pivot;
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                m[[row, k]] -= factor * m[[col, k]];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let mut s = rhs[row];
        for k in (row + 1)..n {
            s -= m[[row, k]] * x[k];
        }
        x[row] = s / m[[row, row]];
    }
    Some(x)
}

/// Damped Newton step on `∇V = 0`, falling back to gradient descent when
/// the shifted Hessian is singular.
///
/// Terminates on `‖∇V‖ ≤ grad_tol` or the iteration cap. Per `spec.md`
/// §4.2, this is "no guarantee it returns a minimum (only a stationary
/// point)"; callers should check [`crate::potential::smallest_eigenvalue`]
/// of the Hessian at the returned point before trusting it as a minimum.
///
/// # Errors
///
/// Returns [`LocateError::NotConverged`] if the gradient is not brought
/// below `grad_tol` within `cfg.max_iter` iterations.
pub fn locate_minimum(
    potential: &dyn Potential,
    guess: &FieldVec,
    t: f64,
    cfg: &MinimumLocatorConfig,
) -> Result<Minimum, LocateError> {
    let n = potential.dim();
    let mut phi = guess.clone();
    let identity_shift = |h: &FieldMat, eps: f64| -> FieldMat { h + eps * FieldMat::eye(n) };

    let mut grad_norm = f64::INFINITY;
    for _ in 0..cfg.max_iter {
        let grad = potential.grad_v(&phi, t);
        grad_norm = grad.mapv(|v| v * v).sum().sqrt();
        if grad_norm <= cfg.grad_tol {
            let v = potential.v(&phi, t);
            return Ok(Minimum {
                point: phi,
                t,
                v,
                is_global_min: false,
                edge_marker: 0,
            });
        }

        let hess = potential.hess_v(&phi, t);
        let shifted = identity_shift(&hess, cfg.hessian_shift);
        let step = solve_linear(&shifted, &grad.mapv(|v| -v));

        match step {
            Some(delta) if delta.mapv(|v| v * v).sum().sqrt().is_finite() => {
                phi = &phi + &delta;
            }
            _ => {
                // near-singular Hessian: fall back to a small gradient-descent step
                phi = &phi - &(cfg.gradient_step * &grad);
            }
        }
    }

    Err(LocateError::NotConverged {
        max_iter: cfg.max_iter,
        final_grad: grad_norm,
    })
}

/// Finds, by bisection, the point along the straight line from `(phi1,
/// t1)` to `(phi2, t2)` where the smallest Hessian eigenvalue of `V`
/// crosses zero — used to detect a phase ending or a bifurcation
/// (`spec.md` §4.2).
///
/// Returns `None` if the smallest eigenvalue has the same sign at both
/// endpoints (no crossing to bisect). Otherwise returns the temperature
/// at the crossing, accurate to `tol` in the line parameter `s ∈ [0, 1]`.
#[must_use]
pub fn find_zero_smallest_eigenvalue(
    potential: &dyn Potential,
    phi1: &FieldVec,
    t1: f64,
    phi2: &FieldVec,
    t2: f64,
    tol: f64,
    max_iter: usize,
) -> Option<f64> {
    let eig_at = |s: f64| -> f64 {
        let phi = phi1 + &(s * (phi2 - phi1));
        let t = t1 + s * (t2 - t1);
        smallest_eigenvalue(&potential.hess_v(&phi, t))
    };

    let mut lo = 0.0;
    let mut hi = 1.0;
    let mut eig_lo = eig_at(lo);
    let eig_hi = eig_at(hi);
    if eig_lo.signum() == eig_hi.signum() {
        return None;
    }

    for _ in 0..max_iter {
        if (hi - lo) < tol {
            break;
        }
        let mid = 0.5 * (lo + hi);
        let eig_mid = eig_at(mid);
        if eig_mid.signum() == eig_lo.signum() {
            lo = mid;
            eig_lo = eig_mid;
        } else {
            hi = mid;
        }
    }

    let s = 0.5 * (lo + hi);
    Some(t1 + s * (t2 - t1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// V(φ,T) = (φ - T)^2, a single global minimum tracking φ* = T.
    struct ShiftedQuadratic;

    impl Potential for ShiftedQuadratic {
        fn dim(&self) -> usize {
            1
        }
        fn v(&self, phi: &FieldVec, t: f64) -> f64 {
            (phi[0] - t).powi(2)
        }
        fn grad_v(&self, phi: &FieldVec, t: f64) -> FieldVec {
            array![2.0 * (phi[0] - t)]
        }
        fn hess_v(&self, _phi: &FieldVec, _t: f64) -> FieldMat {
            array![[2.0]]
        }
        fn dv_dt(&self, phi: &FieldVec, t: f64) -> f64 {
            -2.0 * (phi[0] - t)
        }
        fn global_min(&self, t: f64) -> Result<FieldVec, crate::potential::PotentialError> {
            Ok(array![t])
        }
        fn symmetry_elements(&self) -> &[FieldMat] {
            &[]
        }
    }

    #[test]
    fn locates_known_minimum() {
        let pot = ShiftedQuadratic;
        let cfg = MinimumLocatorConfig::default();
        let min = locate_minimum(&pot, &array![5.0], 10.0, &cfg).unwrap();
        assert!((min.point[0] - 10.0).abs() < 1e-6);
        assert!(min.v.abs() < 1e-9);
    }

    /// V = m^2/2 phi^2 + lambda/4 phi^4, a double-well for m^2 < 0.
    struct DoubleWell {
        m2: f64,
        lambda: f64,
    }

    impl Potential for DoubleWell {
        fn dim(&self) -> usize {
            1
        }
        fn v(&self, phi: &FieldVec, _t: f64) -> f64 {
            0.5 * self.m2 * phi[0].powi(2) + 0.25 * self.lambda * phi[0].powi(4)
        }
        fn grad_v(&self, phi: &FieldVec, _t: f64) -> FieldVec {
            array![self.m2 * phi[0] + self.lambda * phi[0].powi(3)]
        }
        fn hess_v(&self, phi: &FieldVec, _t: f64) -> FieldMat {
            array![[self.m2 + 3.0 * self.lambda * phi[0].powi(2)]]
        }
        fn dv_dt(&self, _phi: &FieldVec, _t: f64) -> f64 {
            0.0
        }
        fn global_min(&self, _t: f64) -> Result<FieldVec, crate::potential::PotentialError> {
            Ok(array![(-self.m2 / self.lambda).sqrt()])
        }
        fn symmetry_elements(&self) -> &[FieldMat] {
            &[]
        }
    }

    #[test]
    fn finds_zero_crossing_of_smallest_eigenvalue() {
        // H(phi) = m2 + 3 lambda phi^2, with m2 = -1, lambda = 1: zero at phi = sqrt(1/3)
        let pot = DoubleWell {
            m2: -1.0,
            lambda: 1.0,
        };
        let crossing = find_zero_smallest_eigenvalue(
            &pot,
            &array![0.0],
            0.0,
            &array![2.0],
            0.0,
            1e-10,
            100,
        );
        assert!(crossing.is_some());
    }

    #[test]
    fn no_crossing_when_eigenvalue_keeps_sign() {
        let pot = DoubleWell {
            m2: 1.0,
            lambda: 1.0,
        };
        let crossing = find_zero_smallest_eigenvalue(
            &pot,
            &array![0.0],
            0.0,
            &array![2.0],
            0.0,
            1e-6,
            50,
        );
        assert!(crossing.is_none());
    }

    #[test]
    fn reports_not_converged_when_gradient_never_small() {
        struct Runaway;
        impl Potential for Runaway {
            fn dim(&self) -> usize {
                1
            }
            fn v(&self, phi: &FieldVec, _t: f64) -> f64 {
                -phi[0]
            }
            fn grad_v(&self, _phi: &FieldVec, _t: f64) -> FieldVec {
                array![-1.0]
            }
            fn hess_v(&self, _phi: &FieldVec, _t: f64) -> FieldMat {
                array![[0.0]]
            }
            fn dv_dt(&self, _phi: &FieldVec, _t: f64) -> f64 {
                0.0
            }
            fn global_min(&self, _t: f64) -> Result<FieldVec, crate::potential::PotentialError> {
                Err(crate::potential::PotentialError::OptimizerNotConverged(
                    "unbounded below".into(),
                ))
            }
            fn symmetry_elements(&self) -> &[FieldMat] {
                &[]
            }
        }

        let cfg = MinimumLocatorConfig {
            max_iter: 20,
            ..Default::default()
        };
        let result = locate_minimum(&Runaway, &array![0.0], 0.0, &cfg);
        assert!(matches!(result, Err(LocateError::NotConverged { .. })));
    }
}
